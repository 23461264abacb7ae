//! End-to-end exchanges driven against real loopback UDP sockets, one fake
//! RADIUS server per test.

use std::time::Duration;

use bytes::BytesMut;
use radius_client_core::{Client, Error, QueryId, RetransPolicy, ServerEntry, Settings};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;

fn access_request() -> BytesMut {
    BytesMut::from(&[1u8, 0, 0, 20, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0][..])
}

/// build a correctly-signed Access-Accept for `request`, the raw datagram
/// the fake server just received: the response authenticator is
/// `MD5(code || id || length || request-authenticator || attributes || secret)`
/// per RFC 2865 §3.
fn access_accept(request: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut pkt = vec![2u8, request[1], 0, 20, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    pkt[4..20].copy_from_slice(&request[4..20]);
    let digest = codec::crypto::md5_digest(&[&pkt, secret]);
    pkt[4..20].copy_from_slice(&digest);
    pkt
}

fn settings() -> Settings {
    Settings {
        servers_max: 4,
        queue_max_per_thread: 32,
        sockets_min_per_thread: 1,
        sockets_max_per_thread: 4,
        socket_rcv_buf: 65536,
        socket_snd_buf: 65536,
        nas_identifier: b"test-nas".to_vec(),
    }
}

fn policy(init: u64, max_timeout: u64, max_duration: u64, max_retries: u32) -> RetransPolicy {
    RetransPolicy {
        initial_timeout_ms: init,
        max_timeout_ms: max_timeout,
        max_duration_ms: max_duration,
        max_retries,
    }
}

async fn bind_fake_server() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

#[tokio::test]
async fn happy_path_gets_access_accept() {
    let server = bind_fake_server().await;
    let addr = server.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 1500];
        let (n, from) = server.recv_from(&mut buf).await.unwrap();
        server.send_to(&access_accept(&buf[..n], b"s3cret"), from).await.unwrap();
    });

    let client = Client::new(1, settings()).unwrap();
    client
        .server_add(ServerEntry { addr, secret: b"s3cret".to_vec(), policy: policy(250, 4000, 15_000, 3), enabled: true })
        .unwrap();

    let (tx, rx) = oneshot::channel();
    client.query(0, 0, QueryId::Auto, access_request(), Box::new(move |o| { let _ = tx.send(o); })).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
    assert!(outcome.error.is_none());
    assert_eq!(outcome.buf[0], 2);

    tokio::task::spawn_blocking(move || client.destroy()).await.unwrap();
}

#[tokio::test]
async fn single_retry_then_success() {
    let server = bind_fake_server().await;
    let addr = server.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 1500];
        let (_, _from) = server.recv_from(&mut buf).await.unwrap();
        // drop the first datagram.
        let (n, from) = server.recv_from(&mut buf).await.unwrap();
        server.send_to(&access_accept(&buf[..n], b"s3cret"), from).await.unwrap();
    });

    let client = Client::new(1, settings()).unwrap();
    client
        .server_add(ServerEntry { addr, secret: b"s3cret".to_vec(), policy: policy(100, 4000, 15_000, 3), enabled: true })
        .unwrap();

    let (tx, rx) = oneshot::channel();
    client.query(0, 0, QueryId::Auto, access_request(), Box::new(move |o| { let _ = tx.send(o); })).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
    assert!(outcome.error.is_none());

    tokio::task::spawn_blocking(move || client.destroy()).await.unwrap();
}

#[tokio::test]
async fn retry_exhaustion_on_single_server_times_out() {
    let server = bind_fake_server().await;
    let addr = server.local_addr().unwrap();
    // never reply; keep the socket alive for the duration of the test.
    let _keep_alive = server;

    let client = Client::new(1, settings()).unwrap();
    client
        .server_add(ServerEntry { addr, secret: b"s3cret".to_vec(), policy: policy(50, 200, 10_000, 2), enabled: true })
        .unwrap();

    let (tx, rx) = oneshot::channel();
    client.query(0, 0, QueryId::Auto, access_request(), Box::new(move |o| { let _ = tx.send(o); })).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
    assert!(matches!(outcome.error, Some(Error::TimedOut)));

    tokio::task::spawn_blocking(move || client.destroy()).await.unwrap();
}

#[tokio::test]
async fn failover_to_second_server() {
    let dead = bind_fake_server().await;
    let dead_addr = dead.local_addr().unwrap();
    let _keep_dead_alive = dead;

    let alive = bind_fake_server().await;
    let alive_addr = alive.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 1500];
        let (n, from) = alive.recv_from(&mut buf).await.unwrap();
        alive.send_to(&access_accept(&buf[..n], b"s3cret"), from).await.unwrap();
    });

    let client = Client::new(1, settings()).unwrap();
    client
        .server_add(ServerEntry { addr: dead_addr, secret: b"s3cret".to_vec(), policy: policy(50, 200, 10_000, 1), enabled: true })
        .unwrap();
    client
        .server_add(ServerEntry { addr: alive_addr, secret: b"s3cret".to_vec(), policy: policy(50, 200, 10_000, 1), enabled: true })
        .unwrap();

    let (tx, rx) = oneshot::channel();
    client.query(0, 0, QueryId::Auto, access_request(), Box::new(move |o| { let _ = tx.send(o); })).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
    assert!(outcome.error.is_none());

    tokio::task::spawn_blocking(move || client.destroy()).await.unwrap();
}

#[tokio::test]
async fn empty_registry_yields_no_server() {
    let client = Client::new(1, settings()).unwrap();

    let (tx, rx) = oneshot::channel();
    client.query(0, 0, QueryId::Auto, access_request(), Box::new(move |o| { let _ = tx.send(o); })).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
    assert!(matches!(outcome.error, Some(Error::NoServer)));

    tokio::task::spawn_blocking(move || client.destroy()).await.unwrap();
}

#[tokio::test]
async fn shutdown_completes_in_flight_query_with_intr() {
    let server = bind_fake_server().await;
    let addr = server.local_addr().unwrap();
    let _keep_alive = server;

    let client = Client::new(1, settings()).unwrap();
    client
        .server_add(ServerEntry { addr, secret: b"s3cret".to_vec(), policy: policy(5_000, 20_000, 60_000, 5), enabled: true })
        .unwrap();

    let (tx, rx) = oneshot::channel();
    client.query(0, 0, QueryId::Auto, access_request(), Box::new(move |o| { let _ = tx.send(o); })).unwrap();

    // give the worker a moment to send and arm the timer before tearing down.
    tokio::time::sleep(Duration::from_millis(50)).await;
    tokio::task::spawn_blocking(move || client.destroy()).await.unwrap();

    let outcome = rx.await.unwrap();
    assert!(matches!(outcome.error, Some(Error::Intr)));
}

#[tokio::test]
async fn reply_from_wrong_source_address_is_dropped() {
    let server = bind_fake_server().await;
    let addr = server.local_addr().unwrap();

    let impostor = bind_fake_server().await;

    tokio::spawn(async move {
        let mut buf = [0u8; 1500];
        let (n, from) = server.recv_from(&mut buf).await.unwrap();
        // reply from a socket other than the configured server address; the
        // engine must drop it and let the timer run its course.
        impostor.send_to(&access_accept(&buf[..n], b"s3cret"), from).await.unwrap();
    });

    let client = Client::new(1, settings()).unwrap();
    client
        .server_add(ServerEntry { addr, secret: b"s3cret".to_vec(), policy: policy(50, 200, 10_000, 1), enabled: true })
        .unwrap();

    let (tx, rx) = oneshot::channel();
    client.query(0, 0, QueryId::Auto, access_request(), Box::new(move |o| { let _ = tx.send(o); })).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
    // the spoofed reply was dropped, so the query runs out its retry budget.
    assert!(matches!(outcome.error, Some(Error::TimedOut)));

    tokio::task::spawn_blocking(move || client.destroy()).await.unwrap();
}
