#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::sync::mpsc;
use std::time::Duration;

use bytes::BytesMut;
use radius_client::client::RadiusClient;
use radius_client::config::Config;

/// build a minimal Access-Request: header with a zeroed Authenticator (the
/// engine fills it in on signing) and a single User-Name attribute.
fn access_request(username: &str) -> BytesMut {
    let mut pkt = BytesMut::from(&[1u8, 0, 0, 20, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0][..]);
    codec::attr_add(&mut pkt, codec::attributes::AttributeType::UserName, username.as_bytes())
        .expect("user-name fits in one attribute");
    pkt
}

fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    radius_client::logger::init(config.log.level)?;

    if config.servers.is_empty() {
        log::warn!("no servers configured; nothing to do");
        return Ok(());
    }

    let client = RadiusClient::from_config(&config)?;
    let (tx, rx) = mpsc::channel();

    client.query(0, 0, access_request("demo"), Box::new(move |outcome| {
        let _ = tx.send(outcome);
    }))?;

    match rx.recv_timeout(Duration::from_secs(30)) {
        Ok(outcome) => match outcome.error {
            None => log::info!("received reply, {} bytes", outcome.buf.len()),
            Some(err) => log::error!("query failed: {err}"),
        },
        Err(_) => log::error!("timed out waiting for the query callback"),
    }

    client.destroy();
    Ok(())
}
