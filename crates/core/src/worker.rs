//! One event-loop thread: owns its socket pools and query arena outright, so
//! nothing here ever needs a lock. Everything that crosses into or out of a
//! worker does so as a message on its channel.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ahash::HashMap;
use bytes::BytesMut;
use tokio::sync::{mpsc, oneshot};

use crate::arena::{Arena, Handle};
use crate::error::Error;
use crate::pool::SocketPool;
use crate::query::{Attachment, Callback, Outcome, Query};
use crate::registry::ServerRegistry;
use crate::socket::{Family, SocketId};
use crate::timer::{self, Fire};

/// tuning knobs shared by every worker's socket pools.
pub struct ClientSettings {
    pub sockets_min_per_thread: usize,
    pub sockets_max_per_thread: usize,
    pub socket_rcv_buf: usize,
    pub socket_snd_buf: usize,
    /// capacity of each worker's inbound message channel. A `new_query` that
    /// would exceed it returns [`Error::Again`] rather than growing the
    /// queue without bound.
    pub queue_max_per_thread: usize,
}

/// whether a query asked for a specific packet-ID or let the pool assign one.
#[derive(Clone, Copy)]
pub enum QueryId {
    Auto,
    Fixed(u8),
}

pub(crate) enum WorkerMsg {
    NewQuery {
        token: u64,
        id: QueryId,
        buf: BytesMut,
        originator: usize,
        callback: Callback,
    },
    /// `token` is the same value handed back to the caller from `new_query`;
    /// the worker resolves it to an arena handle through its own token
    /// table, since the arena is private to the worker thread.
    Cancel(u64),
    TimerFired(Handle),
    Inbound {
        socket_id: SocketId,
        from: SocketAddr,
        data: Vec<u8>,
    },
    /// completion hopping back to this worker because it is the query's
    /// originator.
    Deliver {
        callback: Callback,
        outcome: Outcome,
    },
    Shutdown(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct WorkerHandle {
    pub id: usize,
    pub(crate) tx: mpsc::Sender<WorkerMsg>,
}

impl WorkerHandle {
    /// post a new query to this worker. Fails synchronously with
    /// [`Error::Again`] if the worker's queue is already at
    /// `queue_max_per_thread` - the caller never blocks waiting for room.
    pub fn new_query(
        &self,
        token: u64,
        id: QueryId,
        buf: BytesMut,
        originator: usize,
        callback: Callback,
    ) -> Result<(), Error> {
        self.tx
            .try_send(WorkerMsg::NewQuery { token, id, buf, originator, callback })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => Error::Again,
                mpsc::error::TrySendError::Closed(_) => Error::Intr,
            })
    }

    /// best-effort cancellation: dropped silently if the worker's queue is
    /// full, same as the source's "does not proactively dequeue" contract -
    /// the in-flight attempt still runs its course and frees the query.
    pub fn cancel(&self, token: u64) {
        let _ = self.tx.try_send(WorkerMsg::Cancel(token));
    }

    /// blocks the calling (non-async) thread until the worker acknowledges
    /// shutdown. Must not be called from inside a tokio runtime.
    pub fn shutdown_blocking(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.blocking_send(WorkerMsg::Shutdown(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.blocking_recv();
    }
}

/// build one bounded channel per worker and spawn its thread. Every worker
/// needs the full `WorkerHandle` table up front (to hop completions to any
/// other worker), so the channels are created first and handed out as a
/// single `worker_txs` table shared by every thread.
pub fn spawn_all(
    thread_count: usize,
    registry: Arc<ServerRegistry>,
    settings: Arc<ClientSettings>,
) -> (Arc<Vec<WorkerHandle>>, Vec<std::thread::JoinHandle<()>>) {
    let queue_max = settings.queue_max_per_thread.max(1);

    let mut txs = Vec::with_capacity(thread_count);
    let mut rxs = Vec::with_capacity(thread_count);
    for id in 0..thread_count {
        let (tx, rx) = mpsc::channel(queue_max);
        txs.push(WorkerHandle { id, tx });
        rxs.push(rx);
    }

    let worker_txs = Arc::new(txs);
    let threads = rxs
        .into_iter()
        .enumerate()
        .map(|(id, rx)| spawn_one(id, rx, registry.clone(), settings.clone(), worker_txs.clone()))
        .collect();

    (worker_txs, threads)
}

/// spawn a single worker thread running its own single-threaded tokio
/// runtime, draining `rx` until it receives [`WorkerMsg::Shutdown`].
fn spawn_one(
    id: usize,
    rx: mpsc::Receiver<WorkerMsg>,
    registry: Arc<ServerRegistry>,
    settings: Arc<ClientSettings>,
    worker_txs: Arc<Vec<WorkerHandle>>,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("radius-worker-{id}"))
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build per-worker tokio runtime");

            let mut state = WorkerState::new(id, registry, settings, worker_txs);
            runtime.block_on(state.run(rx));
        })
        .expect("failed to spawn worker thread")
}

struct WorkerState {
    id: usize,
    registry: Arc<ServerRegistry>,
    settings: Arc<ClientSettings>,
    worker_txs: Arc<Vec<WorkerHandle>>,
    self_tx: mpsc::Sender<WorkerMsg>,
    pools: HashMap<Family, SocketPool>,
    queries: Arena<Query>,
    /// maps the token handed back to the caller from `new_query` to this
    /// worker's private arena handle, since the arena itself never leaves
    /// the worker thread.
    tokens: HashMap<u64, Handle>,
}

impl WorkerState {
    fn new(
        id: usize,
        registry: Arc<ServerRegistry>,
        settings: Arc<ClientSettings>,
        worker_txs: Arc<Vec<WorkerHandle>>,
    ) -> Self {
        let self_tx = worker_txs[id].tx.clone();
        Self {
            id,
            registry,
            settings,
            worker_txs,
            self_tx,
            pools: HashMap::default(),
            queries: Arena::new(),
            tokens: HashMap::default(),
        }
    }

    async fn run(&mut self, mut rx: mpsc::Receiver<WorkerMsg>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                WorkerMsg::NewQuery { token, id, buf, originator, callback } => {
                    self.handle_new_query(token, id, buf, originator, callback).await;
                }
                WorkerMsg::Cancel(token) => self.handle_cancel(token),
                WorkerMsg::TimerFired(handle) => self.on_timer_fired(handle).await,
                WorkerMsg::Inbound { socket_id, from, data } => {
                    self.handle_inbound(socket_id, from, data).await;
                }
                WorkerMsg::Deliver { callback, outcome } => callback(outcome),
                WorkerMsg::Shutdown(ack) => {
                    self.handle_shutdown();
                    let _ = ack.send(());
                    break;
                }
            }
        }
    }

    fn pool_mut(&mut self, family: Family) -> &mut SocketPool {
        self.pools.entry(family).or_insert_with(|| {
            SocketPool::new(
                family,
                self.settings.sockets_min_per_thread,
                self.settings.sockets_max_per_thread,
                self.settings.socket_rcv_buf,
                self.settings.socket_snd_buf,
            )
        })
    }

    fn spawn_receiver(&mut self, family: Family, socket_id: SocketId) {
        let tx = self.self_tx.clone();

        let Some(entry) = self.pool_mut(family).socket_by_id_mut(socket_id) else {
            return;
        };

        let socket = entry.socket.clone();

        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; codec::header::RADIUS_PKT_MAX_SIZE];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((n, from)) => {
                        let data = buf[..n].to_vec();
                        if tx.send(WorkerMsg::Inbound { socket_id, from, data }).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("udp recv error on socket {socket_id}: {e}");
                    }
                }
            }
        });

        entry.recv_task = Some(task);
    }

    async fn handle_new_query(
        &mut self,
        token: u64,
        id: QueryId,
        buf: BytesMut,
        originator: usize,
        callback: Callback,
    ) {
        let (id_is_auto, requested_id) = match id {
            QueryId::Auto => (true, None),
            QueryId::Fixed(v) => (false, Some(v)),
        };

        let query = Query::new(buf, id_is_auto, originator, callback, token);
        let handle = self.queries.insert(query);
        self.tokens.insert(token, handle);
        self.send_new(handle, requested_id).await;
    }

    fn handle_cancel(&mut self, token: u64) {
        if let Some(&handle) = self.tokens.get(&token)
            && let Some(query) = self.queries.get_mut(handle)
        {
            query.cancel();
        }
    }

    fn handle_shutdown(&mut self) {
        let mut drained = Vec::new();
        for pool in self.pools.values_mut() {
            drained.extend(pool.drain());
        }
        self.pools.clear();

        for (_, _, handle) in drained {
            self.complete(handle, Err(Error::Intr));
        }
    }

    /// select a server, allocate or reuse a slot, sign, and send. `requested_id`
    /// is only consulted the first time a query attaches to a socket.
    async fn send_new(&mut self, handle: Handle, requested_id: Option<u8>) {
        let Some(query) = self.queries.get(handle) else { return };
        let from_index = query.current_server_index;

        let Some((server_index, server)) = self.registry.next_enabled_from(from_index) else {
            let exhausted = self.queries.get(handle).map(|q| q.has_sent_once).unwrap_or(false);
            self.complete(handle, Err(if exhausted { Error::TimedOut } else { Error::NoServer }));
            return;
        };

        let family = Family::of(server.addr);

        let Some(query) = self.queries.get_mut(handle) else { return };
        query.current_server_index = server_index;
        query.has_sent_once = true;

        if let Some(att) = query.attachment
            && att.family != family
        {
            self.cancel_timer(handle);
            if let Some(att) = self.queries.get_mut(handle).and_then(|q| q.attachment.take()) {
                self.pool_mut(att.family).detach(att.socket_id, att.packet_id);
            }
        }

        let needs_alloc = self.queries.get(handle).map(|q| q.attachment.is_none()).unwrap_or(true);

        if needs_alloc {
            let id_is_auto = self.queries.get(handle).map(|q| q.id_is_auto).unwrap_or(true);
            let pool = self.pool_mut(family);

            let alloc = if id_is_auto {
                pool.alloc_auto(handle)
            } else {
                pool.alloc_fixed(requested_id.unwrap_or(0), handle)
            };

            let alloc = match alloc {
                Ok(a) => a,
                Err(e) => {
                    self.complete(handle, Err(e));
                    return;
                }
            };

            if alloc.created {
                self.spawn_receiver(family, alloc.socket_id);
            }

            let Some(query) = self.queries.get_mut(handle) else { return };
            query.attachment = Some(Attachment {
                family,
                socket_id: alloc.socket_id,
                packet_id: alloc.packet_id,
            });

            if id_is_auto {
                query.buf[1] = alloc.packet_id;
            }
        }

        self.sign_and_send(handle, &server.secret, server.addr, family).await;

        if let Some(query) = self.queries.get_mut(handle) {
            let init = server.policy.initial_timeout_ms;
            query.retrans_time = timer::apply_jitter(init, timer::jitter(init, monotonic_nanos()));
        }
        if self.queries.get(handle).is_some() {
            let t = self.queries.get(handle).unwrap().retrans_time;
            self.arm_timer(handle, t);
        }
    }

    /// re-sign (the authenticator depends on the current server's secret,
    /// which can change across a failover) and transmit. On OS-level send
    /// failure the query completes immediately with the errno.
    async fn sign_and_send(&mut self, handle: Handle, secret: &[u8], addr: SocketAddr, family: Family) {
        let Some(query) = self.queries.get_mut(handle) else { return };

        if let Err(e) = codec::sign(&mut query.buf, secret) {
            let err: Error = e.into();
            self.complete(handle, Err(err));
            return;
        }

        query.request_authenticator = codec::header::authenticator(&query.buf);
        let Some(att) = query.attachment else { return };

        let socket = {
            let Some(entry) = self.pool_mut(family).socket_by_id(att.socket_id) else {
                return;
            };
            entry.socket.clone()
        };

        let payload = self.queries.get(handle).unwrap().buf.clone();

        if let Err(e) = socket.send_to(&payload, addr).await {
            let err: Error = e.into();
            self.complete(handle, Err(err));
        }
    }

    fn arm_timer(&mut self, handle: Handle, delay_ms: u64) {
        let tx = self.self_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let _ = tx.send(WorkerMsg::TimerFired(handle)).await;
        });

        if let Some(query) = self.queries.get_mut(handle) {
            query.timer_task = Some(task);
        }
    }

    fn cancel_timer(&mut self, handle: Handle) {
        if let Some(query) = self.queries.get_mut(handle)
            && let Some(task) = query.timer_task.take()
        {
            task.abort();
        }
    }

    async fn on_timer_fired(&mut self, handle: Handle) {
        let Some(query) = self.queries.get_mut(handle) else { return };
        query.timer_task = None;

        let server_index = query.current_server_index;
        let Some(server) = self.registry.get(server_index) else {
            self.failover(handle).await;
            return;
        };
        if !server.enabled {
            self.failover(handle).await;
            return;
        }

        let query = self.queries.get_mut(handle).unwrap();
        query.retrans_count += 1;
        query.retrans_duration += query.retrans_time;
        let prev_retrans_time = query.retrans_time;
        let retrans_count = query.retrans_count;
        let retrans_duration = query.retrans_duration;

        let now = monotonic_nanos();
        match timer::evaluate(&server.policy, retrans_count, retrans_duration, prev_retrans_time, now) {
            Fire::Failover => self.failover(handle).await,
            Fire::Retry { next_retrans_time_ms } => {
                if let Some(query) = self.queries.get_mut(handle) {
                    query.retrans_time = next_retrans_time_ms;
                }

                let Some(att) = self.queries.get(handle).and_then(|q| q.attachment) else { return };
                self.sign_and_send(handle, &server.secret, server.addr, att.family).await;
                if self.queries.get(handle).is_some() {
                    self.arm_timer(handle, next_retrans_time_ms);
                }
            }
        }
    }

    /// detach the current slot, advance past the current server, and retry
    /// `send_new` - which itself completes with `TimedOut` once the
    /// registry is exhausted.
    async fn failover(&mut self, handle: Handle) {
        self.cancel_timer(handle);

        let taken = self.queries.get_mut(handle).and_then(|q| q.attachment.take());
        if let Some(att) = taken {
            self.pool_mut(att.family).detach(att.socket_id, att.packet_id);
        }

        let Some(query) = self.queries.get_mut(handle) else { return };
        query.current_server_index += 1;
        query.retrans_count = 0;
        query.retrans_duration = 0;
        query.retrans_time = 0;

        self.send_new(handle, None).await;
    }

    async fn handle_inbound(&mut self, socket_id: SocketId, from: SocketAddr, data: Vec<u8>) {
        if codec::chk(&data).is_err() {
            return;
        }

        let family = match self.pools.iter().find(|(_, p)| p.socket_by_id(socket_id).is_some()) {
            Some((family, _)) => *family,
            None => return,
        };

        let packet_id = codec::header::id(&data);
        let Some(handle) = self
            .pool_mut(family)
            .socket_by_id(socket_id)
            .and_then(|s| s.slots.get(packet_id))
        else {
            return;
        };

        let Some(query) = self.queries.get(handle) else { return };
        let Some(server) = self.registry.get(query.current_server_index) else {
            return;
        };

        if from != server.addr {
            return;
        }

        let mut fake_request = [0u8; codec::header::HEADER_SIZE];
        fake_request[4..20].copy_from_slice(&query.request_authenticator);

        if codec::verify(&data, &server.secret, &fake_request).is_err() {
            return;
        }

        if let Some(query) = self.queries.get_mut(handle) {
            query.buf.clear();
            query.buf.extend_from_slice(&data);
        }

        self.complete(handle, Ok(()));
    }

    /// detach from socket/slot (cancelling the timer), free the query, and
    /// either invoke its callback inline or hop to its originator worker.
    fn complete(&mut self, handle: Handle, result: Result<(), Error>) {
        self.cancel_timer(handle);

        if let Some(att) = self.queries.get_mut(handle).and_then(|q| q.attachment.take()) {
            self.pool_mut(att.family).detach(att.socket_id, att.packet_id);
        }

        let Some(mut query) = self.queries.remove(handle) else { return };
        self.tokens.remove(&query.token);
        let Some(callback) = query.callback.take() else { return };

        let outcome = Outcome { error: result.err(), buf: std::mem::take(&mut query.buf) };

        if query.originator == self.id {
            callback(outcome);
            return;
        }

        match self.worker_txs[query.originator]
            .tx
            .try_send(WorkerMsg::Deliver { callback, outcome })
        {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(WorkerMsg::Deliver { callback, outcome }))
            | Err(mpsc::error::TrySendError::Closed(WorkerMsg::Deliver { callback, outcome })) => {
                log::warn!(
                    "completion hop from worker {} to {} failed, invoking callback inline",
                    self.id,
                    query.originator
                );
                callback(outcome);
            }
            Err(_) => unreachable!("TrySendError always carries back the message we sent"),
        }
    }
}

fn monotonic_nanos() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START.get_or_init(std::time::Instant::now).elapsed().as_nanos() as u64
}
