//! RADIUS client engine.
//!
//! This crate is the concurrent core described by the surrounding
//! `radius-client` binary: a fixed pool of worker threads, each owning its
//! own UDP sockets and packet-ID slot table with no locking, coordinated
//! through message passing and a single mutex-guarded server registry. It
//! treats the wire-format codec (`radius-client-codec`) as an opaque
//! collaborator and has no notion of configuration files or CLI flags - see
//! [`Client::new`] for the settings it does take directly.
//!
//! Module layout mirrors the component design: [`registry`] is the one
//! piece of cross-thread shared state; [`pool`], [`slot`], [`socket`], and
//! [`arena`] are worker-local storage; [`query`] is the per-exchange state
//! machine; [`timer`] is pure retransmission-interval math; [`worker`] wires
//! all of it into a running event loop. [`Client`] in this module is the
//! handle an application holds.

pub mod arena;
pub mod error;
pub mod pool;
pub mod query;
pub mod registry;
pub mod slot;
pub mod socket;
pub mod timer;
pub mod worker;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::BytesMut;

pub use error::Error;
pub use query::{Callback, Outcome};
pub use registry::{RetransPolicy, ServerEntry};
pub use socket::Family;
pub use worker::QueryId;

use registry::ServerRegistry;
use worker::{ClientSettings, WorkerHandle};

/// settings fixed for the lifetime of a [`Client`] (client settings, per
/// §6 of the external interface).
pub struct Settings {
    pub servers_max: usize,
    pub queue_max_per_thread: usize,
    pub sockets_min_per_thread: usize,
    pub sockets_max_per_thread: usize,
    pub socket_rcv_buf: usize,
    pub socket_snd_buf: usize,
    /// appended as a `NAS-Identifier` attribute to every Access-Request
    /// enqueued through this client. Must be 253 bytes or fewer.
    pub nas_identifier: Vec<u8>,
}

/// a handle returned synchronously from [`Client::query`], usable to cancel
/// the exchange before it completes. Opaque outside this crate beyond that.
#[derive(Clone, Copy)]
pub struct QueryHandle {
    worker: usize,
    token: u64,
}

/// the RADIUS client engine: a server registry shared by every worker, and
/// the worker pool itself.
pub struct Client {
    registry: Arc<ServerRegistry>,
    workers: Arc<Vec<WorkerHandle>>,
    threads: Vec<std::thread::JoinHandle<()>>,
    next_token: AtomicU64,
    nas_identifier: Vec<u8>,
}

impl Client {
    /// spawn `thread_count` worker threads and build an empty server
    /// registry. `thread_count` is ordinarily the size of the application's
    /// own thread pool - see §5: callers enqueue from one of these same
    /// worker threads, identified by its index.
    pub fn new(thread_count: usize, settings: Settings) -> Result<Self, Error> {
        if thread_count == 0 {
            return Err(Error::InvalidArg);
        }
        if settings.nas_identifier.len() > 253 {
            return Err(Error::InvalidArg);
        }

        let sockets_min = settings.sockets_min_per_thread.max(1);
        let sockets_max = settings.sockets_max_per_thread.max(sockets_min);

        let registry = Arc::new(ServerRegistry::new(settings.servers_max));
        let worker_settings = Arc::new(ClientSettings {
            sockets_min_per_thread: sockets_min,
            sockets_max_per_thread: sockets_max,
            socket_rcv_buf: settings.socket_rcv_buf,
            socket_snd_buf: settings.socket_snd_buf,
            queue_max_per_thread: settings.queue_max_per_thread.max(1),
        });

        let (workers, threads) = worker::spawn_all(thread_count, registry.clone(), worker_settings);

        Ok(Self {
            registry,
            workers,
            threads,
            next_token: AtomicU64::new(1),
            nas_identifier: settings.nas_identifier,
        })
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// append a server entry, returning its index. Fails with
    /// [`Error::NoCapacity`] once `servers_max` (rounded up) is reached.
    pub fn server_add(&self, entry: ServerEntry) -> Result<usize, Error> {
        self.registry.add(entry)
    }

    pub fn server_remove(&self, index: usize) {
        self.registry.remove(index);
    }

    pub fn server_remove_by_addr(&self, addr: SocketAddr) {
        self.registry.remove_by_addr(addr);
    }

    pub fn server_count(&self) -> usize {
        self.registry.len()
    }

    /// enqueue a query: hop it onto `target_worker`'s thread, which signs
    /// and sends it, arms the retransmission timer, and eventually invokes
    /// `callback` on `originator`'s thread with the outcome. `buf` must hold
    /// a complete, unsigned RADIUS packet; the caller must not touch it
    /// again after this call returns `Ok`.
    ///
    /// Returns synchronously: [`Error::InvalidArg`] for an out-of-range
    /// thread index, or [`Error::Again`] if `target_worker`'s queue is
    /// already full. Every other failure (no server, retransmission
    /// exhausted, OS send error, ...) arrives later through `callback`.
    pub fn query(
        &self,
        originator: usize,
        target_worker: usize,
        id: QueryId,
        mut buf: BytesMut,
        callback: Callback,
    ) -> Result<QueryHandle, Error> {
        if originator >= self.workers.len() || target_worker >= self.workers.len() {
            return Err(Error::InvalidArg);
        }

        if codec::packet_type_is(&buf, codec::header::Code::AccessRequest) {
            codec::attr_add(&mut buf, codec::attributes::AttributeType::NasIdentifier, &self.nas_identifier)?;
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.workers[target_worker].new_query(token, id, buf, originator, callback)?;

        Ok(QueryHandle { worker: target_worker, token })
    }

    /// clear the callback on an in-flight query so its eventual completion
    /// becomes a silent free. Best-effort: if the target worker's queue is
    /// saturated the request is dropped and the query runs to its normal
    /// conclusion (and its callback still fires).
    pub fn query_cancel(&self, handle: QueryHandle) {
        self.workers[handle.worker].cancel(handle.token);
    }

    /// synchronously tear down every worker: each one drains its socket
    /// pools, completing every occupied slot with [`Error::Intr`], before
    /// acknowledging shutdown.
    pub fn destroy(self) {
        for worker in self.workers.iter() {
            worker.shutdown_blocking();
        }
        for thread in self.threads {
            let _ = thread.join();
        }
    }
}
