//! One outstanding RADIUS exchange.
//!
//! A `Query` is allocated into the target worker's arena when a new-query
//! request lands there, and lives until it completes (reply matched,
//! retransmission exhausted, cancelled, or torn down by shutdown). It is
//! never touched from more than one thread: everything that can act on it -
//! the timer, the receiver, a cancel - runs on the query's owning worker.

use bytes::BytesMut;
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::socket::{Family, SocketId};

/// result handed to a query's completion callback.
pub struct Outcome {
    pub error: Option<Error>,
    pub buf: BytesMut,
}

pub type Callback = Box<dyn FnOnce(Outcome) + Send>;

/// where a finished query's slot currently lives, so completion knows what
/// to detach.
#[derive(Clone, Copy)]
pub struct Attachment {
    pub family: Family,
    pub socket_id: SocketId,
    pub packet_id: u8,
}

pub struct Query {
    pub buf: BytesMut,
    pub callback: Option<Callback>,
    pub id_is_auto: bool,
    /// the worker whose thread should run the completion callback.
    pub originator: usize,
    /// the public cancellation token this query was allocated under; used
    /// to clear the worker's token-to-handle table on completion.
    pub token: u64,
    pub current_server_index: usize,
    /// set once `send_new` has picked a server for the first time;
    /// distinguishes "registry never had an enabled server" (`NoServer`)
    /// from "exhausted every enabled server after trying" (`TimedOut`).
    pub has_sent_once: bool,
    pub attachment: Option<Attachment>,
    pub retrans_count: u32,
    pub retrans_duration: u64,
    pub retrans_time: u64,
    /// the request authenticator of the packet as last signed and sent,
    /// used by the receiver to verify a reply without re-reading `buf`
    /// (which may have been re-signed for a later attempt by the time a
    /// reply for an earlier attempt, if any, arrives).
    pub request_authenticator: [u8; 16],
    pub timer_task: Option<JoinHandle<()>>,
}

impl Query {
    pub fn new(
        buf: BytesMut,
        id_is_auto: bool,
        originator: usize,
        callback: Callback,
        token: u64,
    ) -> Self {
        Self {
            buf,
            callback: Some(callback),
            id_is_auto,
            originator,
            token,
            current_server_index: 0,
            has_sent_once: false,
            attachment: None,
            retrans_count: 0,
            retrans_duration: 0,
            retrans_time: 0,
            request_authenticator: [0; 16],
            timer_task: None,
        }
    }

    /// clear the callback so any future completion is a silent free. Does
    /// not touch the timer or the slot - the in-flight attempt still runs
    /// its course and frees the query normally.
    pub fn cancel(&mut self) {
        self.callback = None;
    }
}

impl Drop for Query {
    fn drop(&mut self) {
        if let Some(task) = self.timer_task.take() {
            task.abort();
        }
    }
}
