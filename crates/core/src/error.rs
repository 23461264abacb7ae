//! Error taxonomy exposed to callers, either synchronously from an enqueue
//! call or asynchronously through a query's completion callback.

use std::fmt;

#[derive(Debug, Clone)]
pub enum Error {
    /// malformed inputs at enqueue time; always synchronous, never delivered
    /// through a callback.
    InvalidArg,
    /// registry empty, or every entry disabled/skipped during failover.
    NoServer,
    /// server registry is already at `servers_max`.
    NoCapacity,
    /// every socket in the pool is at its slot cap; synchronous from enqueue.
    Again,
    /// retransmission budget exhausted across every server.
    TimedOut,
    /// cancelled by socket or client teardown.
    Intr,
    /// OS-level send failure, surfaced verbatim.
    OsError(i32),
    /// the codec collaborator rejected a sign/verify operation.
    Codec(codec::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArg => write!(f, "invalid argument"),
            Self::NoServer => write!(f, "no server available"),
            Self::NoCapacity => write!(f, "server registry full"),
            Self::Again => write!(f, "no socket slot available"),
            Self::TimedOut => write!(f, "retransmission budget exhausted"),
            Self::Intr => write!(f, "interrupted by shutdown"),
            Self::OsError(errno) => write!(f, "os error {errno}"),
            Self::Codec(e) => write!(f, "codec error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<codec::Error> for Error {
    fn from(e: codec::Error) -> Self {
        Self::Codec(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.raw_os_error() {
            Some(errno) => Self::OsError(errno),
            None => Self::OsError(-1),
        }
    }
}
