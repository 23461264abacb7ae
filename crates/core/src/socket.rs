//! A single outbound UDP socket and its 256-entry slot table.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use socket2::{Domain, Protocol, Socket as Socket2, Type};
use tokio::net::UdpSocket;

use crate::error::Error;
use crate::slot::SlotTable;

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn of(addr: SocketAddr) -> Self {
        if addr.is_ipv6() { Self::V6 } else { Self::V4 }
    }
}

/// process-wide unique identity for a socket, used to correlate an inbound
/// datagram (reported by that socket's receiver task) back to the right
/// `SocketEntry` without depending on its position in the pool's vector,
/// which can shift as sockets are created and shrunk.
pub type SocketId = u64;

pub struct SocketEntry {
    pub id: SocketId,
    pub socket: Arc<UdpSocket>,
    pub slots: SlotTable,
    /// the receiver task reading this socket, set once the worker spawns it.
    /// Aborted whenever the socket is dropped from the pool.
    pub recv_task: Option<tokio::task::JoinHandle<()>>,
}

impl Drop for SocketEntry {
    fn drop(&mut self) {
        if let Some(task) = self.recv_task.take() {
            task.abort();
        }
    }
}

impl SocketEntry {
    /// bind a nonblocking UDP socket for `family`, tune its send/receive
    /// buffers, and give it an empty slot table.
    pub fn bind(family: Family, rcv_buf: usize, snd_buf: usize) -> Result<Self, Error> {
        let domain = match family {
            Family::V4 => Domain::IPV4,
            Family::V6 => Domain::IPV6,
        };

        let raw = Socket2::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        raw.set_nonblocking(true)?;
        raw.set_recv_buffer_size(rcv_buf)?;
        raw.set_send_buffer_size(snd_buf)?;

        let bind_addr: SocketAddr = match family {
            Family::V4 => (Ipv4Addr::UNSPECIFIED, 0).into(),
            Family::V6 => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        raw.bind(&bind_addr.into())?;

        let socket = UdpSocket::from_std(raw.into())?;

        Ok(Self {
            id: NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed),
            socket: Arc::new(socket),
            slots: SlotTable::default(),
            recv_task: None,
        })
    }
}
