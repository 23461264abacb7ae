//! Socket Pool: the set of UDP sockets a single worker thread owns for one
//! address family. Touched only by that worker - no locking.

use crate::arena::Handle;
use crate::error::Error;
use crate::socket::{Family, SocketEntry, SocketId};

pub struct SocketPool {
    family: Family,
    sockets: Vec<SocketEntry>,
    sockets_min: usize,
    sockets_max: usize,
    rcv_buf: usize,
    snd_buf: usize,
    occupied_total: usize,
}

/// where a query landed after a successful allocation. `created` is set when
/// the allocation had to bind a fresh socket, so the caller can spawn its
/// receiver task.
pub struct Allocation {
    pub socket_id: SocketId,
    pub packet_id: u8,
    pub created: bool,
}

impl SocketPool {
    pub fn new(family: Family, sockets_min: usize, sockets_max: usize, rcv_buf: usize, snd_buf: usize) -> Self {
        Self {
            family,
            sockets: Vec::with_capacity(sockets_max),
            sockets_min,
            sockets_max,
            rcv_buf,
            snd_buf,
            occupied_total: 0,
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn socket_by_id(&self, id: SocketId) -> Option<&SocketEntry> {
        self.sockets.iter().find(|s| s.id == id)
    }

    pub fn socket_by_id_mut(&mut self, id: SocketId) -> Option<&mut SocketEntry> {
        self.sockets.iter_mut().find(|s| s.id == id)
    }

    fn ensure_min_sockets(&mut self) -> Result<bool, Error> {
        let mut created = false;
        while self.sockets.len() < self.sockets_min {
            self.sockets.push(SocketEntry::bind(self.family, self.rcv_buf, self.snd_buf)?);
            created = true;
        }
        Ok(created)
    }

    /// caller-fixed ID allocation: scan existing sockets for one whose slot
    /// at `id` is empty; create a new socket if permitted and none is found.
    pub fn alloc_fixed(&mut self, id: u8, handle: Handle) -> Result<Allocation, Error> {
        let mut created = self.ensure_min_sockets()?;

        for socket in self.sockets.iter_mut() {
            if socket.slots.try_occupy(id, handle) {
                self.occupied_total += 1;
                return Ok(Allocation {
                    socket_id: socket.id,
                    packet_id: id,
                    created,
                });
            }
        }

        if self.sockets.len() >= self.sockets_max {
            return Err(Error::Again);
        }

        let mut socket = SocketEntry::bind(self.family, self.rcv_buf, self.snd_buf)?;
        socket.slots.try_occupy(id, handle);
        let socket_id = socket.id;
        self.sockets.push(socket);
        self.occupied_total += 1;
        created = true;

        Ok(Allocation {
            socket_id,
            packet_id: id,
            created,
        })
    }

    /// auto-ID allocation: probe each socket with spare capacity, creating a
    /// new one if every existing socket is full and the pool has room.
    pub fn alloc_auto(&mut self, handle: Handle) -> Result<Allocation, Error> {
        let mut created = self.ensure_min_sockets()?;

        for socket in self.sockets.iter_mut() {
            if let Some(id) = socket.slots.occupy_auto(handle) {
                self.occupied_total += 1;
                return Ok(Allocation {
                    socket_id: socket.id,
                    packet_id: id,
                    created,
                });
            }
        }

        if self.sockets.len() >= self.sockets_max {
            return Err(Error::Again);
        }

        let mut socket = SocketEntry::bind(self.family, self.rcv_buf, self.snd_buf)?;
        let id = socket
            .slots
            .occupy_auto(handle)
            .expect("a fresh slot table always has room");
        let socket_id = socket.id;
        self.sockets.push(socket);
        self.occupied_total += 1;
        created = true;

        Ok(Allocation {
            socket_id,
            packet_id: id,
            created,
        })
    }

    /// release `id` on `socket_id`, then apply the stable-tail shrink
    /// policy: the last socket in the pool is destroyed once it is empty and
    /// the pool sits above `sockets_min`, so every other socket's identity
    /// stays stable.
    pub fn detach(&mut self, socket_id: SocketId, id: u8) -> Option<Handle> {
        let socket = self.sockets.iter_mut().find(|s| s.id == socket_id)?;
        let handle = socket.slots.release(id);
        if handle.is_some() {
            self.occupied_total -= 1;
        }

        while self.sockets.len() > self.sockets_min {
            let last = self.sockets.len() - 1;
            if self.sockets[last].slots.occupied() == 0 {
                self.sockets.pop();
            } else {
                break;
            }
        }

        handle
    }

    pub fn occupied_total(&self) -> usize {
        self.occupied_total
    }

    /// every (socket_id, packet_id, handle) still occupied, for shutdown
    /// teardown.
    pub fn drain(&mut self) -> Vec<(SocketId, u8, Handle)> {
        let mut out = Vec::new();
        for socket in self.sockets.iter_mut() {
            for id in 0..=255u8 {
                if let Some(handle) = socket.slots.release(id) {
                    out.push((socket.id, id, handle));
                }
            }
        }
        self.occupied_total = 0;
        self.sockets.clear();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Handle;

    fn h(i: u32) -> Handle {
        Handle { index: i, generation: 0 }
    }

    #[tokio::test]
    async fn stable_tail_shrink_keeps_other_sockets() {
        let mut pool = SocketPool::new(Family::V4, 1, 4, 4096, 4096);
        let a = pool.alloc_fixed(1, h(1)).unwrap();
        assert!(a.created);

        // force a second socket by filling slot 1 on the first one again.
        let b = pool.alloc_fixed(1, h(2)).unwrap();
        assert!(b.created);
        assert_ne!(a.socket_id, b.socket_id);

        pool.detach(b.socket_id, 1);
        // second socket was the tail and is now empty and above sockets_min: shrunk.
        assert!(pool.socket_by_id(b.socket_id).is_none());
        assert!(pool.socket_by_id(a.socket_id).is_some());
    }
}
