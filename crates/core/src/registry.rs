//! Server Registry: the one piece of state shared across every worker
//! thread, guarded by a single mutex. Everything else in this crate is
//! worker-local by construction.

use std::net::SocketAddr;

use parking_lot::Mutex;

use crate::error::Error;

/// allocation granularity servers_max is rounded up to, mirroring the
/// fixed-capacity-vector allocation the source performs at client creation.
const GRANULARITY: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct RetransPolicy {
    pub initial_timeout_ms: u64,
    pub max_timeout_ms: u64,
    pub max_duration_ms: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct ServerEntry {
    pub addr: SocketAddr,
    pub secret: Vec<u8>,
    pub policy: RetransPolicy,
    pub enabled: bool,
}

pub struct ServerRegistry {
    entries: Mutex<Vec<ServerEntry>>,
    capacity: usize,
}

impl ServerRegistry {
    pub fn new(servers_max: usize) -> Self {
        let capacity = servers_max.div_ceil(GRANULARITY) * GRANULARITY;

        Self {
            entries: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// append a server entry, returning its index. Fails with
    /// [`Error::NoCapacity`] once `servers_max` (rounded up) is reached.
    pub fn add(&self, entry: ServerEntry) -> Result<usize, Error> {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            return Err(Error::NoCapacity);
        }

        entries.push(entry);
        Ok(entries.len() - 1)
    }

    /// remove the entry at `index`, compacting the list so the order of the
    /// remaining entries is preserved. A `current_server_index` cached on a
    /// live query can end up pointing at a different server after this; every
    /// `send_new` re-validates the index under the mutex before using it.
    pub fn remove(&self, index: usize) {
        let mut entries = self.entries.lock();
        if index < entries.len() {
            entries.remove(index);
        }
    }

    pub fn remove_by_addr(&self, addr: SocketAddr) {
        let mut entries = self.entries.lock();
        if let Some(index) = entries.iter().position(|e| e.addr == addr) {
            entries.remove(index);
        }
    }

    /// snapshot the entry at `index`, re-validating it is still in range.
    pub fn get(&self, index: usize) -> Option<ServerEntry> {
        self.entries.lock().get(index).cloned()
    }

    /// the next enabled entry at or after `index`, in registry order, used by
    /// both the first send attempt and failover.
    pub fn next_enabled_from(&self, index: usize) -> Option<(usize, ServerEntry)> {
        let entries = self.entries.lock();
        entries
            .iter()
            .enumerate()
            .skip(index)
            .find(|(_, e)| e.enabled)
            .map(|(i, e)| (i, e.clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(port: u16, enabled: bool) -> ServerEntry {
        ServerEntry {
            addr: ([127, 0, 0, 1], port).into(),
            secret: b"s3cret".to_vec(),
            policy: RetransPolicy {
                initial_timeout_ms: 250,
                max_timeout_ms: 4000,
                max_duration_ms: 0,
                max_retries: 3,
            },
            enabled,
        }
    }

    #[test]
    fn capacity_rounds_up_to_granularity() {
        let registry = ServerRegistry::new(5);
        for i in 0..8 {
            assert!(registry.add(entry(1812 + i, true)).is_ok());
        }
        assert!(matches!(registry.add(entry(1820, true)), Err(Error::NoCapacity)));
    }

    #[test]
    fn remove_preserves_order() {
        let registry = ServerRegistry::new(8);
        registry.add(entry(1, true)).unwrap();
        registry.add(entry(2, true)).unwrap();
        registry.add(entry(3, true)).unwrap();

        registry.remove(1);

        assert_eq!(registry.get(0).unwrap().addr.port(), 1);
        assert_eq!(registry.get(1).unwrap().addr.port(), 3);
        assert!(registry.get(2).is_none());
    }

    #[test]
    fn next_enabled_skips_disabled() {
        let registry = ServerRegistry::new(8);
        registry.add(entry(1, false)).unwrap();
        registry.add(entry(2, true)).unwrap();

        let (index, server) = registry.next_enabled_from(0).unwrap();
        assert_eq!(index, 1);
        assert_eq!(server.addr.port(), 2);
    }
}
