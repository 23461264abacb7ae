use anyhow::{Context, Result, bail};
use bytes::BytesMut;

use engine::{Callback, Client, Error, QueryId, RetransPolicy, ServerEntry, Settings};

use crate::config::Config;

/// application-facing wrapper around [`engine::Client`]: builds its settings
/// and server registry from a loaded [`Config`] and re-exports the pieces a
/// caller needs without pulling in the engine crate directly.
pub struct RadiusClient {
    inner: Client,
}

impl RadiusClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = Settings {
            servers_max: config.client.servers_max,
            queue_max_per_thread: config.client.queue_max_per_thread,
            sockets_min_per_thread: config.client.sockets_min_per_thread,
            sockets_max_per_thread: config.client.sockets_max_per_thread,
            socket_rcv_buf: config.client.socket_rcv_buf,
            socket_snd_buf: config.client.socket_snd_buf,
            nas_identifier: config.client.nas_identifier.as_bytes().to_vec(),
        };

        let inner = Client::new(config.client.threads.max(1), settings)
            .context("failed to start radius client engine")?;

        for server in &config.servers {
            if server.shared_secret.len() > 128 {
                bail!("shared secret for {} exceeds 128 bytes", server.addr);
            }

            inner
                .server_add(ServerEntry {
                    addr: server.addr,
                    secret: server.shared_secret.as_bytes().to_vec(),
                    policy: RetransPolicy {
                        initial_timeout_ms: server.retrans_time_init,
                        max_timeout_ms: server.retrans_time_max,
                        max_duration_ms: server.retrans_duration_max,
                        max_retries: server.retrans_count_max,
                    },
                    enabled: server.enabled,
                })
                .context("server registry exhausted while loading configuration")?;
        }

        Ok(Self { inner })
    }

    pub fn thread_count(&self) -> usize {
        self.inner.thread_count()
    }

    /// enqueue `buf` from worker `originator` to be sent by worker
    /// `target_worker`, letting the engine assign the RADIUS packet ID.
    pub fn query(
        &self,
        originator: usize,
        target_worker: usize,
        buf: BytesMut,
        callback: Callback,
    ) -> Result<engine::QueryHandle, Error> {
        self.inner.query(originator, target_worker, QueryId::Auto, buf, callback)
    }

    pub fn query_cancel(&self, handle: engine::QueryHandle) {
        self.inner.query_cancel(handle);
    }

    pub fn destroy(self) {
        self.inner.destroy();
    }
}
