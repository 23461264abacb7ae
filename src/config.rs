use std::fs::read_to_string;
use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;

/// per-server retransmission policy, straight off the wire settings in §6:
/// a zero `max` field means "unlimited" and is left as-is for the engine to
/// interpret that way.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Server {
    ///
    /// destination address (IP + port); the family picks which per-thread
    /// socket pool this server is serviced by.
    ///
    pub addr: SocketAddr,
    ///
    /// shared secret used to sign requests and verify replies. Rejected by
    /// the engine at query time if it exceeds 128 bytes.
    ///
    pub shared_secret: String,
    #[serde(default = "Server::retrans_time_init")]
    pub retrans_time_init: u64,
    ///
    /// 0 = unlimited.
    ///
    #[serde(default)]
    pub retrans_time_max: u64,
    ///
    /// 0 = unlimited.
    ///
    #[serde(default)]
    pub retrans_duration_max: u64,
    ///
    /// 0 = unlimited.
    ///
    #[serde(default)]
    pub retrans_count_max: u32,
    #[serde(default = "Server::enabled")]
    pub enabled: bool,
}

impl Server {
    fn retrans_time_init() -> u64 {
        250
    }

    fn enabled() -> bool {
        true
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Client {
    ///
    /// maximum number of servers the registry can hold; rounded up to a
    /// multiple of 4 by the engine.
    ///
    #[serde(default = "Client::servers_max")]
    pub servers_max: usize,
    ///
    /// capacity of each worker thread's inbound message queue.
    ///
    #[serde(default = "Client::queue_max_per_thread")]
    pub queue_max_per_thread: usize,
    #[serde(default = "Client::sockets_min_per_thread")]
    pub sockets_min_per_thread: usize,
    #[serde(default = "Client::sockets_max_per_thread")]
    pub sockets_max_per_thread: usize,
    #[serde(default = "Client::socket_buf")]
    pub socket_rcv_buf: usize,
    #[serde(default = "Client::socket_buf")]
    pub socket_snd_buf: usize,
    ///
    /// appended as a NAS-Identifier attribute to every Access-Request;
    /// must be 253 bytes or fewer.
    ///
    #[serde(default)]
    pub nas_identifier: String,
    ///
    /// number of worker threads. Callers enqueue queries from one of these
    /// same threads, identified by its index - see `radius_client::client`.
    ///
    #[serde(default = "Client::threads")]
    pub threads: usize,
}

impl Client {
    fn servers_max() -> usize {
        4
    }

    fn queue_max_per_thread() -> usize {
        1024
    }

    fn sockets_min_per_thread() -> usize {
        1
    }

    fn sockets_max_per_thread() -> usize {
        4
    }

    fn socket_buf() -> usize {
        128 * 1024
    }

    fn threads() -> usize {
        num_cpus::get()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self {
            servers_max: Self::servers_max(),
            queue_max_per_thread: Self::queue_max_per_thread(),
            sockets_min_per_thread: Self::sockets_min_per_thread(),
            sockets_max_per_thread: Self::sockets_max_per_thread(),
            socket_rcv_buf: Self::socket_buf(),
            socket_snd_buf: Self::socket_buf(),
            nas_identifier: String::new(),
            threads: Self::threads(),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match value {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => return Err(format!("unknown log level: {value}")),
        })
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub client: Client,
    ///
    /// servers are tried in this order; an entry with `enabled = false` is
    /// skipped without counting against any query's retry budget.
    ///
    #[serde(default)]
    pub servers: Vec<Server>,
    #[serde(default)]
    pub log: Log,
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
)]
struct Cli {
    ///
    /// Specify the configuration file path
    ///
    /// Example: radius-client --config /etc/radius-client/config.json5
    ///
    #[arg(long, short)]
    config: Option<String>,
}

impl Config {
    ///
    /// Load configuration from the file named by `--config`, or fall back
    /// to an empty-registry default if no path was given.
    ///
    pub fn load() -> Result<Self> {
        match Cli::parse().config {
            Some(path) => Ok(serde_json5::from_str::<Self>(&read_to_string(path)?)?),
            None => Ok(Self::default()),
        }
    }
}
