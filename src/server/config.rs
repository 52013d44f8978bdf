//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default listen port
pub const DEFAULT_PORT: u16 = 9000;

/// Default worker pool size
pub const DEFAULT_WORKERS: usize = 100;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum connections served at once; further clients wait in the
    /// listen backlog
    pub workers: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// The request head must arrive within this time
    pub request_timeout: Duration,

    /// Disconnect a client that accepts no data for this long
    pub write_timeout: Duration,

    /// Largest accepted request head in bytes
    pub max_request_head: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            workers: DEFAULT_WORKERS,
            tcp_nodelay: true, // Frames should leave as soon as they are written
            request_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(30),
            max_request_head: 8 * 1024,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the worker pool size (at least 1)
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}
