//! HTTP stream server
//!
//! Each accepted connection becomes one session: read a request head, then
//! write a `multipart/x-mixed-replace` response carrying every frame the
//! session's subscription yields until the stream ends or the client leaves.

pub mod config;
pub mod connection;
pub mod listener;
pub mod multipart;
pub mod pool;
pub mod request;

pub use config::ServerConfig;
pub use connection::Connection;
pub use listener::StreamServer;
pub use pool::{WorkerPermit, WorkerPool};
pub use request::{Request, Route};
