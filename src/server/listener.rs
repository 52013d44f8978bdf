//! Stream server listener
//!
//! Handles the TCP accept loop and spawns one session task per connection,
//! never more at once than the worker pool allows.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::error::Result;
use crate::registry::SubscriberRegistry;

use super::config::ServerConfig;
use super::connection::Connection;
use super::pool::{WorkerPermit, WorkerPool};

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// MJPEG stream server
pub struct StreamServer {
    config: ServerConfig,
    registry: Arc<SubscriberRegistry>,
    pool: WorkerPool,
    next_session_id: AtomicU64,
    shutdown: watch::Sender<bool>,
}

impl StreamServer {
    /// Create a new server serving frames from `registry`
    pub fn new(config: ServerConfig, registry: Arc<SubscriberRegistry>) -> Self {
        let pool = WorkerPool::new(config.workers);
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            registry,
            pool,
            next_session_id: AtomicU64::new(1),
            shutdown,
        }
    }

    /// Get a reference to the subscriber registry
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Worker pool bounding concurrent sessions
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            workers = self.pool.capacity(),
            "Stream server listening"
        );
        Ok(listener)
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(&listener).await
    }

    /// Serve an already bound listener
    ///
    /// Never returns on its own. Fails with `Error::PoolClosed` once the
    /// worker pool has been closed.
    pub async fn serve(&self, listener: &TcpListener) -> Result<()> {
        self.accept_loop(listener).await
    }

    /// Serve an already bound listener until `shutdown` resolves
    ///
    /// On shutdown the accept loop stops, every live session is told to
    /// close, and this waits for them to finish.
    pub async fn serve_until<F>(&self, listener: &TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let result = tokio::select! {
            _ = shutdown => Ok(()),
            result = self.accept_loop(listener) => result,
        };

        tracing::info!("Shutdown signal received");
        self.close_sessions().await;
        result
    }

    /// Serve until the frame source ends, then let sessions drain
    ///
    /// Once `source_ended` resolves no new connections are accepted. Live
    /// sessions keep writing what they have queued and close when they see
    /// end of stream. `shutdown` interrupts at any point, draining or not.
    pub async fn serve_until_drained<D, F>(
        &self,
        listener: &TcpListener,
        source_ended: D,
        shutdown: F,
    ) -> Result<()>
    where
        D: Future<Output = ()>,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let result = tokio::select! {
            _ = &mut shutdown => None,
            _ = source_ended => Some(Ok(())),
            result = self.accept_loop(listener) => Some(result),
        };

        if let Some(result) = result {
            tracing::info!(sessions = self.pool.active(), "Stopped accepting, draining sessions");
            tokio::select! {
                _ = self.pool.wait_idle() => {
                    self.pool.close();
                    return result;
                }
                _ = &mut shutdown => {}
            }
        }

        tracing::info!("Shutdown signal received");
        self.close_sessions().await;
        Ok(())
    }

    /// Tell every live session to close
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Signal sessions, wait for them to finish, then stop handing out slots
    async fn close_sessions(&self) {
        self.shutdown();
        // Only fails once the pool is already closed
        let _ = self.pool.wait_idle().await;
        self.pool.close();
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            // Waiting here leaves excess clients queued in the listen backlog
            let permit = self.pool.acquire().await?;

            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr, permit);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr, permit: WorkerPermit) {
        // Generate session ID
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            active = self.pool.active(),
            "New connection"
        );

        // Configure socket
        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        // Spawn connection handler
        let config = self.config.clone();
        let registry = Arc::clone(&self.registry);
        let shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let _permit = permit;
            let mut connection =
                Connection::new(session_id, socket, peer_addr, config, registry, shutdown);

            if let Err(e) = connection.run().await {
                if e.is_disconnect() {
                    tracing::debug!(session_id = session_id, error = %e, "Connection dropped");
                } else {
                    tracing::warn!(session_id = session_id, error = %e, "Connection error");
                }
            }

            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let config = ServerConfig::with_addr("127.0.0.1:0".parse().unwrap());
        let server = StreamServer::new(config, Arc::new(SubscriberRegistry::new()));

        let listener = server.bind().await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_conflict_fails() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServerConfig::with_addr(taken.local_addr().unwrap());
        let server = StreamServer::new(config, Arc::new(SubscriberRegistry::new()));

        assert!(server.bind().await.is_err());
    }

    #[tokio::test]
    async fn test_serve_until_stops() {
        let config = ServerConfig::with_addr("127.0.0.1:0".parse().unwrap());
        let server = StreamServer::new(config, Arc::new(SubscriberRegistry::new()));
        let listener = server.bind().await.unwrap();

        server.serve_until(&listener, async {}).await.unwrap();
        assert_eq!(server.pool().active(), 0);
    }

    #[tokio::test]
    async fn test_serve_until_drained_returns_when_idle() {
        let config = ServerConfig::with_addr("127.0.0.1:0".parse().unwrap());
        let server = StreamServer::new(config, Arc::new(SubscriberRegistry::new()));
        let listener = server.bind().await.unwrap();

        server
            .serve_until_drained(&listener, async {}, std::future::pending())
            .await
            .unwrap();
        assert!(!*server.shutdown.borrow());
        assert!(server.pool().acquire().await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_drain() {
        let config = ServerConfig::with_addr("127.0.0.1:0".parse().unwrap());
        let server = StreamServer::new(config, Arc::new(SubscriberRegistry::new()));
        let listener = server.bind().await.unwrap();
        let busy = server.pool().acquire().await.unwrap();

        let stop = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
        };
        tokio::time::timeout(
            Duration::from_secs(2),
            server.serve_until_drained(&listener, async {}, async {
                stop.await;
                drop(busy);
            }),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(*server.shutdown.borrow());
    }
}
