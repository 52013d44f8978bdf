//! Per-connection session
//!
//! Reads one request, and for the stream path subscribes to the registry
//! and writes every pulled frame as a multipart part until the stream ends,
//! a write fails or stalls, or the server shuts down. The subscription is
//! released on every one of those paths.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::registry::SubscriberRegistry;
use crate::session::SessionState;
use crate::stats::SessionStats;

use super::config::ServerConfig;
use super::multipart::{part_header, response_header, status_response, Status};
use super::request::{read_request_head, Request, Route};

/// One client connection
pub struct Connection<S> {
    state: SessionState,
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    config: ServerConfig,
    registry: Arc<SubscriberRegistry>,
    shutdown: watch::Receiver<bool>,
    stats: SessionStats,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a new connection handler
    pub fn new(
        session_id: u64,
        stream: S,
        peer_addr: SocketAddr,
        config: ServerConfig,
        registry: Arc<SubscriberRegistry>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            state: SessionState::new(session_id, peer_addr),
            reader,
            writer,
            config,
            registry,
            shutdown,
            stats: SessionStats::new(),
        }
    }

    /// Session state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Statistics so far
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Serve the connection to completion
    ///
    /// The subscription is always released and the write side shut down
    /// before this returns, whatever the outcome.
    pub async fn run(&mut self) -> Result<()> {
        let result = match self.accept_request().await {
            Ok(true) => self.stream_frames().await,
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        };

        if let Some(dropped) = self.state.close() {
            self.stats.dropped_frames = dropped;
        }
        let _ = tokio::time::timeout(self.config.write_timeout, self.writer.shutdown()).await;

        tracing::debug!(
            session_id = self.state.id,
            frames_sent = self.stats.frames_sent,
            bytes_sent = self.stats.bytes_sent,
            dropped_frames = self.stats.dropped_frames,
            fps = self.stats.framerate(),
            duration_ms = self.stats.duration().as_millis() as u64,
            "Session closed"
        );

        result
    }

    /// Read and route the request; `true` means start streaming
    async fn accept_request(&mut self) -> Result<bool> {
        let request = match self.read_request().await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(false),
            Err(Error::InvalidRequest(reason)) => {
                tracing::debug!(session_id = self.state.id, reason = %reason, "Bad request");
                self.respond(Status::BadRequest).await?;
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        tracing::debug!(
            session_id = self.state.id,
            method = %request.method,
            target = %request.target,
            user_agent = request.header("User-Agent").unwrap_or("-"),
            "Request"
        );

        match request.route() {
            Route::Stream => Ok(true),
            Route::NotFound => {
                self.respond(Status::NotFound).await?;
                Ok(false)
            }
            Route::MethodNotAllowed => {
                self.respond(Status::MethodNotAllowed).await?;
                Ok(false)
            }
        }
    }

    async fn read_request(&mut self) -> Result<Option<Request>> {
        let timeout = self.config.request_timeout;
        let read = tokio::time::timeout(
            timeout,
            read_request_head(&mut self.reader, self.config.max_request_head),
        );

        let head = tokio::select! {
            head = read => head.map_err(|_| Error::Timeout(timeout))??,
            _ = wait_for_shutdown(&mut self.shutdown) => {
                tracing::debug!(session_id = self.state.id, "Server shutting down before request");
                return Ok(None);
            }
        };

        head.map(|head| Request::parse(&head)).transpose()
    }

    async fn respond(&mut self, status: Status) -> Result<()> {
        let response = status_response(status);
        write_timed(&mut self.writer, &[&response[..]], self.config.write_timeout).await
    }

    async fn stream_frames(&mut self) -> Result<()> {
        let Self {
            state,
            reader,
            writer,
            config,
            registry,
            shutdown,
            stats,
        } = self;

        let session_id = state.id;
        let subscription = state.start_streaming(registry)?;
        tracing::debug!(
            session_id = session_id,
            subscriber = %subscription.id(),
            "Streaming started"
        );

        let header = response_header();
        write_timed(writer, &[&header[..]], config.write_timeout).await?;
        stats.bytes_sent += header.len() as u64;

        let mut scratch = [0u8; 1024];
        let mut client_done_sending = false;
        loop {
            tokio::select! {
                // Queued frames are written before shutdown is honoured
                biased;

                frame = subscription.pull() => match frame {
                    Some(frame) => {
                        let part = part_header(frame.len());
                        write_timed(writer, &[&part[..], &frame.data()[..]], config.write_timeout)
                            .await?;
                        stats.record_frame(part.len() + frame.len());
                    }
                    None => {
                        tracing::debug!(session_id = session_id, "End of stream");
                        return Ok(());
                    }
                },
                read = reader.read(&mut scratch), if !client_done_sending => match read {
                    // A half-closed client may still be reading; a gone one
                    // surfaces as a failed write
                    Ok(0) => {
                        tracing::debug!(session_id = session_id, "Client finished sending");
                        client_done_sending = true;
                    }
                    // Anything the client sends while streaming is ignored
                    Ok(_) => {}
                    Err(e) => return Err(e.into()),
                },
                _ = wait_for_shutdown(shutdown) => {
                    tracing::debug!(session_id = session_id, "Server shutting down");
                    return Ok(());
                }
            }
        }
    }
}

/// Write all chunks and flush, failing if the peer stalls for `timeout`
async fn write_timed<W>(writer: &mut W, chunks: &[&[u8]], timeout: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let write = async {
        for chunk in chunks {
            writer.write_all(chunk).await?;
        }
        writer.flush().await
    };

    tokio::time::timeout(timeout, write)
        .await
        .map_err(|_| Error::Timeout(timeout))?
        .map_err(Error::from)
}

/// Resolve once shutdown is signalled or the server is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stop = *shutdown.borrow_and_update();
        if stop || shutdown.changed().await.is_err() {
            return;
        }
    }
}
