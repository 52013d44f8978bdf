//! Embedded server fed from inside the process
//!
//! Run with: cargo run --example synthetic_feed [PORT]
//!
//! Produces a small JPEG-framed payload ten times a second through a
//! `ChannelSource`, so the fan-out can be watched without a camera:
//!
//!   curl -s http://localhost:9000/ | head -c 600 | xxd | head
//!
//! Viewers that stop reading lose frames; the feed never waits for them.

use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, BytesMut};

use mjpeg_rs::capture::ChannelSource;
use mjpeg_rs::server::config::DEFAULT_PORT;
use mjpeg_rs::{Broadcaster, Frame, ServerConfig, StreamServer};

fn synthetic_frame(seq: u64) -> Frame {
    let mut buf = BytesMut::with_capacity(12);
    buf.put_slice(&[0xFF, 0xD8]);
    buf.put_u64(seq);
    buf.put_slice(&[0xFF, 0xD9]);
    Frame::new(buf.freeze())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mjpeg_rs=debug".parse()?),
        )
        .init();

    let port = match std::env::args().nth(1) {
        Some(port) => port.parse()?,
        None => DEFAULT_PORT,
    };

    let broadcaster = Broadcaster::new(Default::default());
    let (feed, source) = ChannelSource::new(1);
    broadcaster.start(source).await?;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(100));
        for seq in 0u64.. {
            ticker.tick().await;
            if feed.send(synthetic_frame(seq)).await.is_err() {
                break;
            }
        }
    });

    let config = ServerConfig::with_addr(([127, 0, 0, 1], port).into()).workers(8);
    let server = StreamServer::new(config, Arc::clone(broadcaster.registry()));

    println!("Streaming synthetic frames on http://127.0.0.1:{}/", port);
    let listener = server.bind().await?;
    server
        .serve_until(&listener, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let totals = broadcaster.stats();
    println!(
        "Captured {} frames, {} deliveries, {} drops",
        totals.frames_captured, totals.deliveries, totals.drops
    );
    Ok(())
}
