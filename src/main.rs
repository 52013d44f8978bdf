//! MJPEG stream server
//!
//! Run with: mjpeg-server [OPTIONS]
//!
//! Examples:
//!   mjpeg-server                                   # camera 0, http://localhost:9000/
//!   mjpeg-server --host 0.0.0.0 --port 8080        # listen on all interfaces
//!   ffmpeg ... | mjpeg-server --source -           # length-prefixed frames on stdin
//!   mjpeg-server --source clip.mjpg --fps 25       # replay a recording
//!
//! ## Watching
//!
//! Open http://localhost:9000/ in a browser, or:
//!   ffplay -f mjpeg http://localhost:9000/
//!
//! Set `RUST_LOG` to change verbosity, e.g. `RUST_LOG=mjpeg_rs=debug`.

use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use mjpeg_rs::cli::{print_usage, Cli};
use mjpeg_rs::{Broadcaster, Result, StreamServer};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::parse(std::env::args().skip(1)) {
        Ok(Some(cli)) => cli,
        Ok(None) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mjpeg_rs=info,mjpeg_server=info")),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let server_config = cli.server_config()?;
    let capture = cli.capture_config();

    let broadcaster = Broadcaster::with_config(cli.registry_config()).max_fps(capture.max_fps);
    let server = StreamServer::new(server_config, Arc::clone(broadcaster.registry()));

    // Bind first so a taken port fails before the camera is opened
    let listener = server.bind().await?;

    tracing::info!(
        source = %capture.source,
        quality = capture.jpeg_quality,
        "Opening frame source"
    );
    let capture_task = broadcaster.start(capture.build_source()).await?;
    let capture_abort = capture_task.abort_handle();

    println!("Streaming on http://{}/", listener.local_addr()?);
    println!("Press Ctrl-C to stop");

    // Viewers finish on their own once the source ends; Ctrl-C cuts them off
    let source_ended = async {
        let _ = capture_task.await;
    };
    let result = server
        .serve_until_drained(&listener, source_ended, shutdown_signal())
        .await;
    capture_abort.abort();

    let totals = broadcaster.stats();
    tracing::info!(
        frames = totals.frames_captured,
        bytes = totals.bytes_captured,
        drops = totals.drops,
        "Server stopped"
    );

    result
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
