//! Camera capture through an external encoder process
//!
//! JPEG encoding of camera frames is delegated to `ffmpeg`, which writes a
//! raw MJPEG stream to its stdout. The child is killed when the source is
//! dropped.

use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::error::{Error, Result};
use crate::registry::Frame;

use super::mjpeg::MjpegSource;
use super::source::FrameSource;

/// Default encoder program
pub const FFMPEG: &str = "ffmpeg";

/// Map a JPEG quality factor (0-100, higher is better) to ffmpeg's `-q:v`
/// scale (2-31, lower is better).
pub fn ffmpeg_qscale(quality: u8) -> u8 {
    let quality = u32::from(quality.min(100));
    (31 - quality * 29 / 100) as u8
}

/// Resolve a camera identifier to a capture device
///
/// A bare index `N` becomes `/dev/videoN` on Linux and stays an index for
/// AVFoundation on macOS.
pub fn camera_device(id: &str) -> String {
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
        if cfg!(target_os = "macos") {
            id.to_string()
        } else {
            format!("/dev/video{}", id)
        }
    } else {
        id.to_string()
    }
}

fn capture_format() -> &'static str {
    if cfg!(target_os = "macos") {
        "avfoundation"
    } else {
        "v4l2"
    }
}

/// Frame source backed by a child process emitting MJPEG on stdout
pub struct CommandSource {
    program: String,
    args: Vec<String>,
    max_frame_size: usize,
    child: Option<Child>,
    frames: Option<MjpegSource>,
    /// First frame, read during `open` to prove the device works
    first: Option<Frame>,
}

impl CommandSource {
    /// Source running `program args...`
    pub fn new(program: impl Into<String>, args: Vec<String>, max_frame_size: usize) -> Self {
        Self {
            program: program.into(),
            args,
            max_frame_size,
            child: None,
            frames: None,
            first: None,
        }
    }

    /// ffmpeg capturing from a camera and encoding at the given JPEG quality
    pub fn ffmpeg_camera(camera: &str, quality: u8, max_frame_size: usize) -> Self {
        let device = camera_device(camera);
        let qscale = ffmpeg_qscale(quality).to_string();
        let args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            capture_format(),
            "-i",
            device.as_str(),
            "-f",
            "mjpeg",
            "-q:v",
            qscale.as_str(),
            "-",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Self::new(FFMPEG, args, max_frame_size)
    }

    /// Command line, for logging
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn reap(&mut self) {
        if let Some(mut child) = self.child.take() {
            match child.wait().await {
                Ok(status) => tracing::info!(status = %status, "Capture process exited"),
                Err(e) => tracing::warn!(error = %e, "Failed to reap capture process"),
            }
        }
    }
}

impl FrameSource for CommandSource {
    async fn open(&mut self) -> Result<()> {
        if self.frames.is_some() {
            return Ok(());
        }

        tracing::debug!(command = %self.command_line(), "Spawning capture process");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::SourceUnavailable(format!("{}: {}", self.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::SourceUnavailable("capture process has no stdout".into()))?;

        let mut frames = MjpegSource::from_reader(stdout, self.max_frame_size);
        self.child = Some(child);

        // An unusable device makes the encoder exit before producing anything
        match frames.next_frame().await {
            Ok(Some(frame)) => {
                self.first = Some(frame);
                self.frames = Some(frames);
                Ok(())
            }
            Ok(None) => {
                self.reap().await;
                Err(Error::SourceUnavailable(format!(
                    "{} exited before producing a frame",
                    self.program
                )))
            }
            Err(e) => {
                self.reap().await;
                Err(Error::SourceUnavailable(e.to_string()))
            }
        }
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.first.take() {
            return Ok(Some(frame));
        }

        let frames = self
            .frames
            .as_mut()
            .ok_or_else(|| Error::SourceUnavailable("source not opened".into()))?;

        let next = frames.next_frame().await?;
        if next.is_none() {
            self.reap().await;
        }
        Ok(next)
    }
}
