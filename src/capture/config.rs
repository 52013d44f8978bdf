//! Capture configuration and source selection

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::Error;

use super::command::CommandSource;
use super::framing::FramedSource;
use super::mjpeg::MjpegSource;
use super::source::{AnySource, Input};

/// Default JPEG quality factor
pub const DEFAULT_JPEG_QUALITY: u8 = 40;

/// Default upper bound on a single frame
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// Highest accepted capture rate limit
pub const MAX_FPS: u32 = 1000;

/// Where frames come from, parsed from a source identifier
///
/// | identifier        | source                                       |
/// |-------------------|----------------------------------------------|
/// | `-`               | length-prefixed frames on stdin              |
/// | `framed:PATH`     | length-prefixed frames from a file or FIFO   |
/// | `mjpeg:PATH`      | raw concatenated JPEGs from a file or FIFO   |
/// | `PATH.mjpg`       | same as `mjpeg:PATH`                         |
/// | `N`, `/dev/...`   | camera through ffmpeg                        |
/// | `device:NAME`     | camera through ffmpeg                        |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Framed(Input),
    Mjpeg(PathBuf),
    Camera(String),
}

impl FromStr for SourceSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s == "-" {
            return Ok(SourceSpec::Framed(Input::Stdin));
        }
        if let Some(path) = s.strip_prefix("framed:") {
            return if path == "-" {
                Ok(SourceSpec::Framed(Input::Stdin))
            } else {
                non_empty(path).map(|p| SourceSpec::Framed(Input::Path(p.into())))
            };
        }
        if let Some(path) = s.strip_prefix("mjpeg:") {
            return non_empty(path).map(|p| SourceSpec::Mjpeg(p.into()));
        }
        if let Some(device) = s.strip_prefix("device:") {
            return non_empty(device).map(|d| SourceSpec::Camera(d.to_string()));
        }
        if (!s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())) || s.starts_with("/dev/") {
            return Ok(SourceSpec::Camera(s.to_string()));
        }

        let lower = s.to_ascii_lowercase();
        if lower.ends_with(".mjpg") || lower.ends_with(".mjpeg") {
            return Ok(SourceSpec::Mjpeg(s.into()));
        }

        Err(Error::Config(format!("unrecognized capture source '{}'", s)))
    }
}

fn non_empty(value: &str) -> Result<&str, Error> {
    if value.is_empty() {
        Err(Error::Config("empty capture source".into()))
    } else {
        Ok(value)
    }
}

impl std::fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSpec::Framed(Input::Stdin) => f.write_str("-"),
            SourceSpec::Framed(input) => write!(f, "framed:{}", input),
            SourceSpec::Mjpeg(path) => write!(f, "mjpeg:{}", path.display()),
            SourceSpec::Camera(device) => write!(f, "device:{}", device),
        }
    }
}

/// Capture configuration options
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Frame source
    pub source: SourceSpec,

    /// JPEG quality factor (0-100) used when the source encodes
    pub jpeg_quality: u8,

    /// Largest frame accepted from a source
    pub max_frame_size: usize,

    /// Cap on frames per second pulled from the source (None = as fast as it produces)
    pub max_fps: Option<u32>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SourceSpec::Camera("0".into()),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_fps: None,
        }
    }
}

impl CaptureConfig {
    /// Create a new config for the given source
    pub fn with_source(source: SourceSpec) -> Self {
        Self {
            source,
            ..Default::default()
        }
    }

    /// Set JPEG quality (capped at 100)
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.min(100);
        self
    }

    /// Set the maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Limit the capture rate (at most `MAX_FPS`); zero removes the limit
    pub fn max_fps(mut self, fps: u32) -> Self {
        self.max_fps = if fps == 0 { None } else { Some(fps.min(MAX_FPS)) };
        self
    }

    /// Build the configured source (not yet opened)
    pub fn build_source(&self) -> AnySource {
        match &self.source {
            SourceSpec::Framed(input) => {
                AnySource::Framed(FramedSource::new(input.clone(), self.max_frame_size))
            }
            SourceSpec::Mjpeg(path) => AnySource::Mjpeg(MjpegSource::new(
                Input::Path(path.clone()),
                self.max_frame_size,
            )),
            SourceSpec::Camera(device) => AnySource::Command(CommandSource::ffmpeg_camera(
                device,
                self.jpeg_quality,
                self.max_frame_size,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_spec() {
        assert_eq!("-".parse::<SourceSpec>().unwrap(), SourceSpec::Framed(Input::Stdin));
        assert_eq!(
            "framed:/tmp/feed".parse::<SourceSpec>().unwrap(),
            SourceSpec::Framed(Input::Path("/tmp/feed".into()))
        );
        assert_eq!(
            "mjpeg:/tmp/cam.raw".parse::<SourceSpec>().unwrap(),
            SourceSpec::Mjpeg("/tmp/cam.raw".into())
        );
        assert_eq!(
            "clip.MJPG".parse::<SourceSpec>().unwrap(),
            SourceSpec::Mjpeg("clip.MJPG".into())
        );
        assert_eq!("0".parse::<SourceSpec>().unwrap(), SourceSpec::Camera("0".into()));
        assert_eq!(
            "/dev/video2".parse::<SourceSpec>().unwrap(),
            SourceSpec::Camera("/dev/video2".into())
        );
        assert_eq!(
            "device:FaceTime HD".parse::<SourceSpec>().unwrap(),
            SourceSpec::Camera("FaceTime HD".into())
        );
    }

    #[test]
    fn test_parse_source_spec_invalid() {
        assert!(matches!("".parse::<SourceSpec>(), Err(Error::Config(_))));
        assert!(matches!("mjpeg:".parse::<SourceSpec>(), Err(Error::Config(_))));
        assert!(matches!("rtsp://cam".parse::<SourceSpec>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_source_spec_display() {
        assert_eq!(SourceSpec::Framed(Input::Stdin).to_string(), "-");
        assert_eq!(SourceSpec::Camera("0".into()).to_string(), "device:0");
    }

    #[test]
    fn test_source_spec_display_parses_back() {
        let specs = [
            SourceSpec::Framed(Input::Stdin),
            SourceSpec::Framed(Input::Path("stdin".into())),
            SourceSpec::Mjpeg("/tmp/cam.raw".into()),
            SourceSpec::Camera("/dev/video1".into()),
        ];
        for spec in specs {
            assert_eq!(spec.to_string().parse::<SourceSpec>().unwrap(), spec);
        }
    }

    #[test]
    fn test_default_config() {
        let config = CaptureConfig::default();

        assert_eq!(config.jpeg_quality, DEFAULT_JPEG_QUALITY);
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(config.max_fps, None);
        assert!(matches!(config.build_source(), AnySource::Command(_)));
    }

    #[test]
    fn test_builder_chaining() {
        let config = CaptureConfig::with_source(SourceSpec::Mjpeg("a.mjpg".into()))
            .jpeg_quality(250)
            .max_frame_size(1024)
            .max_fps(15);

        assert_eq!(config.jpeg_quality, 100);
        assert_eq!(config.max_frame_size, 1024);
        assert_eq!(config.max_fps, Some(15));
        assert!(matches!(config.build_source(), AnySource::Mjpeg(_)));

        assert_eq!(config.clone().max_fps(0).max_fps, None);
        assert_eq!(config.max_fps(5_000).max_fps, Some(MAX_FPS));
    }
}
