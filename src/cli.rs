//! Command line arguments for the `mjpeg-server` binary

use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use crate::capture::config::{DEFAULT_JPEG_QUALITY, MAX_FPS};
use crate::capture::{CaptureConfig, SourceSpec};
use crate::error::{Error, Result};
use crate::registry::config::{DEFAULT_QUEUE_CAPACITY, MAX_QUEUE_CAPACITY};
use crate::registry::RegistryConfig;
use crate::server::config::{DEFAULT_PORT, DEFAULT_WORKERS};
use crate::server::ServerConfig;

/// Default listen host
pub const DEFAULT_HOST: &str = "localhost";

/// Default capture source identifier (first camera)
pub const DEFAULT_SOURCE: &str = "0";

/// Parsed command line
#[derive(Debug, Clone)]
pub struct Cli {
    pub host: String,
    pub port: u16,
    pub source: SourceSpec,
    pub workers: usize,
    pub quality: u8,
    pub queue: usize,
    pub fps: Option<u32>,
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            source: SourceSpec::Camera(DEFAULT_SOURCE.to_string()),
            workers: DEFAULT_WORKERS,
            quality: DEFAULT_JPEG_QUALITY,
            queue: DEFAULT_QUEUE_CAPACITY,
            fps: None,
        }
    }
}

impl Cli {
    /// Parse arguments (without the program name)
    ///
    /// Returns `Ok(None)` when help was requested. Flags take their value
    /// either as the next argument or after `=`.
    pub fn parse<I, S>(args: I) -> Result<Option<Self>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cli = Cli::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            if arg == "-h" || arg == "--help" {
                return Ok(None);
            }

            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => {
                    (flag.to_string(), Some(value.to_string()))
                }
                _ => (arg.clone(), None),
            };

            let mut value = || {
                inline
                    .clone()
                    .or_else(|| args.next())
                    .ok_or_else(|| Error::Config(format!("missing value for {}", flag)))
            };

            match flag.as_str() {
                "--host" => cli.host = value()?,
                "--port" => cli.port = parse_number(&flag, &value()?)?,
                "--source" => cli.source = value()?.parse()?,
                "--workers" => {
                    cli.workers = parse_number(&flag, &value()?)?;
                    if cli.workers == 0 {
                        return Err(Error::Config("--workers must be at least 1".into()));
                    }
                }
                "--quality" => {
                    cli.quality = parse_number(&flag, &value()?)?;
                    if cli.quality > 100 {
                        return Err(Error::Config(format!(
                            "--quality must be between 0 and 100, got {}",
                            cli.quality
                        )));
                    }
                }
                "--queue" => {
                    cli.queue = parse_number(&flag, &value()?)?;
                    if !(1..=MAX_QUEUE_CAPACITY).contains(&cli.queue) {
                        return Err(Error::Config(format!(
                            "--queue must be between 1 and {}, got {}",
                            MAX_QUEUE_CAPACITY, cli.queue
                        )));
                    }
                }
                "--fps" => {
                    let fps: u32 = parse_number(&flag, &value()?)?;
                    if fps > MAX_FPS {
                        return Err(Error::Config(format!(
                            "--fps must be at most {}, got {}",
                            MAX_FPS, fps
                        )));
                    }
                    cli.fps = (fps > 0).then_some(fps);
                }
                _ => return Err(Error::Config(format!("unknown argument '{}'", flag))),
            }
        }

        Ok(Some(cli))
    }

    /// Resolve host and port to a listen address
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        resolve_bind_addr(&self.host, self.port)
    }

    /// Server configuration for these arguments
    pub fn server_config(&self) -> Result<ServerConfig> {
        Ok(ServerConfig::with_addr(self.bind_addr()?).workers(self.workers))
    }

    /// Registry configuration for these arguments
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig::default().queue_capacity(self.queue)
    }

    /// Capture configuration for these arguments
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig::with_source(self.source.clone())
            .jpeg_quality(self.quality)
            .max_fps(self.fps.unwrap_or(0))
    }
}

fn parse_number<T: FromStr>(flag: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value '{}' for {}", value, flag)))
}

/// Turn a host name or IP address plus port into a socket address
pub fn resolve_bind_addr(host: &str, port: u16) -> Result<SocketAddr> {
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| Error::Config(format!("cannot resolve host '{}'", host)))
}

/// Print usage to stderr
pub fn print_usage() {
    eprintln!("Usage: mjpeg-server [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --host HOST      Address to listen on (default: {})", DEFAULT_HOST);
    eprintln!("  --port PORT      Port to listen on (default: {})", DEFAULT_PORT);
    eprintln!("  --source SOURCE  Frame source (default: {})", DEFAULT_SOURCE);
    eprintln!("  --workers N      Connections served at once (default: {})", DEFAULT_WORKERS);
    eprintln!("  --quality Q      JPEG quality 0-100 (default: {})", DEFAULT_JPEG_QUALITY);
    eprintln!(
        "  --queue N        Frames buffered per viewer, 1-{} (default: {})",
        MAX_QUEUE_CAPACITY, DEFAULT_QUEUE_CAPACITY
    );
    eprintln!(
        "  --fps N          Cap on captured frames per second, up to {} (default: none)",
        MAX_FPS
    );
    eprintln!("  -h, --help       Print this help");
    eprintln!();
    eprintln!("Sources:");
    eprintln!("  0, /dev/video0, device:NAME   camera through ffmpeg");
    eprintln!("  -                             length-prefixed frames on stdin");
    eprintln!("  framed:PATH                   length-prefixed frames from a file or FIFO");
    eprintln!("  mjpeg:PATH, PATH.mjpg         concatenated JPEGs from a file or FIFO");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  mjpeg-server                              # camera 0 on localhost:9000");
    eprintln!("  mjpeg-server --host 0.0.0.0 --port 8080   # listen on all interfaces");
    eprintln!("  mjpeg-server --source clip.mjpg --fps 25  # replay a recording");
}
