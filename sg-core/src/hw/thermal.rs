//! Thermal frame source
//!
//! The camera is read by a separate acquisition helper that publishes each
//! frame as text (one temperature per sample, separated by whitespace or
//! commas) to a file or FIFO. Each `read_frame` reads one whole frame, up to
//! end of file. The source is opened non-blocking and the read is bounded by
//! a timeout, so a stalled helper fails the iteration instead of hanging it.

use std::fs::OpenOptions;
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sg_error::{Result, SensorError, SkyguardError};
use tracing::info;

use super::serial::poll_ready;
use super::ThermalSensor;

/// Parse one textual frame into samples, in order
pub fn parse_frame(text: &str) -> std::result::Result<Vec<f32>, SensorError> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .enumerate()
        .map(|(i, token)| {
            token
                .parse::<f32>()
                .map_err(|_| SensorError::malformed("thermal", format!("sample {} is not a number: {:?}", i, token)))
        })
        .collect()
}

pub struct FrameFileSource {
    path: PathBuf,
    timeout: Duration,
}

impl FrameFileSource {
    /// A missing frame source is a fatal start-up error
    pub fn open(path: &Path, timeout: Duration) -> Result<Self> {
        if !path.exists() {
            return Err(SkyguardError::HardwareNotFound(format!(
                "thermal frame source {:?} does not exist",
                path
            )));
        }
        info!("Reading thermal frames from {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
            timeout,
        })
    }

    fn read_error(&self, e: io::Error) -> SensorError {
        SensorError::read("thermal", format!("{:?}: {}", self.path, e))
    }

    fn timed_out(&self) -> SensorError {
        SensorError::Timeout {
            sensor: "thermal",
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }

    /// Read the source to end of file within the timeout
    fn read_text(&self) -> std::result::Result<String, SensorError> {
        let mut file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path)
            .map_err(|e| self.read_error(e))?;

        let deadline = Instant::now() + self.timeout;
        let mut bytes = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match file.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    bytes.extend_from_slice(&chunk[..n]);
                    if Instant::now() >= deadline {
                        return Err(self.timed_out());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    let ready = poll_ready(file.as_raw_fd(), libc::POLLIN, remaining)
                        .map_err(|e| self.read_error(e))?;
                    if !ready {
                        return Err(self.timed_out());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(self.read_error(e)),
            }
        }

        String::from_utf8(bytes).map_err(|_| SensorError::malformed("thermal", "frame is not valid UTF-8"))
    }
}

impl ThermalSensor for FrameFileSource {
    fn read_frame(&mut self) -> std::result::Result<Vec<f32>, SensorError> {
        let text = self.read_text()?;
        let samples = parse_frame(&text)?;
        if samples.is_empty() {
            return Err(SensorError::malformed("thermal", "empty frame"));
        }
        Ok(samples)
    }
}
