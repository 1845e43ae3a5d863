//! Raw termios serial ports
//!
//! Ports are opened non-blocking in raw 8N1 mode; reads and writes wait with
//! `poll(2)` so every operation is bounded by a timeout.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sg_error::{DispatchError, Result, SkyguardError};
use tracing::debug;

use super::AlertTransport;
use crate::config::DeviceSettings;

/// Wait up to `timeout` for `events` on `fd`; false on timeout
pub(crate) fn poll_ready(fd: RawFd, events: libc::c_short, timeout: Duration) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    // SAFETY: pfd is a single valid pollfd and nfds is 1
    let rc = unsafe { libc::poll(&mut pfd, 1, ms) };
    match rc {
        rc if rc < 0 => Err(io::Error::last_os_error()),
        0 => Ok(false),
        _ => Ok(true),
    }
}

fn baud_constant(baud: u32) -> Option<libc::speed_t> {
    Some(match baud {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        460800 => libc::B460800,
        921600 => libc::B921600,
        _ => return None,
    })
}

/// An open serial device
#[derive(Debug)]
pub struct SerialPort {
    path: PathBuf,
    file: File,
}

impl SerialPort {
    /// Open `path` in raw mode at `baud`
    pub fn open(path: &Path, baud: u32) -> Result<Self> {
        let speed = baud_constant(baud)
            .ok_or_else(|| SkyguardError::serial(path, format!("unsupported baud rate {}", baud)))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| SkyguardError::serial(path, e.to_string()))?;

        let fd = file.as_raw_fd();
        // SAFETY: termios is plain old data and fully overwritten by
        // tcgetattr before use. fd is a valid descriptor owned by `file`
        // for the whole block.
        let configured = unsafe {
            let mut tio: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(fd, &mut tio) != 0 {
                false
            } else {
                libc::cfmakeraw(&mut tio);
                tio.c_cflag |= libc::CLOCAL | libc::CREAD;
                tio.c_cflag &= !(libc::CSTOPB | libc::PARENB);
                tio.c_cc[libc::VMIN] = 0;
                tio.c_cc[libc::VTIME] = 0;
                libc::cfsetispeed(&mut tio, speed) == 0
                    && libc::cfsetospeed(&mut tio, speed) == 0
                    && libc::tcsetattr(fd, libc::TCSANOW, &tio) == 0
            }
        };
        if !configured {
            return Err(SkyguardError::serial(
                path,
                format!("termios setup failed: {}", io::Error::last_os_error()),
            ));
        }

        debug!("Opened serial port {:?} at {} baud", path, baud);
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until the descriptor is ready for `events` or `timeout` passes
    fn wait(&self, events: libc::c_short, timeout: Duration) -> io::Result<bool> {
        poll_ready(self.file.as_raw_fd(), events, timeout)
    }

    /// Write all of `data` within `timeout`
    pub fn write_all_timeout(&mut self, data: &[u8], timeout: Duration) -> io::Result<()> {
        let deadline = Instant::now() + timeout;
        let mut written = 0;
        while written < data.len() {
            match self.file.write(&data[written..]) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "serial write returned 0")),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() || !self.wait(libc::POLLOUT, remaining)? {
                        return Err(io::Error::new(io::ErrorKind::TimedOut, "serial write timed out"));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Read whatever is available within `timeout`; Ok(0) on timeout
    pub fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if !self.wait(libc::POLLIN, timeout)? {
            return Ok(0);
        }
        match self.file.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => Ok(0),
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// Alert transport
// ============================================================================

/// GSM/LoRa modem on a serial port, opened for each alert
pub struct SerialAlertTransport {
    path: PathBuf,
    baud: u32,
    timeout: Duration,
}

impl SerialAlertTransport {
    pub fn new(path: impl Into<PathBuf>, baud: u32, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            baud,
            timeout,
        }
    }

    pub fn from_settings(devices: &DeviceSettings) -> Self {
        Self::new(
            devices.alert_port.clone(),
            devices.alert_baud,
            Duration::from_millis(devices.alert_timeout_ms),
        )
    }
}

impl AlertTransport for SerialAlertTransport {
    fn send(&mut self, payload: &[u8]) -> std::result::Result<(), DispatchError> {
        // Port is closed when `port` drops, on every path
        let mut port = SerialPort::open(&self.path, self.baud).map_err(|e| {
            DispatchError::TransportUnavailable {
                device: self.path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        port.write_all_timeout(payload, self.timeout).map_err(|e| {
            if e.kind() == io::ErrorKind::TimedOut {
                DispatchError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            } else {
                DispatchError::Write(e.to_string())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_baud_table_covers_supported_rates() {
        for baud in crate::constants::devices::SUPPORTED_BAUD_RATES {
            assert!(baud_constant(*baud).is_some(), "missing {}", baud);
        }
        assert!(baud_constant(12345).is_none());
    }

    #[test]
    fn test_open_missing_device() {
        let dir = TempDir::new().unwrap();
        let err = SerialPort::open(&dir.path().join("ttyUSB9"), 9600).unwrap_err();
        assert!(matches!(err, SkyguardError::SerialPort { .. }));
    }

    #[test]
    fn test_open_regular_file_is_not_a_tty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("not-a-tty");
        std::fs::write(&path, "").unwrap();
        assert!(SerialPort::open(&path, 9600).is_err());
    }

    #[test]
    fn test_alert_transport_unavailable() {
        let dir = TempDir::new().unwrap();
        let mut transport =
            SerialAlertTransport::new(dir.path().join("ttyUSB0"), 9600, Duration::from_millis(100));
        let err = transport.send(b"ALERT").unwrap_err();
        assert!(matches!(err, DispatchError::TransportUnavailable { .. }));
    }
}
