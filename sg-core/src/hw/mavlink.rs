//! MAVLink v1 vehicle link
//!
//! Just enough of the protocol to command the autopilot: v1 framing with the
//! X.25 checksum, `COMMAND_LONG` encoding and `HEARTBEAT` recognition for the
//! start-up handshake that resolves the target ids.
//!
//! # Frame layout
//!
//! ```text
//! STX(0xFE) LEN SEQ SYS COMP MSG PAYLOAD[LEN] CRC_LO CRC_HI
//! ```
//!
//! The checksum covers LEN..PAYLOAD followed by the message's CRC_EXTRA byte.

use std::time::{Duration, Instant};

use sg_error::{DispatchError, Result};
use tracing::{debug, info, warn};

use super::serial::SerialPort;
use super::VehicleLink;
use crate::config::DeviceSettings;
use crate::constants::mavlink::*;
use crate::data::{Ack, VehicleCommand};

/// Bytes around the payload: six header bytes and two checksum bytes
const FRAME_OVERHEAD: usize = 8;

/// Upper bound on a single command write
const WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

/// MAV_TYPE_GCS; heartbeats from other ground stations are not targets
const MAV_TYPE_GCS: u8 = 6;

// ============================================================================
// Checksum
// ============================================================================

/// Fold one byte into an X.25 (CRC-16/MCRF4XX) checksum
pub fn crc_accumulate(byte: u8, crc: u16) -> u16 {
    let mut tmp = byte ^ (crc & 0xff) as u8;
    tmp ^= tmp << 4;
    let tmp = tmp as u16;
    (crc >> 8) ^ (tmp << 8) ^ (tmp << 3) ^ (tmp >> 4)
}

pub fn x25_crc(data: &[u8]) -> u16 {
    data.iter().fold(0xffff, |crc, &b| crc_accumulate(b, crc))
}

fn crc_extra_for(msg_id: u8) -> Option<u8> {
    match msg_id {
        MSG_ID_HEARTBEAT => Some(CRC_EXTRA_HEARTBEAT),
        MSG_ID_COMMAND_LONG => Some(CRC_EXTRA_COMMAND_LONG),
        _ => None,
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Build a complete v1 frame
pub fn encode_frame(seq: u8, sys: u8, comp: u8, msg_id: u8, payload: &[u8], crc_extra: u8) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    frame.extend_from_slice(&[STX_V1, payload.len() as u8, seq, sys, comp, msg_id]);
    frame.extend_from_slice(payload);

    let crc = crc_accumulate(crc_extra, x25_crc(&frame[1..]));
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// `COMMAND_LONG` payload; fields are in wire order (largest type first)
pub fn command_long_payload(
    command: &VehicleCommand,
    target_system: u8,
    target_component: u8,
) -> [u8; COMMAND_LONG_LEN] {
    let mut payload = [0u8; COMMAND_LONG_LEN];
    for (i, param) in command.params.iter().enumerate() {
        payload[i * 4..i * 4 + 4].copy_from_slice(&param.to_le_bytes());
    }
    payload[28..30].copy_from_slice(&command.command.to_le_bytes());
    payload[30] = target_system;
    payload[31] = target_component;
    payload[32] = command.confirmation;
    payload
}

// ============================================================================
// Decoding
// ============================================================================

/// A checksum-verified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub seq: u8,
    pub system_id: u8,
    pub component_id: u8,
    pub msg_id: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// The sender's MAV_TYPE if this is a heartbeat
    pub fn heartbeat_type(&self) -> Option<u8> {
        (self.msg_id == MSG_ID_HEARTBEAT && self.payload.len() >= HEARTBEAT_LEN)
            .then(|| self.payload[4])
    }
}

/// Incremental frame decoder
///
/// Frames whose message id has no known CRC_EXTRA cannot be verified and are
/// skipped whole; bad checksums resynchronise on the next start marker.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: Vec<u8>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next verified frame, if a complete one is buffered
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let start = self.buf.iter().position(|&b| b == STX_V1)?;
            self.buf.drain(..start);

            if self.buf.len() < 2 {
                return None;
            }
            let total = self.buf[1] as usize + FRAME_OVERHEAD;
            if self.buf.len() < total {
                return None;
            }

            let msg_id = self.buf[5];
            let Some(extra) = crc_extra_for(msg_id) else {
                self.buf.drain(..total);
                continue;
            };

            let body_end = total - 2;
            let expected = crc_accumulate(extra, x25_crc(&self.buf[1..body_end]));
            let received = u16::from_le_bytes([self.buf[body_end], self.buf[body_end + 1]]);
            if expected != received {
                debug!(msg_id, "Dropping MAVLink frame with bad checksum");
                self.buf.drain(..1);
                continue;
            }

            let frame = Frame {
                seq: self.buf[2],
                system_id: self.buf[3],
                component_id: self.buf[4],
                msg_id,
                payload: self.buf[6..body_end].to_vec(),
            };
            self.buf.drain(..total);
            return Some(frame);
        }
    }
}

// ============================================================================
// Link
// ============================================================================

/// Command link to the autopilot over a serial port
pub struct MavlinkLink {
    port: SerialPort,
    seq: u8,
    target_system: u8,
    target_component: u8,
}

impl MavlinkLink {
    /// Open the port and wait up to the handshake timeout for a vehicle
    /// heartbeat; without one the default targets are used
    pub fn open(devices: &DeviceSettings) -> Result<Self> {
        let port = SerialPort::open(&devices.vehicle_port, devices.vehicle_baud)?;
        let mut link = Self {
            port,
            seq: 0,
            target_system: DEFAULT_TARGET_SYSTEM,
            target_component: DEFAULT_TARGET_COMPONENT,
        };

        match link.wait_heartbeat(Duration::from_millis(devices.vehicle_handshake_ms)) {
            Some((system, component)) => {
                info!(system, component, "Vehicle heartbeat received");
                link.target_system = system;
                link.target_component = component;
            }
            None => warn!(
                "No vehicle heartbeat within {} ms, targeting system {} component {}",
                devices.vehicle_handshake_ms, link.target_system, link.target_component
            ),
        }

        Ok(link)
    }

    fn wait_heartbeat(&mut self, timeout: Duration) -> Option<(u8, u8)> {
        let deadline = Instant::now() + timeout;
        let mut parser = FrameParser::new();
        let mut buf = [0u8; 256];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match self.port.read_timeout(&mut buf, remaining) {
                Ok(n) => parser.push(&buf[..n]),
                Err(e) => {
                    warn!("Vehicle link read failed during handshake: {}", e);
                    return None;
                }
            }
            while let Some(frame) = parser.next_frame() {
                match frame.heartbeat_type() {
                    Some(kind) if kind != MAV_TYPE_GCS && frame.system_id != GCS_SYSTEM_ID => {
                        return Some((frame.system_id, frame.component_id));
                    }
                    _ => {}
                }
            }
        }
    }

    pub fn targets(&self) -> (u8, u8) {
        (self.target_system, self.target_component)
    }
}

impl VehicleLink for MavlinkLink {
    fn send_command(&mut self, command: &VehicleCommand) -> std::result::Result<Ack, DispatchError> {
        let payload = command_long_payload(command, self.target_system, self.target_component);
        let sequence = self.seq;
        let frame = encode_frame(
            sequence,
            GCS_SYSTEM_ID,
            GCS_COMPONENT_ID,
            MSG_ID_COMMAND_LONG,
            &payload,
            CRC_EXTRA_COMMAND_LONG,
        );

        self.port.write_all_timeout(&frame, WRITE_TIMEOUT).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                DispatchError::LinkUnresponsive(format!("{:?}: write timed out", self.port.path()))
            } else {
                DispatchError::Write(e.to_string())
            }
        })?;
        self.seq = self.seq.wrapping_add(1);

        Ok(Ack {
            target_system: self.target_system,
            target_component: self.target_component,
            sequence,
        })
    }
}
