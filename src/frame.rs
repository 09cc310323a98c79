use std::ops::Range;

use crate::checksum::checksum;
use crate::error::{Result, SerialError};

pub const FRAME_LEN: usize = 7;
pub const CHECKSUM_INDEX: usize = 5;
/// Bytes covered by the checksum: second header byte, command, payload.
pub const CHECKSUM_RANGE: Range<usize> = 1..5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    pub header: [u8; 2],
    pub command: u8,
    pub payload: [u8; 2],
    pub trailer: u8,
}

impl CommandFrame {
    /// Build the 7-byte raw frame expected by the device.
    /// Layout (7 bytes total):
    /// [0..2) header marker
    /// [2]    command
    /// [3..5) payload / address
    /// [5]    checksum over [1..5)
    /// [6]    trailer
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];

        frame[0..2].copy_from_slice(&self.header);
        frame[2] = self.command;
        frame[3..5].copy_from_slice(&self.payload);
        frame[6] = self.trailer;

        seal(&mut frame);
        frame
    }

    /// Parse a received frame, rejecting bad lengths and checksums.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let frame: &[u8; FRAME_LEN] = raw
            .try_into()
            .map_err(|_| SerialError::InvalidFrame(raw.len()))?;

        let expected = checksum(&frame[CHECKSUM_RANGE]);
        let actual = frame[CHECKSUM_INDEX];
        if expected != actual {
            return Err(SerialError::ChecksumMismatch { expected, actual });
        }

        Ok(Self {
            header: [frame[0], frame[1]],
            command: frame[2],
            payload: [frame[3], frame[4]],
            trailer: frame[6],
        })
    }
}

/// Insert the checksum into an already laid out frame buffer.
pub fn seal(frame: &mut [u8; FRAME_LEN]) {
    frame[CHECKSUM_INDEX] = checksum(&frame[CHECKSUM_RANGE]);
}
