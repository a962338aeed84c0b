//! Frame encoding/decoding
//!
//! Frame format (CH340 relay boards):
//! - 1 byte: start marker `0xA0`
//! - 1 byte: selector (relay number, or `0x0F` for every relay)
//! - 1 byte: data (on/off value or query code)
//! - 1 byte: checksum, `(0xA0 + selector + data) & 0xFF`

use std::fmt;

use super::{RelayError, FRAME_LEN, START_BYTE};

/// A 4-byte relay command frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandFrame {
    /// Relay or group selector
    pub selector: u8,
    /// Value or query code
    pub data: u8,
}

/// Reasons a byte sequence is not a well-formed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDefect {
    /// Fewer than four bytes
    TooShort(usize),
    /// First byte is not `0xA0`
    BadStart(u8),
    /// Trailer does not match the computed checksum
    BadChecksum {
        /// Checksum computed from the first three bytes
        expected: u8,
        /// Trailer actually received
        actual: u8,
    },
}

impl fmt::Display for FrameDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameDefect::TooShort(n) => write!(f, "frame too short ({} bytes)", n),
            FrameDefect::BadStart(b) => write!(f, "missing start marker (got {:#04x})", b),
            FrameDefect::BadChecksum { expected, actual } => write!(
                f,
                "checksum mismatch: expected {:#04x}, got {:#04x}",
                expected, actual
            ),
        }
    }
}

impl CommandFrame {
    /// Create a frame from its selector and data bytes
    pub fn new(selector: u8, data: u8) -> Self {
        Self { selector, data }
    }

    /// Trailer byte for this frame
    pub fn checksum(&self) -> u8 {
        checksum(START_BYTE, self.selector, self.data)
    }

    /// Encode the frame to wire bytes
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        [START_BYTE, self.selector, self.data, self.checksum()]
    }

    /// Decode the first four bytes of `data` as a frame
    pub fn parse(data: &[u8]) -> Result<Self, FrameDefect> {
        if data.len() < FRAME_LEN {
            return Err(FrameDefect::TooShort(data.len()));
        }
        if data[0] != START_BYTE {
            return Err(FrameDefect::BadStart(data[0]));
        }

        let expected = checksum(data[0], data[1], data[2]);
        if data[3] != expected {
            return Err(FrameDefect::BadChecksum {
                expected,
                actual: data[3],
            });
        }

        Ok(Self::new(data[1], data[2]))
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.to_bytes();
        write!(f, "{:02X} {:02X} {:02X} {:02X}", b[0], b[1], b[2], b[3])
    }
}

fn checksum(b1: u8, b2: u8, b3: u8) -> u8 {
    b1.wrapping_add(b2).wrapping_add(b3)
}

/// Pass caller-supplied bytes through unchanged for the raw command
pub fn encode_raw(bytes: &[u8]) -> Vec<u8> {
    bytes.to_vec()
}

/// Parse hex tokens such as `["A0", "01", "01", "A2"]`, `["0xA0,0x01"]` or
/// `["A00101A2"]` into bytes
pub fn parse_hex_bytes<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<u8>, RelayError> {
    let joined = tokens
        .iter()
        .map(|t| t.as_ref())
        .collect::<Vec<_>>()
        .join(" ")
        .replace(',', " ");

    let mut data = Vec::new();
    for chunk in joined.split_whitespace() {
        let digits = chunk
            .strip_prefix("0x")
            .or_else(|| chunk.strip_prefix("0X"))
            .unwrap_or(chunk);

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RelayError::InvalidHex(format!("'{}'", chunk)));
        }
        if digits.len() % 2 != 0 {
            return Err(RelayError::InvalidHex(format!(
                "'{}' must have an even number of digits",
                chunk
            )));
        }

        for pair in digits.as_bytes().chunks(2) {
            // Pairs are ASCII hex digits, checked above
            let s = std::str::from_utf8(pair).map_err(|e| RelayError::InvalidHex(e.to_string()))?;
            let byte = u8::from_str_radix(s, 16).map_err(|e| RelayError::InvalidHex(e.to_string()))?;
            data.push(byte);
        }
    }

    if data.is_empty() {
        return Err(RelayError::InvalidHex("no hex bytes provided".to_string()));
    }
    Ok(data)
}
