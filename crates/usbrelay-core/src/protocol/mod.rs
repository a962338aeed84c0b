//! Relay Board Protocol
//!
//! Implements the 4-byte serial command protocol spoken by CH340-based
//! USB relay boards.
//!
//! Frame layout: `[0xA0, selector, data, checksum]` where the checksum is the
//! low byte of the sum of the first three bytes.

pub mod commands;
mod error;
pub mod frame;
pub mod response;
pub mod serial;
mod session;

pub use commands::{CommandEntry, CommandTable, Operation, RelayTarget, SelectorByte, TargetClass};
pub use error::RelayError;
pub use frame::{encode_raw, parse_hex_bytes, CommandFrame, FrameDefect};
pub use response::{decode_status, decode_text, to_hex, StatusSnapshot};
pub use serial::{
    filter_candidates, list_ports, resolve, resolve_port, select_default, KnownDevice, PortInfo,
    RELAY_BOARD_IDS,
};
pub use session::{Session, SessionConfig, Transport};

/// Default baud rate for relay boards
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default timeout for responses in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// First byte of every command frame
pub const START_BYTE: u8 = 0xA0;

/// Selector addressing every relay at once
pub const BROADCAST_SELECTOR: u8 = 0x0F;

/// Highest relay index addressable by the protocol
pub const MAX_RELAYS: u8 = 8;

/// Length of a command frame in bytes
pub const FRAME_LEN: usize = 4;
