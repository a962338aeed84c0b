//! Protocol errors

use thiserror::Error;

use super::{Operation, RelayTarget, TargetClass, MAX_RELAYS};

/// Errors that can occur while talking to a relay board
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Relay number must be between 1 and {max}; got {0}", max = MAX_RELAYS)]
    InvalidRelay(u32),

    #[error("Relay target must be 'all' or a number between 1 and {max}; got '{0}'", max = MAX_RELAYS)]
    InvalidTarget(String),

    #[error("Pulse duration must be a positive number of seconds within timer range; got {0}")]
    InvalidDuration(f64),

    #[error("Timeout must be a positive number of seconds within timer range; got {0}")]
    InvalidTimeout(f64),

    #[error("Channel count must be between 1 and {max}; got {0}", max = MAX_RELAYS)]
    InvalidChannelCount(u8),

    #[error("No command table entry for {operation} on {target}")]
    UnsupportedOperation {
        target: TargetClass,
        operation: Operation,
    },

    #[error("Invalid hex byte sequence: {0}")]
    InvalidHex(String),

    #[error("No serial ports found on this system.")]
    NoPortsAvailable,

    #[error("Port not found: {0}. Run `relay list-ports` to see valid ports.")]
    PortNotFound(String),

    #[error("Could not open serial port '{port}': {source}")]
    Connect {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Serial write failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("Serial read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("{target} {operation} stopped at {failed} after {sent} frame(s) went out: {source}")]
    SwitchInterrupted {
        target: RelayTarget,
        operation: Operation,
        failed: RelayTarget,
        sent: usize,
        #[source]
        source: Box<RelayError>,
    },

    #[error("No response from the board for {0}")]
    ReadTimeout(RelayTarget),

    #[error("Failed to switch {target} on: {source}")]
    PulseOnFailed {
        target: RelayTarget,
        #[source]
        source: Box<RelayError>,
    },

    #[error("{target} was switched on but switching it off failed ({source}); the relay may still be energized")]
    PulsePartialFailure {
        target: RelayTarget,
        #[source]
        source: Box<RelayError>,
    },
}

impl RelayError {
    /// True for errors raised locally before any port is touched
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RelayError::InvalidRelay(_)
                | RelayError::InvalidTarget(_)
                | RelayError::InvalidDuration(_)
                | RelayError::InvalidTimeout(_)
                | RelayError::InvalidChannelCount(_)
                | RelayError::UnsupportedOperation { .. }
                | RelayError::InvalidHex(_)
        )
    }

    /// True when a failure may have left a relay energized
    pub fn may_leave_relay_on(&self) -> bool {
        match self {
            RelayError::PulsePartialFailure { .. } => true,
            RelayError::SwitchInterrupted {
                operation, sent, ..
            } => *operation == Operation::On && *sent > 0,
            RelayError::PulseOnFailed { source, .. } => source.may_leave_relay_on(),
            _ => false,
        }
    }
}
