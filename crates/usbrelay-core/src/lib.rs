//! # usbrelay Core Library
//!
//! Core functionality for driving USB serial multi-relay boards (CH340 style,
//! 1 to 8 relays) that speak the fixed 4-byte `A0 <selector> <data> <sum>`
//! command protocol.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Frame encoding/decoding driven by a static command table
//! - Serial port discovery and relay-board identity filtering
//! - A blocking transport session over one serial connection
//! - The relay controller (on, off, pulse, status, raw)
//!
//! ## Example
//!
//! ```rust,ignore
//! use usbrelay_core::prelude::*;
//!
//! let ports = list_ports();
//! let port = resolve_port(None, &ports)?;
//!
//! let session = Session::open(&SessionConfig::new(&port.path))?;
//! let mut controller = RelayController::new(session, ControllerConfig::default());
//!
//! controller.pulse(RelayTarget::single(2)?, 0.5)?;
//! let report = controller.query_status(RelayTarget::All)?;
//! println!("{}", report);
//! ```

pub mod controller;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::controller::{
        pulse_duration, AllMode, ApplyReply, ControllerConfig, PulseReply, RelayController,
        RelayReply, RelayState, StatusReport, SwitchState,
    };
    pub use crate::protocol::{
        list_ports, resolve_port, CommandFrame, CommandTable, Operation, PortInfo, RelayError,
        RelayTarget, Session, SessionConfig, StatusSnapshot, Transport,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
