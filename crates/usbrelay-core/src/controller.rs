//! Relay controller
//!
//! Composes the command table with a [`Transport`] to switch relays, pulse
//! them, query status and pass raw bytes through. Every operation validates
//! its arguments before the transport is touched, and operations run strictly
//! one after another.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::protocol::{
    decode_status, decode_text, encode_raw, response::format_state_token, to_hex, CommandFrame,
    CommandTable, Operation, RelayError, RelayTarget, StatusSnapshot, Transport,
    DEFAULT_TIMEOUT_MS, MAX_RELAYS,
};

/// How long to listen after a frame that normally gets no reply
const DEFAULT_SETTLE_MS: u64 = 50;

/// Gap between consecutive frames of a multi-frame command
const DEFAULT_INTER_FRAME_MS: u64 = 10;

/// On/off request for a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwitchState {
    /// Energize
    On,
    /// De-energize
    Off,
}

impl SwitchState {
    fn operation(self) -> Operation {
        match self {
            SwitchState::On => Operation::On,
            SwitchState::Off => Operation::Off,
        }
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchState::On => f.write_str("on"),
            SwitchState::Off => f.write_str("off"),
        }
    }
}

/// Requested relay state; `Pulse` is on, wait, off
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum RelayState {
    /// Energize
    On,
    /// De-energize
    Off,
    /// Energize for this many seconds, then de-energize
    Pulse(f64),
}

/// How commands addressed to every relay are transmitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AllMode {
    /// One broadcast frame (selector `0x0F`)
    #[default]
    Broadcast,
    /// One frame per channel, 1..=channels
    Loop,
    /// Broadcast frame, then the per-channel loop
    Both,
}

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of physical relays on the board (1..=8)
    pub channels: u8,
    /// Transmission strategy for `All`
    pub all_mode: AllMode,
    /// How long to wait for replies to queries and raw commands
    pub response_timeout: Duration,
    /// How long to listen after on/off frames
    pub settle: Duration,
    /// Delay between frames of a multi-frame command
    pub inter_frame_delay: Duration,
    /// Probe channels one by one when the group query does not decode
    pub query_fallback: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            channels: MAX_RELAYS,
            all_mode: AllMode::default(),
            response_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
            inter_frame_delay: Duration::from_millis(DEFAULT_INTER_FRAME_MS),
            query_fallback: true,
        }
    }
}

impl ControllerConfig {
    /// Check the channel count is within the protocol range
    pub fn validate(&self) -> Result<(), RelayError> {
        if (1..=MAX_RELAYS).contains(&self.channels) {
            Ok(())
        } else {
            Err(RelayError::InvalidChannelCount(self.channels))
        }
    }
}

/// Result of an on/off command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReply {
    /// Addressed relay(s)
    pub target: RelayTarget,
    /// Requested state
    pub state: SwitchState,
    /// Frames transmitted, in order
    pub frames: Vec<CommandFrame>,
    /// Bytes the board sent back (often none)
    pub response: Vec<u8>,
}

impl RelayReply {
    /// Decoded response text, or `(ok)` when the board stayed silent
    pub fn text(&self) -> String {
        if self.response.is_empty() {
            "(ok)".to_string()
        } else {
            decode_text(&self.response)
        }
    }
}

/// Result of a completed pulse
#[derive(Debug, Clone, PartialEq)]
pub struct PulseReply {
    /// Addressed relay(s)
    pub target: RelayTarget,
    /// Time the relay was held on
    pub seconds: f64,
    /// Reply to the "on" step
    pub on: RelayReply,
    /// Reply to the "off" step
    pub off: RelayReply,
}

/// Result of [`RelayController::apply`]
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyReply {
    /// Plain on/off
    Switched(RelayReply),
    /// Completed pulse
    Pulsed(PulseReply),
}

/// Decoded status narrowed to the requested relays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Requested relay(s)
    pub target: RelayTarget,
    /// Full board snapshot
    pub snapshot: StatusSnapshot,
    /// Every response byte received, in order
    pub raw: Vec<u8>,
    channels: u8,
}

impl StatusReport {
    /// `(relay number, state)` for the requested relays
    pub fn relays(&self) -> Vec<(u8, Option<bool>)> {
        match self.target {
            RelayTarget::Single(n) => vec![(n, self.snapshot.get(n))],
            RelayTarget::All => (1..=self.channels)
                .map(|n| (n, self.snapshot.get(n)))
                .collect(),
        }
    }

    /// True when at least one requested relay decoded
    pub fn is_decoded(&self) -> bool {
        self.relays().iter().any(|(_, s)| s.is_some())
    }

    /// Raw bytes as hex
    pub fn raw_hex(&self) -> String {
        to_hex(&self.raw)
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens: Vec<String> = self
            .relays()
            .into_iter()
            .map(|(n, s)| format_state_token(n, s))
            .collect();
        f.write_str(&tokens.join(" "))
    }
}

/// Relay controller over a transport
pub struct RelayController<T: Transport> {
    transport: T,
    table: CommandTable,
    config: ControllerConfig,
}

impl<T: Transport> RelayController<T> {
    /// Create a controller using the standard command table
    pub fn new(transport: T, config: ControllerConfig) -> Self {
        Self::with_table(transport, config, CommandTable::standard())
    }

    /// Create a controller with a custom command table
    pub fn with_table(transport: T, config: ControllerConfig, table: CommandTable) -> Self {
        Self {
            transport,
            table,
            config,
        }
    }

    /// Controller configuration
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Give the transport back, e.g. to close it explicitly
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Apply a requested state to a target
    pub fn apply(
        &mut self,
        target: RelayTarget,
        state: RelayState,
    ) -> Result<ApplyReply, RelayError> {
        match state {
            RelayState::On => self.set_relay(target, SwitchState::On).map(ApplyReply::Switched),
            RelayState::Off => self.set_relay(target, SwitchState::Off).map(ApplyReply::Switched),
            RelayState::Pulse(seconds) => self.pulse(target, seconds).map(ApplyReply::Pulsed),
        }
    }

    /// Switch a relay or every relay on or off.
    ///
    /// When a multi-frame command fails after some frames went out, the error
    /// is [`RelayError::SwitchInterrupted`] naming the relay whose frame failed.
    pub fn set_relay(
        &mut self,
        target: RelayTarget,
        state: SwitchState,
    ) -> Result<RelayReply, RelayError> {
        let steps = self.switch_frames(target, state)?;

        let mut response = Vec::new();
        for (i, (addressed, frame)) in steps.iter().enumerate() {
            if i > 0 {
                std::thread::sleep(self.config.inter_frame_delay);
            }
            match self.exchange(&frame.to_bytes(), self.config.settle) {
                Ok(bytes) => response.extend(bytes),
                Err(e) => return Err(interrupted(target, state, *addressed, i, e)),
            }
        }

        tracing::info!("{} {} via {}", target, state, self.transport.port_name());
        Ok(RelayReply {
            target,
            state,
            frames: steps.into_iter().map(|(_, frame)| frame).collect(),
            response,
        })
    }

    /// Switch on, hold for `seconds`, switch off.
    ///
    /// A failed "on" step is reported as [`RelayError::PulseOnFailed`] and the
    /// "off" step is skipped. A failed "off" step is reported as
    /// [`RelayError::PulsePartialFailure`]: the relay may still be energized.
    pub fn pulse(&mut self, target: RelayTarget, seconds: f64) -> Result<PulseReply, RelayError> {
        let hold = pulse_duration(seconds)?;
        // Both frame sets are built up front so validation errors never follow I/O
        self.switch_frames(target, SwitchState::On)?;
        self.switch_frames(target, SwitchState::Off)?;

        let on = self
            .set_relay(target, SwitchState::On)
            .map_err(|e| RelayError::PulseOnFailed {
                target,
                source: Box::new(e),
            })?;

        std::thread::sleep(hold);

        let off = self.set_relay(target, SwitchState::Off).map_err(|e| {
            tracing::warn!("{} left on: off step of pulse failed: {}", target, e);
            RelayError::PulsePartialFailure {
                target,
                source: Box::new(e),
            }
        })?;

        Ok(PulseReply {
            target,
            seconds,
            on,
            off,
        })
    }

    /// Query the board and narrow the result to `target`.
    ///
    /// Sends the query frame for `target`; when that does not decode for the
    /// requested relays and fallback is enabled, each missing channel is
    /// probed with the standard then the legacy query.
    pub fn query_status(&mut self, target: RelayTarget) -> Result<StatusReport, RelayError> {
        self.config.validate()?;
        let frame = self.table.encode(target, Operation::Query)?;

        let mut raw = self.exchange(&frame.to_bytes(), self.config.response_timeout)?;
        let mut snapshot = decode_status(&raw);

        if self.config.query_fallback {
            let wanted: Vec<u8> = match target {
                RelayTarget::Single(n) => vec![n],
                RelayTarget::All => (1..=self.config.channels).collect(),
            };

            for n in wanted {
                if snapshot.get(n).is_some() {
                    continue;
                }
                for op in [Operation::Query, Operation::LegacyQuery] {
                    // A single-relay target already sent the standard query above
                    if op == Operation::Query && target == RelayTarget::Single(n) {
                        continue;
                    }
                    let probe = match self.table.encode(RelayTarget::Single(n), op) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::debug!("skipping {} probe for relay{}: {}", op, n, e);
                            continue;
                        }
                    };
                    std::thread::sleep(self.config.inter_frame_delay);
                    let response = self.exchange(&probe.to_bytes(), self.config.response_timeout)?;
                    snapshot.merge(&decode_status(&response));
                    raw.extend(response);
                    if snapshot.get(n).is_some() {
                        break;
                    }
                }
            }
        }

        if raw.is_empty() {
            return Err(RelayError::ReadTimeout(target));
        }

        Ok(StatusReport {
            target,
            snapshot,
            raw,
            channels: self.config.channels,
        })
    }

    /// Send caller-supplied bytes verbatim and return whatever comes back
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<Vec<u8>, RelayError> {
        let payload = encode_raw(bytes);
        self.exchange(&payload, self.config.response_timeout)
    }

    /// Frames for a switch command, each paired with the relay it addresses
    fn switch_frames(
        &self,
        target: RelayTarget,
        state: SwitchState,
    ) -> Result<Vec<(RelayTarget, CommandFrame)>, RelayError> {
        self.config.validate()?;
        let op = state.operation();

        match target {
            RelayTarget::Single(_) => Ok(vec![(target, self.table.encode(target, op)?)]),
            RelayTarget::All => {
                let mut frames = Vec::new();
                if matches!(self.config.all_mode, AllMode::Broadcast | AllMode::Both) {
                    frames.push((target, self.table.encode(target, op)?));
                }
                if matches!(self.config.all_mode, AllMode::Loop | AllMode::Both) {
                    for n in 1..=self.config.channels {
                        let single = RelayTarget::Single(n);
                        frames.push((single, self.table.encode(single, op)?));
                    }
                }
                Ok(frames)
            }
        }
    }

    fn exchange(&mut self, payload: &[u8], window: Duration) -> Result<Vec<u8>, RelayError> {
        tracing::debug!("TX: {}", to_hex(payload));
        self.transport.send(payload)?;

        let response = self.transport.receive(window)?;
        if response.is_empty() {
            tracing::debug!("RX: (no data)");
        } else {
            tracing::debug!("RX: {}", to_hex(&response));
        }
        Ok(response)
    }
}

/// Validate a pulse length and convert it to a sleep duration
pub fn pulse_duration(seconds: f64) -> Result<Duration, RelayError> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(RelayError::InvalidDuration(seconds));
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| RelayError::InvalidDuration(seconds))
}

/// Classify a transport failure at frame `index` of a switch command.
/// A failed write means that frame did not go out; a failed read means it did.
fn interrupted(
    target: RelayTarget,
    state: SwitchState,
    failed: RelayTarget,
    index: usize,
    source: RelayError,
) -> RelayError {
    let sent = match source {
        RelayError::Write(_) => index,
        _ => index + 1,
    };
    if sent == 0 {
        return source;
    }
    tracing::warn!(
        "{} {} stopped at {} after {} frame(s): {}",
        target,
        state,
        failed,
        sent,
        source
    );
    RelayError::SwitchInterrupted {
        target,
        operation: state.operation(),
        failed,
        sent,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        sent: Vec<Vec<u8>>,
    }

    impl Transport for Recorder {
        fn port_name(&self) -> &str {
            "mock"
        }

        fn send(&mut self, frame: &[u8]) -> Result<(), RelayError> {
            self.sent.push(frame.to_vec());
            Ok(())
        }

        fn receive(&mut self, _timeout: Duration) -> Result<Vec<u8>, RelayError> {
            Ok(Vec::new())
        }
    }

    fn fast_config() -> ControllerConfig {
        ControllerConfig {
            inter_frame_delay: Duration::ZERO,
            ..ControllerConfig::default()
        }
    }

    #[test]
    fn test_loop_mode_sends_one_frame_per_channel() {
        let config = ControllerConfig {
            channels: 4,
            all_mode: AllMode::Loop,
            ..fast_config()
        };
        let mut controller = RelayController::new(Recorder::default(), config);
        let reply = controller.set_relay(RelayTarget::All, SwitchState::Off).unwrap();
        assert_eq!(reply.frames.len(), 4);
        let sent = controller.into_inner().sent;
        assert_eq!(sent[0], vec![0xA0, 0x01, 0x00, 0xA1]);
        assert_eq!(sent[3], vec![0xA0, 0x04, 0x00, 0xA4]);
    }

    #[test]
    fn test_both_mode_broadcasts_first() {
        let config = ControllerConfig {
            channels: 2,
            all_mode: AllMode::Both,
            ..fast_config()
        };
        let mut controller = RelayController::new(Recorder::default(), config);
        controller.set_relay(RelayTarget::All, SwitchState::On).unwrap();
        let sent = controller.into_inner().sent;
        assert_eq!(
            sent,
            vec![
                vec![0xA0, 0x0F, 0x01, 0xB0],
                vec![0xA0, 0x01, 0x01, 0xA2],
                vec![0xA0, 0x02, 0x01, 0xA3],
            ]
        );
    }

    #[test]
    fn test_bad_channel_count_touches_nothing() {
        let config = ControllerConfig {
            channels: 9,
            ..fast_config()
        };
        let mut controller = RelayController::new(Recorder::default(), config);
        let err = controller.set_relay(RelayTarget::All, SwitchState::On).unwrap_err();
        assert!(matches!(err, RelayError::InvalidChannelCount(9)));
        assert!(controller.into_inner().sent.is_empty());
    }

    #[test]
    fn test_pulse_duration_range() {
        assert_eq!(pulse_duration(1.5).unwrap(), Duration::from_millis(1500));
        for seconds in [0.0, -2.0, f64::NAN, f64::INFINITY, 1e20, f64::MAX] {
            assert!(matches!(
                pulse_duration(seconds),
                Err(RelayError::InvalidDuration(_))
            ));
        }
    }

    #[test]
    fn test_failed_read_counts_frame_as_sent() {
        let read = RelayError::Read(std::io::Error::other("gone"));
        match interrupted(RelayTarget::Single(1), SwitchState::On, RelayTarget::Single(1), 0, read) {
            RelayError::SwitchInterrupted { sent, .. } => assert_eq!(sent, 1),
            other => panic!("expected SwitchInterrupted, got {:?}", other),
        }

        let write = RelayError::Write(std::io::Error::other("gone"));
        assert!(matches!(
            interrupted(RelayTarget::Single(1), SwitchState::On, RelayTarget::Single(1), 0, write),
            RelayError::Write(_)
        ));
    }

    #[test]
    fn test_reply_text() {
        let mut reply = RelayReply {
            target: RelayTarget::All,
            state: SwitchState::On,
            frames: Vec::new(),
            response: Vec::new(),
        };
        assert_eq!(reply.text(), "(ok)");
        reply.response = b"OK".to_vec();
        assert_eq!(reply.text(), "OK");
    }

    #[test]
    fn test_report_narrowing() {
        let report = StatusReport {
            target: RelayTarget::Single(3),
            snapshot: StatusSnapshot::from_bitmask(0b100),
            raw: vec![0x04],
            channels: 8,
        };
        assert_eq!(report.to_string(), "relay3=1");

        let report = StatusReport {
            target: RelayTarget::All,
            channels: 2,
            ..report
        };
        assert_eq!(report.to_string(), "relay1=0 relay2=0");
    }
}
