//! Response decoding
//!
//! Boards answer status queries in one of two ways: ASCII text such as
//! `CH1:OFFCH2:ON...`, or a bitmask byte (bit 0 = relay 1), optionally
//! wrapped between a `0xA0` start byte and a trailer. Decoding is total:
//! any byte sequence yields a best-effort result.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

use super::{CommandFrame, FrameDefect, MAX_RELAYS, START_BYTE};

static CHANNEL_STATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CH(\d+):(ON|OFF)").unwrap());

/// How a snapshot was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusSource {
    /// Nothing decodable
    Unknown,
    /// ASCII `CHn:ON|OFF` tokens
    Ascii,
    /// Bitmask payload byte
    Bitmask,
}

/// Per-relay on/off state decoded from a status response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    states: [Option<bool>; MAX_RELAYS as usize],
    source: StatusSource,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self::unknown()
    }
}

impl StatusSnapshot {
    /// Snapshot with every relay unknown
    pub fn unknown() -> Self {
        Self {
            states: [None; MAX_RELAYS as usize],
            source: StatusSource::Unknown,
        }
    }

    /// Snapshot from a bitmask, bit 0 = relay 1
    pub fn from_bitmask(mask: u8) -> Self {
        let mut states = [None; MAX_RELAYS as usize];
        for (i, state) in states.iter_mut().enumerate() {
            *state = Some(mask & (1 << i) != 0);
        }
        Self {
            states,
            source: StatusSource::Bitmask,
        }
    }

    /// State of relay `n` (1-based); `None` if unknown or out of range
    pub fn get(&self, n: u8) -> Option<bool> {
        if n == 0 {
            return None;
        }
        self.states.get(n as usize - 1).copied().flatten()
    }

    /// Set the state of relay `n` (1-based); out-of-range indices are ignored
    pub fn set(&mut self, n: u8, on: bool) {
        if let Some(slot) = n.checked_sub(1).and_then(|i| self.states.get_mut(i as usize)) {
            *slot = Some(on);
        }
    }

    /// Where the states came from
    pub fn source(&self) -> StatusSource {
        self.source
    }

    /// True when at least one relay state is known
    pub fn is_decoded(&self) -> bool {
        self.states.iter().any(Option::is_some)
    }

    /// Fill unknown relays from another snapshot
    pub fn merge(&mut self, other: &StatusSnapshot) {
        for (mine, theirs) in self.states.iter_mut().zip(other.states.iter()) {
            if mine.is_none() {
                *mine = *theirs;
            }
        }
        if self.source == StatusSource::Unknown {
            self.source = other.source;
        }
    }

    /// Iterate `(relay number, state)` for relays 1..=8
    pub fn iter(&self) -> impl Iterator<Item = (u8, Option<bool>)> + '_ {
        self.states
            .iter()
            .enumerate()
            .map(|(i, s)| (i as u8 + 1, *s))
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens: Vec<String> = self
            .iter()
            .map(|(n, s)| format_state_token(n, s))
            .collect();
        f.write_str(&tokens.join(" "))
    }
}

/// Render one `relay<N>=<0|1|?>` token
pub fn format_state_token(n: u8, state: Option<bool>) -> String {
    let value = match state {
        Some(true) => "1",
        Some(false) => "0",
        None => "?",
    };
    format!("relay{}={}", n, value)
}

/// Decode a status response into a snapshot. Never fails.
pub fn decode_status(response: &[u8]) -> StatusSnapshot {
    if response.is_empty() {
        return StatusSnapshot::unknown();
    }

    if let Some(snapshot) = decode_ascii(response) {
        return snapshot;
    }

    // Unframed text without channel tokens is an acknowledgement or an error message
    if response.first() != Some(&START_BYTE) && is_text(response) {
        return StatusSnapshot::unknown();
    }

    match status_payload(response).first() {
        Some(&mask) => StatusSnapshot::from_bitmask(mask),
        None => StatusSnapshot::unknown(),
    }
}

fn decode_ascii(response: &[u8]) -> Option<StatusSnapshot> {
    let text: String = response
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect();

    let mut snapshot = StatusSnapshot::unknown();
    let mut matched = false;
    for caps in CHANNEL_STATE.captures_iter(&text) {
        matched = true;
        // Indices beyond the protocol range are present on some boards but meaningless
        if let Ok(ch) = caps[1].parse::<u8>() {
            snapshot.set(ch, &caps[2] == "ON");
        }
    }

    if !matched {
        return None;
    }
    snapshot.source = StatusSource::Ascii;
    Some(snapshot)
}

fn is_text(response: &[u8]) -> bool {
    response
        .iter()
        .all(|b| b.is_ascii_graphic() || b.is_ascii_whitespace())
}

/// Strip frame sentinels from a response when present
fn status_payload(response: &[u8]) -> &[u8] {
    if response.first() == Some(&START_BYTE) {
        if response.len() < 3 {
            return &[];
        }
        if response.len() == 4 {
            if let Err(defect) = CommandFrame::parse(response) {
                warn_defect(response, defect);
            }
        }
        &response[1..response.len() - 1]
    } else {
        if response.len() >= 3 {
            warn_defect(response, FrameDefect::BadStart(response[0]));
        }
        response
    }
}

fn warn_defect(response: &[u8], defect: FrameDefect) {
    tracing::warn!(
        "status response is not a clean frame ({}): {}",
        defect,
        to_hex(response)
    );
}

/// Best-effort ASCII view of a response. Bytes outside ASCII are kept as
/// `\xNN` escapes so nothing is lost.
pub fn decode_text(response: &[u8]) -> String {
    let mut text = String::with_capacity(response.len());
    for &b in response {
        if b.is_ascii() {
            text.push(b as char);
        } else {
            text.push_str(&format!("\\x{:02x}", b));
        }
    }
    text
}

/// Lowercase hex without separators, as printed after `RAW:`
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_is_unknown() {
        let snapshot = decode_status(&[]);
        assert!(!snapshot.is_decoded());
        assert_eq!(snapshot.source(), StatusSource::Unknown);
        assert_eq!(
            snapshot.to_string(),
            "relay1=? relay2=? relay3=? relay4=? relay5=? relay6=? relay7=? relay8=?"
        );
    }

    #[test]
    fn test_ascii_status() {
        let snapshot = decode_status(b"CH1:OFF\r\nCH2:ON\r\nCH3:OFF\r\nCH4:ON\r\n");
        assert_eq!(snapshot.source(), StatusSource::Ascii);
        assert_eq!(snapshot.get(1), Some(false));
        assert_eq!(snapshot.get(2), Some(true));
        assert_eq!(snapshot.get(4), Some(true));
        assert_eq!(snapshot.get(5), None);
    }

    #[test]
    fn test_ascii_ignores_noise_and_high_channels() {
        let mut data = vec![0xFF, 0x00];
        data.extend_from_slice(b"CH1:ONCH12:ON");
        let snapshot = decode_status(&data);
        assert_eq!(snapshot.get(1), Some(true));
        assert_eq!(snapshot.iter().filter(|(_, s)| s.is_some()).count(), 1);
    }

    #[test]
    fn test_bare_bitmask() {
        let snapshot = decode_status(&[0b0000_0101]);
        assert_eq!(snapshot.source(), StatusSource::Bitmask);
        assert_eq!(
            snapshot.to_string(),
            "relay1=1 relay2=0 relay3=1 relay4=0 relay5=0 relay6=0 relay7=0 relay8=0"
        );
    }

    #[test]
    fn test_text_without_tokens_is_unknown() {
        for reply in [&b"OK"[..], b"ERR\r\n", b"garbage!"] {
            let snapshot = decode_status(reply);
            assert!(!snapshot.is_decoded(), "{:?}", reply);
            assert_eq!(snapshot.source(), StatusSource::Unknown);
        }
        // A framed payload is a bitmask even when it is printable
        assert_eq!(decode_status(&[0xA0, b'O', 0xEF]).get(1), Some(true));
    }

    #[test]
    fn test_framed_bitmask() {
        let snapshot = decode_status(&[0xA0, 0x82, 0x22]);
        assert_eq!(snapshot.get(2), Some(true));
        assert_eq!(snapshot.get(8), Some(true));
        assert_eq!(snapshot.get(1), Some(false));
    }

    #[test]
    fn test_sentinels_without_payload() {
        assert!(!decode_status(&[0xA0]).is_decoded());
        assert!(!decode_status(&[0xA0, 0xA1]).is_decoded());
    }

    #[test]
    fn test_decode_is_total() {
        for len in 0..16usize {
            let data: Vec<u8> = (0..len).map(|i| (i * 37 + 11) as u8).collect();
            let _ = decode_status(&data);
            let _ = decode_text(&data);
        }
    }

    #[test]
    fn test_merge_fills_unknown_only() {
        let mut a = StatusSnapshot::unknown();
        a.set(1, true);
        let b = StatusSnapshot::from_bitmask(0);
        a.merge(&b);
        assert_eq!(a.get(1), Some(true));
        assert_eq!(a.get(2), Some(false));
        assert_eq!(a.source(), StatusSource::Bitmask);
    }

    #[test]
    fn test_get_out_of_range() {
        let snapshot = StatusSnapshot::from_bitmask(0xFF);
        assert_eq!(snapshot.get(0), None);
        assert_eq!(snapshot.get(9), None);
    }

    #[test]
    fn test_decode_text() {
        assert_eq!(decode_text(b"OK\r\n"), "OK\r\n");
        assert_eq!(decode_text(&[b'A', 0xC3, 0xA9, b'B']), "A\\xc3\\xa9B");
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(to_hex(&[0xA0, 0x01, 0x0F]), "a0010f");
        assert_eq!(to_hex(&[]), "");
    }
}
