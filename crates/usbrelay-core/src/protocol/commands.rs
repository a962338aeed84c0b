//! Protocol commands
//!
//! Defines the relay targets, the operations the boards understand and the
//! static table that maps each (target class, operation) pair onto the
//! selector/data bytes of a command frame.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{CommandFrame, RelayError, BROADCAST_SELECTOR, MAX_RELAYS};

/// Which relay(s) a command addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelayTarget {
    /// One relay, numbered from 1
    Single(u8),
    /// Every relay on the board
    All,
}

impl RelayTarget {
    /// Build a single-relay target, rejecting indices outside `1..=8`
    pub fn single(n: u32) -> Result<Self, RelayError> {
        if (1..=MAX_RELAYS as u32).contains(&n) {
            Ok(RelayTarget::Single(n as u8))
        } else {
            Err(RelayError::InvalidRelay(n))
        }
    }

    /// Re-check a target that may have been built directly from the enum
    pub fn validate(&self) -> Result<(), RelayError> {
        match *self {
            RelayTarget::Single(n) => RelayTarget::single(n as u32).map(|_| ()),
            RelayTarget::All => Ok(()),
        }
    }

    /// The table class this target falls into
    pub fn class(&self) -> TargetClass {
        match self {
            RelayTarget::Single(_) => TargetClass::Channel,
            RelayTarget::All => TargetClass::All,
        }
    }
}

impl fmt::Display for RelayTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayTarget::Single(n) => write!(f, "relay{}", n),
            RelayTarget::All => f.write_str("all relays"),
        }
    }
}

/// Target class used as the first half of a command table key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetClass {
    /// A single numbered channel
    Channel,
    /// The broadcast group
    All,
}

impl fmt::Display for TargetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetClass::Channel => f.write_str("a single relay"),
            TargetClass::All => f.write_str("all relays"),
        }
    }
}

/// Operations a relay board understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Energize
    On,
    /// De-energize
    Off,
    /// Status query (`0x02` data byte)
    Query,
    /// Older firmware status query (`0xFF` data byte); many boards stay silent
    LegacyQuery,
}

impl Operation {
    /// Check if this operation expects the board to answer
    pub fn expects_response(&self) -> bool {
        matches!(self, Operation::Query | Operation::LegacyQuery)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::On => "on",
            Operation::Off => "off",
            Operation::Query => "query",
            Operation::LegacyQuery => "legacy query",
        };
        f.write_str(name)
    }
}

/// How a table row fills the selector byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorByte {
    /// Use the addressed relay number
    Channel,
    /// Use a fixed byte
    Fixed(u8),
}

/// One row of the command table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    /// Target class this row applies to
    pub target: TargetClass,
    /// Operation this row encodes
    pub operation: Operation,
    /// Selector byte source
    pub selector: SelectorByte,
    /// Data byte
    pub data: u8,
}

impl CommandEntry {
    /// Create a table row
    pub const fn new(
        target: TargetClass,
        operation: Operation,
        selector: SelectorByte,
        data: u8,
    ) -> Self {
        Self {
            target,
            operation,
            selector,
            data,
        }
    }

    /// Resolve the selector byte for a concrete target
    pub fn selector_for(&self, target: RelayTarget) -> u8 {
        match (self.selector, target) {
            (SelectorByte::Fixed(b), _) => b,
            (SelectorByte::Channel, RelayTarget::Single(n)) => n,
            (SelectorByte::Channel, RelayTarget::All) => BROADCAST_SELECTOR,
        }
    }
}

/// Rows observed on CH340 relay boards
const STANDARD_ENTRIES: &[CommandEntry] = &[
    CommandEntry::new(TargetClass::Channel, Operation::On, SelectorByte::Channel, 0x01),
    CommandEntry::new(TargetClass::Channel, Operation::Off, SelectorByte::Channel, 0x00),
    CommandEntry::new(TargetClass::Channel, Operation::Query, SelectorByte::Channel, 0x02),
    CommandEntry::new(TargetClass::Channel, Operation::LegacyQuery, SelectorByte::Channel, 0xFF),
    CommandEntry::new(TargetClass::All, Operation::On, SelectorByte::Fixed(BROADCAST_SELECTOR), 0x01),
    CommandEntry::new(TargetClass::All, Operation::Off, SelectorByte::Fixed(BROADCAST_SELECTOR), 0x00),
    CommandEntry::new(TargetClass::All, Operation::Query, SelectorByte::Fixed(BROADCAST_SELECTOR), 0x02),
];

/// Lookup table from (target class, operation) to frame bytes
#[derive(Debug, Clone)]
pub struct CommandTable {
    entries: Vec<CommandEntry>,
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl CommandTable {
    /// Table matching the common CH340 relay firmwares
    pub fn standard() -> Self {
        Self {
            entries: STANDARD_ENTRIES.to_vec(),
        }
    }

    /// Table with no rows; every encode fails until rows are added
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a row, replacing any existing row with the same key
    pub fn with_entry(mut self, entry: CommandEntry) -> Self {
        self.insert(entry);
        self
    }

    /// Add a row, replacing any existing row with the same key
    pub fn insert(&mut self, entry: CommandEntry) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.target == entry.target && e.operation == entry.operation)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// All rows in insertion order
    pub fn entries(&self) -> &[CommandEntry] {
        &self.entries
    }

    /// Find the row for a key
    pub fn lookup(&self, target: TargetClass, operation: Operation) -> Option<&CommandEntry> {
        self.entries
            .iter()
            .find(|e| e.target == target && e.operation == operation)
    }

    /// Encode an operation for a target into a command frame
    pub fn encode(
        &self,
        target: RelayTarget,
        operation: Operation,
    ) -> Result<CommandFrame, RelayError> {
        target.validate()?;
        let entry = self
            .lookup(target.class(), operation)
            .ok_or(RelayError::UnsupportedOperation {
                target: target.class(),
                operation,
            })?;
        Ok(CommandFrame::new(entry.selector_for(target), entry.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_bounds() {
        assert!(RelayTarget::single(0).is_err());
        assert!(RelayTarget::single(9).is_err());
        for n in 1..=8 {
            assert_eq!(RelayTarget::single(n).unwrap(), RelayTarget::Single(n as u8));
        }
    }

    #[test]
    fn test_transcript_frames() {
        let table = CommandTable::standard();
        let on = table.encode(RelayTarget::Single(1), Operation::On).unwrap();
        let off = table.encode(RelayTarget::Single(1), Operation::Off).unwrap();
        let on2 = table.encode(RelayTarget::Single(2), Operation::On).unwrap();
        assert_eq!(on.to_bytes(), [0xA0, 0x01, 0x01, 0xA2]);
        assert_eq!(off.to_bytes(), [0xA0, 0x01, 0x00, 0xA1]);
        assert_eq!(on2.to_bytes(), [0xA0, 0x02, 0x01, 0xA3]);
    }

    #[test]
    fn test_broadcast_frames() {
        let table = CommandTable::standard();
        let on = table.encode(RelayTarget::All, Operation::On).unwrap();
        let query = table.encode(RelayTarget::All, Operation::Query).unwrap();
        assert_eq!(on.to_bytes(), [0xA0, 0x0F, 0x01, 0xB0]);
        assert_eq!(query.to_bytes(), [0xA0, 0x0F, 0x02, 0xB1]);
    }

    #[test]
    fn test_missing_row_is_unsupported() {
        let table = CommandTable::standard();
        let err = table
            .encode(RelayTarget::All, Operation::LegacyQuery)
            .unwrap_err();
        assert!(matches!(err, RelayError::UnsupportedOperation { .. }));
        assert!(err.is_validation());
    }

    #[test]
    fn test_out_of_range_never_encodes() {
        let table = CommandTable::standard();
        let err = table.encode(RelayTarget::Single(9), Operation::On).unwrap_err();
        assert!(matches!(err, RelayError::InvalidRelay(9)));
    }

    #[test]
    fn test_insert_replaces_row() {
        let table = CommandTable::standard().with_entry(CommandEntry::new(
            TargetClass::All,
            Operation::LegacyQuery,
            SelectorByte::Fixed(0x00),
            0xFF,
        ));
        let frame = table.encode(RelayTarget::All, Operation::LegacyQuery).unwrap();
        assert_eq!(frame.selector, 0x00);
        assert_eq!(frame.data, 0xFF);

        let table = table.with_entry(CommandEntry::new(
            TargetClass::All,
            Operation::On,
            SelectorByte::Fixed(0x10),
            0x01,
        ));
        assert_eq!(table.entries().len(), STANDARD_ENTRIES.len() + 1);
        let frame = table.encode(RelayTarget::All, Operation::On).unwrap();
        assert_eq!(frame.selector, 0x10);
    }

    #[test]
    fn test_expects_response() {
        assert!(Operation::Query.expects_response());
        assert!(Operation::LegacyQuery.expects_response());
        assert!(!Operation::On.expects_response());
        assert!(!Operation::Off.expects_response());
    }
}
