//! Status report parsing.
//!
//! A status report is three newline-delimited lines:
//!
//! ```text
//! *DS2824 V1.2        <- header/echo, ignored
//! 00010000...         <- relay bit-string, one character per relay
//! 0000 0000           <- switch bit-string, spaces are presentation only
//! ```
//!
//! Character position maps 1-based to the channel address: position 1 is
//! address 1. `'0'` means off; any other character means on.
//!
//! Some firmware variants space-separate the switch line and some
//! concatenate it; the canonical form here is the space-stripped
//! concatenation, so both variants decode identically.

use dsbridge_core::constants::STATUS_OFF_CHAR;
use dsbridge_core::{Error, Result};

/// One status report as framed off the wire, before interpretation
/// against a module's configured channel counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatusReport {
    /// Header/echo line, retained for diagnostics only.
    pub header: String,
    /// Relay bit-string, trimmed.
    pub relays: String,
    /// Switch bit-string, trimmed and space-stripped.
    pub switches: String,
}

impl RawStatusReport {
    /// Build a report from the three raw lines, normalizing whitespace.
    #[must_use]
    pub fn from_lines(header: &str, relays: &str, switches: &str) -> Self {
        RawStatusReport {
            header: header.trim().to_string(),
            relays: relays.trim().to_string(),
            switches: switches.trim().replace(' ', ""),
        }
    }
}

/// A status report interpreted against a module's channel counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Relay states, index 0 = address 1.
    pub relays: Vec<bool>,
    /// Switch states, index 0 = address 1.
    pub switches: Vec<bool>,
}

impl StatusReport {
    /// Decode a raw report against the configured channel counts.
    ///
    /// A bit-string longer than the configured count is truncated (the
    /// hardware reports its full bank regardless of how much of it is
    /// configured); a shorter one fails.
    ///
    /// # Errors
    /// Returns `Error::MalformedStatus` if either bit-string is shorter
    /// than the corresponding configured count.
    pub fn decode(raw: &RawStatusReport, relay_count: usize, switch_count: usize) -> Result<Self> {
        Ok(StatusReport {
            relays: decode_bits(&raw.relays, relay_count, "relay")?,
            switches: decode_bits(&raw.switches, switch_count, "switch")?,
        })
    }

    /// State of the relay at a 1-based address, if within bounds.
    #[must_use]
    pub fn relay(&self, address: u8) -> Option<bool> {
        address
            .checked_sub(1)
            .and_then(|i| self.relays.get(usize::from(i)).copied())
    }

    /// State of the switch at a 1-based address, if within bounds.
    #[must_use]
    pub fn switch(&self, address: u8) -> Option<bool> {
        address
            .checked_sub(1)
            .and_then(|i| self.switches.get(usize::from(i)).copied())
    }
}

fn decode_bits(line: &str, count: usize, kind: &str) -> Result<Vec<bool>> {
    // Length gate counts characters, not bytes: a multi-byte character
    // surviving the codec's lossy decode must not satisfy the count.
    let states: Vec<bool> = line
        .chars()
        .take(count)
        .map(|c| c != STATUS_OFF_CHAR)
        .collect();
    if states.len() < count {
        return Err(Error::MalformedStatus {
            reason: format!(
                "{kind} line is {} characters, module is configured for {count}",
                states.len()
            ),
        });
    }
    Ok(states)
}
