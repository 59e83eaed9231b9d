use crate::error::Error;
use crate::{Result, constants::SWITCHBANK_PATH_PREFIX};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Canonical module identity derived from the module's IPv4 address.
///
/// Each octet is zero-padded to three digits and the four groups are
/// concatenated, e.g. `192.168.1.10` becomes `192168001010`. The fixed
/// width keeps bus paths stable, and lexicographic order of the encoded
/// form matches numeric order of the underlying addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleId([u8; 4]);

impl ModuleId {
    /// Derive the module id from an IPv4 address.
    #[must_use]
    pub fn from_addr(addr: Ipv4Addr) -> Self {
        ModuleId(addr.octets())
    }

    /// Recover the IPv4 address this id encodes.
    #[must_use]
    pub fn to_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.0)
    }

    /// Host-bus path of the switchbank this module is published under.
    #[must_use]
    pub fn switchbank_path(&self) -> String {
        format!("{SWITCHBANK_PATH_PREFIX}.{self}")
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:03}{:03}{:03}{:03}",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

impl std::str::FromStr for ModuleId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 12 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidModuleId(s.to_string()));
        }
        let mut octets = [0u8; 4];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = s[i * 3..i * 3 + 3]
                .parse::<u16>()
                .ok()
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| Error::InvalidModuleId(s.to_string()))?;
        }
        Ok(ModuleId(octets))
    }
}

impl From<ModuleId> for String {
    fn from(id: ModuleId) -> String {
        id.to_string()
    }
}

impl TryFrom<String> for ModuleId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Kind of channel a DS module exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// Output channel the host can operate.
    Relay,
    /// Digital input channel, read-only.
    Switch,
}

impl ChannelType {
    /// One-letter suffix used in channel identifiers and bus paths.
    #[must_use]
    pub fn suffix(&self) -> char {
        match self {
            ChannelType::Relay => 'R',
            ChannelType::Switch => 'S',
        }
    }
}

/// Bus-facing channel identifier: a 1-based ordinal plus a type suffix,
/// written `3R` for the third relay or `2S` for the second switch.
///
/// The ordinal is the display index; the hardware-facing channel address
/// lives on the channel record and may differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId {
    ordinal: u8,
    channel_type: ChannelType,
}

impl ChannelId {
    /// Create a channel id with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidChannelId` if the ordinal is zero.
    pub fn new(ordinal: u8, channel_type: ChannelType) -> Result<Self> {
        if ordinal == 0 {
            return Err(Error::InvalidChannelId(format!(
                "channel ordinal must be 1-based, got 0{}",
                channel_type.suffix()
            )));
        }
        Ok(ChannelId {
            ordinal,
            channel_type,
        })
    }

    /// Relay channel id.
    pub fn relay(ordinal: u8) -> Result<Self> {
        ChannelId::new(ordinal, ChannelType::Relay)
    }

    /// Switch channel id.
    pub fn switch(ordinal: u8) -> Result<Self> {
        ChannelId::new(ordinal, ChannelType::Switch)
    }

    /// 1-based display ordinal.
    #[must_use]
    pub fn ordinal(&self) -> u8 {
        self.ordinal
    }

    #[must_use]
    pub fn channel_type(&self) -> ChannelType {
        self.channel_type
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.ordinal, self.channel_type.suffix())
    }
}

impl std::str::FromStr for ChannelId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidChannelId(s.to_string());
        let (num, channel_type) = match s.as_bytes() {
            [num @ .., b'R'] => (num, ChannelType::Relay),
            [num @ .., b'S'] => (num, ChannelType::Switch),
            _ => return Err(invalid()),
        };
        let ordinal: u8 = std::str::from_utf8(num)
            .ok()
            .and_then(|n| n.parse().ok())
            .ok_or_else(invalid)?;
        ChannelId::new(ordinal, channel_type)
    }
}

impl From<ChannelId> for String {
    fn from(id: ChannelId) -> String {
        id.to_string()
    }
}

impl TryFrom<String> for ChannelId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Progress state of a PUT-style channel operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PutState {
    /// The operation finished (successfully or not, see the status code).
    Completed,
    /// The command was queued; completion arrives asynchronously.
    Pending,
}

/// Final result delivered to a PUT caller once the module acknowledges
/// (or the request could not be actioned at all).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutOutcome {
    pub state: PutState,
    pub status_code: u16,
}

impl PutOutcome {
    /// Outcome reported when the module acknowledged the command.
    #[must_use]
    pub fn completed_ok() -> Self {
        PutOutcome {
            state: PutState::Completed,
            status_code: 200,
        }
    }

    /// Outcome reported when the request could not be actioned.
    #[must_use]
    pub fn bad_request() -> Self {
        PutOutcome {
            state: PutState::Completed,
            status_code: 400,
        }
    }
}
