//! Configuration data model for the gateway.
//!
//! Schema validation happens upstream; these types are consumed read-only
//! as already-validated data. Serde defaults mirror the values shipped
//! with the DS product line, and [`GatewayConfig::default`] carries
//! built-in definitions for the DS and DS2824 devices so a gateway runs
//! usefully with an empty configuration file.

use crate::constants::{
    DEFAULT_COMMAND_PORT, DEFAULT_DEVICE_ID, DEFAULT_STATUS_LISTENER_PORT,
    DEFAULT_TRANSMIT_QUEUE_HEARTBEAT_MS,
};
use crate::types::ChannelId;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Regular expression authenticating inbound status connections by
    /// their dotted IPv4 address. Absent means accept everything.
    pub client_ip_filter: Option<String>,

    /// TCP port on which the gateway listens for module status reports.
    pub status_listener_port: u16,

    /// Milliseconds between transmit-queue processing passes.
    pub transmit_queue_heartbeat: u64,

    /// Device definition applied to modules without an explicit override.
    pub default_device_id: String,

    /// Command port used for modules without an explicit override.
    pub default_command_port: u16,

    /// Per-module configuration, keyed by IP address.
    pub modules: Vec<ModuleConfig>,

    /// Known device definitions.
    pub devices: Vec<DeviceDefinition>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            client_ip_filter: None,
            status_listener_port: DEFAULT_STATUS_LISTENER_PORT,
            transmit_queue_heartbeat: DEFAULT_TRANSMIT_QUEUE_HEARTBEAT_MS,
            default_device_id: DEFAULT_DEVICE_ID.to_string(),
            default_command_port: DEFAULT_COMMAND_PORT,
            modules: Vec::new(),
            devices: DeviceDefinition::builtin(),
        }
    }
}

impl GatewayConfig {
    /// Heartbeat interval as a [`Duration`].
    #[must_use]
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.transmit_queue_heartbeat)
    }

    /// Configuration entry for the module at `addr`, if any.
    #[must_use]
    pub fn module(&self, addr: Ipv4Addr) -> Option<&ModuleConfig> {
        self.modules.iter().find(|m| m.ip_address == addr)
    }

    /// Device definition with the given id, if any.
    #[must_use]
    pub fn device(&self, device_id: &str) -> Option<&DeviceDefinition> {
        self.devices.iter().find(|d| d.id == device_id)
    }
}

/// Configuration for one physical module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// IP address of the module this configuration applies to.
    pub ip_address: Ipv4Addr,

    /// Device definition id (overrides the configured default).
    #[serde(default)]
    pub device_id: Option<String>,

    /// Command port on the module (overrides the configured default).
    #[serde(default)]
    pub command_port: Option<u16>,

    /// Human-readable description of this module.
    #[serde(default)]
    pub description: Option<String>,

    /// Per-channel descriptions.
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

impl ModuleConfig {
    /// Configured description for a channel, if any.
    #[must_use]
    pub fn channel_description(&self, id: ChannelId) -> Option<&str> {
        self.channels
            .iter()
            .find(|c| c.index == id)
            .map(|c| c.description.as_str())
    }
}

/// Description attached to one channel of a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel this configuration applies to, e.g. `3R`.
    pub index: ChannelId,

    /// Human-readable description of the channel.
    pub description: String,
}

/// Definition of a device type: channel counts and command templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDefinition {
    /// Device type identifier, e.g. `DS2824`.
    pub id: String,

    /// Number of relay (output) channels.
    #[serde(default)]
    pub relays: u8,

    /// Number of switch (digital input) channels.
    #[serde(default)]
    pub switches: u8,

    /// Command templates. A single entry with address 0 is parametric and
    /// applies to every relay address via `{c}` substitution; otherwise
    /// each address needs its own entry.
    pub channels: Vec<CommandTemplate>,
}

impl DeviceDefinition {
    /// Built-in definitions for the stock DS devices.
    #[must_use]
    pub fn builtin() -> Vec<DeviceDefinition> {
        let parametric = vec![CommandTemplate {
            address: 0,
            oncommand: "SR {c} ON".to_string(),
            offcommand: "SR {c} OFF".to_string(),
        }];
        vec![
            DeviceDefinition {
                id: "DS".to_string(),
                relays: 32,
                switches: 8,
                channels: parametric.clone(),
            },
            DeviceDefinition {
                id: "DS2824".to_string(),
                relays: 24,
                switches: 8,
                channels: parametric,
            },
        ]
    }
}

/// ON/OFF command templates for one relay address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandTemplate {
    /// Relay address this template applies to; 0 marks a parametric
    /// template covering every address.
    pub address: u8,

    /// Command switching the relay on, possibly containing `{c}`.
    pub oncommand: String,

    /// Command switching the relay off, possibly containing `{c}`.
    pub offcommand: String,
}
