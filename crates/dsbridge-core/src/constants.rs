//! Protocol and configuration constants for the DS module bridge.
//!
//! The Devantech DS range speaks a newline-delimited ASCII protocol over
//! two independent TCP connections per module:
//!
//! - **Status (inbound)**: the module dials the host and periodically
//!   pushes a three-line report:
//!
//!   ```text
//!   <header/echo line>
//!   <relay bit-string, one character per relay, '0' = off>
//!   <switch bit-string, possibly space-separated>
//!   ```
//!
//! - **Command (outbound)**: the host dials the module's command port and
//!   writes one command per line; the module answers each accepted command
//!   with the literal line `Ok`. There is no correlation token, so command
//!   traffic must be strictly serialized per module.
//!
//! Defaults here follow the values shipped with the DS product line.

/// TCP port on which the bridge listens for inbound status connections.
pub const DEFAULT_STATUS_LISTENER_PORT: u16 = 28241;

/// TCP port on the module to which operating commands are sent.
pub const DEFAULT_COMMAND_PORT: u16 = 17123;

/// Interval in milliseconds between transmit-queue processing passes.
pub const DEFAULT_TRANSMIT_QUEUE_HEARTBEAT_MS: u64 = 25;

/// Device definition applied to modules without an explicit device id.
pub const DEFAULT_DEVICE_ID: &str = "DS";

/// Acknowledgement token sent by a module after each accepted command.
pub const COMMAND_ACK: &str = "Ok";

/// Placeholder in command templates substituted with the channel address.
pub const CHANNEL_PLACEHOLDER: &str = "{c}";

/// Number of lines in one status report (header, relays, switches).
pub const STATUS_REPORT_LINES: usize = 3;

/// Host-bus path prefix under which module switchbanks are published.
pub const SWITCHBANK_PATH_PREFIX: &str = "electrical.switches.bank";

/// Character signifying OFF in a status bit-string; anything else is ON.
pub const STATUS_OFF_CHAR: char = '0';
