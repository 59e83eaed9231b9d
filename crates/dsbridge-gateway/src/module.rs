//! Module and channel aggregates.
//!
//! A [`Module`] is the single record for one physical DS device: its
//! identity, its resolved channel map, the handles for its two
//! connections, and its command queue. Records are created lazily by the
//! [`Registry`](crate::registry::Registry) and live for the rest of the
//! process; only the gateway task ever touches them.

use std::collections::{BTreeMap, VecDeque};
use std::net::Ipv4Addr;

use dsbridge_core::{ChannelId, ChannelType, ModuleId, PutOutcome};
use tokio::sync::oneshot;

use crate::command::CommandConnection;
use crate::listener::ListenerConnection;

/// One channel of a module, with its commands resolved once at
/// construction time. Switch (input) channels carry no commands.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Bus-facing identifier, e.g. `3R`.
    pub id: ChannelId,

    /// Hardware-facing channel address. Usually equals the ordinal but
    /// the device definition may remap it.
    pub address: u8,

    /// Human-readable description.
    pub description: String,

    /// Bus path of this channel's state value.
    pub path: String,

    /// Resolved ON command line (relays only).
    pub on_command: Option<String>,

    /// Resolved OFF command line (relays only).
    pub off_command: Option<String>,
}

impl Channel {
    #[must_use]
    pub fn channel_type(&self) -> ChannelType {
        self.id.channel_type()
    }

    /// Command line driving this channel to `state`, if it is operable.
    #[must_use]
    pub fn command_for(&self, state: bool) -> Option<&str> {
        if state {
            self.on_command.as_deref()
        } else {
            self.off_command.as_deref()
        }
    }
}

/// A command waiting in, or popped from, a module's transmit queue.
///
/// The completion side is a oneshot sender, so the caller's callback can
/// fire at most once; dropping the command (queue teardown) simply
/// closes the channel without fabricating a result.
#[derive(Debug)]
pub struct QueuedCommand {
    /// Literal command line to transmit (no terminator).
    pub line: String,

    /// Completion callback, consumed on acknowledgement.
    pub done: oneshot::Sender<PutOutcome>,
}

/// One physical DS module known to the gateway.
#[derive(Debug)]
pub struct Module {
    /// Canonical identity derived from the network address.
    pub id: ModuleId,

    /// Network address the module speaks from and is commanded at.
    pub ip_address: Ipv4Addr,

    /// Device definition id this module was built from.
    pub device_id: String,

    /// Human-readable description.
    pub description: String,

    /// TCP port for the outbound command connection.
    pub command_port: u16,

    /// Bus path of the switchbank this module is published under.
    pub switchbank_path: String,

    /// Channel map keyed by bus-facing channel id.
    pub channels: BTreeMap<ChannelId, Channel>,

    /// Outbound command connection, if currently open.
    pub command_connection: Option<CommandConnection>,

    /// True while a connect attempt for the command connection is
    /// outstanding, so repeated status contacts don't stack dials.
    pub command_connecting: bool,

    /// Inbound status connection, if currently bound.
    pub listener_connection: Option<ListenerConnection>,

    /// FIFO of commands awaiting transmission. Never contains the
    /// in-flight command.
    pub command_queue: VecDeque<QueuedCommand>,

    /// The single command sent but not yet acknowledged.
    pub in_flight: Option<QueuedCommand>,
}

impl Module {
    /// Number of relay channels in the channel map.
    #[must_use]
    pub fn relay_count(&self) -> usize {
        self.count_of(ChannelType::Relay)
    }

    /// Number of switch channels in the channel map.
    #[must_use]
    pub fn switch_count(&self) -> usize {
        self.count_of(ChannelType::Switch)
    }

    fn count_of(&self, ty: ChannelType) -> usize {
        self.channels
            .values()
            .filter(|c| c.channel_type() == ty)
            .count()
    }

    /// Append a command to the transmit queue. Returns immediately; the
    /// scheduler tick picks it up.
    pub fn enqueue(&mut self, line: String, done: oneshot::Sender<PutOutcome>) {
        self.command_queue.push_back(QueuedCommand { line, done });
    }

    /// Discard all queued and in-flight commands.
    ///
    /// Their completion oneshots drop unfired; callers waiting on them
    /// observe a closed channel. This is the stated connection-loss
    /// semantic, not an oversight.
    pub fn discard_pending(&mut self) {
        self.command_queue.clear();
        self.in_flight = None;
    }

    /// Tear down both connections and every pending command.
    pub fn teardown(&mut self) {
        if let Some(conn) = self.command_connection.take() {
            conn.destroy();
        }
        if let Some(conn) = self.listener_connection.take() {
            conn.destroy();
        }
        self.command_connecting = false;
        self.discard_pending();
    }
}
