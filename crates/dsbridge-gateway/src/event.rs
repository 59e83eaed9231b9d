//! Events feeding the gateway task.
//!
//! Everything that touches module state arrives here: inbound status
//! traffic, command-connection lifecycle, caller PUT requests, and
//! shutdown. Connection-scoped events carry the generation number of
//! the connection that produced them, so events from a connection that
//! has since been replaced are recognized and dropped.

use std::net::SocketAddr;

use dsbridge_core::{ChannelId, ModuleId, PutOutcome};
use dsbridge_protocol::RawStatusReport;
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use crate::gateway::ModuleStatus;

/// Immediate answer to a PUT request.
#[derive(Debug)]
pub enum PutResponse {
    /// The request could not be enqueued; the outcome is final.
    Completed(PutOutcome),
    /// The command was queued. The receiver resolves when the module
    /// acknowledges, or closes if the command is discarded first.
    Pending {
        done: oneshot::Receiver<PutOutcome>,
    },
}

/// Input to the gateway event loop.
#[derive(Debug)]
pub enum GatewayEvent {
    /// An allow-listed peer opened a status connection.
    StatusContact {
        addr: SocketAddr,
        stream: TcpStream,
    },

    /// A framed status report arrived on a listener connection.
    StatusReport {
        module: ModuleId,
        generation: u64,
        report: RawStatusReport,
    },

    /// A listener connection closed.
    StatusClosed { module: ModuleId, generation: u64 },

    /// An outbound command connect attempt succeeded.
    CommandConnected { module: ModuleId, stream: TcpStream },

    /// An outbound command connect attempt failed.
    CommandConnectFailed { module: ModuleId, error: String },

    /// A line arrived on a command connection (acknowledgement stream).
    CommandAck {
        module: ModuleId,
        generation: u64,
        line: String,
    },

    /// A command connection closed.
    CommandClosed { module: ModuleId, generation: u64 },

    /// Caller request to drive a channel to a state.
    Put {
        module_path: String,
        channel: ChannelId,
        state: bool,
        reply: oneshot::Sender<PutResponse>,
    },

    /// Snapshot request for the operator surface.
    QueryStatus {
        reply: oneshot::Sender<Vec<ModuleStatus>>,
    },

    /// Stop the gateway, closing every connection.
    Shutdown,
}
