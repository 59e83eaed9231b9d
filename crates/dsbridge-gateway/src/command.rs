//! Command connection manager.
//!
//! The gateway dials each module's command port the first time the
//! module makes status contact. The connection is half-duplex in
//! practice: the gateway writes one command line at a time and the
//! module answers each with an `Ok` line. A reader task forwards
//! acknowledgement lines and the eventual close back to the gateway as
//! events tagged with this connection's generation, so traffic from a
//! connection that was since replaced is ignored.
//!
//! There is no proactive reconnect timer: a dropped command connection
//! is reopened lazily on the module's next status contact.

use std::net::Ipv4Addr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dsbridge_core::{ModuleId, Result};
use dsbridge_protocol::CommandCodec;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, trace, warn};

use crate::event::GatewayEvent;

/// Timeout for the outbound TCP connect. Connect failures are reported
/// back as events; the dial is retried on the next status contact.
const CONNECT_TIMEOUT: Duration = Duration::from_millis(3000);

/// An open outbound command connection to one module.
#[derive(Debug)]
pub struct CommandConnection {
    generation: u64,
    writer: FramedWrite<OwnedWriteHalf, CommandCodec>,
    reader: JoinHandle<()>,
    connected_at: DateTime<Utc>,
}

impl CommandConnection {
    /// Wrap an established stream: split it, spawn the acknowledgement
    /// reader, and keep the write half for the scheduler.
    pub fn new(
        module: ModuleId,
        generation: u64,
        stream: TcpStream,
        events: mpsc::UnboundedSender<GatewayEvent>,
    ) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(module = %module, "failed to set TCP_NODELAY on command connection: {e}");
        }
        let (read_half, write_half) = stream.into_split();
        let reader = spawn_ack_reader(module, generation, read_half, events);
        CommandConnection {
            generation,
            writer: FramedWrite::new(write_half, CommandCodec::new()),
            reader,
            connected_at: Utc::now(),
        }
    }

    /// Generation number distinguishing this connection from any it
    /// replaced.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Write one command line (terminator appended by the codec).
    pub async fn send(&mut self, line: &str) -> Result<()> {
        trace!(line, "writing command line");
        self.writer.send(line.to_string()).await
    }

    /// Tear the connection down. Dropping both halves closes the socket.
    pub fn destroy(self) {
        self.reader.abort();
    }
}

/// Dial a module's command port on a background task, reporting the
/// result back as a gateway event.
pub fn spawn_connect(
    module: ModuleId,
    addr: Ipv4Addr,
    port: u16,
    events: mpsc::UnboundedSender<GatewayEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(module = %module, %addr, port, "opening command connection");
        let attempt =
            tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((addr, port))).await;
        let event = match attempt {
            Ok(Ok(stream)) => GatewayEvent::CommandConnected { module, stream },
            Ok(Err(e)) => GatewayEvent::CommandConnectFailed {
                module,
                error: e.to_string(),
            },
            Err(_) => GatewayEvent::CommandConnectFailed {
                module,
                error: format!("connect timeout after {}ms", CONNECT_TIMEOUT.as_millis()),
            },
        };
        let _ = events.send(event);
    })
}

/// Read acknowledgement lines until the peer closes, then report the
/// close. Codec errors end the connection; the module will redial.
fn spawn_ack_reader(
    module: ModuleId,
    generation: u64,
    read_half: OwnedReadHalf,
    events: mpsc::UnboundedSender<GatewayEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut framed = FramedRead::new(read_half, CommandCodec::new());
        while let Some(result) = framed.next().await {
            match result {
                Ok(line) => {
                    if events
                        .send(GatewayEvent::CommandAck {
                            module,
                            generation,
                            line,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
                Err(e) => {
                    warn!(module = %module, "command connection read error: {e}");
                    break;
                }
            }
        }
        let _ = events.send(GatewayEvent::CommandClosed { module, generation });
    })
}
