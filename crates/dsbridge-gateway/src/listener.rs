//! Status listener: the TCP server modules dial into.
//!
//! DS modules initiate the status connection themselves and, in several
//! firmware variants, reconnect for every push. The listener's accept
//! loop therefore does the minimum: authenticate the peer address
//! against the allow-list regex and hand accepted streams to the
//! gateway as events. Everything stateful (module resolution, replacing
//! a stale connection, triggering the command dial) happens on the
//! gateway task.
//!
//! A rejected peer is dropped immediately: no module record is created
//! or touched, nothing is queued.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dsbridge_core::{Error, ModuleId, Result};
use dsbridge_protocol::StatusCodec;
use futures::StreamExt;
use regex::Regex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::event::GatewayEvent;

/// Pause after an `accept` error before retrying, so a persistent
/// failure (fd exhaustion, say) does not spin the loop.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Listening socket for inbound module status connections.
#[derive(Debug)]
pub struct StatusListener {
    listener: tokio::net::TcpListener,
}

impl StatusListener {
    /// Bind the listener to the given port on all interfaces.
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
        info!("listening for DS module connections on {}", listener.local_addr()?);
        Ok(StatusListener { listener })
    }

    /// The bound address (useful with port 0 in tests).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop until the event channel closes.
    ///
    /// `filter` is matched against the peer's dotted IPv4 address; a
    /// non-matching or non-IPv4 peer is destroyed without further
    /// action. `None` accepts every peer.
    pub fn spawn(
        self,
        filter: Option<Regex>,
        events: mpsc::UnboundedSender<GatewayEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let (stream, addr) = match self.listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("status listener accept error: {e}");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                        continue;
                    }
                };

                match authorize(&filter, addr) {
                    Ok(()) => {
                        debug!(%addr, "status contact");
                        if events
                            .send(GatewayEvent::StatusContact { addr, stream })
                            .is_err()
                        {
                            // Gateway is gone; stop accepting.
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("{e}");
                        drop(stream);
                    }
                }
            }
        })
    }
}

/// Check a peer against the allow-list.
fn authorize(filter: &Option<Regex>, addr: SocketAddr) -> Result<()> {
    let rejected = || Error::UnauthorizedOrigin {
        addr: addr.ip().to_string(),
    };
    let IpAddr::V4(ip) = addr.ip() else {
        return Err(rejected());
    };
    match filter {
        Some(regex) if !regex.is_match(&ip.to_string()) => Err(rejected()),
        _ => Ok(()),
    }
}

/// A bound inbound status connection for one module.
///
/// The stream itself lives in the reader task; the module record keeps
/// this handle so a replacement contact can destroy the previous
/// connection (replace, never merge).
#[derive(Debug)]
pub struct ListenerConnection {
    generation: u64,
    peer: SocketAddr,
    reader: JoinHandle<()>,
    connected_at: DateTime<Utc>,
}

impl ListenerConnection {
    /// Take ownership of an accepted stream and spawn its report reader.
    pub fn new(
        module: ModuleId,
        generation: u64,
        peer: SocketAddr,
        stream: TcpStream,
        events: mpsc::UnboundedSender<GatewayEvent>,
    ) -> Self {
        let reader = spawn_report_reader(module, generation, stream, events);
        ListenerConnection {
            generation,
            peer,
            reader,
            connected_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    #[must_use]
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Tear the connection down; dropping the stream closes the socket.
    pub fn destroy(self) {
        self.reader.abort();
    }
}

/// Frame status reports off the stream until the peer closes.
fn spawn_report_reader(
    module: ModuleId,
    generation: u64,
    stream: TcpStream,
    events: mpsc::UnboundedSender<GatewayEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut framed = FramedRead::new(stream, StatusCodec::new());
        while let Some(result) = framed.next().await {
            match result {
                Ok(report) => {
                    if events
                        .send(GatewayEvent::StatusReport {
                            module,
                            generation,
                            report,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
                Err(e) => {
                    warn!(module = %module, "status connection read error: {e}");
                    break;
                }
            }
        }
        let _ = events.send(GatewayEvent::StatusClosed { module, generation });
    })
}
