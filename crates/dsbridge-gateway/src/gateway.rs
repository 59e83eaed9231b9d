//! The gateway task: single owner of all module state.
//!
//! `Gateway::run` is one `tokio::select!` loop over the event channel
//! and the transmit-queue heartbeat. Socket tasks (status readers, ack
//! readers, connect attempts) and callers all communicate with it
//! through [`GatewayEvent`]s, so module records, queues, and in-flight
//! slots are mutated from exactly one place. Commands enqueued for the
//! same module go out in FIFO order with at most one unacknowledged at a
//! time; the protocol has no correlation token, so acknowledgements are
//! matched purely against the single in-flight slot.

use std::net::{IpAddr, SocketAddr};

use dsbridge_core::constants::COMMAND_ACK;
use dsbridge_core::{
    ChannelId, Error, GatewayConfig, ModuleId, PutOutcome, Result,
};
use dsbridge_protocol::{RawStatusReport, StatusReport};
use regex::Regex;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::bus::BusSink;
use crate::command::{self, CommandConnection};
use crate::event::{GatewayEvent, PutResponse};
use crate::listener::{ListenerConnection, StatusListener};
use crate::projector::project_status;
use crate::registry::Registry;

/// Snapshot of one module for the operator surface.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleStatus {
    pub module: ModuleId,
    pub address: String,
    pub relay_count: usize,
    pub switch_count: usize,
    pub connected: bool,
}

/// Caller-facing handle. Cheap to clone; every operation is a message
/// to the gateway task.
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    events: mpsc::UnboundedSender<GatewayEvent>,
}

impl GatewayHandle {
    /// Request a channel be driven to `state`.
    ///
    /// `module_path` is the switchbank path the module was published
    /// under, e.g. `electrical.switches.bank.192168001010`. Returns
    /// `PutResponse::Pending` with a completion receiver if the command
    /// was enqueued, or `PutResponse::Completed` with status 400 if the
    /// module, channel, or command path cannot be resolved.
    ///
    /// # Errors
    /// `Error::GatewayStopped` if the gateway task is gone.
    pub async fn put(
        &self,
        module_path: &str,
        channel: ChannelId,
        state: bool,
    ) -> Result<PutResponse> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(GatewayEvent::Put {
                module_path: module_path.to_string(),
                channel,
                state,
                reply,
            })
            .map_err(|_| Error::GatewayStopped)?;
        rx.await.map_err(|_| Error::GatewayStopped)
    }

    /// Snapshot of every known module.
    ///
    /// # Errors
    /// `Error::GatewayStopped` if the gateway task is gone.
    pub async fn module_status(&self) -> Result<Vec<ModuleStatus>> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(GatewayEvent::QueryStatus { reply })
            .map_err(|_| Error::GatewayStopped)?;
        rx.await.map_err(|_| Error::GatewayStopped)
    }

    /// Ask the gateway to stop, closing every connection.
    pub fn shutdown(&self) {
        let _ = self.events.send(GatewayEvent::Shutdown);
    }
}

/// The gateway itself. Bind, take a handle, then hand the instance to
/// `run()` on its own task.
#[derive(Debug)]
pub struct Gateway {
    registry: Registry,
    bus: BusSink,
    filter: Option<Regex>,
    listener: Option<StatusListener>,
    listener_task: Option<JoinHandle<()>>,
    events_tx: mpsc::UnboundedSender<GatewayEvent>,
    events_rx: mpsc::UnboundedReceiver<GatewayEvent>,
    generations: u64,
}

impl Gateway {
    /// Compile the allow-list filter and bind the status listener.
    ///
    /// # Errors
    /// `Error::InvalidClientFilter` for a malformed filter regex, or an
    /// IO error if the listener port cannot be bound.
    pub async fn bind(config: GatewayConfig, bus: BusSink) -> Result<Self> {
        let filter = config
            .client_ip_filter
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::InvalidClientFilter(e.to_string()))?;
        let listener = StatusListener::bind(config.status_listener_port).await?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Gateway {
            registry: Registry::new(config, bus.clone()),
            bus,
            filter,
            listener: Some(listener),
            listener_task: None,
            events_tx,
            events_rx,
            generations: 0,
        })
    }

    /// The status listener's bound address (port 0 resolves here).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        match &self.listener {
            Some(listener) => listener.local_addr(),
            None => Err(Error::GatewayStopped),
        }
    }

    /// A handle for callers. Valid until the gateway stops.
    #[must_use]
    pub fn handle(&self) -> GatewayHandle {
        GatewayHandle {
            events: self.events_tx.clone(),
        }
    }

    /// Run the event loop until shutdown. Consumes the gateway.
    pub async fn run(mut self) {
        if let Some(listener) = self.listener.take() {
            self.listener_task = Some(listener.spawn(self.filter.clone(), self.events_tx.clone()));
        }
        let mut heartbeat = tokio::time::interval(self.registry.config().heartbeat());
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = heartbeat.tick() => self.process_command_queues().await,
                event = self.events_rx.recv() => match event {
                    Some(GatewayEvent::Shutdown) | None => break,
                    Some(event) => self.handle_event(event),
                },
            }
        }

        info!("gateway stopping, closing all module connections");
        for module in self.registry.iter_mut() {
            module.teardown();
        }
        if let Some(task) = self.listener_task.take() {
            task.abort();
        }
    }

    fn handle_event(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::StatusContact { addr, stream } => {
                self.handle_status_contact(addr, stream);
            }
            GatewayEvent::StatusReport {
                module,
                generation,
                report,
            } => self.handle_status_report(module, generation, report),
            GatewayEvent::StatusClosed { module, generation } => {
                self.handle_status_closed(module, generation);
            }
            GatewayEvent::CommandConnected { module, stream } => {
                self.handle_command_connected(module, stream);
            }
            GatewayEvent::CommandConnectFailed { module, error } => {
                if let Some(record) = self.registry.get_mut(&module) {
                    record.command_connecting = false;
                }
                warn!(module = %module, "command connection failed: {error}");
            }
            GatewayEvent::CommandAck {
                module,
                generation,
                line,
            } => self.handle_command_ack(module, generation, &line),
            GatewayEvent::CommandClosed { module, generation } => {
                self.handle_command_closed(module, generation);
            }
            GatewayEvent::Put {
                module_path,
                channel,
                state,
                reply,
            } => {
                let response = self.handle_put(&module_path, channel, state);
                let _ = reply.send(response);
            }
            GatewayEvent::QueryStatus { reply } => {
                let _ = reply.send(self.module_status());
            }
            GatewayEvent::Shutdown => unreachable!("handled by the run loop"),
        }
    }

    /// Status contact from an allow-listed peer: resolve or create the
    /// module, replace any previous listener connection, and trigger
    /// the command dial if none is open. Status contact is the only
    /// trigger for command capability, since the module's address is
    /// only known once it has spoken.
    fn handle_status_contact(&mut self, addr: SocketAddr, stream: TcpStream) {
        let IpAddr::V4(ip) = addr.ip() else {
            warn!(%addr, "rejecting non-IPv4 status contact");
            return;
        };
        let generation = self.next_generation();
        let events = self.events_tx.clone();
        let module = match self.registry.get_or_create(ip) {
            Ok(module) => module,
            Err(e) => {
                warn!(%addr, "cannot bind status connection: {e}");
                return;
            }
        };

        if let Some(previous) = module.listener_connection.take() {
            debug!(module = %module.id, "replacing existing listener connection");
            previous.destroy();
        }
        module.listener_connection = Some(ListenerConnection::new(
            module.id, generation, addr, stream, events,
        ));

        if module.command_connection.is_none() && !module.command_connecting {
            module.command_connecting = true;
            command::spawn_connect(
                module.id,
                module.ip_address,
                module.command_port,
                self.events_tx.clone(),
            );
        }
    }

    fn handle_status_report(&mut self, id: ModuleId, generation: u64, raw: RawStatusReport) {
        let Some(module) = self.registry.get_mut(&id) else {
            return;
        };
        if module.listener_connection.as_ref().map(ListenerConnection::generation)
            != Some(generation)
        {
            trace!(module = %id, "dropping report from replaced listener connection");
            return;
        }
        match StatusReport::decode(&raw, module.relay_count(), module.switch_count()) {
            Ok(report) => {
                let mut delta = project_status(module, &report);
                delta.commit(&self.bus);
            }
            Err(e) => {
                // One bad report must not affect the next one.
                debug!(module = %id, "discarding status report: {e}");
            }
        }
    }

    fn handle_status_closed(&mut self, id: ModuleId, generation: u64) {
        let Some(module) = self.registry.get_mut(&id) else {
            return;
        };
        if module.listener_connection.as_ref().map(ListenerConnection::generation)
            == Some(generation)
        {
            debug!(module = %id, "status connection closed");
            if let Some(conn) = module.listener_connection.take() {
                conn.destroy();
            }
        }
    }

    /// The command dial completed. Queued commands survive; anything
    /// that was in flight on a previous connection is lost, not
    /// retried.
    fn handle_command_connected(&mut self, id: ModuleId, stream: TcpStream) {
        let generation = self.next_generation();
        let events = self.events_tx.clone();
        let Some(module) = self.registry.get_mut(&id) else {
            return;
        };
        module.command_connecting = false;
        if let Some(previous) = module.command_connection.take() {
            previous.destroy();
        }
        module.in_flight = None;
        module.command_connection = Some(CommandConnection::new(id, generation, stream, events));
        info!(
            module = %id,
            port = module.command_port,
            "command connection open"
        );
    }

    fn handle_command_ack(&mut self, id: ModuleId, generation: u64, line: &str) {
        let Some(module) = self.registry.get_mut(&id) else {
            return;
        };
        if module.command_connection.as_ref().map(CommandConnection::generation)
            != Some(generation)
        {
            trace!(module = %id, "dropping response from replaced command connection");
            return;
        }
        if line != COMMAND_ACK {
            trace!(module = %id, line, "ignoring unrecognized command response");
            return;
        }
        match module.in_flight.take() {
            Some(cmd) => {
                trace!(module = %id, command = %cmd.line, "command acknowledged");
                let _ = cmd.done.send(PutOutcome::completed_ok());
            }
            None => {
                debug!(module = %id, "orphan command response");
            }
        }
    }

    /// Command connection lost: the handle, the queue, and the
    /// in-flight slot are all discarded. Recovery happens on the
    /// module's next status contact.
    fn handle_command_closed(&mut self, id: ModuleId, generation: u64) {
        let Some(module) = self.registry.get_mut(&id) else {
            return;
        };
        if module.command_connection.as_ref().map(CommandConnection::generation)
            != Some(generation)
        {
            return;
        }
        debug!(module = %id, "command connection closed, discarding pending commands");
        if let Some(conn) = module.command_connection.take() {
            conn.destroy();
        }
        module.discard_pending();
    }

    fn handle_put(&mut self, module_path: &str, channel_id: ChannelId, state: bool) -> PutResponse {
        let bad_request = || PutResponse::Completed(PutOutcome::bad_request());

        let Some(module_id) = module_id_from_path(module_path) else {
            debug!(module_path, "PUT targets an unparseable module path");
            return bad_request();
        };
        let module = match self.registry.get_or_create(module_id.to_addr()) {
            Ok(module) => module,
            Err(e) => {
                debug!(module = %module_id, "PUT cannot resolve module: {e}");
                return bad_request();
            }
        };
        if module.command_connection.is_none() {
            debug!(
                module = %module_id,
                "PUT cannot be actioned (no open command connection)"
            );
            return bad_request();
        }
        let Some(channel) = module.channels.get(&channel_id) else {
            debug!(module = %module_id, channel = %channel_id, "PUT targets unknown channel");
            return bad_request();
        };
        let Some(line) = channel.command_for(state) else {
            debug!(module = %module_id, channel = %channel_id, "PUT targets an inoperable channel");
            return bad_request();
        };

        let line = line.to_string();
        let (done_tx, done_rx) = oneshot::channel();
        module.enqueue(line, done_tx);
        PutResponse::Pending { done: done_rx }
    }

    /// One transmit pass: for every module with an open command
    /// connection, nothing in flight, and a non-empty queue, send the
    /// head of the queue. At most one command per module per tick; a
    /// module without a connection is skipped with its queue intact.
    async fn process_command_queues(&mut self) {
        for module in self.registry.iter_mut() {
            if module.in_flight.is_some() || module.command_queue.is_empty() {
                continue;
            }
            let Some(conn) = module.command_connection.as_mut() else {
                continue;
            };
            let Some(cmd) = module.command_queue.pop_front() else {
                continue;
            };
            match conn.send(&cmd.line).await {
                Ok(()) => {
                    info!(module = %module.id, command = %cmd.line, "sent command");
                    module.in_flight = Some(cmd);
                }
                Err(e) => {
                    warn!(module = %module.id, "command write failed: {e}");
                    drop(cmd);
                    if let Some(conn) = module.command_connection.take() {
                        conn.destroy();
                    }
                    module.discard_pending();
                }
            }
        }
    }

    fn module_status(&self) -> Vec<ModuleStatus> {
        self.registry
            .iter()
            .map(|module| ModuleStatus {
                module: module.id,
                address: module.ip_address.to_string(),
                relay_count: module.relay_count(),
                switch_count: module.switch_count(),
                connected: module.command_connection.is_some(),
            })
            .collect()
    }

    fn next_generation(&mut self) -> u64 {
        self.generations += 1;
        self.generations
    }
}

/// Extract the module id from a switchbank path
/// (`electrical.switches.bank.<id>`).
fn module_id_from_path(path: &str) -> Option<ModuleId> {
    path.split('.').nth(3)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_id_parses_from_switchbank_path() {
        let id = module_id_from_path("electrical.switches.bank.192168001010").unwrap();
        assert_eq!(id.to_string(), "192168001010");
    }

    #[test]
    fn module_id_from_short_or_garbage_path_is_none() {
        assert!(module_id_from_path("electrical.switches").is_none());
        assert!(module_id_from_path("electrical.switches.bank.notanid").is_none());
        assert!(module_id_from_path("").is_none());
    }

    #[tokio::test]
    async fn bind_rejects_invalid_filter() {
        let (bus, _rx) = mpsc::unbounded_channel();
        let config = GatewayConfig {
            client_ip_filter: Some("[".to_string()),
            status_listener_port: 0,
            ..GatewayConfig::default()
        };
        let result = Gateway::bind(config, bus).await;
        assert!(matches!(result, Err(Error::InvalidClientFilter(_))));
    }

    #[tokio::test]
    async fn put_on_unknown_path_is_bad_request() {
        let (bus, _rx) = mpsc::unbounded_channel();
        let config = GatewayConfig {
            status_listener_port: 0,
            ..GatewayConfig::default()
        };
        let gateway = Gateway::bind(config, bus).await.unwrap();
        let handle = gateway.handle();
        tokio::spawn(gateway.run());

        let response = handle
            .put("not.a.switchbank", "1R".parse().unwrap(), true)
            .await
            .unwrap();
        match response {
            PutResponse::Completed(outcome) => assert_eq!(outcome.status_code, 400),
            PutResponse::Pending { .. } => panic!("expected completed/400"),
        }
        handle.shutdown();
    }

    #[tokio::test]
    async fn put_without_command_connection_is_bad_request() {
        let (bus, _rx) = mpsc::unbounded_channel();
        let config = GatewayConfig {
            status_listener_port: 0,
            ..GatewayConfig::default()
        };
        let gateway = Gateway::bind(config, bus).await.unwrap();
        let handle = gateway.handle();
        tokio::spawn(gateway.run());

        // The module record is created by the PUT, but it has no
        // command connection, so the request cannot be actioned.
        let response = handle
            .put(
                "electrical.switches.bank.010000000009",
                "1R".parse().unwrap(),
                true,
            )
            .await
            .unwrap();
        assert!(matches!(
            response,
            PutResponse::Completed(PutOutcome {
                status_code: 400,
                ..
            })
        ));

        // The record exists now.
        let status = handle.module_status().await.unwrap();
        assert_eq!(status.len(), 1);
        assert!(!status[0].connected);
        handle.shutdown();
    }

    #[tokio::test]
    async fn stale_generation_ack_does_not_complete_in_flight_command() {
        let (bus, _rx) = mpsc::unbounded_channel();
        let config = GatewayConfig {
            status_listener_port: 0,
            ..GatewayConfig::default()
        };
        let mut gateway = Gateway::bind(config, bus).await.unwrap();

        let id = ModuleId::from_addr("10.0.0.8".parse().unwrap());
        let events = gateway.events_tx.clone();
        let module = gateway.registry.get_or_create(id.to_addr()).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        module.command_connection = Some(CommandConnection::new(id, 2, stream, events));

        let (done_tx, mut done_rx) = oneshot::channel();
        module.in_flight = Some(crate::module::QueuedCommand {
            line: "SR 1 ON".to_string(),
            done: done_tx,
        });

        // An acknowledgement tagged with a replaced connection's
        // generation is dropped; the in-flight slot stays occupied.
        gateway.handle_command_ack(id, 1, COMMAND_ACK);
        assert!(gateway.registry.get(&id).unwrap().in_flight.is_some());
        assert!(done_rx.try_recv().is_err());

        // The current generation completes it.
        gateway.handle_command_ack(id, 2, COMMAND_ACK);
        assert!(gateway.registry.get(&id).unwrap().in_flight.is_none());
        assert_eq!(done_rx.try_recv().unwrap(), PutOutcome::completed_ok());
    }

    #[tokio::test]
    async fn handle_reports_stopped_after_shutdown() {
        let (bus, _rx) = mpsc::unbounded_channel();
        let config = GatewayConfig {
            status_listener_port: 0,
            ..GatewayConfig::default()
        };
        let gateway = Gateway::bind(config, bus).await.unwrap();
        let handle = gateway.handle();
        let task = tokio::spawn(gateway.run());

        handle.shutdown();
        task.await.unwrap();

        let result = handle.module_status().await;
        assert!(matches!(result, Err(Error::GatewayStopped)));
    }
}
