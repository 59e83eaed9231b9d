//! Module connection and command-queueing core for the DS bridge.
//!
//! This crate manages a fleet of DS relay/switch modules, each with two
//! independently-failing TCP connections: an inbound status connection
//! the module initiates, and an outbound command connection the gateway
//! initiates. It presents a synchronous-looking "set channel state"
//! operation to callers while serializing command traffic per module.
//!
//! # Architecture
//!
//! ```text
//! DS module ──(status, inbound)──> StatusListener ─┐
//!                                                  │ events
//! DS module <─(command, outbound)── CommandConn <──┤
//!                                                  ▼
//! caller ──PUT──> GatewayHandle ──events──> Gateway task
//!                                                  │
//!                                   Registry / queues / projector
//!                                                  │
//!                                                  ▼
//!                                          host bus sink (mpsc)
//! ```
//!
//! All mutable state (module records, queues, in-flight slots) is owned
//! by the single `Gateway` task; sockets and callers reach it only
//! through its event channel, so no locking is needed and per-module
//! FIFO ordering falls out of the loop's serialization.

pub mod bus;
pub mod command;
pub mod event;
pub mod gateway;
pub mod listener;
pub mod module;
pub mod projector;
pub mod registry;

pub use bus::{BusMessage, BusSink, Delta, PathMeta, PathValue};
pub use event::{GatewayEvent, PutResponse};
pub use gateway::{Gateway, GatewayHandle, ModuleStatus};
pub use module::{Channel, Module, QueuedCommand};
pub use registry::Registry;
