//! Wire protocol for the Devantech DS range.
//!
//! DS modules speak newline-delimited ASCII over two TCP connections:
//! an inbound status connection (module dials the host and pushes
//! three-line reports) and an outbound command connection (host dials
//! the module, writes one command per line and reads `Ok`
//! acknowledgement lines back).
//!
//! This crate covers the pure protocol layer: command-template
//! resolution, status-report parsing, and tokio codecs for both
//! connection roles. Connection management lives in `dsbridge-gateway`.

pub mod codec;
pub mod command;
pub mod status;

pub use codec::{CommandCodec, StatusCodec};
pub use command::{SwitchAction, resolve_command};
pub use status::{RawStatusReport, StatusReport};
