use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Configuration-time errors: fatal to one module's creation only
    #[error("Unknown device id: {device_id}")]
    UnknownDevice { device_id: String },

    #[error("No command template for address {address} on device {device_id}")]
    UnresolvedCommand { device_id: String, address: u8 },

    // Per-report errors: logged and discarded, module keeps running
    #[error("Malformed status report: {reason}")]
    MalformedStatus { reason: String },

    // Connection-path errors
    #[error("Connection from unauthorized origin: {addr}")]
    UnauthorizedOrigin { addr: String },

    #[error("Module {module} has no open command connection")]
    DisconnectedCommandPath { module: String },

    // Identifier errors
    #[error("Invalid module id: {0}")]
    InvalidModuleId(String),

    #[error("Invalid channel id: {0}")]
    InvalidChannelId(String),

    #[error("Module {module} has no channel {channel}")]
    ChannelNotFound { module: String, channel: String },

    #[error("Invalid client IP filter: {0}")]
    InvalidClientFilter(String),

    // Gateway lifecycle
    #[error("Gateway event loop has stopped")]
    GatewayStopped,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
