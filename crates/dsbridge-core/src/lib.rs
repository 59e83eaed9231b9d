pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::{
    ChannelConfig, CommandTemplate, DeviceDefinition, GatewayConfig, ModuleConfig,
};
pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
