//! Channel state projector.
//!
//! Translates one decoded status report, through a module's channel map,
//! into a single atomic delta batch for the host bus. Each channel whose
//! address falls within the report's bounds contributes its 1-based
//! ordinal under `.order` and a boolean under `.state`; channels outside
//! the bounds are skipped, not errored.

use dsbridge_core::ChannelType;
use dsbridge_protocol::StatusReport;
use serde_json::json;

use crate::bus::Delta;
use crate::module::Module;

/// Build the delta batch for one status report.
#[must_use]
pub fn project_status(module: &Module, report: &StatusReport) -> Delta {
    let mut delta = Delta::new();
    for channel in module.channels.values() {
        let state = match channel.channel_type() {
            ChannelType::Relay => report.relay(channel.address),
            ChannelType::Switch => report.switch(channel.address),
        };
        let Some(state) = state else { continue };
        delta.add_value(
            format!("{}.{}.order", module.switchbank_path, channel.id),
            json!(channel.id.ordinal()),
        );
        delta.add_value(&channel.path, json!(state));
    }
    delta
}
