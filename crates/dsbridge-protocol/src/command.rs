//! Device command table: template selection and placeholder substitution.
//!
//! A [`DeviceDefinition`](dsbridge_core::DeviceDefinition) carries a list
//! of ON/OFF command templates. If the list is exactly one entry with
//! address 0 the template is parametric and covers every relay address;
//! otherwise the entry whose address matches the channel is selected.
//! Every `{c}` in the selected template is replaced with the decimal
//! channel address.
//!
//! Resolution is intended to run once per channel when a module record is
//! built; the resolved strings are stored on the channel and reused for
//! every transmission.

use dsbridge_core::constants::CHANNEL_PLACEHOLDER;
use dsbridge_core::{CommandTemplate, DeviceDefinition, Error, Result};

/// Direction of a relay operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchAction {
    On,
    Off,
}

impl SwitchAction {
    /// Action for a desired boolean channel state.
    #[must_use]
    pub fn from_state(state: bool) -> Self {
        if state { SwitchAction::On } else { SwitchAction::Off }
    }
}

/// Resolve the command line operating `channel_address` on `device`.
///
/// # Errors
/// Returns `Error::UnresolvedCommand` if no template covers the address.
pub fn resolve_command(
    device: &DeviceDefinition,
    channel_address: u8,
    action: SwitchAction,
) -> Result<String> {
    let template = select_template(device, channel_address).ok_or_else(|| {
        Error::UnresolvedCommand {
            device_id: device.id.clone(),
            address: channel_address,
        }
    })?;
    let raw = match action {
        SwitchAction::On => &template.oncommand,
        SwitchAction::Off => &template.offcommand,
    };
    Ok(raw.replace(CHANNEL_PLACEHOLDER, &channel_address.to_string()))
}

fn select_template(device: &DeviceDefinition, channel_address: u8) -> Option<&CommandTemplate> {
    match device.channels.as_slice() {
        // A lone address-0 entry is parametric and covers every address.
        [only] if only.address == 0 => Some(only),
        templates => templates.iter().find(|t| t.address == channel_address),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parametric_device() -> DeviceDefinition {
        DeviceDefinition::builtin()
            .into_iter()
            .find(|d| d.id == "DS")
            .unwrap()
    }

    fn per_address_device() -> DeviceDefinition {
        DeviceDefinition {
            id: "CUSTOM".to_string(),
            relays: 2,
            switches: 0,
            channels: vec![
                CommandTemplate {
                    address: 1,
                    oncommand: "A ON".to_string(),
                    offcommand: "A OFF".to_string(),
                },
                CommandTemplate {
                    address: 2,
                    oncommand: "B {c} ON".to_string(),
                    offcommand: "B {c} OFF".to_string(),
                },
            ],
        }
    }

    #[rstest]
    #[case(3, SwitchAction::On, "SR 3 ON")]
    #[case(3, SwitchAction::Off, "SR 3 OFF")]
    #[case(1, SwitchAction::On, "SR 1 ON")]
    #[case(32, SwitchAction::Off, "SR 32 OFF")]
    fn parametric_template_covers_every_address(
        #[case] address: u8,
        #[case] action: SwitchAction,
        #[case] expected: &str,
    ) {
        let device = parametric_device();
        assert_eq!(resolve_command(&device, address, action).unwrap(), expected);
    }

    #[test]
    fn per_address_template_is_selected_by_address() {
        let device = per_address_device();
        assert_eq!(
            resolve_command(&device, 1, SwitchAction::On).unwrap(),
            "A ON"
        );
        assert_eq!(
            resolve_command(&device, 2, SwitchAction::Off).unwrap(),
            "B 2 OFF"
        );
    }

    #[test]
    fn missing_template_is_unresolved() {
        let device = per_address_device();
        let err = resolve_command(&device, 3, SwitchAction::On).unwrap_err();
        assert!(matches!(
            err,
            Error::UnresolvedCommand { address: 3, .. }
        ));
    }

    #[test]
    fn address_zero_among_many_is_not_parametric() {
        let mut device = per_address_device();
        device.channels.push(CommandTemplate {
            address: 0,
            oncommand: "Z {c} ON".to_string(),
            offcommand: "Z {c} OFF".to_string(),
        });
        // With more than one entry the address-0 template no longer
        // applies to arbitrary addresses.
        assert!(resolve_command(&device, 7, SwitchAction::On).is_err());
    }

    #[test]
    fn every_placeholder_occurrence_is_substituted() {
        let device = DeviceDefinition {
            id: "ECHO".to_string(),
            relays: 1,
            switches: 0,
            channels: vec![CommandTemplate {
                address: 0,
                oncommand: "SET {c} OF {c}".to_string(),
                offcommand: "CLR {c}".to_string(),
            }],
        };
        assert_eq!(
            resolve_command(&device, 12, SwitchAction::On).unwrap(),
            "SET 12 OF 12"
        );
    }

    #[test]
    fn action_from_state() {
        assert_eq!(SwitchAction::from_state(true), SwitchAction::On);
        assert_eq!(SwitchAction::from_state(false), SwitchAction::Off);
    }
}
