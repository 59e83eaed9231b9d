//! Property tests for the protocol layer.

use dsbridge_core::{CommandTemplate, DeviceDefinition};
use dsbridge_protocol::{RawStatusReport, StatusReport, SwitchAction, resolve_command};
use proptest::prelude::*;

fn parametric_device() -> DeviceDefinition {
    DeviceDefinition {
        id: "DS".to_string(),
        relays: 32,
        switches: 8,
        channels: vec![CommandTemplate {
            address: 0,
            oncommand: "SR {c} ON".to_string(),
            offcommand: "SR {c} OFF".to_string(),
        }],
    }
}

proptest! {
    #[test]
    fn resolved_command_embeds_decimal_address(address in 1u8..=32) {
        let device = parametric_device();
        let on = resolve_command(&device, address, SwitchAction::On).unwrap();
        let off = resolve_command(&device, address, SwitchAction::Off).unwrap();
        prop_assert_eq!(on, format!("SR {address} ON"));
        prop_assert_eq!(off, format!("SR {address} OFF"));
    }

    #[test]
    fn decode_preserves_every_configured_position(bits in proptest::collection::vec(any::<bool>(), 1..64)) {
        let line: String = bits.iter().map(|b| if *b { '1' } else { '0' }).collect();
        let raw = RawStatusReport::from_lines("HDR", &line, "");
        let report = StatusReport::decode(&raw, bits.len(), 0).unwrap();
        prop_assert_eq!(report.relays, bits);
    }

    #[test]
    fn switch_spacing_never_changes_decoded_states(
        bits in proptest::collection::vec(any::<bool>(), 1..32),
        gaps in proptest::collection::vec(0usize..3, 1..32),
    ) {
        let packed: String = bits.iter().map(|b| if *b { '1' } else { '0' }).collect();
        let spaced: String = packed
            .chars()
            .zip(gaps.iter().cycle())
            .flat_map(|(c, gap)| std::iter::once(c).chain(std::iter::repeat(' ').take(*gap)))
            .collect();

        let a = RawStatusReport::from_lines("HDR", "0", &packed);
        let b = RawStatusReport::from_lines("HDR", "0", &spaced);
        prop_assert_eq!(
            StatusReport::decode(&a, 1, bits.len()).unwrap(),
            StatusReport::decode(&b, 1, bits.len()).unwrap()
        );
    }
}
