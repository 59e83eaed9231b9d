//! Module registry: the single ownership point for module records.
//!
//! Records are created lazily on first contact (or first PUT) and live
//! for the process lifetime; `get_or_create` is the only creation path,
//! which is what guarantees one queue and one listener binding per
//! physical module. Creation resolves the device definition, builds the
//! channel map with commands substituted once, and publishes module and
//! channel metadata to the host bus exactly once.
//!
//! Creation failures (`UnknownDevice`, `UnresolvedCommand`) abort the
//! whole module: a half-configured module is worse than none. Other
//! modules are unaffected.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::Ipv4Addr;

use dsbridge_core::{ChannelId, ChannelType, Error, GatewayConfig, ModuleId, Result};
use dsbridge_protocol::{SwitchAction, resolve_command};
use serde_json::json;
use tracing::{debug, info};

use crate::bus::{BusSink, Delta};
use crate::module::{Channel, Module};

/// Owns every known module record.
#[derive(Debug)]
pub struct Registry {
    config: GatewayConfig,
    bus: BusSink,
    modules: HashMap<ModuleId, Module>,
}

impl Registry {
    pub fn new(config: GatewayConfig, bus: BusSink) -> Self {
        Registry {
            config,
            bus,
            modules: HashMap::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Look up the module for `addr`, creating it on first contact.
    ///
    /// An existing record is returned untouched: no side effects re-run.
    ///
    /// # Errors
    /// `UnknownDevice` if no device definition matches, and
    /// `UnresolvedCommand` if any relay channel lacks a template. In
    /// both cases no record is stored.
    pub fn get_or_create(&mut self, addr: Ipv4Addr) -> Result<&mut Module> {
        let id = ModuleId::from_addr(addr);
        // Entry-style double lookup keeps the creation path fallible.
        if !self.modules.contains_key(&id) {
            let module = self.create_module(id, addr)?;
            self.publish_metadata(&module);
            info!(module = %id, %addr, device = module.device_id, "created module record");
            self.modules.insert(id, module);
        }
        Ok(self
            .modules
            .get_mut(&id)
            .unwrap_or_else(|| unreachable!("record inserted above")))
    }

    /// Existing record lookup, no creation.
    pub fn get_mut(&mut self, id: &ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(id)
    }

    #[must_use]
    pub fn get(&self, id: &ModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Module> {
        self.modules.values_mut()
    }

    fn create_module(&self, id: ModuleId, addr: Ipv4Addr) -> Result<Module> {
        let module_config = self.config.module(addr);
        let device_id = module_config
            .and_then(|m| m.device_id.as_deref())
            .unwrap_or(&self.config.default_device_id)
            .to_string();
        let device = self
            .config
            .device(&device_id)
            .ok_or_else(|| Error::UnknownDevice {
                device_id: device_id.clone(),
            })?;
        let command_port = module_config
            .and_then(|m| m.command_port)
            .unwrap_or(self.config.default_command_port);
        let description = module_config
            .and_then(|m| m.description.clone())
            .unwrap_or_else(|| format!("Devantech DS switchbank at '{addr}'"));
        let switchbank_path = id.switchbank_path();

        let mut channels = BTreeMap::new();
        for ordinal in 1..=device.relays {
            let channel_id = ChannelId::relay(ordinal)?;
            channels.insert(
                channel_id,
                Channel {
                    id: channel_id,
                    address: ordinal,
                    description: channel_description(module_config, channel_id),
                    path: format!("{switchbank_path}.{channel_id}.state"),
                    on_command: Some(resolve_command(device, ordinal, SwitchAction::On)?),
                    off_command: Some(resolve_command(device, ordinal, SwitchAction::Off)?),
                },
            );
        }
        for ordinal in 1..=device.switches {
            let channel_id = ChannelId::switch(ordinal)?;
            channels.insert(
                channel_id,
                Channel {
                    id: channel_id,
                    address: ordinal,
                    description: channel_description(module_config, channel_id),
                    path: format!("{switchbank_path}.{channel_id}.state"),
                    on_command: None,
                    off_command: None,
                },
            );
        }

        Ok(Module {
            id,
            ip_address: addr,
            device_id,
            description,
            command_port,
            switchbank_path,
            channels,
            command_connection: None,
            command_connecting: false,
            listener_connection: None,
            command_queue: VecDeque::new(),
            in_flight: None,
        })
    }

    /// Declare the switchbank and its channels on the host bus. Runs
    /// once, from the creation path.
    fn publish_metadata(&self, module: &Module) {
        debug!(module = %module.id, "publishing module metadata");
        let mut delta = Delta::new();
        delta.add_meta(
            &module.switchbank_path,
            json!({
                "description": module.description,
                "instance": module.id.to_string(),
                "device": module.device_id,
                "shortName": module.id.to_string(),
                "longName": format!("Module {}", module.id),
                "displayName": format!("Module {}", module.id),
            }),
        );
        for channel in module.channels.values() {
            delta.add_meta(
                &channel.path,
                json!({
                    "description": channel.description,
                    "index": channel.id.to_string(),
                    "shortName": format!("[{},{}]", module.id, channel.id),
                    "longName": format!("[{},{}]", module.id, channel.id),
                    "displayName": channel.description,
                    "unit": "Binary switch state (0/1)",
                    "type": match channel.channel_type() {
                        ChannelType::Relay => "relay",
                        ChannelType::Switch => "switch",
                    },
                }),
            );
        }
        delta.commit(&self.bus);
    }
}

fn channel_description(
    module_config: Option<&dsbridge_core::ModuleConfig>,
    id: ChannelId,
) -> String {
    module_config
        .and_then(|m| m.channel_description(id))
        .map(str::to_string)
        .unwrap_or_else(|| format!("Channel {id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusMessage;
    use dsbridge_core::{CommandTemplate, DeviceDefinition, ModuleConfig};
    use tokio::sync::mpsc;

    fn registry_with(config: GatewayConfig) -> (Registry, mpsc::UnboundedReceiver<BusMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Registry::new(config, tx), rx)
    }

    #[test]
    fn creates_module_with_default_device() {
        let (mut registry, mut bus) = registry_with(GatewayConfig::default());
        let addr: Ipv4Addr = "192.168.1.10".parse().unwrap();

        let module = registry.get_or_create(addr).unwrap();
        assert_eq!(module.id.to_string(), "192168001010");
        assert_eq!(module.device_id, "DS");
        assert_eq!(module.command_port, 17123);
        assert_eq!(module.relay_count(), 32);
        assert_eq!(module.switch_count(), 8);

        let relay3 = module
            .channels
            .get(&"3R".parse().unwrap())
            .expect("relay 3 exists");
        assert_eq!(relay3.on_command.as_deref(), Some("SR 3 ON"));
        assert_eq!(relay3.off_command.as_deref(), Some("SR 3 OFF"));
        assert_eq!(
            relay3.path,
            "electrical.switches.bank.192168001010.3R.state"
        );

        let switch2 = module
            .channels
            .get(&"2S".parse().unwrap())
            .expect("switch 2 exists");
        assert!(switch2.on_command.is_none());

        // Metadata for the bank plus all 40 channels, in one batch.
        match bus.try_recv().unwrap() {
            BusMessage::Meta(metas) => assert_eq!(metas.len(), 1 + 40),
            other => panic!("expected metadata batch, got {other:?}"),
        }
    }

    #[test]
    fn get_or_create_is_idempotent_and_publishes_once() {
        let (mut registry, mut bus) = registry_with(GatewayConfig::default());
        let addr: Ipv4Addr = "10.0.0.2".parse().unwrap();

        let first_id = registry.get_or_create(addr).unwrap().id;
        let second_id = registry.get_or_create(addr).unwrap().id;
        assert_eq!(first_id, second_id);
        assert_eq!(registry.len(), 1);

        // Exactly one metadata batch despite two calls.
        assert!(bus.try_recv().is_ok());
        assert!(bus.try_recv().is_err());
    }

    #[test]
    fn module_overrides_apply() {
        let mut config = GatewayConfig::default();
        config.modules.push(ModuleConfig {
            ip_address: "10.0.0.3".parse().unwrap(),
            device_id: Some("DS2824".to_string()),
            command_port: Some(17200),
            description: Some("Engine room bank".to_string()),
            channels: vec![],
        });
        let (mut registry, _bus) = registry_with(config);

        let module = registry.get_or_create("10.0.0.3".parse().unwrap()).unwrap();
        assert_eq!(module.device_id, "DS2824");
        assert_eq!(module.command_port, 17200);
        assert_eq!(module.description, "Engine room bank");
        assert_eq!(module.relay_count(), 24);
    }

    #[test]
    fn unknown_device_fails_without_record() {
        let mut config = GatewayConfig::default();
        config.default_device_id = "DS9999".to_string();
        let (mut registry, mut bus) = registry_with(config);

        let err = registry.get_or_create("10.0.0.4".parse().unwrap()).unwrap_err();
        assert!(matches!(err, Error::UnknownDevice { .. }));
        assert!(registry.is_empty());
        assert!(bus.try_recv().is_err());
    }

    #[test]
    fn unresolved_command_aborts_whole_module() {
        let mut config = GatewayConfig::default();
        config.devices = vec![DeviceDefinition {
            id: "DS".to_string(),
            relays: 2,
            switches: 0,
            // Address 2 has no template and the single entry is not
            // parametric (address != 0).
            channels: vec![CommandTemplate {
                address: 1,
                oncommand: "A ON".to_string(),
                offcommand: "A OFF".to_string(),
            }],
        }];
        let (mut registry, mut bus) = registry_with(config);

        let err = registry.get_or_create("10.0.0.5".parse().unwrap()).unwrap_err();
        assert!(matches!(err, Error::UnresolvedCommand { address: 2, .. }));
        assert!(registry.is_empty());
        assert!(bus.try_recv().is_err());
    }
}
