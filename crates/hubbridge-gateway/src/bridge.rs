/*!
 * Message bridge.
 *
 * The long-lived runtime object for one coordinator. It owns the device
 * registry, the per-device consumer lists and the current publisher. Inbound
 * wire messages are decoded into canonical attribute payloads and handed to
 * consumers; consumer commands are encoded back into the schema each device
 * speaks.
 *
 * Consumers for one device are called sequentially in registration order on
 * the thread that delivered the message. A slow handler delays the handlers
 * after it for that message.
 */
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use rand::Rng;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use hubbridge_core::config::GatewayConfig;
use hubbridge_core::types::{Id, Metadata, Value};

use crate::catalog;
use crate::decode::{self, Decoded};
use crate::device::{
    AttributePayload, Device, DeviceDescriptor, SchemaKind, COORDINATOR_WIRE_ID,
};
use crate::error::{GatewayError, Result};
use crate::registry::DeviceRegistry;
use crate::transport::Publisher;
use crate::wire::{self, ControlMessage, Report, WireKey, WireMessage};

/// Callback invoked with each decoded payload for a device
pub type UpdateHandler = Arc<dyn Fn(&AttributePayload) + Send + Sync>;

/// Handle returned by [`MessageBridge::register_consumer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Coordinator management signals that need work outside the bridge
#[derive(Debug, Clone, PartialEq)]
pub enum GatewaySignal {
    /// Pairing finished; the child device list should be read again
    PairingCompleted,
    /// The coordinator dropped a device
    DeviceRemoved(Id),
}

/// Behaviour switches taken from the host configuration
#[derive(Debug, Clone, Default)]
pub struct BridgeOptions {
    /// Ignore offline notifications
    pub ignore_offline: bool,
    /// Decode the debug channel
    pub debug_channel: bool,
    /// Forward coordinator statistics
    pub stats: bool,
    /// Per-device overrides keyed by MAC or id
    pub overrides: HashMap<String, Metadata>,
}

impl From<&GatewayConfig> for BridgeOptions {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            ignore_offline: config.ignore_offline,
            debug_channel: config.debug_channel,
            stats: config.stats,
            overrides: config.devices.clone(),
        }
    }
}

/// The message bridge for one coordinator
pub struct MessageBridge {
    host: String,
    options: BridgeOptions,
    registry: DeviceRegistry,
    subscriptions: RwLock<HashMap<Id, Vec<(HandlerId, UpdateHandler)>>>,
    next_handler: AtomicU64,
    coordinator: RwLock<Option<Id>>,
    schema: RwLock<SchemaKind>,
    network_backup: RwLock<AttributePayload>,
    publisher: RwLock<Option<Arc<dyn Publisher>>>,
    signals: broadcast::Sender<GatewaySignal>,
}

impl fmt::Debug for MessageBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBridge")
            .field("host", &self.host)
            .field("options", &self.options)
            .field("registry", &self.registry)
            .finish()
    }
}

fn lock_error(what: &str) -> GatewayError {
    GatewayError::other(format!("{} lock poisoned", what))
}

impl MessageBridge {
    /// Create a bridge for `host`
    pub fn new<S: Into<String>>(host: S, options: BridgeOptions) -> Self {
        let (signals, _) = broadcast::channel(16);
        Self {
            host: host.into(),
            options,
            registry: DeviceRegistry::new(),
            subscriptions: RwLock::new(HashMap::new()),
            next_handler: AtomicU64::new(1),
            coordinator: RwLock::new(None),
            schema: RwLock::new(SchemaKind::Legacy),
            network_backup: RwLock::new(AttributePayload::new()),
            publisher: RwLock::new(None),
            signals,
        }
    }

    /// Host this bridge serves
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The device registry
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Subscribe to coordinator management signals
    pub fn signals(&self) -> broadcast::Receiver<GatewaySignal> {
        self.signals.subscribe()
    }

    /// Id of the registered coordinator, if any
    pub fn coordinator_id(&self) -> Option<Id> {
        self.coordinator.read().ok().and_then(|c| c.clone())
    }

    /// Copy of a registered device
    pub fn device(&self, id: &Id) -> Option<Device> {
        self.registry.get(id).ok().flatten()
    }

    /// Set the schema used to resolve newly registered devices
    pub fn set_schema(&self, schema: SchemaKind) -> Result<()> {
        *self.schema.write().map_err(|_| lock_error("schema"))? = schema;
        Ok(())
    }

    /// Replace the network backup snapshot merged into coordinator statistics
    pub fn set_network_backup(&self, backup: AttributePayload) -> Result<()> {
        *self
            .network_backup
            .write()
            .map_err(|_| lock_error("network backup"))? = backup;
        Ok(())
    }

    fn current_schema(&self) -> Result<SchemaKind> {
        Ok(*self.schema.read().map_err(|_| lock_error("schema"))?)
    }

    /// Attach the publisher of a freshly connected transport
    pub fn attach_publisher(&self, publisher: Arc<dyn Publisher>) -> Result<()> {
        *self.publisher.write().map_err(|_| lock_error("publisher"))? = Some(publisher);
        Ok(())
    }

    /// Drop the current publisher, if any
    pub fn detach_publisher(&self) -> Result<()> {
        *self.publisher.write().map_err(|_| lock_error("publisher"))? = None;
        Ok(())
    }

    /// Whether a connected publisher is attached
    pub fn is_connected(&self) -> bool {
        self.current_publisher()
            .map(|p| p.is_connected())
            .unwrap_or(false)
    }

    fn current_publisher(&self) -> Option<Arc<dyn Publisher>> {
        self.publisher.read().ok().and_then(|p| p.clone())
    }

    /// Register discovered devices. Devices whose model is not in the catalog
    /// are skipped. Known ids are replaced, never duplicated. Returns the
    /// number of devices registered.
    pub fn register_devices(&self, descriptors: Vec<DeviceDescriptor>) -> Result<usize> {
        let schema = self.current_schema()?;
        let mut registered = 0;

        for descriptor in descriptors {
            let resolved = match catalog::resolve(&descriptor.model, schema) {
                Some(resolved) => resolved,
                None => {
                    warn!(
                        "{}: {} has an unsupported model {}",
                        self.host, descriptor.id, descriptor.model
                    );
                    continue;
                }
            };

            let overrides = self
                .options
                .overrides
                .get(&descriptor.mac)
                .or_else(|| self.options.overrides.get(descriptor.id.as_str()));

            let device = Device::from_descriptor(descriptor, &resolved, overrides);
            if device.is_coordinator() {
                *self.coordinator.write().map_err(|_| lock_error("coordinator"))? =
                    Some(device.id.clone());
            }
            self.registry.upsert(device)?;
            registered += 1;
        }

        Ok(registered)
    }

    /// Register a consumer callback for a device
    pub fn register_consumer<I, F>(&self, id: I, handler: F) -> HandlerId
    where
        I: Into<Id>,
        F: Fn(&AttributePayload) + Send + Sync + 'static,
    {
        let handler_id = HandlerId(self.next_handler.fetch_add(1, Ordering::Relaxed));
        let mut subscriptions = match self.subscriptions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscriptions
            .entry(id.into())
            .or_default()
            .push((handler_id, Arc::new(handler)));
        handler_id
    }

    /// Remove a consumer callback. Returns `true` if it was registered.
    pub fn unregister(&self, id: &Id, handler: HandlerId) -> bool {
        let mut subscriptions = match self.subscriptions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(handlers) = subscriptions.get_mut(id) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(h, _)| *h != handler);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            subscriptions.remove(id);
        }
        removed
    }

    fn handlers_for(&self, id: &Id) -> Vec<UpdateHandler> {
        self.subscriptions
            .read()
            .ok()
            .and_then(|s| s.get(id).map(|h| h.iter().map(|(_, f)| f.clone()).collect()))
            .unwrap_or_default()
    }

    fn dispatch(&self, id: &Id, payload: &AttributePayload) -> usize {
        let handlers = self.handlers_for(id);
        for handler in &handlers {
            handler(payload);
        }
        handlers.len()
    }

    /// Process one inbound transport message. Never fails: malformed input
    /// is logged and dropped.
    pub fn handle_message(&self, topic: &str, payload: &[u8]) {
        let wanted = match topic {
            wire::TOPIC_ZIGBEE_SEND | wire::TOPIC_IOCTL_SEND => true,
            wire::TOPIC_DEBUG => self.options.debug_channel,
            _ => false,
        };
        if !wanted {
            trace!("{}: ignoring topic {}", self.host, topic);
            return;
        }

        let message = match wire::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                debug!("{}: dropping message on {}: {}", self.host, topic, e);
                return;
            }
        };

        if let Err(e) = self.process(message) {
            warn!("{}: failed to process message on {}: {}", self.host, topic, e);
        }
    }

    fn process(&self, message: WireMessage) -> Result<()> {
        match message {
            WireMessage::Heartbeat(report)
            | WireMessage::Report(report)
            | WireMessage::Response(report) => {
                if report.did == COORDINATOR_WIRE_ID {
                    self.process_coordinator(report)
                } else {
                    self.process_child(report)
                }
            }
            WireMessage::Control(control) => {
                self.process_control(control);
                Ok(())
            }
            WireMessage::Ignored(reason) => {
                trace!("{}: ignored {}", self.host, reason);
                Ok(())
            }
            WireMessage::Unsupported(cmd) => {
                warn!("{}: unsupported cmd {}", self.host, cmd);
                Ok(())
            }
        }
    }

    fn process_control(&self, control: ControlMessage) {
        if control.from_bridge {
            trace!("{}: skipping own control echo", self.host);
            return;
        }
        let Some(coordinator) = self.coordinator_id() else {
            return;
        };
        let mut payload: AttributePayload = control.data;
        if let Some(kind) = control.kind {
            payload.insert("type".to_string(), Value::String(kind));
        }
        self.dispatch(&coordinator, &payload);
    }

    fn canonical_name(device: Option<&Device>, wire_key: &str) -> Option<&'static str> {
        catalog::global_alias(wire_key)
            .or_else(|| device.and_then(|d| d.mapping_for_wire(wire_key)).map(|m| m.canonical))
    }

    fn process_coordinator(&self, report: Report) -> Result<()> {
        let coordinator_id = self.coordinator_id();
        let coordinator = coordinator_id.as_ref().and_then(|id| self.device(id));

        for param in &report.params {
            if param.is_error() {
                continue;
            }
            let Some(WireKey::Resource(wire_key)) = &param.key else {
                continue;
            };
            let Some(prop) = Self::canonical_name(coordinator.as_ref(), wire_key) else {
                continue;
            };

            match prop {
                "removed_did" => {
                    let removed = match &param.value {
                        Some(Value::String(did)) => Some(did.clone()),
                        Some(value) => value.get("did").and_then(Value::as_str).map(String::from),
                        None => None,
                    };
                    if let Some(did) = removed {
                        let id = Id::from(did);
                        if self.registry.remove(&id)?.is_some() {
                            debug!("{}: device {} removed by coordinator", self.host, id);
                        }
                        let _ = self.signals.send(GatewaySignal::DeviceRemoved(id));
                    }
                    return Ok(());
                }
                "paring" => {
                    if param.value.as_ref().and_then(Value::as_integer) == Some(0) {
                        debug!("{}: pairing finished", self.host);
                        let _ = self.signals.send(GatewaySignal::PairingCompleted);
                    }
                    return Ok(());
                }
                "illuminance" | "light" | "added_device" => {
                    let value = param.value.clone().unwrap_or_default();
                    if let Some(id) = &coordinator_id {
                        let mut payload = AttributePayload::new();
                        payload.insert(prop.to_string(), value.clone());
                        self.dispatch(id, &payload);
                    }
                    if prop == "added_device" {
                        self.register_added_device(&value)?;
                    }
                    return Ok(());
                }
                _ => {}
            }
        }

        if self.options.stats {
            let mut stats = decode::gateway_stats(&report.params);
            if !stats.is_empty() {
                let backup = self
                    .network_backup
                    .read()
                    .map_err(|_| lock_error("network backup"))?;
                stats.extend(backup.iter().map(|(k, v)| (k.clone(), v.clone())));
                drop(backup);
                if let Some(id) = &coordinator_id {
                    self.dispatch(id, &stats);
                }
            }
        }
        Ok(())
    }

    fn process_child(&self, report: Report) -> Result<()> {
        let id = Id::from(report.did);
        if self.handlers_for(&id).is_empty() {
            trace!("{}: no consumers for {}", self.host, id);
            return Ok(());
        }
        let Some(device) = self.registry.get(&id)? else {
            trace!("{}: unknown device {}", self.host, id);
            return Ok(());
        };

        let mut payload = AttributePayload::new();
        for param in &report.params {
            if param.is_error() {
                continue;
            }
            let Some(key) = &param.key else {
                warn!("{}: parameter without key for {}", self.host, id);
                continue;
            };
            let wire_key = key.to_string();
            let Some(canonical) = Self::canonical_name(Some(&device), &wire_key) else {
                warn!("{}: {} has no attribute for {}", self.host, device.model, wire_key);
                continue;
            };
            // battery and voltage can arrive together; battery wins
            if canonical == "voltage" && payload.contains_key("battery") {
                continue;
            }

            match decode::decode(canonical, param, &device.model) {
                Ok(Decoded::Value(value)) => {
                    payload.insert(canonical.to_string(), value);
                }
                Ok(Decoded::Offline) => {
                    if !self.options.ignore_offline {
                        self.registry.set_online(&id, false)?;
                    }
                }
                Ok(Decoded::Skip) => {}
                Err(e) => warn!("{}: {} {}: {}", self.host, id, canonical, e),
            }
        }

        self.registry.touch(&id)?;
        if payload.is_empty() {
            trace!("{}: nothing decoded for {}", self.host, id);
            return Ok(());
        }
        debug!("{}: {} {} <= {:?}", self.host, id, device.model, payload);
        self.dispatch(&id, &payload);

        if let Some(added) = payload.get("added_device") {
            self.register_added_device(added)?;
        }
        Ok(())
    }

    /// Register a device announced mid-session
    fn register_added_device(&self, value: &Value) -> Result<()> {
        let (Some(did), Some(model)) = (
            value.get("did").and_then(Value::as_str),
            value.get("model").and_then(Value::as_str),
        ) else {
            warn!("{}: added_device without did or model: {:?}", self.host, value);
            return Ok(());
        };

        let mac = value.get("mac").and_then(Value::as_str).unwrap_or_default();
        let mut descriptor = DeviceDescriptor::child(did, model).with_mac(format!("0x{}", mac));
        for key in ["zb_ver", "version"] {
            if let Some(v) = value.get(key) {
                descriptor.extra.insert(key.to_string(), v.clone());
            }
        }
        descriptor.extra.insert("type".into(), Value::from("zigbee"));

        self.register_devices(vec![descriptor])?;
        Ok(())
    }

    /// Encode and publish a consumer command. Returns `false` when the
    /// transport is down or the payload cannot be encoded for the device.
    pub async fn send(&self, device: &Device, payload: &AttributePayload) -> bool {
        let Some(publisher) = self.current_publisher().filter(|p| p.is_connected()) else {
            debug!("{}: send to {} while disconnected", self.host, device.id);
            return false;
        };

        let encoded = if !device.is_coordinator() || payload.contains_key("paring") {
            self.encode_write(device, payload)
                .map(|bytes| (wire::TOPIC_ZIGBEE_RECV, bytes))
        } else {
            self.encode_control(payload)
                .map(|bytes| (wire::TOPIC_IOCTL_RECV, bytes))
        };

        let (topic, bytes) = match encoded {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("{}: cannot encode command for {}: {}", self.host, device.id, e);
                return false;
            }
        };

        match publisher.publish(topic, bytes).await {
            Ok(()) => true,
            Err(e) => {
                debug!("{}: publish to {} failed: {}", self.host, topic, e);
                false
            }
        }
    }

    fn encode_write(&self, device: &Device, payload: &AttributePayload) -> Result<Vec<u8>> {
        let did = payload
            .get("did")
            .and_then(Value::as_str)
            .unwrap_or_else(|| device.id.as_str());

        let mut keys: Vec<&String> = payload.keys().filter(|k| k.as_str() != "did").collect();
        keys.sort();

        let mut params = Vec::with_capacity(keys.len());
        for key in keys {
            let wire_key = device.wire_key_for(key).ok_or_else(|| {
                GatewayError::protocol(format!("{} has no wire key for {}", device.model, key))
            })?;
            let mut value = payload[key].clone();
            if device.schema == SchemaKind::SpecBased && key == "switch" {
                value = Value::Bool(value.truthy());
            }
            params.push((wire_key, value));
        }

        match device.schema {
            SchemaKind::Legacy => {
                let id = rand::thread_rng().gen_range(0..=65535);
                wire::encode_legacy_write(did, &params, id)
            }
            SchemaKind::SpecBased => wire::encode_spec_write(did, &params),
        }
    }

    fn encode_control(&self, payload: &AttributePayload) -> Result<Vec<u8>> {
        let id = rand::thread_rng().gen_range(0..=65535);
        match payload.get("rgb_color").and_then(Value::as_integer) {
            Some(color) => {
                let color = u32::try_from(color)
                    .map_err(|_| GatewayError::protocol(format!("rgb_color {} out of range", color)))?;
                wire::encode_gateway_color(color, id)
            }
            None => wire::encode_gateway_control(payload, id),
        }
    }
}
