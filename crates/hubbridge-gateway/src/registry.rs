/*!
 * Device registry.
 *
 * Holds the devices registered for one coordinator. Registration is
 * idempotent: registering a known id replaces the entry. Every change is
 * broadcast as a [`RegistryEvent`].
 */
use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::debug;

use hubbridge_core::types::Id;

use crate::device::Device;
use crate::error::{GatewayError, Result};

/// Event types for the device registry
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A device id was registered for the first time
    DeviceAdded(Id),
    /// A known device id was registered again
    DeviceUpdated(Id),
    /// A device was removed
    DeviceRemoved(Id),
    /// A device's liveness flag changed
    OnlineChanged {
        /// The device ID
        id: Id,
        /// The new flag
        online: bool,
    },
}

/// Device registry
#[derive(Debug)]
pub struct DeviceRegistry {
    /// The registered devices
    devices: RwLock<HashMap<Id, Device>>,
    /// Event sender for registry events
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> GatewayError {
    GatewayError::other("Device registry lock poisoned")
}

impl DeviceRegistry {
    /// Create a new device registry
    pub fn new() -> Self {
        let (event_sender, _) = broadcast::channel(100);
        Self {
            devices: RwLock::new(HashMap::new()),
            event_sender,
        }
    }

    /// Insert or replace a device. Returns `true` if the id was new.
    pub fn upsert(&self, device: Device) -> Result<bool> {
        let id = device.id.clone();
        let is_new = {
            let mut devices = self.devices.write().map_err(|_| poisoned())?;
            devices.insert(id.clone(), device).is_none()
        };

        let event = if is_new {
            debug!("Registered device {}", id);
            RegistryEvent::DeviceAdded(id)
        } else {
            debug!("Re-registered device {}", id);
            RegistryEvent::DeviceUpdated(id)
        };
        let _ = self.event_sender.send(event);

        Ok(is_new)
    }

    /// Remove a device. Returns the removed entry if it was present.
    pub fn remove(&self, id: &Id) -> Result<Option<Device>> {
        let removed = self.devices.write().map_err(|_| poisoned())?.remove(id);
        if removed.is_some() {
            debug!("Removed device {}", id);
            let _ = self.event_sender.send(RegistryEvent::DeviceRemoved(id.clone()));
        }
        Ok(removed)
    }

    /// Get a copy of a device
    pub fn get(&self, id: &Id) -> Result<Option<Device>> {
        let devices = self.devices.read().map_err(|_| poisoned())?;
        Ok(devices.get(id).cloned())
    }

    /// Whether the id is registered
    pub fn contains(&self, id: &Id) -> Result<bool> {
        let devices = self.devices.read().map_err(|_| poisoned())?;
        Ok(devices.contains_key(id))
    }

    /// Get all registered devices
    pub fn devices(&self) -> Result<Vec<Device>> {
        let devices = self.devices.read().map_err(|_| poisoned())?;
        Ok(devices.values().cloned().collect())
    }

    /// Get all device IDs
    pub fn ids(&self) -> Result<Vec<Id>> {
        let devices = self.devices.read().map_err(|_| poisoned())?;
        Ok(devices.keys().cloned().collect())
    }

    /// Count registered devices
    pub fn len(&self) -> Result<usize> {
        let devices = self.devices.read().map_err(|_| poisoned())?;
        Ok(devices.len())
    }

    /// Whether no devices are registered
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Record that a message for the device was decoded
    pub fn touch(&self, id: &Id) -> Result<()> {
        let mut devices = self.devices.write().map_err(|_| poisoned())?;
        if let Some(device) = devices.get_mut(id) {
            device.last_seen = Some(Utc::now());
        }
        Ok(())
    }

    /// Set the liveness flag. Returns `true` if it changed.
    pub fn set_online(&self, id: &Id, online: bool) -> Result<bool> {
        let changed = {
            let mut devices = self.devices.write().map_err(|_| poisoned())?;
            match devices.get_mut(id) {
                Some(device) if device.online != online => {
                    device.online = online;
                    true
                }
                _ => false,
            }
        };
        if changed {
            let _ = self.event_sender.send(RegistryEvent::OnlineChanged {
                id: id.clone(),
                online,
            });
        }
        Ok(changed)
    }

    /// Subscribe to registry events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }
}
