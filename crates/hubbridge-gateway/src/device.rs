/*!
 * Device data model.
 *
 * A [`Device`] is one managed endpoint: either the coordinator itself or a
 * child device it relays for. Its attribute mappings come from the catalog
 * at registration time and stay fixed until the device is registered again.
 */
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hubbridge_core::types::{Id, Metadata, Value};

use crate::catalog::CatalogMatch;

/// Identifier the coordinator uses for itself on the wire
pub const COORDINATOR_WIRE_ID: &str = "lumi.0";

/// Canonical attribute name to decoded value, as delivered to consumers
pub type AttributePayload = HashMap<String, Value>;

/// Role of a device in the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    /// The local gateway
    Coordinator,
    /// Any endpoint the gateway relays for
    ChildDevice,
}

/// Attribute naming scheme a device speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaKind {
    /// Flat `res_name` resource codes such as `0.1.85`
    Legacy,
    /// Numeric `siid`/`piid` coordinates
    SpecBased,
}

impl SchemaKind {
    /// Catalog extension selected by the coordinator's cloud property
    pub fn from_cloud(cloud: &str) -> Self {
        if cloud.trim() == "miot" {
            SchemaKind::SpecBased
        } else {
            SchemaKind::Legacy
        }
    }
}

/// Consumer category notified for an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Numeric sensor
    Sensor,
    /// On/off sensor
    BinarySensor,
    /// Switchable output
    Switch,
    /// Light
    Light,
    /// Blind or curtain
    Cover,
    /// Thermostat or air conditioner
    Climate,
    /// Air quality monitor
    AirQuality,
    /// Infrared or pairing remote
    Remote,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Domain::Sensor => "sensor",
            Domain::BinarySensor => "binary_sensor",
            Domain::Switch => "switch",
            Domain::Light => "light",
            Domain::Cover => "cover",
            Domain::Climate => "climate",
            Domain::AirQuality => "air_quality",
            Domain::Remote => "remote",
        };
        f.write_str(name)
    }
}

/// One row of a catalog attribute table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeMapping {
    /// Protocol identifier (`0.1.85` or `2.1`); `None` for derived attributes
    pub wire_key: Option<&'static str>,
    /// Name used by the vendor's own firmware, informational only
    pub internal_key: Option<&'static str>,
    /// Normalized attribute name
    pub canonical: &'static str,
    /// Consumer category; `None` keeps the attribute internal
    pub domain: Option<Domain>,
}

impl AttributeMapping {
    /// Build a mapping row
    pub const fn new(
        wire_key: Option<&'static str>,
        internal_key: Option<&'static str>,
        canonical: &'static str,
        domain: Option<Domain>,
    ) -> Self {
        Self {
            wire_key,
            internal_key,
            canonical,
            domain,
        }
    }
}

/// Raw description of a device as discovered on the coordinator, before
/// catalog resolution
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    /// Vendor device id
    pub id: Id,
    /// Role
    pub kind: DeviceKind,
    /// Model string as reported, possibly with a `.vN` suffix
    pub model: String,
    /// MAC address, `0x` prefixed for child devices
    pub mac: String,
    /// Firmware version if known
    pub firmware_version: Option<String>,
    /// Hardware version if known
    pub hardware_version: Option<String>,
    /// Whether the device reported itself online
    pub online: bool,
    /// Everything else the coordinator said about the device
    pub extra: Metadata,
}

impl DeviceDescriptor {
    /// Create a descriptor for a child device
    pub fn child<I: Into<Id>, M: Into<String>>(id: I, model: M) -> Self {
        Self {
            id: id.into(),
            kind: DeviceKind::ChildDevice,
            model: model.into(),
            mac: String::new(),
            firmware_version: None,
            hardware_version: None,
            online: true,
            extra: Metadata::new(),
        }
    }

    /// Create a descriptor for the coordinator
    pub fn coordinator<I: Into<Id>, M: Into<String>>(id: I, model: M) -> Self {
        Self {
            kind: DeviceKind::Coordinator,
            ..Self::child(id, model)
        }
    }

    /// Set the MAC address
    pub fn with_mac<S: Into<String>>(mut self, mac: S) -> Self {
        self.mac = mac.into();
        self
    }

    /// Attach an extra metadata value
    pub fn with_extra<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A registered device
#[derive(Debug, Clone)]
pub struct Device {
    /// Stable vendor id
    pub id: Id,
    /// Role
    pub kind: DeviceKind,
    /// Model string with any `.vN` suffix removed
    pub model: String,
    /// MAC address
    pub mac: String,
    /// Firmware version
    pub firmware_version: Option<String>,
    /// Hardware version
    pub hardware_version: Option<String>,
    /// Manufacturer from the catalog
    pub manufacturer: String,
    /// `manufacturer + name`
    pub name: String,
    /// `model + product code`
    pub product_model: String,
    /// Resolved attribute table
    pub attributes: &'static [AttributeMapping],
    /// Wire schema
    pub schema: SchemaKind,
    /// Liveness flag
    pub online: bool,
    /// Discovery data merged with configured overrides
    pub metadata: Metadata,
    /// Time the last message for this device was decoded
    pub last_seen: Option<DateTime<Utc>>,
}

impl Device {
    /// Build a device from its discovered description and catalog entry.
    /// Overrides are merged over the discovered metadata.
    pub fn from_descriptor(
        descriptor: DeviceDescriptor,
        resolved: &CatalogMatch,
        overrides: Option<&Metadata>,
    ) -> Self {
        let mut metadata = descriptor.extra;
        if let Some(overrides) = overrides {
            metadata.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        Self {
            id: descriptor.id,
            kind: descriptor.kind,
            model: resolved.model.clone(),
            mac: descriptor.mac,
            firmware_version: descriptor.firmware_version,
            hardware_version: descriptor.hardware_version,
            manufacturer: resolved.manufacturer.to_string(),
            name: resolved.display_name.clone(),
            product_model: resolved.product_model.clone(),
            attributes: resolved.mappings,
            schema: resolved.schema,
            online: descriptor.online,
            metadata,
            last_seen: None,
        }
    }

    /// Whether this is the coordinator
    pub fn is_coordinator(&self) -> bool {
        self.kind == DeviceKind::Coordinator
    }

    /// Find the first mapping for a wire key
    pub fn mapping_for_wire(&self, wire_key: &str) -> Option<&'static AttributeMapping> {
        self.attributes
            .iter()
            .find(|m| m.wire_key == Some(wire_key))
    }

    /// Find the wire key of the first mapping whose canonical name matches
    pub fn wire_key_for(&self, canonical: &str) -> Option<&'static str> {
        self.attributes
            .iter()
            .filter(|m| m.canonical == canonical)
            .find_map(|m| m.wire_key)
    }

    /// Attributes surfaced to the given consumer domain
    pub fn attributes_for(&self, domain: Domain) -> impl Iterator<Item = &'static str> + '_ {
        self.attributes
            .iter()
            .filter(move |m| m.domain == Some(domain))
            .map(|m| m.canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    #[test]
    fn test_schema_from_cloud() {
        assert_eq!(SchemaKind::from_cloud("miot"), SchemaKind::SpecBased);
        assert_eq!(SchemaKind::from_cloud("aiot"), SchemaKind::Legacy);
        assert_eq!(SchemaKind::from_cloud(""), SchemaKind::Legacy);
    }

    #[test]
    fn test_from_descriptor_merges_overrides() {
        let resolved = catalog::resolve("lumi.sensor_ht.v1", SchemaKind::Legacy).unwrap();
        let descriptor = DeviceDescriptor::child("lumi.158d0001", "lumi.sensor_ht.v1")
            .with_mac("0x158d0001")
            .with_extra("zb_ver", "1.2");
        let mut overrides = Metadata::new();
        overrides.insert("name".to_string(), Value::from("Hall"));

        let device = Device::from_descriptor(descriptor, &resolved, Some(&overrides));
        assert_eq!(device.model, "lumi.sensor_ht");
        assert_eq!(device.name, "Xiaomi TH Sensor");
        assert_eq!(device.product_model, "lumi.sensor_ht WSDCGQ01LM");
        assert_eq!(device.metadata.get("name"), Some(&Value::from("Hall")));
        assert_eq!(device.metadata.get("zb_ver"), Some(&Value::from("1.2")));
        assert!(device.online);
    }

    #[test]
    fn test_wire_key_lookup() {
        let resolved = catalog::resolve("lumi.plug", SchemaKind::Legacy).unwrap();
        let device = Device::from_descriptor(
            DeviceDescriptor::child("lumi.1", "lumi.plug"),
            &resolved,
            None,
        );
        assert_eq!(device.wire_key_for("switch"), Some("4.1.85"));
        assert_eq!(device.wire_key_for("unknown"), None);
        assert_eq!(device.mapping_for_wire("0.12.85").map(|m| m.canonical), Some("power"));
        assert_eq!(device.attributes_for(Domain::Switch).collect::<Vec<_>>(), vec!["switch"]);
    }
}
