/*!
 * hubbridge gateway
 *
 * Provisions Zigbee hub coordinators over their telnet shell, keeps an
 * MQTT broker running on them and translates their raw telemetry into
 * canonical device attributes.
 */

#![warn(missing_docs)]

pub use hubbridge_core::prelude;

pub mod bridge;
pub mod catalog;
pub mod decode;
pub mod device;
pub mod error;
pub mod provision;
pub mod registry;
pub mod shell;
pub mod supervisor;
pub mod transport;
pub mod wire;

pub use bridge::{BridgeOptions, GatewaySignal, HandlerId, MessageBridge};
pub use device::{AttributePayload, Device, DeviceDescriptor, DeviceKind, Domain, SchemaKind};
pub use error::{GatewayError, Result};
pub use provision::{ProvisioningState, Provisioner, Topology};
pub use shell::{ShellConnector, ShellSession, ShellTransport, TelnetConnector};
pub use supervisor::{HostEvent, HostRegistry, HostStatus, ReconnectSupervisor, SupervisorSettings};
pub use transport::{Publisher, TransportConnector, TransportEvent, TransportSession};

#[cfg(feature = "mqtt")]
pub use transport::MqttConnector;

/// hubbridge gateway crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Transports compiled into this build
pub fn available_transports() -> Vec<&'static str> {
    let mut transports = vec!["telnet"];

    #[cfg(feature = "mqtt")]
    transports.push("mqtt");

    transports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_transports() {
        let transports = available_transports();
        assert!(transports.contains(&"telnet"));
        #[cfg(feature = "mqtt")]
        assert!(transports.contains(&"mqtt"));
    }
}
