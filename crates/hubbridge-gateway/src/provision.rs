/*!
 * Coordinator provisioning.
 *
 * One provisioning pass logs into the coordinator's shell, installs the boot
 * script that keeps the shell enabled across reboots, makes sure the
 * embedded MQTT broker listens publicly, reads the coordinator identity and
 * child device list, and registers the result with the [`MessageBridge`].
 * Every step is idempotent, so a pass can be repeated after any failure.
 */
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use hubbridge_core::config::{GatewayConfig, TopologyPaths};
use hubbridge_core::types::Value;

use crate::bridge::MessageBridge;
use crate::catalog;
use crate::device::{AttributePayload, DeviceDescriptor, SchemaKind};
use crate::error::{GatewayError, Result};
use crate::shell::{ShellConnector, ShellProfile, ShellSession, ShellTimeouts};

/// Location of the bridge-managed broker binary
pub const BROKER_PATH: &str = "/data/bin/mosquitto";
/// MD5 of the armv7l broker build
pub const MD5_BROKER_ARMV7L: &str = "0422c48517dc464a2e986a1038dc448a";
/// MD5 of the mipsel broker build
pub const MD5_BROKER_MIPSEL: &str = "e0ce4757cfcccb079d89134381fd11b0";

/// Boot hook that re-enables the shell after a reboot
pub const POST_INIT_SCRIPT: &str = "/data/scripts/post_init.sh";
const SCRIPTS_DIR: &str = "/data/scripts";
const BINARIES_DIR: &str = "/data/bin";

/// Hubs that need the boot hook installed
const BOOT_SCRIPT_MODELS: &[&str] = &[
    "lumi.gateway.acn01",
    "lumi.aircondition.acn05",
    "lumi.gateway.sacn01",
    "lumi.gateway.iragl5",
    "lumi.gateway.iragl7",
    "lumi.gateway.iragl01",
    "lumi.gateway.aqcn02",
];

const BROKER_LOCAL_ONLY: &str = "Binding listener to interface";
const BROKER_PAUSE: Duration = Duration::from_millis(500);

/// Where a coordinator host is in its provisioning lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisioningState {
    /// Not started
    Unprovisioned,
    /// Waiting for the shell port to accept connections
    PortProbing,
    /// Logging into the shell
    ShellAuthenticating,
    /// Installing the boot hook
    Preparing,
    /// Checking the embedded broker
    BrokerEnsuring,
    /// Reading the coordinator and child device descriptions
    DeviceEnumerating,
    /// Devices handed to the bridge
    Registered,
    /// Connecting the pub/sub transport
    TransportConnecting,
    /// Ingesting telemetry
    Live,
    /// The transport dropped; provisioning starts over
    Disconnected,
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProvisioningState::Unprovisioned => "unprovisioned",
            ProvisioningState::PortProbing => "port_probing",
            ProvisioningState::ShellAuthenticating => "shell_authenticating",
            ProvisioningState::Preparing => "preparing",
            ProvisioningState::BrokerEnsuring => "broker_ensuring",
            ProvisioningState::DeviceEnumerating => "device_enumerating",
            ProvisioningState::Registered => "registered",
            ProvisioningState::TransportConnecting => "transport_connecting",
            ProvisioningState::Live => "live",
            ProvisioningState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Outcome of a broker check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    /// Already running in public mode
    Running,
    /// Restarted in public mode
    Restarted,
    /// Not public and no managed binary to start
    Unavailable,
}

/// CPU architecture of the coordinator's broker build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerArch {
    /// ARMv7 hubs and cameras
    Armv7l,
    /// MIPS hubs
    Mipsel,
}

impl BrokerArch {
    /// Architecture for a declared model
    pub fn for_model(model: &str) -> Self {
        match model {
            "lumi.gateway.aqcn02" | "lumi.camera.gwpagl01" => BrokerArch::Armv7l,
            _ => BrokerArch::Mipsel,
        }
    }

    /// Expected MD5 of the broker build
    pub fn md5(&self) -> &'static str {
        match self {
            BrokerArch::Armv7l => MD5_BROKER_ARMV7L,
            BrokerArch::Mipsel => MD5_BROKER_MIPSEL,
        }
    }

    /// Path segment used by download mirrors
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerArch::Armv7l => "armv7l",
            BrokerArch::Mipsel => "mipsel",
        }
    }
}

/// Whether `model` needs the boot hook
pub fn needs_boot_script(model: &str) -> bool {
    BOOT_SCRIPT_MODELS.contains(&model)
}

/// Body of the boot hook, as `echo -e` escapes
fn boot_script(model: &str) -> &'static str {
    match BrokerArch::for_model(model) {
        BrokerArch::Armv7l => "#!/bin/sh\\n\\nfw_manager.sh -r\\n/bin/riu_w 101e 53 3012\\ntelnetd",
        BrokerArch::Mipsel => {
            "#!/bin/sh\\n\\nfw_manager.sh -r\\necho enable > /sys/class/tty/tty/enable\\ntelnetd"
        }
    }
}

/// Install the boot hook and the binary directory. Returns `true` when the
/// hook was written in this pass.
pub async fn prepare_gateway(shell: &mut ShellSession, model: &str) -> bool {
    shell.run_command(&format!("mkdir -p {}", SCRIPTS_DIR)).await;

    let written = if shell.file_exists(POST_INIT_SCRIPT).await {
        debug!("{} already installed", POST_INIT_SCRIPT);
        false
    } else {
        shell
            .run_command(&format!(
                "echo -e '{}' > {}",
                boot_script(model),
                POST_INIT_SCRIPT
            ))
            .await;
        shell
            .run_command(&format!("chmod a+x {}", POST_INIT_SCRIPT))
            .await;
        info!("Installed {}", POST_INIT_SCRIPT);
        true
    };

    shell.run_command(&format!("mkdir -p {}", BINARIES_DIR)).await;
    if model == "lumi.gateway.aqcn02" {
        shell.run_command(&format!("chattr +i {}", SCRIPTS_DIR)).await;
    }
    written
}

/// Verify the managed broker binary, downloading it if a base URL is given
pub async fn verify_broker_binary(
    shell: &mut ShellSession,
    model: &str,
    download_base: Option<&str>,
) -> bool {
    let arch = BrokerArch::for_model(model);
    let url = download_base.map(|base| {
        format!("{}/bin/{}/mosquitto", base.trim_end_matches('/'), arch.as_str())
    });
    shell.check_binary(BROKER_PATH, arch.md5(), url.as_deref()).await
}

/// Whether the running broker accepts connections from the network
pub async fn broker_is_public(shell: &mut ShellSession) -> bool {
    !shell.run_command("mosquitto").await.contains(BROKER_LOCAL_ONLY)
}

/// Make sure a broker listens publicly, restarting the managed one if not
pub async fn ensure_broker(shell: &mut ShellSession) -> BrokerState {
    let processes = shell.processes().await;
    let public = broker_is_public(shell).await;
    if !public {
        debug!("Broker is not listening publicly");
    }

    let managed_running = processes.contains(&format!("{} -d", BROKER_PATH));
    if managed_running || (processes.contains("mosquitto") && public) {
        return BrokerState::Running;
    }

    if !shell.file_exists(BROKER_PATH).await {
        warn!("No broker binary at {}", BROKER_PATH);
        return BrokerState::Unavailable;
    }

    shell.run_command("killall mosquitto").await;
    tokio::time::sleep(BROKER_PAUSE).await;
    shell.run_command(&format!("{} -d", BROKER_PATH)).await;
    tokio::time::sleep(BROKER_PAUSE).await;
    info!("Restarted broker in public mode");
    BrokerState::Restarted
}

#[derive(Debug, Deserialize)]
struct CoordinatorInfo {
    mac: String,
    #[serde(default)]
    manufacturer: serde_json::Value,
    #[serde(default)]
    channel: serde_json::Value,
    #[serde(default, rename = "cloudLink")]
    cloud_link: serde_json::Value,
    #[serde(default, rename = "debugStatus")]
    debug_status: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct DeviceInfoFile {
    #[serde(default, rename = "devInfo")]
    dev_info: Option<Vec<ChildInfo>>,
}

fn default_zb_ver() -> String {
    "1.2".to_string()
}

#[derive(Debug, Deserialize)]
struct ChildInfo {
    did: String,
    #[serde(default)]
    mac: String,
    model: String,
    #[serde(default)]
    model_ver: serde_json::Value,
    #[serde(default)]
    status: serde_json::Value,
    #[serde(default = "default_zb_ver")]
    zb_ver: String,
}

/// Everything read from the coordinator in one enumeration
#[derive(Debug, Clone)]
pub struct Topology {
    /// The coordinator itself
    pub coordinator: DeviceDescriptor,
    /// Child devices with catalog-known models
    pub children: Vec<DeviceDescriptor>,
    /// Schema selected by the coordinator's cloud
    pub schema: SchemaKind,
    /// Radio settings from the coordinator's network backup, empty if absent
    pub network_backup: AttributePayload,
}

impl Topology {
    /// Coordinator followed by its children
    pub fn into_descriptors(self) -> Vec<DeviceDescriptor> {
        std::iter::once(self.coordinator)
            .chain(self.children)
            .collect()
    }
}

fn capture(pattern: &Regex, text: &str) -> String {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Parse `did=` and `model=` from a miio `device.conf`
pub fn parse_device_conf(text: &str) -> Result<(String, String)> {
    let did = Regex::new(r"did=([0-9]+)").map_err(|e| GatewayError::other(e.to_string()))?;
    let model =
        Regex::new(r"model=([a-zA-Z0-9.-]+)").map_err(|e| GatewayError::other(e.to_string()))?;
    Ok((capture(&did, text), capture(&model, text)))
}

fn first_non_empty(candidates: &[String]) -> String {
    candidates
        .iter()
        .find(|c| !c.is_empty())
        .cloned()
        .unwrap_or_default()
}

/// Read the first candidate file that parses as `T`
async fn read_json<T: serde::de::DeserializeOwned>(
    shell: &mut ShellSession,
    candidates: &[String],
) -> Option<(String, T)> {
    for path in candidates.iter().filter(|p| !p.is_empty()) {
        let raw = shell.read_file(path, false).await;
        if raw.is_empty() {
            debug!("{} is empty or missing", path);
            continue;
        }
        match serde_json::from_slice::<T>(&raw) {
            Ok(parsed) => return Some((path.clone(), parsed)),
            Err(e) => debug!("{} is not usable: {}", path, e),
        }
    }
    None
}

fn push_unique(list: &mut Vec<String>, path: String) {
    if !path.is_empty() && !list.contains(&path) {
        list.push(path);
    }
}

/// Read the coordinator identity and child device list
pub async fn enumerate(
    shell: &mut ShellSession,
    paths: &TopologyPaths,
    declared_model: &str,
) -> Result<Topology> {
    let pointer = shell.get_property("sys.zb_coordinator").await;
    let persist_model = shell.get_property("persist.sys.model").await;

    let mut candidates = Vec::new();
    push_unique(&mut candidates, pointer.clone());

    let (did, model) = if !pointer.is_empty()
        || persist_model.contains("lumi.gateway")
        || persist_model.contains("lumi.aircondition")
    {
        let did = shell.get_property("persist.sys.did").await;
        let model = shell.get_property("ro.sys.model").await;
        (did, first_non_empty(&[model, persist_model, declared_model.to_string()]))
    } else {
        let conf = shell.read_file(&paths.device_conf, false).await;
        let (did, model) = parse_device_conf(&String::from_utf8_lossy(&conf))?;
        (did, first_non_empty(&[model, declared_model.to_string()]))
    };

    if did.is_empty() {
        return Err(GatewayError::protocol("coordinator did is unknown"));
    }

    for path in &paths.coordinator_info {
        push_unique(&mut candidates, path.clone());
    }
    let (source, info) = read_json::<CoordinatorInfo>(shell, &candidates)
        .await
        .ok_or_else(|| GatewayError::protocol("no readable coordinator description"))?;
    debug!("Coordinator {} ({}) described by {}", did, model, source);

    let cloud = shell.get_property("persist.sys.cloud").await;
    let schema = SchemaKind::from_cloud(&cloud);

    let mut coordinator = DeviceDescriptor::coordinator(did, model.clone())
        .with_mac(info.mac)
        .with_extra("manufacturer", Value::from(info.manufacturer))
        .with_extra("channel", Value::from(info.channel))
        .with_extra("cloud_link", Value::from(info.cloud_link))
        .with_extra("debug_status", Value::from(info.debug_status))
        .with_extra("cloud", cloud)
        .with_extra("type", "gateway");
    let firmware = shell.firmware_version().await;
    if !firmware.is_empty() {
        coordinator.firmware_version = Some(firmware);
    }

    let children = enumerate_children(shell, paths, &model, schema).await;
    let network_backup = read_network_backup(shell, &model).await;

    Ok(Topology {
        coordinator,
        children,
        schema,
        network_backup,
    })
}

async fn read_network_backup(shell: &mut ShellSession, model: &str) -> AttributePayload {
    let path = format!(
        "{}/zigbee/networkBak.info",
        ShellProfile::for_model(model, None).store_root
    );
    let candidates = [path];
    match read_json::<serde_json::Map<String, serde_json::Value>>(shell, &candidates).await {
        Some((_, backup)) => backup
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect(),
        None => AttributePayload::new(),
    }
}

async fn enumerate_children(
    shell: &mut ShellSession,
    paths: &TopologyPaths,
    model: &str,
    schema: SchemaKind,
) -> Vec<DeviceDescriptor> {
    let store_root = ShellProfile::for_model(model, None).store_root;

    let mut candidates = Vec::new();
    push_unique(&mut candidates, shell.get_property("sys.zb_device").await);
    for path in paths.device_info.iter().filter(|p| p.starts_with(&store_root)) {
        push_unique(&mut candidates, path.clone());
    }
    for path in &paths.device_info {
        push_unique(&mut candidates, path.clone());
    }

    let Some((source, file)) = read_json::<DeviceInfoFile>(shell, &candidates).await else {
        warn!("No readable child device list");
        return Vec::new();
    };

    let entries = file.dev_info.unwrap_or_default();
    debug!("{} lists {} child device(s)", source, entries.len());

    entries
        .into_iter()
        .filter_map(|child| {
            if catalog::resolve(&child.model, schema).is_none() {
                warn!("{} has an unsupported model: {}", child.did, child.model);
                return None;
            }
            Some(
                DeviceDescriptor::child(child.did, child.model)
                    .with_mac(child.mac)
                    .with_extra("type", "zigbee")
                    .with_extra("zb_ver", child.zb_ver)
                    .with_extra("model_ver", Value::from(child.model_ver))
                    .with_extra("status", Value::from(child.status)),
            )
        })
        .collect()
}

/// Runs provisioning passes for one coordinator
pub struct Provisioner {
    connector: Arc<dyn ShellConnector>,
    gateway: GatewayConfig,
    timeouts: ShellTimeouts,
}

impl fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provisioner")
            .field("host", &self.gateway.host)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl Provisioner {
    /// Create a provisioner for one configured coordinator
    pub fn new(
        connector: Arc<dyn ShellConnector>,
        gateway: GatewayConfig,
        timeouts: ShellTimeouts,
    ) -> Self {
        Self {
            connector,
            gateway,
            timeouts,
        }
    }

    /// The coordinator's configuration
    pub fn gateway(&self) -> &GatewayConfig {
        &self.gateway
    }

    /// Whether the shell port accepts connections
    pub async fn probe(&self) -> bool {
        self.connector
            .probe(&self.gateway.host, self.gateway.shell_port)
            .await
    }

    async fn open_shell(&self) -> Result<ShellSession> {
        let profile =
            ShellProfile::for_model(&self.gateway.model, self.gateway.password.as_deref());
        ShellSession::open(
            self.connector.as_ref(),
            &self.gateway.host,
            self.gateway.shell_port,
            profile,
            self.timeouts,
        )
        .await
    }

    /// Run one full pass: login, broker, enumeration, registration.
    /// `on_state` is told about each stage as it starts.
    pub async fn provision<F>(&self, bridge: &MessageBridge, mut on_state: F) -> Result<Topology>
    where
        F: FnMut(ProvisioningState) + Send,
    {
        on_state(ProvisioningState::ShellAuthenticating);
        let mut shell = self.open_shell().await?;

        let model = if self.gateway.model.is_empty() {
            shell.get_property("persist.sys.model").await
        } else {
            self.gateway.model.clone()
        };
        if needs_boot_script(&model) {
            on_state(ProvisioningState::Preparing);
            prepare_gateway(&mut shell, &model).await;
        }

        on_state(ProvisioningState::BrokerEnsuring);
        if !verify_broker_binary(
            &mut shell,
            &model,
            self.gateway.broker_download_url.as_deref(),
        )
        .await
        {
            debug!("{}: managed broker binary not verified", self.gateway.host);
        }
        let broker = ensure_broker(&mut shell).await;
        debug!("{}: broker {:?}", self.gateway.host, broker);

        on_state(ProvisioningState::DeviceEnumerating);
        let result = self.enumerate_and_register(&mut shell, bridge).await;
        shell.close().await;

        if result.is_ok() {
            on_state(ProvisioningState::Registered);
        }
        result
    }

    /// Read the child device list again and register it. Used after pairing.
    pub async fn reenumerate(&self, bridge: &MessageBridge) -> Result<Topology> {
        let mut shell = self.open_shell().await?;
        let result = self.enumerate_and_register(&mut shell, bridge).await;
        shell.close().await;
        result
    }

    async fn enumerate_and_register(
        &self,
        shell: &mut ShellSession,
        bridge: &MessageBridge,
    ) -> Result<Topology> {
        let topology = enumerate(shell, &self.gateway.topology, &self.gateway.model).await?;
        bridge.set_schema(topology.schema)?;
        bridge.set_network_backup(topology.network_backup.clone())?;
        let registered = bridge.register_devices(topology.clone().into_descriptors())?;
        info!(
            "{}: registered {} device(s) with {:?} schema",
            self.gateway.host, registered, topology.schema
        );
        Ok(topology)
    }
}
