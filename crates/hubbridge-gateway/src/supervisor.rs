/*!
 * Reconnect supervision.
 *
 * The [`ReconnectSupervisor`] runs one background task per coordinator host.
 * Each task provisions its host, connects the transport and feeds inbound
 * messages to the host's [`MessageBridge`] until the transport drops, then
 * starts over from the port probe. Hosts never wait on each other.
 *
 * The bridge for a host outlives every reconnect, so consumer
 * registrations survive and re-registration replaces devices in place.
 */
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use hubbridge_core::config::{BridgeConfig, GatewayConfig};
use hubbridge_core::logging::{component_span, operation_span};
use hubbridge_core::utils::spawn_and_log;

use crate::bridge::{BridgeOptions, GatewaySignal, MessageBridge};
use crate::error::{GatewayError, Result};
use crate::provision::{ProvisioningState, Provisioner};
use crate::shell::{ShellConnector, ShellTimeouts};
use crate::transport::{TransportConnector, TransportEvent, TransportSession};

/// Snapshot of one host's lifecycle
#[derive(Debug, Clone, PartialEq)]
pub struct HostStatus {
    /// Current state
    pub state: ProvisioningState,
    /// When the state was entered
    pub since: DateTime<Utc>,
    /// Number of times the host reached [`ProvisioningState::Live`]
    pub sessions: u64,
    /// Most recent failure
    pub last_error: Option<String>,
}

impl HostStatus {
    fn new() -> Self {
        Self {
            state: ProvisioningState::Unprovisioned,
            since: Utc::now(),
            sessions: 0,
            last_error: None,
        }
    }
}

/// A host changed state
#[derive(Debug, Clone, PartialEq)]
pub struct HostEvent {
    /// The host
    pub host: String,
    /// Its new state
    pub state: ProvisioningState,
}

/// Per-host lifecycle bookkeeping
#[derive(Debug)]
pub struct HostRegistry {
    hosts: RwLock<HashMap<String, HostStatus>>,
    event_sender: broadcast::Sender<HostEvent>,
}

impl Default for HostRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> GatewayError {
    GatewayError::other("Host registry lock poisoned")
}

impl HostRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        let (event_sender, _) = broadcast::channel(100);
        Self {
            hosts: RwLock::new(HashMap::new()),
            event_sender,
        }
    }

    /// Record a state transition
    pub fn set_state(&self, host: &str, state: ProvisioningState) -> Result<()> {
        {
            let mut hosts = self.hosts.write().map_err(|_| poisoned())?;
            let status = hosts.entry(host.to_string()).or_insert_with(HostStatus::new);
            if status.state == state {
                return Ok(());
            }
            status.state = state;
            status.since = Utc::now();
            if state == ProvisioningState::Live {
                status.sessions += 1;
                status.last_error = None;
            }
        }
        debug!("{} is now {}", host, state);
        let _ = self.event_sender.send(HostEvent {
            host: host.to_string(),
            state,
        });
        Ok(())
    }

    /// Record the latest failure for a host
    pub fn record_error(&self, host: &str, error: &GatewayError) -> Result<()> {
        let mut hosts = self.hosts.write().map_err(|_| poisoned())?;
        hosts
            .entry(host.to_string())
            .or_insert_with(HostStatus::new)
            .last_error = Some(error.to_string());
        Ok(())
    }

    /// Status of one host
    pub fn status(&self, host: &str) -> Result<Option<HostStatus>> {
        let hosts = self.hosts.read().map_err(|_| poisoned())?;
        Ok(hosts.get(host).cloned())
    }

    /// Whether the host is ingesting telemetry
    pub fn is_live(&self, host: &str) -> bool {
        matches!(
            self.status(host),
            Ok(Some(HostStatus {
                state: ProvisioningState::Live,
                ..
            }))
        )
    }

    /// Hosts currently ingesting telemetry
    pub fn live_hosts(&self) -> Result<Vec<String>> {
        let hosts = self.hosts.read().map_err(|_| poisoned())?;
        Ok(hosts
            .iter()
            .filter(|(_, s)| s.state == ProvisioningState::Live)
            .map(|(h, _)| h.clone())
            .collect())
    }

    /// Subscribe to state transitions
    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.event_sender.subscribe()
    }
}

/// Backoffs and timeouts used by host tasks
#[derive(Debug, Clone, Copy)]
pub struct SupervisorSettings {
    /// Wait after a closed port or failed provisioning pass
    pub probe_backoff: Duration,
    /// Wait after a failed transport connect
    pub transport_backoff: Duration,
    /// Shell login and command timeouts
    pub shell: ShellTimeouts,
}

impl From<&BridgeConfig> for SupervisorSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            probe_backoff: config.probe_backoff(),
            transport_backoff: config.transport_backoff(),
            shell: ShellTimeouts {
                login: config.login_timeout(),
                command: config.command_timeout(),
            },
        }
    }
}

/// Supervises one background task per coordinator host
pub struct ReconnectSupervisor {
    settings: SupervisorSettings,
    shell_connector: Arc<dyn ShellConnector>,
    transport_connector: Arc<dyn TransportConnector>,
    hosts: Arc<HostRegistry>,
    bridges: RwLock<HashMap<String, Arc<MessageBridge>>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for ReconnectSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectSupervisor")
            .field("settings", &self.settings)
            .field("hosts", &self.hosts)
            .finish()
    }
}

impl ReconnectSupervisor {
    /// Create a supervisor
    pub fn new(
        settings: SupervisorSettings,
        shell_connector: Arc<dyn ShellConnector>,
        transport_connector: Arc<dyn TransportConnector>,
    ) -> Self {
        Self {
            settings,
            shell_connector,
            transport_connector,
            hosts: Arc::new(HostRegistry::new()),
            bridges: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Host lifecycle registry
    pub fn hosts(&self) -> &Arc<HostRegistry> {
        &self.hosts
    }

    /// The bridge serving `host`
    pub fn bridge(&self, host: &str) -> Option<Arc<MessageBridge>> {
        self.bridges.read().ok()?.get(host).cloned()
    }

    /// Start supervising every configured gateway
    pub async fn start(&self, gateways: &[GatewayConfig]) -> Result<()> {
        for gateway in gateways {
            self.add_gateway(gateway.clone()).await?;
        }
        info!("Supervising {} gateway(s)", gateways.len());
        Ok(())
    }

    /// Start supervising one gateway and return its bridge
    pub async fn add_gateway(&self, gateway: GatewayConfig) -> Result<Arc<MessageBridge>> {
        let host = gateway.host.clone();
        let bridge = {
            let mut bridges = self.bridges.write().map_err(|_| poisoned())?;
            if bridges.contains_key(&host) {
                return Err(GatewayError::other(format!("{} is already supervised", host)));
            }
            let bridge = Arc::new(MessageBridge::new(host.clone(), BridgeOptions::from(&gateway)));
            bridges.insert(host.clone(), bridge.clone());
            bridge
        };
        self.hosts.set_state(&host, ProvisioningState::Unprovisioned)?;

        let task = HostTask {
            host: host.clone(),
            mqtt_port: gateway.mqtt_port,
            provisioner: Arc::new(Provisioner::new(
                self.shell_connector.clone(),
                gateway,
                self.settings.shell,
            )),
            transport: self.transport_connector.clone(),
            bridge: bridge.clone(),
            hosts: self.hosts.clone(),
            settings: self.settings,
            cancel: self.cancel.child_token(),
        };
        let span = component_span("gateway", Some(&host));
        let handle = spawn_and_log(&format!("gateway {}", host), task.run().instrument(span));
        self.tasks.lock().await.push(handle);

        Ok(bridge)
    }

    /// Stop every host task. In-flight shell commands finish or time out;
    /// no further retries are scheduled.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Gateway task ended abnormally: {}", e);
            }
        }
        info!("Supervisor stopped");
    }
}

enum SessionEnd {
    Cancelled,
    Disconnected(String),
}

struct HostTask {
    host: String,
    mqtt_port: u16,
    provisioner: Arc<Provisioner>,
    transport: Arc<dyn TransportConnector>,
    bridge: Arc<MessageBridge>,
    hosts: Arc<HostRegistry>,
    settings: SupervisorSettings,
    cancel: CancellationToken,
}

impl HostTask {
    fn enter(&self, state: ProvisioningState) {
        if let Err(e) = self.hosts.set_state(&self.host, state) {
            warn!("{}: {}", self.host, e);
        }
    }

    fn failed(&self, stage: &str, error: &GatewayError) {
        if error.is_transient() {
            debug!("{}: {} failed: {}", self.host, stage, error);
        } else {
            warn!("{}: {} failed: {}", self.host, stage, error);
        }
        let _ = self.hosts.record_error(&self.host, error);
    }

    /// Sleep unless cancelled first. Returns `true` on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }

    async fn run(self) -> Result<()> {
        while !self.cancel.is_cancelled() {
            self.enter(ProvisioningState::PortProbing);
            if !self.provisioner.probe().await {
                debug!("{}: shell port closed", self.host);
                if self.pause(self.settings.probe_backoff).await {
                    break;
                }
                continue;
            }

            let provisioned = self
                .provisioner
                .provision(&self.bridge, |state| self.enter(state))
                .instrument(operation_span("provision", &self.host))
                .await;
            if let Err(e) = provisioned {
                self.failed("provisioning", &e);
                if self.pause(self.settings.probe_backoff).await {
                    break;
                }
                continue;
            }
            if self.cancel.is_cancelled() {
                break;
            }

            self.enter(ProvisioningState::TransportConnecting);
            let session = match self.transport.connect(&self.host, self.mqtt_port).await {
                Ok(session) => session,
                Err(e) => {
                    self.failed("transport connect", &e);
                    if self.pause(self.settings.transport_backoff).await {
                        break;
                    }
                    continue;
                }
            };

            let publisher = session.publisher.clone();
            self.bridge.attach_publisher(publisher.clone())?;
            self.enter(ProvisioningState::Live);
            info!("{}: live", self.host);

            let end = self.pump(session).await;
            self.bridge.detach_publisher()?;

            match end {
                SessionEnd::Cancelled => {
                    if let Err(e) = publisher.disconnect().await {
                        debug!("{}: disconnect failed: {}", self.host, e);
                    }
                    break;
                }
                SessionEnd::Disconnected(reason) => {
                    info!("{}: transport lost: {}", self.host, reason);
                    self.enter(ProvisioningState::Disconnected);
                }
            }
        }

        debug!("{}: task finished", self.host);
        Ok(())
    }

    /// Re-read the device list in the background so the pump keeps draining
    /// transport events
    fn spawn_reenumerate(&self) -> JoinHandle<()> {
        let provisioner = self.provisioner.clone();
        let bridge = self.bridge.clone();
        let hosts = self.hosts.clone();
        let host = self.host.clone();
        let span = operation_span("reenumerate", &self.host);
        spawn_and_log(
            &format!("reenumerate {}", self.host),
            async move {
                let refreshed = provisioner.reenumerate(&bridge).await;
                if let Err(e) = &refreshed {
                    let _ = hosts.record_error(&host, e);
                }
                refreshed.map(|_| ())
            }
            .instrument(span),
        )
    }

    /// Feed transport events to the bridge until the session ends
    async fn pump(&self, mut session: TransportSession) -> SessionEnd {
        let mut signals = self.bridge.signals();
        let mut refresh: Option<JoinHandle<()>> = None;

        let end = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break SessionEnd::Cancelled,
                event = session.events.recv() => match event {
                    Some(TransportEvent::Message { topic, payload }) => {
                        self.bridge.handle_message(&topic, &payload);
                    }
                    Some(TransportEvent::Disconnected(reason)) => {
                        break SessionEnd::Disconnected(reason);
                    }
                    None => break SessionEnd::Disconnected("event stream closed".into()),
                },
                signal = signals.recv() => match signal {
                    Ok(GatewaySignal::PairingCompleted) => {
                        if refresh.as_ref().is_some_and(|task| !task.is_finished()) {
                            debug!("{}: device list refresh already running", self.host);
                            continue;
                        }
                        info!("{}: pairing finished, reading device list", self.host);
                        refresh = Some(self.spawn_reenumerate());
                    }
                    Ok(GatewaySignal::DeviceRemoved(id)) => {
                        info!("{}: device {} removed", self.host, id);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("{}: missed {} coordinator signal(s)", self.host, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break SessionEnd::Disconnected("signal channel closed".into());
                    }
                },
            }
        };

        if let (SessionEnd::Cancelled, Some(task)) = (&end, refresh) {
            task.abort();
        }
        end
    }
}
