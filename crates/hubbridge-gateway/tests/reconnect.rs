//! End-to-end supervision against a scripted coordinator

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, Notify};

use hubbridge_core::config::GatewayConfig;
use hubbridge_core::types::{Id, Value};
use hubbridge_gateway::shell::ShellTimeouts;
use hubbridge_gateway::{
    AttributePayload, GatewayError, HostEvent, ProvisioningState, Publisher, ReconnectSupervisor,
    Result, ShellConnector, ShellTransport, SupervisorSettings, TransportConnector,
    TransportEvent, TransportSession,
};

const HOST: &str = "10.0.0.2";

const COORDINATOR: &str = r#"{"mac":"0x54ef44fffe000001","channel":15}"#;
const TWO_DEVICES: &str = r#"{"devInfo":[{"did":"lumi.158d0001","mac":"0x158d0001","model":"lumi.sensor_ht"},{"did":"lumi.158d0002","mac":"0x158d0002","model":"lumi.plug"}]}"#;
const THREE_DEVICES: &str = r#"{"devInfo":[{"did":"lumi.158d0001","mac":"0x158d0001","model":"lumi.sensor_ht"},{"did":"lumi.158d0002","mac":"0x158d0002","model":"lumi.plug"},{"did":"lumi.158d0003","mac":"0x158d0003","model":"lumi.weather"}]}"#;

type Answers = Arc<Mutex<HashMap<String, String>>>;

/// Echoes each command, then prints its scripted answer and a prompt
struct ScriptedShell {
    buffer: Vec<u8>,
    answers: Answers,
}

#[async_trait]
impl ShellTransport for ScriptedShell {
    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let line = String::from_utf8_lossy(data).trim_end().to_string();
        self.buffer.extend_from_slice(line.as_bytes());
        self.buffer.extend_from_slice(b"\r\n");
        if let Some(answer) = self.answers.lock().unwrap().get(&line) {
            self.buffer.extend_from_slice(answer.as_bytes());
            self.buffer.extend_from_slice(b"\r\n");
        }
        self.buffer.extend_from_slice(b"# ");
        Ok(())
    }

    async fn read_until(&mut self, marker: &[u8], _timeout: Duration) -> Result<Vec<u8>> {
        let pos = self
            .buffer
            .windows(marker.len())
            .position(|w| w == marker)
            .ok_or_else(|| GatewayError::timeout("marker not found"))?;
        Ok(self.buffer.drain(..pos + marker.len()).collect())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct ScriptedConnector {
    answers: Answers,
    hold: AtomicBool,
    release: Notify,
}

impl ScriptedConnector {
    fn new(devices: &str) -> Self {
        let table = [
            ("getprop persist.sys.model", "lumi.gateway.acn01"),
            ("getprop persist.sys.did", "123456"),
            ("getprop persist.sys.cloud", "aiot"),
            ("ps", "  99 root  1200 S    /data/bin/mosquitto -d"),
            ("cat /data/zigbee/coordinator.info", COORDINATOR),
            ("cat /data/zigbee/device.info", devices),
        ];
        Self {
            answers: Arc::new(Mutex::new(
                table
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )),
            hold: AtomicBool::new(false),
            release: Notify::new(),
        }
    }

    /// Make new logins wait until [`ScriptedConnector::release`]
    fn hold(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    fn release(&self) {
        self.hold.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }

    fn set_devices(&self, devices: &str) {
        self.answers
            .lock()
            .unwrap()
            .insert("cat /data/zigbee/device.info".into(), devices.into());
    }
}

#[async_trait]
impl ShellConnector for ScriptedConnector {
    async fn probe(&self, _host: &str, _port: u16) -> bool {
        true
    }

    async fn connect(&self, _host: &str, _port: u16) -> Result<Box<dyn ShellTransport>> {
        if self.hold.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        Ok(Box::new(ScriptedShell {
            buffer: b"\r\nAqara login: ".to_vec(),
            answers: self.answers.clone(),
        }))
    }
}

#[derive(Default)]
struct RecordingPublisher {
    sent: Mutex<Vec<(String, serde_json::Value)>>,
    connected: AtomicBool,
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let json = serde_json::from_slice(&payload)?;
        self.sent.lock().unwrap().push((topic.to_string(), json));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out in-memory sessions the test can drive
#[derive(Default)]
struct ChannelTransport {
    sessions: Mutex<Vec<(mpsc::Sender<TransportEvent>, Arc<RecordingPublisher>)>>,
}

impl ChannelTransport {
    fn latest(&self) -> (mpsc::Sender<TransportEvent>, Arc<RecordingPublisher>) {
        self.sessions.lock().unwrap().last().cloned().unwrap()
    }

    fn count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait]
impl TransportConnector for ChannelTransport {
    async fn connect(&self, _host: &str, _port: u16) -> Result<TransportSession> {
        let (sender, events) = mpsc::channel(16);
        let publisher = Arc::new(RecordingPublisher::default());
        publisher.connected.store(true, Ordering::SeqCst);
        self.sessions
            .lock()
            .unwrap()
            .push((sender, publisher.clone()));
        Ok(TransportSession { publisher, events })
    }
}

fn settings() -> SupervisorSettings {
    SupervisorSettings {
        probe_backoff: Duration::from_secs(30),
        transport_backoff: Duration::from_secs(60),
        shell: ShellTimeouts::default(),
    }
}

async fn wait_for(events: &mut broadcast::Receiver<HostEvent>, state: ProvisioningState) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(event) if event.state == state => break,
                Ok(_) => {}
                Err(e) => panic!("host events closed: {}", e),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{} never reached {}", HOST, state));
}

fn ids(supervisor: &ReconnectSupervisor) -> HashSet<Id> {
    supervisor
        .bridge(HOST)
        .unwrap()
        .registry()
        .ids()
        .unwrap()
        .into_iter()
        .collect()
}

fn gateway() -> GatewayConfig {
    GatewayConfig::new(HOST).with_model("lumi.gateway.acn01")
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_reconnect_refreshes_devices_without_duplicates() {
    let shell = Arc::new(ScriptedConnector::new(TWO_DEVICES));
    let transport = Arc::new(ChannelTransport::default());
    let supervisor = ReconnectSupervisor::new(settings(), shell.clone(), transport.clone());
    let mut events = supervisor.hosts().subscribe();

    supervisor.start(&[gateway()]).await.unwrap();
    wait_for(&mut events, ProvisioningState::Live).await;

    let first: HashSet<Id> = ["123456", "lumi.158d0001", "lumi.158d0002"]
        .into_iter()
        .map(Id::from)
        .collect();
    assert_eq!(ids(&supervisor), first);
    assert!(supervisor.hosts().is_live(HOST));

    shell.set_devices(THREE_DEVICES);
    let (sender, _) = transport.latest();
    sender
        .send(TransportEvent::Disconnected("broker went away".into()))
        .await
        .unwrap();

    wait_for(&mut events, ProvisioningState::Disconnected).await;
    wait_for(&mut events, ProvisioningState::Live).await;

    let second: HashSet<Id> = ["123456", "lumi.158d0001", "lumi.158d0002", "lumi.158d0003"]
        .into_iter()
        .map(Id::from)
        .collect();
    assert_eq!(ids(&supervisor), second);
    assert_eq!(supervisor.bridge(HOST).unwrap().registry().len().unwrap(), 4);
    assert_eq!(transport.count(), 2);
    assert_eq!(
        supervisor.hosts().status(HOST).unwrap().unwrap().sessions,
        2
    );

    supervisor.stop().await;
    assert!(!transport.latest().1.is_connected());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_report_reaches_consumer_and_commands_go_out() {
    let shell = Arc::new(ScriptedConnector::new(TWO_DEVICES));
    let transport = Arc::new(ChannelTransport::default());
    let supervisor = ReconnectSupervisor::new(settings(), shell, transport.clone());
    let mut events = supervisor.hosts().subscribe();

    let bridge = supervisor.add_gateway(gateway()).await.unwrap();
    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    bridge.register_consumer("lumi.158d0001", move |payload: &AttributePayload| {
        let _ = seen_tx.send(payload.clone());
    });
    wait_for(&mut events, ProvisioningState::Live).await;

    let (sender, publisher) = transport.latest();
    sender
        .send(TransportEvent::Message {
            topic: "zigbee/send".into(),
            payload: Bytes::from_static(
                br#"{"cmd":"report","did":"lumi.158d0001","params":[{"res_name":"0.1.85","value":2500}]}"#,
            ),
        })
        .await
        .unwrap();

    let payload = tokio::time::timeout(Duration::from_secs(5), seen.recv())
        .await
        .unwrap()
        .unwrap();
    let mut expected = AttributePayload::new();
    expected.insert("temperature".into(), Value::Float(25.0));
    assert_eq!(payload, expected);

    let plug = bridge.device(&Id::from("lumi.158d0002")).unwrap();
    let mut command = AttributePayload::new();
    command.insert("switch".into(), Value::Bool(true));
    assert!(bridge.send(&plug, &command).await);

    let sent = publisher.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    let (topic, json) = &sent[0];
    assert_eq!(topic, "zigbee/recv");
    assert_eq!(json["cmd"], "write");
    assert_eq!(json["did"], "lumi.158d0002");
    assert_eq!(
        json["params"],
        serde_json::json!([{"res_name": "4.1.85", "value": true}])
    );
    let id = json["id"].as_u64().unwrap();
    assert!(id <= 65535);

    supervisor.stop().await;
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_reports_flow_while_device_list_is_refreshed() {
    let shell = Arc::new(ScriptedConnector::new(TWO_DEVICES));
    let transport = Arc::new(ChannelTransport::default());
    let supervisor = ReconnectSupervisor::new(settings(), shell.clone(), transport.clone());
    let mut events = supervisor.hosts().subscribe();

    let bridge = supervisor.add_gateway(gateway()).await.unwrap();
    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    bridge.register_consumer("lumi.158d0001", move |payload: &AttributePayload| {
        let _ = seen_tx.send(payload.clone());
    });
    wait_for(&mut events, ProvisioningState::Live).await;

    shell.hold();
    shell.set_devices(THREE_DEVICES);
    let (sender, _) = transport.latest();
    for raw in [
        &br#"{"cmd":"report","did":"lumi.0","params":[{"res_name":"8.0.2109","value":0}]}"#[..],
        &br#"{"cmd":"report","did":"lumi.158d0001","params":[{"res_name":"0.1.85","value":2500}]}"#[..],
    ] {
        sender
            .send(TransportEvent::Message {
                topic: "zigbee/send".into(),
                payload: Bytes::copy_from_slice(raw),
            })
            .await
            .unwrap();
    }

    let payload = tokio::time::timeout(Duration::from_secs(5), seen.recv())
        .await
        .expect("report held up by the device list refresh")
        .unwrap();
    assert_eq!(payload.get("temperature"), Some(&Value::Float(25.0)));
    assert_eq!(bridge.registry().len().unwrap(), 3);

    shell.release();
    tokio::time::timeout(Duration::from_secs(10), async {
        while bridge.registry().len().unwrap() < 4 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap();
    assert!(ids(&supervisor).contains(&Id::from("lumi.158d0003")));
    assert!(supervisor.hosts().is_live(HOST));

    supervisor.stop().await;
}
