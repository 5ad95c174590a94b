/*!
 * Wire message envelope.
 *
 * Inbound payloads are parsed straight into [`WireMessage`] variants keyed by
 * `cmd`, so decoding never probes raw JSON. Outbound commands are encoded
 * from typed structs into compact JSON.
 */
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use hubbridge_core::types::Value;

use crate::error::{GatewayError, Result};

/// Telemetry reported by child devices and the coordinator
pub const TOPIC_ZIGBEE_SEND: &str = "zigbee/send";
/// Coordinator IO and light events
pub const TOPIC_IOCTL_SEND: &str = "ioctl/send";
/// Coordinator debug channel
pub const TOPIC_DEBUG: &str = "debug/host";
/// Write commands for child devices
pub const TOPIC_ZIGBEE_RECV: &str = "zigbee/recv";
/// Control commands for the coordinator itself
pub const TOPIC_IOCTL_RECV: &str = "ioctl/recv";

/// Value of the `from` field on every control command the bridge publishes
pub const ORIGIN_MARKER: &str = "hubbridge";

/// Fixed request id used by spec-based writes
pub const SPEC_WRITE_ID: u32 = 5;

/// Identifier of a parameter inside a message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WireKey {
    /// Legacy resource code such as `0.1.85`
    Resource(String),
    /// Spec property coordinate
    Property {
        /// Service id
        siid: u32,
        /// Property id
        piid: u32,
    },
    /// Spec event coordinate
    Event {
        /// Service id
        siid: u32,
        /// Event id
        eiid: u32,
    },
}

impl WireKey {
    /// Parse a `siid.piid` coordinate
    pub fn parse_property(key: &str) -> Option<Self> {
        let (siid, piid) = key.split_once('.')?;
        Some(WireKey::Property {
            siid: siid.parse().ok()?,
            piid: piid.parse().ok()?,
        })
    }
}

impl fmt::Display for WireKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireKey::Resource(name) => f.write_str(name),
            WireKey::Property { siid, piid } => write!(f, "{}.{}", siid, piid),
            WireKey::Event { siid, eiid } => write!(f, "{}.{}", siid, eiid),
        }
    }
}

/// One parameter of a report or response
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter identifier, `None` when the entry carried none
    pub key: Option<WireKey>,
    /// Reported value
    pub value: Option<Value>,
    /// Event arguments
    pub arguments: Option<Value>,
    /// Non-zero when the device rejected or failed the parameter
    pub error_code: i64,
    /// Remaining fields, used by coordinator statistics
    pub extra: HashMap<String, Value>,
}

impl Param {
    /// Whether the parameter carries an error
    pub fn is_error(&self) -> bool {
        self.error_code != 0
    }
}

/// Parameters addressed to one device
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Target device id
    pub did: String,
    /// Parameters in wire order
    pub params: Vec<Param>,
}

/// Control command echoed on the coordinator's IO channel
#[derive(Debug, Clone, PartialEq)]
pub struct ControlMessage {
    /// `type` field, e.g. `rgb`
    pub kind: Option<String>,
    /// `data` object
    pub data: HashMap<String, Value>,
    /// Whether the bridge itself published it
    pub from_bridge: bool,
}

/// A parsed inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// Coordinator status beat
    Heartbeat(Report),
    /// Telemetry
    Report(Report),
    /// Read-back values of a `write` or `read`
    Response(Report),
    /// Coordinator control echo
    Control(ControlMessage),
    /// Understood but carries nothing to process
    Ignored(String),
    /// Unknown `cmd`
    Unsupported(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    cmd: String,
    #[serde(default)]
    did: Option<String>,
    #[serde(default)]
    params: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    mi_spec: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    results: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    data: Option<HashMap<String, serde_json::Value>>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    from: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HeartbeatEntry {
    did: String,
    #[serde(default)]
    res_list: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawParam {
    #[serde(default)]
    res_name: Option<String>,
    #[serde(default)]
    siid: Option<u32>,
    #[serde(default)]
    piid: Option<u32>,
    #[serde(default)]
    eiid: Option<u32>,
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    arguments: Option<serde_json::Value>,
    #[serde(default)]
    error_code: Option<serde_json::Value>,
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

impl From<RawParam> for Param {
    fn from(raw: RawParam) -> Self {
        let key = match (raw.res_name, raw.siid, raw.piid, raw.eiid) {
            (Some(name), _, _, _) => Some(WireKey::Resource(name)),
            (None, Some(siid), Some(piid), _) => Some(WireKey::Property { siid, piid }),
            (None, Some(siid), None, Some(eiid)) => Some(WireKey::Event { siid, eiid }),
            _ => None,
        };
        let error_code = match raw.error_code {
            None | Some(serde_json::Value::Null) => 0,
            Some(code) => code.as_i64().unwrap_or(-1),
        };
        Param {
            key,
            value: raw.value.map(Value::from),
            arguments: raw.arguments.map(Value::from),
            error_code,
            extra: raw
                .extra
                .into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect(),
        }
    }
}

fn convert_params(raw: Vec<serde_json::Value>) -> Vec<Param> {
    raw.into_iter()
        .filter_map(|entry| match serde_json::from_value::<RawParam>(entry) {
            Ok(param) => Some(Param::from(param)),
            Err(e) => {
                warn!("Skipping malformed parameter: {}", e);
                None
            }
        })
        .collect()
}

fn require_did(did: Option<String>, cmd: &str) -> Result<String> {
    did.ok_or_else(|| GatewayError::protocol(format!("{} message without did", cmd)))
}

/// Parse a raw payload into a typed message
pub fn parse(payload: &[u8]) -> Result<WireMessage> {
    let envelope: Envelope = serde_json::from_slice(payload)?;
    let cmd = envelope.cmd.as_str();

    let message = match cmd {
        "heartbeat" => {
            let first = match envelope.params.and_then(|p| p.into_iter().next()) {
                Some(first) => first,
                None => return Ok(WireMessage::Ignored("empty heartbeat".to_string())),
            };
            let entry: HeartbeatEntry = serde_json::from_value(first)?;
            WireMessage::Heartbeat(Report {
                did: entry.did,
                params: convert_params(entry.res_list),
            })
        }
        "report" => {
            let did = require_did(envelope.did, cmd)?;
            let params = match envelope.params.or(envelope.mi_spec) {
                Some(params) => params,
                None => return Ok(WireMessage::Ignored("report without parameters".to_string())),
            };
            WireMessage::Report(Report {
                did,
                params: convert_params(params),
            })
        }
        "write_rsp" | "read_rsp" => {
            let did = require_did(envelope.did, cmd)?;
            let params = match envelope.results.or(envelope.mi_spec) {
                Some(params) => params,
                None => return Ok(WireMessage::Ignored(format!("{} without results", cmd))),
            };
            WireMessage::Response(Report {
                did,
                params: convert_params(params),
            })
        }
        "write_ack" | "behaved" => WireMessage::Ignored(cmd.to_string()),
        "control" => WireMessage::Control(ControlMessage {
            kind: envelope.kind,
            data: envelope
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect(),
            from_bridge: envelope.from.as_deref() == Some(ORIGIN_MARKER),
        }),
        other => WireMessage::Unsupported(other.to_string()),
    };

    Ok(message)
}

#[derive(Debug, Serialize)]
struct LegacyParam<'a> {
    res_name: &'a str,
    value: &'a Value,
}

#[derive(Debug, Serialize)]
struct SpecParam<'a> {
    siid: u32,
    piid: u32,
    value: &'a Value,
}

#[derive(Debug, Serialize)]
struct WriteCommand<'a, P> {
    cmd: &'static str,
    did: &'a str,
    id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Vec<P>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mi_spec: Option<Vec<P>>,
}

#[derive(Debug, Serialize)]
struct RgbData {
    blue: u32,
    breath: u32,
    green: u32,
    red: u32,
}

#[derive(Debug, Serialize)]
struct ControlCommand<'a, D> {
    cmd: &'static str,
    data: D,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<&'a str>,
    rev: u32,
    id: u32,
    from: &'static str,
}

/// Encode a legacy write. `params` pairs resource codes with values.
pub fn encode_legacy_write(did: &str, params: &[(&str, Value)], id: u32) -> Result<Vec<u8>> {
    let command = WriteCommand {
        cmd: "write",
        did,
        id,
        params: Some(
            params
                .iter()
                .map(|(res_name, value)| LegacyParam {
                    res_name: *res_name,
                    value,
                })
                .collect(),
        ),
        mi_spec: None,
    };
    Ok(serde_json::to_vec(&command)?)
}

/// Encode a spec-based write. Keys must be `siid.piid` coordinates.
pub fn encode_spec_write(did: &str, params: &[(&str, Value)]) -> Result<Vec<u8>> {
    let mut encoded = Vec::with_capacity(params.len());
    for (key, value) in params {
        match WireKey::parse_property(key) {
            Some(WireKey::Property { siid, piid }) => encoded.push(SpecParam { siid, piid, value }),
            _ => {
                return Err(GatewayError::protocol(format!(
                    "{} is not a property coordinate",
                    key
                )))
            }
        }
    }
    let command = WriteCommand {
        cmd: "write",
        did,
        id: SPEC_WRITE_ID,
        params: None,
        mi_spec: Some(encoded),
    };
    Ok(serde_json::to_vec(&command)?)
}

/// Pack brightness and RGB channels into one colour word
pub fn pack_color(brightness: u8, red: u8, green: u8, blue: u8) -> u32 {
    (u32::from(brightness) << 24)
        | (u32::from(red) << 16)
        | (u32::from(green) << 8)
        | u32::from(blue)
}

/// Encode a coordinator light command from a packed colour word. Each channel
/// is scaled by `brightness / 100`.
pub fn encode_gateway_color(color: u32, id: u32) -> Result<Vec<u8>> {
    let brightness = (color >> 24) & 0xFF;
    let scale = |channel: u32| channel * brightness / 100;
    let command = ControlCommand {
        cmd: "control",
        data: RgbData {
            blue: scale(color & 0xFF),
            breath: 500,
            green: scale((color >> 8) & 0xFF),
            red: scale((color >> 16) & 0xFF),
        },
        kind: Some("rgb"),
        rev: 1,
        id,
        from: ORIGIN_MARKER,
    };
    Ok(serde_json::to_vec(&command)?)
}

/// Encode a generic coordinator control command
pub fn encode_gateway_control(data: &HashMap<String, Value>, id: u32) -> Result<Vec<u8>> {
    let command = ControlCommand {
        cmd: "control",
        data,
        kind: None,
        rev: 1,
        id,
        from: ORIGIN_MARKER,
    };
    Ok(serde_json::to_vec(&command)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_report_params() {
        let raw = br#"{"cmd":"report","did":"lumi.1","params":[{"res_name":"0.1.85","value":2500}]}"#;
        match parse(raw).unwrap() {
            WireMessage::Report(report) => {
                assert_eq!(report.did, "lumi.1");
                assert_eq!(report.params[0].key, Some(WireKey::Resource("0.1.85".into())));
                assert_eq!(report.params[0].value, Some(Value::Integer(2500)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_report_mi_spec() {
        let raw = br#"{"cmd":"report","did":"lumi.2","mi_spec":[{"siid":2,"piid":1,"value":120},{"siid":3,"eiid":1,"arguments":[]}]}"#;
        match parse(raw).unwrap() {
            WireMessage::Report(report) => {
                assert_eq!(report.params.len(), 2);
                assert_eq!(report.params[0].key.as_ref().unwrap().to_string(), "2.1");
                assert_eq!(report.params[1].key, Some(WireKey::Event { siid: 3, eiid: 1 }));
                assert!(report.params[1].value.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_report_without_params_is_ignored() {
        let raw = br#"{"cmd":"report","did":"lumi.2"}"#;
        assert!(matches!(parse(raw).unwrap(), WireMessage::Ignored(_)));

        let raw = br#"{"cmd":"report","did":"lumi.2","params":[]}"#;
        assert!(matches!(parse(raw).unwrap(), WireMessage::Report(r) if r.params.is_empty()));
    }

    #[test]
    fn test_parse_heartbeat() {
        let raw = br#"{"cmd":"heartbeat","params":[{"did":"lumi.0","res_list":[{"res_name":"8.0.2006","value":40}]}]}"#;
        match parse(raw).unwrap() {
            WireMessage::Heartbeat(report) => {
                assert_eq!(report.did, "lumi.0");
                assert_eq!(report.params.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }

        let empty = br#"{"cmd":"heartbeat","params":[]}"#;
        assert!(matches!(parse(empty).unwrap(), WireMessage::Ignored(_)));
    }

    #[test]
    fn test_parse_responses_and_acks() {
        let raw = br#"{"cmd":"write_rsp","did":"lumi.3","results":[{"res_name":"4.1.85","value":1,"error_code":0}]}"#;
        assert!(matches!(parse(raw).unwrap(), WireMessage::Response(r) if r.params.len() == 1));

        let raw = br#"{"cmd":"write_ack","did":"lumi.3"}"#;
        assert!(matches!(parse(raw).unwrap(), WireMessage::Ignored(_)));

        let raw = br#"{"cmd":"write_rsp","did":"lumi.3"}"#;
        assert!(matches!(parse(raw).unwrap(), WireMessage::Ignored(_)));

        let raw = br#"{"cmd":"discovery"}"#;
        assert_eq!(parse(raw).unwrap(), WireMessage::Unsupported("discovery".into()));
    }

    #[test]
    fn test_parse_error_code_and_extra() {
        let raw = br#"{"cmd":"report","did":"lumi.0","params":[{"free_mem":1,"value":{"run_time":5},"error_code":-5}]}"#;
        match parse(raw).unwrap() {
            WireMessage::Report(report) => {
                let param = &report.params[0];
                assert!(param.key.is_none());
                assert!(param.is_error());
                assert!(param.extra.contains_key("free_mem"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse(b"not json").is_err());
        assert!(parse(br#"{"cmd":"report","params":[]}"#).is_err());
    }

    #[test]
    fn test_control_origin() {
        let ours = encode_gateway_control(&HashMap::new(), 7).unwrap();
        match parse(&ours).unwrap() {
            WireMessage::Control(control) => assert!(control.from_bridge),
            other => panic!("unexpected {:?}", other),
        }

        let theirs = br#"{"cmd":"control","data":{"red":1},"type":"rgb"}"#;
        match parse(theirs).unwrap() {
            WireMessage::Control(control) => {
                assert!(!control.from_bridge);
                assert_eq!(control.kind.as_deref(), Some("rgb"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_encode_legacy_write() {
        let bytes = encode_legacy_write("lumi.4", &[("4.1.85", Value::Bool(true))], 42).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            json,
            json!({"cmd":"write","did":"lumi.4","id":42,"params":[{"res_name":"4.1.85","value":true}]})
        );
        assert!(!String::from_utf8(bytes).unwrap().contains(' '));
    }

    #[test]
    fn test_encode_spec_write() {
        let bytes = encode_spec_write("lumi.5", &[("2.1", Value::Bool(false))]).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            json,
            json!({"cmd":"write","did":"lumi.5","id":5,"mi_spec":[{"siid":2,"piid":1,"value":false}]})
        );
        assert!(encode_spec_write("lumi.5", &[("4.1.85", Value::Bool(true))]).is_err());
    }

    #[test]
    fn test_gateway_color() {
        let color = pack_color(50, 255, 100, 10);
        assert_eq!(color, 0x32FF640A);
        let json: serde_json::Value =
            serde_json::from_slice(&encode_gateway_color(color, 1).unwrap()).unwrap();
        assert_eq!(json["data"], json!({"blue":5,"breath":500,"green":50,"red":127}));
        assert_eq!(json["type"], "rgb");
        assert_eq!(json["from"], ORIGIN_MARKER);
    }
}
