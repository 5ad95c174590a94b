/*!
 * Per-attribute decoding rules.
 *
 * Turns a raw parameter value into the canonical value for its attribute.
 * Also decodes the coordinator's own statistics beats.
 */
use hubbridge_core::types::Value;

use crate::catalog;
use crate::device::AttributePayload;
use crate::error::{GatewayError, Result};
use crate::wire::{Param, WireKey};

/// Battery readings at or below this many millivolts count as empty
pub const BATTERY_LOW_MV: i64 = 2700;
/// Battery readings at or above this many millivolts count as full
pub const BATTERY_HIGH_MV: i64 = 3200;

/// Outcome of decoding one parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Attribute value to deliver
    Value(Value),
    /// The device announced it went offline
    Offline,
    /// Nothing to deliver (out-of-range reading or empty event)
    Skip,
}

/// Convert a battery reading to a percentage. Values up to 100 are already
/// percentages; anything else is millivolts mapped linearly between
/// [`BATTERY_LOW_MV`] and [`BATTERY_HIGH_MV`].
pub fn fix_battery(raw: i64) -> i64 {
    if raw <= 100 {
        raw
    } else if raw <= BATTERY_LOW_MV {
        0
    } else if raw >= BATTERY_HIGH_MV {
        100
    } else {
        let span = (BATTERY_HIGH_MV - BATTERY_LOW_MV) as f64;
        ((raw - BATTERY_LOW_MV) as f64 * 100.0 / span).round() as i64
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn numeric(canonical: &str, value: Option<&Value>) -> Result<f64> {
    value.and_then(Value::as_float).ok_or_else(|| {
        GatewayError::protocol(format!("{} expects a numeric value, got {:?}", canonical, value))
    })
}

/// Decode one parameter already resolved to `canonical`
pub fn decode(canonical: &str, param: &Param, model: &str) -> Result<Decoded> {
    let value = param.value.as_ref();

    let decoded = match canonical {
        "temperature" => {
            let raw = numeric(canonical, value)?;
            if -4000.0 < raw && raw < 12500.0 {
                Decoded::Value(Value::Float(raw / 100.0))
            } else {
                Decoded::Skip
            }
        }
        "humidity" => {
            let raw = numeric(canonical, value)?;
            if (0.0..=10000.0).contains(&raw) {
                Decoded::Value(Value::Float(raw / 100.0))
            } else {
                Decoded::Skip
            }
        }
        "pressure" => Decoded::Value(Value::Float(numeric(canonical, value)? / 100.0)),
        "battery" => {
            let raw = numeric(canonical, value)?.round() as i64;
            if catalog::reports_battery_percent(model) {
                Decoded::Value(Value::Integer(raw))
            } else {
                Decoded::Value(Value::Integer(fix_battery(raw)))
            }
        }
        "voltage" => {
            let raw = numeric(canonical, value)?;
            if raw > 0.0 && raw <= 1000.0 {
                Decoded::Value(Value::Float(raw * 1000.0))
            } else {
                Decoded::Value(value.cloned().unwrap_or_default())
            }
        }
        "alive" => match value.and_then(|v| v.get("status")).and_then(Value::as_str) {
            Some("offline") => Decoded::Offline,
            _ => passthrough(canonical, param),
        },
        "angle" => match value {
            Some(Value::Integer(i)) => Decoded::Value(
                i.checked_mul(4)
                    .map(Value::Integer)
                    .unwrap_or_else(|| Value::Float(*i as f64 * 4.0)),
            ),
            _ => Decoded::Value(Value::Float(numeric(canonical, value)? * 4.0)),
        },
        "duration" => Decoded::Value(Value::Float(numeric(canonical, value)? / 1000.0)),
        "power" => Decoded::Value(Value::Float(round2(numeric(canonical, value)?))),
        "consumption" => {
            Decoded::Value(Value::Float(round2(numeric(canonical, value)?) / 1000.0))
        }
        _ => passthrough(canonical, param),
    };

    Ok(decoded)
}

fn passthrough(canonical: &str, param: &Param) -> Decoded {
    if let Some(value) = &param.value {
        return Decoded::Value(value.clone());
    }
    match &param.arguments {
        Some(_) if canonical == "motion" => Decoded::Value(Value::Integer(1)),
        Some(arguments) => Decoded::Value(arguments.clone()),
        None => Decoded::Skip,
    }
}

/// Format seconds as `HH:MM:SS`
pub fn format_uptime(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        seconds % 3600 / 60,
        seconds % 60
    )
}

fn field(value: Option<&Value>, key: &str) -> Value {
    value.and_then(|v| v.get(key)).cloned().unwrap_or_default()
}

/// Decode the coordinator's radio and system statistics
pub fn gateway_stats(params: &[Param]) -> AttributePayload {
    let mut data = AttributePayload::new();

    for param in params {
        let value = param.value.as_ref();

        if param.extra.contains_key("networkUp") {
            data.insert("network_pan_id".into(), field(value, "networkPanId"));
            data.insert("radio_tx_power".into(), field(value, "radioTxPower"));
            data.insert("radio_channel".into(), field(value, "radioChannel"));
        } else if param.extra.contains_key("free_mem") {
            let run_time = field(value, "run_time").as_integer().unwrap_or(0);
            let rssi = match field(value, "rssi") {
                Value::Integer(i) => i
                    .checked_neg()
                    .map(Value::Integer)
                    .unwrap_or_else(|| Value::Float(-(i as f64))),
                Value::Float(f) => Value::Float(-f),
                other => other,
            };
            data.insert("free_mem".into(), field(value, "free_mem"));
            data.insert("load_avg".into(), field(value, "load_avg"));
            data.insert("rssi".into(), rssi);
            data.insert("uptime".into(), Value::String(format_uptime(run_time)));
        }

        let is_report = matches!(
            &param.key,
            Some(WireKey::Resource(name)) if catalog::global_alias(name) == Some("report")
        );
        if is_report {
            if let Some(report) = value.and_then(Value::as_str) {
                parse_report_list(report, &mut data);
            }
        }
    }

    data
}

/// Parse a `key value, key value, time:...` statistics list
fn parse_report_list(report: &str, data: &mut AttributePayload) {
    for item in report.split(',') {
        let item = item.trim();
        let parts: Vec<&str> = if item.contains("time") {
            item.splitn(2, ':').collect()
        } else {
            item.split(' ').collect()
        };
        for pair in parts.chunks_exact(2) {
            data.insert(
                pair[0].trim().to_string(),
                Value::String(pair[1].trim().to_string()),
            );
        }
    }
}
