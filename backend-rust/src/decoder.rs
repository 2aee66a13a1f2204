//! Wire-format detection and decoding.
//!
//! Every inbound buffer is one discrete message (one UDP datagram or one
//! pub/sub frame). Detection order on the trimmed buffer:
//!   1. `<`  — CoT XML event, handed to the [`crate::cot`] state machine
//!   2. `{`/`[` — JSON, classified by key presence with priority:
//!      `system_stats`+`gps_data` (status) > `AUX_ADV_IND` (BLE) >
//!      `Basic ID` (ESP32 Open Drone ID) > `DroneID` (WiFi per-MAC map)
//!   3. anything else — dropped and counted
//!
//! Payloads are deserialized eagerly into one tagged union, so no
//! heterogeneous field maps leak into extraction logic.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::cot::{self, CotEvent};
use crate::error::DecodeError;

// ── Open-Drone-ID blocks (shared by ESP32, WiFi and BLE payloads) ─────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BasicIdBlock {
    pub id: Option<String>,
    pub id_type: Option<String>,
    /// Numeric or string on the wire, depending on the producer.
    pub ua_type: Option<Value>,
    #[serde(rename = "MAC")]
    pub mac: Option<String>,
    #[serde(alias = "RSSI")]
    pub rssi: Option<f64>,
    pub hw_id: Option<String>,
    pub protocol_version: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationVectorBlock {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed: Option<f64>,
    pub vert_speed: Option<f64>,
    pub geodetic_altitude: Option<f64>,
    pub height_agl: Option<f64>,
    #[serde(alias = "direction")]
    pub heading: Option<f64>,
    pub rssi: Option<f64>,
    pub status: Option<i64>,
    pub height_type: Option<i64>,
    pub alt_pressure: Option<f64>,
    pub horiz_acc: Option<f64>,
    pub vert_acc: Option<f64>,
    pub baro_acc: Option<f64>,
    pub speed_acc: Option<f64>,
    pub time_speed: Option<i64>,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemMessageBlock {
    #[serde(alias = "operator_lat")]
    pub latitude: Option<f64>,
    #[serde(alias = "operator_lon")]
    pub longitude: Option<f64>,
    pub operator_alt_geo: Option<f64>,
    pub area_count: Option<i64>,
    pub area_radius: Option<f64>,
    pub area_ceiling: Option<f64>,
    pub area_floor: Option<f64>,
    pub classification: Option<i64>,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelfIdBlock {
    #[serde(alias = "description")]
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub self_id_type: Option<i64>,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthBlock {
    #[serde(rename = "type")]
    pub auth_type: Option<i64>,
    pub page: Option<i64>,
    pub length: Option<i64>,
    pub timestamp: Option<i64>,
    pub data: Option<String>,
}

/// ESP32-style Open-Drone-ID payload: named blocks at the top level.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Esp32Payload {
    #[serde(rename = "Basic ID")]
    pub basic_id: Option<BasicIdBlock>,
    #[serde(rename = "Location/Vector Message")]
    pub location: Option<LocationVectorBlock>,
    #[serde(rename = "System Message")]
    pub system: Option<SystemMessageBlock>,
    #[serde(rename = "Self-ID Message")]
    pub self_id: Option<SelfIdBlock>,
    #[serde(rename = "Auth Message")]
    pub auth: Option<AuthBlock>,
    pub operator_id: Option<String>,
    pub rssi: Option<f64>,
}

// ── BLE advertisement payload ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuxAdvInd {
    pub addr: Option<String>,
    pub chan: Option<i64>,
    pub rssi: Option<f64>,
    pub aa: Option<i64>,
    pub phy: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdvDataInfo {
    pub did: Option<i64>,
    pub sid: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AextBlock {
    #[serde(rename = "AdvMode")]
    pub adv_mode: Option<String>,
    #[serde(rename = "AdvA")]
    pub adv_a: Option<String>,
    #[serde(rename = "AdvDataInfo")]
    pub adv_data_info: Option<AdvDataInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlePayload {
    #[serde(rename = "AUX_ADV_IND")]
    pub aux: AuxAdvInd,
    pub aext: Option<AextBlock>,
    #[serde(rename = "AdvData")]
    pub adv_data: Option<String>,
    #[serde(rename = "btAddr")]
    pub bt_addr: Option<String>,
    /// Decoded Open-Drone-ID blocks riding alongside the advertisement.
    #[serde(flatten)]
    pub odid: Esp32Payload,
}

// ── WiFi payload (per-MAC map) ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WifiPayload {
    /// MAC → Open-Drone-ID blocks. BTreeMap keeps "first MAC key"
    /// selection deterministic.
    #[serde(rename = "DroneID")]
    pub drone_id: BTreeMap<String, Esp32Payload>,
}

// ── Ground-sensor status payload ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GpsDataBlock {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryBlock {
    pub total: Option<i64>,
    pub available: Option<i64>,
    pub percent: Option<f64>,
    pub used: Option<i64>,
    pub free: Option<i64>,
    pub active: Option<i64>,
    pub inactive: Option<i64>,
    pub buffers: Option<i64>,
    pub cached: Option<i64>,
    pub shared: Option<i64>,
    pub slab: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiskBlock {
    pub total: Option<i64>,
    pub used: Option<i64>,
    pub free: Option<i64>,
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemStatsBlock {
    pub cpu_usage: Option<f64>,
    #[serde(default)]
    pub memory: MemoryBlock,
    #[serde(default)]
    pub disk: DiskBlock,
    pub temperature: Option<f64>,
    pub uptime: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusPayload {
    pub serial_number: Option<String>,
    #[serde(default)]
    pub gps_data: GpsDataBlock,
    #[serde(default)]
    pub system_stats: SystemStatsBlock,
}

// ── Tagged union ──────────────────────────────────────────────────────────────

/// One decoded inbound message, tagged by wire format.
#[derive(Debug, Clone)]
pub enum WireMessage {
    Cot(CotEvent),
    Esp32(Esp32Payload),
    Ble(BlePayload),
    Wifi(WifiPayload),
    Status(StatusPayload),
}

/// Per-engine drop/decode counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct DecodeStats {
    pub decoded: u64,
    pub dropped_unknown: u64,
    pub dropped_malformed: u64,
    pub dropped_validation: u64,
}

// ── Detection ─────────────────────────────────────────────────────────────────

/// Decode one discrete message buffer.
pub fn decode(buf: &[u8]) -> Result<WireMessage, DecodeError> {
    let text = std::str::from_utf8(buf).map_err(|_| DecodeError::NotText)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }
    if text.starts_with('<') {
        return cot::parse_event(text).map(WireMessage::Cot);
    }
    if text.starts_with('{') || text.starts_with('[') {
        return classify_json(text);
    }
    Err(DecodeError::UnknownFormat)
}

/// Classify a JSON payload by key presence. A top-level array is a
/// multi-part broadcast: its object parts are folded into one map before
/// classification, matching the upstream producers.
pub fn classify_json(text: &str) -> Result<WireMessage, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    let obj = match value {
        Value::Array(parts) => {
            let mut merged = serde_json::Map::new();
            for part in parts {
                if let Value::Object(map) = part {
                    merged.extend(map);
                }
            }
            Value::Object(merged)
        }
        other => other,
    };

    let map = obj.as_object().ok_or(DecodeError::UnknownFormat)?;

    if map.contains_key("system_stats") && map.contains_key("gps_data") {
        return Ok(WireMessage::Status(serde_json::from_value(obj)?));
    }
    if map.contains_key("AUX_ADV_IND") {
        return Ok(WireMessage::Ble(serde_json::from_value(obj)?));
    }
    if map.contains_key("Basic ID") {
        return Ok(WireMessage::Esp32(serde_json::from_value(obj)?));
    }
    if map.contains_key("DroneID") {
        return Ok(WireMessage::Wifi(serde_json::from_value(obj)?));
    }
    Err(DecodeError::UnknownFormat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_before_drone_blocks() {
        let raw = r#"{
            "serial_number": "wardragon-001",
            "gps_data": {"latitude": 41.0, "longitude": -74.0, "altitude": 10.0, "speed": 0.0},
            "system_stats": {"cpu_usage": 12.5, "memory": {"total": 1024}, "disk": {"total": 2048}, "temperature": 40.0, "uptime": 100.0},
            "Basic ID": {"id": "red-herring"}
        }"#;
        match decode(raw.as_bytes()).unwrap() {
            WireMessage::Status(s) => {
                assert_eq!(s.serial_number.as_deref(), Some("wardragon-001"));
                assert_eq!(s.system_stats.cpu_usage, Some(12.5));
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn classifies_ble_advertisement() {
        let raw = r#"{"AUX_ADV_IND": {"addr": "AA:BB:CC:DD:EE:FF", "chan": 37, "rssi": -55}}"#;
        match decode(raw.as_bytes()).unwrap() {
            WireMessage::Ble(b) => {
                assert_eq!(b.aux.addr.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
                assert_eq!(b.aux.rssi, Some(-55.0));
            }
            other => panic!("expected ble, got {other:?}"),
        }
    }

    #[test]
    fn classifies_esp32_and_wifi() {
        let esp = r#"{"Basic ID": {"id": "SN123", "ua_type": 2},
                      "Location/Vector Message": {"latitude": 40.5, "longitude": -73.9}}"#;
        assert!(matches!(decode(esp.as_bytes()).unwrap(), WireMessage::Esp32(_)));

        let wifi = r#"{"DroneID": {"11:22:33:44:55:66": {"Location/Vector Message": {"latitude": 1.0, "longitude": 2.0}}}}"#;
        match decode(wifi.as_bytes()).unwrap() {
            WireMessage::Wifi(w) => {
                assert!(w.drone_id.contains_key("11:22:33:44:55:66"));
            }
            other => panic!("expected wifi, got {other:?}"),
        }
    }

    #[test]
    fn folds_multi_part_array_broadcast() {
        let raw = r#"[
            {"Basic ID": {"id": "SN9", "ua_type": 1}},
            {"Location/Vector Message": {"latitude": 39.0, "longitude": -76.0, "speed": 4.2}}
        ]"#;
        match decode(raw.as_bytes()).unwrap() {
            WireMessage::Esp32(p) => {
                assert_eq!(p.basic_id.unwrap().id.as_deref(), Some("SN9"));
                assert_eq!(p.location.unwrap().speed, Some(4.2));
            }
            other => panic!("expected esp32, got {other:?}"),
        }
    }

    #[test]
    fn unknown_payloads_are_dropped() {
        assert!(matches!(
            decode(b"garbage data"),
            Err(DecodeError::UnknownFormat)
        ));
        assert!(matches!(decode(b"   "), Err(DecodeError::Empty)));
        assert!(matches!(
            decode(br#"{"unrelated": true}"#),
            Err(DecodeError::UnknownFormat)
        ));
    }

    #[test]
    fn heading_accepts_direction_alias() {
        let raw = r#"{"Basic ID": {"id": "X"}, "Location/Vector Message": {"latitude": 1.0, "longitude": 1.0, "direction": 270.0}}"#;
        match decode(raw.as_bytes()).unwrap() {
            WireMessage::Esp32(p) => {
                assert_eq!(p.location.unwrap().heading, Some(270.0));
            }
            other => panic!("expected esp32, got {other:?}"),
        }
    }
}
