//! JSON → CoT XML bridge.
//!
//! The pub/sub feeds carry raw JSON. Both are converted to the canonical
//! CoT XML shape before re-entering the wire decoder, so every ingestion
//! path converges on one schema. Element and attribute naming here must
//! stay byte-for-byte what [`crate::cot`] consumes — the round-trip is the
//! contract.
//!
//! Telemetry with a Location block reporting (0, 0) is discarded at the
//! bridge. A payload with no Location block at all (a bare BLE
//! advertisement) is still synthesized, with a zero point and its RSSI
//! carried through, so the downstream proximity redirect can see it.

use std::fmt::Write as _;

use chrono::{Duration, Utc};
use quick_xml::escape::escape;

use crate::decoder::{classify_json, BlePayload, Esp32Payload, StatusPayload, WifiPayload, WireMessage};
use crate::extractor::structural_fingerprint;

/// CoT stale horizon for synthesized events.
const STALE_SECS: i64 = 300;

// ── Telemetry ─────────────────────────────────────────────────────────────────

/// Convert one telemetry feed frame (JSON) to CoT XML. Returns None when
/// the frame is unusable (unknown shape, or zero-coordinate telemetry).
pub fn telemetry_to_xml(raw: &str) -> Option<String> {
    match classify_json(raw).ok()? {
        WireMessage::Esp32(p) => esp32_to_xml(&p),
        WireMessage::Ble(b) => ble_to_xml(&b),
        WireMessage::Wifi(w) => wifi_to_xml(&w),
        // Status frames do not belong on the telemetry feed
        _ => None,
    }
}

fn esp32_to_xml(p: &Esp32Payload) -> Option<String> {
    let uid = esp32_uid(p);
    drone_xml(&uid, p, p.rssi)
}

fn esp32_uid(p: &Esp32Payload) -> String {
    let basic = p.basic_id.as_ref();
    if let Some(id) = basic.and_then(|b| b.id.as_deref()) {
        if !id.is_empty() && id != "NONE" {
            return format!("ESP32-{id}");
        }
    }
    if let Some(hw_id) = basic.and_then(|b| b.hw_id.as_deref()) {
        if !hw_id.is_empty() {
            // hw_id already carries its vendor prefix
            return hw_id.to_string();
        }
    }
    format!("ESP32-{}", fingerprint_of(p))
}

fn ble_to_xml(b: &BlePayload) -> Option<String> {
    let uid = if let Some(addr) = b.bt_addr.as_deref().filter(|a| !a.is_empty()) {
        format!("BT-{addr}")
    } else if let Some(addr) = b.aux.addr.as_deref().filter(|a| !a.is_empty()) {
        format!("BT-{addr}")
    } else {
        format!("BT-{}", fingerprint_of(&b.odid))
    };
    let rssi = b.aux.rssi.or(b.odid.rssi);
    drone_xml(&uid, &b.odid, rssi)
}

fn wifi_to_xml(w: &WifiPayload) -> Option<String> {
    for (mac, fields) in &w.drone_id {
        if fields.location.is_none() {
            continue;
        }
        let uid = if let Some(field_mac) = fields
            .basic_id
            .as_ref()
            .and_then(|b| b.mac.as_deref())
            .filter(|m| !m.is_empty())
        {
            format!("WIFI-{field_mac}")
        } else if !mac.is_empty() {
            format!("WIFI-{mac}")
        } else {
            format!("WIFI-{}", fingerprint_of(fields))
        };
        return drone_xml(&uid, fields, fields.rssi);
    }
    None
}

fn fingerprint_of(p: &Esp32Payload) -> String {
    let basic = p.basic_id.as_ref();
    let location = p.location.as_ref();
    structural_fingerprint([
        ("id", basic.and_then(|b| b.id.clone()).unwrap_or_default()),
        ("mac", basic.and_then(|b| b.mac.clone()).unwrap_or_default()),
        (
            "lat",
            location
                .and_then(|l| l.latitude)
                .map(|v| v.to_string())
                .unwrap_or_default(),
        ),
        (
            "lon",
            location
                .and_then(|l| l.longitude)
                .map(|v| v.to_string())
                .unwrap_or_default(),
        ),
    ])
}

/// CoT type string: affiliation + id-scheme suffix + operator flag.
fn drone_type(p: &Esp32Payload) -> String {
    let mut t = String::from("a-f-G-U");
    if let Some(id_type) = p.basic_id.as_ref().and_then(|b| b.id_type.as_deref()) {
        if id_type == "Serial Number (ANSI/CTA-2063-A)" {
            t.push_str("-S");
        } else if id_type.contains("CAA") {
            t.push_str("-R");
        } else {
            t.push_str("-U");
        }
    }
    let has_operator = p
        .system
        .as_ref()
        .map(|s| {
            s.latitude.unwrap_or(0.0) != 0.0 && s.longitude.unwrap_or(0.0) != 0.0
        })
        .unwrap_or(false);
    if has_operator {
        t.push_str("-O");
    }
    t.push_str("-F");
    t
}

fn drone_xml(uid: &str, p: &Esp32Payload, rssi: Option<f64>) -> Option<String> {
    let location = p.location.as_ref();
    let lat = location.and_then(|l| l.latitude).unwrap_or(0.0);
    let lon = location.and_then(|l| l.longitude).unwrap_or(0.0);
    if location.is_some() && lat == 0.0 && lon == 0.0 {
        // zero-coordinate telemetry carries no usable track
        return None;
    }
    let alt = location.and_then(|l| l.geodetic_altitude).unwrap_or(0.0);

    let now = Utc::now();
    let time = now.format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let stale = (now + Duration::seconds(STALE_SECS))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string();

    let mut xml = String::with_capacity(1024);
    let _ = write!(
        xml,
        r#"<event version="2.0" uid="{}" type="{}" time="{time}" start="{time}" stale="{stale}" how="m-g">"#,
        escape(uid),
        drone_type(p),
    );
    let _ = write!(
        xml,
        r#"<point lat="{lat}" lon="{lon}" hae="{alt}" ce="9999999" le="9999999"/>"#
    );
    xml.push_str("<detail>");
    let _ = write!(xml, r#"<contact callsign="{}"/>"#, escape(uid));

    if let Some(text) = p.self_id.as_ref().and_then(|s| s.text.as_deref()) {
        let _ = write!(xml, "<remarks>{}</remarks>", escape(text));
    }
    if let Some(l) = location {
        push_f64(&mut xml, "Speed", l.speed);
        push_f64(&mut xml, "VerticalSpeed", l.vert_speed);
        push_f64(&mut xml, "Altitude", l.geodetic_altitude);
        push_f64(&mut xml, "Height", l.height_agl);
        push_i64(&mut xml, "status", l.status);
        push_i64(&mut xml, "heightType", l.height_type);
        push_i64(&mut xml, "TimeSpeed", l.time_speed);
        push_f64(&mut xml, "AltPressure", l.alt_pressure);
        push_f64(&mut xml, "HorizAcc", l.horiz_acc);
        push_f64(&mut xml, "VertAcc", l.vert_acc);
        push_f64(&mut xml, "BaroAcc", l.baro_acc);
        push_f64(&mut xml, "SpeedAcc", l.speed_acc);
    }
    push_f64(&mut xml, "Rssi", rssi);
    if let Some(ua) = p.basic_id.as_ref().and_then(|b| b.ua_type.as_ref()) {
        if let Some(n) = ua.as_i64().or_else(|| ua.as_str().and_then(|s| s.parse().ok())) {
            let _ = write!(xml, "<UAType>{n}</UAType>");
        }
    }
    if let Some(s) = p.system.as_ref() {
        push_i64(&mut xml, "Classification", s.classification);
        let op_lat = s.latitude.unwrap_or(0.0);
        let op_lon = s.longitude.unwrap_or(0.0);
        if op_lat != 0.0 || op_lon != 0.0 {
            let _ = write!(xml, "<PilotLocation><lat>{op_lat}</lat><lon>{op_lon}</lon>");
            if let Some(alt_geo) = s.operator_alt_geo {
                let _ = write!(xml, "<altGeo>{alt_geo}</altGeo>");
            }
            xml.push_str("</PilotLocation>");
        }
        if s.area_count.is_some() || s.area_radius.is_some() {
            xml.push_str("<OperationArea>");
            push_i64(&mut xml, "count", s.area_count);
            push_f64(&mut xml, "radius", s.area_radius);
            push_f64(&mut xml, "ceiling", s.area_ceiling);
            push_f64(&mut xml, "floor", s.area_floor);
            xml.push_str("</OperationArea>");
        }
    }
    xml.push_str("</detail></event>");
    Some(xml)
}

fn push_f64(xml: &mut String, tag: &str, value: Option<f64>) {
    if let Some(v) = value {
        let _ = write!(xml, "<{tag}>{v}</{tag}>");
    }
}

fn push_i64(xml: &mut String, tag: &str, value: Option<i64>) {
    if let Some(v) = value {
        let _ = write!(xml, "<{tag}>{v}</{tag}>");
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

/// Convert one status feed frame (JSON) to the CoT status XML shape.
pub fn status_to_xml(raw: &str) -> Option<String> {
    let payload: StatusPayload = match classify_json(raw).ok()? {
        WireMessage::Status(p) => p,
        _ => return None,
    };
    Some(status_xml(&payload))
}

fn status_xml(p: &StatusPayload) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    let serial = p.serial_number.as_deref().unwrap_or("");
    let stats = &p.system_stats;
    let mem = &stats.memory;
    let disk = &stats.disk;
    let mb = |v: Option<i64>| v.unwrap_or(0) as f64 / MB;

    let remarks = format!(
        "CPU Usage: {}%, Memory Total: {:.1} MB, Memory Available: {:.1} MB, \
         Memory Used: {:.1} MB, Memory Free: {:.1} MB, Memory Active: {:.1} MB, \
         Memory Inactive: {:.1} MB, Memory Buffers: {:.1} MB, Memory Shared: {:.1} MB, \
         Memory Cached: {:.1} MB, Memory Slab: {:.1} MB, Memory Percent: {:.1}%, \
         Disk Total: {:.1} MB, Disk Used: {:.1} MB, Disk Free: {:.1} MB, \
         Disk Percent: {:.1}%, Temperature: {}°C, Uptime: {} seconds",
        stats.cpu_usage.unwrap_or(0.0),
        mb(mem.total),
        mb(mem.available),
        mb(mem.used),
        mb(mem.free),
        mb(mem.active),
        mb(mem.inactive),
        mb(mem.buffers),
        mb(mem.shared),
        mb(mem.cached),
        mb(mem.slab),
        mem.percent.unwrap_or(0.0),
        mb(disk.total),
        mb(disk.used),
        mb(disk.free),
        disk.percent.unwrap_or(0.0),
        stats.temperature.unwrap_or(0.0),
        stats.uptime.unwrap_or(0.0),
    );

    format!(
        r#"<event version="2.0" uid="{}" type="b-m-p-s-m"><point lat="{}" lon="{}" hae="{}" ce="9999999" le="9999999"/><detail><status readiness="true"/><remarks>{}</remarks></detail></event>"#,
        escape(serial),
        p.gps_data.latitude.unwrap_or(0.0),
        p.gps_data.longitude.unwrap_or(0.0),
        p.gps_data.altitude.unwrap_or(0.0),
        escape(&remarks),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cot::parse_event;
    use crate::remarks::status_from_cot;

    const ESP32_JSON: &str = r#"{
        "Basic ID": {"id": "1581F5FKD23C900Q", "id_type": "Serial Number (ANSI/CTA-2063-A)", "ua_type": 2},
        "Location/Vector Message": {"latitude": 40.7128, "longitude": -74.0060, "speed": 8.5,
            "vert_speed": 1.1, "geodetic_altitude": 120.0, "height_agl": 85.0},
        "System Message": {"latitude": 40.7000, "longitude": -74.0000},
        "Self-ID Message": {"text": "survey flight"},
        "rssi": -61
    }"#;

    #[test]
    fn esp32_round_trips_through_the_bridge() {
        let xml = telemetry_to_xml(ESP32_JSON).expect("bridged xml");
        let ev = parse_event(&xml).expect("parse back");

        assert_eq!(ev.uid, "ESP32-1581F5FKD23C900Q");
        assert!(ev.event_type.contains("-S"));
        assert!(ev.event_type.contains("-O"));
        assert_eq!(ev.point.lat, 40.7128);
        assert_eq!(ev.point.lon, -74.0060);
        assert_eq!(ev.detail.speed, Some(8.5));
        assert_eq!(ev.detail.vertical_speed, Some(1.1));
        assert_eq!(ev.detail.height, Some(85.0));
        assert_eq!(ev.detail.rssi, Some(-61.0));
        assert_eq!(ev.detail.ua_type, Some(2));
        assert_eq!(ev.detail.pilot_lat, Some(40.7000));
        assert_eq!(ev.detail.remarks.as_deref(), Some("survey flight"));
    }

    #[test]
    fn bridged_and_direct_signatures_agree() {
        use crate::decoder::decode;
        use crate::extractor::build_signature;
        use rid_types::UaType;

        let direct = build_signature(
            &decode(ESP32_JSON.as_bytes()).unwrap(),
            None,
            1000.0,
            UaType::Other,
        )
        .unwrap();
        let xml = telemetry_to_xml(ESP32_JSON).unwrap();
        let bridged = build_signature(
            &decode(xml.as_bytes()).unwrap(),
            None,
            1000.0,
            UaType::Other,
        )
        .unwrap();

        assert_eq!(direct.primary_id.id, bridged.primary_id.id);
        assert_eq!(direct.primary_id.id_type, bridged.primary_id.id_type);
        assert_eq!(direct.primary_id.ua_type, bridged.primary_id.ua_type);
        assert_eq!(direct.position.coordinate, bridged.position.coordinate);
        assert_eq!(direct.position.altitude, bridged.position.altitude);
        assert_eq!(
            direct.position.operator_location,
            bridged.position.operator_location
        );
        assert_eq!(direct.movement.ground_speed, bridged.movement.ground_speed);
        assert_eq!(
            direct.movement.vertical_speed,
            bridged.movement.vertical_speed
        );
        assert_eq!(
            direct.height_info.height_above_ground,
            bridged.height_info.height_above_ground
        );
        assert_eq!(
            direct.transmission_info.signal_strength,
            bridged.transmission_info.signal_strength
        );
        assert_eq!(
            direct.transmission_info.transmission_type,
            bridged.transmission_info.transmission_type
        );
    }

    #[test]
    fn zero_coordinate_telemetry_is_discarded() {
        let raw = r#"{"Basic ID": {"id": "X1"},
            "Location/Vector Message": {"latitude": 0.0, "longitude": 0.0}}"#;
        assert!(telemetry_to_xml(raw).is_none());
    }

    #[test]
    fn bare_ble_advertisement_still_bridges_with_rssi() {
        let raw = r#"{"AUX_ADV_IND": {"addr": "AA:BB:CC:DD:EE:FF", "chan": 37, "rssi": -55}}"#;
        let xml = telemetry_to_xml(raw).expect("ble xml");
        let ev = parse_event(&xml).unwrap();
        assert_eq!(ev.uid, "BT-AA:BB:CC:DD:EE:FF");
        assert_eq!(ev.point.lat, 0.0);
        assert_eq!(ev.detail.rssi, Some(-55.0));
    }

    #[test]
    fn wifi_map_takes_first_entry_with_location() {
        let raw = r#"{"DroneID": {
            "66:77:88:99:AA:BB": {"Basic ID": {"id": "W1"}},
            "AA:11:22:33:44:55": {"Location/Vector Message": {"latitude": 39.9, "longitude": -75.1}}
        }}"#;
        let xml = telemetry_to_xml(raw).expect("wifi xml");
        let ev = parse_event(&xml).unwrap();
        assert_eq!(ev.uid, "WIFI-AA:11:22:33:44:55");
        assert_eq!(ev.point.lat, 39.9);
    }

    #[test]
    fn status_round_trips_through_the_bridge() {
        let raw = r#"{
            "serial_number": "wardragon-42",
            "gps_data": {"latitude": 41.2, "longitude": -73.9, "altitude": 55.0, "speed": 0.0},
            "system_stats": {
                "cpu_usage": 12.3,
                "memory": {"total": 536870912, "available": 268435456, "percent": 50.0,
                           "used": 268435456, "free": 134217728, "active": 67108864,
                           "inactive": 33554432, "buffers": 16777216, "cached": 8388608,
                           "shared": 4194304, "slab": 2097152},
                "disk": {"total": 1073741824, "used": 536870912, "free": 536870912, "percent": 50.0},
                "temperature": 41.0,
                "uptime": 900.0
            }
        }"#;
        let xml = status_to_xml(raw).expect("status xml");
        let ev = parse_event(&xml).unwrap();
        assert!(ev.is_status());
        assert_eq!(ev.uid, "wardragon-42");

        let status = status_from_cot(&ev);
        assert_eq!(status.system.cpu_usage, 12.3);
        assert_eq!(status.system.memory.total, 536870912);
        assert_eq!(status.system.memory.slab, 2097152);
        assert_eq!(status.system.disk.percent, 50.0);
        assert_eq!(status.system.temperature, 41.0);
        assert_eq!(status.system.uptime, 900.0);
        assert_eq!(status.gps.latitude, 41.2);
    }
}
