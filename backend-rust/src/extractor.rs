//! Canonical signature extraction.
//!
//! Pure transform from one decoded wire message (plus the prior cache entry
//! for the same identifier, when one exists) into an immutable
//! [`DroneSignature`]. The extractor never mutates the cache — continuity
//! fields (flight path, height profile, broadcast intervals) are read-only
//! views of prior history; the cache layer appends afterward.
//!
//! Identity resolution, first matching rule wins:
//!   1. Basic ID block — vendor tag + declared id string
//!   2. BLE advertisement — advertiser address
//!   3. WiFi vendor block — first MAC key, else a structural content hash
//!   4. otherwise — freshly generated unique id, configurable fallback
//!      aircraft category

use sha2::{Digest, Sha256};
use uuid::Uuid;

use rid_types::{
    clamp_unit, AltitudeReference, BroadcastPattern, Coordinate, DroneSignature, HeightInfo,
    HeightReferenceType, IdInfo, IdType, MessageType, MovementVector, PositionInfo, ProtocolType,
    TransmissionInfo, TransmissionType, UaType,
};

use crate::cache::CacheEntry;
use crate::cot::CotEvent;
use crate::decoder::{BlePayload, Esp32Payload, WifiPayload, WireMessage};

/// Height samples considered for the consistency score.
const HEIGHT_WINDOW: usize = 5;
/// Per-step height delta treated as fully inconsistent, meters.
const HEIGHT_DELTA_FULL_SCALE_M: f64 = 2.0;
/// Coefficient of variation treated as fully erratic cadence.
const MAX_ACCEPTABLE_VARIATION: f64 = 0.5;

// ── Derived scores ────────────────────────────────────────────────────────────

/// Broadcast-cadence consistency: rewards metronomic timing, penalizes
/// erratic gaps. Needs at least 2 intervals; fewer scores 1.0.
pub fn pattern_consistency(intervals: &[f64]) -> f64 {
    if intervals.len() < 2 {
        return 1.0;
    }
    let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
    if mean <= 0.0 {
        return 1.0;
    }
    let variance = intervals
        .iter()
        .map(|v| (v - mean).powi(2))
        .sum::<f64>()
        / intervals.len() as f64;
    let coefficient_of_variation = variance.sqrt() / mean;
    clamp_unit(1.0 - coefficient_of_variation / MAX_ACCEPTABLE_VARIATION)
}

/// Height-profile consistency over the most recent cached samples.
pub fn height_consistency(previous_heights: &[f64]) -> f64 {
    let start = previous_heights.len().saturating_sub(HEIGHT_WINDOW);
    let recent = &previous_heights[start..];
    if recent.len() < 2 {
        return 1.0;
    }
    let deltas: Vec<f64> = recent.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    let avg_delta = deltas.iter().sum::<f64>() / deltas.len() as f64;
    clamp_unit(1.0 - avg_delta / HEIGHT_DELTA_FULL_SCALE_M)
}

/// Deterministic structural hash over a canonicalized, ordered tuple of the
/// fields actually used for identity.
pub fn structural_fingerprint<'a, I>(fields: I) -> String
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    let mut pairs: Vec<(&str, String)> = fields.into_iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let mut hasher = Sha256::new();
    for (key, value) in pairs {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(&hasher.finalize()[..8])
}

// ── Intermediate observation fields ───────────────────────────────────────────

struct Obs {
    id: IdInfo,
    operator_id: Option<String>,
    session_id: Option<String>,
    coord: Coordinate,
    altitude: f64,
    operator_location: Option<Coordinate>,
    horizontal_accuracy: Option<f64>,
    vertical_accuracy: Option<f64>,
    speed: f64,
    vert_speed: f64,
    heading: f64,
    height_agl: f64,
    transmission_type: TransmissionType,
    message_type: MessageType,
    rssi: Option<f64>,
    mac: Option<String>,
    channel: Option<i64>,
    adv_mode: Option<String>,
    adv_address: Option<String>,
    did: Option<i64>,
    sid: Option<i64>,
}

impl Default for Obs {
    fn default() -> Self {
        Self {
            id: IdInfo {
                id: String::new(),
                id_type: IdType::Unknown,
                protocol_version: "1.0".to_string(),
                ua_type: UaType::Other,
            },
            operator_id: None,
            session_id: None,
            coord: Coordinate::default(),
            altitude: 0.0,
            operator_location: None,
            horizontal_accuracy: None,
            vertical_accuracy: None,
            speed: 0.0,
            vert_speed: 0.0,
            heading: 0.0,
            height_agl: 0.0,
            transmission_type: TransmissionType::Unknown,
            message_type: MessageType::Bt45,
            rssi: None,
            mac: None,
            channel: None,
            adv_mode: None,
            adv_address: None,
            did: None,
            sid: None,
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn observe(msg: &WireMessage, fallback_ua: UaType) -> Option<Obs> {
    match msg {
        WireMessage::Status(_) => None,
        WireMessage::Esp32(p) => Some(from_odid(p, "ESP32", TransmissionType::Esp32, fallback_ua)),
        WireMessage::Ble(b) => Some(from_ble(b, fallback_ua)),
        WireMessage::Wifi(w) => Some(from_wifi(w, fallback_ua)),
        WireMessage::Cot(ev) => Some(from_cot(ev, fallback_ua)),
    }
}

/// Resolve the primary identifier a message would be cached under, so the
/// caller can look up prior history before building the signature.
pub fn primary_id_of(msg: &WireMessage, fallback_ua: UaType) -> Option<String> {
    observe(msg, fallback_ua).map(|obs| obs.id.id)
}

/// Build a canonical signature from one decoded drone message.
/// Status messages carry no emitter and return None.
pub fn build_signature(
    msg: &WireMessage,
    prior: Option<&CacheEntry>,
    now: f64,
    fallback_ua: UaType,
) -> Option<DroneSignature> {
    observe(msg, fallback_ua).map(|obs| assemble(obs, prior, now))
}

fn ua_type_of(value: Option<&serde_json::Value>, fallback: UaType) -> UaType {
    match value {
        Some(v) => {
            if let Some(n) = v.as_i64() {
                UaType::from_u8(n.clamp(0, u8::MAX as i64) as u8)
            } else if let Some(s) = v.as_str() {
                match s.parse::<u8>() {
                    Ok(n) => UaType::from_u8(n),
                    Err(_) => UaType::from_name(s),
                }
            } else {
                fallback
            }
        }
        None => fallback,
    }
}

fn odid_obs(p: &Esp32Payload, fallback_ua: UaType) -> Obs {
    let mut obs = Obs::default();

    if let Some(location) = p.location.as_ref() {
        obs.coord = Coordinate::new(
            location.latitude.unwrap_or(0.0),
            location.longitude.unwrap_or(0.0),
        );
        obs.altitude = location.geodetic_altitude.unwrap_or(0.0);
        obs.speed = location.speed.unwrap_or(0.0);
        obs.vert_speed = location.vert_speed.unwrap_or(0.0);
        obs.heading = location.heading.unwrap_or(0.0);
        obs.height_agl = location.height_agl.unwrap_or(0.0);
        obs.horizontal_accuracy = location.horiz_acc;
        obs.vertical_accuracy = location.vert_acc;
    }
    if let Some(system) = p.system.as_ref() {
        let op = Coordinate::new(
            system.latitude.unwrap_or(0.0),
            system.longitude.unwrap_or(0.0),
        );
        if !op.is_zero() {
            obs.operator_location = Some(op);
        }
    }
    obs.operator_id = p.operator_id.clone();
    obs.mac = p.basic_id.as_ref().and_then(|b| b.mac.clone());
    // top-level rssi, else nested in the source blocks
    obs.rssi = p
        .rssi
        .or_else(|| p.basic_id.as_ref().and_then(|b| b.rssi))
        .or_else(|| p.location.as_ref().and_then(|l| l.rssi));
    obs.id.ua_type = ua_type_of(p.basic_id.as_ref().and_then(|b| b.ua_type.as_ref()), fallback_ua);
    obs.id.id_type = p
        .basic_id
        .as_ref()
        .and_then(|b| b.id_type.as_deref())
        .map(IdType::from_wire)
        .unwrap_or(IdType::Unknown);
    obs
}

fn from_odid(p: &Esp32Payload, vendor: &str, ttype: TransmissionType, fallback_ua: UaType) -> Obs {
    let mut obs = odid_obs(p, fallback_ua);
    obs.transmission_type = ttype;
    obs.message_type = MessageType::Esp32;

    let declared = p
        .basic_id
        .as_ref()
        .and_then(|b| b.id.as_deref())
        .filter(|id| !id.is_empty() && *id != "NONE");
    obs.id.id = match declared {
        Some(id) => format!("{vendor}-{id}"),
        None => {
            let hw = p.basic_id.as_ref().and_then(|b| b.hw_id.clone());
            match hw.filter(|h| !h.is_empty()) {
                Some(hw_id) => hw_id,
                None => format!(
                    "{vendor}-{}",
                    structural_fingerprint([
                        ("mac", obs.mac.clone().unwrap_or_default()),
                        ("lat", obs.coord.lat.to_string()),
                        ("lon", obs.coord.lon.to_string()),
                    ])
                ),
            }
        }
    };
    obs
}

fn from_ble(b: &BlePayload, fallback_ua: UaType) -> Obs {
    // Rule 1: a declared Basic ID riding on the advertisement wins
    if b
        .odid
        .basic_id
        .as_ref()
        .and_then(|basic| basic.id.as_deref())
        .is_some_and(|id| !id.is_empty() && id != "NONE")
    {
        let mut obs = from_odid(&b.odid, "BT", TransmissionType::Ble, fallback_ua);
        obs.message_type = MessageType::Bt45;
        apply_ble_fields(&mut obs, b);
        return obs;
    }

    // Rule 2: advertiser address. UA type stays unresolved for bare
    // advertisements pending BLE payload parsing.
    let mut obs = odid_obs(&b.odid, UaType::None);
    obs.id.ua_type = UaType::None;
    obs.transmission_type = TransmissionType::Ble;
    obs.message_type = MessageType::Bt45;
    let addr = b
        .bt_addr
        .as_deref()
        .filter(|a| !a.is_empty())
        .or_else(|| b.aux.addr.as_deref().filter(|a| !a.is_empty()));
    obs.id.id = match addr {
        Some(addr) => format!("BT-{addr}"),
        None => format!(
            "BT-{}",
            structural_fingerprint([
                ("chan", b.aux.chan.map(|c| c.to_string()).unwrap_or_default()),
                ("aa", b.aux.aa.map(|a| a.to_string()).unwrap_or_default()),
            ])
        ),
    };
    apply_ble_fields(&mut obs, b);
    obs
}

fn apply_ble_fields(obs: &mut Obs, b: &BlePayload) {
    obs.rssi = b.aux.rssi.or(obs.rssi);
    obs.channel = b.aux.chan;
    if obs.mac.is_none() {
        obs.mac = b.aux.addr.clone();
    }
    if let Some(aext) = b.aext.as_ref() {
        obs.adv_mode = aext.adv_mode.clone();
        obs.adv_address = aext
            .adv_a
            .as_deref()
            .and_then(|a| a.split_whitespace().next())
            .map(str::to_string);
        if let Some(info) = aext.adv_data_info.as_ref() {
            obs.did = info.did;
            obs.sid = info.sid;
        }
    }
}

fn from_wifi(w: &WifiPayload, fallback_ua: UaType) -> Obs {
    let Some((mac_key, fields)) = w.drone_id.iter().next() else {
        let mut obs = Obs::default();
        obs.transmission_type = TransmissionType::Wifi;
        obs.message_type = MessageType::Wifi;
        obs.id.id = format!("WIFI-{}", Uuid::new_v4());
        return obs;
    };

    let mut obs = odid_obs(fields, fallback_ua);
    obs.transmission_type = TransmissionType::Wifi;
    obs.message_type = MessageType::Wifi;

    let field_mac = fields
        .basic_id
        .as_ref()
        .and_then(|b| b.mac.as_deref())
        .filter(|m| !m.is_empty());
    obs.id.id = match field_mac {
        Some(mac) => format!("WIFI-{mac}"),
        None if !mac_key.is_empty() => format!("WIFI-{mac_key}"),
        None => format!(
            "WIFI-{}",
            structural_fingerprint([
                ("lat", obs.coord.lat.to_string()),
                ("lon", obs.coord.lon.to_string()),
            ])
        ),
    };
    if obs.mac.is_none() && !mac_key.is_empty() {
        obs.mac = Some(mac_key.clone());
    }
    obs
}

fn transmission_type_from_uid(uid: &str) -> TransmissionType {
    if uid.starts_with("BT-") {
        TransmissionType::Ble
    } else if uid.starts_with("WIFI-") {
        TransmissionType::Wifi
    } else if uid.starts_with("ESP32-") {
        TransmissionType::Esp32
    } else {
        TransmissionType::Unknown
    }
}

fn from_cot(ev: &CotEvent, fallback_ua: UaType) -> Obs {
    // A message-embedded JSON payload takes precedence over anything
    // synthesized from point/attribute data.
    if let Some(embedded) = ev.detail.embedded.as_deref() {
        let mut obs = from_odid(embedded, "ESP32", TransmissionType::Esp32, fallback_ua);
        if !ev.uid.is_empty() {
            obs.id.id = ev.uid.clone();
        }
        obs.transmission_type = transmission_type_from_uid(&obs.id.id);
        obs.rssi = obs.rssi.or(ev.detail.rssi);
        return obs;
    }

    let mut obs = Obs::default();
    let d = &ev.detail;

    obs.id.id = if ev.uid.is_empty() {
        // Rule 4: no identity block at all
        Uuid::new_v4().to_string()
    } else {
        ev.uid.clone()
    };
    obs.id.id_type = if ev.event_type.contains("-S") {
        IdType::SerialNumber
    } else if ev.event_type.contains("-R") {
        IdType::CaaRegistration
    } else {
        IdType::Unknown
    };
    obs.id.ua_type = match d.ua_type {
        Some(n) => UaType::from_u8(n.clamp(0, u8::MAX as i64) as u8),
        None => fallback_ua,
    };

    obs.transmission_type = transmission_type_from_uid(&ev.uid);
    obs.message_type = match obs.transmission_type {
        TransmissionType::Wifi => MessageType::Wifi,
        TransmissionType::Esp32 => MessageType::Esp32,
        _ => MessageType::Bt45,
    };

    obs.coord = Coordinate::new(ev.point.lat, ev.point.lon);
    obs.altitude = d.altitude.unwrap_or(ev.point.hae);
    obs.speed = d.speed.unwrap_or(0.0);
    obs.vert_speed = d.vertical_speed.unwrap_or(0.0);
    obs.height_agl = d.height.unwrap_or(0.0);
    obs.horizontal_accuracy = d.horiz_acc;
    obs.vertical_accuracy = d.vert_acc;
    obs.rssi = d.rssi;

    let op = Coordinate::new(d.pilot_lat.unwrap_or(0.0), d.pilot_lon.unwrap_or(0.0));
    if !op.is_zero() {
        obs.operator_location = Some(op);
    }
    obs
}

// ── Assembly ──────────────────────────────────────────────────────────────────

fn assemble(obs: Obs, prior: Option<&CacheEntry>, now: f64) -> DroneSignature {
    let prior_heights: Vec<f64> = prior
        .map(|e| e.height_profile.iter().copied().collect())
        .unwrap_or_default();
    let prior_path: Vec<Coordinate> = prior
        .map(|e| e.flight_path.iter().copied().collect())
        .unwrap_or_default();
    let prior_timestamps: Vec<f64> = prior
        .map(|e| e.signatures.iter().map(|s| s.timestamp).collect())
        .unwrap_or_default();

    let intervals: Vec<f64> = prior_timestamps
        .windows(2)
        .map(|w| w[1] - w[0])
        .collect();
    let first_seen = prior_timestamps.first().copied().unwrap_or(now);
    let message_interval = if prior_timestamps.len() >= 2 {
        Some(intervals.iter().sum::<f64>() / intervals.len() as f64)
    } else {
        None
    };

    let non_zero = !obs.coord.is_zero();

    DroneSignature {
        position: PositionInfo {
            coordinate: obs.coord,
            altitude: obs.altitude,
            altitude_reference: AltitudeReference::Wgs84,
            last_known_good_position: non_zero.then_some(obs.coord),
            operator_location: obs.operator_location,
            horizontal_accuracy: obs.horizontal_accuracy,
            vertical_accuracy: obs.vertical_accuracy,
            timestamp: now,
        },
        movement: MovementVector {
            ground_speed: obs.speed,
            vertical_speed: obs.vert_speed,
            heading: obs.heading,
            climb_rate: None,
            turn_rate: None,
            flight_path: prior_path,
            timestamp: now,
        },
        height_info: HeightInfo {
            height_above_ground: obs.height_agl,
            height_above_takeoff: None,
            reference_type: HeightReferenceType::Ground,
            consistency_score: height_consistency(&prior_heights),
            last_known_good_height: if obs.height_agl == 0.0 {
                prior_heights.last().copied()
            } else {
                Some(obs.height_agl)
            },
            timestamp: now,
        },
        transmission_info: TransmissionInfo {
            transmission_type: obs.transmission_type,
            signal_strength: obs.rssi,
            frequency: None,
            protocol_type: ProtocolType::OpenDroneId,
            message_types: [obs.message_type].into_iter().collect(),
            mac_address: obs.mac,
            channel: obs.channel,
            adv_mode: obs.adv_mode,
            adv_address: obs.adv_address,
            did: obs.did,
            sid: obs.sid,
            timestamp: now,
        },
        broadcast_pattern: BroadcastPattern {
            message_sequence: vec![obs.message_type],
            consistency: pattern_consistency(&intervals),
            interval_pattern: intervals,
            start_time: first_seen,
            last_update: now,
        },
        primary_id: obs.id,
        secondary_id: None,
        operator_id: obs.operator_id,
        session_id: obs.session_id,
        timestamp: now,
        first_seen,
        message_interval,
    }
}
