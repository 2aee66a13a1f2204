//! # rid-types
//!
//! Shared Remote-ID structures for the DroneWatch suite.
//!
//! These types are used by:
//! - `backend-rust`: decoding broadcast telemetry and correlating emitters
//! - `rid-simulator`: producing synthetic Remote-ID traffic for bench runs
//!
//! ## Conventions
//!
//! - Coordinates are WGS-84 degrees. `(0, 0)` is a live sentinel meaning
//!   "no position reported" and is never silently replaced with a prior fix.
//! - Timestamps are Unix seconds (f64), matching broadcast payloads.
//! - Every derived score (consistency, match strength, confidence) is
//!   clamped to [0, 1] via [`clamp_unit`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// WGS-84 mean Earth radius, meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Clamp a derived score into the unit interval.
pub fn clamp_unit(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

// ── Geographic primitives ─────────────────────────────────────────────────────

/// WGS-84 coordinate, degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// The "no position reported" sentinel.
    pub fn is_zero(&self) -> bool {
        self.lat == 0.0 && self.lon == 0.0
    }

    /// Great-circle distance to another coordinate, meters (haversine).
    pub fn distance_m(&self, other: &Coordinate) -> f64 {
        let (lat1, lon1) = (self.lat.to_radians(), self.lon.to_radians());
        let (lat2, lon2) = (other.lat.to_radians(), other.lon.to_radians());
        let dlat = lat2 - lat1;
        let dlon = lon2 - lon1;
        let a = (dlat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

// ── Identity ──────────────────────────────────────────────────────────────────

/// How the broadcast identifier was assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    SerialNumber,
    CaaRegistration,
    UtmAssigned,
    SessionId,
    Unknown,
}

impl IdType {
    /// Map the ASTM F3411 wire label onto the enum. Exact-match only;
    /// anything unrecognized is `Unknown`.
    pub fn from_wire(label: &str) -> Self {
        match label {
            "Serial Number (ANSI/CTA-2063-A)" => Self::SerialNumber,
            "CAA Assigned Registration ID" | "CAA Registration ID" => Self::CaaRegistration,
            _ => Self::Unknown,
        }
    }
}

/// Aircraft category declared in the Basic ID block (ASTM F3411 UA types).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum UaType {
    None = 0,
    Aeroplane = 1,
    Helicopter = 2,
    Gyroplane = 3,
    HybridLift = 4,
    Ornithopter = 5,
    Glider = 6,
    Kite = 7,
    FreeBalloon = 8,
    CaptiveBalloon = 9,
    Airship = 10,
    FreeFall = 11,
    Rocket = 12,
    Tethered = 13,
    GroundObstacle = 14,
    Other = 15,
}

impl UaType {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::None,
            1 => Self::Aeroplane,
            2 => Self::Helicopter,
            3 => Self::Gyroplane,
            4 => Self::HybridLift,
            5 => Self::Ornithopter,
            6 => Self::Glider,
            7 => Self::Kite,
            8 => Self::FreeBalloon,
            9 => Self::CaptiveBalloon,
            10 => Self::Airship,
            11 => Self::FreeFall,
            12 => Self::Rocket,
            13 => Self::Tethered,
            14 => Self::GroundObstacle,
            _ => Self::Other,
        }
    }

    /// Map the human-readable name used by CoT detail blocks.
    pub fn from_name(name: &str) -> Self {
        match name {
            "None" => Self::None,
            "Aeroplane" | "Airplane" => Self::Aeroplane,
            "Helicopter (or Multirotor)" | "Helicopter" => Self::Helicopter,
            "Gyroplane" => Self::Gyroplane,
            "Hybrid Lift" => Self::HybridLift,
            "Ornithopter" => Self::Ornithopter,
            "Glider" => Self::Glider,
            "Kite" => Self::Kite,
            "Free Balloon" => Self::FreeBalloon,
            "Captive Balloon" => Self::CaptiveBalloon,
            "Airship" => Self::Airship,
            "Free Fall/Parachute" => Self::FreeFall,
            "Rocket" => Self::Rocket,
            "Tethered Powered Aircraft" => Self::Tethered,
            "Ground Obstacle" => Self::GroundObstacle,
            _ => Self::Other,
        }
    }
}

/// Resolved identity for one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdInfo {
    pub id: String,
    pub id_type: IdType,
    pub protocol_version: String,
    pub ua_type: UaType,
}

// ── Position & movement ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AltitudeReference {
    Takeoff,
    Ground,
    Wgs84,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub coordinate: Coordinate,
    /// Geodetic altitude, meters.
    pub altitude: f64,
    pub altitude_reference: AltitudeReference,
    /// Most recent non-zero fix, if any.
    pub last_known_good_position: Option<Coordinate>,
    /// Operator (pilot) position from the System Message, if reported.
    pub operator_location: Option<Coordinate>,
    pub horizontal_accuracy: Option<f64>,
    pub vertical_accuracy: Option<f64>,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementVector {
    /// m/s
    pub ground_speed: f64,
    /// m/s, positive up
    pub vertical_speed: f64,
    /// Degrees true, 0 = north
    pub heading: f64,
    pub climb_rate: Option<f64>,
    pub turn_rate: Option<f64>,
    /// Carried forward from the cache; the cache layer appends, not the
    /// extractor.
    pub flight_path: Vec<Coordinate>,
    pub timestamp: f64,
}

// ── Height ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeightReferenceType {
    Ground,
    Takeoff,
    PressureAltitude,
    Wgs84,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightInfo {
    pub height_above_ground: f64,
    pub height_above_takeoff: Option<f64>,
    pub reference_type: HeightReferenceType,
    /// How steady the recent height profile has been, [0, 1].
    pub consistency_score: f64,
    pub last_known_good_height: Option<f64>,
    pub timestamp: f64,
}

// ── Transmission ──────────────────────────────────────────────────────────────

/// Which radio path carried the observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransmissionType {
    Ble,
    Wifi,
    Esp32,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolType {
    OpenDroneId,
    LegacyRemoteId,
    AstmF3411,
    Custom,
}

/// Message-type tags seen from this emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Bt45,
    Wifi,
    Esp32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmissionInfo {
    pub transmission_type: TransmissionType,
    /// dBm, when the capture path reported one.
    pub signal_strength: Option<f64>,
    /// MHz
    pub frequency: Option<f64>,
    pub protocol_type: ProtocolType,
    pub message_types: BTreeSet<MessageType>,
    pub mac_address: Option<String>,
    pub channel: Option<i64>,
    pub adv_mode: Option<String>,
    pub adv_address: Option<String>,
    pub did: Option<i64>,
    pub sid: Option<i64>,
    pub timestamp: f64,
}

// ── Broadcast pattern ─────────────────────────────────────────────────────────

/// Timing fingerprint of the emitter's broadcast cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastPattern {
    pub message_sequence: Vec<MessageType>,
    /// Consecutive inter-message deltas, seconds.
    pub interval_pattern: Vec<f64>,
    /// 1.0 = metronomic cadence, 0.0 = erratic. See extractor scoring.
    pub consistency: f64,
    pub start_time: f64,
    pub last_update: f64,
}

// ── Signature ─────────────────────────────────────────────────────────────────

/// One immutable snapshot of an emitter's reported state plus derived
/// consistency/pattern scores. The cache, not the signature, owns series
/// history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneSignature {
    pub primary_id: IdInfo,
    pub secondary_id: Option<IdInfo>,
    pub operator_id: Option<String>,
    pub session_id: Option<String>,
    pub position: PositionInfo,
    pub movement: MovementVector,
    pub height_info: HeightInfo,
    pub transmission_info: TransmissionInfo,
    pub broadcast_pattern: BroadcastPattern,
    pub timestamp: f64,
    /// Never decreases across observations of the same primary id.
    pub first_seen: f64,
    /// Mean inter-message interval; absent with fewer than 2 prior samples.
    pub message_interval: Option<f64>,
}

// ── Match records ─────────────────────────────────────────────────────────────

/// Which signature facets contributed to a similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    PrimaryId,
    OperatorLocation,
    Position,
    Movement,
    HeightPattern,
    BroadcastPattern,
    SignalCharacteristics,
}

/// Immutable record of one matcher evaluation. Appended to the current
/// signature's cache entry, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureMatch {
    pub timestamp: f64,
    pub match_strength: f64,
    pub matched_fields: BTreeSet<MatchField>,
    pub confidence: f64,
}

// ── Ground-sensor status ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GpsData {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f64,
}

impl GpsData {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: i64,
    pub available: i64,
    pub percent: f64,
    pub used: i64,
    pub free: i64,
    pub active: i64,
    pub inactive: i64,
    pub buffers: i64,
    pub cached: i64,
    pub shared: i64,
    pub slab: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DiskStats {
    pub total: i64,
    pub used: i64,
    pub free: i64,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemStats {
    pub cpu_usage: f64,
    pub memory: MemoryStats,
    pub disk: DiskStats,
    pub temperature: f64,
    pub uptime: f64,
}

/// Companion ground-sensor status: own GPS fix plus host system stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub uid: String,
    pub serial_number: String,
    pub timestamp: f64,
    pub gps: GpsData,
    pub system: SystemStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ua_type_maps_all_declared_categories() {
        assert_eq!(UaType::from_u8(0), UaType::None);
        assert_eq!(UaType::from_u8(2), UaType::Helicopter);
        assert_eq!(UaType::from_u8(8), UaType::FreeBalloon);
        assert_eq!(UaType::from_u8(14), UaType::GroundObstacle);
        assert_eq!(UaType::from_u8(15), UaType::Other);
        assert_eq!(UaType::from_u8(200), UaType::Other);
    }

    #[test]
    fn id_type_exact_wire_labels_only() {
        assert_eq!(
            IdType::from_wire("Serial Number (ANSI/CTA-2063-A)"),
            IdType::SerialNumber
        );
        assert_eq!(
            IdType::from_wire("CAA Assigned Registration ID"),
            IdType::CaaRegistration
        );
        assert_eq!(IdType::from_wire("Serial Number"), IdType::Unknown);
        assert_eq!(IdType::from_wire(""), IdType::Unknown);
    }

    #[test]
    fn zero_coordinate_is_sentinel() {
        assert!(Coordinate::new(0.0, 0.0).is_zero());
        assert!(!Coordinate::new(0.0, 0.0001).is_zero());
    }

    #[test]
    fn haversine_known_distance() {
        // One degree of latitude at the equator ≈ 111.19 km
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(1.0, 0.0);
        let d = a.distance_m(&b);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn clamp_unit_bounds() {
        assert_eq!(clamp_unit(-0.3), 0.0);
        assert_eq!(clamp_unit(0.5), 0.5);
        assert_eq!(clamp_unit(1.7), 1.0);
    }
}
