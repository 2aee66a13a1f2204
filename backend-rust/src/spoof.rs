//! Spoof suspicion scoring.
//!
//! Deterministic, side-effect-free assessment of one new signature against
//! its own cached history and the ground sensor's current position. Three
//! independent signals accumulate confidence:
//!
//! - received signal strength deviating from the free-space-path-loss
//!   expectation at the reported distance
//! - implausibly strong signal for a distant track
//! - kinematically impossible jumps across the cached observation history
//!
//! Also home to the RSSI → range estimate used when an emitter reports no
//! position at all (encrypted/zero-position mode): presence and
//! approximate range are all that can be recovered there.

use rid_types::{clamp_unit, Coordinate, DroneSignature, StatusMessage};

use crate::cache::CacheEntry;

/// Ground speed no real small UA sustains, m/s (~500 km/h).
const MAX_CREDIBLE_SPEED_MS: f64 = 139.0;
/// FSPL deviation treated as suspicious, dB.
const RSSI_DEVIATION_DB: f64 = 20.0;
/// Accumulated confidence at which the flag flips.
const SPOOF_THRESHOLD: f64 = 0.2;
/// Default carrier when the payload names none, MHz (2.4 GHz ISM).
const DEFAULT_FREQUENCY_MHZ: f64 = 2400.0;

/// One spoof assessment. `reasons` name every signal that fired.
#[derive(Debug, Clone, PartialEq)]
pub struct SpoofAssessment {
    pub is_spoofed: bool,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub expected_rssi: f64,
    pub actual_rssi: f64,
    pub distance_m: f64,
}

/// Free-space path loss expectation, dBm, for a transmitter at
/// `distance_m` on `frequency_mhz`. None below one meter.
pub fn expected_rssi(distance_m: f64, frequency_mhz: f64) -> Option<f64> {
    if distance_m <= 0.0 {
        return None;
    }
    let distance_km = distance_m / 1000.0;
    Some(-(20.0 * distance_km.log10() + 20.0 * frequency_mhz.log10() + 32.44))
}

/// Log-distance range estimate from a raw RSSI reading, clamped to
/// [10 m, 1000 m]. Used for proximity rings around zero-position emitters.
pub fn distance_from_rssi(rssi: f64) -> f64 {
    const TX_POWER_AT_1M_DBM: f64 = -59.0;
    const PATH_LOSS_EXPONENT: f64 = 2.0;
    let ratio = (TX_POWER_AT_1M_DBM - rssi) / (10.0 * PATH_LOSS_EXPONENT);
    let distance = 10.0_f64.powf(ratio);
    distance.clamp(10.0, 1000.0)
}

/// Proximity observation for an emitter heard but not located: a ring
/// around the ground sensor at the estimated range.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityRing {
    pub drone_id: String,
    pub center: Coordinate,
    pub radius_m: f64,
    pub rssi: f64,
}

impl ProximityRing {
    pub fn from_rssi(drone_id: &str, center: Coordinate, rssi: f64) -> Self {
        Self {
            drone_id: drone_id.to_string(),
            center,
            radius_m: distance_from_rssi(rssi),
            rssi,
        }
    }
}

/// Implied ground speeds between consecutive cached observations, m/s.
fn implied_speeds(entry: &CacheEntry) -> Vec<f64> {
    entry
        .signatures
        .iter()
        .zip(entry.signatures.iter().skip(1))
        .filter_map(|(prev, curr)| {
            if prev.position.coordinate.is_zero() || curr.position.coordinate.is_zero() {
                return None;
            }
            let dt = curr.timestamp - prev.timestamp;
            if dt <= 0.0 {
                return None;
            }
            let distance = prev
                .position
                .coordinate
                .distance_m(&curr.position.coordinate);
            Some(distance / dt)
        })
        .collect()
}

/// Assess one signature for spoofing. O(history), no side effects.
pub fn assess(
    signature: &DroneSignature,
    history: Option<&CacheEntry>,
    monitor: &StatusMessage,
) -> SpoofAssessment {
    let mut reasons = Vec::new();
    let mut confidence: f64 = 0.0;

    let distance_m = monitor
        .gps
        .coordinate()
        .distance_m(&signature.position.coordinate);
    let frequency = signature
        .transmission_info
        .frequency
        .unwrap_or(DEFAULT_FREQUENCY_MHZ);
    let expected = expected_rssi(distance_m, frequency).unwrap_or(0.0);
    let actual = signature.transmission_info.signal_strength;

    if let Some(rssi) = actual {
        let deviation = (rssi - expected).abs();
        if deviation > RSSI_DEVIATION_DB {
            reasons.push(format!(
                "signal strength deviation: {deviation:.1} dB (expected {expected:.1} dB, \
                 actual {rssi:.1} dB at {distance_m:.1} m)"
            ));
            confidence += (deviation / 40.0).min(0.5);
        }
        if rssi > -20.0 && distance_m > 100.0 {
            reasons.push("suspiciously strong signal for distance".to_string());
            confidence += 0.3;
        }
    }

    if let Some(entry) = history {
        let speeds = implied_speeds(entry);
        if let Some(max_speed) = speeds.iter().copied().fold(None::<f64>, |acc, s| {
            Some(acc.map_or(s, |m| m.max(s)))
        }) {
            if max_speed > MAX_CREDIBLE_SPEED_MS {
                reasons.push(format!("impossible speed detected: {max_speed:.1} m/s"));
                confidence += 0.3;
            }
        }
    }

    let confidence = clamp_unit(confidence);
    SpoofAssessment {
        is_spoofed: confidence >= SPOOF_THRESHOLD,
        confidence,
        reasons,
        expected_rssi: expected,
        actual_rssi: actual.unwrap_or(0.0),
        distance_m,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rid_types::{GpsData, SystemStats, UaType};

    use crate::cache::SignatureCache;
    use crate::decoder::decode;
    use crate::extractor::build_signature;

    fn monitor_at(lat: f64, lon: f64) -> StatusMessage {
        StatusMessage {
            uid: "wardragon-1".to_string(),
            serial_number: "wardragon-1".to_string(),
            timestamp: 0.0,
            gps: GpsData {
                latitude: lat,
                longitude: lon,
                altitude: 10.0,
                speed: 0.0,
            },
            system: SystemStats::default(),
        }
    }

    fn track_sig(id: &str, lat: f64, lon: f64, rssi: f64, cache: &SignatureCache, now: f64) -> rid_types::DroneSignature {
        let raw = format!(
            r#"{{"Basic ID": {{"id": "{id}"}},
                "Location/Vector Message": {{"latitude": {lat}, "longitude": {lon},
                    "rssi": {rssi}, "height_agl": 40.0}}}}"#
        );
        let msg = decode(raw.as_bytes()).unwrap();
        build_signature(&msg, cache.lookup(&format!("ESP32-{id}")), now, UaType::Other).unwrap()
    }

    #[test]
    fn fspl_expectation_decreases_with_distance() {
        let near = expected_rssi(100.0, 2400.0).unwrap();
        let far = expected_rssi(1000.0, 2400.0).unwrap();
        assert!(near > far);
        assert!(expected_rssi(0.0, 2400.0).is_none());
    }

    #[test]
    fn rssi_range_estimate_is_clamped() {
        // very strong: clamp at 10 m floor
        assert_eq!(distance_from_rssi(-20.0), 10.0);
        // very weak: clamp at 1 km ceiling
        assert_eq!(distance_from_rssi(-130.0), 1000.0);
        // -79 dBm with -59 reference → 10 m
        assert!((distance_from_rssi(-79.0) - 10.0).abs() < 1e-6);
        let mid = distance_from_rssi(-89.0);
        assert!(mid > 10.0 && mid < 1000.0);
    }

    #[test]
    fn plausible_track_is_not_flagged() {
        let mut cache = SignatureCache::new();
        let monitor = monitor_at(40.700, -74.000);
        // ~500 m from the sensor; RSSI near the FSPL expectation there
        let sig = track_sig("OK", 40.7045, -74.000, -94.0, &cache, 1000.0);
        cache.record_observation(&sig, 1000.0);
        let verdict = assess(&sig, cache.lookup("ESP32-OK"), &monitor);
        assert!(!verdict.is_spoofed, "reasons: {:?}", verdict.reasons);
    }

    #[test]
    fn strong_signal_at_distance_is_flagged() {
        let cache = SignatureCache::new();
        let monitor = monitor_at(40.700, -74.000);
        // several km away yet reporting -10 dBm
        let sig = track_sig("HOT", 40.750, -74.000, -10.0, &cache, 1000.0);
        let verdict = assess(&sig, None, &monitor);
        assert!(verdict.is_spoofed);
        assert!(verdict.confidence >= 0.5);
        assert_eq!(verdict.reasons.len(), 2);
    }

    #[test]
    fn impossible_jump_across_history_is_flagged() {
        let mut cache = SignatureCache::new();
        let monitor = monitor_at(40.700, -74.000);
        let a = track_sig("JMP", 40.700, -74.000, -60.0, &cache, 1000.0);
        cache.record_observation(&a, 1000.0);
        // ~11 km in one second
        let b = track_sig("JMP", 40.800, -74.000, -60.0, &cache, 1001.0);
        cache.record_observation(&b, 1001.0);
        let verdict = assess(&b, cache.lookup("ESP32-JMP"), &monitor);
        assert!(verdict
            .reasons
            .iter()
            .any(|r| r.starts_with("impossible speed")));
        assert!(verdict.is_spoofed);
    }

    #[test]
    fn assessment_is_deterministic() {
        let cache = SignatureCache::new();
        let monitor = monitor_at(40.700, -74.000);
        let sig = track_sig("DET", 40.705, -74.000, -50.0, &cache, 1000.0);
        let v1 = assess(&sig, None, &monitor);
        let v2 = assess(&sig, None, &monitor);
        assert_eq!(v1, v2);
        assert!((0.0..=1.0).contains(&v1.confidence));
    }
}
