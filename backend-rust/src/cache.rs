//! Per-identifier rolling history store.
//!
//! Single source of truth for emitter history. The extractor reads
//! continuity fields from here and the matcher appends match records; no
//! other mutation path exists. Every series is a bounded ring buffer with
//! strict FIFO eviction, and stale entries are swept opportunistically —
//! at most once per retention window, before a new observation is
//! recorded — rather than on a background timer.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use rid_types::{Coordinate, DroneSignature, SignatureMatch};

/// Ring-buffer capacity for every per-id series.
pub const HISTORY_CAP: usize = 100;
/// Entries untouched for this long are removed by the prune sweep, seconds.
pub const RETENTION_SECS: f64 = 300.0;

/// Mutable tracking state for one primary identifier.
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    pub signatures: VecDeque<DroneSignature>,
    /// Non-zero coordinates only.
    pub flight_path: VecDeque<Coordinate>,
    pub height_profile: VecDeque<f64>,
    pub match_history: VecDeque<SignatureMatch>,
    pub last_update: f64,
    pub confidence_score: f64,
}

fn push_capped<T>(buf: &mut VecDeque<T>, value: T) {
    buf.push_back(value);
    if buf.len() > HISTORY_CAP {
        buf.pop_front();
    }
}

#[derive(Debug, Default)]
pub struct SignatureCache {
    entries: HashMap<String, CacheEntry>,
    last_prune: f64,
}

impl SignatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, id: &str) -> Option<&CacheEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append one observation to the identifier's ring buffers, creating
    /// the entry on first sight. Returns true when the identifier is new.
    pub fn record_observation(&mut self, signature: &DroneSignature, now: f64) -> bool {
        self.maybe_prune(now);

        let id = signature.primary_id.id.clone();
        let is_new = !self.entries.contains_key(&id);
        let entry = self.entries.entry(id).or_insert_with(|| CacheEntry {
            confidence_score: 1.0,
            ..CacheEntry::default()
        });

        if !signature.position.coordinate.is_zero() {
            push_capped(&mut entry.flight_path, signature.position.coordinate);
        }
        push_capped(
            &mut entry.height_profile,
            signature.height_info.height_above_ground,
        );
        push_capped(&mut entry.signatures, signature.clone());
        entry.last_update = signature.timestamp;
        is_new
    }

    /// Append a match record to the identifier's history. The matcher is
    /// the only caller.
    pub fn append_match(&mut self, id: &str, record: SignatureMatch) {
        if let Some(entry) = self.entries.get_mut(id) {
            push_capped(&mut entry.match_history, record);
        }
    }

    /// Remove every entry whose `last_update` predates the retention
    /// window. Callable directly for tests; normal operation goes through
    /// the opportunistic sweep in [`Self::record_observation`].
    pub fn prune_expired(&mut self, now: f64) {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.last_update >= now - RETENTION_SECS);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("cache: pruned {removed} stale entries ({} live)", self.entries.len());
        }
    }

    fn maybe_prune(&mut self, now: f64) {
        if now - self.last_prune > RETENTION_SECS {
            self.prune_expired(now);
            self.last_prune = now;
        }
    }

    /// Iterate entries for correlation scans.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &CacheEntry)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rid_types::{
        AltitudeReference, BroadcastPattern, HeightInfo, HeightReferenceType, IdInfo, IdType,
        MessageType, MovementVector, PositionInfo, ProtocolType, TransmissionInfo,
        TransmissionType, UaType,
    };

    fn signature(id: &str, t: f64, lat: f64, height: f64) -> DroneSignature {
        DroneSignature {
            primary_id: IdInfo {
                id: id.to_string(),
                id_type: IdType::Unknown,
                protocol_version: "1.0".to_string(),
                ua_type: UaType::Other,
            },
            secondary_id: None,
            operator_id: None,
            session_id: None,
            position: PositionInfo {
                coordinate: Coordinate::new(lat, lat),
                altitude: 100.0,
                altitude_reference: AltitudeReference::Wgs84,
                last_known_good_position: None,
                operator_location: None,
                horizontal_accuracy: None,
                vertical_accuracy: None,
                timestamp: t,
            },
            movement: MovementVector {
                ground_speed: 0.0,
                vertical_speed: 0.0,
                heading: 0.0,
                climb_rate: None,
                turn_rate: None,
                flight_path: Vec::new(),
                timestamp: t,
            },
            height_info: HeightInfo {
                height_above_ground: height,
                height_above_takeoff: None,
                reference_type: HeightReferenceType::Ground,
                consistency_score: 1.0,
                last_known_good_height: None,
                timestamp: t,
            },
            transmission_info: TransmissionInfo {
                transmission_type: TransmissionType::Esp32,
                signal_strength: None,
                frequency: None,
                protocol_type: ProtocolType::OpenDroneId,
                message_types: [MessageType::Esp32].into_iter().collect(),
                mac_address: None,
                channel: None,
                adv_mode: None,
                adv_address: None,
                did: None,
                sid: None,
                timestamp: t,
            },
            broadcast_pattern: BroadcastPattern {
                message_sequence: vec![MessageType::Esp32],
                interval_pattern: Vec::new(),
                consistency: 1.0,
                start_time: t,
                last_update: t,
            },
            timestamp: t,
            first_seen: t,
            message_interval: None,
        }
    }

    #[test]
    fn entry_created_on_first_observation() {
        let mut cache = SignatureCache::new();
        assert!(cache.record_observation(&signature("a", 1.0, 10.0, 5.0), 1.0));
        assert!(!cache.record_observation(&signature("a", 2.0, 10.1, 5.0), 2.0));
        assert_eq!(cache.len(), 1);
        let entry = cache.lookup("a").unwrap();
        assert_eq!(entry.signatures.len(), 2);
        assert_eq!(entry.last_update, 2.0);
        assert_eq!(entry.confidence_score, 1.0);
    }

    #[test]
    fn ring_buffers_cap_at_100_fifo() {
        let mut cache = SignatureCache::new();
        for i in 0..150 {
            cache.record_observation(&signature("a", i as f64, 1.0, i as f64), i as f64);
        }
        let entry = cache.lookup("a").unwrap();
        assert_eq!(entry.signatures.len(), HISTORY_CAP);
        assert_eq!(entry.height_profile.len(), HISTORY_CAP);
        // after inserting e0..e149 the buffer holds e50..e149
        assert_eq!(entry.height_profile.front().copied(), Some(50.0));
        assert_eq!(entry.height_profile.back().copied(), Some(149.0));
        assert_eq!(entry.signatures.front().unwrap().timestamp, 50.0);
    }

    #[test]
    fn zero_coordinates_stay_out_of_the_flight_path() {
        let mut cache = SignatureCache::new();
        cache.record_observation(&signature("a", 1.0, 0.0, 5.0), 1.0);
        cache.record_observation(&signature("a", 2.0, 12.0, 5.0), 2.0);
        let entry = cache.lookup("a").unwrap();
        assert_eq!(entry.signatures.len(), 2);
        assert_eq!(entry.flight_path.len(), 1);
        assert_eq!(entry.flight_path[0].lat, 12.0);
    }

    #[test]
    fn prune_boundary_is_exact() {
        let mut cache = SignatureCache::new();
        cache.record_observation(&signature("old", 699.0, 1.0, 1.0), 699.0);
        cache.record_observation(&signature("fresh", 701.0, 1.0, 1.0), 701.0);
        cache.prune_expired(1000.0);
        // last_update 699 is 301s old — gone; 701 is 299s old — kept
        assert!(cache.lookup("old").is_none());
        assert!(cache.lookup("fresh").is_some());
    }

    #[test]
    fn opportunistic_prune_runs_at_most_once_per_window() {
        let mut cache = SignatureCache::new();
        cache.record_observation(&signature("a", 0.0, 1.0, 1.0), 0.0);
        // within the window: "a" is stale relative to t=350 but the sweep
        // already ran at t=301, so it survives until the next window
        cache.record_observation(&signature("b", 301.0, 1.0, 1.0), 301.0);
        assert!(cache.lookup("a").is_none(), "first sweep removes a");
        cache.record_observation(&signature("c", 350.0, 1.0, 1.0), 350.0);
        assert!(cache.lookup("b").is_some());
        assert!(cache.lookup("c").is_some());
    }

    #[test]
    fn match_history_appends_and_caps() {
        let mut cache = SignatureCache::new();
        cache.record_observation(&signature("a", 1.0, 1.0, 1.0), 1.0);
        for i in 0..120 {
            cache.append_match(
                "a",
                SignatureMatch {
                    timestamp: i as f64,
                    match_strength: 0.5,
                    matched_fields: Default::default(),
                    confidence: 0.5,
                },
            );
        }
        let entry = cache.lookup("a").unwrap();
        assert_eq!(entry.match_history.len(), HISTORY_CAP);
        assert_eq!(entry.match_history.front().unwrap().timestamp, 20.0);
    }
}
