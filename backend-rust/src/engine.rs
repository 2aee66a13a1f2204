//! Serialized update path.
//!
//! Every transport funnels decoded frames into one mpsc channel; this
//! module owns the single task that drains it. All cache mutation and
//! event emission happens here, in arrival order, so there are no races on
//! the shared per-id state and each message touches at most one entry.
//!
//! Zero-coordinate policy (format-path dependent, deliberately so): a
//! drone observation with no usable fix is dropped unless it carries an
//! RSSI reading, in which case it becomes a proximity ring around the
//! ground sensor instead.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use rid_types::{DroneSignature, StatusMessage, UaType};

use crate::cache::SignatureCache;
use crate::cot::CotEvent;
use crate::decoder::{self, DecodeStats, StatusPayload, WireMessage};
use crate::error::{DecodeError, ValidationError};
use crate::extractor;
use crate::matcher::{self, REIDENTIFY_THRESHOLD};
use crate::remarks;
use crate::spoof::{self, ProximityRing, SpoofAssessment};

/// Wall clock as Unix seconds.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

// ── Emitted events ────────────────────────────────────────────────────────────

/// A rotated-identifier correlation: this new id scored close enough to an
/// already-tracked emitter to likely be the same aircraft.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationHint {
    pub candidate_id: String,
    pub strength: f64,
}

#[derive(Debug, Clone)]
pub struct DroneUpdate {
    pub signature: DroneSignature,
    pub spoof: Option<SpoofAssessment>,
    /// Similarity against this id's previous observation, when one exists.
    pub match_strength: Option<f64>,
    pub correlation: Option<CorrelationHint>,
}

/// Canonical updates published to external collaborators.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// First observation of a primary identifier.
    DroneDetected(Box<DroneUpdate>),
    /// Repeat observation of a known identifier.
    DroneUpdated(Box<DroneUpdate>),
    StatusUpdated(StatusMessage),
    /// Emitter heard but not located; range estimated from signal strength.
    ProximityAlert(ProximityRing),
    Connectivity {
        transport: &'static str,
        connected: bool,
    },
}

// ── Engine ────────────────────────────────────────────────────────────────────

pub struct Engine {
    cache: SignatureCache,
    stats: DecodeStats,
    monitor: Option<StatusMessage>,
    rings: HashMap<String, ProximityRing>,
    events: broadcast::Sender<EngineEvent>,
    fallback_ua: UaType,
}

impl Engine {
    pub fn new(events: broadcast::Sender<EngineEvent>, fallback_ua: UaType) -> Self {
        Self {
            cache: SignatureCache::new(),
            stats: DecodeStats::default(),
            monitor: None,
            rings: HashMap::new(),
            events,
            fallback_ua,
        }
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    pub fn cache(&self) -> &SignatureCache {
        &self.cache
    }

    pub fn monitor(&self) -> Option<&StatusMessage> {
        self.monitor.as_ref()
    }

    pub fn ring_for(&self, id: &str) -> Option<&ProximityRing> {
        self.rings.get(id)
    }

    fn emit(&self, event: EngineEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Decode and apply one inbound frame.
    pub fn handle_frame(&mut self, frame: &[u8], now: f64) {
        match decoder::decode(frame) {
            Ok(msg) => {
                self.stats.decoded += 1;
                self.dispatch(msg, now);
            }
            Err(DecodeError::UnknownFormat) => {
                self.stats.dropped_unknown += 1;
                debug!("engine: dropped frame: unrecognized wire format");
            }
            Err(e) => {
                self.stats.dropped_malformed += 1;
                debug!("engine: dropped frame: {e}");
            }
        }
    }

    fn dispatch(&mut self, msg: WireMessage, now: f64) {
        match msg {
            WireMessage::Status(payload) => self.apply_status_payload(&payload),
            WireMessage::Cot(ref ev) if ev.is_status() => self.apply_status_cot(ev),
            drone => self.apply_drone(drone, now),
        }
    }

    fn apply_status_payload(&mut self, payload: &StatusPayload) {
        let status = remarks::status_from_payload(payload);
        self.apply_status(status);
    }

    fn apply_status_cot(&mut self, ev: &CotEvent) {
        let status = remarks::status_from_cot(ev);
        self.apply_status(status);
    }

    fn apply_status(&mut self, status: StatusMessage) {
        debug!(
            "engine: status from {} (cpu {:.1}%, temp {:.1}°C)",
            status.uid, status.system.cpu_usage, status.system.temperature
        );
        self.monitor = Some(status.clone());
        self.emit(EngineEvent::StatusUpdated(status));
    }

    fn apply_drone(&mut self, msg: WireMessage, now: f64) {
        let Some(id) = extractor::primary_id_of(&msg, self.fallback_ua) else {
            self.stats.dropped_validation += 1;
            return;
        };
        let prior_latest: Option<DroneSignature> = self
            .cache
            .lookup(&id)
            .and_then(|e| e.signatures.back().cloned());
        let Some(signature) =
            extractor::build_signature(&msg, self.cache.lookup(&id), now, self.fallback_ua)
        else {
            self.stats.dropped_validation += 1;
            return;
        };

        if signature.position.coordinate.is_zero() {
            return self.apply_unlocated(signature, now);
        }
        // a usable fix clears any standing proximity ring
        self.rings.remove(&id);

        let is_new = self.cache.record_observation(&signature, now);
        let match_strength = prior_latest
            .as_ref()
            .map(|previous| matcher::score(&signature, previous, &mut self.cache));
        let correlation = if is_new {
            self.correlate(&signature)
        } else {
            None
        };
        let spoof = self
            .monitor
            .as_ref()
            .map(|monitor| spoof::assess(&signature, self.cache.lookup(&id), monitor));
        if let Some(assessment) = spoof.as_ref().filter(|a| a.is_spoofed) {
            warn!(
                "engine: spoof suspicion on {id} (confidence {:.2}): {:?}",
                assessment.confidence, assessment.reasons
            );
        }

        let update = Box::new(DroneUpdate {
            signature,
            spoof,
            match_strength,
            correlation,
        });
        if is_new {
            info!("engine: new emitter {id}");
            self.emit(EngineEvent::DroneDetected(update));
        } else {
            self.emit(EngineEvent::DroneUpdated(update));
        }
    }

    /// No usable fix: either redirect to a signal-strength range estimate
    /// or drop the observation outright.
    fn apply_unlocated(&mut self, signature: DroneSignature, now: f64) {
        let id = signature.primary_id.id.clone();
        let Some(rssi) = signature.transmission_info.signal_strength else {
            self.stats.dropped_validation += 1;
            debug!(
                "engine: dropped observation of {id}: {}",
                ValidationError::ZeroCoordinate
            );
            return;
        };

        self.cache.record_observation(&signature, now);
        if let Some(monitor) = self.monitor.as_ref() {
            let ring = ProximityRing::from_rssi(&id, monitor.gps.coordinate(), rssi);
            self.rings.insert(id, ring.clone());
            self.emit(EngineEvent::ProximityAlert(ring));
        } else {
            debug!("engine: {id} heard at {rssi} dBm, no monitor fix for a ring yet");
        }
    }

    /// Scan other tracked emitters for a rotated-identifier match.
    fn correlate(&mut self, signature: &DroneSignature) -> Option<CorrelationHint> {
        let candidates: Vec<(String, DroneSignature)> = self
            .cache
            .iter()
            .filter(|(id, _)| **id != signature.primary_id.id)
            .filter_map(|(id, entry)| {
                entry.signatures.back().cloned().map(|s| (id.clone(), s))
            })
            .collect();

        let mut best: Option<CorrelationHint> = None;
        for (candidate_id, candidate) in candidates {
            let strength = matcher::score(signature, &candidate, &mut self.cache);
            if strength >= REIDENTIFY_THRESHOLD
                && best.as_ref().map_or(true, |b| strength > b.strength)
            {
                best = Some(CorrelationHint {
                    candidate_id,
                    strength,
                });
            }
        }
        if let Some(hint) = best.as_ref() {
            info!(
                "engine: {} correlates with known emitter {} ({:.2})",
                signature.primary_id.id, hint.candidate_id, hint.strength
            );
        }
        best
    }
}

/// Drain decoded frames until shutdown or all senders hang up.
pub async fn run_engine(
    mut frames: mpsc::Receiver<Vec<u8>>,
    mut engine: Engine,
    mut running: watch::Receiver<bool>,
) {
    info!("engine: update loop running");
    loop {
        tokio::select! {
            maybe = frames.recv() => match maybe {
                Some(frame) => engine.handle_frame(&frame, unix_now()),
                None => break,
            },
            _ = running.changed() => {
                if !*running.borrow() {
                    break;
                }
            }
        }
    }
    let stats = engine.stats();
    info!(
        "engine: update loop stopped ({} decoded, {} malformed, {} invalid)",
        stats.decoded, stats.dropped_malformed, stats.dropped_validation
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS_JSON: &[u8] = br#"{
        "serial_number": "wardragon-9",
        "gps_data": {"latitude": 40.700, "longitude": -74.000, "altitude": 15.0, "speed": 0.0},
        "system_stats": {"cpu_usage": 20.0, "memory": {"total": 1048576}, "disk": {"total": 1048576},
                         "temperature": 35.0, "uptime": 50.0}
    }"#;

    fn engine() -> (Engine, broadcast::Receiver<EngineEvent>) {
        let (tx, rx) = broadcast::channel(64);
        (Engine::new(tx, UaType::Other), rx)
    }

    fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn status_updates_monitor_and_emits() {
        let (mut engine, mut rx) = engine();
        engine.handle_frame(STATUS_JSON, 1000.0);
        assert_eq!(engine.monitor().unwrap().uid, "wardragon-9");
        let events = drain(&mut rx);
        assert!(matches!(events.as_slice(), [EngineEvent::StatusUpdated(_)]));
    }

    #[test]
    fn detected_then_updated_discrimination() {
        let (mut engine, mut rx) = engine();
        let raw = br#"{"Basic ID": {"id": "D1"}, "Location/Vector Message": {"latitude": 40.0, "longitude": -74.0}}"#;
        engine.handle_frame(raw, 1000.0);
        engine.handle_frame(raw, 1001.0);
        let events = drain(&mut rx);
        assert!(matches!(events[0], EngineEvent::DroneDetected(_)));
        assert!(matches!(events[1], EngineEvent::DroneUpdated(_)));
        match &events[1] {
            EngineEvent::DroneUpdated(update) => {
                assert!(update.match_strength.is_some());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn zero_coordinate_without_rssi_is_dropped_entirely() {
        let (mut engine, mut rx) = engine();
        let raw = br#"{"Basic ID": {"id": "Z0"}, "Location/Vector Message": {"latitude": 0.0, "longitude": 0.0}}"#;
        engine.handle_frame(raw, 1000.0);
        assert!(engine.cache().lookup("ESP32-Z0").is_none());
        assert!(drain(&mut rx).is_empty());
        assert_eq!(engine.stats().dropped_validation, 1);
    }

    #[test]
    fn zero_coordinate_with_rssi_becomes_a_proximity_ring() {
        let (mut engine, mut rx) = engine();
        engine.handle_frame(STATUS_JSON, 999.0);
        let raw = br#"{"Basic ID": {"id": "Z1"}, "Location/Vector Message": {"latitude": 0.0, "longitude": 0.0, "rssi": -62}}"#;
        engine.handle_frame(raw, 1000.0);

        assert!(engine.cache().lookup("ESP32-Z1").is_some());
        let ring = engine.ring_for("ESP32-Z1").expect("ring");
        assert_eq!(ring.rssi, -62.0);
        assert_eq!(ring.center.lat, 40.700);
        assert!(ring.radius_m >= 10.0 && ring.radius_m <= 1000.0);

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::ProximityAlert(_))));
        assert!(!events
            .iter()
            .any(|e| matches!(e, EngineEvent::DroneDetected(_))));
    }

    #[test]
    fn valid_fix_clears_a_standing_ring() {
        let (mut engine, _rx) = engine();
        engine.handle_frame(STATUS_JSON, 999.0);
        engine.handle_frame(
            br#"{"Basic ID": {"id": "R1"}, "Location/Vector Message": {"latitude": 0.0, "longitude": 0.0, "rssi": -70}}"#,
            1000.0,
        );
        assert!(engine.ring_for("ESP32-R1").is_some());
        engine.handle_frame(
            br#"{"Basic ID": {"id": "R1"}, "Location/Vector Message": {"latitude": 40.701, "longitude": -74.001, "rssi": -70}}"#,
            1001.0,
        );
        assert!(engine.ring_for("ESP32-R1").is_none());
    }

    #[test]
    fn ble_advertisement_is_tracked_by_address() {
        let (mut engine, mut rx) = engine();
        engine.handle_frame(STATUS_JSON, 999.0);
        engine.handle_frame(
            br#"{"AUX_ADV_IND": {"addr": "AA:BB:CC:DD:EE:FF", "chan": 37, "rssi": -55}}"#,
            1000.0,
        );
        let entry = engine.cache().lookup("BT-AA:BB:CC:DD:EE:FF").expect("entry");
        assert_eq!(entry.signatures.len(), 1);
        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::ProximityAlert(_))));
    }

    #[test]
    fn malformed_frames_only_bump_counters() {
        let (mut engine, mut rx) = engine();
        engine.handle_frame(b"!!not a message!!", 1000.0);
        engine.handle_frame(b"<event></broken>", 1000.0);
        assert_eq!(engine.stats().dropped_unknown, 1);
        assert_eq!(engine.stats().dropped_malformed, 1);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn spoof_assessment_rides_along_once_monitor_known() {
        let (mut engine, mut rx) = engine();
        engine.handle_frame(STATUS_JSON, 999.0);
        // several km out, absurdly hot signal
        engine.handle_frame(
            br#"{"Basic ID": {"id": "S1"}, "Location/Vector Message": {"latitude": 40.80, "longitude": -74.00, "rssi": -5}}"#,
            1000.0,
        );
        let events = drain(&mut rx);
        let update = events
            .iter()
            .find_map(|e| match e {
                EngineEvent::DroneDetected(u) => Some(u),
                _ => None,
            })
            .expect("detected event");
        let assessment = update.spoof.as_ref().expect("assessment");
        assert!(assessment.is_spoofed);
    }
}
