//! Weighted multi-factor signature similarity.
//!
//! `score` estimates how likely two signatures describe the same physical
//! emitter. It is what re-identifies a drone after its broadcast
//! identifier rotates, and it feeds spoof suspicion. Up to four
//! independently-optional sub-scores combine:
//!
//! - position + movement (0.4) — gated on both sides holding a real fix
//! - height pattern (0.3) — gated on cached height history for both ids
//! - broadcast/signal characteristics (0.3) — always available
//! - operator location — blended in as `base * 0.8 + op * 0.2`
//!
//! Confidence is computed separately from which facets contributed, via a
//! fixed weight table. Every call appends a match record to the *current*
//! signature's cache entry.

use std::collections::BTreeSet;

use rid_types::{clamp_unit, DroneSignature, MatchField, SignatureMatch};

use crate::cache::SignatureCache;

// Field thresholds: the delta at which a facet score reaches zero.
const HORIZONTAL_POSITION_M: f64 = 10.0;
const VERTICAL_POSITION_M: f64 = 5.0;
const SPEED_DELTA_MS: f64 = 2.0;
const HEADING_DELTA_DEG: f64 = 15.0;
const OPERATOR_DISTANCE_M: f64 = 50.0;
const SIGNAL_STRENGTH_DELTA_DB: f64 = 10.0;
const MESSAGE_INTERVAL_DELTA_S: f64 = 0.5;
/// First differences within this band count as "flat" for trend agreement.
const TREND_FLAT_EPS: f64 = 0.1;

/// Score above which a rotated identifier is treated as the same emitter.
pub const REIDENTIFY_THRESHOLD: f64 = 0.7;

fn linear_score(delta: f64, full_scale: f64) -> f64 {
    (1.0 - delta / full_scale).max(0.0)
}

/// Circular heading difference in [0, 180].
fn heading_delta(a: f64, b: f64) -> f64 {
    let delta = (a - b).abs() % 360.0;
    delta.min(360.0 - delta)
}

fn position_movement_score(current: &DroneSignature, candidate: &DroneSignature) -> Option<f64> {
    if current.position.coordinate.is_zero() || candidate.position.coordinate.is_zero() {
        return None;
    }
    let distance = current
        .position
        .coordinate
        .distance_m(&candidate.position.coordinate);
    let position = linear_score(distance, HORIZONTAL_POSITION_M);
    let speed = linear_score(
        (current.movement.ground_speed - candidate.movement.ground_speed).abs(),
        SPEED_DELTA_MS,
    );
    let vspeed = linear_score(
        (current.movement.vertical_speed - candidate.movement.vertical_speed).abs(),
        SPEED_DELTA_MS,
    );
    let heading = linear_score(
        heading_delta(current.movement.heading, candidate.movement.heading),
        HEADING_DELTA_DEG,
    );
    Some((position + speed + vspeed + heading) / 4.0)
}

/// Trend agreement between two height profiles: compare the sign of each
/// pair of consecutive first-differences; both rising, both falling, or
/// both flat counts as agreement.
fn height_trend_score(profile1: &[f64], profile2: &[f64]) -> f64 {
    let trends1: Vec<f64> = profile1.windows(2).map(|w| w[1] - w[0]).collect();
    let trends2: Vec<f64> = profile2.windows(2).map(|w| w[1] - w[0]).collect();
    let pairs: Vec<(f64, f64)> = trends1.iter().copied().zip(trends2.iter().copied()).collect();
    if pairs.is_empty() {
        return 0.0;
    }
    let agreements = pairs
        .iter()
        .filter(|(t1, t2)| {
            (*t1 > 0.0 && *t2 > 0.0)
                || (*t1 < 0.0 && *t2 < 0.0)
                || (t1.abs() < TREND_FLAT_EPS && t2.abs() < TREND_FLAT_EPS)
        })
        .count();
    agreements as f64 / pairs.len() as f64
}

fn height_pattern_score(
    current: &DroneSignature,
    candidate: &DroneSignature,
    cache: &SignatureCache,
) -> Option<f64> {
    let profile1: Vec<f64> = cache
        .lookup(&current.primary_id.id)?
        .height_profile
        .iter()
        .copied()
        .collect();
    let profile2: Vec<f64> = cache
        .lookup(&candidate.primary_id.id)?
        .height_profile
        .iter()
        .copied()
        .collect();
    if profile1.is_empty() || profile2.is_empty() {
        return None;
    }

    let height = linear_score(
        (current.height_info.height_above_ground - candidate.height_info.height_above_ground)
            .abs(),
        VERTICAL_POSITION_M,
    );
    let consistency = linear_score(
        (current.height_info.consistency_score - candidate.height_info.consistency_score).abs(),
        1.0,
    );

    if profile1.len() >= 3 && profile2.len() >= 3 {
        let trend = height_trend_score(&profile1, &profile2);
        Some((height + consistency + trend) / 3.0)
    } else {
        Some((height + consistency) / 2.0)
    }
}

fn broadcast_score(current: &DroneSignature, candidate: &DroneSignature) -> f64 {
    let type_score = if current.transmission_info.transmission_type
        == candidate.transmission_info.transmission_type
    {
        1.0
    } else {
        0.0
    };

    let signal_score = match (
        current.transmission_info.signal_strength,
        candidate.transmission_info.signal_strength,
    ) {
        (Some(s1), Some(s2)) => linear_score((s1 - s2).abs(), SIGNAL_STRENGTH_DELTA_DB),
        _ => 1.0,
    };

    let pattern_score = message_pattern_score(current, candidate);

    let interval_score = match (current.message_interval, candidate.message_interval) {
        (Some(i1), Some(i2)) => linear_score((i1 - i2).abs(), MESSAGE_INTERVAL_DELTA_S),
        _ => 0.0,
    };

    (type_score + signal_score + pattern_score + interval_score) / 4.0
}

fn message_pattern_score(current: &DroneSignature, candidate: &DroneSignature) -> f64 {
    let seq1 = &current.broadcast_pattern.message_sequence;
    let seq2 = &candidate.broadcast_pattern.message_sequence;

    let sequence_score = if seq1.is_empty() || seq2.is_empty() {
        0.0
    } else {
        let set1: BTreeSet<_> = seq1.iter().collect();
        let set2: BTreeSet<_> = seq2.iter().collect();
        let common = set1.intersection(&set2).count();
        common as f64 / seq1.len().max(seq2.len()) as f64
    };

    let consistency_score = linear_score(
        (current.broadcast_pattern.consistency - candidate.broadcast_pattern.consistency).abs(),
        1.0,
    );

    (sequence_score + consistency_score) / 2.0
}

fn operator_location_score(current: &DroneSignature, candidate: &DroneSignature) -> Option<f64> {
    let op1 = current.position.operator_location?;
    let op2 = candidate.position.operator_location?;
    Some(linear_score(op1.distance_m(&op2), OPERATOR_DISTANCE_M))
}

/// Fixed confidence weights per contributing facet, summing to 1.0.
fn confidence_for(fields: &BTreeSet<MatchField>) -> f64 {
    fields
        .iter()
        .map(|f| match f {
            MatchField::PrimaryId => 0.3,
            MatchField::OperatorLocation => 0.15,
            MatchField::Position => 0.15,
            MatchField::Movement => 0.15,
            MatchField::HeightPattern => 0.1,
            MatchField::BroadcastPattern => 0.1,
            MatchField::SignalCharacteristics => 0.05,
        })
        .sum()
}

fn mac_of(signature: &DroneSignature) -> Option<&str> {
    signature
        .transmission_info
        .mac_address
        .as_deref()
        .filter(|m| !m.is_empty())
}

/// Score the similarity of two signatures, appending the outcome to the
/// current signature's match history.
pub fn score(
    current: &DroneSignature,
    candidate: &DroneSignature,
    cache: &mut SignatureCache,
) -> f64 {
    let mut matched = BTreeSet::new();

    // Equal hardware addresses settle it outright.
    let strength = match (mac_of(current), mac_of(candidate)) {
        (Some(m1), Some(m2)) if m1 == m2 => {
            matched.insert(MatchField::PrimaryId);
            1.0
        }
        _ => {
            let mut total = 0.0;
            if let Some(s) = position_movement_score(current, candidate) {
                total += s * 0.4;
                matched.insert(MatchField::Position);
                matched.insert(MatchField::Movement);
            }
            if let Some(s) = height_pattern_score(current, candidate, cache) {
                total += s * 0.3;
                matched.insert(MatchField::HeightPattern);
            }
            let broadcast = broadcast_score(current, candidate);
            total += broadcast * 0.3;
            matched.insert(MatchField::BroadcastPattern);
            matched.insert(MatchField::SignalCharacteristics);

            if let Some(op) = operator_location_score(current, candidate) {
                total = total * 0.8 + op * 0.2;
                matched.insert(MatchField::OperatorLocation);
            }
            total
        }
    };

    let record = SignatureMatch {
        timestamp: current.timestamp,
        match_strength: clamp_unit(strength),
        confidence: confidence_for(&matched),
        matched_fields: matched,
    };
    cache.append_match(&current.primary_id.id, record);

    strength
}
