//! Status remarks decoding.
//!
//! Ground-sensor status events carry their system telemetry as one
//! comma-separated human-readable string inside `<remarks>`:
//!
//! ```text
//! CPU Usage: 12.3%, Memory Total: 512.0 MB, ..., Uptime: 900.0 seconds
//! ```
//!
//! Each segment is matched against a fixed prefix list; the unit suffix is
//! stripped and the remainder parsed as f64 (0.0 on failure). Unrecognized
//! segments are ignored without error, so producers may extend the string.

use rid_types::{DiskStats, GpsData, MemoryStats, StatusMessage, SystemStats};

use crate::cot::CotEvent;

const MB: f64 = 1024.0 * 1024.0;

/// Flat telemetry decoded from a remarks string. Memory/disk figures are in
/// MB as transmitted; [`StatusTelemetry::into_status`] restores bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatusTelemetry {
    pub cpu_usage: f64,
    pub memory_total: f64,
    pub memory_available: f64,
    pub memory_used: f64,
    pub memory_free: f64,
    pub memory_active: f64,
    pub memory_inactive: f64,
    pub memory_buffers: f64,
    pub memory_shared: f64,
    pub memory_cached: f64,
    pub memory_slab: f64,
    pub memory_percent: f64,
    pub disk_total: f64,
    pub disk_used: f64,
    pub disk_free: f64,
    pub disk_percent: f64,
    pub temperature: f64,
    pub uptime: f64,
}

fn parse_metric(segment: &str, prefix: &str) -> Option<f64> {
    let rest = segment.strip_prefix(prefix)?;
    let rest = rest
        .trim()
        .trim_end_matches(" seconds")
        .trim_end_matches(" percent")
        .trim_end_matches(" MB")
        .trim_end_matches("°C")
        .trim_end_matches('%')
        .trim();
    Some(rest.parse::<f64>().unwrap_or(0.0))
}

/// Decode a remarks string into structured telemetry.
pub fn parse_remarks(remarks: &str) -> StatusTelemetry {
    let mut t = StatusTelemetry::default();

    for segment in remarks.split(',') {
        let segment = segment.trim();
        if let Some(v) = parse_metric(segment, "CPU Usage:") {
            t.cpu_usage = v;
        } else if let Some(v) = parse_metric(segment, "Memory Total:") {
            t.memory_total = v;
        } else if let Some(v) = parse_metric(segment, "Memory Available:") {
            t.memory_available = v;
        } else if let Some(v) = parse_metric(segment, "Memory Used:") {
            t.memory_used = v;
        } else if let Some(v) = parse_metric(segment, "Memory Free:") {
            t.memory_free = v;
        } else if let Some(v) = parse_metric(segment, "Memory Active:") {
            t.memory_active = v;
        } else if let Some(v) = parse_metric(segment, "Memory Inactive:") {
            t.memory_inactive = v;
        } else if let Some(v) = parse_metric(segment, "Memory Buffers:") {
            t.memory_buffers = v;
        } else if let Some(v) = parse_metric(segment, "Memory Shared:") {
            t.memory_shared = v;
        } else if let Some(v) = parse_metric(segment, "Memory Cached:") {
            t.memory_cached = v;
        } else if let Some(v) = parse_metric(segment, "Memory Slab:") {
            t.memory_slab = v;
        } else if let Some(v) = parse_metric(segment, "Memory Percent:") {
            t.memory_percent = v;
        } else if let Some(v) = parse_metric(segment, "Disk Total:") {
            t.disk_total = v;
        } else if let Some(v) = parse_metric(segment, "Disk Used:") {
            t.disk_used = v;
        } else if let Some(v) = parse_metric(segment, "Disk Free:") {
            t.disk_free = v;
        } else if let Some(v) = parse_metric(segment, "Disk Percent:") {
            t.disk_percent = v;
        } else if let Some(v) = parse_metric(segment, "Temperature:") {
            t.temperature = v;
        } else if let Some(v) = parse_metric(segment, "Uptime:") {
            t.uptime = v;
        }
        // anything else: ignored, producers may append new metrics
    }

    t
}

impl StatusTelemetry {
    /// Rebuild the canonical status model from decoded telemetry plus the
    /// event's identity and GPS point.
    pub fn into_status(self, uid: &str, lat: f64, lon: f64, altitude: f64) -> StatusMessage {
        StatusMessage {
            uid: uid.to_string(),
            serial_number: uid.to_string(),
            timestamp: self.uptime,
            gps: GpsData {
                latitude: lat,
                longitude: lon,
                altitude,
                speed: 0.0,
            },
            system: SystemStats {
                cpu_usage: self.cpu_usage,
                memory: MemoryStats {
                    total: (self.memory_total * MB) as i64,
                    available: (self.memory_available * MB) as i64,
                    percent: self.memory_percent,
                    used: (self.memory_used * MB) as i64,
                    free: (self.memory_free * MB) as i64,
                    active: (self.memory_active * MB) as i64,
                    inactive: (self.memory_inactive * MB) as i64,
                    buffers: (self.memory_buffers * MB) as i64,
                    cached: (self.memory_cached * MB) as i64,
                    shared: (self.memory_shared * MB) as i64,
                    slab: (self.memory_slab * MB) as i64,
                },
                disk: DiskStats {
                    total: (self.disk_total * MB) as i64,
                    used: (self.disk_used * MB) as i64,
                    free: (self.disk_free * MB) as i64,
                    percent: self.disk_percent,
                },
                temperature: self.temperature,
                uptime: self.uptime,
            },
        }
    }
}

/// Build the canonical status model straight from a decoded status JSON
/// payload (the UDP path; the pub/sub path arrives as CoT XML instead).
pub fn status_from_payload(p: &crate::decoder::StatusPayload) -> StatusMessage {
    let serial = p.serial_number.clone().unwrap_or_default();
    let stats = &p.system_stats;
    StatusMessage {
        uid: serial.clone(),
        serial_number: serial,
        timestamp: stats.uptime.unwrap_or(0.0),
        gps: GpsData {
            latitude: p.gps_data.latitude.unwrap_or(0.0),
            longitude: p.gps_data.longitude.unwrap_or(0.0),
            altitude: p.gps_data.altitude.unwrap_or(0.0),
            speed: p.gps_data.speed.unwrap_or(0.0),
        },
        system: SystemStats {
            cpu_usage: stats.cpu_usage.unwrap_or(0.0),
            memory: MemoryStats {
                total: stats.memory.total.unwrap_or(0),
                available: stats.memory.available.unwrap_or(0),
                percent: stats.memory.percent.unwrap_or(0.0),
                used: stats.memory.used.unwrap_or(0),
                free: stats.memory.free.unwrap_or(0),
                active: stats.memory.active.unwrap_or(0),
                inactive: stats.memory.inactive.unwrap_or(0),
                buffers: stats.memory.buffers.unwrap_or(0),
                cached: stats.memory.cached.unwrap_or(0),
                shared: stats.memory.shared.unwrap_or(0),
                slab: stats.memory.slab.unwrap_or(0),
            },
            disk: DiskStats {
                total: stats.disk.total.unwrap_or(0),
                used: stats.disk.used.unwrap_or(0),
                free: stats.disk.free.unwrap_or(0),
                percent: stats.disk.percent.unwrap_or(0.0),
            },
            temperature: stats.temperature.unwrap_or(0.0),
            uptime: stats.uptime.unwrap_or(0.0),
        },
    }
}

/// Decode a parsed status CoT event into the canonical status model.
pub fn status_from_cot(ev: &CotEvent) -> StatusMessage {
    let telemetry = ev
        .detail
        .remarks
        .as_deref()
        .map(parse_remarks)
        .unwrap_or_default();
    telemetry.into_status(&ev.uid, ev.point.lat, ev.point.lon, ev.point.hae)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_prefixes_and_ignores_the_rest() {
        let t = parse_remarks(
            "CPU Usage: 12.3%, Memory Total: 512.0 MB, Temperature: 41.0°C, \
             Uptime: 900 seconds, Flux Capacitance: 88 GW",
        );
        assert_eq!(t.cpu_usage, 12.3);
        assert_eq!(t.memory_total, 512.0);
        assert_eq!(t.temperature, 41.0);
        assert_eq!(t.uptime, 900.0);
        assert_eq!(t.memory_available, 0.0);
    }

    #[test]
    fn full_remarks_string_round_trips_all_fields() {
        let t = parse_remarks(
            "CPU Usage: 55.5%, Memory Total: 2048.0 MB, Memory Available: 1024.0 MB, \
             Memory Used: 768.0 MB, Memory Free: 256.0 MB, Memory Active: 512.0 MB, \
             Memory Inactive: 128.0 MB, Memory Buffers: 64.0 MB, Memory Shared: 32.0 MB, \
             Memory Cached: 96.0 MB, Memory Slab: 16.0 MB, Memory Percent: 50.0%, \
             Disk Total: 8192.0 MB, Disk Used: 4096.0 MB, Disk Free: 4096.0 MB, \
             Disk Percent: 50.0%, Temperature: 39.5°C, Uptime: 3600.0 seconds",
        );
        assert_eq!(t.memory_used, 768.0);
        assert_eq!(t.memory_slab, 16.0);
        assert_eq!(t.memory_percent, 50.0);
        assert_eq!(t.disk_free, 4096.0);
        assert_eq!(t.disk_percent, 50.0);
        assert_eq!(t.uptime, 3600.0);
    }

    #[test]
    fn unparsable_numbers_default_to_zero() {
        let t = parse_remarks("CPU Usage: banana%, Uptime: 10 seconds");
        assert_eq!(t.cpu_usage, 0.0);
        assert_eq!(t.uptime, 10.0);
    }

    #[test]
    fn status_model_restores_bytes_from_mb() {
        let t = parse_remarks("Memory Total: 512.0 MB, Disk Total: 1024.0 MB");
        let status = t.into_status("wardragon-1", 41.0, -74.0, 10.0);
        assert_eq!(status.system.memory.total, 512 * 1024 * 1024);
        assert_eq!(status.system.disk.total, 1024 * 1024 * 1024);
        assert_eq!(status.gps.latitude, 41.0);
        assert_eq!(status.uid, "wardragon-1");
    }
}
