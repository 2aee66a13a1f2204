//! generator.rs — synthetic Remote-ID payloads
//!
//! Renders every wire shape the engine ingests: CoT XML drone events,
//! ESP32/BLE/WiFi JSON, and ground-sensor status JSON. Tracks advance with
//! light Gaussian jitter so matcher and consistency scores see realistic
//! cadence; `--spoof` makes a track teleport to exercise the spoof
//! detector.

use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Cot,
    Esp32,
    Ble,
    Wifi,
}

/// One simulated emitter flying a jittered straight track.
pub struct DroneTrack {
    pub serial: String,
    pub mac: String,
    pub lat: f64,
    pub lon: f64,
    pub speed_mps: f64,
    pub heading_deg: f64,
    pub height_agl: f64,
    pub rssi_dbm: f64,
    /// Teleports each tick instead of flying — spoof-detector bait.
    pub spoofed: bool,
}

impl DroneTrack {
    pub fn random(index: usize, spoofed: bool) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            serial: format!("1581F5FKD23C{:03}Q", index),
            mac: format!(
                "AA:BB:CC:{:02X}:{:02X}:{:02X}",
                rng.gen::<u8>(),
                rng.gen::<u8>(),
                index as u8
            ),
            lat: rng.gen_range(25.0..49.0),
            lon: rng.gen_range(-125.0..-67.0),
            speed_mps: rng.gen_range(2.0..28.0),
            heading_deg: rng.gen_range(0.0..360.0),
            height_agl: rng.gen_range(20.0..200.0),
            rssi_dbm: rng.gen_range(-85.0..-40.0),
            spoofed,
        }
    }

    /// Advance the track by dt seconds.
    pub fn tick(&mut self, dt: f64) {
        let mut rng = rand::thread_rng();
        if self.spoofed {
            // physically impossible jump, roughly a degree per tick
            self.lat += rng.gen_range(-1.0..1.0);
            self.lon += rng.gen_range(-1.0..1.0);
            return;
        }
        let jitter = Normal::new(0.0, 0.3).unwrap();
        let heading_rad = self.heading_deg.to_radians();
        let meters = self.speed_mps * dt;
        self.lat += (meters * heading_rad.cos()) / 111_320.0;
        self.lon += (meters * heading_rad.sin())
            / (111_320.0 * self.lat.to_radians().cos().max(0.01));
        self.heading_deg = (self.heading_deg + jitter.sample(&mut rng)).rem_euclid(360.0);
        self.height_agl = (self.height_agl + jitter.sample(&mut rng)).max(0.0);
        self.rssi_dbm += jitter.sample(&mut rng);
    }

    fn vert_speed(&self) -> f64 {
        if self.spoofed {
            0.0
        } else {
            rand::thread_rng().gen_range(-2.0..2.0)
        }
    }

    pub fn render(&self, format: Format) -> String {
        match format {
            Format::Cot => self.cot_xml(),
            Format::Esp32 => self.esp32_json(),
            Format::Ble => self.ble_json(),
            Format::Wifi => self.wifi_json(),
        }
    }

    fn cot_xml(&self) -> String {
        let now = Utc::now();
        let time = now.format("%Y-%m-%dT%H:%M:%SZ");
        let stale = (now + ChronoDuration::seconds(300)).format("%Y-%m-%dT%H:%M:%SZ");
        format!(
            r#"<event version="2.0" uid="drone-{serial}" type="a-f-G-U-S-F" time="{time}" start="{time}" stale="{stale}" how="m-g"><point lat="{lat}" lon="{lon}" hae="{alt}" ce="9999999" le="9999999"/><detail><contact callsign="drone-{serial}"/><Speed>{speed}</Speed><VerticalSpeed>{vspeed}</VerticalSpeed><Altitude>{alt}</Altitude><Height>{height}</Height><Rssi>{rssi}</Rssi><Description>sim track {serial}</Description><DroneMetadata><PilotLocation><lat>{plat}</lat><lon>{plon}</lon></PilotLocation></DroneMetadata></detail></event>"#,
            serial = self.serial,
            lat = self.lat,
            lon = self.lon,
            alt = self.height_agl + 40.0,
            speed = self.speed_mps,
            vspeed = self.vert_speed(),
            height = self.height_agl,
            rssi = self.rssi_dbm,
            plat = self.lat + 0.001,
            plon = self.lon - 0.001,
        )
    }

    fn location_block(&self) -> serde_json::Value {
        json!({
            "latitude": self.lat,
            "longitude": self.lon,
            "speed": self.speed_mps,
            "vert_speed": self.vert_speed(),
            "geodetic_altitude": self.height_agl + 40.0,
            "height_agl": self.height_agl,
            "heading": self.heading_deg,
            "rssi": self.rssi_dbm,
        })
    }

    fn esp32_json(&self) -> String {
        json!({
            "Basic ID": {
                "id": self.serial,
                "id_type": "Serial Number (ANSI/CTA-2063-A)",
                "ua_type": 2,
                "MAC": self.mac,
            },
            "Location/Vector Message": self.location_block(),
            "Self-ID Message": { "text": format!("sim track {}", self.serial) },
            "System Message": {
                "latitude": self.lat + 0.001,
                "longitude": self.lon - 0.001,
            },
        })
        .to_string()
    }

    fn ble_json(&self) -> String {
        let mut rng = rand::thread_rng();
        json!({
            "AUX_ADV_IND": {
                "addr": self.mac,
                "chan": ([37, 38, 39][rng.gen_range(0..3)]),
                "rssi": self.rssi_dbm,
            },
            "aext": {
                "AdvMode": "Non-connectable",
                "AdvA": format!("{} (random)", self.mac),
                "AdvDataInfo": { "did": rng.gen_range(0..4096), "sid": rng.gen_range(0..16) },
            },
        })
        .to_string()
    }

    fn wifi_json(&self) -> String {
        json!({
            "DroneID": {
                &self.mac: {
                    "Basic ID": { "id": self.serial, "ua_type": 2, "MAC": self.mac },
                    "Location/Vector Message": self.location_block(),
                }
            }
        })
        .to_string()
    }
}

/// Ground-sensor status frame (the monitor's own GPS fix + host stats).
pub fn status_json(serial: &str, lat: f64, lon: f64, uptime: f64) -> String {
    let mut rng = rand::thread_rng();
    json!({
        "serial_number": serial,
        "gps_data": {
            "latitude": lat,
            "longitude": lon,
            "altitude": 15.0,
            "speed": 0.0,
        },
        "system_stats": {
            "cpu_usage": rng.gen_range(5.0..60.0),
            "memory": {
                "total": 2_147_483_648_i64,
                "available": 1_073_741_824_i64,
                "percent": 50.0,
                "used": 1_073_741_824_i64,
                "free": 536_870_912_i64,
                "active": 268_435_456_i64,
                "inactive": 134_217_728_i64,
                "buffers": 67_108_864_i64,
                "cached": 33_554_432_i64,
                "shared": 16_777_216_i64,
                "slab": 8_388_608_i64,
            },
            "disk": {
                "total": 34_359_738_368_i64,
                "used": 17_179_869_184_i64,
                "free": 17_179_869_184_i64,
                "percent": 50.0,
            },
            "temperature": rng.gen_range(30.0..55.0),
            "uptime": uptime,
        },
    })
    .to_string()
}
