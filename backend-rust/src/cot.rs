//! CoT (Cursor on Target) XML event parsing.
//!
//! The parser is an explicit state machine folded over the pull-event
//! stream from `quick_xml`: an element-name stack plus per-leaf character
//! accumulation, keyed by local tag name and immediate parent (this is what
//! disambiguates `lat`/`lon` under `PilotLocation` from the `point`
//! attributes). A `message` leaf is special — its character content is
//! itself a JSON payload, recursively decoded through the ESP32 JSON path;
//! when present that result takes precedence over anything synthesized from
//! point/attribute data downstream.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::decoder::{classify_json, Esp32Payload, WireMessage};
use crate::error::DecodeError;

/// CoT status event type (ground-sensor health reports).
pub const STATUS_EVENT_TYPE: &str = "b-m-p-s-m";

// ── Event model ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CotPoint {
    pub lat: f64,
    pub lon: f64,
    pub hae: f64,
    pub ce: Option<f64>,
    pub le: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct CotDetail {
    pub speed: Option<f64>,
    pub vertical_speed: Option<f64>,
    pub altitude: Option<f64>,
    pub height: Option<f64>,
    pub rssi: Option<f64>,
    pub description: Option<String>,
    pub remarks: Option<String>,
    pub pilot_lat: Option<f64>,
    pub pilot_lon: Option<f64>,
    pub operator_alt_geo: Option<f64>,
    pub ua_type: Option<i64>,
    pub classification: Option<i64>,
    pub op_status: Option<i64>,
    pub height_type: Option<i64>,
    pub time_speed: Option<i64>,
    pub alt_pressure: Option<f64>,
    pub horiz_acc: Option<f64>,
    pub vert_acc: Option<f64>,
    pub baro_acc: Option<f64>,
    pub speed_acc: Option<f64>,
    pub area_count: Option<i64>,
    pub area_radius: Option<f64>,
    pub area_ceiling: Option<f64>,
    pub area_floor: Option<f64>,
    /// Decoded `<message>` JSON payload; takes precedence over the
    /// synthesized point/attribute data.
    pub embedded: Option<Box<Esp32Payload>>,
}

#[derive(Debug, Clone, Default)]
pub struct CotEvent {
    pub uid: String,
    pub event_type: String,
    pub version: Option<String>,
    pub time: Option<String>,
    pub start: Option<String>,
    pub stale: Option<String>,
    pub how: Option<String>,
    pub point: CotPoint,
    pub detail: CotDetail,
}

impl CotEvent {
    pub fn is_status(&self) -> bool {
        self.event_type == STATUS_EVENT_TYPE
    }
}

// ── Parse state ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct ParseState {
    stack: Vec<String>,
    text: String,
    saw_event: bool,
    event: CotEvent,
}

impl ParseState {
    fn on_start(&mut self, tag: &BytesStart<'_>) -> Result<(), DecodeError> {
        let name = String::from_utf8_lossy(tag.local_name().as_ref()).into_owned();
        self.text.clear();

        match name.as_str() {
            "event" => {
                self.saw_event = true;
                for attr in tag.attributes() {
                    let attr = attr.map_err(|e| DecodeError::Xml(e.to_string()))?;
                    let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                    let value = attr
                        .unescape_value()
                        .map_err(|e| DecodeError::Xml(e.to_string()))?
                        .into_owned();
                    match key.as_str() {
                        "uid" => self.event.uid = value,
                        "type" => self.event.event_type = value,
                        "version" => self.event.version = Some(value),
                        "time" => self.event.time = Some(value),
                        "start" => self.event.start = Some(value),
                        "stale" => self.event.stale = Some(value),
                        "how" => self.event.how = Some(value),
                        _ => {}
                    }
                }
            }
            "point" => {
                for attr in tag.attributes() {
                    let attr = attr.map_err(|e| DecodeError::Xml(e.to_string()))?;
                    let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                    let value = attr
                        .unescape_value()
                        .map_err(|e| DecodeError::Xml(e.to_string()))?;
                    let num = value.trim().parse::<f64>().ok();
                    match key.as_str() {
                        "lat" => self.event.point.lat = num.unwrap_or(0.0),
                        "lon" => self.event.point.lon = num.unwrap_or(0.0),
                        "hae" => self.event.point.hae = num.unwrap_or(0.0),
                        "ce" => self.event.point.ce = num,
                        "le" => self.event.point.le = num,
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        self.stack.push(name);
        Ok(())
    }

    fn on_text(&mut self, chunk: &str) {
        self.text.push_str(chunk);
    }

    fn on_end(&mut self) {
        let Some(name) = self.stack.pop() else { return };
        let parent = self.stack.last().map(String::as_str).unwrap_or("");
        let value = self.text.trim().to_string();
        self.text.clear();
        if value.is_empty() {
            return;
        }

        let d = &mut self.event.detail;
        let f = value.parse::<f64>().ok();
        let i = value.parse::<i64>().ok();

        match (name.as_str(), parent) {
            ("message", _) => {
                if let Ok(WireMessage::Esp32(payload)) = classify_json(&value) {
                    d.embedded = Some(Box::new(payload));
                }
            }
            ("remarks", _) => d.remarks = Some(value),
            ("Description", _) => d.description = Some(value),
            ("Speed", _) => d.speed = f,
            ("VerticalSpeed", _) => d.vertical_speed = f,
            ("Altitude", _) => d.altitude = f,
            ("Height", _) => d.height = f,
            ("Rssi", _) => d.rssi = f,
            ("lat", "PilotLocation") => d.pilot_lat = f,
            ("lon", "PilotLocation") => d.pilot_lon = f,
            ("altGeo", "PilotLocation") => d.operator_alt_geo = f,
            ("UAType", _) => d.ua_type = i,
            ("Classification", _) => d.classification = i,
            ("status", _) => d.op_status = i,
            ("heightType", _) => d.height_type = i,
            ("TimeSpeed", _) => d.time_speed = i,
            ("AltPressure", _) => d.alt_pressure = f,
            ("HorizAcc", _) => d.horiz_acc = f,
            ("VertAcc", _) => d.vert_acc = f,
            ("BaroAcc", _) => d.baro_acc = f,
            ("SpeedAcc", _) => d.speed_acc = f,
            ("count", "OperationArea") => d.area_count = i,
            ("radius", "OperationArea") => d.area_radius = f,
            ("ceiling", "OperationArea") => d.area_ceiling = f,
            ("floor", "OperationArea") => d.area_floor = f,
            _ => {}
        }
    }

    fn finish(self) -> Result<CotEvent, DecodeError> {
        if !self.saw_event {
            return Err(DecodeError::Xml("no <event> element".to_string()));
        }
        Ok(self.event)
    }
}

/// Parse one CoT XML document into an event.
pub fn parse_event(xml: &str) -> Result<CotEvent, DecodeError> {
    let mut reader = Reader::from_str(xml);
    let mut state = ParseState::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(tag)) => state.on_start(&tag)?,
            Ok(Event::Empty(tag)) => {
                state.on_start(&tag)?;
                state.on_end();
            }
            Ok(Event::Text(t)) => {
                let chunk = t
                    .unescape()
                    .map_err(|e| DecodeError::Xml(e.to_string()))?;
                state.on_text(&chunk);
            }
            Ok(Event::CData(t)) => {
                state.on_text(&String::from_utf8_lossy(&t));
            }
            Ok(Event::End(_)) => state.on_end(),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(DecodeError::Xml(e.to_string())),
        }
    }

    state.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRONE_XML: &str = r#"<event version="2.0" uid="drone-DRONE123" type="a-f-G-U-S-O-F" time="2025-01-01T00:00:00Z" start="2025-01-01T00:00:00Z" stale="2025-01-01T00:05:00Z" how="m-g">
        <point lat="40.7128" lon="-74.0060" hae="120.5" ce="9999999" le="9999999"/>
        <detail>
            <contact callsign="drone-DRONE123"/>
            <Speed>12.5</Speed>
            <VerticalSpeed>-1.2</VerticalSpeed>
            <Altitude>120.5</Altitude>
            <Height>85.0</Height>
            <Description>test flight</Description>
            <DroneMetadata>
                <PilotLocation>
                    <lat>40.7000</lat>
                    <lon>-74.0000</lon>
                </PilotLocation>
            </DroneMetadata>
        </detail>
    </event>"#;

    #[test]
    fn parses_drone_event_attributes_and_point() {
        let ev = parse_event(DRONE_XML).unwrap();
        assert_eq!(ev.uid, "drone-DRONE123");
        assert_eq!(ev.event_type, "a-f-G-U-S-O-F");
        assert_eq!(ev.point.lat, 40.7128);
        assert_eq!(ev.point.lon, -74.0060);
        assert_eq!(ev.point.hae, 120.5);
        assert!(!ev.is_status());
    }

    #[test]
    fn leaf_values_keyed_by_parent() {
        let ev = parse_event(DRONE_XML).unwrap();
        assert_eq!(ev.detail.speed, Some(12.5));
        assert_eq!(ev.detail.vertical_speed, Some(-1.2));
        assert_eq!(ev.detail.height, Some(85.0));
        assert_eq!(ev.detail.description.as_deref(), Some("test flight"));
        // PilotLocation lat/lon must not collide with point attributes
        assert_eq!(ev.detail.pilot_lat, Some(40.7000));
        assert_eq!(ev.detail.pilot_lon, Some(-74.0000));
    }

    #[test]
    fn embedded_message_json_takes_precedence() {
        let xml = r#"<event uid="x" type="a-f-G-U">
            <point lat="1.0" lon="2.0" hae="0.0"/>
            <detail>
                <message>{"Basic ID": {"id": "SN777", "ua_type": 2}, "Location/Vector Message": {"latitude": 39.1, "longitude": -76.2}}</message>
            </detail>
        </event>"#;
        let ev = parse_event(xml).unwrap();
        let embedded = ev.detail.embedded.expect("embedded payload");
        assert_eq!(embedded.basic_id.unwrap().id.as_deref(), Some("SN777"));
        assert_eq!(embedded.location.unwrap().latitude, Some(39.1));
    }

    #[test]
    fn status_event_routes_remarks() {
        let xml = r#"<event version="2.0" uid="wardragon-7" type="b-m-p-s-m">
            <point lat="41.0" lon="-74.5" hae="12.0" ce="9999999" le="9999999"/>
            <detail>
                <status readiness="true"/>
                <remarks>CPU Usage: 12.3%, Memory Total: 512.0 MB</remarks>
            </detail>
        </event>"#;
        let ev = parse_event(xml).unwrap();
        assert!(ev.is_status());
        assert!(ev.detail.remarks.unwrap().starts_with("CPU Usage:"));
    }

    #[test]
    fn malformed_xml_is_a_decode_error() {
        // mismatched end tag
        assert!(parse_event("<event></broken>").is_err());
        // no <event> element at all
        assert!(parse_event("<detail/>").is_err());
    }
}
