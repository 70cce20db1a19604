//! Messages exchanged with recording clients over the event socket.
//!
//! Every frame is a JSON object `{"event": "<name>", "data": {...}}`.
//! Messages without a payload omit `data`.

use crate::model::{AxisReading, Event, Location, Session, Sport, Timestamp};
use crate::session::{PlacementSpec, Sample, SessionStart};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Frames sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundMessage {
    StartSession(StartSessionData),
    RegisterPlacement(RegisterPlacementData),
    ReadingEntry(ReadingEntryData),
    EndSession(EndSessionData),
    RequestData(RequestData),
    /// Any payload is accepted and ignored; `data` may be omitted.
    Heartbeat(Option<serde_json::Value>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartSessionData {
    pub id: Uuid,
    pub athlete: Uuid,
    pub sport: Sport,
    pub start: Timestamp,
    #[serde(default)]
    pub placements: Vec<PlacementSpec>,
}

impl From<StartSessionData> for SessionStart {
    fn from(data: StartSessionData) -> Self {
        SessionStart {
            id: data.id,
            athlete: data.athlete,
            sport: data.sport,
            start: data.start,
            placements: data.placements,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterPlacementData {
    pub session: Uuid,
    pub sensor: String,
    pub location: Location,
}

/// A 3-axis value on the wire. Units default per sensor when omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisEntry {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

impl AxisEntry {
    fn into_axis(self, default_units: &str) -> AxisReading {
        let units = self.units.unwrap_or_else(|| default_units.to_string());
        AxisReading::new(self.x, self.y, self.z, units)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingEntryData {
    pub session: Uuid,
    pub sensor: String,
    pub time: Timestamp,
    pub accelerometer: AxisEntry,
    pub gyroscope: AxisEntry,
    pub magnetometer: AxisEntry,
}

impl ReadingEntryData {
    pub fn into_sample(self) -> Sample {
        Sample {
            timestamp: self.time,
            accelerometer: self.accelerometer.into_axis(AxisReading::ACCELEROMETER_UNITS),
            gyroscope: self.gyroscope.into_axis(AxisReading::GYROSCOPE_UNITS),
            magnetometer: self.magnetometer.into_axis(AxisReading::MAGNETOMETER_UNITS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndSessionData {
    pub id: Uuid,
    pub end: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestData {
    pub athlete_ids: Vec<Uuid>,
}

/// Frames sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    EventFound(EventFoundData),
    NoEventFound(WindowData),
    EventData(Event),
    RequestResponse(RequestResponseData),
    Heartbeat(HeartbeatData),
    Shutdown,
}

impl OutboundMessage {
    pub fn heartbeat() -> Self {
        OutboundMessage::Heartbeat(HeartbeatData {
            heartbeat: "1".to_string(),
        })
    }

    /// Serialize to a text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFoundData {
    pub event_id: Uuid,
    pub session: Uuid,
    pub athlete: Uuid,
    pub event_detector: String,
    pub start: Timestamp,
    pub end: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowData {
    pub start: Timestamp,
    pub end: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestResponseData {
    pub sessions: Vec<Session>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatData {
    pub heartbeat: String,
}
