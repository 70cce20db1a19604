//! Value records for sessions, sensor placements, readings and events.
//!
//! Records reference each other by id (foreign-key style). A session owns its
//! placements and events by value; nothing points back up the tree.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Timestamps are integer milliseconds as delivered by the recording app.
pub type Timestamp = i64;

/// Number of scalar values in one reading (3 sensors x 3 axes).
pub const VALUES_PER_READING: usize = 9;

/// Sport being recorded in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sport {
    Skating,
    Volleyball,
    Swimming,
}

/// Where a sensor is worn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    LeftWrist,
    RightWrist,
    SmallOfBack,
    LeftFoot,
    RightFoot,
    Waist,
}

/// Jump labels produced by the type classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JumpType {
    Axel,
    Salchow,
    ToeLoop,
    Loop,
    Flip,
    Lutz,
    #[default]
    Unknown,
}

impl fmt::Display for JumpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JumpType::Axel => "axel",
            JumpType::Salchow => "salchow",
            JumpType::ToeLoop => "toe_loop",
            JumpType::Loop => "loop",
            JumpType::Flip => "flip",
            JumpType::Lutz => "lutz",
            JumpType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl FromStr for JumpType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "axel" => Ok(JumpType::Axel),
            "salchow" => Ok(JumpType::Salchow),
            "toe_loop" => Ok(JumpType::ToeLoop),
            "loop" => Ok(JumpType::Loop),
            "flip" => Ok(JumpType::Flip),
            "lutz" => Ok(JumpType::Lutz),
            "unknown" => Ok(JumpType::Unknown),
            other => Err(format!("unknown jump type: {other}")),
        }
    }
}

/// Label attached to a recorded event.
///
/// `Detected` means only the event-detection stage ran; a type-stage result
/// refines it to a jump. Every label is a flat string on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum EventType {
    Detected,
    Jump(JumpType),
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "detected" => Ok(EventType::Detected),
            other => other.parse().map(EventType::Jump),
        }
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.to_string()
    }
}

impl TryFrom<String> for EventType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Detected => f.write_str("detected"),
            EventType::Jump(jump) => write!(f, "{jump}"),
        }
    }
}

/// One 3-axis sub-reading with its unit label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisReading {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub units: String,
}

impl AxisReading {
    pub const ACCELEROMETER_UNITS: &'static str = "m/s^2";
    pub const GYROSCOPE_UNITS: &'static str = "deg/sec";
    pub const MAGNETOMETER_UNITS: &'static str = "microtesla";

    pub fn new(x: f64, y: f64, z: f64, units: impl Into<String>) -> Self {
        Self {
            x,
            y,
            z,
            units: units.into(),
        }
    }

    pub fn values(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// A timestamped accelerometer/gyroscope/magnetometer triple from one placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: Uuid,
    /// Owning placement id
    pub placement: Uuid,
    pub timestamp: Timestamp,
    pub accelerometer: AxisReading,
    pub gyroscope: AxisReading,
    pub magnetometer: AxisReading,
}

impl Reading {
    /// The reading's scalars in `[ax, ay, az, gx, gy, gz, mx, my, mz]` order.
    pub fn values(&self) -> [f64; VALUES_PER_READING] {
        let [ax, ay, az] = self.accelerometer.values();
        let [gx, gy, gz] = self.gyroscope.values();
        let [mx, my, mz] = self.magnetometer.values();
        [ax, ay, az, gx, gy, gz, mx, my, mz]
    }
}

/// One physical sensor worn during a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorPlacement {
    pub id: Uuid,
    /// Serial/sensor identifier, unique within the session
    pub sensor: String,
    /// Owning session id
    pub session: Uuid,
    pub location: Location,
    pub readings: Vec<Reading>,
}

/// Which classifiers produced an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub event_detector: String,
    pub type_classifier: Option<String>,
}

/// A detected occurrence within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    /// Owning session id
    pub session: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub start: Timestamp,
    pub end: Timestamp,
    pub provenance: Provenance,
}

/// A recording period for one athlete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub athlete: Uuid,
    pub sport: Sport,
    pub start: Timestamp,
    /// Unset until the session is closed
    pub end: Option<Timestamp>,
    pub placements: Vec<SensorPlacement>,
    pub events: Vec<Event>,
}

impl Session {
    pub fn placement_by_serial(&self, serial: &str) -> Option<&SensorPlacement> {
        self.placements.iter().find(|p| p.sensor == serial)
    }

    pub fn reading_count(&self) -> usize {
        self.placements.iter().map(|p| p.readings.len()).sum()
    }
}
