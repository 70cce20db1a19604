//! Per-session, per-placement ordered reading accumulation.

use crate::model::{AxisReading, Location, Reading, SensorPlacement, Timestamp};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// A reading as delivered, before it is assigned an id and placement.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub accelerometer: AxisReading,
    pub gyroscope: AxisReading,
    pub magnetometer: AxisReading,
}

/// Result of appending a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    /// Stored; `count` is the placement's reading count afterwards
    Stored { count: usize },
    /// A reading with this timestamp already exists for the placement
    Duplicate,
    /// No placement with this serial in the session
    UnknownSensor,
}

#[derive(Debug)]
struct PlacementReadings {
    id: Uuid,
    sensor: String,
    location: Location,
    readings: Vec<Reading>,
    timestamps: HashSet<Timestamp>,
}

/// Readings of every placement in one session, in arrival order.
///
/// Arrival order is taken to be time order; nothing is re-sorted.
#[derive(Debug)]
pub struct ReadingStore {
    session: Uuid,
    placements: Vec<PlacementReadings>,
    by_serial: HashMap<String, usize>,
}

impl ReadingStore {
    pub fn new(session: Uuid) -> Self {
        Self {
            session,
            placements: Vec::new(),
            by_serial: HashMap::new(),
        }
    }

    /// Register a placement. Returns its id, or `None` if the serial is already known.
    pub fn add_placement(&mut self, sensor: impl Into<String>, location: Location) -> Option<Uuid> {
        let sensor = sensor.into();
        if self.by_serial.contains_key(&sensor) {
            return None;
        }
        let id = Uuid::new_v4();
        self.by_serial.insert(sensor.clone(), self.placements.len());
        self.placements.push(PlacementReadings {
            id,
            sensor,
            location,
            readings: Vec::new(),
            timestamps: HashSet::new(),
        });
        Some(id)
    }

    /// Append a sample to the placement with serial `sensor`.
    pub fn append(&mut self, sensor: &str, sample: Sample) -> Append {
        let Some(placement) = self.placement_mut(sensor) else {
            return Append::UnknownSensor;
        };
        if !placement.timestamps.insert(sample.timestamp) {
            return Append::Duplicate;
        }
        placement.readings.push(Reading {
            id: Uuid::new_v4(),
            placement: placement.id,
            timestamp: sample.timestamp,
            accelerometer: sample.accelerometer,
            gyroscope: sample.gyroscope,
            magnetometer: sample.magnetometer,
        });
        Append::Stored {
            count: placement.readings.len(),
        }
    }

    /// Number of readings stored for a placement (0 for unknown serials).
    pub fn count(&self, sensor: &str) -> usize {
        self.placement(sensor).map_or(0, |p| p.readings.len())
    }

    /// Copy of the most recent `n` readings of a placement, oldest first.
    pub fn last_n(&self, sensor: &str, n: usize) -> Vec<Reading> {
        match self.placement(sensor) {
            Some(p) => p.readings[p.readings.len().saturating_sub(n)..].to_vec(),
            None => Vec::new(),
        }
    }

    /// Placement records with their readings, in registration order.
    pub fn to_placements(&self) -> Vec<SensorPlacement> {
        self.placements
            .iter()
            .map(|p| SensorPlacement {
                id: p.id,
                sensor: p.sensor.clone(),
                session: self.session,
                location: p.location,
                readings: p.readings.clone(),
            })
            .collect()
    }

    fn placement(&self, sensor: &str) -> Option<&PlacementReadings> {
        self.by_serial.get(sensor).map(|&i| &self.placements[i])
    }

    fn placement_mut(&mut self, sensor: &str) -> Option<&mut PlacementReadings> {
        let index = *self.by_serial.get(sensor)?;
        self.placements.get_mut(index)
    }
}
