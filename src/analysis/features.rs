//! Feature rows built from reading windows.
//!
//! Two transforms, one per stage:
//! - **flat**: every reading's 9 scalars concatenated in time order
//!   (reading-major, `[ax, ay, az, gx, gy, gz, mx, my, mz]` per reading)
//! - **centered aggregate**: the window is reordered around its middle reading
//!   and compressed into per-chunk aggregates

use crate::config::{Aggregation, AnalysisConfig, ConfigError};
use crate::model::{Reading, VALUES_PER_READING};
use statrs::statistics::Statistics;

/// One fixed-length input row for a classifier.
pub type FeatureRow = Vec<f64>;

/// Builds feature rows for both analysis stages from a fixed configuration.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    bool_window_size: usize,
    type_window_size: usize,
    type_interval: usize,
    aggregation: Aggregation,
}

impl FeatureBuilder {
    pub fn new(config: &AnalysisConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            bool_window_size: config.bool_window_size,
            type_window_size: config.type_window_size,
            type_interval: config.type_interval,
            aggregation: config.aggregation,
        })
    }

    /// Flat transform over the most recent `bool_window_size` readings.
    pub fn flat(&self, window: &[Reading]) -> FeatureRow {
        let window = most_recent(window, self.bool_window_size);
        let mut row = Vec::with_capacity(window.len() * VALUES_PER_READING);
        for reading in window {
            row.extend_from_slice(&reading.values());
        }
        row
    }

    /// Centered-aggregate transform over the most recent `type_window_size` readings.
    ///
    /// Returns `None` when the window is too short to have an anchor.
    pub fn centered_aggregate(&self, window: &[Reading]) -> Option<FeatureRow> {
        let window = most_recent(window, self.type_window_size);
        let anchor = anchor_index(window.len())?;
        let ordered = reorganize(window, anchor);

        let mut row = Vec::with_capacity(self.centered_row_len(window.len()));
        row.extend_from_slice(&ordered[0].values());

        for chunk in ordered[1..].chunks(self.type_interval) {
            row.extend_from_slice(&aggregate(chunk, self.aggregation));
        }

        Some(row)
    }

    /// Length of a centered-aggregate row for a window of `n` readings.
    pub fn centered_row_len(&self, n: usize) -> usize {
        if n < 2 {
            return 0;
        }
        let chunks = (n - 1).div_ceil(self.type_interval);
        VALUES_PER_READING * (1 + chunks)
    }
}

/// Index of the anchor reading in a window of `n` readings: `floor(n/2) - 1`.
pub fn anchor_index(n: usize) -> Option<usize> {
    (n / 2).checked_sub(1)
}

fn most_recent(window: &[Reading], size: usize) -> &[Reading] {
    &window[window.len().saturating_sub(size)..]
}

/// Anchor first, then earlier readings nearest-first, then later readings in order.
fn reorganize(window: &[Reading], anchor: usize) -> Vec<&Reading> {
    let mut ordered = Vec::with_capacity(window.len());
    ordered.push(&window[anchor]);
    ordered.extend(window[..anchor].iter().rev());
    ordered.extend(window[anchor + 1..].iter());
    ordered
}

/// Aggregate each of the 9 axes independently across a chunk.
fn aggregate(chunk: &[&Reading], method: Aggregation) -> [f64; VALUES_PER_READING] {
    let values: Vec<[f64; VALUES_PER_READING]> = chunk.iter().map(|r| r.values()).collect();
    let mut out = [0.0; VALUES_PER_READING];
    for (axis, slot) in out.iter_mut().enumerate() {
        let column: Vec<f64> = values.iter().map(|v| v[axis]).collect();
        *slot = match method {
            Aggregation::Mean => Statistics::mean(column.iter()),
            Aggregation::Max => Statistics::max(column.iter()),
            Aggregation::Min => Statistics::min(column.iter()),
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AxisReading;
    use uuid::Uuid;

    /// Reading `i` carries `10 * i + axis` in each axis slot.
    fn reading(i: i64) -> Reading {
        let base = (i * 10) as f64;
        Reading {
            id: Uuid::new_v4(),
            placement: Uuid::nil(),
            timestamp: i,
            accelerometer: AxisReading::new(base, base + 1.0, base + 2.0, "m/s^2"),
            gyroscope: AxisReading::new(base + 3.0, base + 4.0, base + 5.0, "deg/sec"),
            magnetometer: AxisReading::new(base + 6.0, base + 7.0, base + 8.0, "microtesla"),
        }
    }

    fn window(n: i64) -> Vec<Reading> {
        (0..n).map(reading).collect()
    }

    fn builder(type_window: usize, type_interval: usize, aggregation: Aggregation) -> FeatureBuilder {
        FeatureBuilder::new(&AnalysisConfig {
            bool_window_size: 4,
            bool_interval: 2,
            type_window_size: type_window,
            type_interval,
            aggregation,
            type_periodic_gate: false,
        })
        .unwrap()
    }

    #[test]
    fn test_flat_is_reading_major_axis_minor() {
        let builder = builder(10, 3, Aggregation::Mean);
        let row = builder.flat(&window(6));
        // Only the most recent 4 readings (2..=5) are used.
        assert_eq!(row.len(), 36);
        let expected: Vec<f64> = (2..6)
            .flat_map(|i| (0..9).map(move |axis| (i * 10 + axis) as f64))
            .collect();
        assert_eq!(row, expected);
    }

    #[test]
    fn test_anchor_index() {
        assert_eq!(anchor_index(10), Some(4));
        assert_eq!(anchor_index(11), Some(4));
        assert_eq!(anchor_index(2), Some(0));
        assert_eq!(anchor_index(3), Some(0));
        assert_eq!(anchor_index(1), None);
        assert_eq!(anchor_index(150), Some(74));
    }

    #[test]
    fn test_reorganize_order() {
        let readings = window(10);
        let ordered: Vec<i64> = reorganize(&readings, 4).iter().map(|r| r.timestamp).collect();
        assert_eq!(ordered, vec![4, 3, 2, 1, 0, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_centered_first_features_are_anchor_values() {
        for n in [2_i64, 3, 9, 10, 11, 150] {
            let builder = builder(n as usize, 4, Aggregation::Mean);
            let readings = window(n);
            let row = builder.centered_aggregate(&readings).unwrap();
            let anchor = anchor_index(n as usize).unwrap();
            assert_eq!(&row[..9], &readings[anchor].values()[..], "n={n}");
            assert_eq!(row.len(), builder.centered_row_len(n as usize));
        }
    }

    #[test]
    fn test_centered_mean_chunks() {
        let builder = builder(10, 3, Aggregation::Mean);
        let row = builder.centered_aggregate(&window(10)).unwrap();
        // anchor 4, then chunks [3,2,1], [0,5,6], [7,8,9]
        assert_eq!(row.len(), 36);
        assert_eq!(row[9], 20.0); // mean of 30, 20, 10
        assert!((row[18] - (0.0 + 50.0 + 60.0) / 3.0).abs() < 1e-9);
        assert_eq!(row[27], 80.0);
        assert_eq!(row[35], 88.0);
    }

    #[test]
    fn test_centered_max_and_min() {
        let readings = window(10);

        let max_row = builder(10, 3, Aggregation::Max)
            .centered_aggregate(&readings)
            .unwrap();
        assert_eq!(max_row[9], 30.0);
        assert_eq!(max_row[18], 60.0);
        assert_eq!(max_row[26], 68.0);

        let min_row = builder(10, 3, Aggregation::Min)
            .centered_aggregate(&readings)
            .unwrap();
        assert_eq!(min_row[9], 10.0);
        assert_eq!(min_row[18], 0.0);
        assert_eq!(min_row[26], 8.0);
    }

    #[test]
    fn test_partial_last_chunk_is_kept() {
        let builder = builder(9, 3, Aggregation::Max);
        // anchor 3, ordered [3,2,1,0,4,5,6,7,8] -> chunks [2,1,0], [4,5,6], [7,8]
        let row = builder.centered_aggregate(&window(9)).unwrap();
        assert_eq!(row.len(), 36);
        assert_eq!(row[27], 80.0);
    }

    #[test]
    fn test_centered_uses_most_recent_readings() {
        let builder = builder(4, 2, Aggregation::Mean);
        // last 4 of 0..8 are 4,5,6,7; anchor index 1 -> reading 5
        let row = builder.centered_aggregate(&window(8)).unwrap();
        assert_eq!(row[0], 50.0);
    }

    #[test]
    fn test_window_too_short_for_anchor() {
        let builder = builder(4, 2, Aggregation::Mean);
        assert!(builder.centered_aggregate(&window(1)).is_none());
        assert!(builder.centered_aggregate(&[]).is_none());
    }
}
