// src/position.rs
//
// Latest-value slot for position fixes coming from a second serial stream.
//
// The GPS receiver reports far slower than the BLE scanner delivers buffers.
// Its reader publishes into a PositionCell; the scan loop reads whatever is
// there at delivery time and reuses a stale fix instead of waiting.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// A position fix
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Host time the fix was received
    pub timestamp: DateTime<Local>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub speed_knots: Option<f64>,
}

/// Shared handle to the most recent fix
#[derive(Clone, Debug, Default)]
pub struct PositionCell {
    inner: Arc<RwLock<Option<Position>>>,
}

impl PositionCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored fix
    pub fn publish(&self, position: Position) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = Some(position);
        }
    }

    /// Drop the stored fix, e.g. after the receiver lost lock
    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = None;
        }
    }

    pub fn latest(&self) -> Option<Position> {
        self.inner.read().ok().and_then(|guard| *guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(lat: f64) -> Position {
        Position {
            timestamp: Local::now(),
            latitude: lat,
            longitude: -3.7,
            speed_knots: None,
        }
    }

    #[test]
    fn test_latest_reuses_stale_value() {
        let cell = PositionCell::new();
        assert!(cell.latest().is_none());

        cell.publish(fix(40.4));
        assert_eq!(cell.latest().map(|p| p.latitude), Some(40.4));
        // No new fix: same value comes back
        assert_eq!(cell.latest().map(|p| p.latitude), Some(40.4));
    }

    #[test]
    fn test_publish_from_other_thread() {
        let cell = PositionCell::new();
        let writer = cell.clone();
        std::thread::spawn(move || writer.publish(fix(41.0)))
            .join()
            .unwrap();
        assert_eq!(cell.latest().map(|p| p.latitude), Some(41.0));

        cell.clear();
        assert!(cell.latest().is_none());
    }
}
