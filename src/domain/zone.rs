//! Zone, target and trail models reconstructed from entity states

use crate::domain::types::Corner;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum number of trail samples kept
pub const MAX_TRAIL_POINTS: usize = 1000;

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Axis-aligned rectangle in sensor space (millimeters)
///
/// A zone with all four coordinates at 0 is "unset". The sensor uses the same
/// encoding, so a rectangle whose corners are all exactly at the origin cannot
/// be told apart from an empty slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Zone {
    pub id: u8,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub active: bool,
}

impl Zone {
    /// All-zero, inactive zone
    pub fn empty(id: u8) -> Self {
        Self { id, x1: 0.0, y1: 0.0, x2: 0.0, y2: 0.0, active: false }
    }

    pub fn new(id: u8, x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let mut zone = Self { id, x1, y1, x2, y2, active: false };
        zone.refresh_active();
        zone
    }

    /// Recompute the activity flag from the coordinates
    pub fn refresh_active(&mut self) {
        self.active = self.x1 != 0.0 || self.y1 != 0.0 || self.x2 != 0.0 || self.y2 != 0.0;
    }

    pub fn get(&self, corner: Corner) -> f64 {
        match corner {
            Corner::X1 => self.x1,
            Corner::Y1 => self.y1,
            Corner::X2 => self.x2,
            Corner::Y2 => self.y2,
        }
    }

    /// Set one coordinate; the activity flag follows immediately
    pub fn set(&mut self, corner: Corner, value: f64) {
        match corner {
            Corner::X1 => self.x1 = value,
            Corner::Y1 => self.y1 = value,
            Corner::X2 => self.x2 = value,
            Corner::Y2 => self.y2 = value,
        }
        self.refresh_active();
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).abs()
    }
}

/// A currently tracked moving object
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Target {
    pub id: u8,
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub distance: f64,
    pub angle: f64,
    pub active: bool,
}

/// One trail sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrailPoint {
    pub x: f64,
    pub y: f64,
    pub timestamp_ms: u64,
}

/// Bounded FIFO of recent target positions
#[derive(Debug, Clone)]
pub struct TargetTrail {
    points: VecDeque<TrailPoint>,
    capacity: usize,
}

impl Default for TargetTrail {
    fn default() -> Self {
        Self::with_capacity(MAX_TRAIL_POINTS)
    }
}

impl TargetTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { points: VecDeque::with_capacity(capacity.min(MAX_TRAIL_POINTS)), capacity }
    }

    /// Append a sample, evicting the oldest once full
    pub fn push(&mut self, point: TrailPoint) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrailPoint> {
        self.points.iter()
    }

    pub fn oldest(&self) -> Option<&TrailPoint> {
        self.points.front()
    }

    pub fn newest(&self) -> Option<&TrailPoint> {
        self.points.back()
    }
}

/// Static information read from the device's configuration entities
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
    pub model: &'static str,
    /// Raw state of the `max_distance` entity (reported in cm)
    pub max_distance: Option<String>,
    /// Raw state of the `installation_angle` entity (degrees)
    pub installation_angle: Option<String>,
}

/// A device discovered from the entity snapshot
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Device {
    pub name: String,
    pub entity_count: usize,
}

impl Device {
    /// `ld2450_living_room` -> `Ld2450 Living Room`
    pub fn display_name(&self) -> String {
        self.name
            .split('_')
            .filter(|w| !w.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_flag_all_zero() {
        let zone = Zone::new(1, 0.0, 0.0, 0.0, 0.0);
        assert!(!zone.active);
    }

    #[test]
    fn test_activity_flag_flips_on_any_coordinate() {
        for corner in Corner::ALL {
            let mut zone = Zone::empty(1);
            zone.set(corner, 10.0);
            assert!(zone.active, "{:?} should activate the zone", corner);

            zone.set(corner, 0.0);
            assert!(!zone.active, "{:?} back to zero should deactivate", corner);
        }
    }

    #[test]
    fn test_trail_fifo_eviction() {
        let mut trail = TargetTrail::new();
        for i in 0..=MAX_TRAIL_POINTS {
            trail.push(TrailPoint { x: i as f64, y: 0.0, timestamp_ms: i as u64 });
        }

        assert_eq!(trail.len(), MAX_TRAIL_POINTS);
        // Sample 0 was evicted, sample 1 is now the oldest
        assert_eq!(trail.oldest().unwrap().timestamp_ms, 1);
        assert_eq!(trail.newest().unwrap().timestamp_ms, MAX_TRAIL_POINTS as u64);
    }

    #[test]
    fn test_trail_clear() {
        let mut trail = TargetTrail::with_capacity(3);
        trail.push(TrailPoint { x: 1.0, y: 1.0, timestamp_ms: 1 });
        trail.clear();
        assert!(trail.is_empty());
    }

    #[test]
    fn test_device_display_name() {
        let device = Device { name: "ld2450_living_room".to_string(), entity_count: 0 };
        assert_eq!(device.display_name(), "Ld2450 Living Room");
    }
}
