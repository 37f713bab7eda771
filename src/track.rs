use nalgebra::{Point2, Rotation2, Vector2};
use serde::Deserialize;

use crate::data::{cmp_f64, Channel, TelemetryTable};

/// Distance between a corner and its label, in track units (metres).
pub const CORNER_LABEL_OFFSET: f64 = 500.0;

/// Corner marker from the circuit info. Angles are in degrees.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Corner {
    pub number: u32,
    #[serde(default)]
    pub letter: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub angle: f64,
    #[serde(default)]
    pub distance: f64,
}

impl Corner {
    pub fn label(&self) -> String {
        format!("{}{}", self.number, self.letter)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CornerMarker {
    pub label: String,
    pub position: Point2<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackMap {
    pub outline: Vec<Point2<f64>>,
    pub corners: Vec<CornerMarker>,
}

fn rotation(angle_deg: f64) -> Rotation2<f64> {
    Rotation2::new(angle_deg.to_radians())
}

impl TrackMap {
    /// Builds the map from one lap's position data. Returns `None` when the
    /// table has no complete X/Y pair.
    pub fn from_positions(pos: &TelemetryTable, rotation_deg: f64, corners: &[Corner]) -> Option<Self> {
        let (xs, ys) = (pos.channel(Channel::X)?, pos.channel(Channel::Y)?);
        let track = rotation(rotation_deg);

        let outline: Vec<Point2<f64>> = xs
            .iter()
            .zip(ys)
            .filter_map(|(x, y)| Some(track * Point2::new((*x)?, (*y)?)))
            .collect();
        if outline.is_empty() {
            return None;
        }

        let corners = corners
            .iter()
            .map(|c| {
                let offset = rotation(c.angle) * Vector2::new(CORNER_LABEL_OFFSET, 0.0);
                CornerMarker {
                    label: c.label(),
                    position: track * (Point2::new(c.x, c.y) + offset),
                }
            })
            .collect();

        Some(Self { outline, corners })
    }

    pub fn bounds(&self, margin: f64) -> Option<(Point2<f64>, Point2<f64>)> {
        let first = self.outline.first()?;
        let (mut min, mut max) = (*first, *first);
        for p in &self.outline {
            min = Point2::new(min.x.min(p.x), min.y.min(p.y));
            max = Point2::new(max.x.max(p.x), max.y.max(p.y));
        }
        let pad = Vector2::new(margin, margin);
        Some((min - pad, max + pad))
    }
}

/// Lap length in kilometres from the furthest Distance sample.
pub fn circuit_length_km(car: &TelemetryTable) -> Option<f64> {
    car.channel(Channel::Distance)?
        .iter()
        .flatten()
        .copied()
        .max_by(cmp_f64)
        .map(|m| m / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn square() -> TelemetryTable {
        let time = (0..4).map(Duration::from_secs).collect();
        TelemetryTable::new(time)
            .with_channel(Channel::X, vec![Some(0.0), Some(100.0), Some(100.0), None])
            .with_channel(Channel::Y, vec![Some(0.0), Some(0.0), Some(100.0), Some(100.0)])
    }

    #[test]
    fn outline_skips_incomplete_points() {
        let map = TrackMap::from_positions(&square(), 0.0, &[]).unwrap();
        assert_eq!(map.outline.len(), 3);
    }

    #[test]
    fn outline_is_rotated_counter_clockwise() {
        let map = TrackMap::from_positions(&square(), 90.0, &[]).unwrap();
        assert_relative_eq!(map.outline[1], Point2::new(0.0, 100.0), epsilon = 1e-9);
    }

    #[test]
    fn corner_label_is_offset_along_corner_angle() {
        let corner = Corner {
            number: 4,
            letter: "a".to_string(),
            x: 1000.0,
            y: 0.0,
            angle: 90.0,
            distance: 800.0,
        };
        let map = TrackMap::from_positions(&square(), 0.0, &[corner]).unwrap();
        assert_eq!(map.corners[0].label, "4a");
        assert_relative_eq!(map.corners[0].position, Point2::new(1000.0, 500.0), epsilon = 1e-9);
    }

    #[test]
    fn bounds_include_margin() {
        let map = TrackMap::from_positions(&square(), 0.0, &[]).unwrap();
        let (min, max) = map.bounds(200.0).unwrap();
        assert_eq!(min, Point2::new(-200.0, -200.0));
        assert_eq!(max, Point2::new(300.0, 300.0));
    }

    #[test]
    fn circuit_length_uses_max_distance() {
        let table = TelemetryTable::new(vec![Duration::ZERO, Duration::from_secs(1)])
            .with_channel(Channel::Distance, vec![Some(5_300.0), Some(5_412.0)]);
        assert_eq!(circuit_length_km(&table), Some(5.412));
    }
}
