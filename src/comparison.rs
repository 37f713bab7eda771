use nalgebra::Point2;
use tracing::warn;

use crate::data::{cmp_f64, Channel, Session};
use crate::error::DataError;
use crate::resample::merge;
use crate::track::Corner;

/// Distance either side of a corner shown by the corner focus, in metres.
pub const CORNER_WINDOW_M: f64 = 400.0;

pub const TRACE_CHANNELS: [Channel; 6] = [
    Channel::Speed,
    Channel::Throttle,
    Channel::Brake,
    Channel::Rpm,
    Channel::Gear,
    Channel::Drs,
];

/// One driver's fastest lap as `(distance m, value)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelTrace {
    pub driver: String,
    pub team: String,
    pub lap_number: u32,
    pub channel: Channel,
    pub points: Vec<(f64, f64)>,
}

impl ChannelTrace {
    pub fn max_distance(&self) -> Option<f64> {
        self.points.iter().map(|(d, _)| *d).max_by(cmp_f64)
    }

    pub fn within(&self, (start, end): (f64, f64)) -> impl Iterator<Item = &(f64, f64)> {
        self.points.iter().filter(move |(d, _)| (start..=end).contains(d))
    }
}

pub fn channel_trace(session: &Session, driver: &str, channel: Channel) -> Result<ChannelTrace, DataError> {
    let lap = session.fastest_lap(driver)?;
    let car = session.car_data(driver, lap.lap_number)?;
    let no_channel = || DataError::NoChannel {
        driver: driver.to_string(),
        lap: lap.lap_number,
        channel,
    };

    let (Some(distance), Some(values)) = (car.channel(Channel::Distance), car.channel(channel)) else {
        return Err(no_channel());
    };
    let points: Vec<(f64, f64)> = distance
        .iter()
        .zip(values)
        .filter_map(|(d, v)| Some(((*d)?, (*v)?)))
        .collect();
    if points.is_empty() {
        return Err(no_channel());
    }

    Ok(ChannelTrace {
        driver: driver.to_string(),
        team: lap.team.clone(),
        lap_number: lap.lap_number,
        channel,
        points,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub channel: Channel,
    pub traces: Vec<ChannelTrace>,
    /// Longest lap distance among the traces, 0 when there are none.
    pub max_distance: f64,
}

impl Comparison {
    pub fn build(session: &Session, drivers: &[&str], channel: Channel) -> Self {
        let traces: Vec<ChannelTrace> = drivers
            .iter()
            .filter_map(|driver| match channel_trace(session, driver, channel) {
                Ok(trace) => Some(trace),
                Err(e) => {
                    warn!(driver, %channel, error = %e, "skipping driver in comparison");
                    None
                }
            })
            .collect();
        let max_distance = traces
            .iter()
            .filter_map(ChannelTrace::max_distance)
            .fold(0.0, f64::max);
        Self { channel, traces, max_distance }
    }
}

/// Looks a corner up by its label, e.g. `4` or `4a`.
pub fn find_corner<'a>(corners: &'a [Corner], label: &str) -> Option<&'a Corner> {
    let label = label.trim();
    corners.iter().find(|c| c.label().eq_ignore_ascii_case(label))
}

// distance range around the apex, kept on the lap
pub fn corner_window(corner: &Corner, max_distance: f64) -> (f64, f64) {
    (
        (corner.distance - CORNER_WINDOW_M).max(0.0),
        (corner.distance + CORNER_WINDOW_M).min(max_distance),
    )
}

/// Heatmaps colour by speed, gear, brake or RPM; anything else shows speed.
pub fn heatmap_channel(requested: Channel) -> Channel {
    match requested {
        Channel::Speed | Channel::Gear | Channel::Brake | Channel::Rpm => requested,
        _ => Channel::Speed,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatPoint {
    pub position: Point2<f64>,
    pub value: f64,
}

/// Track positions of one lap paired with a channel value.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackHeatmap {
    pub driver: String,
    pub channel: Channel,
    pub points: Vec<HeatPoint>,
}

impl TrackHeatmap {
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let values = self.points.iter().map(|p| p.value);
        Some((values.clone().min_by(cmp_f64)?, values.max_by(cmp_f64)?))
    }
}

pub fn track_heatmap(session: &Session, driver: &str, requested: Channel) -> Result<TrackHeatmap, DataError> {
    let channel = heatmap_channel(requested);
    let lap = session.fastest_lap(driver)?;
    let car = session.car_data(driver, lap.lap_number)?;
    let pos = session.pos_data(driver, lap.lap_number)?;
    let merged = merge(&car, &pos)?;

    let column = |c: Channel| {
        merged
            .channels
            .iter()
            .position(|m| *m == c)
            .and_then(|i| merged.columns.get(i))
            .ok_or_else(|| DataError::NoChannel {
                driver: driver.to_string(),
                lap: lap.lap_number,
                channel: c,
            })
    };
    let (xs, ys, values) = (column(Channel::X)?, column(Channel::Y)?, column(channel)?);

    let points = xs
        .iter()
        .zip(ys)
        .zip(values)
        .map(|((x, y), value)| HeatPoint { position: Point2::new(*x, *y), value: *value })
        .collect();
    Ok(TrackHeatmap { driver: driver.to_string(), channel, points })
}
