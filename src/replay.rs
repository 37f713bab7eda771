use nalgebra::{distance, Point2};
use std::time::Duration;
use tracing::warn;

use crate::config::AnalysisConfig;
use crate::data::{Channel, Session};
use crate::resample::{resample_bounded, SyncedLap};
use crate::track::TrackMap;

/// One driver's fastest lap on the replay clock.
#[derive(Debug, Clone)]
pub struct GhostCar {
    pub driver: String,
    pub team: String,
    pub lap_number: u32,
    pub lap: SyncedLap,
}

// what a telemetry card shows for one car at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct CarFrame {
    pub driver: String,
    pub position: Point2<f64>,
    pub speed: f64,
    pub gear: u8,
    pub throttle: f64,
    pub brake: f64,
}

#[derive(Debug, Clone)]
pub struct Replay {
    pub step: Duration,
    pub cars: Vec<GhostCar>,
    pub track: Option<TrackMap>,
}

fn load_car(session: &Session, driver: &str, cfg: &AnalysisConfig) -> anyhow::Result<GhostCar> {
    let lap = session.fastest_lap(driver)?;
    let car = session.car_data(driver, lap.lap_number)?;
    let pos = session.pos_data(driver, lap.lap_number)?;
    let synced = resample_bounded(&car, &pos, cfg.replay_step(), cfg.max_grid_rows)?;
    Ok(GhostCar {
        driver: driver.to_string(),
        team: lap.team.clone(),
        lap_number: lap.lap_number,
        lap: synced,
    })
}

fn reference_track(session: &Session, driver: &str) -> Option<TrackMap> {
    let lap = session.fastest_lap(driver).ok()?;
    let pos = session.pos_data(driver, lap.lap_number).ok()?;
    TrackMap::from_positions(&pos, session.info.circuit_rotation_deg, &session.info.corners)
}

impl Replay {
    /// Resamples every driver's fastest lap at the replay step. Drivers
    /// without usable telemetry are skipped with a warning.
    pub fn build(session: &Session, drivers: &[&str], cfg: &AnalysisConfig) -> Self {
        let step = cfg.replay_step();
        let cars = drivers
            .iter()
            .filter_map(|driver| match load_car(session, driver, cfg) {
                Ok(car) => Some(car),
                Err(e) => {
                    warn!(driver, error = %e, "skipping driver in replay");
                    None
                }
            })
            .collect();
        let track = drivers.first().and_then(|d| reference_track(session, d));
        Self { step, cars, track }
    }

    pub fn from_cars(cars: Vec<GhostCar>, step: Duration, track: Option<TrackMap>) -> Self {
        Self { step, cars, track }
    }

    // the longest lap sets the clock
    pub fn duration_s(&self) -> f64 {
        self.cars.iter().map(|c| c.lap.duration_s()).fold(0.0, f64::max)
    }

    /// Grid row shown at `t` seconds, before per-car clamping.
    pub fn index_at(&self, t: f64) -> usize {
        // whole nanoseconds so grid-aligned times land on their own row
        let nanos = (t.clamp(0.0, self.duration_s()) * 1e9).round() as u128;
        (nanos / self.step.as_nanos().max(1)) as usize
    }

    /// Every car at `t`; cars whose lap already ended hold their last row.
    pub fn frame_at(&self, t: f64) -> Vec<CarFrame> {
        let index = self.index_at(t);
        self.cars
            .iter()
            .filter_map(|car| {
                let lap = &car.lap;
                let row = index.min(lap.len().checked_sub(1)?);
                let get = |c| lap.value(row, c);
                Some(CarFrame {
                    driver: car.driver.clone(),
                    position: Point2::new(get(Channel::X)?, get(Channel::Y)?),
                    speed: get(Channel::Speed)?,
                    gear: get(Channel::Gear)? as u8,
                    throttle: get(Channel::Throttle)?.clamp(0.0, 100.0),
                    brake: get(Channel::Brake)?.clamp(0.0, 100.0),
                })
            })
            .collect()
    }

    /// Straight-line distance between two cars at `t`.
    pub fn gap_m(&self, a: &str, b: &str, t: f64) -> Option<f64> {
        let frame = self.frame_at(t);
        let pos = |d: &str| frame.iter().find(|f| f.driver == d).map(|f| f.position);
        Some(distance(&pos(a)?, &pos(b)?))
    }
}
