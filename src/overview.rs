use std::time::Duration;
use tracing::debug;

use crate::data::{Compound, Session};
use crate::laptime::format_lap_time;
use crate::track::{circuit_length_km, TrackMap};
use crate::weather::WeatherSample;

#[derive(Debug, Clone, PartialEq)]
pub struct FastestLap {
    pub driver: String,
    pub team: String,
    pub lap_number: u32,
    pub compound: Compound,
    pub lap_time: Option<Duration>,
    pub session_time: Option<Duration>,
}

impl FastestLap {
    pub fn formatted_time(&self) -> String {
        format_lap_time(self.lap_time)
    }
}

/// Headline numbers for an event page.
#[derive(Debug, Clone)]
pub struct EventOverview {
    pub event_name: String,
    pub session_name: String,
    pub fastest: Option<FastestLap>,
    pub circuit_length_km: Option<f64>,
    pub track: Option<TrackMap>,
    // conditions closest to when the fastest lap was set
    pub weather: Option<WeatherSample>,
}

pub fn event_overview(session: &Session) -> EventOverview {
    let fastest = session.laps.fastest().map(|lap| FastestLap {
        driver: lap.driver.clone(),
        team: lap.team.clone(),
        lap_number: lap.lap_number,
        compound: lap.compound,
        lap_time: lap.lap_time,
        session_time: lap.session_time,
    });

    let weather = fastest
        .as_ref()
        .and_then(|f| f.session_time)
        .zip(session.weather.as_ref())
        .and_then(|(t, table)| table.nearest(t).copied());

    // circuit length and map both come from the session's fastest lap
    let (circuit_length_km, track) = match &fastest {
        Some(f) => {
            let length = session
                .car_data(&f.driver, f.lap_number)
                .ok()
                .and_then(|car| circuit_length_km(&car));
            let track = session.pos_data(&f.driver, f.lap_number).ok().and_then(|pos| {
                TrackMap::from_positions(&pos, session.info.circuit_rotation_deg, &session.info.corners)
            });
            (length, track)
        }
        None => (None, None),
    };
    if track.is_none() {
        debug!(event = %session.info.event_name, "no position data for track map");
    }

    EventOverview {
        event_name: session.info.event_name.clone(),
        session_name: session.info.session_name.clone(),
        fastest,
        circuit_length_km,
        track,
        weather,
    }
}
