use chrono::{DateTime, Utc};
use csv::ReaderBuilder;
use serde::{Deserialize, Deserializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::DataError;
use crate::track::Corner;
use crate::weather::WeatherTable;

// raw row of the lap export, renamed from the provider's column names.
// times are seconds; empty cells mean the provider had no value.
#[derive(Debug, Deserialize)]
struct RawLapRow {
    #[serde(rename = "Driver")] driver: String,
    #[serde(rename = "Team", default)] team: String,
    #[serde(rename = "LapNumber")] lap_number: Option<f64>,
    #[serde(rename = "Stint")] stint: Option<f64>,
    #[serde(rename = "Time", default)] session_time: Option<f64>,
    #[serde(rename = "LapTime")] lap_time: Option<f64>,
    #[serde(rename = "Sector1Time")] sector1: Option<f64>,
    #[serde(rename = "Sector2Time")] sector2: Option<f64>,
    #[serde(rename = "Sector3Time")] sector3: Option<f64>,
    #[serde(rename = "Compound", default)] compound: String,
    #[serde(rename = "PitInLap", default, deserialize_with = "flag")] pit_in: bool,
    #[serde(rename = "PitOutLap", default, deserialize_with = "flag")] pit_out: bool,
    #[serde(rename = "IsAccurate", default = "yes", deserialize_with = "flag")] is_accurate: bool,
    #[serde(rename = "TrackStatus", default)] track_status: Option<String>,
}

fn yes() -> bool {
    true
}

// the provider writes booleans as True/False, hand-edited files tend to use 1/0
fn flag<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(de)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!("not a boolean: {other}"))),
    }
}

pub(crate) fn secs(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Compound {
    Soft,
    Medium,
    Hard,
    Intermediate,
    Wet,
    Unknown,
}

impl Compound {
    pub fn parse(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "SOFT" => Compound::Soft,
            "MEDIUM" => Compound::Medium,
            "HARD" => Compound::Hard,
            "INTERMEDIATE" => Compound::Intermediate,
            "WET" => Compound::Wet,
            _ => Compound::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Compound::Soft => "SOFT",
            Compound::Medium => "MEDIUM",
            Compound::Hard => "HARD",
            Compound::Intermediate => "INTERMEDIATE",
            Compound::Wet => "WET",
            Compound::Unknown => "UNKNOWN",
        }
    }

    pub fn initial(self) -> char {
        match self {
            Compound::Unknown => '?',
            other => other.name().chars().next().unwrap_or('?'),
        }
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LapRecord {
    pub driver: String,
    pub team: String,
    pub lap_number: u32,
    pub stint: u32,
    pub lap_time: Option<Duration>,
    // session clock when the lap was completed
    pub session_time: Option<Duration>,
    pub sectors: [Option<Duration>; 3],
    pub compound: Compound,
    pub pit_in: bool,
    pub pit_out: bool,
    pub is_accurate: bool,
    pub track_status: String,
}

impl LapRecord {
    pub fn lap_time_secs(&self) -> Option<f64> {
        self.lap_time.map(|t| t.as_secs_f64())
    }

    // every status digit must be "1" (track clear); yellows, SC and VSC
    // show up as other digits
    fn green(&self) -> bool {
        self.track_status.chars().all(|c| c == '1')
    }

    /// Racing lap candidate before the pace threshold is applied.
    pub fn is_clean(&self) -> bool {
        self.lap_time.is_some() && !self.pit_in && !self.pit_out && self.is_accurate && self.green()
    }
}

/// Laps that count for performance comparison: clean laps no slower than
/// `threshold` times the fastest clean lap of the same set.
pub fn representative_laps<'a, I>(laps: I, threshold: f64) -> Vec<&'a LapRecord>
where
    I: IntoIterator<Item = &'a LapRecord>,
{
    let clean: Vec<&LapRecord> = laps.into_iter().filter(|l| l.is_clean()).collect();
    let Some(best) = clean.iter().filter_map(|l| l.lap_time).min() else {
        return Vec::new();
    };
    let cutoff = best.as_secs_f64() * threshold;
    clean
        .into_iter()
        .filter(|l| l.lap_time_secs().is_some_and(|t| t <= cutoff))
        .collect()
}

/// Fastest timed lap, preferring laps the feed marked accurate.
pub fn pick_fastest<'a, I>(laps: I) -> Option<&'a LapRecord>
where
    I: IntoIterator<Item = &'a LapRecord>,
{
    let timed: Vec<&LapRecord> = laps.into_iter().filter(|l| l.lap_time.is_some()).collect();
    let quickest = |accurate_only: bool| {
        timed
            .iter()
            .copied()
            .filter(|l| l.is_accurate || !accurate_only)
            .min_by(|a, b| a.lap_time.cmp(&b.lap_time).then(a.lap_number.cmp(&b.lap_number)))
    };
    quickest(true).or_else(|| quickest(false))
}

/// A run of laps for one driver on one tyre set.
#[derive(Debug, Clone)]
pub struct StintGroup<'a> {
    pub driver: &'a str,
    pub stint: u32,
    pub laps: Vec<&'a LapRecord>,
}

impl StintGroup<'_> {
    pub fn first_lap(&self) -> Option<u32> {
        self.laps.iter().map(|l| l.lap_number).min()
    }

    pub fn last_lap(&self) -> Option<u32> {
        self.laps.iter().map(|l| l.lap_number).max()
    }

    pub fn compound(&self) -> Compound {
        self.laps.first().map_or(Compound::Unknown, |l| l.compound)
    }
}

/// Groups one driver's laps by stint id, ordered by stint.
pub fn stint_groups(laps: &[LapRecord]) -> Vec<StintGroup<'_>> {
    let mut groups: BTreeMap<u32, Vec<&LapRecord>> = BTreeMap::new();
    for lap in laps {
        groups.entry(lap.stint).or_default().push(lap);
    }
    groups
        .into_iter()
        .map(|(stint, mut laps)| {
            laps.sort_by_key(|l| l.lap_number);
            StintGroup {
                driver: laps.first().copied().map_or("", |l| l.driver.as_str()),
                stint,
                laps,
            }
        })
        .collect()
}

// the lap export is one row per lap for every driver; regroup by driver so
// every analysis can work on a single driver's laps.
#[derive(Debug, Clone, Default)]
pub struct LapTable {
    pub driver_laps: BTreeMap<String, Vec<LapRecord>>,
}

impl LapTable {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let path = path.as_ref();
        let csv_err = |source| DataError::Csv { path: path.to_path_buf(), source };
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(csv_err)?;

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for res in reader.deserialize() {
            let raw: RawLapRow = res.map_err(csv_err)?;
            match Self::convert(raw) {
                Some(lap) => records.push(lap),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(path = %path.display(), skipped, "dropped lap rows without driver, lap number or stint");
        }
        debug!(path = %path.display(), laps = records.len(), "loaded lap table");
        Ok(Self::from_records(records))
    }

    fn convert(raw: RawLapRow) -> Option<LapRecord> {
        let lap_number = raw.lap_number.filter(|n| n.is_finite() && *n >= 1.0)?;
        let stint = raw.stint.filter(|s| s.is_finite() && *s >= 0.0)?;
        if raw.driver.trim().is_empty() {
            return None;
        }
        Some(LapRecord {
            driver: raw.driver,
            team: raw.team,
            lap_number: lap_number.round() as u32,
            stint: stint.round() as u32,
            lap_time: raw.lap_time.and_then(secs),
            session_time: raw.session_time.and_then(secs),
            sectors: [
                raw.sector1.and_then(secs),
                raw.sector2.and_then(secs),
                raw.sector3.and_then(secs),
            ],
            compound: Compound::parse(&raw.compound),
            pit_in: raw.pit_in,
            pit_out: raw.pit_out,
            is_accurate: raw.is_accurate,
            track_status: raw.track_status.unwrap_or_else(|| "1".to_string()),
        })
    }

    pub fn from_records(records: Vec<LapRecord>) -> Self {
        let mut driver_laps: BTreeMap<String, Vec<LapRecord>> = BTreeMap::new();
        for lap in records {
            driver_laps.entry(lap.driver.clone()).or_default().push(lap);
        }
        for laps in driver_laps.values_mut() {
            laps.sort_by_key(|l| l.lap_number);
        }
        Self { driver_laps }
    }

    pub fn drivers(&self) -> impl Iterator<Item = &str> {
        self.driver_laps.keys().map(String::as_str)
    }

    pub fn driver(&self, driver: &str) -> Result<&[LapRecord], DataError> {
        self.driver_laps
            .get(driver)
            .map(Vec::as_slice)
            .ok_or_else(|| DataError::UnknownDriver(driver.to_string()))
    }

    pub fn lap(&self, driver: &str, lap_number: u32) -> Result<&LapRecord, DataError> {
        self.driver(driver)?
            .iter()
            .find(|l| l.lap_number == lap_number)
            .ok_or_else(|| DataError::UnknownLap { driver: driver.to_string(), lap: lap_number })
    }

    pub fn all_laps(&self) -> impl Iterator<Item = &LapRecord> {
        self.driver_laps.values().flatten()
    }

    pub fn fastest(&self) -> Option<&LapRecord> {
        pick_fastest(self.all_laps())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Distance,
    Speed,
    Rpm,
    Gear,
    Throttle,
    Brake,
    Drs,
    X,
    Y,
}

impl Channel {
    pub const ALL: [Channel; 9] = [
        Channel::Distance,
        Channel::Speed,
        Channel::Rpm,
        Channel::Gear,
        Channel::Throttle,
        Channel::Brake,
        Channel::Drs,
        Channel::X,
        Channel::Y,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Channel::Distance => "Distance",
            Channel::Speed => "Speed",
            Channel::Rpm => "RPM",
            Channel::Gear => "nGear",
            Channel::Throttle => "Throttle",
            Channel::Brake => "Brake",
            Channel::Drs => "DRS",
            Channel::X => "X",
            Channel::Y => "Y",
        }
    }

    pub fn from_column(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.column() == name)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

// column-oriented samples for one lap, timestamped from lap start. car and
// position data are separate tables with their own clocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryTable {
    pub time: Vec<Duration>,
    pub columns: BTreeMap<Channel, Vec<Option<f64>>>,
}

impl TelemetryTable {
    pub fn new(time: Vec<Duration>) -> Self {
        Self { time, columns: BTreeMap::new() }
    }

    /// Adds a channel. Columns shorter than the time axis are padded with
    /// missing cells; longer ones are cut.
    pub fn with_channel(mut self, channel: Channel, mut values: Vec<Option<f64>>) -> Self {
        values.resize(self.time.len(), None);
        self.columns.insert(channel, values);
        self
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn channel(&self, channel: Channel) -> Option<&[Option<f64>]> {
        self.columns.get(&channel).map(Vec::as_slice)
    }

    pub fn has_values(&self, channel: Channel) -> bool {
        self.channel(channel).is_some_and(|c| c.iter().any(Option::is_some))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let path = path.as_ref();
        let csv_err = |source| DataError::Csv { path: path.to_path_buf(), source };
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(csv_err)?;

        let headers = reader.headers().map_err(csv_err)?.clone();
        let time_idx = headers.iter().position(|h| h == "Time").ok_or_else(|| {
            DataError::MissingColumn { path: path.to_path_buf(), column: "Time".to_string() }
        })?;
        // unknown columns are ignored
        let channel_idx: Vec<(usize, Channel)> = headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| Channel::from_column(h).map(|c| (i, c)))
            .collect();

        let mut time = Vec::new();
        let mut columns: BTreeMap<Channel, Vec<Option<f64>>> =
            channel_idx.iter().map(|(_, c)| (*c, Vec::new())).collect();

        for (row, res) in reader.records().enumerate() {
            let record = res.map_err(csv_err)?;
            let bad = |column: &str, value: &str| DataError::BadValue {
                path: path.to_path_buf(),
                row: row + 1,
                column: column.to_string(),
                value: value.to_string(),
            };
            let raw_time = record.get(time_idx).unwrap_or("");
            let t = raw_time
                .parse::<f64>()
                .ok()
                .and_then(secs)
                .ok_or_else(|| bad("Time", raw_time))?;
            time.push(t);

            for (idx, channel) in &channel_idx {
                let cell = record.get(*idx).unwrap_or("");
                let value = if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
                    None
                } else {
                    Some(cell.parse::<f64>().map_err(|_| bad(channel.column(), cell))?)
                };
                if let Some(col) = columns.get_mut(channel) {
                    col.push(value);
                }
            }
        }
        debug!(path = %path.display(), samples = time.len(), channels = columns.len(), "loaded telemetry");
        Ok(Self { time, columns })
    }

    /// Adds a Distance channel by integrating Speed (km/h) over time when
    /// the table does not carry one.
    pub fn with_distance(mut self) -> Self {
        if self.has_values(Channel::Distance) {
            return self;
        }
        let distance = match self.columns.get(&Channel::Speed) {
            Some(speed) => integrate_speed(&self.time, speed),
            None => return self,
        };
        self.columns.insert(Channel::Distance, distance);
        self
    }
}

// cumulative metres from km/h samples; missing speed cells add nothing
fn integrate_speed(time: &[Duration], speed: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut total = 0.0;
    let mut distance = Vec::with_capacity(time.len());
    for (i, t) in time.iter().enumerate() {
        if let Some(prev) = i.checked_sub(1).and_then(|p| time.get(p)) {
            let dt = t.saturating_sub(*prev).as_secs_f64();
            let v = speed.get(i).copied().flatten().unwrap_or(0.0) / 3.6;
            total += v * dt;
        }
        distance.push(Some(total));
    }
    distance
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub event_name: String,
    pub session_name: String,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub circuit_rotation_deg: f64,
    #[serde(default)]
    pub corners: Vec<Corner>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub dir: PathBuf,
    pub info: SessionInfo,
    pub laps: LapTable,
    // only present when the export carried a weather.csv
    pub weather: Option<WeatherTable>,
}

impl Session {
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self, DataError> {
        let dir = dir.as_ref().to_path_buf();
        let meta_path = dir.join("session.json");
        let meta = fs::read_to_string(&meta_path)
            .map_err(|source| DataError::Io { path: meta_path.clone(), source })?;
        let info: SessionInfo = serde_json::from_str(&meta)
            .map_err(|source| DataError::Json { path: meta_path.clone(), source })?;
        let laps = LapTable::load(dir.join("laps.csv"))?;
        let weather_path = dir.join("weather.csv");
        let weather = if weather_path.exists() {
            Some(WeatherTable::load(weather_path)?)
        } else {
            None
        };
        Ok(Self { dir, info, laps, weather })
    }

    fn telemetry_path(&self, kind: &str, driver: &str, lap: u32) -> PathBuf {
        self.dir.join(kind).join(format!("{driver}_{lap}.csv"))
    }

    fn telemetry(&self, kind: &str, driver: &str, lap: u32) -> Result<TelemetryTable, DataError> {
        let path = self.telemetry_path(kind, driver, lap);
        if !path.exists() {
            return Err(DataError::Io {
                path,
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        TelemetryTable::load(path)
    }

    /// Car channels for one lap, with Distance derived when absent.
    pub fn car_data(&self, driver: &str, lap: u32) -> Result<TelemetryTable, DataError> {
        Ok(self.telemetry("car", driver, lap)?.with_distance())
    }

    pub fn pos_data(&self, driver: &str, lap: u32) -> Result<TelemetryTable, DataError> {
        self.telemetry("pos", driver, lap)
    }

    pub fn fastest_lap(&self, driver: &str) -> Result<&LapRecord, DataError> {
        pick_fastest(self.laps.driver(driver)?)
            .ok_or_else(|| DataError::NoTimedLap(driver.to_string()))
    }
}

pub(crate) fn cmp_f64(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}
