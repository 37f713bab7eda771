// MoTeC i2 CSV layout: quoted key/value metadata, a blank line, quoted
// column and unit rows, then one unquoted row per sample.

use chrono::{DateTime, Utc};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::data::{Channel, Session};
use crate::error::{DataError, ExportError};
use crate::resample::{resample_bounded, SyncedLap};

/// Output columns with their MoTeC names and units. `None` is the time axis.
pub const COLUMNS: [(Option<Channel>, &str, &str); 8] = [
    (None, "Time", "s"),
    (Some(Channel::Distance), "Distance", "m"),
    (Some(Channel::Speed), "Ground Speed", "kph"),
    (Some(Channel::Rpm), "Engine RPM", "rpm"),
    (Some(Channel::Gear), "Gear", ""),
    (Some(Channel::Throttle), "Throttle Pos", "%"),
    (Some(Channel::Brake), "Brake Pos", "%"),
    (Some(Channel::Drs), "DRS Status", ""),
];

#[derive(Debug, Clone)]
pub struct MotecHeader {
    pub venue: String,
    pub vehicle: String,
    pub driver: String,
    pub lap_number: u32,
    pub start: DateTime<Utc>,
    pub sample_rate_hz: u32,
}

impl MotecHeader {
    fn fields(&self, duration_s: f64) -> Vec<(&'static str, String)> {
        vec![
            ("Format", "MoTeC CSV 1.1".to_string()),
            ("Venue", self.venue.clone()),
            ("Vehicle", self.vehicle.clone()),
            ("Driver", self.driver.clone()),
            ("Device", "FastF1 Export".to_string()),
            ("Comment", format!("Lap {}", self.lap_number)),
            ("Date", self.start.format("%Y-%m-%d").to_string()),
            ("Time", self.start.format("%H:%M:%S").to_string()),
            ("Sample Rate", self.sample_rate_hz.to_string()),
            ("Duration", format!("{duration_s:.3}")),
            ("Range Field", "Time".to_string()),
            ("Volume", String::new()),
            ("Excld", String::new()),
            ("Driver Separator", "1".to_string()),
        ]
    }
}

/// Writes `lap` in MoTeC CSV layout. Time is zero-based seconds.
///
/// Every exported channel must be present in `lap`; nothing is written
/// otherwise.
pub fn write_motec<W: Write>(mut out: W, header: &MotecHeader, lap: &SyncedLap) -> Result<(), ExportError> {
    let series = COLUMNS
        .iter()
        .map(|(channel, _, _)| match channel {
            None => Ok(lap.elapsed_s.view()),
            Some(c) => lap.channel(*c).ok_or(ExportError::MissingChannel(*c)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let quoted = || {
        let mut builder = WriterBuilder::new();
        builder
            .quote_style(QuoteStyle::Always)
            .terminator(Terminator::Any(b'\n'))
            .flexible(true);
        builder
    };

    {
        let mut meta = quoted().from_writer(&mut out);
        for (key, value) in header.fields(lap.duration_s()) {
            meta.write_record([key, value.as_str()])?;
        }
        meta.flush()?;
    }
    out.write_all(b"\n")?;

    {
        let mut names = quoted().from_writer(&mut out);
        names.write_record(COLUMNS.iter().map(|(_, name, _)| *name))?;
        names.write_record(COLUMNS.iter().map(|(_, _, unit)| *unit))?;
        names.flush()?;
    }

    let mut rows = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(&mut out);
    for row in 0..lap.len() {
        rows.write_record(series.iter().map(|column| format!("{:.3}", column[row])))?;
    }
    rows.flush()?;
    Ok(())
}

pub fn file_name(event: &str, driver: &str, lap_number: u32) -> String {
    format!("{event}_{driver}_Lap{lap_number}.csv")
}

/// Exports one lap (the driver's fastest when `lap` is `None`) into `dir`.
pub fn export_lap(
    session: &Session,
    driver: &str,
    lap: Option<u32>,
    cfg: &AnalysisConfig,
    dir: &Path,
) -> Result<PathBuf, ExportError> {
    let record = match lap {
        Some(n) => session.laps.lap(driver, n)?,
        None => session.fastest_lap(driver)?,
    };
    let car = session.car_data(driver, record.lap_number)?;
    let pos = session.pos_data(driver, record.lap_number)?;
    let synced = resample_bounded(&car, &pos, cfg.export_step(), cfg.max_grid_rows)?;

    let header = MotecHeader {
        venue: session.info.event_name.clone(),
        vehicle: record.team.clone(),
        driver: driver.to_string(),
        lap_number: record.lap_number,
        start: session.info.start,
        sample_rate_hz: cfg.export_sample_rate_hz,
    };
    let path = dir.join(file_name(&session.info.event_name, driver, record.lap_number));
    let file = File::create(&path).map_err(|source| DataError::Io { path: path.clone(), source })?;
    let mut out = BufWriter::new(file);
    write_motec(&mut out, &header, &synced)?;
    out.flush()?;

    info!(driver, lap = record.lap_number, rows = synced.len(), path = %path.display(), "wrote MoTeC export");
    Ok(path)
}

// a driver that fails is logged and skipped
pub fn export_batch(
    session: &Session,
    requests: &[(&str, Option<u32>)],
    cfg: &AnalysisConfig,
    dir: &Path,
) -> Vec<PathBuf> {
    requests
        .iter()
        .filter_map(|(driver, lap)| match export_lap(session, driver, *lap, cfg, dir) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(driver, error = %e, "skipping export");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resample::resample_telemetry;
    use crate::resample::tests::{car_table, ms, pos_table};
    use chrono::TimeZone;
    use ndarray::{arr1, Array2};

    fn header() -> MotecHeader {
        MotecHeader {
            venue: "Italian Grand Prix".to_string(),
            vehicle: "Ferrari".to_string(),
            driver: "LEC".to_string(),
            lap_number: 41,
            start: Utc.with_ymd_and_hms(2025, 9, 7, 13, 0, 0).unwrap(),
            sample_rate_hz: 60,
        }
    }

    fn exported() -> String {
        let times: Vec<_> = (0..=4).map(|i| ms(i * 10)).collect();
        let car = car_table(&times, |t| t * 1000.0);
        let pos = pos_table(&times, |t| t);
        let lap = resample_telemetry(&car, &pos, ms(16)).unwrap();

        let mut buf = Vec::new();
        write_motec(&mut buf, &header(), &lap).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn header_block_matches_importer_layout() {
        let text = exported();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], r#""Format","MoTeC CSV 1.1""#);
        assert_eq!(lines[1], r#""Venue","Italian Grand Prix""#);
        assert_eq!(lines[2], r#""Vehicle","Ferrari""#);
        assert_eq!(lines[5], r#""Comment","Lap 41""#);
        assert_eq!(lines[6], r#""Date","2025-09-07""#);
        assert_eq!(lines[7], r#""Time","13:00:00""#);
        assert_eq!(lines[8], r#""Sample Rate","60""#);
        assert_eq!(lines[9], r#""Duration","0.032""#);
        assert_eq!(lines[11], r#""Volume","""#);
        assert_eq!(lines[13], r#""Driver Separator","1""#);
        assert_eq!(lines[14], "");
    }

    #[test]
    fn column_and_unit_rows() {
        let text = exported();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[15],
            r#""Time","Distance","Ground Speed","Engine RPM","Gear","Throttle Pos","Brake Pos","DRS Status""#
        );
        assert_eq!(lines[16], r#""s","m","kph","rpm","","%","%","""#);
    }

    #[test]
    fn data_rows_are_zero_based_with_three_decimals() {
        let text = exported();
        let rows: Vec<&str> = text.lines().skip(17).collect();
        // 0, 16 and 32 ms on a 40 ms lap
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], "0.000,0.000,0.000,0.000,0.000,0.000,0.000,0.000");
        assert_eq!(rows[1], "0.016,16.000,16.000,16.000,16.000,16.000,16.000,16.000");
    }

    #[test]
    fn missing_channel_fails_before_writing() {
        let lap = SyncedLap {
            time: vec![ms(0), ms(16)],
            elapsed_s: arr1(&[0.0, 0.016]),
            channels: vec![Channel::Distance, Channel::Speed],
            values: Array2::zeros((2, 2)),
            step: ms(16),
        };
        let mut buf = Vec::new();
        let err = write_motec(&mut buf, &header(), &lap).unwrap_err();
        assert!(matches!(err, ExportError::MissingChannel(Channel::Rpm)));
        assert!(buf.is_empty());
    }

    #[test]
    fn file_name_layout() {
        assert_eq!(file_name("Monaco Grand Prix", "LEC", 7), "Monaco Grand Prix_LEC_Lap7.csv");
    }
}
