use csv::ReaderBuilder;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::data::secs;
use crate::error::DataError;

// one row of the provider's weather feed, sampled about once a minute on the
// session clock
#[derive(Debug, Deserialize)]
struct RawWeatherRow {
    #[serde(rename = "Time")] time: Option<f64>,
    #[serde(rename = "AirTemp", default)] air_temp: Option<f64>,
    #[serde(rename = "TrackTemp", default)] track_temp: Option<f64>,
    #[serde(rename = "Humidity", default)] humidity: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherSample {
    pub time: Duration,
    pub air_temp_c: Option<f64>,
    pub track_temp_c: Option<f64>,
    pub humidity_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherTable {
    samples: Vec<WeatherSample>,
}

impl WeatherTable {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let path = path.as_ref();
        let csv_err = |source| DataError::Csv { path: path.to_path_buf(), source };
        let mut reader = ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(csv_err)?;

        let mut samples = Vec::new();
        for res in reader.deserialize() {
            let raw: RawWeatherRow = res.map_err(csv_err)?;
            if let Some(time) = raw.time.and_then(secs) {
                samples.push(WeatherSample {
                    time,
                    air_temp_c: raw.air_temp,
                    track_temp_c: raw.track_temp,
                    humidity_pct: raw.humidity,
                });
            }
        }
        debug!(path = %path.display(), samples = samples.len(), "loaded weather");
        Ok(Self::from_samples(samples))
    }

    pub fn from_samples(mut samples: Vec<WeatherSample>) -> Self {
        samples.sort_by_key(|s| s.time);
        Self { samples }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample closest to `t` on the session clock; the earlier one wins a tie.
    pub fn nearest(&self, t: Duration) -> Option<&WeatherSample> {
        let after = self.samples.partition_point(|s| s.time < t);
        let before = after.checked_sub(1).and_then(|i| self.samples.get(i));
        match (before, self.samples.get(after)) {
            (Some(b), Some(a)) if a.time - t < t - b.time => Some(a),
            (Some(b), _) => Some(b),
            (None, a) => a,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample(secs: u64, air: f64) -> WeatherSample {
        WeatherSample {
            time: Duration::from_secs(secs),
            air_temp_c: Some(air),
            track_temp_c: None,
            humidity_pct: None,
        }
    }

    #[test]
    fn nearest_sample_on_session_clock() {
        let table = WeatherTable::from_samples(vec![sample(120, 25.0), sample(0, 24.0), sample(60, 24.5)]);
        let air = |t| table.nearest(Duration::from_secs(t)).and_then(|s| s.air_temp_c);
        assert_eq!(air(0), Some(24.0));
        assert_eq!(air(29), Some(24.0));
        assert_eq!(air(30), Some(24.0));
        assert_eq!(air(31), Some(24.5));
        assert_eq!(air(500), Some(25.0));
        assert_eq!(WeatherTable::default().nearest(Duration::ZERO), None);
    }

    #[test]
    fn loads_provider_columns_and_skips_untimed_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Time,AirTemp,Humidity,Pressure,Rainfall,TrackTemp,WindDirection,WindSpeed").unwrap();
        writeln!(file, "30.5,27.1,41.0,1012.3,False,44.2,180,1.2").unwrap();
        writeln!(file, ",27.0,40.0,1012.3,False,44.0,180,1.2").unwrap();

        let table = WeatherTable::load(file.path()).unwrap();
        let s = table.nearest(Duration::ZERO).unwrap();
        assert_eq!(s.track_temp_c, Some(44.2));
        assert_eq!(s.humidity_pct, Some(41.0));
        assert_eq!(table.samples.len(), 1);
    }
}
