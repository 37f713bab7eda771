use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::resample::DEFAULT_MAX_GRID_ROWS;

// defaults are the dashboard's illustrative values, not tyre physics
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    // seconds lost before a tyre counts as finished
    pub max_tolerable_drop_s: f64,
    pub min_stint_laps: usize,
    pub rating_points_per_second: f64,
    pub quicklap_threshold: f64,
    pub replay_step_ms: u64,
    pub export_step_ms: u64,
    // nominal rate for the MoTeC header
    pub export_sample_rate_hz: u32,
    // a lap whose grid would be longer is rejected before allocating
    pub max_grid_rows: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_tolerable_drop_s: 2.0,
            min_stint_laps: 3,
            rating_points_per_second: 10.0,
            quicklap_threshold: 1.07,
            replay_step_ms: 100,
            export_step_ms: 16,
            export_sample_rate_hz: 60,
            max_grid_rows: DEFAULT_MAX_GRID_ROWS,
        }
    }
}

impl AnalysisConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: Self = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_tolerable_drop_s.is_finite() && self.max_tolerable_drop_s > 0.0) {
            return Err(ConfigError::Invalid {
                field: "max_tolerable_drop_s",
                expected: "a positive number of seconds",
            });
        }
        if self.min_stint_laps < 2 {
            return Err(ConfigError::Invalid {
                field: "min_stint_laps",
                expected: "at least 2",
            });
        }
        if !self.rating_points_per_second.is_finite() {
            return Err(ConfigError::Invalid {
                field: "rating_points_per_second",
                expected: "finite",
            });
        }
        if !(self.quicklap_threshold.is_finite() && self.quicklap_threshold >= 1.0) {
            return Err(ConfigError::Invalid {
                field: "quicklap_threshold",
                expected: "at least 1.0",
            });
        }
        if self.replay_step_ms == 0 || self.export_step_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "replay_step_ms/export_step_ms",
                expected: "non-zero",
            });
        }
        if self.max_grid_rows == 0 {
            return Err(ConfigError::Invalid {
                field: "max_grid_rows",
                expected: "non-zero",
            });
        }
        Ok(())
    }

    pub fn replay_step(&self) -> Duration {
        Duration::from_millis(self.replay_step_ms)
    }

    pub fn export_step(&self) -> Duration {
        Duration::from_millis(self.export_step_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_dashboard_constants() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.max_tolerable_drop_s, 2.0);
        assert_eq!(cfg.min_stint_laps, 3);
        assert_eq!(cfg.replay_step(), Duration::from_millis(100));
        assert_eq!(cfg.export_step(), Duration::from_millis(16));
        assert_eq!(cfg.max_grid_rows, DEFAULT_MAX_GRID_ROWS);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_tolerable_drop_s": 3.5, "replay_step_ms": 50 }}"#).unwrap();

        let cfg = AnalysisConfig::load(file.path()).unwrap();
        assert_eq!(cfg.max_tolerable_drop_s, 3.5);
        assert_eq!(cfg.replay_step_ms, 50);
        assert_eq!(cfg.export_step_ms, 16);
        assert_eq!(cfg.max_grid_rows, DEFAULT_MAX_GRID_ROWS);
    }

    #[test]
    fn grid_limit_can_be_lowered_but_not_zeroed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_grid_rows": 2000 }}"#).unwrap();
        assert_eq!(AnalysisConfig::load(file.path()).unwrap().max_grid_rows, 2000);

        let cfg = AnalysisConfig { max_grid_rows: 0, ..AnalysisConfig::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { field: "max_grid_rows", .. })));
    }

    #[test]
    fn zero_step_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "export_step_ms": 0 }}"#).unwrap();
        assert!(matches!(
            AnalysisConfig::load(file.path()),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
