use linfa::prelude::*;
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::data::{representative_laps, LapRecord};
use crate::error::FitError;

pub type FittedLinearRegression = linfa_linear::FittedLinearRegression<f64>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trend {
    /// Flat or getting faster.
    Improving,
    /// Losing `slope` seconds per lap.
    Degrading { slope: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StintHealth {
    /// 0..=100, truncated.
    pub health_pct: u32,
    pub trend: Trend,
}

impl StintHealth {
    pub fn label(&self) -> String {
        match self.trend {
            Trend::Improving => "Improving".to_string(),
            Trend::Degrading { slope } => format!("+{slope:.3}s/lap"),
        }
    }
}

impl fmt::Display for StintHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}% ({})", self.health_pct, self.label())
    }
}

// least squares of lap time (s) against lap number
fn fit_stint(laps: &[&LapRecord]) -> Result<FittedLinearRegression, FitError> {
    let (x, y): (Vec<f64>, Vec<f64>) = laps
        .iter()
        .filter_map(|l| Some((l.lap_number as f64, l.lap_time_secs()?)))
        .unzip();

    let records = Array2::from_shape_vec((x.len(), 1), x)
        .map_err(|e| FitError::Regression(e.to_string()))?;
    let ds = Dataset::new(records, Array1::from_vec(y));

    LinearRegression::new()
        .fit(&ds)
        .map_err(|e| FitError::Regression(e.to_string()))
}

fn stint_health(
    laps: &[LapRecord],
    target_lap: u32,
    cfg: &AnalysisConfig,
) -> Result<StintHealth, FitError> {
    let target = laps
        .iter()
        .find(|l| l.lap_number == target_lap)
        .ok_or(FitError::TargetMissing(target_lap))?;

    let stint_laps = representative_laps(
        laps.iter().filter(|l| l.stint == target.stint),
        cfg.quicklap_threshold,
    );
    if stint_laps.len() < cfg.min_stint_laps {
        return Err(FitError::Insufficient {
            found: stint_laps.len(),
            required: cfg.min_stint_laps,
        });
    }

    let fitted = fit_stint(&stint_laps)?;
    let slope = fitted.params().get(0).copied().ok_or(FitError::NonFinite)?;
    if !slope.is_finite() {
        return Err(FitError::NonFinite);
    }

    if slope <= 0.0 {
        return Ok(StintHealth { health_pct: 100, trend: Trend::Improving });
    }

    let first_valid = stint_laps.iter().map(|l| l.lap_number).min().unwrap_or(target_lap);
    let estimated_life = cfg.max_tolerable_drop_s / slope;
    let laps_driven = f64::from(target_lap) - f64::from(first_valid);
    let health = (100.0 * (1.0 - laps_driven / estimated_life)).clamp(0.0, 100.0);
    if !health.is_finite() {
        return Err(FitError::NonFinite);
    }

    Ok(StintHealth {
        health_pct: health as u32,
        trend: Trend::Degrading { slope },
    })
}

/// Tyre health at `target_lap` from the lap-time trend of its stint.
///
/// `laps` are all laps of one driver. Returns `None` when the stint has too
/// few representative laps or the fit fails; the two cases are logged at
/// different levels.
pub fn estimate_stint_health(
    laps: &[LapRecord],
    target_lap: u32,
    cfg: &AnalysisConfig,
) -> Option<StintHealth> {
    match stint_health(laps, target_lap, cfg) {
        Ok(health) => Some(health),
        Err(e @ (FitError::Insufficient { .. } | FitError::TargetMissing(_))) => {
            debug!(target_lap, reason = %e, "stint health not available");
            None
        }
        Err(e) => {
            warn!(target_lap, error = %e, "stint health computation failed");
            None
        }
    }
}

/// Best lap against the sum of best sectors for one driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Consistency {
    pub actual_best: Duration,
    pub theoretical_best: Duration,
    /// Seconds left on track; negative only with inconsistent sector data.
    pub delta_s: f64,
    pub rating: f64,
}

/// `10 - delta * points_per_second`, clamped to [1, 10], one decimal with
/// halves going to the even digit.
pub fn rating_from_delta(delta_s: f64, points_per_second: f64) -> f64 {
    let rating = (10.0 - delta_s * points_per_second).clamp(1.0, 10.0);
    (rating * 10.0).round_ties_even() / 10.0
}

pub fn consistency(laps: &[LapRecord], cfg: &AnalysisConfig) -> Option<Consistency> {
    let valid = representative_laps(laps, cfg.quicklap_threshold);
    let Some(actual_best) = valid.iter().filter_map(|l| l.lap_time).min() else {
        debug!("no representative laps for consistency rating");
        return None;
    };

    let mut theoretical_best = Duration::ZERO;
    for sector in 0..3 {
        let Some(best) = valid.iter().filter_map(|l| l.sectors[sector]).min() else {
            debug!(sector = sector + 1, "no sector time for consistency rating");
            return None;
        };
        theoretical_best += best;
    }

    let delta_s = actual_best.as_secs_f64() - theoretical_best.as_secs_f64();
    let rating = rating_from_delta(delta_s, cfg.rating_points_per_second);
    if !rating.is_finite() {
        warn!(delta_s, "consistency rating is not finite");
        return None;
    }
    Some(Consistency { actual_best, theoretical_best, delta_s, rating })
}

/// 1.0..=10.0 score; every 0.1 s between the fastest lap and the best
/// sectors costs one point with the default config.
pub fn rate_driver_consistency(laps: &[LapRecord], cfg: &AnalysisConfig) -> Option<f64> {
    consistency(laps, cfg).map(|c| c.rating)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::{lap, stint};
    use crate::data::secs;
    use approx::assert_abs_diff_eq;

    fn cfg() -> AnalysisConfig {
        AnalysisConfig::default()
    }

    #[test]
    fn degrading_stint_reports_slope_and_health() {
        let laps = stint("NOR", 2, 12, &[89.1, 89.3, 89.6, 90.0]);
        let health = estimate_stint_health(&laps, 15, &cfg()).unwrap();

        let Trend::Degrading { slope } = health.trend else {
            panic!("expected degradation, got {:?}", health.trend);
        };
        assert_abs_diff_eq!(slope, 0.3, epsilon = 1e-9);
        assert_eq!(health.label(), "+0.300s/lap");
        // life 2.0 / 0.3 = 6.67 laps, 3 driven
        assert!((54..=55).contains(&health.health_pct), "{}", health.health_pct);
    }

    #[test]
    fn health_is_truncated_not_rounded() {
        let laps = stint("RUS", 1, 1, &[90.0, 90.25, 90.5, 90.75]);
        let health = estimate_stint_health(&laps, 4, &cfg()).unwrap();
        // life 2.0 / 0.25 = 8 laps, 3 driven: 62.5
        assert_eq!(health.health_pct, 62);
        assert_eq!(health.label(), "+0.250s/lap");
    }

    #[test]
    fn flat_stint_is_improving() {
        let laps = stint("VER", 1, 1, &[90.0, 90.0, 90.0, 90.0]);
        let health = estimate_stint_health(&laps, 4, &cfg()).unwrap();
        assert_eq!(health.health_pct, 100);
        assert_eq!(health.label(), "Improving");
    }

    #[test]
    fn fewer_than_three_valid_laps_is_not_available() {
        let mut laps = stint("LEC", 1, 1, &[90.0, 90.5, 91.0, 91.5]);
        laps[0].pit_out = true;
        laps[3].pit_in = true;
        assert_eq!(estimate_stint_health(&laps, 2, &cfg()), None);
    }

    #[test]
    fn other_stints_do_not_leak_into_the_fit() {
        let mut laps = stint("HAM", 1, 1, &[95.0, 94.0, 93.0]);
        laps.extend(stint("HAM", 2, 4, &[90.0, 90.2, 90.4]));
        let health = estimate_stint_health(&laps, 6, &cfg()).unwrap();
        assert!(matches!(health.trend, Trend::Degrading { .. }));
        assert_eq!(estimate_stint_health(&laps, 3, &cfg()).unwrap().label(), "Improving");
    }

    #[test]
    fn worn_tyres_clamp_to_zero() {
        let laps = stint("ALO", 1, 1, &[90.0, 90.5, 91.0, 91.5, 92.0, 92.5]);
        let health = estimate_stint_health(&laps, 6, &cfg()).unwrap();
        assert_eq!(health.health_pct, 0);
    }

    #[test]
    fn unknown_target_lap_is_not_available() {
        let laps = stint("SAI", 1, 1, &[90.0, 90.1, 90.2]);
        assert_eq!(estimate_stint_health(&laps, 40, &cfg()), None);
    }

    #[test]
    fn rating_table() {
        assert_eq!(rating_from_delta(0.0, 10.0), 10.0);
        assert_eq!(rating_from_delta(0.5, 10.0), 5.0);
        assert_eq!(rating_from_delta(1.2, 10.0), 1.0);
        assert_eq!(rating_from_delta(-0.1, 10.0), 10.0);
        assert_eq!(rating_from_delta(0.234, 10.0), 7.7);
    }

    #[test]
    fn rating_halves_round_to_even() {
        // 7.25 and 7.75 are exact in binary
        assert_eq!(rating_from_delta(2.75, 1.0), 7.2);
        assert_eq!(rating_from_delta(2.25, 1.0), 7.8);
    }

    #[test]
    fn rating_uses_best_sectors_across_laps() {
        let mut a = lap("PIA", 5, 1, 92.3);
        a.sectors = [secs(28.5), secs(34.6), secs(29.2)];
        let mut b = lap("PIA", 6, 1, 92.6);
        b.sectors = [secs(28.9), secs(34.2), secs(29.5)];
        let mut c = lap("PIA", 7, 1, 92.5);
        c.sectors = [secs(29.0), secs(34.4), secs(29.1)];

        let result = consistency(&[a, b, c], &cfg()).unwrap();
        assert_abs_diff_eq!(result.theoretical_best.as_secs_f64(), 91.8, epsilon = 1e-6);
        assert_abs_diff_eq!(result.delta_s, 0.5, epsilon = 1e-6);
        assert_eq!(result.rating, 5.0);
    }

    #[test]
    fn missing_sectors_or_laps_are_not_available() {
        let laps = stint("GAS", 1, 1, &[91.0, 91.2]);
        assert_eq!(rate_driver_consistency(&laps, &cfg()), None);
        assert_eq!(rate_driver_consistency(&[], &cfg()), None);
    }
}
