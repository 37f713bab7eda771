// car and position feeds arrive on their own clocks. they are outer-joined
// on time, gaps filled by linear interpolation (flat at the edges), then put
// on a fixed step grid starting at the first sample.

use ndarray::{Array1, Array2, ArrayView1};
use std::time::Duration;

use crate::data::{Channel, TelemetryTable};
use crate::error::NoData;

pub const CAR_CHANNELS: [Channel; 7] = [
    Channel::Distance,
    Channel::Speed,
    Channel::Rpm,
    Channel::Gear,
    Channel::Throttle,
    Channel::Brake,
    Channel::Drs,
];

pub const POSITION_CHANNELS: [Channel; 2] = [Channel::X, Channel::Y];

// two hours at 16 ms
pub const DEFAULT_MAX_GRID_ROWS: usize = 450_000;

// both sources on the union of their timestamps, gaps filled
#[derive(Debug, Clone, PartialEq)]
pub struct MergedFrame {
    pub time: Vec<Duration>,
    pub channels: Vec<Channel>,
    /// One column per entry of `channels`, aligned with `time`.
    pub columns: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncedLap {
    pub time: Vec<Duration>,
    /// Seconds since the first grid point.
    pub elapsed_s: Array1<f64>,
    pub channels: Vec<Channel>,
    /// Rows are grid points, columns follow `channels`.
    pub values: Array2<f64>,
    pub step: Duration,
}

impl SyncedLap {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    fn column_index(&self, channel: Channel) -> Option<usize> {
        self.channels.iter().position(|c| *c == channel)
    }

    pub fn channel(&self, channel: Channel) -> Option<ArrayView1<'_, f64>> {
        self.column_index(channel).map(|i| self.values.column(i))
    }

    pub fn value(&self, row: usize, channel: Channel) -> Option<f64> {
        let col = self.column_index(channel)?;
        self.values.get((row, col)).copied()
    }

    pub fn duration_s(&self) -> f64 {
        self.elapsed_s.last().copied().unwrap_or(0.0)
    }
}

fn validate(table: &TelemetryTable, name: &'static str, required: &[Channel]) -> Result<(), NoData> {
    if table.is_empty() {
        return Err(NoData::EmptySource(name));
    }
    match required.iter().find(|c| !table.has_values(**c)) {
        Some(channel) => Err(NoData::MissingChannel { table: name, channel: *channel }),
        None => Ok(()),
    }
}

// known (time, value) points of one channel, time-ordered, first sample wins
// on duplicate timestamps
fn known_points(table: &TelemetryTable, channel: Channel) -> (Vec<Duration>, Vec<f64>) {
    let Some(values) = table.channel(channel) else {
        return (Vec::new(), Vec::new());
    };
    let mut points: Vec<(Duration, f64)> = table
        .time
        .iter()
        .zip(values)
        .filter_map(|(t, v)| v.map(|v| (*t, v)))
        .collect();
    points.sort_by_key(|(t, _)| *t);
    points.dedup_by_key(|(t, _)| *t);
    points.into_iter().unzip()
}

/// Linear interpolation of `(xs, ys)` at every target. Targets outside the
/// known range take the nearest end value; `xs` must be sorted.
fn interpolate_onto(xs: &[Duration], ys: &[f64], targets: &[Duration]) -> Vec<f64> {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(targets.len());
    let mut i = 0;
    for &t in targets {
        while i + 1 < n && xs[i + 1] <= t {
            i += 1;
        }
        let (x0, y0) = (xs[i], ys[i]);
        let value = if i + 1 < n && t > x0 {
            let (x1, y1) = (xs[i + 1], ys[i + 1]);
            let frac = (t - x0).as_secs_f64() / (x1 - x0).as_secs_f64();
            y0 + (y1 - y0) * frac
        } else {
            y0
        };
        out.push(value);
    }
    out
}

pub fn merge(car: &TelemetryTable, pos: &TelemetryTable) -> Result<MergedFrame, NoData> {
    validate(car, "car", &CAR_CHANNELS)?;
    validate(pos, "position", &POSITION_CHANNELS)?;

    let mut time: Vec<Duration> = car.time.iter().chain(&pos.time).copied().collect();
    time.sort_unstable();
    time.dedup();

    let sources = CAR_CHANNELS
        .iter()
        .map(|c| (car, *c))
        .chain(POSITION_CHANNELS.iter().map(|c| (pos, *c)));

    let mut channels = Vec::new();
    let mut columns = Vec::new();
    for (table, channel) in sources {
        let (xs, ys) = known_points(table, channel);
        channels.push(channel);
        columns.push(interpolate_onto(&xs, &ys, &time));
    }
    Ok(MergedFrame { time, channels, columns })
}

/// Joins a lap's car and position telemetry and resamples it to `step`.
///
/// Fails with [`NoData`] when either table is empty or lacks a required
/// channel; callers skip that lap. Output is deterministic.
pub fn resample_telemetry(
    car: &TelemetryTable,
    pos: &TelemetryTable,
    step: Duration,
) -> Result<SyncedLap, NoData> {
    resample_bounded(car, pos, step, DEFAULT_MAX_GRID_ROWS)
}

/// [`resample_telemetry`] with an explicit cap on grid rows.
pub fn resample_bounded(
    car: &TelemetryTable,
    pos: &TelemetryTable,
    step: Duration,
    max_rows: usize,
) -> Result<SyncedLap, NoData> {
    if step.is_zero() {
        return Err(NoData::ZeroStep);
    }
    let merged = merge(car, pos)?;
    let (Some(&start), Some(&end)) = (merged.time.first(), merged.time.last()) else {
        return Err(NoData::EmptySource("merged"));
    };

    // a stray session-clock timestamp would otherwise size the grid
    let rows = (end - start).as_nanos() / step.as_nanos() + 1;
    if rows > max_rows as u128 {
        return Err(NoData::GridTooLarge { rows, limit: max_rows });
    }

    let mut grid = Vec::with_capacity(rows as usize);
    let mut t = start;
    while t <= end {
        grid.push(t);
        t += step;
    }

    let mut values = Array2::<f64>::zeros((grid.len(), merged.channels.len()));
    for (col, series) in merged.columns.iter().enumerate() {
        let resampled = interpolate_onto(&merged.time, series, &grid);
        values.column_mut(col).assign(&Array1::from_vec(resampled));
    }
    let elapsed_s = grid.iter().map(|t| (*t - start).as_secs_f64()).collect();

    Ok(SyncedLap {
        time: grid,
        elapsed_s,
        channels: merged.channels,
        values,
        step,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    /// Car table with every channel following `f(t_seconds)`.
    pub fn car_table(times: &[Duration], f: impl Fn(f64) -> f64) -> TelemetryTable {
        let col: Vec<Option<f64>> = times.iter().map(|t| Some(f(t.as_secs_f64()))).collect();
        CAR_CHANNELS
            .iter()
            .fold(TelemetryTable::new(times.to_vec()), |t, c| t.with_channel(*c, col.clone()))
    }

    pub fn pos_table(times: &[Duration], f: impl Fn(f64) -> f64) -> TelemetryTable {
        let x: Vec<Option<f64>> = times.iter().map(|t| Some(f(t.as_secs_f64()))).collect();
        let y: Vec<Option<f64>> = x.iter().map(|v| v.map(|v| -v)).collect();
        TelemetryTable::new(times.to_vec())
            .with_channel(Channel::X, x)
            .with_channel(Channel::Y, y)
    }

    fn every(step_ms: u64, end_ms: u64) -> Vec<Duration> {
        (0..=end_ms / step_ms).map(|i| ms(i * step_ms)).collect()
    }

    #[test]
    fn ninety_second_lap_on_100ms_grid_has_901_rows() {
        let car_times = every(200, 90_000);
        let mut pos_times = every(270, 90_000);
        pos_times.push(ms(90_000));

        let car = car_table(&car_times, |t| 100.0 + t);
        let pos = pos_table(&pos_times, |t| 10.0 * t);
        let synced = resample_telemetry(&car, &pos, ms(100)).unwrap();

        assert_eq!(synced.len(), 901);
        assert_eq!(synced.elapsed_s[0], 0.0);
        assert!((synced.duration_s() - 90.0).abs() < 1e-9);
        assert!(synced.values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn channels_are_linear_between_samples() {
        let car = car_table(&[ms(0), ms(1000)], |t| 100.0 + 100.0 * t);
        let pos = pos_table(&[ms(0), ms(1000)], |t| t);
        let synced = resample_telemetry(&car, &pos, ms(250)).unwrap();

        let speed: Vec<f64> = synced.channel(Channel::Speed).unwrap().to_vec();
        assert_eq!(speed, vec![100.0, 125.0, 150.0, 175.0, 200.0]);
    }

    #[test]
    fn edges_are_filled_from_nearest_sample() {
        let car = car_table(&[ms(0), ms(500), ms(1000)], |t| t);
        let pos = pos_table(&[ms(300), ms(600)], |t| 10.0 * t);
        let synced = resample_telemetry(&car, &pos, ms(100)).unwrap();

        let close = |row, channel, expected: f64| {
            let v = synced.value(row, channel).unwrap();
            assert!((v - expected).abs() < 1e-9, "{channel} at row {row}: {v}");
        };
        close(0, Channel::X, 3.0);
        close(4, Channel::X, 4.0);
        close(10, Channel::X, 6.0);
        close(10, Channel::Y, -6.0);
    }

    #[test]
    fn table_already_on_grid_is_unchanged() {
        let times = every(100, 2_000);
        let car = car_table(&times, |t| (t * 3.0).sin() * 50.0);
        let pos = pos_table(&times, |t| t * t);
        let synced = resample_telemetry(&car, &pos, ms(100)).unwrap();

        assert_eq!(synced.time, times);
        for (row, t) in times.iter().enumerate() {
            let t = t.as_secs_f64();
            assert_eq!(synced.value(row, Channel::Rpm), Some((t * 3.0).sin() * 50.0));
            assert_eq!(synced.value(row, Channel::X), Some(t * t));
        }
    }

    #[test]
    fn grid_starts_at_first_sample_and_is_zero_based() {
        let car = car_table(&[ms(1200), ms(1400), ms(1600)], |t| t);
        let pos = pos_table(&[ms(1250), ms(1650)], |t| t);
        let synced = resample_telemetry(&car, &pos, ms(100)).unwrap();

        assert_eq!(synced.time.first(), Some(&ms(1200)));
        assert_eq!(synced.time.last(), Some(&ms(1600)));
        assert_eq!(synced.len(), 5);
        assert!((synced.elapsed_s[4] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn gaps_inside_one_channel_are_interpolated() {
        let times = [ms(0), ms(100), ms(200)];
        let car = car_table(&times, |t| t).with_channel(
            Channel::Brake,
            vec![Some(0.0), None, Some(100.0)],
        );
        let pos = pos_table(&times, |t| t);
        let merged = merge(&car, &pos).unwrap();
        let brake = merged
            .channels
            .iter()
            .position(|c| *c == Channel::Brake)
            .map(|i| merged.columns[i].clone())
            .unwrap();
        assert_eq!(brake, vec![0.0, 50.0, 100.0]);
    }

    #[test]
    fn missing_sources_and_channels_are_reported() {
        let times = [ms(0), ms(100)];
        let car = car_table(&times, |t| t);
        let pos = pos_table(&times, |t| t);

        assert_eq!(
            resample_telemetry(&TelemetryTable::default(), &pos, ms(100)),
            Err(NoData::EmptySource("car"))
        );
        assert_eq!(
            resample_telemetry(&car, &TelemetryTable::new(times.to_vec()), ms(100)),
            Err(NoData::MissingChannel { table: "position", channel: Channel::X })
        );
        let no_drs = car.clone().with_channel(Channel::Drs, vec![None, None]);
        assert_eq!(
            resample_telemetry(&no_drs, &pos, ms(100)),
            Err(NoData::MissingChannel { table: "car", channel: Channel::Drs })
        );
        assert_eq!(resample_telemetry(&car, &pos, Duration::ZERO), Err(NoData::ZeroStep));
    }

    #[test]
    fn stray_timestamp_is_rejected_before_allocating() {
        let times = [ms(0), ms(1_000), ms(1_000_000_000)];
        let car = car_table(&times, |t| t);
        let pos = pos_table(&times, |t| t);

        assert_eq!(
            resample_telemetry(&car, &pos, ms(16)),
            Err(NoData::GridTooLarge { rows: 62_500_001, limit: DEFAULT_MAX_GRID_ROWS })
        );
        // the limit is inclusive
        let short = [ms(0), ms(1_000)];
        let (car, pos) = (car_table(&short, |t| t), pos_table(&short, |t| t));
        assert_eq!(resample_bounded(&car, &pos, ms(100), 11).map(|l| l.len()), Ok(11));
        assert!(matches!(
            resample_bounded(&car, &pos, ms(100), 10),
            Err(NoData::GridTooLarge { rows: 11, limit: 10 })
        ));
    }

    #[test]
    fn unsorted_and_duplicate_timestamps_are_tolerated() {
        let car = car_table(&[ms(200), ms(0), ms(100), ms(100)], |t| t * 10.0);
        let pos = pos_table(&[ms(0), ms(200)], |t| t);
        let synced = resample_telemetry(&car, &pos, ms(50)).unwrap();
        assert_eq!(synced.len(), 5);
        assert_eq!(synced.value(2, Channel::Speed), Some(1.0));
    }
}
