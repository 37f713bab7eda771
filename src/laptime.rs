use std::fmt;
use std::time::Duration;

// milliseconds are truncated, never rounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LapTimeParts {
    pub minutes: u64,
    pub seconds: u64,
    pub millis: u32,
}

impl From<Duration> for LapTimeParts {
    fn from(d: Duration) -> Self {
        let total = d.as_secs();
        Self {
            minutes: total / 60,
            seconds: total % 60,
            millis: d.subsec_millis(),
        }
    }
}

impl fmt::Display for LapTimeParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}.{:03}", self.minutes, self.seconds, self.millis)
    }
}

/// `M:SS.mmm`, or `N/A` for a missing time.
pub fn format_lap_time(time: Option<Duration>) -> String {
    time.map_or_else(|| "N/A".to_string(), |t| LapTimeParts::from(t).to_string())
}

pub fn lap_label(lap_number: u32, time: Option<Duration>) -> String {
    format!("Lap {lap_number} - {}", format_lap_time(time))
}
