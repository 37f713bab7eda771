pub mod cache;
pub mod comparison;
pub mod config;
pub mod data;
pub mod error;
pub mod laptime;
pub mod model;
pub mod motec;
pub mod overview;
pub mod replay;
pub mod resample;
pub mod strategy;
pub mod track;
pub mod weather;

pub use cache::{SessionCache, SessionKey};
pub use config::AnalysisConfig;
pub use data::{Channel, Compound, LapRecord, LapTable, Session, TelemetryTable};
pub use error::{ConfigError, DataError, ExportError, NoData};
pub use laptime::{format_lap_time, lap_label};
pub use model::{estimate_stint_health, rate_driver_consistency, StintHealth, Trend};
pub use resample::{resample_telemetry, SyncedLap};
pub use weather::{WeatherSample, WeatherTable};
