use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use apex_telemetry::comparison::{corner_window, find_corner, track_heatmap, Comparison, TRACE_CHANNELS};
use apex_telemetry::laptime::format_lap_time;
use apex_telemetry::model::{consistency, estimate_stint_health};
use apex_telemetry::motec::export_batch;
use apex_telemetry::overview::event_overview;
use apex_telemetry::replay::Replay;
use apex_telemetry::strategy::{average_stint_lengths, strategy_chart};
use apex_telemetry::{AnalysisConfig, Channel, Session, SessionCache, SessionKey};

#[derive(Parser, Debug)]
#[command(name = "apex-telemetry", version, about = "Tyre, consistency and telemetry analysis for F1 sessions")]
struct Cli {
    /// Directory holding <year>/<event>/<session> exports.
    #[arg(long, default_value = "data")]
    root: PathBuf,
    #[arg(long)]
    year: u16,
    #[arg(long)]
    event: String,
    /// FP1, FP2, FP3, Q, S or R.
    #[arg(long, default_value = "R")]
    session: String,
    /// JSON file overriding the analysis constants.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fastest lap, circuit length and track map size.
    Overview,
    /// Stint bars per driver and average stint length per compound.
    Stints,
    /// Tyre health at a lap.
    Health {
        #[arg(long)]
        driver: String,
        #[arg(long)]
        lap: u32,
    },
    /// Consistency rating for one driver, or every driver.
    Rating {
        #[arg(long)]
        driver: Option<String>,
    },
    /// Ghost-car replay of fastest laps.
    Replay {
        #[arg(long, value_delimiter = ',', required = true)]
        drivers: Vec<String>,
        /// Seconds into the replay to print.
        #[arg(long, default_value_t = 0.0)]
        at: f64,
    },
    /// One channel against distance for several drivers' fastest laps.
    Compare {
        #[arg(long, value_delimiter = ',', required = true)]
        drivers: Vec<String>,
        /// Speed, Throttle, Brake, RPM, nGear or DRS.
        #[arg(long, default_value = "Speed", value_parser = parse_channel)]
        channel: Channel,
        /// Corner label such as 4 or 4a; zooms to 400 m either side.
        #[arg(long)]
        corner: Option<String>,
    },
    /// MoTeC CSV export.
    Export {
        #[arg(long, value_delimiter = ',', required = true)]
        driver: Vec<String>,
        /// Defaults to each driver's fastest lap.
        #[arg(long)]
        lap: Option<u32>,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

fn parse_channel(name: &str) -> Result<Channel, String> {
    Channel::from_column(name)
        .filter(|c| TRACE_CHANNELS.contains(c))
        .ok_or_else(|| format!("unknown channel `{name}`"))
}

fn or_na(value: Option<f64>, unit: &str) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v} {unit}"))
}

fn print_overview(session: &Session) {
    let overview = event_overview(session);
    println!("{} - {}", overview.event_name, overview.session_name);
    match &overview.fastest {
        Some(f) => println!(
            "Fastest lap: {} ({}) {} on lap {}, {}",
            f.driver,
            f.team,
            f.formatted_time(),
            f.lap_number,
            f.compound
        ),
        None => println!("Fastest lap: N/A"),
    }
    let weather = overview.weather.as_ref();
    println!(
        "Track temp: {}  Air temp: {}  Humidity: {}",
        or_na(weather.and_then(|w| w.track_temp_c), "°C"),
        or_na(weather.and_then(|w| w.air_temp_c), "°C"),
        or_na(weather.and_then(|w| w.humidity_pct), "%")
    );
    match overview.circuit_length_km {
        Some(km) => println!("Circuit length: {km:.3} km"),
        None => println!("Circuit length: N/A"),
    }
    if let Some(track) = &overview.track {
        println!("Track map: {} points, {} corners", track.outline.len(), track.corners.len());
    }
}

fn print_stints(session: &Session) {
    let drivers: Vec<&str> = session.laps.drivers().collect();
    for bar in strategy_chart(&session.laps, &drivers) {
        let label = bar.label().map(String::from).unwrap_or_default();
        println!(
            "{:<4} stint {} laps {:>2}-{:<2} {:<12} {}",
            bar.driver,
            bar.stint,
            bar.start_lap,
            bar.end_lap,
            bar.compound.to_string(),
            label
        );
    }
    println!("\nAverage stint length:");
    for (compound, avg) in average_stint_lengths(&session.laps) {
        println!("- {compound}: {avg:.1} laps");
    }
}

fn print_rating(session: &Session, driver: &str, cfg: &AnalysisConfig) -> Result<()> {
    let laps = session.laps.driver(driver)?;
    match consistency(laps, cfg) {
        Some(c) => println!(
            "{driver}: {:.1}/10 (best {}, theoretical {}, delta {:.3}s)",
            c.rating,
            format_lap_time(Some(c.actual_best)),
            format_lap_time(Some(c.theoretical_best)),
            c.delta_s
        ),
        None => println!("{driver}: N/A"),
    }
    Ok(())
}

fn print_comparison(session: &Session, drivers: &[String], channel: Channel, corner: Option<&str>) -> Result<()> {
    let drivers: Vec<&str> = drivers.iter().map(String::as_str).collect();
    let comparison = Comparison::build(session, &drivers, channel);
    if comparison.traces.is_empty() {
        anyhow::bail!("no driver has `{channel}` telemetry");
    }

    let window = match corner {
        Some(label) => {
            let corner = find_corner(&session.info.corners, label)
                .with_context(|| format!("no corner `{label}` in circuit info"))?;
            let window = corner_window(corner, comparison.max_distance);
            println!("Turn {}: {:.0}-{:.0} m", corner.label(), window.0, window.1);
            window
        }
        None => (0.0, comparison.max_distance),
    };

    for trace in &comparison.traces {
        let values: Vec<f64> = trace.within(window).map(|(_, v)| *v).collect();
        if values.is_empty() {
            println!("{:<4} {channel}: N/A", trace.driver);
            continue;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        println!(
            "{:<4} lap {:>2} {channel}: min {min:.1} max {max:.1} mean {mean:.1} ({} samples)",
            trace.driver,
            trace.lap_number,
            values.len()
        );
        match track_heatmap(session, &trace.driver, channel) {
            Ok(map) => {
                if let Some((lo, hi)) = map.value_range() {
                    println!("     heatmap {}: {} points, {lo:.1}..{hi:.1}", map.channel, map.points.len());
                }
            }
            Err(e) => println!("     heatmap: N/A ({e})"),
        }
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let cfg = match &cli.config {
        Some(path) => AnalysisConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };

    let mut cache = SessionCache::new(&cli.root);
    let key = SessionKey::new(cli.year, cli.event.as_str(), cli.session.as_str());
    let session = cache.get_or_load(&key).with_context(|| format!("loading session {key}"))?;

    match cli.command {
        Command::Overview => print_overview(&session),
        Command::Stints => print_stints(&session),
        Command::Health { driver, lap } => {
            let laps = session.laps.driver(&driver)?;
            let health = estimate_stint_health(laps, lap, &cfg);
            match health {
                Some(h) => println!("{driver} lap {lap}: {}% ({})", h.health_pct, h.label()),
                None => println!("{driver} lap {lap}: N/A"),
            }
        }
        Command::Rating { driver: Some(driver) } => print_rating(&session, &driver, &cfg)?,
        Command::Rating { driver: None } => {
            for driver in session.laps.drivers() {
                print_rating(&session, driver, &cfg)?;
            }
        }
        Command::Replay { drivers, at } => {
            let drivers: Vec<&str> = drivers.iter().map(String::as_str).collect();
            let replay = Replay::build(&session, &drivers, &cfg);
            if replay.cars.is_empty() {
                anyhow::bail!("no driver has usable telemetry");
            }
            println!("Replay length: {:.1}s at t = {at:.1}s", replay.duration_s());
            for car in replay.frame_at(at) {
                println!(
                    "{:<4} {:>5.0} km/h gear {} throttle {:>3.0}% brake {:>3.0}% at ({:.0}, {:.0})",
                    car.driver, car.speed, car.gear, car.throttle, car.brake, car.position.x, car.position.y
                );
            }
            if let [a, b, ..] = drivers.as_slice() {
                if let Some(gap) = replay.gap_m(a, b, at) {
                    println!("Gap {a}-{b}: {gap:.1} m");
                }
            }
        }
        Command::Compare { drivers, channel, corner } => {
            print_comparison(&session, &drivers, channel, corner.as_deref())?
        }
        Command::Export { driver, lap, out } => {
            std::fs::create_dir_all(&out).with_context(|| format!("creating {}", out.display()))?;
            let requests: Vec<(&str, Option<u32>)> = driver.iter().map(|d| (d.as_str(), lap)).collect();
            let written = export_batch(&session, &requests, &cfg, &out);
            for path in &written {
                println!("Wrote {}", path.display());
            }
            if written.is_empty() {
                anyhow::bail!("nothing exported");
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    run(Cli::parse())
}
