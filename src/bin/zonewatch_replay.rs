//! Zonewatch replay tool
//!
//! Replays a recorded position trace against a zone file and prints the
//! resulting events as JSON lines.
//!
//! ```text
//! zonewatch-replay --zones zones.json --samples trace.jsonl --kinds entered,exited
//! ```
//!
//! Each trace line is a position sample:
//! `{"position": {"lat": 28.61, "lng": 77.21}, "timestamp": "2024-05-01T10:00:00Z"}`.

use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use zonewatch::{
    BundledZones, EventKind, GeofenceConfig, Geofencer, MonitoringSession, PositionSample, SessionOptions,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON array of zone records
    #[arg(long)]
    zones: PathBuf,

    /// JSON-lines position trace (stdin when omitted)
    #[arg(long)]
    samples: Option<PathBuf>,

    /// JSON engine configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated event kinds to print (all when omitted)
    #[arg(long, value_delimiter = ',', value_parser = parse_kind)]
    kinds: Vec<EventKind>,

    /// Print a transition summary to stderr at the end
    #[arg(long, default_value_t = false)]
    summary: bool,
}

fn parse_kind(s: &str) -> Result<EventKind, String> {
    EventKind::ALL
        .into_iter()
        .find(|kind| kind.to_string() == s)
        .ok_or_else(|| {
            let names: Vec<String> = EventKind::ALL.iter().map(ToString::to_string).collect();
            format!("unknown event kind '{s}' (expected one of: {})", names.join(", "))
        })
}

fn load_config(path: Option<&PathBuf>) -> Result<GeofenceConfig, Box<dyn Error>> {
    match path {
        Some(path) => {
            let config: GeofenceConfig = serde_json::from_reader(BufReader::new(File::open(path)?))?;
            Ok(config)
        }
        None => Ok(GeofenceConfig::default()),
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let config = load_config(cli.config.as_ref())?;
    let bundle = BundledZones::from_path(&cli.zones)?.named("replay");
    let geofencer = Geofencer::builder().config(config).bundled(Arc::new(bundle)).build()?;

    let origin = geofencer.load_zones(None);
    log::info!("loaded {} zones from {origin}", geofencer.get_zones().len());

    let events = geofencer.stream(&cli.kinds);
    let transitions = geofencer.transition_log();
    let session = MonitoringSession::detached(
        Arc::clone(geofencer.store()),
        Arc::clone(geofencer.bus()),
        SessionOptions::from(geofencer.config()),
    );

    let input: Box<dyn BufRead> = match &cli.samples {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let mut out = BufWriter::new(io::stdout().lock());

    for (index, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sample: PositionSample = match serde_json::from_str(&line) {
            Ok(sample) => sample,
            Err(e) => {
                log::warn!("line {}: skipping unparseable sample: {e}", index + 1);
                continue;
            }
        };
        session.on_sample(&sample);
        for event in events.drain() {
            serde_json::to_writer(&mut out, &event)?;
            out.write_all(b"\n")?;
        }
    }
    out.flush()?;

    if cli.summary {
        let records = transitions.records();
        eprintln!(
            "{} events published, {} transitions, primary zone: {}",
            session.events_published(),
            records.len(),
            session.primary_zone().map_or_else(|| "none".to_string(), |id| id.to_string()),
        );
        for record in records {
            eprintln!("  {} {:?} {} ({})", record.at, record.kind, record.zone_id, record.zone_name);
        }
    }
    geofencer.stop_monitoring(session);
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
