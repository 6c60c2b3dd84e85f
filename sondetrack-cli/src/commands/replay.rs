//! Replay command - feed a recorded session through the tracker service.
//!
//! Recordings are plain text, one comma-separated record per line:
//!
//! ```text
//! # comment
//! T,<rfc3339>,name,lat,lon,alt,vs,hs,rssi     telemetry
//! L,<rfc3339>,lat,lon                         user location
//! P,<rfc3339>,lat,lon[,burst_lat,burst_lon]   landing prediction
//! C,<rfc3339>,mode,<explore|follow|final-approach>
//! C,<rfc3339>,pan | zoom,<level> | heading    operator input
//! ```
//!
//! Records are paced by their recorded spacing divided by `--speed` and
//! re-stamped with the time they are replayed. Map snapshots, mode changes
//! and a final status are printed to stdout as JSON lines.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sondetrack::config::{ConfigFile, TrackerConfig};
use sondetrack::geo::Coordinate;
use sondetrack::logging::init_logging;
use sondetrack::mode::{Mode, ModeChange};
use sondetrack::policy::MapStateSnapshot;
use sondetrack::prediction::LandingPrediction;
use sondetrack::service::{ServiceClock, TrackerEvent, TrackerService, TrackerStatus, UiCommand};
use sondetrack::telemetry::{InMemoryTrackStore, TelemetrySample};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::CliError;

/// Arguments for the replay command.
pub struct ReplayArgs {
    pub file: PathBuf,
    pub speed: f64,
    pub config: Option<PathBuf>,
}

/// One parsed line of a recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Recorded time, used only for pacing.
    pub at: DateTime<Utc>,
    pub event: TrackerEvent,
}

/// A line of JSON output.
#[derive(Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "kebab-case")]
enum OutputLine<'a> {
    Snapshot(&'a MapStateSnapshot),
    ModeChange(&'a ModeChange),
    Status(&'a TrackerStatus),
}

/// Run the replay command.
pub fn run(args: ReplayArgs) -> Result<(), CliError> {
    validate_speed(args.speed)?;

    let config = match &args.config {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };

    let _logging_guard = init_logging(&config.logging.directory, &config.logging.file)
        .map_err(CliError::LoggingInit)?;
    info!(
        version = sondetrack::VERSION,
        file = %args.file.display(),
        speed = args.speed,
        "Replay starting"
    );

    let text = fs::read_to_string(&args.file).map_err(|error| CliError::FileRead {
        path: args.file.clone(),
        error,
    })?;
    let records = parse_records(&text);
    info!(records = records.len(), "Recording loaded");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received shutdown signal, stopping replay...");
        signal.cancel();
    })
    .map_err(|e| CliError::Runtime(format!("Failed to set signal handler: {}", e)))?;

    let runtime = tokio::runtime::Runtime::new().map_err(|e| CliError::Runtime(e.to_string()))?;
    let status = runtime.block_on(replay(records, config.tracker, args.speed, shutdown))?;

    emit(&OutputLine::Status(&status))?;
    info!(?status, "Replay finished");
    Ok(())
}

/// Drive the service with `records` and print its output.
async fn replay(
    records: Vec<Record>,
    config: TrackerConfig,
    speed: f64,
    shutdown: CancellationToken,
) -> Result<TrackerStatus, CliError> {
    let settle = settle_period(&config);

    let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
    let (service, events) =
        TrackerService::new(config, Arc::new(InMemoryTrackStore::new()), snapshot_tx);
    let clock = service.clock();
    let status = service.status();
    let modes = service.subscribe_modes();

    let printer_done = CancellationToken::new();
    let printer = tokio::spawn(print_updates(snapshot_rx, modes, printer_done.clone()));
    let service_task = tokio::spawn(service.run(shutdown.clone()));

    let sent = feed(&records, &events, clock, speed, &shutdown).await;
    info!(sent, total = records.len(), "Recording replayed");

    // Let the last debounced updates publish
    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = tokio::time::sleep(settle) => {}
    }
    shutdown.cancel();
    drop(events);

    service_task
        .await
        .map_err(|e| CliError::Runtime(format!("Tracker service failed: {}", e)))?;

    printer_done.cancel();
    printer
        .await
        .map_err(|e| CliError::Runtime(format!("Output task failed: {}", e)))??;

    Ok(status.snapshot())
}

/// Long enough for a request made at the last record to publish.
fn settle_period(config: &TrackerConfig) -> Duration {
    let policy = &config.policy;
    policy.min_update_interval + policy.annotation_debounce.max(policy.camera_debounce)
}

/// Slowest accepted `--speed`.
const MIN_SPEED: f64 = 0.001;

fn validate_speed(speed: f64) -> Result<(), CliError> {
    if !(speed.is_finite() && speed >= MIN_SPEED) {
        return Err(CliError::InvalidArgument(format!(
            "--speed must be a number of at least {}, got {}",
            MIN_SPEED, speed
        )));
    }
    Ok(())
}

/// Recorded `offset` scaled by `speed`, or `None` if it does not fit a `Duration`.
fn paced(offset: Duration, speed: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(offset.as_secs_f64() / speed).ok()
}

/// Send `records` at their recorded pace. Returns how many were sent.
async fn feed(
    records: &[Record],
    events: &mpsc::Sender<TrackerEvent>,
    clock: ServiceClock,
    speed: f64,
    shutdown: &CancellationToken,
) -> usize {
    let Some(first) = records.first() else {
        return 0;
    };
    let start = Instant::now();
    let mut sent = 0;

    for record in records {
        let offset = (record.at - first.at).to_std().unwrap_or_default();
        let Some(due) = paced(offset, speed).and_then(|d| start.checked_add(d)) else {
            warn!(
                speed,
                offset_secs = offset.as_secs_f64(),
                "Record offset out of range, ending replay"
            );
            break;
        };

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep_until(due) => {}
        }

        let event = rebase(record.event.clone(), clock.now());
        if events.send(event).await.is_err() {
            warn!("Tracker service stopped, ending replay");
            break;
        }
        sent += 1;
    }

    sent
}

/// Re-stamp an event with the time it is replayed.
fn rebase(event: TrackerEvent, now: DateTime<Utc>) -> TrackerEvent {
    match event {
        TrackerEvent::Telemetry(mut sample) => {
            sample.timestamp = now;
            TrackerEvent::Telemetry(sample)
        }
        other => other,
    }
}

async fn print_updates(
    mut snapshots: mpsc::UnboundedReceiver<MapStateSnapshot>,
    mut modes: broadcast::Receiver<ModeChange>,
    done: CancellationToken,
) -> Result<(), CliError> {
    let mut modes_open = true;

    loop {
        tokio::select! {
            Some(snapshot) = snapshots.recv() => emit(&OutputLine::Snapshot(&snapshot))?,
            change = modes.recv(), if modes_open => match change {
                Ok(change) => emit(&OutputLine::ModeChange(&change))?,
                Err(RecvError::Lagged(missed)) => warn!(missed, "Mode change output lagged"),
                Err(RecvError::Closed) => modes_open = false,
            },
            _ = done.cancelled() => break,
        }
    }

    while let Ok(snapshot) = snapshots.try_recv() {
        emit(&OutputLine::Snapshot(&snapshot))?;
    }
    Ok(())
}

fn emit(line: &OutputLine<'_>) -> Result<(), CliError> {
    println!("{}", serde_json::to_string(line)?);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Recording parser
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a whole recording, logging and skipping bad lines.
pub fn parse_records(text: &str) -> Vec<Record> {
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        match parse_line(line) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(reason) => warn!(line = index + 1, %reason, "Skipping record"),
        }
    }
    records
}

/// Parse one line. Blank lines and `#` comments yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<Record>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    require(&fields, 2)?;
    let at = DateTime::parse_from_rfc3339(fields[1])
        .map_err(|e| format!("bad timestamp '{}': {}", fields[1], e))?
        .with_timezone(&Utc);

    let event = match fields[0] {
        "T" => {
            require(&fields, 9)?;
            TrackerEvent::Telemetry(TelemetrySample {
                sonde_name: fields[2].to_string(),
                latitude: number(&fields, 3, "latitude")?,
                longitude: number(&fields, 4, "longitude")?,
                altitude: number(&fields, 5, "altitude")?,
                vertical_speed: number(&fields, 6, "vertical speed")?,
                horizontal_speed: number(&fields, 7, "horizontal speed")?,
                signal_strength: number(&fields, 8, "signal strength")?,
                timestamp: at,
            })
        }
        "L" => {
            require(&fields, 4)?;
            TrackerEvent::Location(coordinate(&fields, 2)?)
        }
        "P" => {
            require(&fields, 4)?;
            let mut prediction = LandingPrediction::new(coordinate(&fields, 2)?);
            if fields.len() >= 6 {
                prediction = prediction.with_burst(coordinate(&fields, 4)?);
            }
            TrackerEvent::Prediction(prediction)
        }
        "C" => {
            require(&fields, 3)?;
            TrackerEvent::Command(command(&fields)?)
        }
        other => return Err(format!("unknown record type '{}'", other)),
    };

    Ok(Some(Record { at, event }))
}

fn command(fields: &[&str]) -> Result<UiCommand, String> {
    match fields[2] {
        "pan" => Ok(UiCommand::CameraPan),
        "heading" => Ok(UiCommand::ToggleHeading),
        "zoom" => {
            require(fields, 4)?;
            Ok(UiCommand::CameraZoom(number(fields, 3, "zoom")?))
        }
        "mode" => {
            require(fields, 4)?;
            let mode: Mode = fields[3].parse()?;
            Ok(UiCommand::SetMode(mode))
        }
        other => Err(format!("unknown command '{}'", other)),
    }
}

fn require(fields: &[&str], count: usize) -> Result<(), String> {
    if fields.len() < count {
        return Err(format!(
            "expected at least {} fields, found {}",
            count,
            fields.len()
        ));
    }
    Ok(())
}

fn number(fields: &[&str], index: usize, name: &str) -> Result<f64, String> {
    fields[index]
        .parse::<f64>()
        .map_err(|_| format!("bad {} '{}'", name, fields[index]))
}

fn coordinate(fields: &[&str], index: usize) -> Result<Coordinate, String> {
    Ok(Coordinate::new(
        number(fields, index, "latitude")?,
        number(fields, index + 1, "longitude")?,
    ))
}
