use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};

use motion_lab_rs::acquisition::SourceEvent;
use motion_lab_rs::analysis::ExperimentKind;
use motion_lab_rs::canvas::CharCanvas;
use motion_lab_rs::display::{format_report, ConsoleDisplay};
use motion_lab_rs::graph::GraphConfig;
use motion_lab_rs::rerun_logger::RerunLogger;
use motion_lab_rs::sensors::{load_trace, Feed, Profile, TaskSource};
use motion_lab_rs::session::{run, Command, RunOptions, Session, SessionConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    Simulated,
    Termux,
    Replay,
}

#[derive(Parser, Debug)]
#[command(name = "motion_lab")]
#[command(about = "Accelerometer experiments: free-fall distance, vertical direction, raw stream", long_about = None)]
struct Args {
    /// Experiment to run
    #[arg(long, value_enum, default_value = "distance")]
    experiment: ExperimentKind,

    /// Sensor source
    #[arg(long, value_enum, default_value = "simulated")]
    source: SourceKind,

    /// Simulated motion profile (default matches the experiment)
    #[arg(long, value_enum)]
    profile: Option<Profile>,

    /// Recorded trace for `--source replay` (.json or .json.gz)
    #[arg(long, value_name = "PATH")]
    replay: Option<PathBuf>,

    /// Delivery rate in Hz, 0 = unthrottled (default depends on the experiment)
    #[arg(long, value_name = "HZ")]
    rate: Option<f64>,

    /// Read the gravity-free channel
    #[arg(long, conflicts_with = "include_gravity")]
    exclude_gravity: bool,

    /// Read the gravity-inclusive channel
    #[arg(long)]
    include_gravity: bool,

    /// Draw the rolling acceleration graph
    #[arg(long)]
    graph: bool,

    /// Write a JSON status snapshot here every 2 seconds
    #[arg(long, value_name = "PATH")]
    status_file: Option<String>,

    /// Record to a Rerun .rrd file
    #[arg(long, value_name = "PATH")]
    rerun: Option<String>,

    /// Duration in seconds (0 = until `quit`)
    #[arg(long, default_value = "0")]
    duration: u64,

    /// Poll period for the Termux source
    #[arg(long, default_value = "50")]
    termux_period_ms: u64,
}

fn default_profile(experiment: ExperimentKind) -> Profile {
    match experiment {
        ExperimentKind::Distance => Profile::Throw,
        ExperimentKind::Vertical => Profile::Bounce,
        ExperimentKind::Raw => Profile::Idle,
    }
}

fn session_config(args: &Args) -> SessionConfig {
    let mut config = SessionConfig::for_experiment(args.experiment);
    if let Some(rate) = args.rate {
        config.acquisition.rate_hz = (rate > 0.0).then_some(rate);
    }
    if args.exclude_gravity {
        config.acquisition.exclude_gravity = true;
    } else if args.include_gravity {
        config.acquisition.exclude_gravity = false;
    }
    if args.graph && config.graph.is_none() {
        config.graph = Some(GraphConfig::default());
    }
    config
}

fn feed(args: &Args) -> Result<Feed> {
    Ok(match args.source {
        SourceKind::Simulated => Feed::Simulated(args.profile.unwrap_or(default_profile(args.experiment))),
        SourceKind::Termux => Feed::Termux {
            period_ms: args.termux_period_ms,
        },
        SourceKind::Replay => {
            let path = args
                .replay
                .as_ref()
                .context("--source replay needs --replay <PATH>")?;
            let trace = load_trace(path).with_context(|| format!("loading {}", path.display()))?;
            println!("[{}] Loaded {} recorded events", ts_now(), trace.len());
            Feed::Replay(Arc::new(trace))
        }
    })
}

/// Blocking stdin reader on its own thread so it never holds up shutdown.
fn spawn_command_reader(tx: UnboundedSender<Command>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match Command::parse(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => log::warn!("[SESSION] Unknown command: {}", line.trim()),
            }
        }
    });
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = session_config(&args);

    println!("[{}] Motion Lab Starting", ts_now());
    println!("  Experiment: {:?}", args.experiment);
    println!("  Source: {:?}", args.source);
    println!("  Rate: {:?} Hz", config.acquisition.rate_hz);
    println!("  Exclude gravity: {}", config.acquisition.exclude_gravity);
    println!("  Duration: {} seconds (0=until quit)", args.duration);
    println!("  Commands: restart, retry, calibrate <m>, pause, resume, reset, rate <hz>, gravity on|off, quit");

    let (event_tx, event_rx) = mpsc::channel::<SourceEvent>(500);
    let source = TaskSource::new(feed(&args)?, event_tx);
    let source_label = source.label();
    let graph_enabled = config.graph.is_some();
    let display = ConsoleDisplay::new(std::io::stdout(), config.precision);

    let mut session = Session::new(source, config, display);
    session.set_source_label(source_label);
    if graph_enabled {
        match CharCanvas::fit_terminal(2) {
            Ok(canvas) => session.set_canvas(canvas),
            Err(e) => log::warn!("[GRAPH] Terminal size unavailable, using default canvas: {}", e),
        }
    }
    if let Some(path) = &args.rerun {
        session.set_recorder(RerunLogger::new(path)?);
    }

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    spawn_command_reader(command_tx);

    let options = RunOptions {
        status_file: args.status_file.clone(),
        duration_ms: (args.duration > 0).then(|| args.duration * 1000),
        ..Default::default()
    };
    let elapsed_ms = run(&mut session, event_rx, command_rx, options).await?;

    // Print stats
    let status = session.snapshot(elapsed_ms);
    println!("\n=== Final Stats ===");
    println!("Samples delivered: {}", status.samples_delivered);
    println!("State: {}", status.state);
    if let Some(report) = session.analyzer().free_fall().and_then(|e| e.report()) {
        let errors = session.analyzer().free_fall().and_then(|e| e.calibration());
        println!("{}", format_report(report, errors));
    }
    if let Some(err) = &status.last_error {
        println!("Last error: {} ({} total)", err, status.error_count);
    }

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
