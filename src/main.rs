use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use wfgscope::dashboard::{ErrorBody, SimulateResponse};
use wfgscope::showcase;
use wfgscope::{
    Dashboard, DetectionMode, NoInjection, RingInjection, SnapshotProvider, StateFileProvider,
    SyntheticProvider, WatchEvent, Wfgscope,
};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Wfgscope - Wait-For Graph Deadlock Detector With Simulation Support"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// Activity log file ("{timestamp}" is replaced with the current time)
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    /// Persistent deadlock event log (JSON lines)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Read processes and allocations from a system state JSON file
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Synthetic inventory: number of processes
    #[arg(long, global = true, default_value_t = 8)]
    processes: usize,

    /// Synthetic inventory: number of resources
    #[arg(long, global = true, default_value_t = 5)]
    resources: usize,

    /// Synthetic inventory: telemetry seed
    #[arg(long, global = true, default_value_t = 42)]
    seed: u64,

    /// Evaluate waits-for edges as given instead of composing through holders
    #[arg(long, global = true)]
    direct: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print the current process table
    Processes,
    /// Run one simulation and print its result
    Simulate {
        /// Observation delay before injection, in milliseconds
        #[arg(long, default_value_t = 2000)]
        checking_ms: u64,
        /// Observation delay before detection, in milliseconds
        #[arg(long, default_value_t = 5000)]
        injecting_ms: u64,
        /// Number of processes wired into the injected ring
        #[arg(long, default_value_t = 3)]
        ring: usize,
        /// Only report what the provider already shows
        #[arg(long)]
        no_inject: bool,
    },
    /// Print the deadlock event log
    Logs {
        /// Most recent entry first
        #[arg(long)]
        recent_first: bool,
    },
    /// Detect once over the provider's current relation
    Detect,
    /// Detect periodically over the provider's current relation
    Watch {
        #[arg(long, default_value_t = 5)]
        interval_secs: u64,
        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,
    },
    /// Open the event log in the web viewer
    Showcase {
        #[arg(long, default_value = showcase::DEFAULT_VIEWER_URL)]
        viewer: String,
        /// Print the URL instead of opening a browser
        #[arg(long)]
        print: bool,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

fn fail(body: ErrorBody) -> Result<()> {
    print_json(&body)?;
    anyhow::bail!("{} ({})", body.error, body.status_code())
}

fn build(global: &GlobalArgs, command: &Command) -> Result<Dashboard> {
    let provider: Arc<dyn SnapshotProvider> = match &global.state {
        Some(path) => Arc::new(StateFileProvider::new(path)),
        None => Arc::new(SyntheticProvider::new(
            global.processes,
            global.resources,
            global.seed,
        )),
    };

    let mut builder = Wfgscope::new()
        .provider(provider)
        .detection_mode(if global.direct {
            DetectionMode::Direct
        } else {
            DetectionMode::Composed
        })
        .on_deadlock(|entry| eprintln!("Deadlock logged: {} at {}", entry.cycle, entry.timestamp));

    if let Some(path) = &global.log {
        builder = builder.with_log(path);
    }
    if let Some(path) = &global.store {
        builder = builder.with_store(path);
    }
    if let Command::Simulate {
        checking_ms,
        injecting_ms,
        ring,
        no_inject,
    } = command
    {
        builder = builder
            .checking_delay(Duration::from_millis(*checking_ms))
            .injecting_delay(Duration::from_millis(*injecting_ms));
        builder = if *no_inject {
            builder.injection(Arc::new(NoInjection))
        } else {
            builder.injection(Arc::new(RingInjection::new(*ring)))
        };
    }

    builder.start()
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let dashboard = build(&cli.global, &cli.command)?;

    let result = match cli.command {
        Command::Processes => match dashboard.processes() {
            Ok(processes) => print_json(&processes),
            Err(body) => fail(body),
        },
        Command::Simulate { .. } => {
            eprintln!("{}", wfgscope::BANNER);
            match dashboard.simulator().start() {
                Ok(handle) => {
                    for event in handle.events().iter() {
                        eprintln!("[{}] run {}: {}", event.timestamp, event.run_id, event.phase);
                    }
                    match handle.wait() {
                        Ok(outcome) => print_json(&SimulateResponse::from_outcome(outcome)),
                        Err(e) => fail(e.into()),
                    }
                }
                Err(e) => fail(e.into()),
            }
        }
        Command::Logs { recent_first } => {
            let log = dashboard.event_log();
            if recent_first {
                print_json(&log.list_recent_first())
            } else {
                print_json(&log.list())
            }
        }
        Command::Detect => match dashboard.watcher().tick() {
            Ok(report) => print_json(&report),
            Err(e) => fail(e.into()),
        },
        Command::Watch {
            interval_secs,
            ticks,
        } => {
            let handle = dashboard
                .watcher()
                .spawn(Duration::from_secs(interval_secs));
            let mut seen = 0;
            for event in handle.events().iter() {
                match event {
                    WatchEvent::Report(report) => print_json(&report)?,
                    WatchEvent::Failed { tick, error } => {
                        eprintln!("Watch tick {tick} failed: {error}")
                    }
                }
                seen += 1;
                if ticks.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
            handle.stop();
            Ok(())
        }
        Command::Showcase { viewer, print } => {
            let entries = dashboard.logs();
            if print {
                println!("{}", showcase::showcase_url(&viewer, &entries)?);
                Ok(())
            } else {
                showcase::showcase(&viewer, &entries)
            }
        }
    };

    dashboard.flush()?;
    if let Some(path) = wfgscope::current_log_file() {
        eprintln!("Activity log written to {}", path.display());
    }
    result
}
