//! Reunite daemon: polls the report and video queues on an interval.
//!
//! The daemon shares the SQLite database with the upload-facing service and
//! is the only writer of match rows. Shutdown is cooperative: Ctrl-C (or
//! SIGINT from systemd) finishes the in-flight item before exiting.
//!
//! ## Usage
//!
//! ```bash
//! reunite-daemon              # Poll every 10 seconds
//! reunite-daemon --once       # Run one tick and exit
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use reunite::config::Config;
use reunite::db::Database;
use reunite::faces::OnnxEmbedder;
use reunite::logging;
use reunite::scheduler::Scheduler;
use reunite::video::FfmpegVideoSource;

#[derive(Default)]
struct DaemonArgs {
    /// Run one tick and exit.
    once: bool,
    /// Poll interval override (seconds).
    interval: Option<u64>,
    config_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    logging::init(None)?;
    info!("Reunite daemon starting...");

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Config::load()?,
    };

    let poll_interval =
        Duration::from_secs(args.interval.unwrap_or(config.matching.poll_interval_secs));

    info!(
        "Matching threshold: {:.0}%, frame skip: {}, poll interval: {}s",
        config.matching.confidence_threshold * 100.0,
        config.matching.frame_skip,
        poll_interval.as_secs()
    );

    let db = Database::open(&config.database.sqlite_path)?;
    db.initialize()?;
    info!("Database opened at {:?}", config.database.sqlite_path);

    if args.once {
        info!("Running in single-shot mode");
        let embedder = OnnxEmbedder::new();
        let source = FfmpegVideoSource::new();
        let outcome = Scheduler::new(&db, &embedder, &source, &config).tick();
        info!("Tick finished: {:?}", outcome);
    } else {
        let shutdown = Arc::new(AtomicBool::new(false));

        let flag = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                flag.store(true, Ordering::Relaxed);
            }
        });

        let flag = shutdown.clone();
        tokio::task::spawn_blocking(move || {
            let embedder = OnnxEmbedder::new();
            let source = FfmpegVideoSource::new();
            Scheduler::new(&db, &embedder, &source, &config).run(poll_interval, &flag);
        })
        .await
        .context("Scheduler task panicked")?;
    }

    info!("Reunite daemon stopped");
    Ok(())
}

fn parse_args() -> DaemonArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = DaemonArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--once" | "-1" => {
                parsed.once = true;
            }
            "--interval" | "-i" => {
                if i + 1 < args.len() {
                    if let Ok(interval) = args[i + 1].parse() {
                        parsed.interval = Some(interval);
                    }
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("reunite-daemon {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!(
        r#"reunite-daemon - Background queue processor for Reunite

USAGE:
    reunite-daemon [OPTIONS]

OPTIONS:
    --once, -1          Run one polling tick and exit
    --interval, -i N    Poll interval in seconds (default: from config, 10)
    --config, -c PATH   Path to config file
    --help, -h          Show this help message
    --version, -V       Show version

ENVIRONMENT:
    REUNITE_CONFIG      Path to config file (overrides default location)
    REUNITE_LOG         Log level (trace, debug, info, warn, error)

Each tick drains pending public reports, then pending video uploads.
"#
    );
}
