//! Reunite CLI: one-shot processing of the matching queues.
//!
//! The long-running polling mode lives in the `reunite-daemon` binary; this
//! binary runs a single pass and exits, which is what cron jobs and manual
//! reprocessing want.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use reunite::config::Config;
use reunite::db::Database;
use reunite::faces::OnnxEmbedder;
use reunite::logging;
use reunite::pipeline::{ReportPipeline, VideoPipeline};
use reunite::video::FfmpegVideoSource;

enum Command {
    Reports,
    Videos,
    Video(i64),
}

struct CliArgs {
    command: Command,
    config_path: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = parse_args();

    logging::init(None)?;

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Config::load()?,
    };

    let db = Database::open(&config.database.sqlite_path)?;
    db.initialize()?;
    info!("Database opened at {:?}", config.database.sqlite_path);

    let embedder = OnnxEmbedder::new();
    let source = FfmpegVideoSource::new();

    match args.command {
        Command::Reports => {
            let handled = ReportPipeline::new(&db, &embedder, &config).process_pending()?;
            println!("Processed {} report(s)", handled);
        }
        Command::Videos => {
            let handled =
                VideoPipeline::new(&db, &embedder, &source, &config).process_pending()?;
            println!("Processed {} video(s)", handled);
        }
        Command::Video(id) => {
            VideoPipeline::new(&db, &embedder, &source, &config).process_video(id)?;
            println!("Processed video {}", id);
        }
    }

    Ok(())
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut command = None;
    let mut config_path = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "reports" => command = Some(Command::Reports),
            "videos" => command = Some(Command::Videos),
            "video" => {
                if i + 1 < args.len() {
                    match args[i + 1].parse() {
                        Ok(id) => command = Some(Command::Video(id)),
                        Err(_) => {
                            eprintln!("Invalid video id: {}", args[i + 1]);
                            std::process::exit(1);
                        }
                    }
                    i += 1;
                } else {
                    eprintln!("Missing video id");
                    std::process::exit(1);
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("reunite {}", env!("CARGO_PKG_VERSION"));
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

    let Some(command) = command else {
        print_help();
        std::process::exit(1);
    };

    CliArgs { command, config_path }
}

fn print_help() {
    println!(
        r#"reunite - Face matching for missing-person cases

USAGE:
    reunite <COMMAND> [OPTIONS]

COMMANDS:
    reports        Process all pending public reports once
    videos         Process all pending video uploads once
    video <id>     Process a single video by id

OPTIONS:
    --config, -c PATH   Path to config file
    --help, -h          Show this help message
    --version, -V       Show version

ENVIRONMENT:
    REUNITE_CONFIG      Path to config file (overrides default location)
    REUNITE_LOG         Log level (trace, debug, info, warn, error)

For continuous polling run reunite-daemon instead.
"#
    );
}
