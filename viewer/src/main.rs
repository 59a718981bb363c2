mod controller;
mod display;
mod input;
mod motion;
mod pipeline;
mod render;
mod source;

use controller::{Controller, ControllerSettings, StopReason};
use display::ffplay::FfplaySink;
use display::snapshot::SnapshotSink;
use display::DisplaySink;
use heatmap_common::config::{Config, DisplayKind};
use input::{CrlfWriter, TerminalKeys};
use pipeline::{Pipeline, PipelineSettings};
use source::ffmpeg::{check_tool_available, FfmpegOpener};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing::{error, info};

const DEFAULT_CONFIG: &str = "heatmap.toml";

fn load_config() -> Result<Config, String> {
    match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => Config::load(&path)
            .map_err(|e| format!("Failed to load config from {}: {e}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => Config::load(Path::new(DEFAULT_CONFIG))
            .map_err(|e| format!("Failed to load config from {DEFAULT_CONFIG}: {e}")),
        None => Ok(Config::default()),
    }
}

fn main() {
    let config = match load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Keys are read in raw mode, so log lines need explicit carriage returns.
    let writer = if std::io::stdin().is_terminal() {
        BoxMakeWriter::new(|| CrlfWriter(std::io::stderr()))
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        default_source = ?config.source.default,
        files = config.source.files.len(),
        modes = config.mode_count(),
        reset_threshold = config.pipeline.reset_threshold,
        display = ?config.display.kind,
        "starting motion heatmap viewer"
    );
    info!("keys: SPACE mode, m clear, t toggle source, y next file, q/ESC quit");

    check_tool_available("ffmpeg");

    let display: Box<dyn DisplaySink> = match config.display.kind {
        DisplayKind::Ffplay => {
            check_tool_available("ffplay");
            Box::new(FfplaySink::new())
        }
        DisplayKind::Snapshots => Box::new(SnapshotSink::new(
            config.display.snapshot_dir.clone(),
            config.display.snapshot_every,
        )),
    };

    let input = match TerminalKeys::open() {
        Ok(input) => input,
        Err(e) => {
            error!(error = %e, "failed to start keyboard reader");
            std::process::exit(1);
        }
    };

    let pipeline = match Pipeline::start(
        FfmpegOpener::new(&config.source),
        display,
        input,
        Controller::new(ControllerSettings::from(&config)),
        PipelineSettings::from(&config),
    ) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "failed to start pipeline");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    match pipeline.run() {
        Ok(StopReason::Quit) | Ok(StopReason::DisplayClosed) => {
            info!("viewer exited");
        }
        Ok(StopReason::CameraDisconnected) => {
            eprintln!("Camera disconnected!");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
