use std::io::BufRead;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::LevelFilter;

use frametrack_core::detection::domain::detector::Detector;
use frametrack_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use frametrack_core::pipeline::control::{ControlCommand, ControlHandle, PipelineControl, RunMode};
use frametrack_core::pipeline::pipeline_orchestrator::{OrchestratorConfig, PipelineOrchestrator};
use frametrack_core::shared::config::AppConfig;
use frametrack_core::video::domain::display::Display;
use frametrack_core::video::infrastructure::ffmpeg_source::FfmpegSource;
use frametrack_core::video::infrastructure::image_sequence_display::ImageSequenceDisplay;
use frametrack_core::video::infrastructure::log_display::LogDisplay;

/// Object detection and multi-object tracking for videos and cameras.
#[derive(Parser)]
#[command(name = "frametrack")]
struct Cli {
    /// JSON configuration file.
    config: PathBuf,

    /// Start in single-step mode (press Enter to advance).
    #[arg(long)]
    step: bool,

    /// Write annotated frames as PNG files into this directory instead of
    /// logging them.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Start with the box overlay turned off.
    #[arg(long)]
    no_overlay: bool,

    /// Override the number of frames allowed between source and display.
    #[arg(long)]
    max_in_flight: Option<usize>,
}

fn main() {
    let rust_log_set = init_logging();

    if let Err(e) = run(rust_log_set) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Installs the logger. `RUST_LOG` wins when set; otherwise the level starts
/// at `info` and is raised once the config asks for debug output.
fn init_logging() -> bool {
    let rust_log_set = std::env::var_os("RUST_LOG").is_some();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    if !rust_log_set {
        log::set_max_level(LevelFilter::Info);
    }
    rust_log_set
}

fn run(rust_log_set: bool) -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let mut config = AppConfig::load(&cli.config)?;
    if config.logging.debug && !rust_log_set {
        log::set_max_level(LevelFilter::Debug);
    }
    apply_overrides(&cli, &mut config);

    let detector: Box<dyn Detector> = Box::new(OnnxYoloDetector::new(
        &config.model.path,
        config.model.confidence_threshold,
        config.model.input_size(),
    )?);
    let source = Box::new(FfmpegSource::new(config.input_source()));
    let display = build_display(&cli)?;

    let (handle, control) = PipelineControl::channel();
    let orchestrator_config = OrchestratorConfig::from_app_config(&config);
    if orchestrator_config.mode == RunMode::SingleStep {
        log::info!("Single-step mode: press Enter to advance");
    }
    log::info!("Keys: q quit, c toggle continuous, Enter advance, b toggle boxes");
    spawn_keyboard(handle)?;

    let orchestrator =
        PipelineOrchestrator::new(source, detector, display, control, orchestrator_config);
    orchestrator.run()?;
    Ok(())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.config.exists() {
        return Err(format!("Config file not found: {}", cli.config.display()).into());
    }
    if cli.max_in_flight == Some(0) {
        return Err("--max-in-flight must be at least 1".into());
    }
    Ok(())
}

fn apply_overrides(cli: &Cli, config: &mut AppConfig) {
    if cli.step {
        config.pipeline.continuous = false;
    }
    if let Some(max) = cli.max_in_flight {
        config.pipeline.max_in_flight = max;
    }
}

fn build_display(cli: &Cli) -> Result<Box<dyn Display>, Box<dyn std::error::Error>> {
    let overlay = !cli.no_overlay;
    match &cli.output_dir {
        Some(dir) => {
            log::info!("Writing frames to {}", dir.display());
            Ok(Box::new(ImageSequenceDisplay::new(dir, overlay)?))
        }
        None => Ok(Box::new(LogDisplay::new(overlay))),
    }
}

/// Reads commands from stdin, one per line, until the pipeline goes away or
/// stdin closes.
fn spawn_keyboard(handle: ControlHandle) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("keyboard".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                let Some(command) = parse_command(&line) else {
                    log::warn!("Unknown command '{}'", line.trim());
                    continue;
                };
                if !handle.send(command) || command == ControlCommand::Quit {
                    break;
                }
            }
        })?;
    Ok(())
}

fn parse_command(line: &str) -> Option<ControlCommand> {
    match line.trim().to_lowercase().as_str() {
        "q" => Some(ControlCommand::Quit),
        "c" => Some(ControlCommand::ToggleMode),
        "b" => Some(ControlCommand::ToggleOverlay),
        "" => Some(ControlCommand::Advance),
        _ => None,
    }
}
