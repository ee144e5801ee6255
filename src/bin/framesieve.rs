use std::{
    ffi::OsString,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use fern::colors::{Color, ColoredLevelConfig};
use framesieve::{
    DecoderLogLevel, ExtractionConfig, FfmpegOpener, FrameRange, FrameSource, ProcessLauncher,
    ProcessingMode, ProgressCallback, ProgressEvent, RunCoordinator, VideoFile, WorkerJob,
    WorkerStatus,
    config::{DEFAULT_CSV_LOG, DEFAULT_SESSION_FILE, WORKER_COUNT_CHOICES},
    format_eta, run_worker_process, sampling,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  framesieve extract input.mp4 --out frames --fps 2 --blur-threshold 40\n  framesieve extract input.mp4 --out frames --multicore --workers 8 --csv-log\n  framesieve probe input.mp4 --fps 2\n  framesieve completions zsh > _framesieve";

#[derive(Debug, Parser)]
#[command(
    name = "framesieve",
    version,
    about = "Extract the sharp frames of a video at a target sampling rate",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging output.
    #[arg(long)]
    verbose: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Parser, Clone)]
struct ExtractArgs {
    /// Input video path.
    video: PathBuf,
    /// Output directory for accepted frames (created if absent).
    #[arg(long)]
    out: PathBuf,
    /// Desired output rate in frames per second.
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..))]
    fps: u32,
    /// Keep frames whose sharpness is above this value (1.0 to 100.0).
    #[arg(long, default_value_t = 5.0, value_parser = parse_blur_threshold)]
    blur_threshold: f64,
    /// Ignore the saved session and start from frame 0.
    #[arg(long)]
    reset: bool,
    /// Split the video across parallel worker processes.
    #[arg(long)]
    multicore: bool,
    /// Number of workers with --multicore (4, 8, or 16).
    #[arg(long, default_value_t = 4, value_parser = parse_worker_count)]
    workers: usize,
    /// Run multicore workers as threads of this process.
    #[arg(long)]
    in_process: bool,
    /// Write a CSV summary of the run.
    #[arg(long)]
    csv_log: bool,
    /// Processing mode (cpu, gpu). GPU is reserved and decodes on the CPU.
    #[arg(long, default_value = "cpu")]
    mode: String,
    /// Session checkpoint path.
    #[arg(long, default_value = DEFAULT_SESSION_FILE)]
    session_file: PathBuf,
    /// CSV log path.
    #[arg(long, default_value = DEFAULT_CSV_LOG)]
    csv_path: PathBuf,
}

#[derive(Debug, Parser, Clone, PartialEq)]
struct WorkerArgs {
    #[arg(long)]
    id: usize,
    #[arg(long)]
    start: u64,
    #[arg(long)]
    end: u64,
    #[arg(long)]
    fps: u32,
    #[arg(long)]
    blur_threshold: f64,
    #[arg(long)]
    out: PathBuf,
    video: PathBuf,
}

impl WorkerArgs {
    fn into_job(self) -> WorkerJob {
        WorkerJob::new(
            self.id,
            self.video,
            self.out,
            FrameRange::new(self.start, self.end),
        )
        .with_target_fps(self.fps)
        .with_blur_threshold(self.blur_threshold)
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract sharp frames into a directory.
    #[command(
        about = "Extract sharp frames",
        after_help = "Examples:\n  framesieve extract input.mp4 --out frames --fps 2\n  framesieve extract input.mp4 --out frames --reset\n  framesieve extract input.mp4 --out frames --multicore --workers 16 --csv-log"
    )]
    Extract(ExtractArgs),

    /// Process one frame range and stream progress as JSON lines.
    #[command(hide = true)]
    Worker(WorkerArgs),

    /// Print frame rate, frame count, and sampling step.
    #[command(
        about = "Print video sampling information",
        visible_alias = "info",
        after_help = "Examples:\n  framesieve probe input.mp4\n  framesieve probe input.mp4 --fps 2 --json"
    )]
    Probe {
        /// Input video path.
        video: PathBuf,
        /// Target rate used to compute the sampling step.
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..))]
        fps: u32,
        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_blur_threshold(value: &str) -> Result<f64, String> {
    let threshold: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    if (1.0..=100.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(format!("must be between 1.0 and 100.0, got {threshold}"))
    }
}

fn parse_worker_count(value: &str) -> Result<usize, String> {
    let count: usize = value
        .trim()
        .parse()
        .map_err(|_| format!("`{value}` is not a whole number"))?;
    if WORKER_COUNT_CHOICES.contains(&count) {
        Ok(count)
    } else {
        Err(format!("must be one of {WORKER_COUNT_CHOICES:?}, got {count}"))
    }
}

fn parse_log_level(value: &str) -> Option<DecoderLogLevel> {
    match value.to_ascii_lowercase().as_str() {
        "quiet" => Some(DecoderLogLevel::Quiet),
        "fatal" | "panic" => Some(DecoderLogLevel::Fatal),
        "error" => Some(DecoderLogLevel::Error),
        "warning" | "warn" => Some(DecoderLogLevel::Warning),
        "info" => Some(DecoderLogLevel::Info),
        "debug" | "verbose" | "trace" => Some(DecoderLogLevel::Debug),
        _ => None,
    }
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(level) = &global.log_level {
        let parsed = parse_log_level(level).ok_or(format!("unsupported --log-level: {level}"))?;
        framesieve::set_decoder_log_level(parsed);
    }
    Ok(())
}

/// Install the `log` backend. Lines go to stderr, above the progress bars
/// when there are any; stdout is reserved for command output and the worker
/// protocol.
fn init_logger(
    global: &GlobalOptions,
    bars: Option<MultiProgress>,
) -> Result<(), Box<dyn std::error::Error>> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Cyan);
    let level = if global.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let dispatch = fern::Dispatch::new()
        .level(log::LevelFilter::Warn)
        .level_for("framesieve", level)
        .format(move |out, message, record| {
            if record.level() == log::Level::Info {
                out.finish(format_args!("{message}"))
            } else {
                out.finish(format_args!("{}: {message}", colors.color(record.level())))
            }
        });

    let dispatch = match bars {
        Some(bars) => dispatch.chain(fern::Output::call(move |record| {
            let line = record.args().to_string();
            if bars.is_hidden() || bars.println(&line).is_err() {
                eprintln!("{line}");
            }
        })),
        None => dispatch.chain(std::io::stderr()),
    };

    dispatch.apply()?;
    Ok(())
}

fn overall_message(percent: u8, eta: Option<std::time::Duration>) -> String {
    match eta {
        Some(eta) => format!("{percent}% | ETA: {}", format_eta(eta.as_secs())),
        None => format!("{percent}% | ETA: estimating"),
    }
}

/// Renders progress events as indicatif bars.
struct TerminalProgress {
    bars: MultiProgress,
    overall: Mutex<Option<ProgressBar>>,
    workers: Mutex<Vec<ProgressBar>>,
}

impl TerminalProgress {
    fn new(bars: MultiProgress) -> Self {
        Self {
            bars,
            overall: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template("{prefix:>12} {bar:40.cyan/blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-")
    }

    fn add_bar(&self, prefix: String) -> ProgressBar {
        let bar = self.bars.add(ProgressBar::new(100));
        bar.set_style(Self::style());
        bar.set_prefix(prefix);
        bar
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            // Status lines reach the terminal through the logger.
            ProgressEvent::Status(_) => {}
            ProgressEvent::WorkersStarted { worker_count } => {
                let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
                for worker_id in 0..*worker_count {
                    let bar = self.add_bar(format!("[Worker {worker_id}]"));
                    bar.set_message(WorkerStatus::Starting.to_string());
                    workers.push(bar);
                }
            }
            ProgressEvent::Worker { worker_id, status } => {
                let workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(bar) = workers.get(*worker_id) {
                    if let WorkerStatus::Running { percent, .. } = status {
                        bar.set_position(u64::from(*percent));
                    }
                    bar.set_message(status.to_string());
                }
            }
            ProgressEvent::Overall { percent, eta, .. } => {
                let mut overall = self.overall.lock().unwrap_or_else(PoisonError::into_inner);
                let bar = overall.get_or_insert_with(|| self.add_bar("progress".to_string()));
                bar.set_position(u64::from(*percent));
                bar.set_message(overall_message(*percent, *eta));
            }
            ProgressEvent::Finished { .. } => {
                let overall = self.overall.lock().unwrap_or_else(PoisonError::into_inner);
                let workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
                for bar in overall.iter().chain(workers.iter()) {
                    bar.finish_with_message("Done");
                }
            }
        }
    }
}

/// Global flags forwarded to worker processes, followed by the hidden
/// subcommand.
fn worker_process_launcher(
    global: &GlobalOptions,
) -> Result<ProcessLauncher, Box<dyn std::error::Error>> {
    let mut args: Vec<OsString> = Vec::new();
    if global.verbose {
        args.push("--verbose".into());
    }
    if let Some(level) = &global.log_level {
        args.push("--log-level".into());
        args.push(level.into());
    }
    args.push("worker".into());
    Ok(ProcessLauncher::new(std::env::current_exe()?).with_args(args))
}

fn extract(global: &GlobalOptions, args: ExtractArgs) -> Result<(), Box<dyn std::error::Error>> {
    let bars = MultiProgress::new();
    init_logger(global, Some(bars.clone()))?;

    let mode: ProcessingMode = args.mode.parse()?;
    if mode == ProcessingMode::Gpu {
        log::warn!("GPU mode is reserved; decoding on the CPU");
    }

    let config = ExtractionConfig::new(&args.video, &args.out)
        .with_target_fps(args.fps)
        .with_blur_threshold(args.blur_threshold)
        .with_reset(args.reset)
        .with_multicore(args.multicore)
        .with_worker_count(args.workers)
        .with_csv_log(args.csv_log)
        .with_processing_mode(mode)
        .with_session_file(&args.session_file)
        .with_csv_path(&args.csv_path);

    let mut coordinator =
        RunCoordinator::new(config).with_progress(Arc::new(TerminalProgress::new(bars)));
    if args.multicore && !args.in_process {
        coordinator = coordinator.with_launcher(Arc::new(worker_process_launcher(global)?));
    }

    let result = coordinator.run()?;
    if !result.all_completed() {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            "some workers did not finish; their counts are partial".yellow()
        );
    }
    println!(
        "{} {} frames to {}",
        "saved".green().bold(),
        result.total_saved,
        args.out.display()
    );
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Extract(args) => extract(&cli.global, args)?,
        Commands::Worker(args) => {
            init_logger(&cli.global, None)?;
            run_worker_process(args.into_job(), &FfmpegOpener)?;
        }
        Commands::Probe { video, fps, json } => {
            let source = VideoFile::open(&video)?;
            let native_fps = source.frames_per_second();
            let step = sampling::step(native_fps, fps);
            if json {
                let payload = json!({
                    "path": video.display().to_string(),
                    "width": source.width(),
                    "height": source.height(),
                    "fps": native_fps,
                    "frame_count": source.frame_count(),
                    "target_fps": fps,
                    "step": step,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("{} {}", "path".cyan().bold(), video.display());
                println!(
                    "{} {}x{}",
                    "size".cyan().bold(),
                    source.width(),
                    source.height()
                );
                println!("{} {native_fps:.3}", "fps".cyan().bold());
                println!("{} {}", "frames".cyan().bold(), source.frame_count());
                println!("{} every {step} frames at {fps} fps", "sampling".cyan().bold());
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "framesieve", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
