use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use lecture2slides::{
    BatchCoordinator, BatchOptions, BatchReport, CancellationToken, DEFAULT_THRESHOLD,
    ExtractOptions, FfmpegLogLevel, ProgressCallback, ProgressFactory, ProgressInfo, SlideBounds,
    SlideError, SlideExtractor, SlideSettings, VideoOutcome, VideoTask,
    configuration::DEFAULT_BATCH_OUTPUT,
};
use serde_json::{Value, json};
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

const CLI_AFTER_HELP: &str = "Examples:\n  lecture2slides convert lecture.mp4 --save-initial\n  lecture2slides convert lecture.mp4 --left 0 --top 0 --right 1280 --bottom 720 --output deck.pdf\n  lecture2slides batch course/ --processes 4 --output decks\n  lecture2slides batch course/ --json > report.json\n  lecture2slides completions zsh > _lecture2slides";

#[derive(Debug, Parser)]
#[command(
    name = "lecture2slides",
    version,
    about = "Turn recorded lectures into slide-deck PDFs",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging.
    #[arg(long, global = true)]
    verbose: bool,

    /// Hide progress bars.
    #[arg(long, global = true)]
    quiet: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true, default_value_t = FfmpegLogLevel::Quiet)]
    log_level: FfmpegLogLevel,

    /// Base directory for temporary frame files (default: system temp dir).
    #[arg(long, global = true)]
    temp_dir: Option<PathBuf>,
}

/// Detection options shared by `convert` and `batch`.
#[derive(Debug, Args, Clone)]
struct DetectionArgs {
    /// Similarity below which a frame counts as a new slide (0 < t < 1).
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,

    /// Always keep the first sampled frame.
    #[arg(long)]
    save_initial: bool,

    /// Left edge of the slide area, in pixels.
    #[arg(long, default_value_t = SlideBounds::default().left)]
    left: u32,

    /// Top edge of the slide area, in pixels.
    #[arg(long, default_value_t = SlideBounds::default().top)]
    top: u32,

    /// Right edge of the slide area (exclusive), in pixels.
    #[arg(long, default_value_t = SlideBounds::default().right)]
    right: u32,

    /// Bottom edge of the slide area (exclusive), in pixels.
    #[arg(long, default_value_t = SlideBounds::default().bottom)]
    bottom: u32,

    /// Seconds between sampled frames.
    #[arg(long, default_value_t = 1)]
    frequency: u64,
}

impl DetectionArgs {
    fn settings(&self) -> SlideSettings {
        SlideSettings::new()
            .with_threshold(self.threshold)
            .with_save_initial(self.save_initial)
            .with_bounds(SlideBounds::new(self.left, self.top, self.right, self.bottom))
            .with_interval_secs(self.frequency)
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Convert one video into a PDF.
    #[command(
        after_help = "Examples:\n  lecture2slides convert lecture.mp4\n  lecture2slides convert lecture.mp4 --threshold 0.9 --frequency 2 --output slides.pdf"
    )]
    Convert {
        /// Video to convert.
        filename: PathBuf,

        #[command(flatten)]
        detection: DetectionArgs,

        /// Output PDF (default: the video path with a .pdf extension).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Convert every video under a directory, in parallel.
    #[command(
        after_help = "Examples:\n  lecture2slides batch course/\n  lecture2slides batch course/ --processes 2 --output decks --json"
    )]
    Batch {
        /// Directory to scan recursively for videos.
        root: PathBuf,

        #[command(flatten)]
        detection: DetectionArgs,

        /// Worker count (default: available hardware threads).
        #[arg(long)]
        processes: Option<usize>,

        /// Directory for the generated PDFs.
        #[arg(long, short, default_value = DEFAULT_BATCH_OUTPUT)]
        output: PathBuf,

        /// Print the final report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completion scripts")]
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Terminal progress for one bar: used directly for `convert`, one per
/// worker for `batch`.
struct ConsoleProgress {
    bar: Option<ProgressBar>,
    announce_collating: bool,
}

impl ConsoleProgress {
    fn new(bar: Option<ProgressBar>, announce_collating: bool) -> Self {
        if let Some(bar) = &bar {
            if let Ok(style) = ProgressStyle::with_template(
                "{prefix:.bold} {spinner:.green} {bar:40.cyan/blue} {pos}/{len} {wide_msg}",
            ) {
                bar.set_style(style.progress_chars("##-"));
            }
        }
        Self {
            bar,
            announce_collating,
        }
    }
}

impl ProgressCallback for ConsoleProgress {
    fn on_start(&self, video: &Path, total: Option<u64>) {
        if let Some(bar) = &self.bar {
            bar.reset();
            bar.set_length(total.unwrap_or(0));
            bar.set_message(display_name(video));
        }
    }

    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(bar) = &self.bar {
            bar.set_position(info.current);
            bar.set_message(format!(
                "{} ({} slides)",
                display_name(&info.video),
                info.retained
            ));
        }
    }

    fn on_finish(&self, info: &ProgressInfo) {
        if let Some(bar) = &self.bar {
            bar.set_position(info.current);
            bar.finish_with_message(format!(
                "{} ({} slides)",
                display_name(&info.video),
                info.retained
            ));
        }
        if self.announce_collating {
            println!("Collating slides");
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn warn_line(message: String) {
    eprintln!("{} {}", "warning:".yellow().bold(), message.yellow());
}

fn init_logging(global: &GlobalOptions) {
    let level = if global.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let config = ConfigBuilder::new()
        .add_filter_allow_str("lecture2slides")
        .build();
    if let Err(error) = TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto) {
        warn_line(format!("could not initialise logging: {error}"));
    }
}

fn install_interrupt_handler() -> Result<CancellationToken, Box<dyn std::error::Error>> {
    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        if !handler_token.is_cancelled() {
            eprintln!("{}", "Interrupted; finishing cleanup...".yellow());
        }
        handler_token.cancel();
    })?;
    Ok(token)
}

fn convert(
    global: &GlobalOptions,
    filename: PathBuf,
    detection: &DetectionArgs,
    output: Option<PathBuf>,
    token: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    if !filename.is_file() {
        warn_line(format!("Could not find {}", filename.display()));
        return Ok(());
    }
    let settings = detection.settings();
    settings.validate()?;

    let output = output.unwrap_or_else(|| filename.with_extension("pdf"));
    println!(
        "Processing frames in video {} with capture frequency {}s",
        filename.display(),
        detection.frequency
    );

    let bar = (!global.quiet).then(|| ProgressBar::new(0));
    let mut options = ExtractOptions::new()
        .with_cancellation(token)
        .with_progress(Arc::new(ConsoleProgress::new(bar, true)));
    if let Some(temp_dir) = &global.temp_dir {
        fs::create_dir_all(temp_dir)?;
        options = options.with_scratch_root(temp_dir);
    }

    let task = VideoTask::new(filename, output, settings);
    match SlideExtractor::new(task).with_options(options).extract() {
        Ok(summary) => {
            println!(
                "{} {}",
                "saved".green().bold(),
                format!(
                    "{} slides to {}",
                    summary.slides,
                    summary.output.display()
                )
                .green()
            );
            Ok(())
        }
        Err(error) if error.is_cancelled() => {
            warn_line("cancelled; no document written".to_string());
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

fn batch(
    global: &GlobalOptions,
    root: PathBuf,
    detection: &DetectionArgs,
    processes: Option<usize>,
    output: PathBuf,
    as_json: bool,
    token: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    if !root.is_dir() {
        warn_line(format!("Could not find directory {}", root.display()));
        return Ok(());
    }

    let mut options = BatchOptions::new()
        .with_settings(detection.settings())
        .with_output_dir(output)
        .with_cancellation(token);
    if let Some(processes) = processes {
        options = options.with_processes(processes);
    }
    if let Some(temp_dir) = &global.temp_dir {
        options = options.with_temp_dir(temp_dir);
    }
    if !global.quiet && !as_json {
        let bars = MultiProgress::new();
        let factory: ProgressFactory = Arc::new(move |worker| {
            let bar = bars.add(ProgressBar::new(0));
            bar.set_prefix(format!("worker {worker}"));
            Arc::new(ConsoleProgress::new(Some(bar), false)) as Arc<dyn ProgressCallback>
        });
        options = options.with_progress_factory(factory);
    }

    let report = match BatchCoordinator::new(&root, options).run() {
        Ok(report) => report,
        Err(SlideError::NoVideosFound(root)) => {
            warn_line(format!("No videos found under {}", root.display()));
            return Ok(());
        }
        Err(error) => return Err(error.into()),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report_json(&root, &report))?);
        return Ok(());
    }

    for video in &report.videos {
        match &video.outcome {
            VideoOutcome::Completed { slides } => println!(
                "{} {} -> {} ({slides} slides)",
                "saved".green().bold(),
                video.video.display(),
                video.output.display()
            ),
            VideoOutcome::Failed { reason } => println!(
                "{} {}: {}",
                "failed".red().bold(),
                video.video.display(),
                reason.red()
            ),
            VideoOutcome::Cancelled => {
                println!("{} {}", "cancelled".yellow().bold(), video.video.display())
            }
            VideoOutcome::NotAttempted => {
                println!("{} {}", "not started".dimmed(), video.video.display())
            }
        }
    }
    println!(
        "{} {}",
        "done:".bold(),
        format!(
            "{} processed, {} skipped ({}, {:.1}s)",
            report.completed(),
            report.skipped(),
            workers_summary(report),
            report.elapsed.as_secs_f64()
        )
    );
    if report.interrupted {
        warn_line("run was interrupted before all videos finished".to_string());
    }
    Ok(())
}

fn workers_summary(report: &BatchReport) -> String {
    if report.was_clamped() {
        format!("{} of {} workers", report.workers, report.requested_workers)
    } else {
        format!("{} workers", report.workers)
    }
}

fn outcome_json(outcome: &VideoOutcome) -> Value {
    match outcome {
        VideoOutcome::Completed { slides } => json!({ "status": "completed", "slides": slides }),
        VideoOutcome::Failed { reason } => json!({ "status": "failed", "reason": reason }),
        VideoOutcome::Cancelled => json!({ "status": "cancelled" }),
        VideoOutcome::NotAttempted => json!({ "status": "not_attempted" }),
    }
}

fn report_json(root: &Path, report: &BatchReport) -> Value {
    let videos: Vec<Value> = report
        .videos
        .iter()
        .map(|video| {
            let mut entry = outcome_json(&video.outcome);
            entry["video"] = json!(video.video.display().to_string());
            entry["output"] = json!(video.output.display().to_string());
            entry["worker"] = json!(video.worker);
            entry
        })
        .collect();
    json!({
        "root": root.display().to_string(),
        "workers": report.workers,
        "requested_workers": report.requested_workers,
        "interrupted": report.interrupted,
        "elapsed_seconds": report.elapsed.as_secs_f64(),
        "completed": report.completed(),
        "failed": report.failed(),
        "cancelled": report.cancelled(),
        "not_attempted": report.not_attempted(),
        "videos": videos,
    })
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.global);
    lecture2slides::set_ffmpeg_log_level(cli.global.log_level);

    match cli.command {
        Commands::Convert {
            filename,
            detection,
            output,
        } => {
            let token = install_interrupt_handler()?;
            convert(&cli.global, filename, &detection, output, token)?;
        }
        Commands::Batch {
            root,
            detection,
            processes,
            output,
            json,
        } => {
            let token = install_interrupt_handler()?;
            batch(&cli.global, root, &detection, processes, output, json, token)?;
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "lecture2slides", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}
