//! Directory-wide batch conversion.
//!
//! [`BatchCoordinator`] finds every video under a root directory, splits the
//! list into contiguous shards (one per worker), and runs each shard
//! sequentially on its own thread of a dedicated [`rayon`] pool. Workers
//! report per-video outcomes over a [`crossbeam_channel`] and the
//! coordinator blocks until every shard has finished, polling the shared
//! [`CancellationToken`](crate::CancellationToken) while it waits.
//!
//! All scratch directories of a run live under one temporary root that is
//! removed before [`run`](BatchCoordinator::run) returns.
//!
//! # Example
//!
//! ```no_run
//! use lecture2slides::{BatchCoordinator, BatchOptions};
//!
//! let options = BatchOptions::new().with_processes(4).with_output_dir("decks");
//! let report = BatchCoordinator::new("lectures", options).run()?;
//! println!("{} converted, {} failed", report.completed(), report.failed());
//! # Ok::<(), lecture2slides::SlideError>(())
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};
use walkdir::WalkDir;

use crate::configuration::{BatchOptions, ExtractOptions, SlideSettings};
use crate::error::SlideError;
use crate::extractor::{SlideExtractor, VideoTask};
use crate::progress::{CancellationToken, ProgressCallback};
use crate::source::{FfmpegVideoSource, VideoSource};

/// File extensions (lowercase) treated as videos during discovery.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mkv", "mov", "avi", "webm", "flv", "wmv", "mpg", "mpeg",
];

/// How often the coordinator wakes to check for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Whether `path` has a recognised video extension (case-insensitive).
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(extension))
        })
}

/// Recursively list the videos under `root`, in sorted path order.
///
/// Unreadable entries are logged and skipped.
///
/// # Errors
///
/// - [`SlideError::MissingInput`] if `root` is not a directory.
/// - [`SlideError::NoVideosFound`] if no video files were found.
pub fn discover_videos(root: &Path) -> Result<Vec<PathBuf>, SlideError> {
    if !root.is_dir() {
        return Err(SlideError::MissingInput(root.to_path_buf()));
    }

    let mut videos = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        match entry {
            Ok(entry) if entry.file_type().is_file() && is_video_file(entry.path()) => {
                videos.push(entry.into_path());
            }
            Ok(_) => {}
            Err(error) => log::warn!("Skipping unreadable entry under {}: {error}", root.display()),
        }
    }
    videos.sort();

    if videos.is_empty() {
        return Err(SlideError::NoVideosFound(root.to_path_buf()));
    }
    log::debug!("Discovered {} videos under {}", videos.len(), root.display());
    Ok(videos)
}

/// Document file name for `video`: its path relative to `root` with
/// directory separators flattened to `_` and a `.pdf` extension.
///
/// `root/week1/intro.mp4` becomes `week1_intro.pdf`.
pub fn output_file_name(root: &Path, video: &Path) -> PathBuf {
    let relative = video.strip_prefix(root).unwrap_or(video).with_extension("pdf");
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    PathBuf::from(parts.join("_"))
}

/// Document file names for every video in `videos`, unique within the run.
///
/// Names start as [`output_file_name`]. Videos whose flattened names collide
/// (case-insensitively) keep their source extension (`intro.mp4.pdf`), and
/// anything still taken gets a numeric suffix (`intro.mp4_2.pdf`).
pub fn output_file_names(root: &Path, videos: &[PathBuf]) -> Vec<PathBuf> {
    let flattened: Vec<PathBuf> = videos
        .iter()
        .map(|video| output_file_name(root, video))
        .collect();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for name in &flattened {
        *counts.entry(name_key(name)).or_default() += 1;
    }

    let mut taken = HashSet::new();
    videos
        .iter()
        .zip(flattened)
        .map(|(video, name)| {
            let candidate = if counts.get(&name_key(&name)).is_some_and(|&count| count > 1) {
                keep_source_extension(&name, video)
            } else {
                name.clone()
            };
            let mut unique = candidate.clone();
            let mut suffix = 2;
            while !taken.insert(name_key(&unique)) {
                unique = numbered(&candidate, suffix);
                suffix += 1;
            }
            if unique != name {
                log::warn!(
                    "{} would share {} with another video; writing {} instead",
                    video.display(),
                    name.display(),
                    unique.display()
                );
            }
            unique
        })
        .collect()
}

fn name_key(name: &Path) -> String {
    name.to_string_lossy().to_lowercase()
}

fn stem(name: &Path) -> String {
    name.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn keep_source_extension(name: &Path, video: &Path) -> PathBuf {
    match video.extension() {
        Some(extension) => PathBuf::from(format!(
            "{}.{}.pdf",
            stem(name),
            extension.to_string_lossy()
        )),
        None => name.to_path_buf(),
    }
}

fn numbered(name: &Path, suffix: usize) -> PathBuf {
    PathBuf::from(format!("{}_{suffix}.pdf", stem(name)))
}

/// Worker count for a run: the request (or the hardware parallelism when
/// none was given) clamped to `min(hardware, videos)`, at least one.
///
/// An explicit request that gets clamped is logged as a warning.
pub fn plan_worker_count(requested: Option<usize>, hardware: usize, videos: usize) -> usize {
    let hardware = hardware.max(1);
    let wanted = requested.unwrap_or(hardware).max(1);
    let workers = wanted.min(hardware).min(videos).max(1);
    if workers < wanted {
        if requested.is_some() {
            log::warn!(
                "Reducing worker count from {wanted} to {workers} \
                 ({hardware} hardware threads, {videos} videos)"
            );
        } else {
            log::info!("Using {workers} of {hardware} hardware threads for {videos} videos");
        }
    }
    workers
}

/// Split `items` into contiguous chunks of `ceil(len / workers)`,
/// preserving order. May return fewer chunks than `workers`.
pub fn partition<T: Clone>(items: &[T], workers: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let size = items.len().div_ceil(workers.max(1));
    items.chunks(size).map(<[T]>::to_vec).collect()
}

/// The tasks assigned to one worker.
#[derive(Debug, Clone)]
pub struct Shard {
    /// Worker index, also the shard's position in the plan.
    pub worker: usize,
    /// Discovery index of the shard's first task.
    pub first_index: usize,
    /// Tasks in discovery order.
    pub tasks: Vec<VideoTask>,
}

/// The fixed assignment of videos to workers for one run.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    shards: Vec<Shard>,
}

impl BatchPlan {
    /// Build tasks for `videos` (writing into `output_dir`) and shard them
    /// over `workers`.
    pub fn new(
        root: &Path,
        videos: &[PathBuf],
        output_dir: &Path,
        settings: SlideSettings,
        workers: usize,
    ) -> Self {
        let tasks: Vec<VideoTask> = videos
            .iter()
            .zip(output_file_names(root, videos))
            .map(|(video, name)| VideoTask::new(video.clone(), output_dir.join(name), settings))
            .collect();

        let mut first_index = 0;
        let shards = partition(&tasks, workers)
            .into_iter()
            .enumerate()
            .map(|(worker, tasks)| {
                let shard = Shard {
                    worker,
                    first_index,
                    tasks,
                };
                first_index += shard.tasks.len();
                shard
            })
            .collect();
        Self { shards }
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    /// Number of workers the plan needs (one per shard).
    pub fn worker_count(&self) -> usize {
        self.shards.len()
    }

    pub fn task_count(&self) -> usize {
        self.shards.iter().map(|shard| shard.tasks.len()).sum()
    }

    /// All tasks in discovery order.
    pub fn tasks(&self) -> impl Iterator<Item = &VideoTask> {
        self.shards.iter().flat_map(|shard| shard.tasks.iter())
    }
}

/// Lifecycle of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Discovering,
    Planning,
    Dispatched,
    /// At least one shard has finished while others are still running.
    Draining,
    Cancelling,
    Done,
}

impl Display for BatchState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            BatchState::Idle => "idle",
            BatchState::Discovering => "discovering",
            BatchState::Planning => "planning",
            BatchState::Dispatched => "dispatched",
            BatchState::Draining => "draining",
            BatchState::Cancelling => "cancelling",
            BatchState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Records every state the run passes through.
#[derive(Debug)]
struct StateLog {
    history: Vec<BatchState>,
}

impl StateLog {
    fn new() -> Self {
        Self {
            history: vec![BatchState::Idle],
        }
    }

    fn current(&self) -> BatchState {
        self.history.last().copied().unwrap_or(BatchState::Idle)
    }

    fn advance(&mut self, next: BatchState) {
        log::debug!("Batch state: {} -> {next}", self.current());
        self.history.push(next);
    }
}

/// What happened to one video.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoOutcome {
    Completed { slides: u64 },
    Failed { reason: String },
    Cancelled,
    /// The run was cancelled before this video started.
    NotAttempted,
}

/// Outcome of one video in a batch run.
#[derive(Debug, Clone)]
pub struct VideoReport {
    pub video: PathBuf,
    pub output: PathBuf,
    pub worker: usize,
    pub outcome: VideoOutcome,
}

/// Aggregated result of a batch run.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Per-video outcomes in discovery order.
    pub videos: Vec<VideoReport>,
    /// Workers that were planned.
    pub workers: usize,
    /// Workers asked for (the hardware parallelism when unset), before
    /// clamping to the hardware and the number of videos.
    pub requested_workers: usize,
    /// Whether the run was interrupted.
    pub interrupted: bool,
    /// States the run passed through, starting with `Idle`.
    pub transitions: Vec<BatchState>,
    pub elapsed: Duration,
}

impl BatchReport {
    /// Whether fewer workers ran than were asked for.
    pub fn was_clamped(&self) -> bool {
        self.workers < self.requested_workers
    }

    fn count(&self, predicate: impl Fn(&VideoOutcome) -> bool) -> usize {
        self.videos.iter().filter(|video| predicate(&video.outcome)).count()
    }

    pub fn completed(&self) -> usize {
        self.count(|outcome| matches!(outcome, VideoOutcome::Completed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, VideoOutcome::Failed { .. }))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|outcome| matches!(outcome, VideoOutcome::Cancelled))
    }

    pub fn not_attempted(&self) -> usize {
        self.count(|outcome| matches!(outcome, VideoOutcome::NotAttempted))
    }

    /// Videos that did not produce a document.
    pub fn skipped(&self) -> usize {
        self.videos.len() - self.completed()
    }
}

enum WorkerEvent {
    Video { index: usize, outcome: VideoOutcome },
    ShardDone { worker: usize },
}

/// Runs a directory of videos through [`SlideExtractor`] on a bounded
/// worker pool.
#[derive(Debug)]
pub struct BatchCoordinator {
    root: PathBuf,
    options: BatchOptions,
}

impl BatchCoordinator {
    pub fn new<P: Into<PathBuf>>(root: P, options: BatchOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Run the batch, decoding videos with FFmpeg.
    ///
    /// # Errors
    ///
    /// See [`run_with`](Self::run_with).
    pub fn run(&self) -> Result<BatchReport, SlideError> {
        self.run_with(|path: &Path| FfmpegVideoSource::open(path))
    }

    /// Run the batch, opening each video with `opener`.
    ///
    /// Per-video failures and cancellation are reported in the returned
    /// [`BatchReport`]; they never abort the run.
    ///
    /// # Errors
    ///
    /// Configuration errors only: invalid settings, a missing root, no
    /// videos, an uncreatable output or temporary directory, or a pool that
    /// cannot start.
    pub fn run_with<S, F>(&self, opener: F) -> Result<BatchReport, SlideError>
    where
        S: VideoSource,
        F: Fn(&Path) -> Result<S, SlideError> + Sync,
    {
        let started = Instant::now();
        let options = &self.options;
        let mut state = StateLog::new();
        options.settings.validate()?;

        state.advance(BatchState::Discovering);
        let videos = discover_videos(&self.root)?;

        state.advance(BatchState::Planning);
        let hardware = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        let requested_workers = options.processes.unwrap_or(hardware).max(1);
        let workers = plan_worker_count(options.processes, hardware, videos.len());
        let plan = BatchPlan::new(
            &self.root,
            &videos,
            &options.output_dir,
            options.settings,
            workers,
        );

        fs::create_dir_all(&options.output_dir).map_err(|source| SlideError::OutputWrite {
            path: options.output_dir.clone(),
            source,
        })?;
        let temp_base = options.temp_dir.clone().unwrap_or_else(std::env::temp_dir);
        fs::create_dir_all(&temp_base)?;
        let temp_root = tempfile::Builder::new()
            .prefix("lecture2slides-")
            .tempdir_in(&temp_base)?;
        log::debug!("Temporary root {}", temp_root.path().display());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(plan.worker_count())
            .thread_name(|index| format!("slides-worker-{index}"))
            .build()
            .map_err(|error| SlideError::WorkerPool(error.to_string()))?;

        let mut reports: Vec<VideoReport> = plan
            .shards()
            .iter()
            .flat_map(|shard| {
                shard.tasks.iter().map(|task| VideoReport {
                    video: task.video().to_path_buf(),
                    output: task.output().to_path_buf(),
                    worker: shard.worker,
                    outcome: VideoOutcome::NotAttempted,
                })
            })
            .collect();

        let cancellation = &options.cancellation;
        let (sender, receiver) = crossbeam_channel::unbounded();
        state.advance(BatchState::Dispatched);

        pool.in_place_scope(|scope| {
            let mut running = 0usize;
            for shard in plan.shards() {
                if cancellation.is_cancelled() {
                    break;
                }
                let worker = WorkerContext {
                    sender: sender.clone(),
                    cancellation: cancellation.clone(),
                    scratch_root: temp_root.path(),
                    progress: options.progress.as_ref().map(|factory| (factory.as_ref())(shard.worker)),
                };
                let opener = &opener;
                scope.spawn(move |_| worker.run_shard(shard, opener));
                running += 1;
            }
            drop(sender);

            while running > 0 {
                match receiver.recv_timeout(POLL_INTERVAL) {
                    Ok(WorkerEvent::Video { index, outcome }) => {
                        if let Some(report) = reports.get_mut(index) {
                            report.outcome = outcome;
                        }
                    }
                    Ok(WorkerEvent::ShardDone { worker }) => {
                        running -= 1;
                        log::debug!("Worker {worker} finished its shard");
                        if running > 0 && state.current() == BatchState::Dispatched {
                            state.advance(BatchState::Draining);
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
                if cancellation.is_cancelled() && state.current() != BatchState::Cancelling {
                    log::warn!("Cancellation requested; waiting for workers to clean up");
                    state.advance(BatchState::Cancelling);
                }
            }
        });

        if cancellation.is_cancelled() && state.current() != BatchState::Cancelling {
            state.advance(BatchState::Cancelling);
        }

        let temp_path = temp_root.path().to_path_buf();
        if let Err(error) = temp_root.close() {
            log::warn!(
                "Failed to remove temporary root {}: {error}",
                temp_path.display()
            );
        }
        state.advance(BatchState::Done);

        let report = BatchReport {
            videos: reports,
            workers: plan.worker_count(),
            requested_workers,
            interrupted: cancellation.is_cancelled(),
            transitions: state.history,
            elapsed: started.elapsed(),
        };
        log::info!(
            "Batch finished: {} converted, {} skipped",
            report.completed(),
            report.skipped()
        );
        Ok(report)
    }
}

/// Everything a worker thread needs besides its shard.
struct WorkerContext<'a> {
    sender: Sender<WorkerEvent>,
    cancellation: CancellationToken,
    scratch_root: &'a Path,
    progress: Option<Arc<dyn ProgressCallback>>,
}

impl WorkerContext<'_> {
    fn run_shard<S, F>(self, shard: &Shard, opener: &F)
    where
        S: VideoSource,
        F: Fn(&Path) -> Result<S, SlideError>,
    {
        for (offset, task) in shard.tasks.iter().enumerate() {
            let index = shard.first_index + offset;
            let outcome = if self.cancellation.is_cancelled() {
                VideoOutcome::NotAttempted
            } else {
                self.run_task(task, opener)
            };
            // The coordinator outlives every worker, so a send cannot fail
            // unless it is unwinding.
            let _ = self.sender.send(WorkerEvent::Video { index, outcome });
        }
        let _ = self.sender.send(WorkerEvent::ShardDone {
            worker: shard.worker,
        });
    }

    fn run_task<S, F>(&self, task: &VideoTask, opener: &F) -> VideoOutcome
    where
        S: VideoSource,
        F: Fn(&Path) -> Result<S, SlideError>,
    {
        let mut options = ExtractOptions::new()
            .with_cancellation(self.cancellation.clone())
            .with_scratch_root(self.scratch_root);
        if let Some(progress) = &self.progress {
            options = options.with_progress(Arc::clone(progress));
        }
        let extractor = SlideExtractor::new(task.clone()).with_options(options);

        match opener(task.video()).and_then(|source| extractor.extract_from(source)) {
            Ok(summary) => VideoOutcome::Completed {
                slides: summary.slides,
            },
            Err(error) if error.is_cancelled() => VideoOutcome::Cancelled,
            Err(error) => {
                log::warn!("Skipping {}: {error}", task.video().display());
                VideoOutcome::Failed {
                    reason: error.to_string(),
                }
            }
        }
    }
}
