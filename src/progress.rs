//! Progress reporting and cancellation support.
//!
//! This module provides [`ProgressCallback`] for monitoring extraction progress,
//! [`CancellationToken`] for cooperative cancellation, and [`ProgressInfo`] for
//! detailed progress snapshots.
//!
//! Progress is reported per video, in sampled frames: `current` counts the
//! samples evaluated so far and `total` is the expected sample count. In
//! batch mode every worker is given its own callback, so implementations never
//! see interleaved updates from two videos.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lecture2slides::{ExtractOptions, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("[{}] {pct:.1}% complete", info.video.display());
//!         }
//!     }
//! }
//!
//! let options = ExtractOptions::new().with_progress(Arc::new(PrintProgress));
//! ```

use std::path::{Path, PathBuf};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// A snapshot of extraction progress for one video.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// The video being processed.
    pub video: PathBuf,
    /// How many samples have been evaluated so far.
    pub current: u64,
    /// Samples expected, if the source reported a frame count.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Slides retained so far.
    pub retained: u64,
    /// Wall-clock time elapsed since the video started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// Source frame index of the most recent sample.
    pub current_frame: Option<u64>,
}

/// Trait for receiving progress updates during extraction.
///
/// Implementations must be [`Send`] and [`Sync`] because callbacks are
/// created on the coordinating thread and invoked from worker threads.
///
/// Progress callbacks are **infallible**: they observe but cannot halt
/// the operation. Use [`CancellationToken`] for cooperative cancellation.
pub trait ProgressCallback: Send + Sync {
    /// Called when a video starts, with the expected sample count.
    fn on_start(&self, _video: &Path, _total: Option<u64>) {}

    /// Called after every evaluated sample.
    fn on_progress(&self, info: &ProgressInfo);

    /// Called once the video has been fully sampled (not on failure or
    /// cancellation).
    fn on_finish(&self, _info: &ProgressInfo) {}
}

/// A no-op implementation that discards all progress notifications.
///
/// This is the default when no callback is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone this token and share it between threads; call [`cancel`](CancellationToken::cancel)
/// from any thread (or a Ctrl-C handler) to request cancellation. Workers
/// check the token before each video and the extraction loop checks it
/// before each sample.
///
/// # Example
///
/// ```
/// use lecture2slides::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    ///
    /// All clones of this token will observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Internal helper that tracks progress timing and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    video: PathBuf,
    total: Option<u64>,
    current: u64,
    retained: u64,
    last_frame: Option<u64>,
    start_time: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, video: &Path, total: Option<u64>) -> Self {
        callback.on_start(video, total);
        Self {
            callback,
            video: video.to_path_buf(),
            total,
            current: 0,
            retained: 0,
            last_frame: None,
            start_time: Instant::now(),
        }
    }

    /// Record one evaluated sample and fire the callback.
    pub(crate) fn advance(&mut self, frame_number: u64, retained: bool) {
        self.current += 1;
        self.last_frame = Some(frame_number);
        if retained {
            self.retained += 1;
        }
        self.callback.on_progress(&self.snapshot());
    }

    /// Emit the final report.
    pub(crate) fn finish(&self) {
        self.callback.on_finish(&self.snapshot());
    }

    fn snapshot(&self) -> ProgressInfo {
        let elapsed = self.start_time.elapsed();

        // The expected count is a floor, so the last sample can overshoot it.
        let percentage = self
            .total
            .filter(|&t| t > 0)
            .map(|t| ((self.current as f32 / t as f32) * 100.0).min(100.0));

        let estimated_remaining = if self.current > 0 {
            self.total.map(|t| {
                let remaining = t.saturating_sub(self.current);
                let per_item = elapsed / self.current as u32;
                per_item * remaining as u32
            })
        } else {
            None
        };

        ProgressInfo {
            video: self.video.clone(),
            current: self.current,
            total: self.total,
            percentage,
            retained: self.retained,
            elapsed,
            estimated_remaining,
            current_frame: self.last_frame,
        }
    }
}
