//! Extraction and batch configuration.
//!
//! [`SlideSettings`] holds the detection parameters shared by every video in a
//! run (threshold, crop rectangle, sample interval, save-initial policy).
//! [`ExtractOptions`] threads progress callbacks, cancellation tokens, and
//! the scratch directory through a single-video extraction without
//! polluting every function signature, and [`BatchOptions`] does the same
//! for a directory-wide run.
//!
//! # Example
//!
//! ```no_run
//! use lecture2slides::{CancellationToken, ExtractOptions, SlideBounds, SlideSettings};
//!
//! let settings = SlideSettings::new()
//!     .with_threshold(0.9)
//!     .with_save_initial(true)
//!     .with_bounds(SlideBounds::new(0, 0, 1280, 720));
//!
//! let token = CancellationToken::new();
//! let options = ExtractOptions::new().with_cancellation(token.clone());
//! ```

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::SlideError;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Default similarity threshold below which a sample counts as a new slide.
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Default output directory for batch runs.
pub const DEFAULT_BATCH_OUTPUT: &str = "slides";

/// Crop rectangle applied to every sampled frame, in pixel coordinates.
///
/// `right` and `bottom` are exclusive. The defaults (95, 70, 865, 650) match
/// the slide area of a common lecture-capture layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlideBounds {
    /// Left edge (inclusive).
    pub left: u32,
    /// Top edge (inclusive).
    pub top: u32,
    /// Right edge (exclusive).
    pub right: u32,
    /// Bottom edge (exclusive).
    pub bottom: u32,
}

impl Default for SlideBounds {
    fn default() -> Self {
        Self {
            left: 95,
            top: 70,
            right: 865,
            bottom: 650,
        }
    }
}

impl Display for SlideBounds {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "[left={}, top={}, right={}, bottom={}]",
            self.left, self.top, self.right, self.bottom
        )
    }
}

impl SlideBounds {
    /// Create a rectangle from its four edges.
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Width of the rectangle. Zero if the rectangle is degenerate.
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    /// Height of the rectangle. Zero if the rectangle is degenerate.
    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Check `left < right` and `top < bottom`.
    ///
    /// # Errors
    ///
    /// Returns [`SlideError::InvalidBounds`] for an empty rectangle.
    pub fn validate(&self) -> Result<(), SlideError> {
        if self.left >= self.right || self.top >= self.bottom {
            return Err(SlideError::InvalidBounds(*self));
        }
        Ok(())
    }

    /// Check that the rectangle lies inside a `width` × `height` frame.
    ///
    /// # Errors
    ///
    /// Returns [`SlideError::InvalidBounds`] for an empty rectangle and
    /// [`SlideError::CropOutOfBounds`] if it overhangs the frame.
    pub fn check_fits(&self, width: u32, height: u32) -> Result<(), SlideError> {
        self.validate()?;
        if self.right > width || self.bottom > height {
            return Err(SlideError::CropOutOfBounds {
                bounds: *self,
                width,
                height,
            });
        }
        Ok(())
    }
}

/// Detection parameters shared by every video of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlideSettings {
    /// Similarity score below which a sample is retained as a new slide.
    pub threshold: f64,
    /// Retain the very first sample unconditionally.
    pub save_initial: bool,
    /// Crop rectangle applied before comparison and saving.
    pub bounds: SlideBounds,
    /// Time between evaluated samples.
    pub interval: Duration,
}

impl Default for SlideSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl SlideSettings {
    /// Defaults: threshold 0.85, no initial save, default bounds, one
    /// sample per second.
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            save_initial: false,
            bounds: SlideBounds::default(),
            interval: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_save_initial(mut self, save_initial: bool) -> Self {
        self.save_initial = save_initial;
        self
    }

    #[must_use]
    pub fn with_bounds(mut self, bounds: SlideBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Set the time between samples.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the time between samples in whole seconds.
    #[must_use]
    pub fn with_interval_secs(self, seconds: u64) -> Self {
        self.with_interval(Duration::from_secs(seconds))
    }

    /// Reject settings that cannot drive a run.
    ///
    /// # Errors
    ///
    /// - [`SlideError::InvalidThreshold`] unless `0 < threshold < 1`.
    /// - [`SlideError::InvalidInterval`] for a zero interval.
    /// - [`SlideError::InvalidBounds`] for an empty crop rectangle.
    pub fn validate(&self) -> Result<(), SlideError> {
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(SlideError::InvalidThreshold(self.threshold));
        }
        if self.interval.is_zero() {
            return Err(SlideError::InvalidInterval);
        }
        self.bounds.validate()
    }

    /// Number of source frames between samples at `frames_per_second`.
    ///
    /// `round(interval × fps)`, never less than one.
    pub fn frame_step(&self, frames_per_second: f64) -> u64 {
        crate::sampler::frame_step(self.interval, frames_per_second)
    }
}

/// Runtime hooks for a single-video extraction.
///
/// All fields have sensible defaults: no progress output, never cancelled,
/// scratch directories under the system temporary directory.
#[derive(Clone)]
pub struct ExtractOptions {
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) scratch_root: Option<PathBuf>,
}

impl Debug for ExtractOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExtractOptions")
            .field("has_progress", &true)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("scratch_root", &self.scratch_root)
            .finish()
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractOptions {
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            scratch_root: None,
        }
    }

    /// Attach a progress callback, invoked after every sample.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// When the token is cancelled the sampling loop stops, no document is
    /// written, and the extraction returns [`SlideError::Cancelled`].
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Create per-video scratch directories under `root` instead of the
    /// system temporary directory.
    #[must_use]
    pub fn with_scratch_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub(crate) fn scratch_root(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}

/// Builds one progress callback per worker, keyed by worker index.
pub type ProgressFactory = Arc<dyn Fn(usize) -> Arc<dyn ProgressCallback> + Send + Sync>;

/// Configuration for a directory-wide batch run.
#[derive(Clone)]
pub struct BatchOptions {
    pub(crate) settings: SlideSettings,
    pub(crate) processes: Option<usize>,
    pub(crate) output_dir: PathBuf,
    pub(crate) temp_dir: Option<PathBuf>,
    pub(crate) cancellation: CancellationToken,
    pub(crate) progress: Option<ProgressFactory>,
}

impl Debug for BatchOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("BatchOptions")
            .field("settings", &self.settings)
            .field("processes", &self.processes)
            .field("output_dir", &self.output_dir)
            .field("temp_dir", &self.temp_dir)
            .field("has_progress", &self.progress.is_some())
            .finish()
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchOptions {
    /// Defaults: default settings, one worker per hardware thread, output
    /// to `./slides`, scratch space under the system temporary directory.
    pub fn new() -> Self {
        Self {
            settings: SlideSettings::new(),
            processes: None,
            output_dir: PathBuf::from(DEFAULT_BATCH_OUTPUT),
            temp_dir: None,
            cancellation: CancellationToken::new(),
            progress: None,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: SlideSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Request a worker count. The coordinator clamps it to the hardware
    /// parallelism and the number of discovered videos.
    #[must_use]
    pub fn with_processes(mut self, processes: usize) -> Self {
        self.processes = Some(processes);
        self
    }

    #[must_use]
    pub fn with_output_dir<P: Into<PathBuf>>(mut self, output_dir: P) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// Base directory under which the run's temporary root is created.
    #[must_use]
    pub fn with_temp_dir<P: Into<PathBuf>>(mut self, temp_dir: P) -> Self {
        self.temp_dir = Some(temp_dir.into());
        self
    }

    /// Share a cancellation token with the run (e.g. one cancelled by a
    /// Ctrl-C handler).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Give every worker its own progress callback.
    #[must_use]
    pub fn with_progress_factory(mut self, factory: ProgressFactory) -> Self {
        self.progress = Some(factory);
        self
    }

    pub fn settings(&self) -> &SlideSettings {
        &self.settings
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}
