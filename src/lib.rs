//! # lecture2slides
//!
//! Turn recorded lectures into slide decks.
//!
//! `lecture2slides` samples a video at a fixed cadence, crops every sample to
//! the slide area, and keeps the samples that differ enough from the last
//! kept one (mean structural similarity below a threshold). The kept frames
//! become the pages of a PDF. Videos are decoded with FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate.
//!
//! ## Quick Start
//!
//! ### Convert One Video
//!
//! ```no_run
//! use lecture2slides::{SlideExtractor, SlideSettings, VideoTask};
//!
//! let settings = SlideSettings::new().with_threshold(0.9).with_save_initial(true);
//! let task = VideoTask::beside("lecture.mp4", settings);
//! let summary = SlideExtractor::new(task).extract().unwrap();
//! println!("{} slides", summary.slides);
//! ```
//!
//! ### Convert a Directory
//!
//! ```no_run
//! use lecture2slides::{BatchCoordinator, BatchOptions};
//!
//! let report = BatchCoordinator::new("course/", BatchOptions::new().with_processes(4))
//!     .run()
//!     .unwrap();
//! println!("{} of {} converted", report.completed(), report.videos.len());
//! ```
//!
//! ### Bring Your Own Frames
//!
//! Anything implementing [`VideoSource`] can be sampled, which is how the
//! test suite runs without fixture videos:
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use lecture2slides::{ChangeDetector, FfmpegVideoSource, FrameSampler, SlideBounds};
//!
//! let source = FfmpegVideoSource::open("lecture.mp4").unwrap();
//! let sampler = FrameSampler::new(source, Duration::from_secs(1), SlideBounds::default()).unwrap();
//! let mut detector = ChangeDetector::new(0.85, true);
//! for sample in sampler {
//!     let (frame_number, frame) = sample.unwrap();
//!     if detector.evaluate(&frame).retain {
//!         println!("new slide at frame {frame_number}");
//!     }
//! }
//! ```
//!
//! ## Features
//!
//! - **Cadence sampling**: one sample every `round(interval × fps)` frames
//! - **Change detection**: SSIM against the last *retained* slide, so slow
//!   drift is still caught
//! - **PDF output**: one page per slide, JPEG data embedded unchanged
//! - **Batch mode**: contiguous shards over a bounded `rayon` pool
//! - **Progress & cancellation**: per-worker callbacks and a
//!   `CancellationToken` checked before every sample
//! - **Clean scratch space**: per-video temporary directories removed on
//!   every exit path
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod batch;
pub mod configuration;
mod conversion;
pub mod detector;
pub mod document;
pub mod error;
pub mod extractor;
pub mod ffmpeg;
pub mod progress;
pub mod sampler;
pub mod scratch;
pub mod similarity;
pub mod source;

pub use batch::{
    BatchCoordinator, BatchPlan, BatchReport, BatchState, Shard, VideoOutcome, VideoReport,
    discover_videos, output_file_name, output_file_names, partition, plan_worker_count,
};
pub use configuration::{
    BatchOptions, DEFAULT_THRESHOLD, ExtractOptions, ProgressFactory, SlideBounds, SlideSettings,
};
pub use detector::{ChangeDetector, Decision};
pub use document::assemble_pdf;
pub use error::{ErrorClass, SlideError};
pub use extractor::{ExtractionSummary, SlideExtractor, VideoTask};
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use progress::{CancellationToken, ProgressCallback, ProgressInfo};
pub use sampler::FrameSampler;
pub use scratch::ScratchDir;
pub use similarity::{SimilarityMeasure, StructuralSimilarity, structural_similarity};
pub use source::{FfmpegVideoSource, VideoMetadata, VideoSource};
