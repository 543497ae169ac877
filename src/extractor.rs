//! Single-video slide extraction.
//!
//! [`SlideExtractor`] drives one [`VideoTask`] end to end: it samples the
//! video, keeps the frames the [`ChangeDetector`] flags as new slides, and
//! collates them into one PDF. Retained frames live in a per-video
//! [`ScratchDir`] that is removed however the extraction ends.
//!
//! # Example
//!
//! ```no_run
//! use lecture2slides::{SlideExtractor, SlideSettings, VideoTask};
//!
//! let task = VideoTask::new("lecture.mp4", "lecture.pdf", SlideSettings::new());
//! let summary = SlideExtractor::new(task).extract()?;
//! println!("{} slides written to {}", summary.slides, summary.output.display());
//! # Ok::<(), lecture2slides::SlideError>(())
//! ```

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{RgbImage, codecs::jpeg::JpegEncoder};

use crate::configuration::{ExtractOptions, SlideSettings};
use crate::detector::ChangeDetector;
use crate::document::{assemble_pdf, collect_images, write_document};
use crate::error::SlideError;
use crate::progress::ProgressTracker;
use crate::sampler::FrameSampler;
use crate::scratch::ScratchDir;
use crate::similarity::{SimilarityMeasure, StructuralSimilarity};
use crate::source::{FfmpegVideoSource, VideoSource};

/// JPEG quality for retained frames.
const SLIDE_QUALITY: u8 = 95;

/// One video to convert: where it is, where its document goes, and how to
/// detect slides in it.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoTask {
    video: PathBuf,
    output: PathBuf,
    settings: SlideSettings,
}

impl VideoTask {
    pub fn new<V: Into<PathBuf>, O: Into<PathBuf>>(
        video: V,
        output: O,
        settings: SlideSettings,
    ) -> Self {
        Self {
            video: video.into(),
            output: output.into(),
            settings,
        }
    }

    /// A task whose document sits next to the video, with a `.pdf`
    /// extension.
    pub fn beside<V: Into<PathBuf>>(video: V, settings: SlideSettings) -> Self {
        let video = video.into();
        let output = video.with_extension("pdf");
        Self {
            video,
            output,
            settings,
        }
    }

    pub fn video(&self) -> &Path {
        &self.video
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn settings(&self) -> &SlideSettings {
        &self.settings
    }
}

/// What a finished extraction produced.
#[derive(Debug, Clone)]
pub struct ExtractionSummary {
    /// The input video.
    pub video: PathBuf,
    /// The written document.
    pub output: PathBuf,
    /// Samples evaluated.
    pub samples: u64,
    /// Slides retained (pages in the document).
    pub slides: u64,
    /// Source frames between samples.
    pub frame_step: u64,
    /// Scratch directory used for retained frames (already removed).
    pub scratch_dir: PathBuf,
    /// Wall-clock duration of the extraction.
    pub elapsed: Duration,
}

/// Converts one video into a slide deck.
pub struct SlideExtractor {
    task: VideoTask,
    options: ExtractOptions,
    measure: Arc<dyn SimilarityMeasure>,
}

impl SlideExtractor {
    /// An extractor with default options and [`StructuralSimilarity`].
    pub fn new(task: VideoTask) -> Self {
        Self {
            task,
            options: ExtractOptions::new(),
            measure: Arc::new(StructuralSimilarity),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    /// Compare samples with a different similarity measure.
    #[must_use]
    pub fn with_measure(mut self, measure: Arc<dyn SimilarityMeasure>) -> Self {
        self.measure = measure;
        self
    }

    pub fn task(&self) -> &VideoTask {
        &self.task
    }

    /// Open the task's video with FFmpeg and extract from it.
    ///
    /// # Errors
    ///
    /// - [`SlideError::MissingInput`] if the video does not exist.
    /// - Anything [`extract_from`](Self::extract_from) or
    ///   [`FfmpegVideoSource::open`] return.
    pub fn extract(&self) -> Result<ExtractionSummary, SlideError> {
        if !self.task.video.exists() {
            return Err(SlideError::MissingInput(self.task.video.clone()));
        }
        let source = FfmpegVideoSource::open(&self.task.video)?;
        self.extract_from(source)
    }

    /// Extract slides from an already-open source.
    ///
    /// The scratch directory is created first and removed before this
    /// returns, on every path. A cancelled extraction writes no document.
    ///
    /// # Errors
    ///
    /// - Configuration errors from [`SlideSettings::validate`].
    /// - [`SlideError::Cancelled`] if the cancellation token fires.
    /// - Sampling, decoding, image, and document errors for this video.
    pub fn extract_from<S: VideoSource>(&self, source: S) -> Result<ExtractionSummary, SlideError> {
        let started = Instant::now();
        let settings = &self.task.settings;
        settings.validate()?;

        let frames_per_second = source.frame_rate();
        let mut sampler = FrameSampler::new(source, settings.interval, settings.bounds)?;
        let mut detector = ChangeDetector::from_settings(Arc::clone(&self.measure), settings);

        let scratch = ScratchDir::create(&self.options.scratch_root(), &self.task.video)?;
        let mut tracker = ProgressTracker::new(
            Arc::clone(&self.options.progress),
            &self.task.video,
            Some(sampler.expected_samples()),
        );

        log::debug!(
            "Sampling {} every {} frames ({:.3} fps)",
            self.task.video.display(),
            sampler.frame_step(),
            frames_per_second
        );

        let mut samples = 0u64;
        let mut slides = 0u64;
        loop {
            if self.options.is_cancelled() {
                log::debug!("Extraction of {} cancelled", self.task.video.display());
                return Err(SlideError::Cancelled);
            }
            let Some(sample) = sampler.next() else {
                break;
            };
            let (frame_number, frame) = sample?;
            samples += 1;

            let decision = detector.evaluate(&frame);
            if decision.retain {
                let path = scratch
                    .path()
                    .join(slide_file_name(frame_number, frames_per_second));
                save_slide(&frame, &path)?;
                slides += 1;
                log::debug!(
                    "Retained frame {frame_number} (score {})",
                    decision
                        .score
                        .map_or_else(|| "n/a".to_string(), |score| format!("{score:.4}"))
                );
            }
            tracker.advance(frame_number, decision.retain);
        }
        tracker.finish();

        log::debug!("Collating {slides} slides for {}", self.task.video.display());
        let images = collect_images(scratch.path())?;
        let document = assemble_pdf(&images)?;
        write_document(&self.task.output, &document)?;

        let scratch_dir = scratch.path().to_path_buf();
        scratch.release();

        log::info!(
            "Saved {slides} slides from {} to {}",
            self.task.video.display(),
            self.task.output.display()
        );
        Ok(ExtractionSummary {
            video: self.task.video.clone(),
            output: self.task.output.clone(),
            samples,
            slides,
            frame_step: sampler.frame_step(),
            scratch_dir,
            elapsed: started.elapsed(),
        })
    }
}

/// `frame_<index>_<hh-mm-ss.mmm>.jpg`: the zero-padded frame index leads so
/// lexical order is capture order; the video timestamp follows.
pub(crate) fn slide_file_name(frame_number: u64, frames_per_second: f64) -> String {
    let millis = (frame_number as f64 * 1000.0 / frames_per_second).round() as u64;
    let (hours, rest) = (millis / 3_600_000, millis % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    let (seconds, millis) = (rest / 1000, rest % 1000);
    format!("frame_{frame_number:010}_{hours:02}-{minutes:02}-{seconds:02}.{millis:03}.jpg")
}

fn save_slide(frame: &RgbImage, path: &Path) -> Result<(), SlideError> {
    let writer = BufWriter::new(File::create(path)?);
    JpegEncoder::new_with_quality(writer, SLIDE_QUALITY).encode_image(frame)?;
    Ok(())
}
