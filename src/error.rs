//! Error types for the `lecture2slides` crate.
//!
//! This module defines [`SlideError`], the unified error type returned by all
//! fallible operations in the crate, and [`ErrorClass`], which sorts errors
//! into the three buckets the batch coordinator cares about: problems with
//! the run's configuration, problems confined to one video, and interrupts.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

use crate::configuration::SlideBounds;

/// The unified error type for all `lecture2slides` operations.
///
/// Variants carry enough context to diagnose the problem without needing
/// additional logging at the call site.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SlideError {
    /// The input video or directory does not exist.
    #[error("Could not find {0}")]
    MissingInput(PathBuf),

    /// A batch scan found no files with a recognised video extension.
    #[error("No video files found under {0}")]
    NoVideosFound(PathBuf),

    /// The similarity threshold is outside the open interval (0, 1).
    #[error("Threshold must be between 0 and 1 (exclusive), got {0}")]
    InvalidThreshold(f64),

    /// The sample interval is zero.
    #[error("Sample interval must be greater than zero")]
    InvalidInterval,

    /// The crop rectangle is degenerate (`left >= right` or `top >= bottom`).
    #[error("Invalid slide bounds {0}: left must be < right and top must be < bottom")]
    InvalidBounds(SlideBounds),

    /// The video file could not be opened.
    #[error("Failed to open video at {path}: {reason}")]
    FileOpen {
        /// Path that was passed to the video source.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The file does not contain a video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// The source reported a frame rate that cannot drive sampling.
    #[error("Video reports an unusable frame rate ({0})")]
    InvalidFrameRate(f64),

    /// A video frame could not be decoded.
    #[error("Failed to decode video frame: {0}")]
    VideoDecodeError(String),

    /// The crop rectangle does not fit inside the decoded frame.
    #[error("Slide bounds {bounds} fall outside the {width}x{height} video frame")]
    CropOutOfBounds {
        /// The configured crop rectangle.
        bounds: SlideBounds,
        /// Width of the decoded frame.
        width: u32,
        /// Height of the decoded frame.
        height: u32,
    },

    /// The output document could not be assembled.
    #[error("Failed to assemble document: {0}")]
    DocumentError(String),

    /// The output document could not be written.
    #[error("Failed to write output {path}: {source}")]
    OutputWrite {
        /// Destination that was being written.
        path: PathBuf,
        /// Underlying I/O failure.
        source: IoError,
    },

    /// The worker pool could not be created.
    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while encoding or decoding a frame.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<FfmpegError> for SlideError {
    fn from(error: FfmpegError) -> Self {
        SlideError::FfmpegError(error.to_string())
    }
}

/// Coarse classification of a [`SlideError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The run cannot start: bad options, missing input, nothing to do.
    Configuration,
    /// One video could not be processed; its siblings are unaffected.
    PerVideo,
    /// The user interrupted the run. Not a failure.
    Interrupt,
}

impl SlideError {
    /// Classify this error for reporting and propagation decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            SlideError::MissingInput(_)
            | SlideError::NoVideosFound(_)
            | SlideError::InvalidThreshold(_)
            | SlideError::InvalidInterval
            | SlideError::InvalidBounds(_)
            | SlideError::WorkerPool(_) => ErrorClass::Configuration,
            SlideError::Cancelled => ErrorClass::Interrupt,
            _ => ErrorClass::PerVideo,
        }
    }

    /// Returns `true` if this error represents a user interrupt.
    pub fn is_cancelled(&self) -> bool {
        self.class() == ErrorClass::Interrupt
    }
}
