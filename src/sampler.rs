//! Fixed-cadence frame sampling.
//!
//! [`FrameSampler`] is a lazy, pull-based iterator over a [`VideoSource`]:
//! each call to [`next()`](Iterator::next) seeks to the next sampling point,
//! decodes one frame, and crops it to the slide rectangle. The sampler owns
//! the source (and its cursor) for its whole lifetime.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use lecture2slides::{FfmpegVideoSource, FrameSampler, SlideBounds};
//!
//! let source = FfmpegVideoSource::open("lecture.mp4")?;
//! let sampler = FrameSampler::new(source, Duration::from_secs(2), SlideBounds::default())?;
//! for sample in sampler {
//!     let (frame_number, slide) = sample?;
//!     slide.save(format!("sample_{frame_number}.png"))?;
//! }
//! # Ok::<(), lecture2slides::SlideError>(())
//! ```

use std::time::Duration;

use image::{RgbImage, imageops};

use crate::configuration::SlideBounds;
use crate::error::SlideError;
use crate::source::VideoSource;

/// Number of source frames between samples: `round(interval × fps)`, at
/// least one.
pub fn frame_step(interval: Duration, frames_per_second: f64) -> u64 {
    ((interval.as_secs_f64() * frames_per_second).round() as u64).max(1)
}

/// Expected number of samples for progress reporting:
/// `floor(frame_count / frame_step)`.
pub fn expected_samples(frame_count: u64, frame_step: u64) -> u64 {
    frame_count / frame_step.max(1)
}

/// A lazy iterator over `(frame_number, cropped_frame)` samples.
///
/// The sequence ends when the source has no frame at or after the next
/// sampling point. It cannot be restarted. The first error ends iteration.
pub struct FrameSampler<S: VideoSource> {
    source: S,
    bounds: SlideBounds,
    frame_step: u64,
    frame_count: u64,
    next_position: u64,
    done: bool,
}

impl<S: VideoSource> FrameSampler<S> {
    /// Prepare to sample `source` every `interval`, cropping to `bounds`.
    ///
    /// # Errors
    ///
    /// - [`SlideError::InvalidInterval`] for a zero interval.
    /// - [`SlideError::InvalidFrameRate`] if the source reports no usable
    ///   frame rate.
    /// - [`SlideError::InvalidBounds`] / [`SlideError::CropOutOfBounds`] if
    ///   the rectangle is empty or does not fit the source's frames.
    pub fn new(source: S, interval: Duration, bounds: SlideBounds) -> Result<Self, SlideError> {
        if interval.is_zero() {
            return Err(SlideError::InvalidInterval);
        }
        let frames_per_second = source.frame_rate();
        if !(frames_per_second.is_finite() && frames_per_second > 0.0) {
            return Err(SlideError::InvalidFrameRate(frames_per_second));
        }
        let (width, height) = source.dimensions();
        bounds.check_fits(width, height)?;

        let frame_step = frame_step(interval, frames_per_second);
        let frame_count = source.frame_count();
        let next_position = source.position();
        Ok(Self {
            source,
            bounds,
            frame_step,
            frame_count,
            next_position,
            done: false,
        })
    }

    /// Source frames between consecutive samples.
    pub fn frame_step(&self) -> u64 {
        self.frame_step
    }

    /// Samples expected over the whole video.
    pub fn expected_samples(&self) -> u64 {
        expected_samples(self.frame_count, self.frame_step)
    }

    fn sample(&mut self) -> Result<Option<(u64, RgbImage)>, SlideError> {
        let frame_number = self.next_position;
        self.source.seek(frame_number)?;
        let Some(frame) = self.source.read()? else {
            return Ok(None);
        };

        // Frame size is checked per frame as well: some streams change
        // resolution mid-way.
        self.bounds.check_fits(frame.width(), frame.height())?;
        let slide = imageops::crop_imm(
            &frame,
            self.bounds.left,
            self.bounds.top,
            self.bounds.width(),
            self.bounds.height(),
        )
        .to_image();

        let next = frame_number + self.frame_step;
        self.next_position = if self.frame_count > 0 {
            next.min(self.frame_count)
        } else {
            next
        };
        if self.next_position <= frame_number {
            // Already at the reported end; nothing further to sample.
            self.done = true;
        }
        Ok(Some((frame_number, slide)))
    }
}

impl<S: VideoSource> Iterator for FrameSampler<S> {
    type Item = Result<(u64, RgbImage), SlideError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.sample() {
            Ok(Some(sample)) => Some(Ok(sample)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}
