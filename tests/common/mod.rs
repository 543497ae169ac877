//! Shared helpers: an in-memory [`VideoSource`] with scripted content.

#![allow(dead_code)]

use std::sync::Arc;

use image::{Rgb, RgbImage};
use lecture2slides::{SlideBounds, SlideError, SlideSettings, VideoSource};

pub const WIDTH: u32 = 320;
pub const HEIGHT: u32 = 240;

type FrameFn = Arc<dyn Fn(u64) -> RgbImage + Send + Sync>;
type ReadHook = Arc<dyn Fn(u64) + Send + Sync>;

/// Slide area of the synthetic lecture frames.
pub fn lecture_bounds() -> SlideBounds {
    SlideBounds::new(16, 16, 304, 224)
}

/// Settings used by the end-to-end scenarios: 1 s interval, threshold 0.85.
pub fn lecture_settings(save_initial: bool) -> SlideSettings {
    SlideSettings::new()
        .with_threshold(0.85)
        .with_save_initial(save_initial)
        .with_bounds(lecture_bounds())
        .with_interval_secs(1)
}

/// Dark text bands running across the frame.
pub fn horizontal_stripes(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |_, y| {
        let value = if (y / 16) % 2 == 0 { 30 } else { 220 };
        Rgb([value, value, value])
    })
}

/// Dark columns running down the frame.
pub fn vertical_stripes(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| {
        let value = if (x / 16) % 2 == 0 { 30 } else { 220 };
        Rgb([value, value, value])
    })
}

/// A scripted, seekable video.
#[derive(Clone)]
pub struct SyntheticVideo {
    frame_rate: f64,
    frame_count: u64,
    width: u32,
    height: u32,
    position: u64,
    frames: FrameFn,
    read_hook: Option<ReadHook>,
    fail_at: Option<u64>,
}

impl SyntheticVideo {
    pub fn new<F>(frame_rate: f64, frame_count: u64, width: u32, height: u32, frames: F) -> Self
    where
        F: Fn(u64) -> RgbImage + Send + Sync + 'static,
    {
        Self {
            frame_rate,
            frame_count,
            width,
            height,
            position: 0,
            frames: Arc::new(frames),
            read_hook: None,
            fail_at: None,
        }
    }

    /// 10 seconds at 10 fps: one slide for the first 5 seconds, an abrupt
    /// change to a different slide at second 5.
    pub fn lecture() -> Self {
        Self::new(10.0, 100, WIDTH, HEIGHT, |frame| {
            if frame < 50 {
                horizontal_stripes(WIDTH, HEIGHT)
            } else {
                vertical_stripes(WIDTH, HEIGHT)
            }
        })
    }

    /// The same slide for every frame.
    pub fn still(frame_count: u64) -> Self {
        Self::new(10.0, frame_count, WIDTH, HEIGHT, |_| {
            horizontal_stripes(WIDTH, HEIGHT)
        })
    }

    /// Call `hook` with the frame number before every successful read.
    pub fn with_read_hook<H>(mut self, hook: H) -> Self
    where
        H: Fn(u64) + Send + Sync + 'static,
    {
        self.read_hook = Some(Arc::new(hook));
        self
    }

    /// Fail every read at or after `frame`.
    pub fn failing_at(mut self, frame: u64) -> Self {
        self.fail_at = Some(frame);
        self
    }
}

impl VideoSource for SyntheticVideo {
    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, frame_number: u64) -> Result<(), SlideError> {
        self.position = frame_number;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<RgbImage>, SlideError> {
        if self.fail_at.is_some_and(|frame| self.position >= frame) {
            return Err(SlideError::VideoDecodeError(format!(
                "synthetic failure at frame {}",
                self.position
            )));
        }
        if self.position >= self.frame_count {
            return Ok(None);
        }
        if let Some(hook) = &self.read_hook {
            hook(self.position);
        }
        let frame = (self.frames)(self.position);
        self.position += 1;
        Ok(Some(frame))
    }
}

/// Number of pages in the PDF at `path`.
pub fn page_count(path: &std::path::Path) -> usize {
    lopdf::Document::load(path)
        .expect("Failed to parse PDF")
        .get_pages()
        .len()
}

/// Number of entries directly inside `directory`.
pub fn entry_count(directory: &std::path::Path) -> usize {
    std::fs::read_dir(directory)
        .expect("Failed to list directory")
        .count()
}
