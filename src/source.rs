//! Video sources.
//!
//! [`VideoSource`] is the seam between slide detection and video decoding:
//! a seekable cursor over decoded RGB frames that also reports the frame
//! rate and frame count sampling is planned from. [`FfmpegVideoSource`] is
//! the production implementation, decoding with FFmpeg via `ffmpeg-next`.
//!
//! # Example
//!
//! ```no_run
//! use lecture2slides::{FfmpegVideoSource, VideoSource};
//!
//! let mut source = FfmpegVideoSource::open("lecture.mp4")?;
//! println!("{} frames at {:.2} fps", source.frame_count(), source.frame_rate());
//! source.seek(300)?;
//! if let Some(frame) = source.read()? {
//!     frame.save("frame_300.png")?;
//! }
//! # Ok::<(), lecture2slides::SlideError>(())
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    time::Duration,
};

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::RgbImage;

use crate::conversion::{
    frame_number_to_seek_timestamp, frame_to_buffer, pts_to_frame_number, rational_to_f64,
};
use crate::error::SlideError;

/// Forward distance (in frames) below which a seek decodes through the gap
/// instead of asking the demuxer to jump.
const SEQUENTIAL_SEEK_LIMIT: u64 = 90;

/// Consecutive unreadable packets tolerated before decoding gives up.
const MAX_READ_ERRORS: u32 = 64;

/// A seekable cursor over the decoded frames of one video.
///
/// The cursor position is the index of the frame the next [`read`](VideoSource::read)
/// returns. A source is owned by exactly one extraction at a time.
pub trait VideoSource {
    /// Frames per second reported by the container.
    fn frame_rate(&self) -> f64;

    /// Total number of frames (may be an estimate for some containers).
    fn frame_count(&self) -> u64;

    /// `(width, height)` of decoded frames.
    fn dimensions(&self) -> (u32, u32);

    /// Index of the frame the next `read` returns.
    fn position(&self) -> u64;

    /// Move the cursor to `frame_number`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying demuxer cannot seek.
    fn seek(&mut self, frame_number: u64) -> Result<(), SlideError>;

    /// Decode the frame at the cursor and advance past it.
    ///
    /// Returns `Ok(None)` once no frame exists at or after the cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    fn read(&mut self) -> Result<Option<RgbImage>, SlideError>;
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn frame_rate(&self) -> f64 {
        (**self).frame_rate()
    }

    fn frame_count(&self) -> u64 {
        (**self).frame_count()
    }

    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn seek(&mut self, frame_number: u64) -> Result<(), SlideError> {
        (**self).seek(frame_number)
    }

    fn read(&mut self) -> Result<Option<RgbImage>, SlideError> {
        (**self).read()
    }
}

/// Stream properties captured when a video is opened.
#[derive(Debug, Clone)]
#[must_use]
pub struct VideoMetadata {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second (average rate for variable-frame-rate content).
    pub frames_per_second: f64,
    /// Frame count from the stream header, or estimated from duration.
    pub frame_count: u64,
    /// Stream duration.
    pub duration: Duration,
    /// Codec name (e.g. `"h264"`).
    pub codec: String,
}

/// A [`VideoSource`] backed by FFmpeg.
///
/// Decodes the best video stream of a file and converts every frame to
/// RGB24. Short forward seeks decode through the gap; long or backward
/// seeks jump to the preceding keyframe and decode forward from there.
pub struct FfmpegVideoSource {
    input_context: Input,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    video_stream_index: usize,
    time_base: Rational,
    start_pts: i64,
    metadata: VideoMetadata,
    file_path: PathBuf,
    decoded_frame: VideoFrame,
    rgb_frame: VideoFrame,
    position: u64,
    decoded_count: u64,
    eof_sent: bool,
    exhausted: bool,
}

impl Debug for FfmpegVideoSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FfmpegVideoSource")
            .field("file_path", &self.file_path)
            .field("metadata", &self.metadata)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl FfmpegVideoSource {
    /// Open a video file.
    ///
    /// Initializes FFmpeg (idempotent), opens the file, selects the best
    /// video stream, and prepares a decoder and an RGB24 converter.
    ///
    /// # Errors
    ///
    /// - [`SlideError::FileOpen`] if the file cannot be opened or decoded.
    /// - [`SlideError::NoVideoStream`] if it has no video stream.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SlideError> {
        let path = path.as_ref();
        let file_path = path.to_path_buf();
        let open_error = |reason: String| SlideError::FileOpen {
            path: file_path.clone(),
            reason,
        };

        log::debug!("Opening video: {}", file_path.display());

        ffmpeg_next::init()
            .map_err(|error| open_error(format!("FFmpeg initialisation failed: {error}")))?;

        let input_context =
            ffmpeg_next::format::input(&path).map_err(|error| open_error(error.to_string()))?;

        let container_duration = {
            let microseconds = input_context.duration();
            if microseconds > 0 {
                Duration::from_micros(microseconds as u64)
            } else {
                Duration::ZERO
            }
        };

        let (video_stream_index, time_base, start_pts, frames_per_second, header_frames, stream_duration, parameters) = {
            let stream = input_context
                .streams()
                .best(Type::Video)
                .ok_or(SlideError::NoVideoStream)?;
            let time_base = stream.time_base();
            let frames_per_second = rational_to_f64(stream.avg_frame_rate())
                .or_else(|| rational_to_f64(stream.rate()))
                .unwrap_or(0.0);
            let stream_duration = rational_to_f64(time_base)
                .filter(|_| stream.duration() > 0)
                .map(|seconds_per_tick| {
                    Duration::from_secs_f64(stream.duration() as f64 * seconds_per_tick)
                });
            // AV_NOPTS_VALUE is i64::MIN.
            let start_pts = match stream.start_time() {
                i64::MIN => 0,
                start => start,
            };
            (
                stream.index(),
                time_base,
                start_pts,
                frames_per_second,
                stream.frames(),
                stream_duration,
                stream.parameters(),
            )
        };

        let decoder_context = CodecContext::from_parameters(parameters)
            .map_err(|error| open_error(format!("Failed to read codec parameters: {error}")))?;
        let decoder = decoder_context
            .decoder()
            .video()
            .map_err(|error| open_error(format!("Failed to create video decoder: {error}")))?;

        let width = decoder.width();
        let height = decoder.height();
        let codec = decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let scaler = ScalingContext::get(
            decoder.format(),
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            ScalingFlags::BILINEAR,
        )?;

        let duration = stream_duration.unwrap_or(container_duration);
        let frame_count = if header_frames > 0 {
            header_frames as u64
        } else {
            (duration.as_secs_f64() * frames_per_second) as u64
        };

        let metadata = VideoMetadata {
            width,
            height,
            frames_per_second,
            frame_count,
            duration,
            codec,
        };
        log::debug!(
            "{}: {}x{} @ {:.3} fps, {} frames [{}]",
            file_path.display(),
            metadata.width,
            metadata.height,
            metadata.frames_per_second,
            metadata.frame_count,
            metadata.codec,
        );

        Ok(Self {
            input_context,
            decoder,
            scaler,
            video_stream_index,
            time_base,
            start_pts,
            metadata,
            file_path,
            decoded_frame: VideoFrame::empty(),
            rgb_frame: VideoFrame::empty(),
            position: 0,
            decoded_count: 0,
            eof_sent: false,
            exhausted: false,
        })
    }

    /// Stream properties captured at open time.
    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    /// The path this source was opened from.
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn frame_number_of_decoded(&self) -> u64 {
        match self.decoded_frame.timestamp().or_else(|| self.decoded_frame.pts()) {
            Some(pts) => pts_to_frame_number(
                pts,
                self.start_pts,
                self.time_base,
                self.metadata.frames_per_second,
            ),
            None => self.decoded_count,
        }
    }

    fn convert_decoded(&mut self) -> Result<RgbImage, SlideError> {
        self.scaler.run(&self.decoded_frame, &mut self.rgb_frame)?;
        let width = self.metadata.width;
        let height = self.metadata.height;
        let buffer = frame_to_buffer(&self.rgb_frame, width, height, 3);
        RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
            SlideError::VideoDecodeError(
                "Failed to construct RGB image from decoded frame data".to_string(),
            )
        })
    }

    /// Jump to the keyframe preceding `frame_number` and reset the decoder.
    fn demuxer_seek(&mut self, frame_number: u64) -> Result<(), SlideError> {
        let timestamp =
            frame_number_to_seek_timestamp(frame_number, self.metadata.frames_per_second);
        self.input_context.seek(timestamp, ..timestamp)?;
        self.decoder.flush();
        self.eof_sent = false;
        self.exhausted = false;
        // Frames without a PTS are numbered from the seek target.
        self.decoded_count = frame_number;
        Ok(())
    }
}

impl VideoSource for FfmpegVideoSource {
    fn frame_rate(&self) -> f64 {
        self.metadata.frames_per_second
    }

    fn frame_count(&self) -> u64 {
        self.metadata.frame_count
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.metadata.width, self.metadata.height)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, frame_number: u64) -> Result<(), SlideError> {
        if frame_number == self.position {
            return Ok(());
        }

        let forward = frame_number > self.position;
        if !forward || frame_number - self.position > SEQUENTIAL_SEEK_LIMIT {
            log::trace!(
                "{}: seeking {} -> {}",
                self.file_path.display(),
                self.position,
                frame_number
            );
            self.demuxer_seek(frame_number)?;
        }
        self.position = frame_number;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<RgbImage>, SlideError> {
        if self.exhausted {
            return Ok(None);
        }

        let mut read_errors = 0;
        loop {
            // Drain frames the decoder has already produced.
            if self.decoder.receive_frame(&mut self.decoded_frame).is_ok() {
                let frame_number = self.frame_number_of_decoded();
                self.decoded_count = frame_number + 1;
                if frame_number < self.position {
                    continue;
                }
                let image = self.convert_decoded()?;
                self.position = frame_number + 1;
                return Ok(Some(image));
            }

            if self.eof_sent {
                self.exhausted = true;
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input_context) {
                Ok(()) => {
                    read_errors = 0;
                    if packet.stream() == self.video_stream_index {
                        self.decoder.send_packet(&packet)?;
                    }
                }
                Err(FfmpegError::Eof) => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
                Err(error) => {
                    read_errors += 1;
                    if read_errors >= MAX_READ_ERRORS {
                        return Err(SlideError::VideoDecodeError(format!(
                            "{}: giving up after repeated read errors: {error}",
                            self.file_path.display()
                        )));
                    }
                }
            }
        }
    }
}
