//! Internal conversion helpers.
//!
//! Pixel-data copying and timestamp/frame-number arithmetic shared by the
//! FFmpeg-backed video source.

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Copy pixel data from an FFmpeg video frame into a tightly-packed buffer.
///
/// `bytes_per_pixel` is the number of bytes per pixel for the output format
/// (3 for RGB24). Row padding (`stride > width * bytes_per_pixel`) is
/// dropped.
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_bytes = (width as usize) * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == row_bytes {
        data[..row_bytes * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_bytes * (height as usize));
        for row in data.chunks(stride).take(height as usize) {
            buffer.extend_from_slice(&row[..row_bytes]);
        }
        buffer
    }
}

/// A rational as `f64`, or `None` when the denominator is zero.
pub(crate) fn rational_to_f64(rational: Rational) -> Option<f64> {
    if rational.denominator() == 0 || rational.numerator() <= 0 {
        return None;
    }
    Some(rational.numerator() as f64 / rational.denominator() as f64)
}

/// Rescale a PTS value (relative to the stream start) to a frame number.
pub(crate) fn pts_to_frame_number(
    pts: i64,
    start_pts: i64,
    time_base: Rational,
    frames_per_second: f64,
) -> u64 {
    let relative = pts.saturating_sub(start_pts).max(0);
    let seconds =
        relative as f64 * time_base.numerator() as f64 / time_base.denominator() as f64;
    (seconds * frames_per_second).round() as u64
}

/// Convert a frame number to a seek timestamp in AV_TIME_BASE (microseconds).
///
/// `Input::seek` with no stream index expects container-level timestamps.
pub(crate) fn frame_number_to_seek_timestamp(frame_number: u64, frames_per_second: f64) -> i64 {
    let seconds = frame_number as f64 / frames_per_second;
    (seconds * 1_000_000.0) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pts_maps_to_frame_numbers() {
        let time_base = Rational::new(1, 90_000);
        assert_eq!(pts_to_frame_number(0, 0, time_base, 30.0), 0);
        assert_eq!(pts_to_frame_number(3_000, 0, time_base, 30.0), 1);
        assert_eq!(pts_to_frame_number(93_000, 3_000, time_base, 30.0), 30);
    }

    #[test]
    fn pts_before_start_clamps_to_zero() {
        let time_base = Rational::new(1, 1_000);
        assert_eq!(pts_to_frame_number(-40, 0, time_base, 25.0), 0);
    }

    #[test]
    fn seek_timestamps_are_microseconds() {
        assert_eq!(frame_number_to_seek_timestamp(50, 25.0), 2_000_000);
        assert_eq!(frame_number_to_seek_timestamp(0, 30.0), 0);
    }

    #[test]
    fn zero_denominator_has_no_rate() {
        assert_eq!(rational_to_f64(Rational::new(30, 0)), None);
        assert_eq!(rational_to_f64(Rational::new(0, 1)), None);
        assert_eq!(rational_to_f64(Rational::new(30_000, 1_001)), Some(30_000.0 / 1_001.0));
    }
}
