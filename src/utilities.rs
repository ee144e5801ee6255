//! Internal utility functions.
//!
//! Helpers for pixel-data copying and frame-number/timestamp conversion used
//! by the FFmpeg-backed [`VideoFile`](crate::VideoFile).

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Copy pixel data from an FFmpeg video frame into a tightly-packed buffer.
///
/// FFmpeg frames frequently carry per-row padding (stride > width × bpp).
/// This strips that padding so the result can be handed to
/// [`image::RgbImage::from_raw`].
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let expected_stride = (width as usize) * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == expected_stride {
        data[..expected_stride * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(expected_stride * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + expected_stride]);
        }
        buffer
    }
}

/// Convert a frame index to a seek timestamp in AV_TIME_BASE (microseconds).
///
/// `Input::seek` seeks with `stream_index = -1`, which expects AV_TIME_BASE
/// rather than the stream's own time base.
pub(crate) fn frame_number_to_seek_timestamp(frame_number: u64, frames_per_second: f64) -> i64 {
    if frames_per_second <= 0.0 {
        return 0;
    }
    let seconds = frame_number as f64 / frames_per_second;
    (seconds * 1_000_000.0) as i64
}

/// Rescale a PTS value, relative to the stream start, to a frame index.
///
/// Rounds to the nearest index so that timestamps which land a hair before
/// the exact frame boundary map to the intended frame.
pub(crate) fn pts_to_frame_number(
    pts: i64,
    start_pts: i64,
    time_base: Rational,
    frames_per_second: f64,
) -> u64 {
    let seconds = (pts - start_pts) as f64 * time_base.numerator() as f64
        / time_base.denominator() as f64;
    (seconds * frames_per_second).round().max(0.0) as u64
}
