//! Blur scoring.
//!
//! A frame's sharpness is the variance of its Laplacian edge response over
//! the single-channel intensity image. Blurry frames have little
//! high-frequency detail, so their Laplacian is flat and its variance low.
//!
//! The Laplacian uses the 4-neighbour kernel
//!
//! ```text
//! 0  1  0
//! 1 -4  1
//! 0  1  0
//! ```
//!
//! with reflect-101 borders (`gfedcb|abcdefgh|gfedcba`), and intensity uses
//! the BT.601 luma weights in 14-bit fixed point, so scores match the ones
//! produced by OpenCV's `Laplacian(gray, CV_64F).var()`.
//!
//! # Example
//!
//! ```
//! use framesieve::BlurScorer;
//! use image::{DynamicImage, GrayImage, Luma};
//!
//! let flat = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([128])));
//! let scorer = BlurScorer::new(5.0);
//! assert_eq!(scorer.score(&flat), 0.0);
//! assert!(!scorer.accepts(0.0));
//! ```

use image::{DynamicImage, GrayImage, Luma};

#[cfg(feature = "rayon")]
use rayon::iter::{IntoParallelIterator, ParallelIterator};

/// Classifies frames as sharp enough to keep against a fixed threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurScorer {
    threshold: f64,
}

impl BlurScorer {
    /// Create a scorer that keeps frames whose sharpness is strictly above
    /// `threshold`.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// The acceptance threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Sharpness score of `frame`. See [`sharpness`].
    pub fn score(&self, frame: &DynamicImage) -> f64 {
        sharpness(frame)
    }

    /// Whether a frame with this sharpness is kept. See [`accept`].
    pub fn accepts(&self, sharpness: f64) -> bool {
        accept(sharpness, self.threshold)
    }
}

/// `true` iff `sharpness > threshold`. Equal values are rejected.
pub fn accept(sharpness: f64, threshold: f64) -> bool {
    sharpness > threshold
}

/// Variance of the Laplacian of `frame`'s intensity. Always `>= 0`.
///
/// An empty image scores `0.0`.
pub fn sharpness(frame: &DynamicImage) -> f64 {
    laplacian_variance(&to_intensity(frame))
}

/// Convert a frame to 8-bit intensity with BT.601 weights.
///
/// Grayscale input is passed through unchanged.
pub fn to_intensity(frame: &DynamicImage) -> GrayImage {
    if let DynamicImage::ImageLuma8(gray) = frame {
        return gray.clone();
    }

    let rgb = frame.to_rgb8();
    let mut gray = GrayImage::new(rgb.width(), rgb.height());
    for (source, target) in rgb.pixels().zip(gray.pixels_mut()) {
        let [r, g, b] = source.0;
        // 0.299, 0.587 and 0.114 scaled by 2^14, rounded.
        let luma = (r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + (1 << 13)) >> 14;
        *target = Luma([luma.min(255) as u8]);
    }
    gray
}

/// Population variance of the 4-neighbour Laplacian response.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    if width == 0 || height == 0 {
        return 0.0;
    }

    #[cfg(feature = "rayon")]
    let (sum, sum_of_squares) = (0..height)
        .into_par_iter()
        .map(|y| row_moments(gray, y))
        .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1));

    #[cfg(not(feature = "rayon"))]
    let (sum, sum_of_squares) = (0..height)
        .map(|y| row_moments(gray, y))
        .fold((0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1));

    let count = (width * height) as f64;
    let mean = sum / count;
    (sum_of_squares / count - mean * mean).max(0.0)
}

/// Sum and sum of squares of the Laplacian over one row.
fn row_moments(gray: &GrayImage, y: usize) -> (f64, f64) {
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    let pixel = |x: usize, y: usize| gray.get_pixel(x as u32, y as u32).0[0] as i32;

    let up = reflect101(y as isize - 1, height);
    let down = reflect101(y as isize + 1, height);

    let mut sum = 0.0;
    let mut sum_of_squares = 0.0;
    for x in 0..width {
        let left = reflect101(x as isize - 1, width);
        let right = reflect101(x as isize + 1, width);
        let response = pixel(x, up) + pixel(x, down) + pixel(left, y) + pixel(right, y)
            - 4 * pixel(x, y);
        let response = response as f64;
        sum += response;
        sum_of_squares += response * response;
    }
    (sum, sum_of_squares)
}

/// Reflect-101 border handling for an index at most one step out of bounds.
fn reflect101(index: isize, len: usize) -> usize {
    let len = len as isize;
    if len == 1 {
        return 0;
    }
    if index < 0 {
        (-index) as usize
    } else if index >= len {
        (2 * len - 2 - index) as usize
    } else {
        index as usize
    }
}
