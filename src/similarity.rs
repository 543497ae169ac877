//! Structural similarity between grayscale frames.
//!
//! [`StructuralSimilarity`] computes the mean SSIM index of two images over
//! every 7×7 window that fits inside them, with the usual stabilising
//! constants for 8-bit data (`K1 = 0.01`, `K2 = 0.03`, `L = 255`) and sample
//! (unbiased) variances. Window sums come from summed-area tables, so the cost
//! is linear in the pixel count regardless of window size.
//!
//! Scores lie in `[-1, 1]`; identical images score exactly `1.0`.

use image::GrayImage;

const WINDOW: u32 = 7;
const DATA_RANGE: f64 = 255.0;
const C1: f64 = (0.01 * DATA_RANGE) * (0.01 * DATA_RANGE);
const C2: f64 = (0.03 * DATA_RANGE) * (0.03 * DATA_RANGE);

/// Scores how alike two equally-sized grayscale images are.
///
/// Higher is more alike. Implementations must be thread-safe: extractors
/// (and the measure they hold) run on batch worker threads.
pub trait SimilarityMeasure: Send + Sync {
    fn score(&self, reference: &GrayImage, candidate: &GrayImage) -> f64;
}

/// Mean structural similarity (SSIM) with a uniform 7×7 window.
///
/// Images smaller than the window in either dimension are compared as one
/// window covering the whole image. Images of different sizes score `-1.0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralSimilarity;

impl SimilarityMeasure for StructuralSimilarity {
    fn score(&self, reference: &GrayImage, candidate: &GrayImage) -> f64 {
        structural_similarity(reference, candidate)
    }
}

/// Mean SSIM of two grayscale images. See [`StructuralSimilarity`].
pub fn structural_similarity(reference: &GrayImage, candidate: &GrayImage) -> f64 {
    if reference.dimensions() != candidate.dimensions() {
        return -1.0;
    }
    let (width, height) = reference.dimensions();
    if width == 0 || height == 0 {
        return 1.0;
    }

    let tables = SummedAreaTables::build(reference, candidate);
    let window_width = WINDOW.min(width);
    let window_height = WINDOW.min(height);

    let mut total = 0.0;
    let mut windows = 0u64;
    for top in 0..=(height - window_height) {
        for left in 0..=(width - window_width) {
            let sums = tables.window(left, top, window_width, window_height);
            total += sums.ssim(u64::from(window_width) * u64::from(window_height));
            windows += 1;
        }
    }
    total / windows as f64
}

/// Raw sums over one window.
struct WindowSums {
    x: f64,
    y: f64,
    xx: f64,
    yy: f64,
    xy: f64,
}

impl WindowSums {
    fn ssim(&self, count: u64) -> f64 {
        let n = count as f64;
        let mean_x = self.x / n;
        let mean_y = self.y / n;
        // Sample covariance: n / (n - 1) correction on the population value.
        let correction = if count > 1 { n / (n - 1.0) } else { 1.0 };
        let var_x = correction * (self.xx / n - mean_x * mean_x);
        let var_y = correction * (self.yy / n - mean_y * mean_y);
        let cov_xy = correction * (self.xy / n - mean_x * mean_y);

        let numerator = (2.0 * mean_x * mean_y + C1) * (2.0 * cov_xy + C2);
        let denominator = (mean_x * mean_x + mean_y * mean_y + C1) * (var_x + var_y + C2);
        numerator / denominator
    }
}

/// Summed-area tables of `x`, `y`, `x²`, `y²` and `xy`, with a zero row and
/// column prepended.
struct SummedAreaTables {
    stride: usize,
    x: Vec<f64>,
    y: Vec<f64>,
    xx: Vec<f64>,
    yy: Vec<f64>,
    xy: Vec<f64>,
}

impl SummedAreaTables {
    fn build(reference: &GrayImage, candidate: &GrayImage) -> Self {
        let (width, height) = reference.dimensions();
        let stride = width as usize + 1;
        let len = stride * (height as usize + 1);
        let mut tables = Self {
            stride,
            x: vec![0.0; len],
            y: vec![0.0; len],
            xx: vec![0.0; len],
            yy: vec![0.0; len],
            xy: vec![0.0; len],
        };

        let reference = reference.as_raw();
        let candidate = candidate.as_raw();
        for row in 0..height as usize {
            let (mut x, mut y, mut xx, mut yy, mut xy) = (0.0, 0.0, 0.0, 0.0, 0.0);
            for column in 0..width as usize {
                let pixel = row * width as usize + column;
                let a = f64::from(reference[pixel]);
                let b = f64::from(candidate[pixel]);
                x += a;
                y += b;
                xx += a * a;
                yy += b * b;
                xy += a * b;

                let above = row * stride + column + 1;
                let here = above + stride;
                tables.x[here] = tables.x[above] + x;
                tables.y[here] = tables.y[above] + y;
                tables.xx[here] = tables.xx[above] + xx;
                tables.yy[here] = tables.yy[above] + yy;
                tables.xy[here] = tables.xy[above] + xy;
            }
        }
        tables
    }

    fn window(&self, left: u32, top: u32, width: u32, height: u32) -> WindowSums {
        let top_left = top as usize * self.stride + left as usize;
        let top_right = top_left + width as usize;
        let bottom_left = top_left + height as usize * self.stride;
        let bottom_right = bottom_left + width as usize;
        let area = |table: &[f64]| {
            table[bottom_right] - table[bottom_left] - table[top_right] + table[top_left]
        };
        WindowSums {
            x: area(&self.x),
            y: area(&self.y),
            xx: area(&self.xx),
            yy: area(&self.yy),
            xy: area(&self.xy),
        }
    }
}
