//! Slide-change detection.
//!
//! [`ChangeDetector`] decides, sample by sample, whether a cropped frame
//! shows a new slide. It carries exactly one piece of state: the grayscale
//! reference frame that new samples are compared against.
//!
//! The reference is the first sample of the video, and after that the most
//! recently *retained* sample. Samples that are not retained never replace
//! it, so a slow drift (each sample only slightly different from the one
//! before) still triggers a new slide once it has moved far enough from the
//! last saved one.

use std::sync::Arc;

use image::{GrayImage, RgbImage, imageops};

use crate::configuration::SlideSettings;
use crate::similarity::{SimilarityMeasure, StructuralSimilarity};

/// Outcome of evaluating one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Whether the sample should be saved as a slide.
    pub retain: bool,
    /// Similarity to the reference, or `None` for the first sample.
    pub score: Option<f64>,
}

/// Stateful retain/skip decision for the samples of one video.
pub struct ChangeDetector {
    measure: Arc<dyn SimilarityMeasure>,
    threshold: f64,
    save_initial: bool,
    reference: Option<GrayImage>,
}

impl ChangeDetector {
    /// A detector using [`StructuralSimilarity`].
    pub fn new(threshold: f64, save_initial: bool) -> Self {
        Self::with_measure(Arc::new(StructuralSimilarity), threshold, save_initial)
    }

    /// A detector using a custom similarity measure.
    pub fn with_measure(
        measure: Arc<dyn SimilarityMeasure>,
        threshold: f64,
        save_initial: bool,
    ) -> Self {
        Self {
            measure,
            threshold,
            save_initial,
            reference: None,
        }
    }

    /// A detector configured from run settings.
    pub fn from_settings(measure: Arc<dyn SimilarityMeasure>, settings: &SlideSettings) -> Self {
        Self::with_measure(measure, settings.threshold, settings.save_initial)
    }

    /// Evaluate a color sample.
    pub fn evaluate(&mut self, frame: &RgbImage) -> Decision {
        self.evaluate_gray(imageops::grayscale(frame))
    }

    /// Evaluate a sample that is already grayscale.
    pub fn evaluate_gray(&mut self, frame: GrayImage) -> Decision {
        let Some(reference) = &self.reference else {
            self.reference = Some(frame);
            return Decision {
                retain: self.save_initial,
                score: None,
            };
        };

        let score = self.measure.score(reference, &frame);
        let retain = score < self.threshold;
        if retain {
            self.reference = Some(frame);
        }
        Decision {
            retain,
            score: Some(score),
        }
    }

    /// Whether any sample has been evaluated yet.
    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }
}

#[cfg(test)]
mod tests {
    use image::Luma;

    use super::*;

    /// Scores by the difference of the top-left pixel: 1.0 when equal, 1/128
    /// lower per intensity step.
    struct PixelDistance;

    impl SimilarityMeasure for PixelDistance {
        fn score(&self, reference: &GrayImage, candidate: &GrayImage) -> f64 {
            let a = f64::from(reference.get_pixel(0, 0)[0]);
            let b = f64::from(candidate.get_pixel(0, 0)[0]);
            1.0 - (a - b).abs() / 128.0
        }
    }

    fn flat(value: u8) -> GrayImage {
        GrayImage::from_pixel(4, 4, Luma([value]))
    }

    fn retained(detector: &mut ChangeDetector, values: &[u8]) -> Vec<u8> {
        values
            .iter()
            .copied()
            .filter(|&value| detector.evaluate_gray(flat(value)).retain)
            .collect()
    }

    #[test]
    fn first_sample_follows_save_initial() {
        let mut saving = ChangeDetector::with_measure(Arc::new(PixelDistance), 0.85, true);
        let decision = saving.evaluate_gray(flat(10));
        assert!(decision.retain);
        assert_eq!(decision.score, None);

        let mut skipping = ChangeDetector::with_measure(Arc::new(PixelDistance), 0.85, false);
        assert!(!skipping.evaluate_gray(flat(10)).retain);
        assert!(skipping.has_reference());
    }

    #[test]
    fn unretained_first_sample_is_still_the_reference() {
        let mut detector = ChangeDetector::with_measure(Arc::new(PixelDistance), 0.85, false);
        assert_eq!(retained(&mut detector, &[0, 0, 40, 40]), vec![40]);
    }

    #[test]
    fn drift_is_measured_against_last_retained() {
        // Consecutive samples differ by 4 (score ~0.97), but the distance to
        // the last retained sample keeps growing.
        let mut detector = ChangeDetector::with_measure(Arc::new(PixelDistance), 0.85, true);
        let drifting: Vec<u8> = (0..=10).map(|step| step * 4).collect();
        assert_eq!(retained(&mut detector, &drifting), vec![0, 20, 40]);
    }

    #[test]
    fn score_equal_to_threshold_is_not_a_change() {
        let mut detector = ChangeDetector::with_measure(Arc::new(PixelDistance), 0.875, false);
        detector.evaluate_gray(flat(0));
        let decision = detector.evaluate_gray(flat(16));
        assert!(!decision.retain);
        assert_eq!(decision.score, Some(0.875));
    }

    #[test]
    fn structural_detector_ignores_identical_frames() {
        let frame = RgbImage::from_fn(32, 24, |x, y| image::Rgb([x as u8 * 8, y as u8 * 10, 90]));
        let mut detector = ChangeDetector::new(0.99, false);
        for _ in 0..5 {
            assert!(!detector.evaluate(&frame).retain);
        }
    }
}
