//! Color-cluster pixel classifier.
//!
//! Reduces a decoded RGBA buffer to a single safety ratio: the percentage of
//! pixels whose alpha-weighted color falls inside any configured cluster.
//!
//! Each channel is multiplied by `alpha / 255` before matching, which pulls
//! translucent pixels toward black. Fully transparent regions therefore never
//! match a cluster whose lower bounds are above zero.

use image::RgbaImage;

use crate::config::ColorCluster;
use crate::error::{Error, Result};

/// Bytes per RGBA sample.
const CHANNELS: usize = 4;

/// Outcome of classifying one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationResult {
    /// Percentage of matched pixels in `[0, 100]`.
    pub ratio: f64,
    /// Number of pixels examined.
    pub sample_count: u64,
}

impl ClassificationResult {
    /// Whether the ratio clears the auto-reveal threshold.
    ///
    /// The comparison is strict: a ratio equal to the threshold stays hidden.
    #[must_use]
    pub fn is_below(&self, threshold: f64) -> bool {
        self.ratio < threshold
    }
}

/// Stateless classifier holding the configured clusters.
#[derive(Debug, Clone)]
pub struct PixelClassifier {
    clusters: Vec<ColorCluster>,
}

impl PixelClassifier {
    /// Create a classifier for the given clusters.
    #[must_use]
    pub fn new(clusters: Vec<ColorCluster>) -> Self {
        Self { clusters }
    }

    /// Clusters this classifier matches against.
    #[must_use]
    pub fn clusters(&self) -> &[ColorCluster] {
        &self.clusters
    }

    /// Whether an alpha-weighted color falls inside any cluster.
    #[must_use]
    pub fn matches(&self, r: f64, g: f64, b: f64) -> bool {
        self.clusters.iter().any(|c| c.contains(r, g, b))
    }

    /// Classify a flat RGBA buffer of `width * height` pixels.
    ///
    /// An empty image yields a ratio of 0.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PixelBuffer`] if `pixels` is not exactly
    /// `width * height * 4` bytes long.
    pub fn classify(&self, pixels: &[u8], width: u32, height: u32) -> Result<ClassificationResult> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(CHANNELS));
        if expected != Some(pixels.len()) {
            return Err(Error::PixelBuffer {
                width,
                height,
                expected: expected.unwrap_or(usize::MAX),
                actual: pixels.len(),
            });
        }

        let mut matched = 0u64;
        let mut total = 0u64;
        for px in pixels.chunks_exact(CHANNELS) {
            let opacity = f64::from(px[3]) / 255.0;
            let r = f64::from(px[0]) * opacity;
            let g = f64::from(px[1]) * opacity;
            let b = f64::from(px[2]) * opacity;
            total += 1;
            if self.matches(r, g, b) {
                matched += 1;
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let ratio = if total > 0 {
            matched as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Ok(ClassificationResult {
            ratio,
            sample_count: total,
        })
    }

    /// Classify an already decoded [`RgbaImage`].
    ///
    /// # Errors
    ///
    /// Same as [`PixelClassifier::classify`]; an `RgbaImage` always has a
    /// well-sized buffer, so this only fails on corrupted input.
    pub fn classify_image(&self, image: &RgbaImage) -> Result<ClassificationResult> {
        self.classify(image.as_raw(), image.width(), image.height())
    }
}

impl Default for PixelClassifier {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CLUSTERS.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(pixels: &[[u8; 4]]) -> Vec<u8> {
        pixels.iter().flatten().copied().collect()
    }

    #[test]
    fn empty_buffer_has_zero_ratio() {
        let result = PixelClassifier::default().classify(&[], 0, 0).unwrap();
        assert!(result.ratio.abs() < f64::EPSILON);
        assert_eq!(result.sample_count, 0);
    }

    #[test]
    fn zero_width_with_height_is_empty_too() {
        let result = PixelClassifier::default().classify(&[], 0, 50).unwrap();
        assert!(result.ratio.abs() < f64::EPSILON);
    }

    #[test]
    fn brown_pixels_all_match() {
        let pixels = buffer(&[[120, 60, 30, 255]; 100]);
        let result = PixelClassifier::default().classify(&pixels, 10, 10).unwrap();
        assert!((result.ratio - 100.0).abs() < 1e-9);
        assert_eq!(result.sample_count, 100);
    }

    #[test]
    fn green_pixels_never_match() {
        let pixels = buffer(&[[0, 255, 0, 255]; 100]);
        let result = PixelClassifier::default().classify(&pixels, 10, 10).unwrap();
        assert!(result.ratio.abs() < f64::EPSILON);
    }

    #[test]
    fn partial_match_gives_proportional_ratio() {
        let mut pixels = vec![[120, 60, 30, 255]; 3];
        pixels.extend([[255, 255, 255, 255]; 7]);
        let result = PixelClassifier::default()
            .classify(&buffer(&pixels), 10, 1)
            .unwrap();
        assert!((result.ratio - 30.0).abs() < 1e-9);
    }

    #[test]
    fn transparent_pixels_are_weighted_toward_black() {
        // Fully opaque this is brown; at alpha 0 it collapses to (0, 0, 0).
        let pixels = buffer(&[[120, 60, 30, 0]; 4]);
        let result = PixelClassifier::default().classify(&pixels, 2, 2).unwrap();
        assert!(result.ratio.abs() < f64::EPSILON);
    }

    #[test]
    fn half_alpha_can_move_a_color_into_a_cluster() {
        // (200, 100, 60) at alpha 128 becomes roughly (100.4, 50.2, 30.1).
        let classifier = PixelClassifier::new(vec![ColorCluster::new([90, 110], [45, 55], [25, 35])]);
        let result = classifier.classify(&[200, 100, 60, 128], 1, 1).unwrap();
        assert!((result.ratio - 100.0).abs() < 1e-9);
    }

    #[test]
    fn weighted_channel_on_an_upper_bound_matches() {
        // 175 * 153 / 255 is exactly 105, the fourth cluster's green ceiling.
        let result = PixelClassifier::default()
            .classify(&[100, 175, 30, 153], 1, 1)
            .unwrap();
        assert!((result.ratio - 100.0).abs() < 1e-9);
    }

    #[test]
    fn pixel_in_overlapping_clusters_counts_once() {
        // (140, 70, 30) sits in the first, second and fourth default clusters.
        let pixels = buffer(&[[140, 70, 30, 255], [0, 0, 255, 255]]);
        let result = PixelClassifier::default().classify(&pixels, 2, 1).unwrap();
        assert!((result.ratio - 50.0).abs() < 1e-9);
    }

    #[test]
    fn no_clusters_means_nothing_matches() {
        let pixels = buffer(&[[120, 60, 30, 255]; 4]);
        let result = PixelClassifier::new(Vec::new()).classify(&pixels, 2, 2).unwrap();
        assert!(result.ratio.abs() < f64::EPSILON);
    }

    #[test]
    fn mismatched_buffer_is_a_read_error() {
        let err = PixelClassifier::default()
            .classify(&[0, 0, 0], 1, 1)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::PixelBuffer {
                expected: 4,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn classification_is_deterministic() {
        let pixels: Vec<u8> = (0..400u32).map(|i| (i * 37 % 256) as u8).collect();
        let classifier = PixelClassifier::default();
        let a = classifier.classify(&pixels, 10, 10).unwrap();
        let b = classifier.classify(&pixels, 10, 10).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn classify_image_uses_raw_buffer() {
        let img = RgbaImage::from_pixel(4, 4, image::Rgba([120, 60, 30, 255]));
        let result = PixelClassifier::default().classify_image(&img).unwrap();
        assert_eq!(result.sample_count, 16);
        assert!((result.ratio - 100.0).abs() < 1e-9);
    }

    #[test]
    fn threshold_comparison_is_strict() {
        let at = ClassificationResult {
            ratio: 5.0,
            sample_count: 100,
        };
        assert!(!at.is_below(5.0));
        assert!(at.is_below(5.000_001));
    }
}
