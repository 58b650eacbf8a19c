use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, codecs::jpeg::JpegEncoder};
use log::debug;
use ndarray::{Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    ElaResult,
    analysis::regions::find_highlighted_regions,
    error::{ElaError, Result},
    image_utils::{
        channel_planes, flatten_to_rgb, mask_to_gray, max_channel, mean_channel, raster_shape,
    },
};

pub const HIGHLIGHT: Rgb<u8> = Rgb([255, 0, 0]);

/// Which difference image the forgery threshold is compared against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassificationBasis {
    /// Maximum over the annotated image. Any highlighted pixel saturates it to 255.
    #[default]
    Annotated,
    /// Maximum over the difference image before highlighting.
    RawDifference,
}

pub struct ElaAnalyzer {
    quality: u8,
    diff_threshold: u8,
    forgery_threshold: u8,
    highlight: Rgb<u8>,
    parallel: bool,
    basis: ClassificationBasis,
}

impl ElaAnalyzer {
    pub fn new(quality: u8) -> Result<Self> {
        if quality == 0 || quality > 100 {
            return Err(ElaError::InvalidParameter(format!(
                "recompression quality must be in 1..=100, got {}",
                quality
            )));
        }

        Ok(Self {
            quality,
            diff_threshold: 50,
            forgery_threshold: 20,
            highlight: HIGHLIGHT,
            parallel: false,
            basis: ClassificationBasis::Annotated,
        })
    }

    pub fn with_diff_threshold(mut self, threshold: u8) -> Self {
        self.diff_threshold = threshold;
        self
    }

    pub fn with_forgery_threshold(mut self, threshold: u8) -> Self {
        self.forgery_threshold = threshold;
        self
    }

    pub fn with_highlight(mut self, highlight: Rgb<u8>) -> Self {
        self.highlight = highlight;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_basis(mut self, basis: ClassificationBasis) -> Self {
        self.basis = basis;
        self
    }

    pub fn analyze(&self, image: &DynamicImage) -> Result<ElaResult> {
        let source = flatten_to_rgb(image)?;
        let (width, height) = source.dimensions();
        debug!("ELA on {}x{} source at quality {}", width, height, self.quality);

        let recompressed = self.recompress(&source)?;
        let mut ela_image = difference(&source, &recompressed)?;

        let max_difference = max_channel(&ela_image);
        let mean_difference = mean_channel(&ela_image);

        let mask = self.annotate(&mut ela_image)?;
        let max_annotated = max_channel(&ela_image);
        let highlighted_pixels = mask.iter().filter(|&&hit| hit).count();

        let difference_mask = mask_to_gray(&mask);
        let suspicious_regions = find_highlighted_regions(&difference_mask);
        let forged = self.decide(max_difference, max_annotated);

        debug!(
            "max diff {} (annotated {}), {} highlighted pixels in {} regions, forged: {}",
            max_difference,
            max_annotated,
            highlighted_pixels,
            suspicious_regions.len(),
            forged
        );

        Ok(ElaResult {
            image: ela_image,
            difference_mask,
            max_difference,
            max_annotated,
            mean_difference,
            highlighted_pixels,
            suspicious_regions,
            forged,
        })
    }

    /// JPEG round trip at the analyzer's quality, entirely in memory.
    pub fn recompress(&self, source: &RgbImage) -> Result<RgbImage> {
        let mut buffer = Cursor::new(Vec::new());

        let encoder = JpegEncoder::new_with_quality(&mut buffer, self.quality);
        source
            .write_with_encoder(encoder)
            .map_err(ElaError::Recompression)?;

        let recompressed = image::load_from_memory_with_format(buffer.get_ref(), ImageFormat::Jpeg)
            .map_err(ElaError::Recompression)?;

        let (width, height) = source.dimensions();
        let expected = (width, height, 3);
        let actual = raster_shape(&recompressed);
        if actual != expected {
            return Err(ElaError::DimensionMismatch { expected, actual });
        }

        Ok(recompressed.into_rgb8())
    }

    /// Highlights every pixel above the difference threshold and returns the mask.
    pub fn annotate(&self, difference: &mut RgbImage) -> Result<Array2<bool>> {
        let mask = suspicion_mask(difference, self.diff_threshold)?;
        paint_highlights(difference, &mask, self.highlight, self.parallel)?;

        Ok(mask)
    }

    pub fn classify(&self, max_intensity: u8) -> bool {
        max_intensity > self.forgery_threshold
    }

    fn decide(&self, max_difference: u8, max_annotated: u8) -> bool {
        match self.basis {
            ClassificationBasis::Annotated => self.classify(max_annotated),
            ClassificationBasis::RawDifference => self.classify(max_difference),
        }
    }
}

/// Per-channel `|source - recompressed|`.
pub fn difference(source: &RgbImage, recompressed: &RgbImage) -> Result<RgbImage> {
    let (width, height) = source.dimensions();
    let (other_width, other_height) = recompressed.dimensions();
    let mismatch = || ElaError::DimensionMismatch {
        expected: (width, height, 3),
        actual: (other_width, other_height, 3),
    };

    if (width, height) != (other_width, other_height) {
        return Err(mismatch());
    }

    let raw = source
        .as_raw()
        .iter()
        .zip(recompressed.as_raw())
        .map(|(&a, &b)| a.abs_diff(b))
        .collect::<Vec<_>>();

    RgbImage::from_raw(width, height, raw).ok_or_else(mismatch)
}

/// `true` where any of the three channel planes exceeds `threshold`.
pub fn suspicion_mask(difference: &RgbImage, threshold: u8) -> Result<Array2<bool>> {
    let planes = channel_planes(difference)?;

    Ok(planes.map_axis(Axis(2), |pixel| pixel.iter().any(|&v| v > threshold)))
}

/// Overwrites masked pixels with `highlight`; unmasked pixels are left untouched.
pub fn paint_highlights(
    difference: &mut RgbImage,
    mask: &Array2<bool>,
    highlight: Rgb<u8>,
    parallel: bool,
) -> Result<()> {
    let (width, height) = difference.dimensions();
    let (mask_height, mask_width) = mask.dim();
    if (mask_width, mask_height) != (width as usize, height as usize) {
        return Err(ElaError::DimensionMismatch {
            expected: (width, height, 3),
            actual: (mask_width as u32, mask_height as u32, 1),
        });
    }

    let hits = mask.iter().copied().collect::<Vec<_>>();
    let color = highlight.0;
    let paint = move |(pixel, hit): (&mut [u8], &bool)| {
        if *hit {
            pixel.copy_from_slice(&color);
        }
    };

    if parallel {
        difference
            .par_chunks_exact_mut(3)
            .zip(hits.par_iter())
            .for_each(paint);
    } else {
        difference.chunks_exact_mut(3).zip(hits.iter()).for_each(paint);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forced_pair() -> (RgbImage, RgbImage) {
        let source = RgbImage::from_pixel(8, 6, Rgb([100, 100, 100]));
        let mut recompressed = source.clone();

        recompressed.put_pixel(0, 0, Rgb([49, 100, 100]));
        recompressed.put_pixel(2, 3, Rgb([100, 160, 100]));
        recompressed.put_pixel(5, 1, Rgb([100, 100, 150]));
        recompressed.put_pixel(7, 5, Rgb([90, 95, 105]));

        (source, recompressed)
    }

    #[test]
    fn test_ela_analyzer_creation() {
        let analyzer = ElaAnalyzer::new(95).unwrap();
        assert_eq!(analyzer.quality, 95);
        assert_eq!(analyzer.diff_threshold, 50);
        assert_eq!(analyzer.forgery_threshold, 20);

        assert!(matches!(ElaAnalyzer::new(0), Err(ElaError::InvalidParameter(_))));
        assert!(matches!(ElaAnalyzer::new(101), Err(ElaError::InvalidParameter(_))));
    }

    #[test]
    fn test_recompress_preserves_dimensions() {
        let analyzer = ElaAnalyzer::new(90).unwrap();
        let source = RgbImage::from_fn(13, 7, |x, y| Rgb([(x * 19) as u8, (y * 31) as u8, 128]));

        let recompressed = analyzer.recompress(&source).unwrap();

        assert_eq!(recompressed.dimensions(), (13, 7));
    }

    #[test]
    fn test_difference_is_absolute_per_channel() {
        let (source, recompressed) = forced_pair();
        let diff = difference(&source, &recompressed).unwrap();

        assert_eq!(*diff.get_pixel(0, 0), Rgb([51, 0, 0]));
        assert_eq!(*diff.get_pixel(2, 3), Rgb([0, 60, 0]));
        assert_eq!(*diff.get_pixel(5, 1), Rgb([0, 0, 50]));
        assert_eq!(*diff.get_pixel(7, 5), Rgb([10, 5, 5]));
        assert_eq!(*diff.get_pixel(4, 4), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_difference_rejects_mismatched_rasters() {
        let a = RgbImage::new(10, 10);
        let b = RgbImage::new(10, 9);

        let result = difference(&a, &b);

        assert!(matches!(
            result,
            Err(ElaError::DimensionMismatch {
                expected: (10, 10, 3),
                actual: (10, 9, 3)
            })
        ));
    }

    #[test]
    fn test_annotation_marks_exactly_the_pixels_above_threshold() {
        let (source, recompressed) = forced_pair();
        let raw = difference(&source, &recompressed).unwrap();
        let mut annotated = raw.clone();

        let analyzer = ElaAnalyzer::new(90).unwrap();
        let mask = analyzer.annotate(&mut annotated).unwrap();

        for (x, y, pixel) in annotated.enumerate_pixels() {
            let expected_hit = matches!((x, y), (0, 0) | (2, 3));
            assert_eq!(mask[[y as usize, x as usize]], expected_hit, "mask at ({}, {})", x, y);

            if expected_hit {
                assert_eq!(*pixel, HIGHLIGHT);
            } else {
                assert_eq!(pixel, raw.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn test_parallel_and_sequential_painting_agree() {
        let raw = RgbImage::from_fn(37, 23, |x, y| {
            Rgb([((x * 7 + y * 3) % 97) as u8, ((x * y) % 61) as u8, ((x + y) % 53) as u8])
        });
        let mask = suspicion_mask(&raw, 50).unwrap();

        let mut sequential = raw.clone();
        let mut parallel = raw.clone();
        paint_highlights(&mut sequential, &mask, HIGHLIGHT, false).unwrap();
        paint_highlights(&mut parallel, &mask, HIGHLIGHT, true).unwrap();

        assert!(mask.iter().any(|&hit| hit));
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_paint_rejects_mask_of_wrong_shape() {
        let mut raw = RgbImage::new(4, 4);
        let mask = Array2::from_elem((3, 4), true);

        let result = paint_highlights(&mut raw, &mask, HIGHLIGHT, false);

        assert!(matches!(result, Err(ElaError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_classification_is_monotone_in_forgery_threshold() {
        let max_intensity = 42;
        let verdicts = (0..=255u8)
            .map(|threshold| {
                ElaAnalyzer::new(90)
                    .unwrap()
                    .with_forgery_threshold(threshold)
                    .classify(max_intensity)
            })
            .collect::<Vec<_>>();

        assert!(verdicts.windows(2).all(|w| w[0] >= w[1]));
        assert!(verdicts[41]);
        assert!(!verdicts[42]);
    }

    #[test]
    fn test_basis_selects_which_maximum_is_compared() {
        let annotated = ElaAnalyzer::new(90).unwrap().with_forgery_threshold(100);
        let raw = ElaAnalyzer::new(90)
            .unwrap()
            .with_forgery_threshold(100)
            .with_basis(ClassificationBasis::RawDifference);

        // A single pixel at 51 saturates the annotated image.
        assert!(annotated.decide(51, 255));
        assert!(!raw.decide(51, 255));
    }
}
