use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    analysis::ela::{ClassificationBasis, ElaAnalyzer, HIGHLIGHT},
    error::{ElaError, Result},
    output::{OutputFormat, output_file_name, persist_atomic},
};

pub mod error;
pub mod image_utils;
pub mod analysis;
pub mod output;
pub mod report;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElaConfig {
    pub recompress_quality: u8,
    pub diff_threshold: u8,
    pub forgery_threshold: u8,
    pub highlight: [u8; 3],
    pub parallel: bool,
    pub basis: ClassificationBasis,
    pub output_format: OutputFormat,
}

impl Default for ElaConfig {
    fn default() -> Self {
        Self {
            recompress_quality: 90,
            diff_threshold: 50,
            forgery_threshold: 20,
            highlight: HIGHLIGHT.0,
            parallel: true,
            basis: ClassificationBasis::Annotated,
            output_format: OutputFormat::default(),
        }
    }
}

impl ElaConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.recompress_quality) {
            return Err(ElaError::InvalidParameter(format!(
                "recompress_quality must be in 1..=100, got {}",
                self.recompress_quality
            )));
        }

        if let OutputFormat::Jpeg { quality } = self.output_format {
            if !(1..=100).contains(&quality) {
                return Err(ElaError::InvalidParameter(format!(
                    "output JPEG quality must be in 1..=100, got {}",
                    quality
                )));
            }
        }

        Ok(())
    }
}

/// Outcome of one detection. The annotated image path is only set when forged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub forged: bool,
    pub annotated_image_path: Option<PathBuf>,
}

#[derive(Default)]
pub struct ElaDetector {
    config: ElaConfig,
}

impl ElaDetector {
    pub fn new() -> Self {
        Self {
            config: ElaConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ElaConfig) -> Self {
        self.config = config;
        self
    }

    fn analyzer(&self) -> Result<ElaAnalyzer> {
        self.config.validate()?;

        Ok(ElaAnalyzer::new(self.config.recompress_quality)?
            .with_diff_threshold(self.config.diff_threshold)
            .with_forgery_threshold(self.config.forgery_threshold)
            .with_highlight(Rgb(self.config.highlight))
            .with_parallel(self.config.parallel)
            .with_basis(self.config.basis))
    }

    pub fn analyze(&self, image: &DynamicImage) -> Result<ElaResult> {
        self.analyzer()?.analyze(image)
    }

    pub fn analyze_bytes(&self, bytes: &[u8]) -> Result<ElaResult> {
        let image = image::load_from_memory(bytes).map_err(ElaError::Decode)?;
        self.analyze(&image)
    }

    /// Runs the full pipeline on `input` and writes the annotated image into `output_dir`.
    pub fn detect<P: AsRef<Path>, Q: AsRef<Path>>(&self, input: P, output_dir: Q) -> Result<Verdict> {
        self.detect_with_report(input, output_dir)
            .map(|(verdict, _)| verdict)
    }

    pub fn detect_with_report<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output_dir: Q,
    ) -> Result<(Verdict, ElaResult)> {
        let input = input.as_ref();
        let output_name = output_file_name(input, self.config.output_format)?;

        let bytes = std::fs::read(input)?;
        let result = self.analyze_bytes(&bytes)?;

        let saved = persist_atomic(
            &result.image,
            output_dir.as_ref(),
            &output_name,
            self.config.output_format,
        )?;

        if result.forged && result.suspicious_regions.is_empty() {
            warn!(
                "{} classified as forged without any highlighted region",
                input.display()
            );
        }

        info!(
            "{}: forged={} (max difference {}, {} highlighted pixels)",
            input.display(),
            result.forged,
            result.max_difference,
            result.highlighted_pixels
        );

        let verdict = Verdict {
            forged: result.forged,
            annotated_image_path: result.forged.then_some(saved),
        };

        Ok((verdict, result))
    }
}

/// Error Level Analysis of the JPEG-family image at `image_path`.
///
/// The annotated difference image is written to `output_dir` as
/// `{stem}_ela_output.jpg`; its path is returned only for forged verdicts.
pub fn detect<P: AsRef<Path>, Q: AsRef<Path>>(
    image_path: P,
    output_dir: Q,
    recompress_quality: u8,
    diff_threshold: u8,
    forgery_threshold: u8,
) -> Result<Verdict> {
    let config = ElaConfig {
        recompress_quality,
        diff_threshold,
        forgery_threshold,
        ..ElaConfig::default()
    };

    ElaDetector::new()
        .with_config(config)
        .detect(image_path, output_dir)
}

#[derive(Debug, Clone)]
pub struct ElaResult {
    pub image: RgbImage,
    pub difference_mask: GrayImage,
    pub max_difference: u8,
    pub max_annotated: u8,
    pub mean_difference: f64,
    pub highlighted_pixels: usize,
    pub suspicious_regions: Vec<SRegion>,
    pub forged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}
