use std::path::PathBuf;

use serde::Serialize;

use crate::{ElaResult, SRegion, Verdict};

#[derive(Serialize)]
pub struct JsonReport {
    pub forged: bool,
    pub annotated_image_path: Option<PathBuf>,
    pub ela_analysis: ElaReportSection,
}

#[derive(Serialize)]
pub struct ElaReportSection {
    pub width: u32,
    pub height: u32,
    pub max_difference: u8,
    pub max_annotated: u8,
    pub mean_difference: f64,
    pub highlighted_pixels: usize,
    pub highlighted_fraction: f64,
    pub suspicious_regions: Vec<SRegion>,
}

impl JsonReport {
    pub fn from_parts(verdict: &Verdict, result: &ElaResult) -> Self {
        let (width, height) = result.image.dimensions();
        let total = (width as usize * height as usize).max(1);

        Self {
            forged: verdict.forged,
            annotated_image_path: verdict.annotated_image_path.clone(),
            ela_analysis: ElaReportSection {
                width,
                height,
                max_difference: result.max_difference,
                max_annotated: result.max_annotated,
                mean_difference: result.mean_difference,
                highlighted_pixels: result.highlighted_pixels,
                highlighted_fraction: result.highlighted_pixels as f64 / total as f64,
                suspicious_regions: result.suspicious_regions.clone(),
            },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
