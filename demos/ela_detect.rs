//! ELA Detection Example
//!
//! Runs error level analysis on one image and prints the verdict and report.
//!
//! Run with: cargo run --example ela_detect -- <image_path> [output_dir] [quality]

use std::{env, fs, path::Path};

use ela_forensics::{ElaConfig, ElaDetector, error::Result, report::JsonReport};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("Usage: {} <image_path> [output_dir] [quality]", args[0]);
        println!();
        println!("  image_path  - JPEG image to analyze");
        println!("  output_dir  - Where the annotated image is written (default: ./output)");
        println!("  quality     - Recompression quality, 1-100 (default: 90)");
        return Ok(());
    }

    let image_path = &args[1];
    let output_dir = args.get(2).map(|s| s.as_str()).unwrap_or("./output");
    let quality = args
        .get(3)
        .and_then(|q| q.parse::<u8>().ok())
        .unwrap_or(90);

    if !Path::new(image_path).exists() {
        eprintln!("Error: Image file '{}' not found", image_path);
        std::process::exit(1);
    }

    fs::create_dir_all(output_dir)?;

    let detector = ElaDetector::new().with_config(ElaConfig {
        recompress_quality: quality,
        ..ElaConfig::default()
    });

    println!("Analyzing {} at quality {}...", image_path, quality);
    let (verdict, result) = detector.detect_with_report(image_path, output_dir)?;

    if verdict.forged {
        println!("  Verdict: possible tampering");
    } else {
        println!("  Verdict: no sign of tampering");
    }
    println!("  Max difference: {}", result.max_difference);
    println!("  Mean difference: {:.2}", result.mean_difference);
    println!("  Highlighted pixels: {}", result.highlighted_pixels);
    println!("  Suspicious regions: {}", result.suspicious_regions.len());
    if let Some(path) = &verdict.annotated_image_path {
        println!("  Output: {}", path.display());
    }
    println!();

    match JsonReport::from_parts(&verdict, &result).to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize report: {}", e),
    }

    Ok(())
}
