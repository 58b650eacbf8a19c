//! Naming and persisting the annotated difference image.
//!
//! Output names are built from the input's file stem only, so no part of a
//! caller-supplied directory path can leak into where the result is written.

use std::{
    io::{Cursor, Write},
    path::{Path, PathBuf},
};

use image::{ImageFormat, RgbImage, codecs::jpeg::JpegEncoder};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{ElaError, Result};

const OUTPUT_SUFFIX: &str = "_ela_output";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg { quality: u8 },
    Png,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Jpeg { quality: 75 }
    }
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg { .. } => "jpg",
            OutputFormat::Png => "png",
        }
    }

    fn encode(&self, image: &RgbImage) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());

        match *self {
            OutputFormat::Jpeg { quality } => {
                let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
                image.write_with_encoder(encoder).map_err(ElaError::Encode)?;
            }
            OutputFormat::Png => {
                image
                    .write_to(&mut buffer, ImageFormat::Png)
                    .map_err(ElaError::Encode)?;
            }
        }

        Ok(buffer.into_inner())
    }
}

/// `{stem}_ela_output.{ext}` for the given input path.
pub fn output_file_name(input: &Path, format: OutputFormat) -> Result<String> {
    let invalid = || ElaError::InvalidInputName(input.to_string_lossy().into_owned());

    let stem = input
        .file_name()
        .map(Path::new)
        .and_then(Path::file_stem)
        .and_then(|s| s.to_str())
        .filter(|s| !matches!(*s, "" | "." | ".."))
        .ok_or_else(invalid)?;

    Ok(format!("{}{}.{}", stem, OUTPUT_SUFFIX, format.extension()))
}

/// Encodes `image` and places it at `output_dir/file_name`.
///
/// The bytes go to a temporary file in the same directory first; it is only
/// renamed over the destination once fully written, and removed on any error.
pub fn persist_atomic(
    image: &RgbImage,
    output_dir: &Path,
    file_name: &str,
    format: OutputFormat,
) -> Result<PathBuf> {
    let encoded = format.encode(image)?;
    let destination = output_dir.join(file_name);

    let mut builder = tempfile::Builder::new();
    builder.prefix(".ela-").suffix(".tmp");
    // Staging files are created 0600 otherwise.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o644));
    }

    let mut staging = builder.tempfile_in(output_dir)?;
    staging.write_all(&encoded)?;
    staging.as_file().sync_all()?;
    staging.persist(&destination).map_err(|e| e.error)?;

    debug!("Wrote {} bytes to {}", encoded.len(), destination.display());

    Ok(destination)
}
