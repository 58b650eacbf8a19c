use thiserror::Error;

#[derive(Error, Debug)]
pub enum ElaError {
    #[error("Image decoding error: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Unsupported color model: {0}")]
    UnsupportedColorModel(String),

    #[error("Image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("Raster mismatch: expected {expected:?}, got {actual:?} (width, height, channels)")]
    DimensionMismatch {
        expected: (u32, u32, u8),
        actual: (u32, u32, u8),
    },

    #[error("JPEG recompression failed: {0}")]
    Recompression(#[source] image::ImageError),

    #[error("Output encoding failed: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Cannot derive an output name from {0:?}")]
    InvalidInputName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Raster shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, ElaError>;
