use image::{ColorType, DynamicImage, GrayImage, Luma, RgbImage};
use log::debug;
use ndarray::{Array2, ArrayView3};

use crate::error::{ElaError, Result};

/// Normalizes a decoded image to 8-bit RGB.
///
/// Alpha is dropped, not composited against a background. Floating-point
/// rasters are rejected since they carry no 8-bit channel range to compare.
pub fn flatten_to_rgb(image: &DynamicImage) -> Result<RgbImage> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(ElaError::EmptyImage { width, height });
    }

    match image.color() {
        ColorType::Rgb8 | ColorType::L8 | ColorType::Rgb16 | ColorType::L16 => {}
        ColorType::Rgba8 | ColorType::La8 | ColorType::Rgba16 | ColorType::La16 => {
            debug!("Dropping alpha channel from {:?} source", image.color());
        }
        other => {
            return Err(ElaError::UnsupportedColorModel(format!(
                "{:?} cannot be flattened to 8-bit RGB",
                other
            )));
        }
    }

    Ok(image.to_rgb8())
}

/// `(width, height, channels)` of a raster, as compared before differencing.
pub fn raster_shape(image: &DynamicImage) -> (u32, u32, u8) {
    (image.width(), image.height(), image.color().channel_count())
}

/// Borrows an RGB buffer as a `height x width x 3` array without copying.
pub fn channel_planes(image: &RgbImage) -> Result<ArrayView3<'_, u8>> {
    let (width, height) = image.dimensions();
    let view = ArrayView3::from_shape(
        (height as usize, width as usize, 3),
        image.as_raw().as_slice(),
    )?;

    Ok(view)
}

pub fn mask_to_gray(mask: &Array2<bool>) -> GrayImage {
    let (height, width) = mask.dim();

    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        if mask[[y as usize, x as usize]] {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

pub fn max_channel(image: &RgbImage) -> u8 {
    image.as_raw().iter().copied().max().unwrap_or(0)
}

pub fn mean_channel(image: &RgbImage) -> f64 {
    let raw = image.as_raw();
    if raw.is_empty() {
        return 0.0;
    }
    raw.iter().map(|&v| v as f64).sum::<f64>() / raw.len() as f64
}

#[cfg(test)]
mod tests {
    use image::{Rgb, Rgb32FImage, Rgba, RgbaImage};

    use super::*;

    #[test]
    fn test_flatten_drops_alpha_without_compositing() {
        let rgba = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 0]));
        let rgb = flatten_to_rgb(&DynamicImage::ImageRgba8(rgba)).unwrap();

        assert_eq!(rgb.dimensions(), (4, 4));
        assert!(rgb.pixels().all(|p| *p == Rgb([10, 20, 30])));
    }

    #[test]
    fn test_flatten_expands_grayscale() {
        let gray = GrayImage::from_pixel(3, 2, Luma([77]));
        let rgb = flatten_to_rgb(&DynamicImage::ImageLuma8(gray)).unwrap();

        assert!(rgb.pixels().all(|p| *p == Rgb([77, 77, 77])));
    }

    #[test]
    fn test_flatten_rejects_float_raster() {
        let hdr = Rgb32FImage::new(8, 8);
        let result = flatten_to_rgb(&DynamicImage::ImageRgb32F(hdr));

        assert!(matches!(result, Err(ElaError::UnsupportedColorModel(_))));
    }

    #[test]
    fn test_flatten_rejects_empty_raster() {
        let result = flatten_to_rgb(&DynamicImage::new_rgb8(0, 5));

        assert!(matches!(
            result,
            Err(ElaError::EmptyImage { width: 0, height: 5 })
        ));
    }

    #[test]
    fn test_channel_planes_follow_pixel_layout() {
        let mut image = RgbImage::new(3, 2);
        image.put_pixel(2, 1, Rgb([1, 2, 3]));

        let planes = channel_planes(&image).unwrap();

        assert_eq!(planes.dim(), (2, 3, 3));
        assert_eq!(planes[[1, 2, 0]], 1);
        assert_eq!(planes[[1, 2, 2]], 3);
    }

    #[test]
    fn test_channel_statistics() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(1, 0, Rgb([0, 60, 0]));

        assert_eq!(max_channel(&image), 60);
        assert!((mean_channel(&image) - 10.0).abs() < 1e-9);
    }
}
