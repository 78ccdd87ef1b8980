use crate::error::OcrError;
use image::{imageops::FilterType, DynamicImage, GrayImage, Luma};

/// Linear upscale factor applied before recognition
const SCALE: u32 = 2;
/// Resampled values at or above this become white
const BINARY_CUTOFF: u8 = 128;

/// Upscale to exactly twice the width and height with Lanczos resampling
///
/// Lanczos introduces intermediate grays along edges, so the result is
/// snapped back to black and white.
pub fn apply(image: DynamicImage) -> Result<DynamicImage, OcrError> {
    let gray = image.into_luma8();
    let (width, height) = gray.dimensions();

    let new_width = width
        .checked_mul(SCALE)
        .ok_or_else(|| OcrError::PreprocessingError("image too wide to upscale".to_string()))?;
    let new_height = height
        .checked_mul(SCALE)
        .ok_or_else(|| OcrError::PreprocessingError("image too tall to upscale".to_string()))?;

    let resized = image::imageops::resize(&gray, new_width, new_height, FilterType::Lanczos3);
    Ok(DynamicImage::ImageLuma8(snap_to_binary(&resized)))
}

fn snap_to_binary(img: &GrayImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        if img.get_pixel(x, y).0[0] >= BINARY_CUTOFF {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}
