use crate::error::OcrError;
use image::{DynamicImage, GrayImage, Luma};

/// Contrast multiplier applied around the mean luminance
const CONTRAST_FACTOR: f32 = 2.0;

/// Enhance contrast by stretching every pixel away from the image mean
///
/// out = mean + factor * (pixel - mean), clamped to 0..=255
pub fn apply(image: DynamicImage) -> Result<DynamicImage, OcrError> {
    let gray = image.into_luma8();
    let mean = mean_luminance(&gray);

    let enhanced = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let pixel = gray.get_pixel(x, y).0[0] as f32;
        let value = mean + CONTRAST_FACTOR * (pixel - mean);
        Luma([value.round().clamp(0.0, 255.0) as u8])
    });

    Ok(DynamicImage::ImageLuma8(enhanced))
}

/// Mean gray level rounded to the nearest integer
fn mean_luminance(img: &GrayImage) -> f32 {
    let count = img.width() as u64 * img.height() as u64;
    if count == 0 {
        return 0.0;
    }

    let sum: u64 = img.pixels().map(|p| p.0[0] as u64).sum();
    (sum as f64 / count as f64 + 0.5).floor() as f32
}
