use crate::error::OcrError;
use image::DynamicImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};

/// Structuring element radius; 0 is a 1x1 kernel
const KERNEL_RADIUS: u8 = 0;

/// Dilate then erode once each to clean up speckle noise
///
/// With a 1x1 kernel both operations leave the image unchanged; the pass is
/// kept so output matches the established pipeline byte for byte.
pub fn apply(image: DynamicImage) -> Result<DynamicImage, OcrError> {
    let gray = image.into_luma8();
    let dilated = dilate(&gray, Norm::LInf, KERNEL_RADIUS);
    let cleaned = erode(&dilated, Norm::LInf, KERNEL_RADIUS);
    Ok(DynamicImage::ImageLuma8(cleaned))
}
