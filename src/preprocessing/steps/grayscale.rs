use crate::error::OcrError;
use image::{DynamicImage, GrayImage, Luma};

/// Convert image to single-channel luminance
///
/// Uses the ITU-R 601-2 weights in 16-bit fixed point, so colour scans map to
/// the same gray levels the upstream tooling produces. Alpha is ignored.
pub fn apply(image: DynamicImage) -> Result<DynamicImage, OcrError> {
    if matches!(image, DynamicImage::ImageLuma8(_)) {
        return Ok(image);
    }

    if matches!(
        image,
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_)
    ) {
        return Ok(DynamicImage::ImageLuma8(image.to_luma8()));
    }

    let rgb = image.to_rgb8();
    let gray = GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        Luma([luma(r, g, b)])
    });
    Ok(DynamicImage::ImageLuma8(gray))
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_grayscale_converts_color() {
        let mut img = RgbImage::new(10, 10);
        img.put_pixel(0, 0, Rgb([255, 0, 0])); // Red
        img.put_pixel(1, 0, Rgb([0, 255, 0])); // Green
        img.put_pixel(2, 0, Rgb([0, 0, 255])); // Blue
        img.put_pixel(3, 0, Rgb([255, 255, 255]));

        let result = apply(DynamicImage::ImageRgb8(img)).unwrap();
        let gray = result.as_luma8().expect("luma output");

        assert_eq!(gray.get_pixel(0, 0).0[0], 76);
        assert_eq!(gray.get_pixel(1, 0).0[0], 150);
        assert_eq!(gray.get_pixel(2, 0).0[0], 29);
        assert_eq!(gray.get_pixel(3, 0).0[0], 255);
        assert_eq!(gray.get_pixel(9, 9).0[0], 0);
    }

    #[test]
    fn test_grayscale_is_noop_for_gray_input() {
        let img = GrayImage::from_fn(8, 4, |x, y| Luma([(x * 30 + y) as u8]));
        let result = apply(DynamicImage::ImageLuma8(img.clone())).unwrap();
        assert_eq!(result.as_luma8(), Some(&img));
    }

    #[test]
    fn test_grayscale_preserves_dimensions() {
        let img = RgbImage::new(100, 50);
        let result = apply(DynamicImage::ImageRgb8(img)).unwrap();
        assert_eq!(result.width(), 100);
        assert_eq!(result.height(), 50);
    }
}
