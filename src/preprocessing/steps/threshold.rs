use crate::error::OcrError;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};

/// Adaptive threshold parameters
const BLOCK_SIZE: usize = 11;
const OFFSET: i32 = 2;

/// Gaussian-weighted adaptive thresholding
///
/// A pixel is white when it is brighter than its Gaussian-weighted 11x11
/// neighbourhood mean minus 2. Handles uneven illumination.
pub fn adaptive(image: DynamicImage) -> Result<DynamicImage, OcrError> {
    let gray = image.into_luma8();
    let local_mean = gaussian_blur(&gray, &gaussian_kernel(BLOCK_SIZE));

    let binarized = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let pixel = gray.get_pixel(x, y).0[0] as i32;
        let mean = local_mean.get_pixel(x, y).0[0] as i32;
        if pixel > mean - OFFSET {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });

    Ok(DynamicImage::ImageLuma8(binarized))
}

/// Global binarization at the Otsu level
pub fn otsu(image: DynamicImage) -> Result<DynamicImage, OcrError> {
    let gray = image.into_luma8();
    // Ties keep the lowest level, so binary and uniform input map to 0
    let level = otsu_level(&gray);
    Ok(DynamicImage::ImageLuma8(threshold(&gray, level, ThresholdType::Binary)))
}

/// Normalized Gaussian kernel with the sigma derived from the block size
fn gaussian_kernel(size: usize) -> Vec<f64> {
    let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size / 2) as f64;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Separable blur with replicated borders, rounded back to 8 bits
fn gaussian_blur(img: &GrayImage, kernel: &[f64]) -> GrayImage {
    let (width, height) = img.dimensions();
    let (w, h) = (width as i64, height as i64);
    let half = (kernel.len() / 2) as i64;

    let mut horizontal = vec![0.0f64; (width * height) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = (x + k as i64 - half).clamp(0, w - 1);
                acc += weight * img.get_pixel(sx as u32, y as u32).0[0] as f64;
            }
            horizontal[(y * w + x) as usize] = acc;
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let mut acc = 0.0;
        for (k, weight) in kernel.iter().enumerate() {
            let sy = (y as i64 + k as i64 - half).clamp(0, h - 1);
            acc += weight * horizontal[(sy * w + x as i64) as usize];
        }
        Luma([acc.round().clamp(0.0, 255.0) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_binary(img: &GrayImage) -> bool {
        img.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255)
    }

    #[test]
    fn test_adaptive_binarizes_image() {
        let img = GrayImage::from_fn(50, 50, |x, _| Luma([(x as u8 * 5).min(255)]));

        let result = adaptive(DynamicImage::ImageLuma8(img)).unwrap();

        assert!(is_binary(&result.to_luma8()));
    }

    #[test]
    fn test_adaptive_handles_text_pattern() {
        // Dark text on light background
        let mut img = GrayImage::from_pixel(50, 20, Luma([240]));
        for x in 10..40 {
            img.put_pixel(x, 10, Luma([20]));
        }

        let result = adaptive(DynamicImage::ImageLuma8(img)).unwrap();
        let result_gray = result.to_luma8();

        assert_eq!(result_gray.get_pixel(25, 10).0[0], 0);
        assert_eq!(result_gray.get_pixel(25, 5).0[0], 255);
    }

    #[test]
    fn test_adaptive_keeps_flat_regions_white() {
        // Uneven but locally flat illumination
        let img = GrayImage::from_fn(60, 20, |x, _| Luma([if x < 30 { 60 } else { 200 }]));

        let result = adaptive(DynamicImage::ImageLuma8(img)).unwrap();
        let result_gray = result.to_luma8();

        assert_eq!(result_gray.get_pixel(5, 10).0[0], 255);
        assert_eq!(result_gray.get_pixel(55, 10).0[0], 255);
    }

    #[test]
    fn test_gaussian_kernel_is_normalized() {
        let kernel = gaussian_kernel(11);
        assert_eq!(kernel.len(), 11);
        assert!((kernel.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(kernel[5] > kernel[4] && kernel[4] > kernel[0]);
    }

    #[test]
    fn test_otsu_separates_two_populations() {
        let img = GrayImage::from_fn(40, 10, |x, _| Luma([if x < 20 { 40 } else { 180 }]));

        let level = otsu_level(&img);
        assert!((40..180).contains(&level), "level {} not between classes", level);

        let result = otsu(DynamicImage::ImageLuma8(img)).unwrap().to_luma8();
        assert_eq!(result.get_pixel(5, 5).0[0], 0);
        assert_eq!(result.get_pixel(35, 5).0[0], 255);
    }

    #[test]
    fn test_otsu_is_identity_on_binary_input() {
        let img = GrayImage::from_fn(30, 30, |x, y| {
            Luma([if (x * 7 + y * 3) % 5 == 0 { 0 } else { 255 }])
        });

        let result = otsu(DynamicImage::ImageLuma8(img.clone())).unwrap();

        assert_eq!(otsu_level(&img), 0);
        assert_eq!(result.to_luma8(), img);
    }

    #[test]
    fn test_otsu_keeps_uniform_images() {
        let white = GrayImage::from_pixel(8, 8, Luma([255]));
        let black = GrayImage::new(8, 8);

        assert_eq!(
            otsu(DynamicImage::ImageLuma8(white.clone())).unwrap().to_luma8(),
            white
        );
        assert_eq!(
            otsu(DynamicImage::ImageLuma8(black.clone())).unwrap().to_luma8(),
            black
        );
    }
}
