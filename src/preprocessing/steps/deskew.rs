use crate::error::{GeometryError, OcrError};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::geometry::convex_hull;
use imageproc::point::Point;

/// Bicubic kernel coefficient (Keys, a = -0.75)
const CUBIC_A: f64 = -0.75;
/// Corrections smaller than this (degrees) are treated as zero
const MIN_ROTATION: f64 = 1e-6;

/// Deskew image by fitting a minimum-area rectangle around the foreground
///
/// Falls back to no rotation when the foreground is empty or a single point.
pub fn apply(image: DynamicImage) -> Result<DynamicImage, OcrError> {
    let gray = image.into_luma8();

    let angle = match detect_skew_angle(&gray) {
        Ok(angle) => angle,
        Err(e) => {
            tracing::debug!("Skipping deskew: {}", e);
            0.0
        }
    };

    if angle.abs() < MIN_ROTATION {
        return Ok(DynamicImage::ImageLuma8(gray));
    }

    tracing::debug!("Deskewing by {:.3} degrees", angle);
    Ok(DynamicImage::ImageLuma8(rotate(&gray, angle)))
}

/// Rotation (degrees, counter-clockwise positive) that undoes the skew
pub fn detect_skew_angle(img: &GrayImage) -> Result<f64, GeometryError> {
    let points = foreground_points(img);
    let hull = convex_hull(points);
    let rect_angle = min_area_rect_angle(&hull)?;
    Ok(correction_angle(rect_angle))
}

/// Map a rectangle angle in [-90, 0) to a correction in (-45, 45]
pub fn correction_angle(rect_angle: f64) -> f64 {
    if rect_angle < -45.0 {
        -(90.0 + rect_angle)
    } else {
        -rect_angle
    }
}

/// Foreground pixels as (row, column) points
///
/// Only the outermost foreground pixel on each side of a row can lie on the
/// convex hull, so interior pixels are skipped.
fn foreground_points(img: &GrayImage) -> Vec<Point<i64>> {
    let (width, height) = img.dimensions();
    let mut points = Vec::new();

    for y in 0..height {
        let first = (0..width).find(|&x| img.get_pixel(x, y).0[0] > 0);
        let Some(first) = first else {
            continue;
        };
        let last = (first..width)
            .rev()
            .find(|&x| img.get_pixel(x, y).0[0] > 0)
            .unwrap_or(first);

        points.push(Point::new(y as i64, first as i64));
        if last != first {
            points.push(Point::new(y as i64, last as i64));
        }
    }

    points
}

/// Angle of the minimum-area bounding rectangle, in [-90, 0) degrees
///
/// One side of the optimal rectangle is collinear with a hull edge, so every
/// edge is tried (rotating calipers without the pointer bookkeeping).
/// Areas stay in f64 since `imageproc::geometry::min_area_rect` rounds the
/// corners to integers, which loses small skews.
fn min_area_rect_angle(hull: &[Point<i64>]) -> Result<f64, GeometryError> {
    if hull.len() < 2 {
        return Err(GeometryError::Degenerate { points: hull.len() });
    }

    let mut best_area = f64::INFINITY;
    let mut best_edge = (0.0_f64, 0.0_f64);

    for i in 0..hull.len() {
        let a = hull[i];
        let b = hull[(i + 1) % hull.len()];
        let ex = (b.x - a.x) as f64;
        let ey = (b.y - a.y) as f64;
        let len = ex.hypot(ey);
        if len == 0.0 {
            continue;
        }
        let (ux, uy) = (ex / len, ey / len);

        let mut min_u = f64::INFINITY;
        let mut max_u = f64::NEG_INFINITY;
        let mut min_v = f64::INFINITY;
        let mut max_v = f64::NEG_INFINITY;
        for p in hull {
            let dx = (p.x - a.x) as f64;
            let dy = (p.y - a.y) as f64;
            let u = dx * ux + dy * uy;
            let v = ux * dy - uy * dx;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let area = (max_u - min_u) * (max_v - min_v);
        if area < best_area {
            best_area = area;
            best_edge = (ex, ey);
        }
    }

    if !best_area.is_finite() {
        return Err(GeometryError::Degenerate { points: hull.len() });
    }

    let edge_angle = best_edge.1.atan2(best_edge.0).to_degrees();
    Ok(edge_angle.rem_euclid(90.0) - 90.0)
}

/// Rotate about the integer image center, counter-clockwise for positive
/// angles, with bicubic sampling and replicated borders
fn rotate(img: &GrayImage, angle_degrees: f64) -> GrayImage {
    let (width, height) = img.dimensions();
    let cx = (width / 2) as f64;
    let cy = (height / 2) as f64;
    let (sin, cos) = angle_degrees.to_radians().sin_cos();

    GrayImage::from_fn(width, height, |x, y| {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        let sx = cos * dx - sin * dy + cx;
        let sy = sin * dx + cos * dy + cy;
        Luma([sample_bicubic(img, sx, sy)])
    })
}

fn cubic_weight(t: f64) -> f64 {
    let t = t.abs();
    if t <= 1.0 {
        ((CUBIC_A + 2.0) * t - (CUBIC_A + 3.0)) * t * t + 1.0
    } else if t < 2.0 {
        ((CUBIC_A * t - 5.0 * CUBIC_A) * t + 8.0 * CUBIC_A) * t - 4.0 * CUBIC_A
    } else {
        0.0
    }
}

fn sample_bicubic(img: &GrayImage, sx: f64, sy: f64) -> u8 {
    let (width, height) = img.dimensions();
    let x0 = sx.floor();
    let y0 = sy.floor();
    let fx = sx - x0;
    let fy = sy - y0;

    let clamp_x = |v: i64| v.clamp(0, width as i64 - 1) as u32;
    let clamp_y = |v: i64| v.clamp(0, height as i64 - 1) as u32;

    let mut acc = 0.0;
    for j in -1..=2_i64 {
        let wy = cubic_weight(j as f64 - fy);
        if wy == 0.0 {
            continue;
        }
        let row = clamp_y(y0 as i64 + j);
        for i in -1..=2_i64 {
            let wx = cubic_weight(i as f64 - fx);
            if wx == 0.0 {
                continue;
            }
            let col = clamp_x(x0 as i64 + i);
            acc += wx * wy * img.get_pixel(col, row).0[0] as f64;
        }
    }

    acc.round().clamp(0.0, 255.0) as u8
}
