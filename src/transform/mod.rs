//! Transform capability seam
//!
//! The pipeline only needs decode, per-operation apply, and encode; the
//! pixel math itself lives behind [`TransformBackend`] so the cache and
//! versioning layers never depend on a concrete imaging implementation, and
//! tests can count invocations.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::errors::AppError;
use crate::params::{ResizeMode, TransformOp};

pub trait TransformBackend: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, AppError>;
    fn apply(&self, image: DynamicImage, op: &TransformOp) -> Result<DynamicImage, AppError>;
    fn encode(&self, image: &DynamicImage) -> Result<Vec<u8>, AppError>;
}

/// Backend over the `image` crate
///
/// Artifacts always encode as PNG: lossless, and it preserves the Luma
/// channel layout for grayscale and the alpha channel for background
/// removal.
pub struct ImageBackend;

impl TransformBackend for ImageBackend {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, AppError> {
        image::load_from_memory(bytes)
            .map_err(|e| AppError::processing(format!("Failed to decode image: {}", e)))
    }

    fn apply(&self, image: DynamicImage, op: &TransformOp) -> Result<DynamicImage, AppError> {
        let result = match op {
            TransformOp::Grayscale => DynamicImage::ImageLuma8(image.to_luma8()),
            TransformOp::Blur { radius } => image.blur(*radius),
            TransformOp::Rotate { angle } => match angle.rem_euclid(360) {
                0 => image,
                90 => image.rotate90(),
                180 => image.rotate180(),
                270 => image.rotate270(),
                other => {
                    // Validation rejects these before the pipeline runs
                    return Err(AppError::processing(format!(
                        "Unsupported rotation angle: {}",
                        other
                    )));
                }
            },
            TransformOp::Resize {
                width,
                height,
                mode,
            } => resize(image, *width, *height, *mode)?,
            TransformOp::RemoveBackground => remove_background(image),
        };
        Ok(result)
    }

    fn encode(&self, image: &DynamicImage) -> Result<Vec<u8>, AppError> {
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| AppError::processing(format!("Failed to encode image: {}", e)))?;
        Ok(buf)
    }
}

fn resize(
    image: DynamicImage,
    width: Option<i32>,
    height: Option<i32>,
    mode: ResizeMode,
) -> Result<DynamicImage, AppError> {
    let (current_w, current_h) = image.dimensions();

    // A single dimension scales the other to preserve aspect ratio
    let (target_w, target_h) = match (width, height) {
        (Some(w), Some(h)) => (w as u32, h as u32),
        (Some(w), None) => {
            let w = w as u32;
            let h = ((w as f64 / current_w as f64) * current_h as f64).round().max(1.0) as u32;
            (w, h)
        }
        (None, Some(h)) => {
            let h = h as u32;
            let w = ((h as f64 / current_h as f64) * current_w as f64).round().max(1.0) as u32;
            (w, h)
        }
        (None, None) => {
            return Err(AppError::processing(
                "Resize reached the backend with no dimensions",
            ));
        }
    };

    Ok(match mode {
        ResizeMode::Fit => image.resize(target_w, target_h, FilterType::Lanczos3),
        ResizeMode::Stretch => image.resize_exact(target_w, target_h, FilterType::Lanczos3),
    })
}

/// Background removal by corner-sampled color keying
///
/// Samples the four corners, averages them as the assumed background color,
/// and clears the alpha of every pixel within tolerance of it. Crude but
/// deterministic; a smarter backend can replace this without touching the
/// pipeline.
fn remove_background(image: DynamicImage) -> DynamicImage {
    const TOLERANCE: i32 = 30;

    let mut rgba = image.to_rgba8();
    let (w, h) = rgba.dimensions();
    if w == 0 || h == 0 {
        return DynamicImage::ImageRgba8(rgba);
    }

    let corners = [
        *rgba.get_pixel(0, 0),
        *rgba.get_pixel(w - 1, 0),
        *rgba.get_pixel(0, h - 1),
        *rgba.get_pixel(w - 1, h - 1),
    ];
    let background: [i32; 3] = [
        corners.iter().map(|p| p.0[0] as i32).sum::<i32>() / 4,
        corners.iter().map(|p| p.0[1] as i32).sum::<i32>() / 4,
        corners.iter().map(|p| p.0[2] as i32).sum::<i32>() / 4,
    ];

    for pixel in rgba.pixels_mut() {
        let close = pixel
            .0
            .iter()
            .take(3)
            .zip(background.iter())
            .all(|(channel, bg)| (*channel as i32 - bg).abs() <= TOLERANCE);
        if close {
            pixel.0[3] = 0;
        }
    }

    DynamicImage::ImageRgba8(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn red_square() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 100, Rgb([255, 0, 0])))
    }

    #[test]
    fn grayscale_produces_a_single_channel_image() {
        let backend = ImageBackend;
        let result = backend.apply(red_square(), &TransformOp::Grayscale).unwrap();
        assert_eq!(result.color(), image::ColorType::L8);
    }

    #[test]
    fn quarter_turns_swap_dimensions() {
        let backend = ImageBackend;
        let tall = DynamicImage::ImageRgb8(RgbImage::new(20, 60));
        let turned = backend
            .apply(tall, &TransformOp::Rotate { angle: 90 })
            .unwrap();
        assert_eq!(turned.dimensions(), (60, 20));
    }

    #[test]
    fn negative_quarter_turns_normalize() {
        let backend = ImageBackend;
        let tall = DynamicImage::ImageRgb8(RgbImage::new(20, 60));
        let turned = backend
            .apply(tall, &TransformOp::Rotate { angle: -90 })
            .unwrap();
        assert_eq!(turned.dimensions(), (60, 20));
    }

    #[test]
    fn single_dimension_resize_preserves_aspect_ratio() {
        let backend = ImageBackend;
        let wide = DynamicImage::ImageRgb8(RgbImage::new(200, 100));
        let resized = backend
            .apply(
                wide,
                &TransformOp::Resize {
                    width: Some(50),
                    height: None,
                    mode: ResizeMode::Fit,
                },
            )
            .unwrap();
        assert_eq!(resized.dimensions(), (50, 25));
    }

    #[test]
    fn stretch_resize_forces_exact_dimensions() {
        let backend = ImageBackend;
        let wide = DynamicImage::ImageRgb8(RgbImage::new(200, 100));
        let resized = backend
            .apply(
                wide,
                &TransformOp::Resize {
                    width: Some(50),
                    height: Some(50),
                    mode: ResizeMode::Stretch,
                },
            )
            .unwrap();
        assert_eq!(resized.dimensions(), (50, 50));
    }

    #[test]
    fn background_removal_clears_uniform_background() {
        let backend = ImageBackend;
        let result = backend
            .apply(red_square(), &TransformOp::RemoveBackground)
            .unwrap();
        let rgba = result.to_rgba8();
        // Uniform image: everything matches the corner color
        assert!(rgba.pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn encode_round_trips_through_png() {
        let backend = ImageBackend;
        let encoded = backend.encode(&red_square()).unwrap();
        let decoded = backend.decode(&encoded).unwrap();
        assert_eq!(decoded.dimensions(), (100, 100));
    }
}
