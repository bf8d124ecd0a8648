//! Stored photo payloads.
//!
//! Uploaded photos are kept as lossy WebP, scaled down so neither side
//! exceeds the configured maximum.

use anyhow::{Context, Result};
use image::GenericImageView;

use crate::config::ImagesConfig;

/// Result of image compression operation
#[derive(Debug)]
pub struct CompressionResult {
    /// Compressed image data (WebP format)
    pub data: Vec<u8>,
    /// Original image dimensions (width, height)
    pub original_dimensions: (u32, u32),
    /// New dimensions after resize (width, height)
    pub new_dimensions: (u32, u32),
    /// Whether the image was resized
    pub was_resized: bool,
}

/// Check if data starts with WebP magic bytes (RIFF....WEBP)
pub fn is_webp(data: &[u8]) -> bool {
    data.len() >= 12 && data[0..4] == *b"RIFF" && data[8..12] == *b"WEBP"
}

/// Compress an image: resize if needed, convert to WebP lossy format
///
/// # Arguments
/// * `data` - Raw image bytes (any format supported by `image` crate)
/// * `max_dimension` - Maximum width or height; larger images are scaled down
/// * `quality` - WebP quality (1-100, 85 recommended for good balance)
pub fn compress_image(data: &[u8], max_dimension: u32, quality: u8) -> Result<CompressionResult> {
    let img = image::load_from_memory(data).context("Failed to decode image")?;

    let (orig_w, orig_h) = img.dimensions();
    let original_dimensions = (orig_w, orig_h);

    // Calculate new dimensions maintaining aspect ratio
    let (new_w, new_h, was_resized) = if orig_w > max_dimension || orig_h > max_dimension {
        let scale = (max_dimension as f64) / (orig_w.max(orig_h) as f64);
        let new_w = ((orig_w as f64) * scale).round() as u32;
        let new_h = ((orig_h as f64) * scale).round() as u32;
        (new_w.max(1), new_h.max(1), true)
    } else {
        (orig_w, orig_h, false)
    };

    let processed = if was_resized {
        img.resize_exact(new_w, new_h, image::imageops::FilterType::Lanczos3)
    } else {
        img
    };

    // Convert to RGBA8 for WebP encoder
    let rgba = processed.to_rgba8();
    let (width, height) = rgba.dimensions();

    let encoder = webp::Encoder::from_rgba(&rgba, width, height);
    let webp_data = encoder.encode(quality as f32);

    Ok(CompressionResult {
        data: webp_data.to_vec(),
        original_dimensions,
        new_dimensions: (width, height),
        was_resized,
    })
}

/// Whether `data` must be re-encoded before storage. WebP within bounds
/// is stored as is.
pub fn should_process(data: &[u8], max_dimension: u32) -> bool {
    if !is_webp(data) {
        return true;
    }

    match image::load_from_memory(data) {
        Ok(img) => {
            let (w, h) = img.dimensions();
            w > max_dimension || h > max_dimension
        }
        Err(_) => true,
    }
}

/// Compress with the configured bounds.
pub fn prepare_for_storage(data: &[u8], config: &ImagesConfig) -> Result<Vec<u8>> {
    if !should_process(data, config.max_dimension) {
        return Ok(data.to_vec());
    }

    let result = compress_image(data, config.max_dimension, config.quality)?;
    if result.was_resized {
        log::debug!(
            "resized photo {:?} -> {:?}",
            result.original_dimensions,
            result.new_dimensions
        );
    }
    Ok(result.data)
}
