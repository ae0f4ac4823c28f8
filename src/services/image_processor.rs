// src/services/image_processor.rs
use crate::config::ResampleTarget;
use crate::errors::IngestError;
use crate::models::{BinaryImage, CompressedImage, THUMB_SUFFIX, WEBP_CONTENT_TYPE, WEBP_EXTENSION};
use image::GenericImageView;
use image::imageops::FilterType;
use std::sync::Arc;

/// Decode, fit into a box, re-encode as WebP.
pub trait Resampler: Send + Sync {
    fn resample(
        &self,
        source: &BinaryImage,
        target: &ResampleTarget,
    ) -> Result<CompressedImage, IngestError>;
}

/// Largest size with the same aspect ratio that fits `max_dim`. Never upscales.
pub fn fit_within(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dim || longest == 0 {
        return (width, height);
    }

    let ratio = max_dim as f64 / longest as f64;
    let scale = |edge: u32| ((edge as f64 * ratio).round() as u32).clamp(1, max_dim);
    (scale(width), scale(height))
}

/// `photo.png` -> `photo.webp`; no name -> `image.webp`.
pub fn derived_name(original: Option<&str>) -> String {
    let stem = original
        .map(|name| name.rsplit(['/', '\\']).next().unwrap_or(name))
        .map(|name| match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        })
        .filter(|stem| !stem.is_empty())
        .unwrap_or("image");
    format!("{}.{}", stem, WEBP_EXTENSION)
}

/// `photo.webp` -> `photo_thumb.webp`
pub fn tag_name(name: &str, tag: &str) -> String {
    match name.rfind('.') {
        Some(idx) if idx > 0 => format!("{}{}{}", &name[..idx], tag, &name[idx..]),
        _ => format!("{}{}", name, tag),
    }
}

pub struct WebpResampler;

impl WebpResampler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WebpResampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Resampler for WebpResampler {
    fn resample(
        &self,
        source: &BinaryImage,
        target: &ResampleTarget,
    ) -> Result<CompressedImage, IngestError> {
        let img = image::load_from_memory(&source.bytes)
            .map_err(|e| IngestError::Decode(format!("Failed to load image: {}", e)))?;

        let (width, height) = img.dimensions();
        let (new_width, new_height) = fit_within(width, height, target.max_dim);

        let resized = if (new_width, new_height) == (width, height) {
            img
        } else {
            img.resize_exact(new_width, new_height, FilterType::Lanczos3)
        };
        let rgba = resized.to_rgba8();

        let encoder = webp::Encoder::from_rgba(&rgba, new_width, new_height);
        let encoded = encoder
            .encode_simple(false, target.quality * 100.0)
            .map_err(|e| IngestError::Encode(format!("WebP encoder failed: {:?}", e)))?;
        if encoded.is_empty() {
            return Err(IngestError::Encode("WebP encoder returned no data".to_string()));
        }

        log::debug!(
            "resampled {}x{} -> {}x{} ({} bytes, q={})",
            width,
            height,
            new_width,
            new_height,
            encoded.len(),
            target.quality
        );

        Ok(CompressedImage {
            name: derived_name(source.name.as_deref()),
            content_type: WEBP_CONTENT_TYPE.to_string(),
            width: new_width,
            height: new_height,
            bytes: encoded.to_vec(),
        })
    }
}

/// Second, smaller pass over the same source.
#[derive(Clone)]
pub struct ThumbnailGenerator {
    resampler: Arc<dyn Resampler>,
    target: ResampleTarget,
}

impl ThumbnailGenerator {
    pub fn new(resampler: Arc<dyn Resampler>, target: ResampleTarget) -> Self {
        Self { resampler, target }
    }

    pub fn thumbnail(&self, source: &BinaryImage) -> Result<CompressedImage, IngestError> {
        let mut thumb = self
            .resampler
            .resample(source, &self.target)
            .map_err(|e| IngestError::Thumbnail(e.to_string()))?;
        thumb.name = tag_name(&thumb.name, THUMB_SUFFIX);
        Ok(thumb)
    }
}
