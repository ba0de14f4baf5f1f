//! Image decoding and downsampling to the working resolution.
//!
//! Clustering and facet building scale with pixel count, so large
//! inputs are shrunk until the longest axis fits `working_resolution`.
//! Images already at or below the limit are returned unchanged.

use image::imageops::FilterType;

use crate::types::{PipelineError, RgbaImage};

/// Decode PNG, JPEG, BMP or WebP bytes into an RGBA image.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] for empty bytes or an image
/// without pixels, and [`PipelineError::ImageDecode`] for data the
/// decoder rejects.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    let image = image::load_from_memory(bytes)?.to_rgba8();
    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::EmptyInput);
    }
    Ok(image)
}

/// Shrink `image` so its longest axis is at most `max_dimension`,
/// preserving aspect ratio with a triangle (bilinear) filter.
///
/// Returns the (possibly unchanged) image and whether resizing was
/// applied. `None` disables resizing.
#[must_use]
pub fn downsample(image: &RgbaImage, max_dimension: Option<u32>) -> (RgbaImage, bool) {
    let Some(max_dimension) = max_dimension else {
        return (image.clone(), false);
    };
    let (w, h) = (image.width(), image.height());
    let long_axis = w.max(h);
    if long_axis <= max_dimension || max_dimension == 0 {
        return (image.clone(), false);
    }

    let (nw, nh) = scaled_size(w, h, max_dimension);
    let resized = image::imageops::resize(image, nw, nh, FilterType::Triangle);
    (resized, true)
}

/// Target size with the longest axis at `max_dimension`; neither side
/// drops below one pixel.
fn scaled_size(w: u32, h: u32, max_dimension: u32) -> (u32, u32) {
    let scale = f64::from(max_dimension) / f64::from(w.max(h));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let fit = |side: u32| ((f64::from(side) * scale).round() as u32).clamp(1, max_dimension);
    (fit(w), fit(h))
}
