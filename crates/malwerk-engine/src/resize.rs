// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Malwerk contributors
//
// Width capping — downsamples working rasters to a style's maximum width.

use image::DynamicImage;
use image::imageops::FilterType;
use malwerk_core::error::{MalwerkError, Result};
use tracing::{debug, instrument};

/// Cap the raster at `max_width`, preserving aspect ratio.
///
/// Images at or below the cap pass through untouched — the stage never
/// upscales and never re-resamples. The new height is rounded to the nearest
/// pixel and clamped to 1 so extreme slivers survive.
#[instrument(skip(image), fields(width = image.width(), height = image.height(), max_width))]
pub fn cap_width(image: DynamicImage, max_width: u32) -> Result<DynamicImage> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(MalwerkError::DegenerateImage { width, height });
    }
    if width <= max_width {
        debug!("Raster already within cap; passing through");
        return Ok(image);
    }

    let scale = max_width as f64 / width as f64;
    let new_height = ((height as f64 * scale).round() as u32).max(1);
    let resized = image.resize_exact(max_width, new_height, FilterType::Triangle);
    debug!(new_width = max_width, new_height, "Raster downsampled");
    Ok(resized)
}

// -- Tests --------------------------------------------------------------------
