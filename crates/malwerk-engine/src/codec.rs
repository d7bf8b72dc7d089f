// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Malwerk contributors
//
// Image codec — decodes uploaded bytes into a validated working raster and
// encodes finished pages as PNG.

use image::{DynamicImage, GrayImage, ImageFormat};
use malwerk_core::error::{MalwerkError, Result};
use tracing::{debug, instrument};

/// Decode raw encoded bytes (JPEG, PNG, WebP, etc.) into a working raster.
///
/// Zero-area images are rejected here so that every later stage can rely on
/// both dimensions being at least 1.
#[instrument(skip(data), fields(data_len = data.len()))]
pub fn decode(data: &[u8]) -> Result<DynamicImage> {
    let image = image::load_from_memory(data)
        .map_err(|err| MalwerkError::Decode(format!("failed to decode upload: {}", err)))?;
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(MalwerkError::DegenerateImage { width, height });
    }
    debug!(width, height, "Upload decoded");
    Ok(image)
}

/// Encode a finished gray page as PNG bytes.
///
/// PNG is lossless, so the strict 0/255 structure of line work survives
/// encoding; the single-channel buffer stays single-channel on the wire.
pub fn encode_png(page: &GrayImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    page.write_to(&mut cursor, ImageFormat::Png)
        .map_err(|err| MalwerkError::Encode(format!("PNG encoding failed: {}", err)))?;
    Ok(buffer)
}

// -- Tests --------------------------------------------------------------------
