// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Malwerk contributors
//
// Line extraction — turns a toned grayscale image into a binary ink mask
// (255 = line-work candidate, 0 = background) using the style's edge method.

use image::{GrayImage, Luma};
use imageproc::edges::canny;
use malwerk_core::types::{EdgeMethod, StyleConfig};
use tracing::{debug, instrument};

use crate::threshold::{adaptive_gaussian_mask, adaptive_mean_mask};

/// Canny hysteresis thresholds for the refined edge method.
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

/// Extract the ink mask for a style.
///
/// `AdaptiveMean` marks locally dark pixels outright. `CannyRefined` requires
/// a pixel to be both a Canny gradient edge and locally dark under the
/// Gaussian-weighted mean — keeping fine texture without promoting every
/// soft shadow to a line.
#[instrument(skip(toned, config), fields(width = toned.width(), height = toned.height()))]
pub fn extract_lines(toned: &GrayImage, config: &StyleConfig) -> GrayImage {
    match config.edge_method {
        EdgeMethod::AdaptiveMean => {
            adaptive_mean_mask(toned, config.block_size, config.threshold_bias)
        }
        EdgeMethod::CannyRefined => {
            let edges = canny(toned, CANNY_LOW, CANNY_HIGH);
            let shaded = adaptive_gaussian_mask(toned, config.block_size, config.threshold_bias);
            let mask = and_masks(&edges, &shaded);
            debug!("Canny edges intersected with adaptive mask");
            mask
        }
    }
}

/// Pixel-wise AND of two binary masks: 255 only where both are 255.
fn and_masks(a: &GrayImage, b: &GrayImage) -> GrayImage {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        let both = a.get_pixel(x, y).0[0] == 255 && b.get_pixel(x, y).0[0] == 255;
        Luma([if both { 255u8 } else { 0u8 }])
    })
}

// -- Tests --------------------------------------------------------------------
