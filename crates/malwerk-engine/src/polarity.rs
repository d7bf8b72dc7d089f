// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Malwerk contributors
//
// Polarity inversion — the final flip that turns an ink mask (white lines on
// black) into dark line work on white paper.

use image::GrayImage;

/// Invert every pixel (v -> 255 - v). Applying it twice is the identity.
pub fn invert(mut mask: GrayImage) -> GrayImage {
    image::imageops::invert(&mut mask);
    mask
}

// -- Tests --------------------------------------------------------------------
