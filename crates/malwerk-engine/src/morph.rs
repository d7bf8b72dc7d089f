// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Malwerk contributors
//
// Binary morphology — square-kernel dilation, erosion, and closing used to
// heal pinholes and thicken strokes in ink masks. Kernels of size 2 and 3
// are the only ones the styles use, and the even case needs explicit anchor
// arithmetic, so the windows are written out by hand.

use image::{GrayImage, Luma};
use malwerk_core::types::StyleConfig;
use tracing::{debug, instrument};

/// Offsets spanned by a square kernel of edge length `kernel`, anchored at
/// (kernel/2, kernel/2). Odd kernels are centred; a 2x2 kernel spans {-1, 0}
/// on each axis.
fn kernel_span(kernel: u32) -> std::ops::RangeInclusive<i64> {
    let anchor = (kernel / 2) as i64;
    (-anchor)..=(kernel as i64 - 1 - anchor)
}

/// Dilate: a pixel becomes ink if any neighbour under the kernel is ink.
/// Out-of-bounds neighbours contribute nothing.
pub fn dilate(mask: &GrayImage, kernel: u32) -> GrayImage {
    let (width, height) = mask.dimensions();
    let span = kernel_span(kernel);
    let mut output = GrayImage::new(width, height);

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let mut value = 0u8;
            'window: for dy in span.clone() {
                let ny = y + dy;
                if ny < 0 || ny >= height as i64 {
                    continue;
                }
                for dx in span.clone() {
                    let nx = x + dx;
                    if nx < 0 || nx >= width as i64 {
                        continue;
                    }
                    if mask.get_pixel(nx as u32, ny as u32).0[0] == 255 {
                        value = 255;
                        break 'window;
                    }
                }
            }
            output.put_pixel(x as u32, y as u32, Luma([value]));
        }
    }

    output
}

/// Erode: a pixel stays ink only if every in-bounds neighbour under the
/// kernel is ink. Out-of-bounds neighbours do not veto, so strokes touching
/// the border are not eaten from outside.
pub fn erode(mask: &GrayImage, kernel: u32) -> GrayImage {
    let (width, height) = mask.dimensions();
    let span = kernel_span(kernel);
    let mut output = GrayImage::new(width, height);

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let mut value = 255u8;
            'window: for dy in span.clone() {
                let ny = y + dy;
                if ny < 0 || ny >= height as i64 {
                    continue;
                }
                for dx in span.clone() {
                    let nx = x + dx;
                    if nx < 0 || nx >= width as i64 {
                        continue;
                    }
                    if mask.get_pixel(nx as u32, ny as u32).0[0] == 0 {
                        value = 0;
                        break 'window;
                    }
                }
            }
            output.put_pixel(x as u32, y as u32, Luma([value]));
        }
    }

    output
}

/// Close: dilate then erode with the same kernel. Fills pinholes and bridges
/// single-pixel gaps without a net thickness change.
pub fn close(mask: &GrayImage, kernel: u32) -> GrayImage {
    erode(&dilate(mask, kernel), kernel)
}

/// Style-specific cleanup: one closing pass, then the configured number of
/// extra dilations to thicken strokes.
#[instrument(skip(mask, config), fields(kernel = config.morph_kernel, extra_dilations = config.extra_dilations))]
pub fn refine_mask(mask: GrayImage, config: &StyleConfig) -> GrayImage {
    let mut refined = close(&mask, config.morph_kernel);
    for _ in 0..config.extra_dilations {
        refined = dilate(&refined, config.morph_kernel);
    }
    debug!("Morphological cleanup complete");
    refined
}

// -- Tests --------------------------------------------------------------------
