// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Malwerk contributors
//
// Tone mapping — grayscale conversion and style-specific denoising ahead of
// line extraction. The cartoon style additionally flattens colour regions
// with an edge-preserving bilateral filter before dropping to luminance.

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::filter::{gaussian_blur_f32, median_filter};
use malwerk_core::types::{BilateralConfig, StyleConfig};
use tracing::{debug, instrument};

/// Sigma assigned to a Gaussian kernel of size `k` by OpenCV's auto rule,
/// so parameter tables tuned against OpenCV keep their meaning.
pub(crate) fn sigma_for_kernel(kernel: u32) -> f32 {
    0.3 * ((kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Convert to single-channel luminance and denoise per the style's chain.
///
/// Median kernels are odd; size `k` maps to a square window of radius
/// `(k - 1) / 2`. Output dimensions always match the input.
#[instrument(skip(image, config), fields(width = image.width(), height = image.height()))]
pub fn tone_map(image: &DynamicImage, config: &StyleConfig) -> GrayImage {
    let gray = match config.bilateral {
        Some(params) => {
            let rgb = image.to_rgb8();
            let flattened = bilateral_filter_rgb(&rgb, &params);
            debug!(diameter = params.diameter, "Bilateral flattening applied");
            DynamicImage::ImageRgb8(flattened).to_luma8()
        }
        None => image.to_luma8(),
    };

    let radius = config.median_kernel / 2;
    let denoised = median_filter(&gray, radius, radius);

    match config.gaussian_kernel {
        Some(kernel) => {
            let blurred = gaussian_blur_f32(&denoised, sigma_for_kernel(kernel));
            debug!(kernel, "Gaussian smoothing applied");
            blurred
        }
        None => denoised,
    }
}

/// Edge-preserving bilateral filter over an RGB image.
///
/// Each output pixel is a weighted mean of its square neighbourhood, where a
/// tap's weight is the product of a spatial Gaussian (distance from the
/// centre) and a colour Gaussian (L1 distance across channels from the centre
/// pixel). Similar-colour regions smooth out while strong colour boundaries
/// hold, which is what lets the later threshold find clean region outlines.
///
/// Border windows shrink: out-of-range taps are skipped. The centre tap
/// always contributes weight 1, so the normalisation term is never zero.
fn bilateral_filter_rgb(image: &RgbImage, params: &BilateralConfig) -> RgbImage {
    let (width, height) = image.dimensions();
    let radius = (params.diameter / 2) as i64;
    let side = (2 * radius + 1) as usize;

    let sigma_color2 = 2.0 * params.sigma_color as f64 * params.sigma_color as f64;
    let sigma_space2 = 2.0 * params.sigma_space as f64 * params.sigma_space as f64;

    // Weight lookup tables: colour weights indexed by the L1 channel distance
    // (0..=765), spatial weights by window offset.
    let mut color_weight = vec![0.0f64; 256 * 3];
    for (d, slot) in color_weight.iter_mut().enumerate() {
        *slot = (-((d * d) as f64) / sigma_color2).exp();
    }
    let mut space_weight = vec![0.0f64; side * side];
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let idx = ((dy + radius) * side as i64 + (dx + radius)) as usize;
            space_weight[idx] = (-((dx * dx + dy * dy) as f64) / sigma_space2).exp();
        }
    }

    let mut output = RgbImage::new(width, height);
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let center = image.get_pixel(x as u32, y as u32).0;
            let mut sum = [0.0f64; 3];
            let mut norm = 0.0f64;

            for dy in -radius..=radius {
                let ny = y + dy;
                if ny < 0 || ny >= height as i64 {
                    continue;
                }
                for dx in -radius..=radius {
                    let nx = x + dx;
                    if nx < 0 || nx >= width as i64 {
                        continue;
                    }
                    let neighbour = image.get_pixel(nx as u32, ny as u32).0;
                    let color_dist = (neighbour[0] as i32 - center[0] as i32).unsigned_abs()
                        + (neighbour[1] as i32 - center[1] as i32).unsigned_abs()
                        + (neighbour[2] as i32 - center[2] as i32).unsigned_abs();
                    let idx = ((dy + radius) * side as i64 + (dx + radius)) as usize;
                    let weight = space_weight[idx] * color_weight[color_dist as usize];

                    sum[0] += weight * neighbour[0] as f64;
                    sum[1] += weight * neighbour[1] as f64;
                    sum[2] += weight * neighbour[2] as f64;
                    norm += weight;
                }
            }

            let pixel = Rgb([
                (sum[0] / norm).round().clamp(0.0, 255.0) as u8,
                (sum[1] / norm).round().clamp(0.0, 255.0) as u8,
                (sum[2] / norm).round().clamp(0.0, 255.0) as u8,
            ]);
            output.put_pixel(x as u32, y as u32, pixel);
        }
    }

    output
}

// -- Tests --------------------------------------------------------------------
