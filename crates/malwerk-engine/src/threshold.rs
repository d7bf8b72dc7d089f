// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Malwerk contributors
//
// Adaptive thresholding — binary ink masks computed against local means.
// The arithmetic variant uses an integral image; the Gaussian variant uses a
// separable weighted mean.

use image::{GrayImage, Luma};
use tracing::debug;

use crate::tone::sigma_for_kernel;

/// Compute the integral (summed-area table) of a grayscale image.
///
/// `integral[y * (width+1) + x]` contains the sum of all pixel values in the
/// rectangle [0, 0) to (x, y) (exclusive on both axes). The table has
/// dimensions `(width+1) x (height+1)` with a zero-padded border.
fn compute_integral_image(gray: &GrayImage) -> Vec<u64> {
    let (w, h) = gray.dimensions();
    let stride = (w + 1) as usize;
    let mut table = vec![0u64; stride * (h + 1) as usize];

    for y in 0..h {
        let mut row_sum: u64 = 0;
        for x in 0..w {
            row_sum += gray.get_pixel(x, y).0[0] as u64;
            let idx = (y + 1) as usize * stride + (x + 1) as usize;
            let above = y as usize * stride + (x + 1) as usize;
            table[idx] = row_sum + table[above];
        }
    }

    table
}

/// Mean pixel value within a square region centred on (cx, cy) with the given
/// radius, using the precomputed integral image. Regions are clamped to the
/// image, so border means are taken over the shrunk window.
fn region_mean(
    integral: &[u64],
    img_width: u32,
    img_height: u32,
    cx: u32,
    cy: u32,
    radius: u32,
) -> f64 {
    let stride = (img_width + 1) as usize;

    let x1 = cx.saturating_sub(radius) as usize;
    let y1 = cy.saturating_sub(radius) as usize;
    let x2 = ((cx + radius + 1) as usize).min(img_width as usize);
    let y2 = ((cy + radius + 1) as usize).min(img_height as usize);

    let area = ((x2 - x1) * (y2 - y1)) as f64;
    if area == 0.0 {
        return 128.0;
    }

    // Summed-area table lookup: S = I[y2][x2] - I[y1][x2] - I[y2][x1] + I[y1][x1]
    let sum = integral[y2 * stride + x2] as f64
        - integral[y1 * stride + x2] as f64
        - integral[y2 * stride + x1] as f64
        + integral[y1 * stride + x1] as f64;

    sum / area
}

/// Binary ink mask against the arithmetic local mean.
///
/// A pixel is ink (255) when strictly below `local_mean - bias`, background
/// (0) otherwise. A uniform image therefore produces an empty mask: no pixel
/// sits below its own mean minus a positive bias.
///
/// `block_size` is the odd window edge length; the window radius is
/// `block_size / 2`.
pub fn adaptive_mean_mask(gray: &GrayImage, block_size: u32, bias: f64) -> GrayImage {
    let (width, height) = gray.dimensions();
    let radius = block_size / 2;
    let integral = compute_integral_image(gray);

    let mut mask = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let local_mean = region_mean(&integral, width, height, x, y, radius);
            let cutoff = local_mean - bias;
            let ink = if (gray.get_pixel(x, y).0[0] as f64) < cutoff {
                255u8
            } else {
                0u8
            };
            mask.put_pixel(x, y, Luma([ink]));
        }
    }

    debug!(block_size, bias, "Adaptive mean mask computed");
    mask
}

/// Binary ink mask against a Gaussian-weighted local mean.
///
/// Same cutoff rule as [`adaptive_mean_mask`], but nearby pixels dominate the
/// mean, which keeps the threshold tight around fine structure.
pub fn adaptive_gaussian_mask(gray: &GrayImage, block_size: u32, bias: f64) -> GrayImage {
    let (width, height) = gray.dimensions();
    let mean = gaussian_neighbourhood_mean(gray, block_size);

    let mut mask = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let idx = y as usize * width as usize + x as usize;
            let cutoff = mean[idx] - bias;
            let ink = if (gray.get_pixel(x, y).0[0] as f64) < cutoff {
                255u8
            } else {
                0u8
            };
            mask.put_pixel(x, y, Luma([ink]));
        }
    }

    debug!(block_size, bias, "Adaptive Gaussian mask computed");
    mask
}

/// Gaussian-weighted neighbourhood mean of every pixel.
///
/// Separable two-pass filter in f64; borders replicate the edge pixel so the
/// weights always sum to one. Sigma follows the same kernel-size rule as the
/// tone stage.
fn gaussian_neighbourhood_mean(gray: &GrayImage, kernel: u32) -> Vec<f64> {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);
    let radius = (kernel / 2) as i64;
    let sigma = sigma_for_kernel(kernel) as f64;

    let mut weights = vec![0.0f64; kernel as usize];
    for (i, slot) in weights.iter_mut().enumerate() {
        let d = i as f64 - radius as f64;
        *slot = (-(d * d) / (2.0 * sigma * sigma)).exp();
    }
    let total: f64 = weights.iter().sum();
    for slot in weights.iter_mut() {
        *slot /= total;
    }

    // Horizontal pass.
    let mut horizontal = vec![0.0f64; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (i, &weight) in weights.iter().enumerate() {
                let sx = (x as i64 + i as i64 - radius).clamp(0, w as i64 - 1) as u32;
                acc += weight * gray.get_pixel(sx, y as u32).0[0] as f64;
            }
            horizontal[y * w + x] = acc;
        }
    }

    // Vertical pass.
    let mut mean = vec![0.0f64; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (i, &weight) in weights.iter().enumerate() {
                let sy = (y as i64 + i as i64 - radius).clamp(0, h as i64 - 1) as usize;
                acc += weight * horizontal[sy * w + x];
            }
            mean[y * w + x] = acc;
        }
    }

    mean
}

// -- Tests --------------------------------------------------------------------
