// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Malwerk contributors
//
// Page pipeline — runs the full processing chain for one style: decode,
// width cap, tone mapping, line extraction, mask refinement, polarity
// inversion, optional watermark, PNG encode.

use image::{DynamicImage, GrayImage};
use malwerk_core::error::Result;
use malwerk_core::types::{Style, StyleConfig, WatermarkSpec};
use tracing::{info, instrument};

use crate::{codec, extract, morph, polarity, resize, tone, watermark};

/// A configured processing chain for one style.
///
/// The pipeline is cheap to build — per-style parameters are static — and
/// carries no mutable state, so one instance can serve many pages.
#[derive(Debug, Clone)]
pub struct PagePipeline {
    style: Style,
    config: &'static StyleConfig,
    watermark: WatermarkSpec,
}

impl PagePipeline {
    pub fn new(style: Style, watermark: WatermarkSpec) -> Self {
        Self {
            style,
            config: style.config(),
            watermark,
        }
    }

    /// Build a pipeline from a wire-format style name. Unrecognized names
    /// resolve to the default style rather than failing.
    pub fn for_name(name: &str, watermark: WatermarkSpec) -> Self {
        Self::new(Style::from_name(name), watermark)
    }

    /// The style this pipeline renders, after name resolution.
    pub fn style(&self) -> Style {
        self.style
    }

    /// Process one encoded source image into a finished coloring page PNG.
    #[instrument(skip(self, data), fields(style = %self.style, input_bytes = data.len()))]
    pub fn process(&self, data: &[u8]) -> Result<Vec<u8>> {
        let image = codec::decode(data)?;
        let page = self.render_page(image)?;
        let png = codec::encode_png(&page)?;
        info!(
            width = page.width(),
            height = page.height(),
            png_bytes = png.len(),
            "Page rendered"
        );
        Ok(png)
    }

    fn render_page(&self, image: DynamicImage) -> Result<GrayImage> {
        let image = resize::cap_width(image, self.config.max_width)?;
        let toned = tone::tone_map(&image, self.config);
        let mask = extract::extract_lines(&toned, self.config);
        let mask = morph::refine_mask(mask, self.config);
        let mut page = polarity::invert(mask);
        if self.watermark.enabled {
            watermark::stamp(&mut page, &self.watermark.text);
        }
        Ok(page)
    }
}

/// One-shot processing: resolve `style_name` and render `data` to a PNG.
pub fn process(style_name: &str, data: &[u8], watermark: WatermarkSpec) -> Result<Vec<u8>> {
    PagePipeline::for_name(style_name, watermark).process(data)
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};
    use imageproc::region_labelling::{Connectivity, connected_components};
    use malwerk_core::error::MalwerkError;

    fn encode(image: DynamicImage) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        image.write_to(&mut buf, image::ImageFormat::Png).expect("png encode");
        buf.into_inner()
    }

    fn uniform_rgb(width: u32, height: u32, value: u8) -> Vec<u8> {
        encode(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb([value, value, value]),
        )))
    }

    /// A full-width dark bar with one-pixel mid-gray ramps above and below.
    /// The soft edges mimic photographic content: gradient maxima land on
    /// the ramp rows, so edge positions are stable across the whole chain.
    fn soft_bar_scene() -> Vec<u8> {
        let gray = GrayImage::from_fn(200, 120, |_, y| match y {
            51 | 68 => Luma([130u8]),
            52..=67 => Luma([40u8]),
            _ => Luma([220u8]),
        });
        encode(DynamicImage::ImageLuma8(gray))
    }

    fn decode_page(png: &[u8]) -> GrayImage {
        image::load_from_memory(png).expect("decode output").to_luma8()
    }

    fn dark_pixel_count(page: &GrayImage) -> usize {
        page.pixels().filter(|p| p.0[0] < 128).count()
    }

    fn dark_region_count(page: &GrayImage) -> u32 {
        let ink = GrayImage::from_fn(page.width(), page.height(), |x, y| {
            if page.get_pixel(x, y).0[0] < 128 {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        });
        let labels = connected_components(&ink, Connectivity::Eight, Luma([0u8]));
        labels.pixels().map(|p| p.0[0]).max().unwrap_or(0)
    }

    #[test]
    fn simple_style_caps_width_and_renders_a_white_page() {
        let input = uniform_rgb(2000, 1000, 128);
        let png = process("simple", &input, WatermarkSpec::disabled()).expect("process");
        let page = decode_page(&png);

        assert_eq!(page.dimensions(), (800, 400));
        // A featureless input has no lines to draw.
        assert!(page.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn watermark_lands_in_the_bottom_right_quadrant() {
        let input = uniform_rgb(2000, 1000, 128);
        let png = process("simple", &input, WatermarkSpec::default()).expect("process");
        let page = decode_page(&png);

        let marked: Vec<(u32, u32)> = page
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] < 255)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!marked.is_empty(), "the watermark must be visible");
        for (x, y) in marked {
            assert!(x >= 400 && y >= 200, "watermark pixel at ({x},{y}) outside the corner");
        }
    }

    #[test]
    fn detailed_output_keeps_structure_the_simple_style_fuses() {
        let input = soft_bar_scene();
        let simple = decode_page(&process("simple", &input, WatermarkSpec::disabled()).unwrap());
        let detailed =
            decode_page(&process("detailed", &input, WatermarkSpec::disabled()).unwrap());

        // The bar's two soft edges stay distinct strokes under the detailed
        // style; the simple style's thickening fuses the whole bar into one
        // bold region covering far more ink.
        let simple_regions = dark_region_count(&simple);
        let detailed_regions = dark_region_count(&detailed);
        assert!(simple_regions >= 1, "simple must draw the bar at all");
        assert!(
            detailed_regions > simple_regions,
            "expected detailed ({detailed_regions} regions) to keep more distinct strokes \
             than simple ({simple_regions})"
        );
        assert!(
            dark_pixel_count(&simple) > dark_pixel_count(&detailed),
            "simple's strokes should carry more ink than detailed's fine lines"
        );
    }

    #[test]
    fn every_style_emits_strictly_binary_line_work() {
        let input = soft_bar_scene();
        for style in Style::ALL {
            let png = process(style.name(), &input, WatermarkSpec::disabled()).unwrap();
            let page = decode_page(&png);
            assert!(
                page.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255),
                "{style}: page must be pure black-on-white without a watermark"
            );
            assert!(dark_pixel_count(&page) > 0, "{style}: the bar must leave ink");
        }
    }

    #[test]
    fn detailed_checkerboard_retains_cell_boundaries() {
        // 8x8 checkerboard, 50 px cells. Every internal cell boundary has a
        // dark cell on one side, so the detailed chain should trace it.
        let cells = GrayImage::from_fn(400, 400, |x, y| {
            if (x / 50 + y / 50) % 2 == 0 {
                Luma([40u8])
            } else {
                Luma([220u8])
            }
        });
        let input = encode(DynamicImage::ImageLuma8(cells));
        let page = decode_page(&process("detailed", &input, WatermarkSpec::disabled()).unwrap());

        // A boundary counts as retained when its +/-2 px band holds at least
        // one cell-length of ink. 7 internal boundaries per axis, 14 total.
        let band_ink = |vertical: bool, position: u32| -> usize {
            page.enumerate_pixels()
                .filter(|(x, y, p)| {
                    let along = if vertical { *x } else { *y };
                    along.abs_diff(position) <= 2 && p.0[0] < 128
                })
                .count()
        };
        let mut retained = 0;
        for k in 1..8u32 {
            if band_ink(true, 50 * k) > 50 {
                retained += 1;
            }
            if band_ink(false, 50 * k) > 50 {
                retained += 1;
            }
        }
        assert!(retained >= 7, "only {retained} of 14 cell boundaries left ink");
    }

    #[test]
    fn pipeline_matches_the_composed_stages() {
        let input = soft_bar_scene();
        let via_pipeline = process("cartoon", &input, WatermarkSpec::disabled()).unwrap();

        let config = Style::Cartoon.config();
        let image = codec::decode(&input).unwrap();
        let image = resize::cap_width(image, config.max_width).unwrap();
        let toned = tone::tone_map(&image, config);
        let mask = extract::extract_lines(&toned, config);
        let mask = morph::refine_mask(mask, config);
        let page = polarity::invert(mask);
        let by_hand = codec::encode_png(&page).unwrap();

        assert_eq!(via_pipeline, by_hand);
    }

    #[test]
    fn unknown_style_renders_exactly_like_cartoon() {
        let input = soft_bar_scene();
        let fallback = process("sketchy", &input, WatermarkSpec::disabled()).unwrap();
        let cartoon = process("cartoon", &input, WatermarkSpec::disabled()).unwrap();
        assert_eq!(fallback, cartoon);

        let pipeline = PagePipeline::for_name("sketchy", WatermarkSpec::disabled());
        assert_eq!(pipeline.style(), Style::Cartoon);
    }

    #[test]
    fn disabling_the_watermark_changes_the_output() {
        let input = uniform_rgb(400, 300, 128);
        let with = process("cartoon", &input, WatermarkSpec::default()).unwrap();
        let without = process("cartoon", &input, WatermarkSpec::disabled()).unwrap();
        assert_ne!(with, without);
    }

    #[test]
    fn undecodable_input_is_a_decode_error() {
        let err = process("simple", b"not an image at all", WatermarkSpec::disabled())
            .expect_err("garbage must not decode");
        assert!(matches!(err, MalwerkError::Decode(_)), "got {err:?}");
    }

    #[test]
    fn output_is_a_grayscale_png() {
        let input = soft_bar_scene();
        let png = process("detailed", &input, WatermarkSpec::disabled()).unwrap();
        assert!(png.starts_with(b"\x89PNG\r\n\x1a\n"));
        let decoded = image::load_from_memory(&png).unwrap();
        assert!(matches!(decoded, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn processing_is_deterministic_across_threads() {
        let input = soft_bar_scene();
        let reference = process("simple", &input, WatermarkSpec::default()).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let input = input.clone();
                std::thread::spawn(move || process("simple", &input, WatermarkSpec::default()))
            })
            .collect();
        for handle in handles {
            let png = handle.join().expect("thread").expect("process");
            assert_eq!(png, reference);
        }
    }
}
