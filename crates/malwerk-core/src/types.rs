// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Malwerk contributors
//
// Core domain types for the Malwerk line-art engine.

use serde::{Deserialize, Serialize};

/// Watermark label stamped on processed pages unless a request overrides it.
pub const DEFAULT_WATERMARK_TEXT: &str = "@cat";

/// Named line-art styles exposed by the engine.
///
/// The set is closed: every request resolves to exactly one of these three
/// variants, and all per-style parameters live in the [`StyleConfig`] the
/// variant maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    /// Bold, thick outlines with minimal detail — for young children.
    Simple,
    /// Fine line work preserving texture — for older artists.
    Detailed,
    /// Flattened regions with clean medium-weight lines.
    Cartoon,
}

impl Style {
    pub const ALL: [Style; 3] = [Style::Simple, Style::Detailed, Style::Cartoon];

    /// Resolve a style from its wire name.
    ///
    /// This is total: names that match no style fall back to [`Style::Cartoon`].
    /// The fallback is part of the service contract — the style is a hint,
    /// never a reason to reject a request.
    pub fn from_name(name: &str) -> Self {
        match name {
            "simple" => Self::Simple,
            "detailed" => Self::Detailed,
            _ => Self::Cartoon,
        }
    }

    /// Wire name, also used in download filenames and response headers.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Detailed => "detailed",
            Self::Cartoon => "cartoon",
        }
    }

    /// Static parameter bundle for this style.
    pub fn config(&self) -> &'static StyleConfig {
        match self {
            Self::Simple => &SIMPLE_CONFIG,
            Self::Detailed => &DETAILED_CONFIG,
            Self::Cartoon => &CARTOON_CONFIG,
        }
    }
}

impl Default for Style {
    fn default() -> Self {
        Self::Cartoon
    }
}

impl std::fmt::Display for Style {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How line candidates are extracted from the toned image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeMethod {
    /// Adaptive threshold against the arithmetic local mean.
    AdaptiveMean,
    /// Canny gradient edges ANDed with an adaptive threshold against a
    /// Gaussian-weighted local mean. Both must agree a pixel is an edge.
    CannyRefined,
}

/// Parameters for the edge-preserving bilateral pre-filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BilateralConfig {
    /// Filter window diameter in pixels.
    pub diameter: u32,
    /// Sigma for the colour-distance weight (L1 across channels).
    pub sigma_color: f32,
    /// Sigma for the spatial-distance weight.
    pub sigma_space: f32,
}

/// Complete parameter bundle for one style.
///
/// Every pipeline stage reads its knobs from here; nothing is negotiated at
/// runtime, so a resolved style fully determines the processing chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StyleConfig {
    /// Working raster is capped at this width (aspect preserved, never upscaled).
    pub max_width: u32,
    /// Colour-domain bilateral smoothing before grayscale conversion.
    pub bilateral: Option<BilateralConfig>,
    /// Median blur kernel size (odd).
    pub median_kernel: u32,
    /// Gaussian blur kernel size applied after the median (odd).
    pub gaussian_kernel: Option<u32>,
    /// Line-candidate extraction method.
    pub edge_method: EdgeMethod,
    /// Adaptive threshold block size (odd, >= 3).
    pub block_size: u32,
    /// Constant subtracted from the local mean to form the ink cutoff.
    pub threshold_bias: f64,
    /// Morphological kernel edge length (2 or 3).
    pub morph_kernel: u32,
    /// Extra dilation passes after the closing step.
    pub extra_dilations: u32,
}

/// Heavy smoothing, large blocks, strong bias, aggressive thickening.
pub static SIMPLE_CONFIG: StyleConfig = StyleConfig {
    max_width: 800,
    bilateral: None,
    median_kernel: 7,
    gaussian_kernel: Some(5),
    edge_method: EdgeMethod::AdaptiveMean,
    block_size: 15,
    threshold_bias: 12.0,
    morph_kernel: 3,
    extra_dilations: 2,
};

/// Light smoothing, Canny-refined edges, no extra thickening.
pub static DETAILED_CONFIG: StyleConfig = StyleConfig {
    max_width: 1200,
    bilateral: None,
    median_kernel: 3,
    gaussian_kernel: None,
    edge_method: EdgeMethod::CannyRefined,
    block_size: 7,
    threshold_bias: 5.0,
    morph_kernel: 2,
    extra_dilations: 0,
};

/// Bilateral flattening, medium blocks, one thickening pass.
pub static CARTOON_CONFIG: StyleConfig = StyleConfig {
    max_width: 1000,
    bilateral: Some(BilateralConfig {
        diameter: 15,
        sigma_color: 80.0,
        sigma_space: 80.0,
    }),
    median_kernel: 5,
    gaussian_kernel: None,
    edge_method: EdgeMethod::AdaptiveMean,
    block_size: 9,
    threshold_bias: 8.0,
    morph_kernel: 2,
    extra_dilations: 1,
};

/// Watermark request: whether to stamp, and what text to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkSpec {
    pub enabled: bool,
    pub text: String,
}

impl WatermarkSpec {
    /// A watermark request that skips stamping entirely.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            text: DEFAULT_WATERMARK_TEXT.to_string(),
        }
    }

    /// Enabled watermark with the given label.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            enabled: true,
            text: text.into(),
        }
    }
}

impl Default for WatermarkSpec {
    fn default() -> Self {
        Self {
            enabled: true,
            text: DEFAULT_WATERMARK_TEXT.to_string(),
        }
    }
}

/// Status of the embedded HTTP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_name_round_trips() {
        for style in Style::ALL {
            assert_eq!(Style::from_name(style.name()), style);
        }
    }

    #[test]
    fn unknown_names_fall_back_to_cartoon() {
        assert_eq!(Style::from_name("sketch"), Style::Cartoon);
        assert_eq!(Style::from_name(""), Style::Cartoon);
        assert_eq!(Style::from_name("SIMPLE"), Style::Cartoon); // matching is exact
        assert_eq!(Style::default(), Style::Cartoon);
    }

    #[test]
    fn unknown_style_shares_cartoon_config() {
        assert_eq!(Style::from_name("does-not-exist").config(), Style::Cartoon.config());
    }

    #[test]
    fn config_tables_are_well_formed() {
        for style in Style::ALL {
            let config = style.config();
            assert!(config.max_width >= 1);
            assert_eq!(config.median_kernel % 2, 1, "{style}: median kernel must be odd");
            if let Some(k) = config.gaussian_kernel {
                assert_eq!(k % 2, 1, "{style}: gaussian kernel must be odd");
            }
            assert_eq!(config.block_size % 2, 1, "{style}: block size must be odd");
            assert!(config.block_size >= 3, "{style}: block size must be >= 3");
            assert!(config.threshold_bias > 0.0);
            assert!(matches!(config.morph_kernel, 2 | 3));
        }
    }

    #[test]
    fn style_serde_uses_lowercase_wire_names() {
        let json = serde_json::to_string(&Style::Detailed).unwrap();
        assert_eq!(json, "\"detailed\"");
        let style: Style = serde_json::from_str("\"simple\"").unwrap();
        assert_eq!(style, Style::Simple);
    }
}
