// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Malwerk contributors
//
// Application configuration.

use serde::{Deserialize, Serialize};

use crate::types::DEFAULT_WATERMARK_TEXT;

/// Runtime service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// TCP port the HTTP service listens on (default 8000).
    pub server_port: u16,
    /// Hard cap on uploaded image payloads, in bytes (default 10 MiB).
    pub max_upload_bytes: usize,
    /// Watermark text stamped on processed pages.
    pub watermark_text: String,
    /// Whether watermarking is on when a request does not say.
    pub watermark_default: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 8000,
            max_upload_bytes: 10 * 1024 * 1024,
            watermark_text: DEFAULT_WATERMARK_TEXT.to_string(),
            watermark_default: true,
        }
    }
}

impl AppConfig {
    /// Build a config from the process environment, starting from defaults.
    ///
    /// Recognized variables: `MALWERK_PORT`, `MALWERK_MAX_UPLOAD_BYTES`,
    /// `MALWERK_WATERMARK_TEXT`. Malformed values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("MALWERK_PORT") {
            match raw.parse() {
                Ok(port) => config.server_port = port,
                Err(_) => tracing::warn!(value = %raw, "ignoring malformed MALWERK_PORT"),
            }
        }
        if let Ok(raw) = std::env::var("MALWERK_MAX_UPLOAD_BYTES") {
            match raw.parse() {
                Ok(bytes) => config.max_upload_bytes = bytes,
                Err(_) => {
                    tracing::warn!(value = %raw, "ignoring malformed MALWERK_MAX_UPLOAD_BYTES")
                }
            }
        }
        if let Ok(text) = std::env::var("MALWERK_WATERMARK_TEXT") {
            if !text.is_empty() {
                config.watermark_text = text;
            }
        }
        config
    }
}
