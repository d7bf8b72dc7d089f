// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Malwerk contributors
//
// Unified error types for Malwerk.

use thiserror::Error;

/// Top-level error type for all Malwerk operations.
#[derive(Debug, Error)]
pub enum MalwerkError {
    // -- Pipeline errors --
    #[error("image decode failed: {0}")]
    Decode(String),

    #[error("degenerate image: {width}x{height} has no pixels")]
    DegenerateImage { width: u32, height: u32 },

    #[error("PNG encode failed: {0}")]
    Encode(String),

    #[error("image processing failed: {0}")]
    Processing(String),

    // -- Service errors --
    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MalwerkError>;
