// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Malwerk contributors
//
// malwerk-engine — Line-art rendering pipeline for Malwerk.
//
// Converts photographs into coloring-book pages: decoding, width capping,
// tone mapping, adaptive line extraction, morphological cleanup, polarity
// inversion, watermark stamping, and PNG encoding.

pub mod codec;
pub mod extract;
pub mod morph;
pub mod pipeline;
pub mod polarity;
pub mod resize;
pub mod threshold;
pub mod tone;
pub mod watermark;

// Re-export the primary entry points so callers can use `malwerk_engine::PagePipeline`.
pub use pipeline::{PagePipeline, process};
