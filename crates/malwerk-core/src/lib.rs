// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Malwerk contributors
//
// Malwerk — core types, style tables, and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::MalwerkError;
pub use types::*;
