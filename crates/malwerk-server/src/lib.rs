// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Malwerk contributors
//
// Malwerk Server — embedded HTTP service for the line-art engine.  This crate
// bridges between the processing pipeline in `malwerk-engine` and network
// clients: raw and multipart uploads on `/process`, a JSON base64 variant on
// `/process-base64`, plus discovery and health endpoints.

pub mod http;
pub mod multipart;
pub mod server;

pub use server::ArtServer;
