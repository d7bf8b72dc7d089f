// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Malwerk contributors
//
// Multipart/form-data extraction — pulls the uploaded file out of a browser
// form post. Only the first part that declares a filename matters; field
// names, additional parts, and nested multipart are ignored.

use crate::http::find_subsequence;

/// Extract the boundary token from a `Content-Type` header value such as
/// `multipart/form-data; boundary=----WebKitFormBoundaryX`.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|param| {
        let (name, value) = param.trim().split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    })
}

/// Return the raw bytes of the first part carrying a `filename=` in its
/// `Content-Disposition`, or `None` when the body holds no file part or is
/// not well-formed multipart.
pub fn first_file_part(body: &[u8], boundary: &str) -> Option<Vec<u8>> {
    let delimiter = format!("--{boundary}");
    let close = format!("\r\n{delimiter}");

    let start = find_subsequence(body, delimiter.as_bytes())? + delimiter.len();
    let mut rest = &body[start..];

    loop {
        if rest.starts_with(b"--") {
            // Closing delimiter: end of parts.
            return None;
        }
        let part = rest.strip_prefix(b"\r\n").unwrap_or(rest);
        let header_len = find_subsequence(part, b"\r\n\r\n")?;
        let headers = String::from_utf8_lossy(&part[..header_len]).to_ascii_lowercase();
        let data = &part[header_len + 4..];
        let data_len = find_subsequence(data, close.as_bytes())?;

        if headers.contains("filename=") {
            return Some(data[..data_len].to_vec());
        }
        rest = &data[data_len + close.len()..];
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
