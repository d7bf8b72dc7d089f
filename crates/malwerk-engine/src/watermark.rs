// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Malwerk contributors
//
// Watermark stamping — draws a small text label over a near-white box in the
// bottom-right corner of a finished page. Font capability is resolved once
// per process: a system sans face when one exists, otherwise a built-in 5x7
// bitmap glyph set. Font trouble never fails a request.

use std::sync::OnceLock;

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{GrayImage, Luma};
use imageproc::drawing::draw_text_mut;
use tracing::{debug, info, instrument, warn};

/// Gray level of the label text.
const TEXT_GRAY: u8 = 150;
/// Alpha (0..=255) of the near-white box blended behind the label.
const BOX_ALPHA: u32 = 200;
/// Box padding around the measured text box, in pixels.
const PAD_X: i64 = 10;
const PAD_Y: i64 = 5;
/// Distance from the page edges to the text anchor.
const MARGIN: i64 = 20;

/// Font used for stamping, resolved once per process.
enum LabelFont {
    /// A system face discovered through fontdb.
    System(FontVec),
    /// Built-in 5x7 bitmap glyphs — always available.
    Builtin,
}

static LABEL_FONT: OnceLock<LabelFont> = OnceLock::new();

fn label_font() -> &'static LabelFont {
    LABEL_FONT.get_or_init(|| match load_system_font() {
        Some(font) => LabelFont::System(font),
        None => {
            warn!("No usable system font; falling back to built-in glyphs");
            LabelFont::Builtin
        }
    })
}

/// Query the host font database for a sans face we can rasterize.
fn load_system_font() -> Option<FontVec> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    debug!(font_count = db.len(), "System fonts enumerated");

    let query = fontdb::Query {
        families: &[
            fontdb::Family::Name("Helvetica"),
            fontdb::Family::Name("DejaVu Sans"),
            fontdb::Family::Name("Liberation Sans"),
            fontdb::Family::SansSerif,
        ],
        ..fontdb::Query::default()
    };
    let id = db.query(&query)?;
    let font = db.with_face_data(id, |data, face_index| {
        FontVec::try_from_vec_and_index(data.to_vec(), face_index).ok()
    })??;

    if let Some(face) = db.face(id) {
        info!(
            family = face.families.first().map(|(name, _)| name.as_str()).unwrap_or("?"),
            "Watermark font resolved"
        );
    }
    Some(font)
}

/// Stamp `text` near the bottom-right corner of the page.
///
/// The label's font size scales with the page (`max(20, min(w, h) / 30)`).
/// The text anchor sits `MARGIN` pixels in from the right and bottom edges
/// based on the measured text box; pages too small for that clamp the anchor
/// to the page origin instead of drawing off-canvas. An empty label is a
/// no-op.
#[instrument(skip(page), fields(width = page.width(), height = page.height()))]
pub fn stamp(page: &mut GrayImage, text: &str) {
    if text.is_empty() {
        return;
    }
    let (width, height) = page.dimensions();
    let font_size = (width.min(height) / 30).max(20);

    let (text_w, text_h) = match label_font() {
        LabelFont::System(font) => measure_system(font, font_size, text),
        LabelFont::Builtin => measure_builtin(font_size, text),
    };

    let x = (width as i64 - text_w as i64 - MARGIN).max(0);
    let y = (height as i64 - text_h as i64 - MARGIN).max(0);

    blend_box(
        page,
        x - PAD_X,
        y - PAD_Y,
        text_w as i64 + 2 * PAD_X,
        text_h as i64 + 2 * PAD_Y,
    );

    match label_font() {
        LabelFont::System(font) => {
            draw_text_mut(
                page,
                Luma([TEXT_GRAY]),
                x as i32,
                y as i32,
                PxScale::from(font_size as f32),
                font,
                text,
            );
        }
        LabelFont::Builtin => draw_builtin(page, x, y, font_size, text),
    }
    debug!(x, y, text_w, text_h, font_size, "Watermark stamped");
}

/// Alpha-blend a near-white rectangle onto the page, clipped to its bounds.
fn blend_box(page: &mut GrayImage, x: i64, y: i64, w: i64, h: i64) {
    let (width, height) = page.dimensions();
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + w).min(width as i64);
    let y1 = (y + h).min(height as i64);

    for py in y0..y1 {
        for px in x0..x1 {
            let old = page.get_pixel(px as u32, py as u32).0[0] as u32;
            let blended = (BOX_ALPHA * 255 + (255 - BOX_ALPHA) * old) / 255;
            page.put_pixel(px as u32, py as u32, Luma([blended as u8]));
        }
    }
}

/// Advance-based measurement of the rendered text box for a vector font.
fn measure_system(font: &FontVec, font_size: u32, text: &str) -> (u32, u32) {
    let scaled = font.as_scaled(PxScale::from(font_size as f32));
    let mut width = 0.0f32;
    let mut previous = None;
    for ch in text.chars() {
        let glyph = font.glyph_id(ch);
        if let Some(prev) = previous {
            width += scaled.kern(prev, glyph);
        }
        width += scaled.h_advance(glyph);
        previous = Some(glyph);
    }
    let height = scaled.ascent() - scaled.descent();
    (width.ceil().max(1.0) as u32, height.ceil().max(1.0) as u32)
}

// -- Built-in bitmap glyphs ----------------------------------------------------

/// Glyph cell geometry of the built-in font: 5x7 pixel bitmaps with one
/// column of spacing between glyphs.
const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
const GLYPH_ADVANCE: u32 = GLYPH_W + 1;

/// Integer upscale factor that fits the requested font size.
fn builtin_scale(font_size: u32) -> u32 {
    (font_size / GLYPH_H).max(1)
}

fn measure_builtin(font_size: u32, text: &str) -> (u32, u32) {
    let scale = builtin_scale(font_size);
    let count = text.chars().count() as u32;
    // The last glyph carries no trailing spacing column.
    let columns = if count == 0 { 0 } else { count * GLYPH_ADVANCE - 1 };
    (columns * scale, GLYPH_H * scale)
}

fn draw_builtin(page: &mut GrayImage, x: i64, y: i64, font_size: u32, text: &str) {
    let scale = builtin_scale(font_size) as i64;
    let (width, height) = page.dimensions();
    let mut pen_x = x;

    for ch in text.chars() {
        let glyph = builtin_glyph(ch);
        for (col, bits) in glyph.iter().enumerate() {
            for row in 0..GLYPH_H {
                if bits & (1 << row) == 0 {
                    continue;
                }
                // Each glyph bit becomes a scale x scale block.
                for sy in 0..scale {
                    for sx in 0..scale {
                        let px = pen_x + col as i64 * scale + sx;
                        let py = y + row as i64 * scale + sy;
                        if px >= 0 && py >= 0 && (px as u32) < width && (py as u32) < height {
                            page.put_pixel(px as u32, py as u32, Luma([TEXT_GRAY]));
                        }
                    }
                }
            }
        }
        pen_x += GLYPH_ADVANCE as i64 * scale;
    }
}

/// Bitmap for `ch`; glyphs outside the printable ASCII table render as a
/// solid box so unknown characters stay visible.
fn builtin_glyph(ch: char) -> [u8; 5] {
    let code = ch as u32;
    if (0x20..=0x7E).contains(&code) {
        GLYPHS[(code - 0x20) as usize]
    } else {
        [0x7F; 5]
    }
}

/// Column-major 5x7 bitmaps for printable ASCII (0x20..=0x7E); bit 0 of each
/// column byte is the top row. Classic HD44780-style patterns.
#[rustfmt::skip]
const GLYPHS: [[u8; 5]; 95] = [
    [0x00, 0x00, 0x00, 0x00, 0x00], // ' '
    [0x00, 0x00, 0x5F, 0x00, 0x00], // '!'
    [0x00, 0x07, 0x00, 0x07, 0x00], // '"'
    [0x14, 0x7F, 0x14, 0x7F, 0x14], // '#'
    [0x24, 0x2A, 0x7F, 0x2A, 0x12], // '$'
    [0x23, 0x13, 0x08, 0x64, 0x62], // '%'
    [0x36, 0x49, 0x55, 0x22, 0x50], // '&'
    [0x00, 0x05, 0x03, 0x00, 0x00], // '\''
    [0x00, 0x1C, 0x22, 0x41, 0x00], // '('
    [0x00, 0x41, 0x22, 0x1C, 0x00], // ')'
    [0x14, 0x08, 0x3E, 0x08, 0x14], // '*'
    [0x08, 0x08, 0x3E, 0x08, 0x08], // '+'
    [0x00, 0x50, 0x30, 0x00, 0x00], // ','
    [0x08, 0x08, 0x08, 0x08, 0x08], // '-'
    [0x00, 0x60, 0x60, 0x00, 0x00], // '.'
    [0x20, 0x10, 0x08, 0x04, 0x02], // '/'
    [0x3E, 0x51, 0x49, 0x45, 0x3E], // '0'
    [0x00, 0x42, 0x7F, 0x40, 0x00], // '1'
    [0x42, 0x61, 0x51, 0x49, 0x46], // '2'
    [0x21, 0x41, 0x45, 0x4B, 0x31], // '3'
    [0x18, 0x14, 0x12, 0x7F, 0x10], // '4'
    [0x27, 0x45, 0x45, 0x45, 0x39], // '5'
    [0x3C, 0x4A, 0x49, 0x49, 0x30], // '6'
    [0x01, 0x71, 0x09, 0x05, 0x03], // '7'
    [0x36, 0x49, 0x49, 0x49, 0x36], // '8'
    [0x06, 0x49, 0x49, 0x29, 0x1E], // '9'
    [0x00, 0x36, 0x36, 0x00, 0x00], // ':'
    [0x00, 0x56, 0x36, 0x00, 0x00], // ';'
    [0x08, 0x14, 0x22, 0x41, 0x00], // '<'
    [0x14, 0x14, 0x14, 0x14, 0x14], // '='
    [0x00, 0x41, 0x22, 0x14, 0x08], // '>'
    [0x02, 0x01, 0x51, 0x09, 0x06], // '?'
    [0x32, 0x49, 0x79, 0x41, 0x3E], // '@'
    [0x7E, 0x11, 0x11, 0x11, 0x7E], // 'A'
    [0x7F, 0x49, 0x49, 0x49, 0x36], // 'B'
    [0x3E, 0x41, 0x41, 0x41, 0x22], // 'C'
    [0x7F, 0x41, 0x41, 0x22, 0x1C], // 'D'
    [0x7F, 0x49, 0x49, 0x49, 0x41], // 'E'
    [0x7F, 0x09, 0x09, 0x09, 0x01], // 'F'
    [0x3E, 0x41, 0x49, 0x49, 0x7A], // 'G'
    [0x7F, 0x08, 0x08, 0x08, 0x7F], // 'H'
    [0x00, 0x41, 0x7F, 0x41, 0x00], // 'I'
    [0x20, 0x40, 0x41, 0x3F, 0x01], // 'J'
    [0x7F, 0x08, 0x14, 0x22, 0x41], // 'K'
    [0x7F, 0x40, 0x40, 0x40, 0x40], // 'L'
    [0x7F, 0x02, 0x0C, 0x02, 0x7F], // 'M'
    [0x7F, 0x04, 0x08, 0x10, 0x7F], // 'N'
    [0x3E, 0x41, 0x41, 0x41, 0x3E], // 'O'
    [0x7F, 0x09, 0x09, 0x09, 0x06], // 'P'
    [0x3E, 0x41, 0x51, 0x21, 0x5E], // 'Q'
    [0x7F, 0x09, 0x19, 0x29, 0x46], // 'R'
    [0x46, 0x49, 0x49, 0x49, 0x31], // 'S'
    [0x01, 0x01, 0x7F, 0x01, 0x01], // 'T'
    [0x3F, 0x40, 0x40, 0x40, 0x3F], // 'U'
    [0x1F, 0x20, 0x40, 0x20, 0x1F], // 'V'
    [0x3F, 0x40, 0x38, 0x40, 0x3F], // 'W'
    [0x63, 0x14, 0x08, 0x14, 0x63], // 'X'
    [0x07, 0x08, 0x70, 0x08, 0x07], // 'Y'
    [0x61, 0x51, 0x49, 0x45, 0x43], // 'Z'
    [0x00, 0x7F, 0x41, 0x41, 0x00], // '['
    [0x02, 0x04, 0x08, 0x10, 0x20], // '\\'
    [0x00, 0x41, 0x41, 0x7F, 0x00], // ']'
    [0x04, 0x02, 0x01, 0x02, 0x04], // '^'
    [0x40, 0x40, 0x40, 0x40, 0x40], // '_'
    [0x00, 0x01, 0x02, 0x04, 0x00], // '`'
    [0x20, 0x54, 0x54, 0x54, 0x78], // 'a'
    [0x7F, 0x48, 0x44, 0x44, 0x38], // 'b'
    [0x38, 0x44, 0x44, 0x44, 0x20], // 'c'
    [0x38, 0x44, 0x44, 0x48, 0x7F], // 'd'
    [0x38, 0x54, 0x54, 0x54, 0x18], // 'e'
    [0x08, 0x7E, 0x09, 0x01, 0x02], // 'f'
    [0x0C, 0x52, 0x52, 0x52, 0x3E], // 'g'
    [0x7F, 0x08, 0x04, 0x04, 0x78], // 'h'
    [0x00, 0x44, 0x7D, 0x40, 0x00], // 'i'
    [0x20, 0x40, 0x44, 0x3D, 0x00], // 'j'
    [0x7F, 0x10, 0x28, 0x44, 0x00], // 'k'
    [0x00, 0x41, 0x7F, 0x40, 0x00], // 'l'
    [0x7C, 0x04, 0x18, 0x04, 0x78], // 'm'
    [0x7C, 0x08, 0x04, 0x04, 0x78], // 'n'
    [0x38, 0x44, 0x44, 0x44, 0x38], // 'o'
    [0x7C, 0x14, 0x14, 0x14, 0x08], // 'p'
    [0x08, 0x14, 0x14, 0x18, 0x7C], // 'q'
    [0x7C, 0x08, 0x04, 0x04, 0x08], // 'r'
    [0x48, 0x54, 0x54, 0x54, 0x20], // 's'
    [0x04, 0x3F, 0x44, 0x40, 0x20], // 't'
    [0x3C, 0x40, 0x40, 0x20, 0x7C], // 'u'
    [0x1C, 0x20, 0x40, 0x20, 0x1C], // 'v'
    [0x3C, 0x40, 0x30, 0x40, 0x3C], // 'w'
    [0x44, 0x28, 0x10, 0x28, 0x44], // 'x'
    [0x0C, 0x50, 0x50, 0x50, 0x3C], // 'y'
    [0x44, 0x64, 0x54, 0x4C, 0x44], // 'z'
    [0x00, 0x08, 0x36, 0x41, 0x00], // '{'
    [0x00, 0x00, 0x7F, 0x00, 0x00], // '|'
    [0x00, 0x41, 0x36, 0x08, 0x00], // '}'
    [0x08, 0x04, 0x08, 0x10, 0x08], // '~'
];

// -- Tests --------------------------------------------------------------------
