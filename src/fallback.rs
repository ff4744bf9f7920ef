//! Name-derived placeholder thumbnails.
//!
//! When a model cannot be loaded or rendered, its thumbnail becomes a flat
//! colored cube with the model name underneath. The color depends on the
//! name only, so a model that has not been processed yet is recognizable
//! across reloads. Generating the image needs no network and cannot fail.
//!
//! # Examples
//! ```
//! use huitong_thumbs::fallback::{placeholder_color, render_placeholder};
//!
//! assert_eq!(placeholder_color("duck.glb"), placeholder_color("duck.glb"));
//! let image = render_placeholder("duck.glb", 256, 256);
//! assert_eq!(image.dimensions(), (256, 256));
//! ```

use image::{Rgba, RgbaImage};

use crate::renderer::{self, RenderError, MAX_DIMENSION};

/// Longest label drawn under the cube, in characters.
pub const LABEL_MAX_CHARS: usize = 14;

const BRIGHTNESS_FLOOR: u32 = 55;
const BRIGHTNESS_SPAN: u32 = 200;
const LABEL_COLOR: Rgba<u8> = Rgba([40, 40, 40, 255]);
const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

/// Deterministic RGB color for `name`.
///
/// The UTF-16 code units of `name` are summed, so a character outside the
/// Basic Multilingual Plane counts as its two surrogates, the same as in
/// the web viewer. Each channel takes a different multiple of the sum
/// modulo `200`, offset into `55..255`.
///
/// # Examples
/// ```
/// use huitong_thumbs::fallback::placeholder_color;
///
/// // 'b' == 98
/// assert_eq!(placeholder_color("b"), [55 + 98 * 37 % 200, 55 + 98 * 73 % 200, 55 + 98 * 151 % 200].map(|c| c as u8));
/// ```
pub fn placeholder_color(name: &str) -> [u8; 3] {
    let sum: u32 = name.encode_utf16().fold(0u32, |acc, unit| acc.wrapping_add(u32::from(unit)));
    let channel = |multiplier: u32| {
        (BRIGHTNESS_FLOOR + (sum.wrapping_mul(multiplier) % BRIGHTNESS_SPAN)) as u8
    };
    [channel(37), channel(73), channel(151)]
}

/// Label text for `name`: uppercase, at most [`LABEL_MAX_CHARS`] characters.
///
/// # Examples
/// ```
/// use huitong_thumbs::fallback::label_text;
///
/// assert_eq!(label_text("duck.glb"), "DUCK.GLB");
/// assert_eq!(label_text("a-very-long-model-name.glb"), "A-VERY-LONG-..");
/// ```
pub fn label_text(name: &str) -> String {
    let upper: Vec<char> = name.trim().chars().flat_map(char::to_uppercase).collect();
    if upper.len() <= LABEL_MAX_CHARS {
        upper.into_iter().collect()
    } else {
        upper[..LABEL_MAX_CHARS - 2]
            .iter()
            .chain(['.', '.'].iter())
            .collect()
    }
}

/// Draws the placeholder for `name` on a transparent `width`×`height` canvas.
///
/// Each side is clamped to `1..=`[`MAX_DIMENSION`].
pub fn render_placeholder(name: &str, width: u32, height: u32) -> RgbaImage {
    let width = width.clamp(1, MAX_DIMENSION);
    let height = height.clamp(1, MAX_DIMENSION);
    let mut image = RgbaImage::new(width, height);
    let [r, g, b] = placeholder_color(name);

    let size = width.min(height) as f32 * 0.28;
    let cx = width as f32 * 0.5;
    let cy = height as f32 * 0.40;
    let dx = size * 0.866;
    let dy = size * 0.5;

    let top = Rgba([lighten(r), lighten(g), lighten(b), 255]);
    let left = Rgba([r, g, b, 255]);
    let right = Rgba([darken(r), darken(g), darken(b), 255]);

    fill_quad(
        &mut image,
        [(cx, cy - size), (cx + dx, cy - dy), (cx, cy), (cx - dx, cy - dy)],
        top,
    );
    fill_quad(
        &mut image,
        [(cx - dx, cy - dy), (cx, cy), (cx, cy + size), (cx - dx, cy + dy)],
        left,
    );
    fill_quad(
        &mut image,
        [(cx, cy), (cx + dx, cy - dy), (cx + dx, cy + dy), (cx, cy + size)],
        right,
    );

    let label = label_text(name);
    let scale = (width.min(height) / 128).max(1);
    draw_label(&mut image, &label, height as f32 * 0.80, scale);

    image
}

/// Renders the placeholder and encodes it as PNG.
///
/// # Errors
/// Only fails if the PNG encoder does.
pub fn placeholder_png(name: &str, width: u32, height: u32) -> Result<Vec<u8>, RenderError> {
    renderer::encode_png(&render_placeholder(name, width, height))
}

fn lighten(c: u8) -> u8 {
    (c as f32 + (255 - c) as f32 * 0.35) as u8
}

fn darken(c: u8) -> u8 {
    (c as f32 * 0.7) as u8
}

/// Fills a convex quad given in winding order.
fn fill_quad(image: &mut RgbaImage, corners: [(f32, f32); 4], color: Rgba<u8>) {
    let min_x = corners.iter().map(|c| c.0).fold(f32::INFINITY, f32::min).max(0.0) as u32;
    let max_x = (corners.iter().map(|c| c.0).fold(f32::NEG_INFINITY, f32::max).ceil() as u32).min(image.width());
    let min_y = corners.iter().map(|c| c.1).fold(f32::INFINITY, f32::min).max(0.0) as u32;
    let max_y = (corners.iter().map(|c| c.1).fold(f32::NEG_INFINITY, f32::max).ceil() as u32).min(image.height());

    for y in min_y..max_y {
        for x in min_x..max_x {
            let p = (x as f32 + 0.5, y as f32 + 0.5);
            let mut positive = false;
            let mut negative = false;
            for i in 0..4 {
                let a = corners[i];
                let b = corners[(i + 1) % 4];
                let cross = (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
                positive |= cross > 0.0;
                negative |= cross < 0.0;
            }
            if !(positive && negative) {
                image.put_pixel(x, y, color);
            }
        }
    }
}

fn draw_label(image: &mut RgbaImage, label: &str, center_y: f32, scale: u32) {
    let advance = (GLYPH_WIDTH + 1) * scale;
    let count = label.chars().count() as u32;
    if count == 0 {
        return;
    }
    let text_width = count * advance - scale;
    let origin_x = (image.width() as i64 - text_width as i64) / 2;
    let origin_y = center_y as i64 - (GLYPH_HEIGHT * scale) as i64 / 2;

    for (i, c) in label.chars().enumerate() {
        let rows = glyph(c);
        let gx = origin_x + i as i64 * advance as i64;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                for sy in 0..scale {
                    for sx in 0..scale {
                        let x = gx + (col * scale + sx) as i64;
                        let y = origin_y + (row as u32 * scale + sy) as i64;
                        if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
                            image.put_pixel(x as u32, y as u32, LABEL_COLOR);
                        }
                    }
                }
            }
        }
    }
}

/// 5x7 bitmap rows, most significant of the low five bits is the left column.
fn glyph(c: char) -> [u8; 7] {
    match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'A' => [0x0E, 0x11, 0x11, 0x11, 0x1F, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        ' ' => [0x00; 7],
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
    }
}
