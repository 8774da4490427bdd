use std::collections::HashMap;
use std::path::Path;

use ab_glyph::{point, Font, FontArc, GlyphId, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::log_warn;

/// Padding around rendered text, in pixels.
const TEXT_PAD: f32 = 2.0;
/// Line advance as a multiple of the font size.
const LINE_HEIGHT_FACTOR: f32 = 1.2;
/// Smallest raster a text layer ever gets.
const MIN_TEXT_EDGE: u32 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// Structured description a text layer is re-rendered from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextData {
    pub text: String,
    pub font: String,
    pub size: f32,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub align: TextAlign,
    pub color: [u8; 4],
}

impl Default for TextData {
    fn default() -> Self {
        Self {
            text: String::new(),
            font: "sans-serif".to_string(),
            size: 32.0,
            bold: false,
            italic: false,
            underline: false,
            align: TextAlign::Left,
            color: [0, 0, 0, 255],
        }
    }
}

// ============================================================================
// FONT REGISTRY
// ============================================================================

/// Fonts available for text layers, keyed by lower-case family name.
/// The first registered font doubles as the fallback for unknown families.
#[derive(Clone, Default)]
pub struct FontRegistry {
    fonts: HashMap<String, FontArc>,
    fallback: Option<String>,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a font from raw TTF/OTF bytes.
    pub fn register_bytes(&mut self, family: &str, bytes: Vec<u8>) -> Result<(), String> {
        let font = FontArc::try_from_vec(bytes).map_err(|e| format!("invalid font '{}': {}", family, e))?;
        let key = family.to_lowercase();
        if self.fallback.is_none() {
            self.fallback = Some(key.clone());
        }
        self.fonts.insert(key, font);
        Ok(())
    }

    pub fn register_file(&mut self, family: &str, path: &Path) -> Result<(), String> {
        let bytes = std::fs::read(path).map_err(|e| format!("{}: {}", path.display(), e))?;
        self.register_bytes(family, bytes)
    }

    pub fn get(&self, family: &str) -> Option<&FontArc> {
        self.fonts
            .get(&family.to_lowercase())
            .or_else(|| self.fallback.as_ref().and_then(|k| self.fonts.get(k)))
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }
}

// ============================================================================
// RENDERING
// ============================================================================

/// Positioned glyphs for one line, starting at x = 0, plus the line width.
fn layout_line(font: &FontArc, scale: PxScale, line: &str) -> (Vec<(GlyphId, f32)>, f32) {
    let scaled = font.as_scaled(scale);
    let mut glyphs = Vec::with_capacity(line.len());
    let mut cursor = 0.0f32;
    let mut prev: Option<GlyphId> = None;
    for ch in line.chars() {
        let id = font.glyph_id(ch);
        if let Some(p) = prev {
            cursor += scaled.kern(p, id);
        }
        glyphs.push((id, cursor));
        cursor += scaled.h_advance(id);
        prev = Some(id);
    }
    (glyphs, cursor)
}

/// Rasterise `text` into a tight RGBA buffer (top-left = layer origin).
///
/// Bold is approximated by a one-pixel horizontal smear and italic by a
/// shear of the glyph coverage, since the registry holds one face per family.
pub fn render_text_layer(text: &TextData, fonts: &FontRegistry) -> RgbaImage {
    let blank = || RgbaImage::new(MIN_TEXT_EDGE, MIN_TEXT_EDGE);
    if text.text.is_empty() {
        return blank();
    }
    let Some(font) = fonts.get(&text.font) else {
        log_warn!("text layer: no font registered for '{}'", text.font);
        return blank();
    };

    let size = text.size.max(1.0);
    let scale = PxScale::from(size);
    let line_h = size * LINE_HEIGHT_FACTOR;
    let ascent = font.as_scaled(scale).ascent();

    let lines: Vec<(Vec<(GlyphId, f32)>, f32)> =
        text.text.split('\n').map(|l| layout_line(font, scale, l)).collect();
    let max_w = lines.iter().map(|(_, w)| *w).fold(0.0f32, f32::max);
    let slant = if text.italic { size * 0.2 } else { 0.0 };
    let smear = if text.bold { 1.0 } else { 0.0 };
    let extra = slant + smear;

    let width = ((max_w + extra).ceil() as u32 + (TEXT_PAD * 2.0) as u32).max(MIN_TEXT_EDGE);
    let height = (((lines.len() as f32) * line_h).ceil() as u32 + (TEXT_PAD * 2.0) as u32).max(MIN_TEXT_EDGE);

    let mut coverage = vec![0f32; (width * height) as usize];
    let mut plot = |x: i32, y: i32, c: f32| {
        if x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height {
            let idx = (y as u32 * width + x as u32) as usize;
            coverage[idx] = (coverage[idx] + c).min(1.0);
        }
    };

    for (i, (glyphs, line_w)) in lines.iter().enumerate() {
        let x0 = match text.align {
            TextAlign::Left => TEXT_PAD,
            TextAlign::Center => (width as f32 - line_w) / 2.0,
            TextAlign::Right => width as f32 - TEXT_PAD - line_w,
        };
        let top = TEXT_PAD + i as f32 * line_h;
        let baseline = top + ascent;

        for &(id, gx) in glyphs {
            let glyph = id.with_scale_and_position(scale, point(x0 + gx, baseline));
            let Some(outlined) = font.outline_glyph(glyph) else { continue };
            let bounds = outlined.px_bounds();
            outlined.draw(|px, py, c| {
                let y = bounds.min.y as i32 + py as i32;
                let shear = if text.italic { ((baseline - y as f32) * 0.2).round() as i32 } else { 0 };
                let x = bounds.min.x as i32 + px as i32 + shear;
                plot(x, y, c);
                if text.bold {
                    plot(x + 1, y, c);
                }
            });
        }

        if text.underline && *line_w > 0.0 {
            let uy = (baseline + (size * 0.1).max(1.0)).round() as i32;
            let thickness = (size / 16.0).ceil().max(1.0) as i32;
            for dy in 0..thickness {
                for x in x0.floor() as i32..(x0 + line_w).ceil() as i32 {
                    plot(x, uy + dy, 1.0);
                }
            }
        }
    }

    let [r, g, b, a] = text.color;
    RgbaImage::from_fn(width, height, |x, y| {
        let c = coverage[(y * width + x) as usize];
        Rgba([r, g, b, (a as f32 * c).round() as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_font_yields_minimum_blank_raster() {
        let fonts = FontRegistry::new();
        let data = TextData { text: "hello".into(), ..TextData::default() };
        let img = render_text_layer(&data, &fonts);
        assert_eq!(img.dimensions(), (MIN_TEXT_EDGE, MIN_TEXT_EDGE));
        assert!(img.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn garbage_font_bytes_are_rejected() {
        let mut fonts = FontRegistry::new();
        assert!(fonts.register_bytes("bogus", vec![1, 2, 3]).is_err());
        assert!(fonts.is_empty());
    }
}
