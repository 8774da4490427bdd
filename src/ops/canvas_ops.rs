// ============================================================================
// DOCUMENT OPERATIONS — crop, resize, canvas size, rotate, flip, fill, clipboard
// ============================================================================
//
// Every operation here mutates the document wholesale.  Callers take a
// history snapshot first; operations that change the document size also
// reinitialise the selection.

use image::{Rgba, RgbaImage, imageops};
use rayon::prelude::*;

use crate::canvas::{BlendMode, Document, Layer, LayerKind, clamp_size};
use crate::compositor::{draw_image, erase_image};
use crate::geometry::Rect;
use crate::selection::SelectionMask;
use crate::{log_info, log_warn};

/// Interpolation method for resize operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl Interpolation {
    pub fn all() -> &'static [Interpolation] {
        &[Interpolation::Nearest, Interpolation::Bilinear, Interpolation::Bicubic, Interpolation::Lanczos3]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Interpolation::Nearest => "Nearest",
            Interpolation::Bilinear => "Bilinear",
            Interpolation::Bicubic => "Bicubic",
            Interpolation::Lanczos3 => "Lanczos3",
        }
    }

    pub fn to_filter(&self) -> imageops::FilterType {
        match self {
            Interpolation::Nearest => imageops::FilterType::Nearest,
            Interpolation::Bilinear => imageops::FilterType::Triangle,
            Interpolation::Bicubic => imageops::FilterType::CatmullRom,
            Interpolation::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    Cw90,
    Ccw90,
    Half,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlipAxis {
    Horizontal,
    Vertical,
}

/// Redraw `layer` into a fresh `w`×`h` buffer at `(dx, dy)` and reset its
/// offset.  Pixel edits turn text layers into raster layers.
fn redraw_layer(layer: &mut Layer, w: u32, h: u32, dx: i32, dy: i32) {
    let mut out = RgbaImage::new(w, h);
    draw_image(&mut out, &layer.pixels, dx, dy, 1.0, BlendMode::Normal);
    layer.pixels = out;
    layer.x = 0;
    layer.y = 0;
    layer.rasterize();
}

// ---------------------------------------------------------------------------
//  Whole-document transforms (affect ALL layers)
// ---------------------------------------------------------------------------

/// Crop the document to `rect` (document space).  Every layer becomes
/// rect-sized with its content shifted by the crop origin.
pub fn crop_document(doc: &mut Document, selection: &mut SelectionMask, rect: Rect) -> bool {
    if rect.w < 1 || rect.h < 1 {
        return false;
    }
    let (w, h) = clamp_size(rect.w, rect.h);
    doc.layers.par_iter_mut().for_each(|l| {
        let (dx, dy) = (l.x - rect.x, l.y - rect.y);
        redraw_layer(l, w, h, dx, dy);
    });
    doc.width = w;
    doc.height = h;
    selection.reset(w, h);
    log_info!("crop: {}x{} at ({}, {})", w, h, rect.x, rect.y);
    true
}

/// Scale the whole document.  Layer sizes and offsets scale with it.
pub fn resize_document(doc: &mut Document, selection: &mut SelectionMask, width: u32, height: u32, interp: Interpolation) {
    let (w, h) = clamp_size(width, height);
    let sx = w as f64 / doc.width as f64;
    let sy = h as f64 / doc.height as f64;
    let filter = interp.to_filter();
    doc.layers.par_iter_mut().for_each(|l| {
        let lw = ((l.width() as f64 * sx).round() as u32).max(1);
        let lh = ((l.height() as f64 * sy).round() as u32).max(1);
        l.pixels = imageops::resize(&l.pixels, lw, lh, filter);
        l.x = (l.x as f64 * sx).round() as i32;
        l.y = (l.y as f64 * sy).round() as i32;
        l.rasterize();
    });
    doc.width = w;
    doc.height = h;
    selection.reset(w, h);
    log_info!("resize: {}x{} ({})", w, h, interp.name());
}

/// Change the document size without scaling.  `anchor_x`/`anchor_y` in
/// 0.0–1.0 choose where the old content sits (0 = left/top, 1 = right/bottom).
pub fn canvas_resize(doc: &mut Document, selection: &mut SelectionMask, width: u32, height: u32, anchor_x: f32, anchor_y: f32) {
    let (w, h) = clamp_size(width, height);
    let dx = ((w as f32 - doc.width as f32) * anchor_x.clamp(0.0, 1.0)).round() as i32;
    let dy = ((h as f32 - doc.height as f32) * anchor_y.clamp(0.0, 1.0)).round() as i32;
    doc.layers.par_iter_mut().for_each(|l| {
        let (lx, ly) = (l.x + dx, l.y + dy);
        redraw_layer(l, w, h, lx, ly);
    });
    doc.width = w;
    doc.height = h;
    selection.reset(w, h);
    log_info!("canvas resize: {}x{}", w, h);
}

/// Rotate the document.  Each layer keeps its own size and moves to where
/// its rectangle lands in the rotated document.
pub fn rotate_document(doc: &mut Document, selection: &mut SelectionMask, rotation: Rotation) {
    let (dw, dh) = (doc.width as i32, doc.height as i32);
    doc.layers.par_iter_mut().for_each(|l| {
        let (lx, ly, lw, lh) = (l.x, l.y, l.width() as i32, l.height() as i32);
        match rotation {
            Rotation::Cw90 => {
                l.pixels = imageops::rotate90(&l.pixels);
                l.x = dh - (ly + lh);
                l.y = lx;
            }
            Rotation::Ccw90 => {
                l.pixels = imageops::rotate270(&l.pixels);
                l.x = ly;
                l.y = dw - (lx + lw);
            }
            Rotation::Half => {
                imageops::rotate180_in_place(&mut l.pixels);
                l.x = dw - (lx + lw);
                l.y = dh - (ly + lh);
            }
        }
        l.rasterize();
    });
    if rotation != Rotation::Half {
        std::mem::swap(&mut doc.width, &mut doc.height);
    }
    selection.reset(doc.width, doc.height);
    log_info!("rotate: {:?}", rotation);
}

/// Mirror the document.  Layer offsets are mirrored along with the pixels.
pub fn flip_document(doc: &mut Document, axis: FlipAxis) {
    let (dw, dh) = (doc.width as i32, doc.height as i32);
    doc.layers.par_iter_mut().for_each(|l| {
        match axis {
            FlipAxis::Horizontal => {
                imageops::flip_horizontal_in_place(&mut l.pixels);
                l.x = dw - (l.x + l.width() as i32);
            }
            FlipAxis::Vertical => {
                imageops::flip_vertical_in_place(&mut l.pixels);
                l.y = dh - (l.y + l.height() as i32);
            }
        }
        l.rasterize();
    });
    log_info!("flip: {:?}", axis);
}

/// Fill the active layer with `color` through the selection, or entirely
/// when nothing is selected.  Locked layers are refused.
pub fn fill_selection(doc: &mut Document, selection: &SelectionMask, color: Rgba<u8>) -> bool {
    let Some(layer) = doc.active_layer_mut() else { return false };
    if layer.locked {
        log_warn!("fill: layer '{}' is locked", layer.name);
        return false;
    }
    layer.rasterize();
    let Some(bbox) = selection.bounding_box() else {
        let area = RgbaImage::from_pixel(layer.width(), layer.height(), color);
        draw_image(&mut layer.pixels, &area, 0, 0, 1.0, BlendMode::Normal);
        return true;
    };
    let patch = masked_patch(selection, bbox, |_, _| color);
    draw_image(&mut layer.pixels, &patch, bbox.x - layer.x, bbox.y - layer.y, 1.0, BlendMode::Normal);
    true
}

/// `bbox`-sized image whose pixels come from `sample(doc_x, doc_y)` with
/// alpha scaled by the selection coverage.
fn masked_patch<F>(selection: &SelectionMask, bbox: Rect, sample: F) -> RgbaImage
where
    F: Fn(i32, i32) -> Rgba<u8>,
{
    RgbaImage::from_fn(bbox.w, bbox.h, |x, y| {
        let (dx, dy) = (bbox.x + x as i32, bbox.y + y as i32);
        let mut p = sample(dx, dy);
        let m = selection.value(dx, dy) as u32;
        p[3] = ((p[3] as u32 * m + 127) / 255) as u8;
        p
    })
}

// ---------------------------------------------------------------------------
//  Internal clipboard
// ---------------------------------------------------------------------------

/// Pixels lifted from a layer, with the document position they came from.
#[derive(Clone, Debug)]
pub struct Clipboard {
    pub pixels: RgbaImage,
    pub x: i32,
    pub y: i32,
}

/// Copy the selected part of the active layer (the whole layer when
/// nothing is selected).
pub fn copy_selection(doc: &Document, selection: &SelectionMask) -> Option<Clipboard> {
    let layer = doc.active_layer()?;
    let Some(bbox) = selection.bounding_box() else {
        return Some(Clipboard { pixels: layer.pixels.clone(), x: layer.x, y: layer.y });
    };
    let pixels = masked_patch(selection, bbox, |x, y| layer.pixel_at_doc(x, y).unwrap_or(Rgba([0, 0, 0, 0])));
    Some(Clipboard { pixels, x: bbox.x, y: bbox.y })
}

/// Erase the selected part of the active layer (the whole layer when
/// nothing is selected).  Locked layers are refused.
pub fn erase_selection(doc: &mut Document, selection: &SelectionMask) -> bool {
    let Some(layer) = doc.active_layer_mut() else { return false };
    if layer.locked {
        log_warn!("erase: layer '{}' is locked", layer.name);
        return false;
    }
    layer.rasterize();
    if selection.is_empty() {
        layer.clear();
    } else {
        let (x, y) = (layer.x, layer.y);
        erase_image(&mut layer.pixels, selection.as_alpha_surface(), -x, -y);
    }
    true
}

/// Copy, then erase what was copied.
pub fn cut_selection(doc: &mut Document, selection: &SelectionMask) -> Option<Clipboard> {
    let clip = copy_selection(doc, selection)?;
    erase_selection(doc, selection);
    Some(clip)
}

/// Insert the clipboard as a new layer above the active one, at the
/// position it was copied from.
pub fn paste_as_layer(doc: &mut Document, clip: &Clipboard) -> usize {
    let mut layer = Layer::from_pixels("Pasted Layer", clip.pixels.clone());
    layer.x = clip.x;
    layer.y = clip.y;
    layer.kind = LayerKind::Raster;
    doc.insert_layer(layer)
}
