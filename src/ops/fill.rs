// ============================================================================
// FILL OPERATIONS — paint bucket and linear / radial gradients
// ============================================================================

use image::Rgba;
use rayon::prelude::*;

use crate::canvas::{BlendMode, Layer};
use crate::compositor::blend_pixel;
use crate::geometry::{DocPoint, LayerPoint, Rect, doc_point_to_layer, layer_cell_in_bounds, layer_to_doc};
use crate::ops::raster;
use crate::selection::{SelectionMask, color_distance};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GradientKind {
    #[default]
    Linear,
    Radial,
}

impl GradientKind {
    pub fn all() -> &'static [GradientKind] {
        &[GradientKind::Linear, GradientKind::Radial]
    }

    pub fn name(&self) -> &'static str {
        match self {
            GradientKind::Linear => "Linear",
            GradientKind::Radial => "Radial",
        }
    }
}

/// Paint-bucket fill in `layer`'s own pixel space.
///
/// The seed is the document point rounded to the nearest cell.  Cells join
/// the region when their RGBA difference from the seed colour is at most
/// `tolerance * 4` and, with an active selection, their document cell is
/// selected.  Returns the filled area in document space, or `None` when the
/// click misses the layer or the seed already holds the opaque fill colour.
pub fn bucket_fill(
    layer: &mut Layer,
    selection: &SelectionMask,
    at: DocPoint,
    color: Rgba<u8>,
    tolerance: i32,
) -> Option<Rect> {
    let (lx, ly) = layer_cell_in_bounds(layer, doc_point_to_layer(layer, at))?;
    let (w, h) = layer.pixels.dimensions();
    let fill = Rgba([color[0], color[1], color[2], 255]);
    let target = *layer.pixels.get_pixel(lx, ly);
    if target == fill {
        return None;
    }

    let limit = tolerance.clamp(0, 255) * 4;
    let restricted = !selection.is_empty();
    let placed: &Layer = layer;
    let raw = placed.pixels.as_raw();
    let mut region = vec![0u8; (w * h) as usize];
    let bbox = raster::flood_fill(w, h, lx as i32, ly as i32, &mut region, |idx| {
        let o = idx * 4;
        let p = Rgba([raw[o], raw[o + 1], raw[o + 2], raw[o + 3]]);
        if color_distance(p, target) > limit {
            return false;
        }
        if restricted {
            let local = LayerPoint::new((idx % w as usize) as i32, (idx / w as usize) as i32);
            let (cx, cy) = layer_to_doc(placed, local);
            return selection.value(cx, cy) > 0;
        }
        true
    })?;

    for (px, &m) in layer.pixels.pixels_mut().zip(&region) {
        if m != 0 {
            *px = fill;
        }
    }
    let (x, y) = layer_to_doc(layer, LayerPoint::new(bbox.x, bbox.y));
    Some(Rect::new(x, y, bbox.w, bbox.h))
}

/// Gradient from `fg` at `start` to `bg` at `end`, composited source-over
/// onto `layer`.  Only document cells are painted, each weighted by its
/// selection coverage when a selection exists.  A zero-length gradient
/// paints nothing and returns `false`.
pub fn gradient_fill(
    layer: &mut Layer,
    selection: &SelectionMask,
    start: DocPoint,
    end: DocPoint,
    fg: Rgba<u8>,
    bg: Rgba<u8>,
    kind: GradientKind,
) -> bool {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f32::EPSILON {
        return false;
    }
    let radius = len_sq.sqrt();

    let (doc_w, doc_h) = (selection.width() as i32, selection.height() as i32);
    let restricted = !selection.is_empty();
    let mask = selection.data();
    let (ox, oy) = (layer.x, layer.y);
    let lw = layer.width() as usize;

    let lerp = |t: f32| {
        let c = |i: usize| (fg[i] as f32 + (bg[i] as f32 - fg[i] as f32) * t).round() as u8;
        Rgba([c(0), c(1), c(2), c(3)])
    };

    let buf: &mut [u8] = &mut layer.pixels;
    buf.par_chunks_mut(lw * 4).enumerate().for_each(|(ly, row)| {
        let y = ly as i32 + oy;
        if y < 0 || y >= doc_h {
            return;
        }
        for lx in 0..lw {
            let x = lx as i32 + ox;
            if x < 0 || x >= doc_w {
                continue;
            }
            let coverage = if restricted { mask[(y * doc_w + x) as usize] } else { 255 };
            if coverage == 0 {
                continue;
            }
            let px = x as f32 + 0.5 - start.x;
            let py = y as f32 + 0.5 - start.y;
            let t = match kind {
                GradientKind::Linear => (px * dx + py * dy) / len_sq,
                GradientKind::Radial => (px * px + py * py).sqrt() / radius,
            }
            .clamp(0.0, 1.0);

            let mut top = lerp(t);
            top[3] = ((top[3] as u32 * coverage as u32 + 127) / 255) as u8;
            let o = lx * 4;
            let base = Rgba([row[o], row[o + 1], row[o + 2], row[o + 3]]);
            let out = blend_pixel(base, top, BlendMode::Normal, 1.0);
            row[o..o + 4].copy_from_slice(&out.0);
        }
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::SelectionMode;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    #[test]
    fn bucket_stops_at_colour_edge() {
        let mut layer = Layer::filled("L", 10, 10, Rgba([255, 255, 255, 255]));
        for y in 0..10 {
            layer.pixels.put_pixel(5, y, Rgba([0, 0, 0, 255]));
        }
        let sel = SelectionMask::new(10, 10);
        let filled = bucket_fill(&mut layer, &sel, DocPoint::new(1.0, 1.0), RED, 32).unwrap();
        assert_eq!(filled, Rect::new(0, 0, 5, 10));
        assert_eq!(*layer.pixels.get_pixel(8, 8), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn bucket_respects_selection_and_offset() {
        let mut layer = Layer::filled("L", 10, 10, Rgba([255, 255, 255, 255]));
        layer.x = 5;
        let mut sel = SelectionMask::new(20, 10);
        sel.set_from_rectangle(0.0, 0.0, 8.0, 10.0, SelectionMode::Replace);
        let filled = bucket_fill(&mut layer, &sel, DocPoint::new(6.0, 2.0), RED, 0).unwrap();
        assert_eq!(filled, Rect::new(5, 0, 3, 10));
        assert_eq!(*layer.pixels.get_pixel(2, 0), RED);
        assert_eq!(*layer.pixels.get_pixel(3, 0), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn bucket_outside_layer_is_noop() {
        let mut layer = Layer::new("L", 4, 4);
        let sel = SelectionMask::new(10, 10);
        assert!(bucket_fill(&mut layer, &sel, DocPoint::new(8.0, 8.0), RED, 32).is_none());
    }

    #[test]
    fn linear_gradient_runs_fg_to_bg() {
        let mut layer = Layer::new("L", 100, 1);
        let sel = SelectionMask::new(100, 1);
        let white = Rgba([255, 255, 255, 255]);
        assert!(gradient_fill(
            &mut layer,
            &sel,
            DocPoint::new(0.0, 0.0),
            DocPoint::new(100.0, 0.0),
            Rgba([0, 0, 0, 255]),
            white,
            GradientKind::Linear,
        ));
        assert!(layer.pixels.get_pixel(0, 0)[0] < 5);
        assert!(layer.pixels.get_pixel(99, 0)[0] > 250);
        assert!(layer.pixels.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn gradient_is_clipped_to_selection() {
        let mut layer = Layer::new("L", 10, 10);
        let mut sel = SelectionMask::new(10, 10);
        sel.set_from_rectangle(0.0, 0.0, 5.0, 10.0, SelectionMode::Replace);
        gradient_fill(
            &mut layer,
            &sel,
            DocPoint::new(0.0, 0.0),
            DocPoint::new(10.0, 10.0),
            RED,
            RED,
            GradientKind::Radial,
        );
        assert_eq!(*layer.pixels.get_pixel(4, 4), RED);
        assert_eq!(layer.pixels.get_pixel(5, 4)[3], 0);
    }
}
