// ============================================================================
// FREE TRANSFORM — lift, box geometry and inverse-mapped rendering
// ============================================================================
//
// A transform lifts the selected pixels (or the whole layer) into a floating
// image, moves/scales/rotates a box around it, and renders the float back
// into the layer by inverse-mapping every destination pixel into the float
// with bilinear sampling.
// ============================================================================

use std::f32::consts::FRAC_PI_2;

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::canvas::{BlendMode, Layer};
use crate::compositor::blend_pixel;
use crate::geometry::{DocPoint, LayerPoint, Rect, layer_to_doc};
use crate::selection::SelectionMask;

/// Handle hit radius, in screen pixels.
pub const HANDLE_HIT_PX: f32 = 8.0;
/// Distance of the rotation handle above the box's top edge, in screen pixels.
pub const ROTATE_STEM_PX: f32 = 22.0;
/// Smallest box edge while scaling, in screen pixels.
const MIN_EDGE_PX: f32 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlePos {
    TopLeft,
    Top,
    TopRight,
    Left,
    Right,
    BottomLeft,
    Bottom,
    BottomRight,
}

impl HandlePos {
    pub fn all() -> &'static [HandlePos] {
        &[
            HandlePos::TopLeft,
            HandlePos::Top,
            HandlePos::TopRight,
            HandlePos::Left,
            HandlePos::Right,
            HandlePos::BottomLeft,
            HandlePos::Bottom,
            HandlePos::BottomRight,
        ]
    }

    /// Unit position in box space: -1, 0 or 1 on each axis.
    fn signs(&self) -> (f32, f32) {
        match self {
            HandlePos::TopLeft => (-1.0, -1.0),
            HandlePos::Top => (0.0, -1.0),
            HandlePos::TopRight => (1.0, -1.0),
            HandlePos::Left => (-1.0, 0.0),
            HandlePos::Right => (1.0, 0.0),
            HandlePos::BottomLeft => (-1.0, 1.0),
            HandlePos::Bottom => (0.0, 1.0),
            HandlePos::BottomRight => (1.0, 1.0),
        }
    }

    pub fn is_corner(&self) -> bool {
        let (sx, sy) = self.signs();
        sx != 0.0 && sy != 0.0
    }
}

/// What a pointer press on the transform box grabs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformHandle {
    Move,
    Rotate,
    Scale(HandlePos),
}

/// Oriented box the float is drawn into.  `angle` is in radians, clockwise
/// in document space (y down).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformBox {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub angle: f32,
    pub orig_w: f32,
    pub orig_h: f32,
}

impl TransformBox {
    pub fn from_rect(r: Rect) -> Self {
        let (w, h) = (r.w as f32, r.h as f32);
        Self { cx: r.x as f32 + w / 2.0, cy: r.y as f32 + h / 2.0, w, h, angle: 0.0, orig_w: w, orig_h: h }
    }

    /// True when the box still sits exactly on `r` unrotated.
    pub fn is_untouched(&self, r: Rect) -> bool {
        *self == Self::from_rect(r)
    }

    /// Box-space offset from the centre → document point.
    pub fn to_doc(&self, lx: f32, ly: f32) -> DocPoint {
        let (sin, cos) = self.angle.sin_cos();
        DocPoint::new(self.cx + lx * cos - ly * sin, self.cy + lx * sin + ly * cos)
    }

    /// Document point → box-space offset from the centre.
    pub fn to_local(&self, p: DocPoint) -> (f32, f32) {
        let (sin, cos) = self.angle.sin_cos();
        let (dx, dy) = (p.x - self.cx, p.y - self.cy);
        (dx * cos + dy * sin, -dx * sin + dy * cos)
    }

    /// Corners clockwise from top-left.
    pub fn corners(&self) -> [DocPoint; 4] {
        let (hw, hh) = (self.w / 2.0, self.h / 2.0);
        [self.to_doc(-hw, -hh), self.to_doc(hw, -hh), self.to_doc(hw, hh), self.to_doc(-hw, hh)]
    }

    pub fn handle_point(&self, handle: HandlePos) -> DocPoint {
        let (sx, sy) = handle.signs();
        self.to_doc(sx * self.w / 2.0, sy * self.h / 2.0)
    }

    pub fn rotation_handle(&self, zoom: f32) -> DocPoint {
        self.to_doc(0.0, -self.h / 2.0 - ROTATE_STEM_PX / zoom)
    }

    /// Handle under `p`: the rotation knob first, then the eight scale
    /// handles, then the box interior as a move.
    pub fn hit_test(&self, p: DocPoint, zoom: f32) -> Option<TransformHandle> {
        let radius = HANDLE_HIT_PX / zoom;
        if p.distance(self.rotation_handle(zoom)) <= radius {
            return Some(TransformHandle::Rotate);
        }
        let nearest = HandlePos::all()
            .iter()
            .map(|h| (*h, p.distance(self.handle_point(*h))))
            .filter(|(_, d)| *d <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((h, _)) = nearest {
            return Some(TransformHandle::Scale(h));
        }
        let (lx, ly) = self.to_local(p);
        (lx.abs() <= self.w / 2.0 && ly.abs() <= self.h / 2.0).then_some(TransformHandle::Move)
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.cx += dx;
        self.cy += dy;
    }

    /// Point the top edge at `p`.
    pub fn rotate_to(&mut self, p: DocPoint) {
        self.angle = (p.y - self.cy).atan2(p.x - self.cx) + FRAC_PI_2;
    }

    /// Drag `handle` to `p`, keeping the opposite handle fixed.  Edge handles
    /// only change one axis; `keep_aspect` holds the original ratio on
    /// corners.  The box never flips.
    pub fn drag_handle(&mut self, handle: HandlePos, p: DocPoint, keep_aspect: bool, zoom: f32) {
        let min = MIN_EDGE_PX / zoom;
        let (sx, sy) = handle.signs();
        let (ax, ay) = (-sx * self.w / 2.0, -sy * self.h / 2.0);
        let (px, py) = self.to_local(p);

        let mut w = if sx != 0.0 { ((px - ax) * sx).max(min) } else { self.w };
        let mut h = if sy != 0.0 { ((py - ay) * sy).max(min) } else { self.h };
        if keep_aspect && handle.is_corner() && self.orig_w > 0.0 && self.orig_h > 0.0 {
            let k = (w / self.orig_w).max(h / self.orig_h);
            w = (self.orig_w * k).max(min);
            h = (self.orig_h * k).max(min);
        }

        let lcx = if sx != 0.0 { ax + sx * w / 2.0 } else { 0.0 };
        let lcy = if sy != 0.0 { ay + sy * h / 2.0 } else { 0.0 };
        let centre = self.to_doc(lcx, lcy);
        self.cx = centre.x;
        self.cy = centre.y;
        self.w = w;
        self.h = h;
    }

    pub fn drag(&mut self, handle: TransformHandle, from: DocPoint, to: DocPoint, keep_aspect: bool, zoom: f32) {
        match handle {
            TransformHandle::Move => self.translate(to.x - from.x, to.y - from.y),
            TransformHandle::Rotate => self.rotate_to(to),
            TransformHandle::Scale(h) => self.drag_handle(h, to, keep_aspect, zoom),
        }
    }

    /// Axis-aligned document bounds, rounded outwards.
    pub fn bounds(&self) -> Rect {
        let c = self.corners();
        let x0 = c.iter().map(|p| p.x).fold(f32::MAX, f32::min).floor() as i32;
        let y0 = c.iter().map(|p| p.y).fold(f32::MAX, f32::min).floor() as i32;
        let x1 = c.iter().map(|p| p.x).fold(f32::MIN, f32::max).ceil() as i32;
        let y1 = c.iter().map(|p| p.y).fold(f32::MIN, f32::max).ceil() as i32;
        Rect::from_corners(x0, y0, x1, y1)
    }
}

// ============================================================================
// LIFT / RENDER
// ============================================================================

/// Pixels taken out of a layer for transforming.
#[derive(Clone, Debug)]
pub struct Lifted {
    /// The floating pixels, sized to `rect`.
    pub float: RgbaImage,
    /// Layer buffer with the floating pixels removed.
    pub cut: RgbaImage,
    /// Document rectangle the float came from.
    pub rect: Rect,
}

/// Lift the selected part of `layer` (all of it with no selection).
/// Partial coverage splits a pixel's alpha between the float and the cut.
pub fn lift(layer: &Layer, selection: &SelectionMask) -> Option<Lifted> {
    let rect = match selection.bounding_box() {
        Some(b) => b.intersect(&layer.bounds())?,
        None => layer.bounds(),
    };
    let local = rect.to_layer(layer);
    let mut float = RgbaImage::new(rect.w, rect.h);
    let mut cut = layer.pixels.clone();
    for fy in 0..rect.h {
        for fx in 0..rect.w {
            let (lx, ly) = ((local.x as u32) + fx, (local.y as u32) + fy);
            let cov = if selection.is_empty() {
                255
            } else {
                let (dx, dy) = layer_to_doc(layer, LayerPoint::new(lx as i32, ly as i32));
                selection.value(dx, dy)
            };
            if cov == 0 {
                continue;
            }
            let p = *layer.pixels.get_pixel(lx, ly);
            let taken = (p[3] as u32 * cov as u32 / 255) as u8;
            float.put_pixel(fx, fy, Rgba([p[0], p[1], p[2], taken]));
            cut.put_pixel(lx, ly, Rgba([p[0], p[1], p[2], p[3] - taken]));
        }
    }
    Some(Lifted { float, cut, rect })
}

/// Draw `float` into `target` (a layer buffer whose top-left sits at
/// document `origin`) through the box.  Pixels landing outside the buffer
/// are dropped.
pub fn render(target: &mut RgbaImage, origin: (i32, i32), float: &RgbaImage, bx: &TransformBox) {
    let (tw, th) = target.dimensions();
    let Some(area) = bx.bounds().intersect(&Rect::new(origin.0, origin.1, tw, th)) else {
        return;
    };
    if bx.w <= 0.0 || bx.h <= 0.0 {
        return;
    }
    let (sx, sy) = (bx.orig_w / bx.w, bx.orig_h / bx.h);
    let (hw, hh) = (bx.w / 2.0, bx.h / 2.0);
    let stride = tw as usize * 4;
    let raw: &mut [u8] = target;
    raw.par_chunks_mut(stride).enumerate().for_each(|(ty, row)| {
        let doc_y = origin.1 + ty as i32;
        if doc_y < area.y || doc_y >= area.bottom() {
            return;
        }
        for doc_x in area.x..area.right() {
            let (lx, ly) = bx.to_local(DocPoint::new(doc_x as f32 + 0.5, doc_y as f32 + 0.5));
            if lx.abs() > hw || ly.abs() > hh {
                continue;
            }
            let src = bilinear_sample(float, (lx + hw) * sx - 0.5, (ly + hh) * sy - 0.5);
            if src[3] == 0 {
                continue;
            }
            let pi = (doc_x - origin.0) as usize * 4;
            let base = Rgba([row[pi], row[pi + 1], row[pi + 2], row[pi + 3]]);
            let out = blend_pixel(base, src, BlendMode::Normal, 1.0);
            row[pi..pi + 4].copy_from_slice(&out.0);
        }
    });
}

/// Bilinear sample, transparent outside the image.
fn bilinear_sample(img: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let sample = |sx: i32, sy: i32| -> [f32; 4] {
        if sx < 0 || sy < 0 || sx >= img.width() as i32 || sy >= img.height() as i32 {
            [0.0; 4]
        } else {
            let p = img.get_pixel(sx as u32, sy as u32);
            [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
        }
    };

    let tl = sample(x0, y0);
    let tr = sample(x0 + 1, y0);
    let bl = sample(x0, y0 + 1);
    let br = sample(x0 + 1, y0 + 1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = lerp(tl[c], tr[c], fx);
        let bot = lerp(bl[c], br[c], fx);
        out[c] = lerp(top, bot, fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::SelectionMode;

    fn pt(x: f32, y: f32) -> DocPoint {
        DocPoint::new(x, y)
    }

    #[test]
    fn hit_test_finds_handles_and_interior() {
        let bx = TransformBox::from_rect(Rect::new(10, 10, 40, 30));
        assert_eq!(bx.hit_test(pt(10.5, 10.5), 1.0), Some(TransformHandle::Scale(HandlePos::TopLeft)));
        assert_eq!(bx.hit_test(pt(49.0, 25.0), 1.0), Some(TransformHandle::Scale(HandlePos::Right)));
        assert_eq!(bx.hit_test(pt(30.0, 10.0 - 22.0), 1.0), Some(TransformHandle::Rotate));
        assert_eq!(bx.hit_test(pt(30.0, 25.0), 1.0), Some(TransformHandle::Move));
        assert_eq!(bx.hit_test(pt(90.0, 90.0), 1.0), None);
        // Handles shrink in document space as the view zooms in.
        assert_eq!(bx.hit_test(pt(14.0, 25.0), 1.0), Some(TransformHandle::Scale(HandlePos::Left)));
        assert_eq!(bx.hit_test(pt(14.0, 25.0), 4.0), Some(TransformHandle::Move));
    }

    #[test]
    fn corner_drag_keeps_opposite_corner() {
        let mut bx = TransformBox::from_rect(Rect::new(0, 0, 10, 10));
        bx.drag_handle(HandlePos::BottomRight, pt(20.0, 30.0), false, 1.0);
        assert_eq!((bx.w, bx.h), (20.0, 30.0));
        assert_eq!(bx.corners()[0], pt(0.0, 0.0));
    }

    #[test]
    fn edge_drag_locks_other_axis_and_shift_keeps_aspect() {
        let mut bx = TransformBox::from_rect(Rect::new(0, 0, 10, 20));
        bx.drag_handle(HandlePos::Right, pt(30.0, 99.0), false, 1.0);
        assert_eq!((bx.w, bx.h), (30.0, 20.0));

        let mut bx = TransformBox::from_rect(Rect::new(0, 0, 10, 20));
        bx.drag_handle(HandlePos::BottomRight, pt(20.0, 25.0), true, 1.0);
        assert_eq!((bx.w, bx.h), (20.0, 40.0));
    }

    #[test]
    fn scaling_never_flips() {
        let mut bx = TransformBox::from_rect(Rect::new(0, 0, 10, 10));
        bx.drag_handle(HandlePos::Right, pt(-50.0, 5.0), false, 1.0);
        assert_eq!(bx.w, MIN_EDGE_PX);
        assert!(bx.corners()[0].x.abs() < 1e-4);
    }

    #[test]
    fn rotate_handle_tracks_pointer() {
        let mut bx = TransformBox::from_rect(Rect::new(0, 0, 10, 10));
        bx.rotate_to(pt(5.0, -20.0));
        assert!(bx.angle.abs() < 1e-5);
        bx.rotate_to(pt(30.0, 5.0));
        assert!((bx.angle - FRAC_PI_2).abs() < 1e-5);
    }

    #[test]
    fn lift_splits_selection_out_of_layer() {
        let layer = Layer::filled("L", 10, 10, Rgba([9, 9, 9, 255]));
        let mut sel = SelectionMask::new(10, 10);
        sel.set_from_rectangle(2.0, 2.0, 5.0, 4.0, SelectionMode::Replace);
        let lifted = lift(&layer, &sel).unwrap();
        assert_eq!(lifted.rect, Rect::new(2, 2, 3, 2));
        assert_eq!(lifted.float.dimensions(), (3, 2));
        assert_eq!(lifted.cut.get_pixel(3, 3)[3], 0);
        assert_eq!(lifted.cut.get_pixel(6, 3)[3], 255);
    }

    #[test]
    fn untouched_box_renders_back_exactly() {
        let mut layer = Layer::new("L", 8, 8);
        layer.pixels.put_pixel(3, 4, Rgba([200, 10, 10, 255]));
        layer.pixels.put_pixel(4, 4, Rgba([10, 200, 10, 128]));
        let lifted = lift(&layer, &SelectionMask::new(8, 8)).unwrap();
        let bx = TransformBox::from_rect(lifted.rect);
        let mut out = lifted.cut.clone();
        render(&mut out, (0, 0), &lifted.float, &bx);
        assert_eq!(out, layer.pixels);
    }

    #[test]
    fn moved_box_shifts_pixels_by_whole_cells() {
        let mut layer = Layer::new("L", 8, 8);
        layer.pixels.put_pixel(1, 1, Rgba([50, 60, 70, 255]));
        let lifted = lift(&layer, &SelectionMask::new(8, 8)).unwrap();
        let mut bx = TransformBox::from_rect(lifted.rect);
        bx.translate(3.0, 2.0);
        let mut out = lifted.cut.clone();
        render(&mut out, (0, 0), &lifted.float, &bx);
        assert_eq!(*out.get_pixel(4, 3), Rgba([50, 60, 70, 255]));
        assert_eq!(out.get_pixel(1, 1)[3], 0);
    }
}
