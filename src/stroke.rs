// ============================================================================
// STROKE BUFFER — document-space dab accumulator with pre-stroke snapshot
// ============================================================================
//
// Freehand tools never paint straight into a layer.  A stroke stamps dabs
// into a document-sized accumulator; every flush restores the target layer
// from the snapshot taken at `begin` and re-applies the (mask-clipped)
// accumulator, so pixels outside the selection are never touched and
// flushing twice without new dabs is a no-op.

use image::{Rgba, RgbaImage};
use uuid::Uuid;

use crate::canvas::{BlendMode, Layer};
use crate::compositor::{draw_image, erase_image};
use crate::geometry::{DocPoint, Rect};
use crate::log_warn;
use crate::selection::SelectionMask;

/// Hardness at or above this value stamps a hard-edged disc.
const HARD_EDGE_THRESHOLD: f32 = 99.0;

/// Per-stroke brush parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrushParams {
    /// Diameter in document pixels.
    pub size: f32,
    /// 0–100
    pub opacity: f32,
    /// 0–100
    pub hardness: f32,
    /// Dab spacing as a fraction of the diameter.
    pub spacing: f32,
    /// 0.0–1.0, multiplies opacity.
    pub flow: f32,
    pub color: Rgba<u8>,
}

impl Default for BrushParams {
    fn default() -> Self {
        Self {
            size: 20.0,
            opacity: 100.0,
            hardness: 80.0,
            spacing: 0.2,
            flow: 1.0,
            color: Rgba([0, 0, 0, 255]),
        }
    }
}

impl BrushParams {
    /// Pressure scales the diameter; the result never drops below one pixel.
    pub fn with_pressure(mut self, pressure: f32) -> Self {
        let p = if pressure > 0.0 { pressure } else { 1.0 };
        self.size = (self.size * p).max(1.0);
        self
    }

    fn radius(&self) -> f32 {
        self.size.max(1.0) / 2.0
    }

    /// Peak dab alpha as a fraction (opacity × flow).
    fn peak(&self) -> f32 {
        (self.opacity.clamp(0.0, 100.0) / 100.0) * self.flow.clamp(0.0, 1.0)
    }

    /// Coverage 0.0–1.0 at distance `d` from the dab centre.
    fn falloff(&self, d: f32) -> f32 {
        let r = self.radius();
        if d > r {
            return 0.0;
        }
        if self.hardness >= HARD_EDGE_THRESHOLD {
            return 1.0;
        }
        let h = self.hardness.clamp(0.0, 100.0) / 100.0;
        let inner = r * h;
        if d <= inner {
            return 1.0;
        }
        let t = (d - inner) / (r - inner);
        let p = 1.0 + 2.0 * (1.0 - h);
        (1.0 - t).max(0.0).powf(p)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StrokeState {
    Idle,
    Active { layer: Uuid },
}

pub struct StrokeBuffer {
    width: u32,
    height: u32,
    state: StrokeState,
    accumulator: RgbaImage,
    snapshot: RgbaImage,
    scratch: RgbaImage,
    dirty: Option<Rect>,
}

impl StrokeBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            state: StrokeState::Idle,
            accumulator: RgbaImage::new(width, height),
            snapshot: RgbaImage::new(1, 1),
            scratch: RgbaImage::new(1, 1),
            dirty: None,
        }
    }

    /// Reallocate for a new document size.  Any stroke in flight is dropped.
    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) != (self.width, self.height) {
            *self = Self::new(width, height);
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, StrokeState::Active { .. })
    }

    pub fn dirty_rect(&self) -> Option<Rect> {
        self.dirty
    }

    /// Accumulated stroke in document space (RGB = colour, A = coverage).
    pub fn accumulator(&self) -> &RgbaImage {
        &self.accumulator
    }

    /// Snapshot `layer` and start a fresh stroke on it.
    pub fn begin(&mut self, layer: &Layer) {
        if let Some(d) = self.dirty.take() {
            clear_rect(&mut self.accumulator, d);
        }
        self.snapshot.clone_from(&layer.pixels);
        self.state = StrokeState::Active { layer: layer.id };
    }

    /// Stamp one dab centred on `center`.
    pub fn dab(&mut self, center: DocPoint, brush: &BrushParams) {
        let color = brush.color;
        self.stamp(center, brush, |_, _| Some(color));
    }

    /// Stamp evenly spaced dabs from `from` to `to`, both endpoints included.
    pub fn line(&mut self, from: DocPoint, to: DocPoint, brush: &BrushParams) {
        for p in line_points(from, to, brush) {
            self.dab(p, brush);
        }
    }

    /// Dab whose colour is sampled from `source` at `center - offset`.
    /// Used by the clone stamp; transparent source pixels contribute nothing.
    pub fn clone_dab(&mut self, center: DocPoint, brush: &BrushParams, source: &RgbaImage, offset: (f32, f32)) {
        let (ox, oy) = (offset.0.round() as i32, offset.1.round() as i32);
        self.stamp(center, brush, |x, y| {
            let sx = x - ox;
            let sy = y - oy;
            if sx < 0 || sy < 0 || sx as u32 >= source.width() || sy as u32 >= source.height() {
                return None;
            }
            let p = *source.get_pixel(sx as u32, sy as u32);
            (p[3] > 0).then_some(p)
        });
    }

    fn stamp<F>(&mut self, center: DocPoint, brush: &BrushParams, mut sample: F)
    where
        F: FnMut(i32, i32) -> Option<Rgba<u8>>,
    {
        if !self.is_active() {
            return;
        }
        let r = brush.radius();
        let peak = brush.peak();
        if peak <= 0.0 {
            return;
        }
        let x0 = (center.x - r).floor() as i32;
        let y0 = (center.y - r).floor() as i32;
        let x1 = (center.x + r).ceil() as i32;
        let y1 = (center.y + r).ceil() as i32;
        let Some(area) = Rect::from_corners(x0, y0, x1, y1).clamp_to(self.width, self.height) else {
            return;
        };

        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                let d = DocPoint::new(x as f32 + 0.5, y as f32 + 0.5).distance(center);
                let cover = brush.falloff(d);
                if cover <= 0.0 {
                    continue;
                }
                let Some(src) = sample(x, y) else { continue };
                let a = (cover * peak * (src[3] as f32 / 255.0) * 255.0).round().min(255.0) as u8;
                let px = self.accumulator.get_pixel_mut(x as u32, y as u32);
                // Max-alpha accumulation: overlapping dabs never exceed the nominal opacity.
                if a > px[3] {
                    *px = Rgba([src[0], src[1], src[2], a]);
                }
            }
        }
        self.dirty = Some(match self.dirty {
            Some(d) => d.union(&area),
            None => area,
        });
    }

    /// Restore `layer` from the snapshot and composite the clipped stroke into it.
    pub fn flush(&mut self, layer: &mut Layer, selection: &SelectionMask, erasing: bool) {
        let StrokeState::Active { layer: id } = self.state else { return };
        if layer.id != id || layer.pixels.dimensions() != self.snapshot.dimensions() {
            log_warn!("stroke flush: target layer changed mid-stroke, ignoring");
            return;
        }
        layer.pixels.copy_from_slice(self.snapshot.as_raw());

        let Some(dirty) = self.dirty else { return };
        if self.scratch.dimensions() != (dirty.w, dirty.h) {
            self.scratch = RgbaImage::new(dirty.w, dirty.h);
        }
        let clip = !selection.is_empty();
        for (sx, sy, out) in self.scratch.enumerate_pixels_mut() {
            let dx = dirty.x + sx as i32;
            let dy = dirty.y + sy as i32;
            let mut p = *self.accumulator.get_pixel(dx as u32, dy as u32);
            if clip {
                let m = selection.value(dx, dy) as u32;
                p[3] = ((p[3] as u32 * m + 127) / 255) as u8;
            }
            *out = p;
        }

        let ox = dirty.x - layer.x;
        let oy = dirty.y - layer.y;
        if erasing {
            erase_image(&mut layer.pixels, &self.scratch, ox, oy);
        } else {
            draw_image(&mut layer.pixels, &self.scratch, ox, oy, 1.0, BlendMode::Normal);
        }
    }

    /// Finish the stroke.  Returns the document-space area it touched.
    pub fn end(&mut self) -> Option<Rect> {
        if !self.is_active() {
            return None;
        }
        self.state = StrokeState::Idle;
        self.dirty
    }

    /// Abandon the stroke and put the snapshot back.
    pub fn cancel(&mut self, layer: &mut Layer) {
        if let StrokeState::Active { layer: id } = self.state {
            if layer.id == id && layer.pixels.dimensions() == self.snapshot.dimensions() {
                layer.pixels.copy_from_slice(self.snapshot.as_raw());
            }
        }
        self.state = StrokeState::Idle;
    }
}

/// Dab centres along a segment: `step = max(1, size*spacing)`, both ends included.
pub fn line_points(from: DocPoint, to: DocPoint, brush: &BrushParams) -> Vec<DocPoint> {
    let step = (brush.size * brush.spacing).max(1.0);
    let dist = from.distance(to);
    let steps = ((dist / step).ceil() as usize).max(1);
    (0..=steps)
        .map(|i| {
            let t = i as f32 / steps as f32;
            DocPoint::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t)
        })
        .collect()
}

fn clear_rect(img: &mut RgbaImage, r: Rect) {
    let Some(r) = r.clamp_to(img.width(), img.height()) else { return };
    for y in r.y..r.bottom() {
        for x in r.x..r.right() {
            img.put_pixel(x as u32, y as u32, Rgba([0, 0, 0, 0]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red_brush() -> BrushParams {
        BrushParams { size: 10.0, hardness: 100.0, color: Rgba([255, 0, 0, 255]), ..BrushParams::default() }
    }

    #[test]
    fn hard_dab_covers_disc_only() {
        let layer = Layer::new("L", 40, 40);
        let mut sb = StrokeBuffer::new(40, 40);
        sb.begin(&layer);
        sb.dab(DocPoint::new(20.0, 20.0), &red_brush());
        assert_eq!(sb.accumulator().get_pixel(20, 20)[3], 255);
        assert_eq!(sb.accumulator().get_pixel(14, 14)[3], 0);
        let d = sb.end().unwrap();
        assert!(d.contains(15, 20) && d.contains(24, 20));
    }

    #[test]
    fn overlapping_dabs_keep_nominal_opacity() {
        let layer = Layer::new("L", 40, 40);
        let mut sb = StrokeBuffer::new(40, 40);
        let brush = BrushParams { opacity: 40.0, ..red_brush() };
        sb.begin(&layer);
        sb.line(DocPoint::new(5.0, 20.0), DocPoint::new(35.0, 20.0), &brush);
        sb.line(DocPoint::new(35.0, 20.0), DocPoint::new(5.0, 20.0), &brush);
        let max = sb.accumulator().pixels().map(|p| p[3]).max().unwrap();
        assert_eq!(max, (0.4f32 * 255.0).round() as u8);
    }

    #[test]
    fn soft_dab_fades_towards_edge() {
        let brush = BrushParams { size: 20.0, hardness: 0.0, ..red_brush() };
        assert_eq!(brush.falloff(0.0), 1.0);
        assert!(brush.falloff(5.0) < 1.0 && brush.falloff(5.0) > brush.falloff(9.0));
        assert_eq!(brush.falloff(10.5), 0.0);
    }

    #[test]
    fn line_includes_both_endpoints() {
        let pts = line_points(DocPoint::new(0.0, 0.0), DocPoint::new(10.0, 0.0), &red_brush());
        assert_eq!(pts.first(), Some(&DocPoint::new(0.0, 0.0)));
        assert_eq!(pts.last(), Some(&DocPoint::new(10.0, 0.0)));
        assert_eq!(pts.len(), 6);
    }

    #[test]
    fn flush_is_idempotent_and_offset_aware() {
        let mut layer = Layer::new("L", 20, 20);
        layer.x = 10;
        layer.y = 10;
        let sel = SelectionMask::new(40, 40);
        let mut sb = StrokeBuffer::new(40, 40);
        sb.begin(&layer);
        sb.dab(DocPoint::new(15.0, 15.0), &red_brush());
        sb.flush(&mut layer, &sel, false);
        let first = layer.pixels.clone();
        sb.flush(&mut layer, &sel, false);
        assert_eq!(first, layer.pixels);
        assert_eq!(*layer.pixels.get_pixel(5, 5), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn eraser_cuts_alpha() {
        let mut layer = Layer::filled("L", 20, 20, Rgba([0, 0, 255, 255]));
        let sel = SelectionMask::new(20, 20);
        let mut sb = StrokeBuffer::new(20, 20);
        sb.begin(&layer);
        sb.dab(DocPoint::new(10.0, 10.0), &BrushParams { color: Rgba([255, 255, 255, 255]), ..red_brush() });
        sb.flush(&mut layer, &sel, true);
        assert_eq!(layer.pixels.get_pixel(10, 10)[3], 0);
        assert_eq!(layer.pixels.get_pixel(0, 0)[3], 255);
    }

    #[test]
    fn cancel_restores_snapshot() {
        let mut layer = Layer::new("L", 20, 20);
        let sel = SelectionMask::new(20, 20);
        let mut sb = StrokeBuffer::new(20, 20);
        sb.begin(&layer);
        sb.dab(DocPoint::new(10.0, 10.0), &red_brush());
        sb.flush(&mut layer, &sel, false);
        sb.cancel(&mut layer);
        assert!(layer.pixels.pixels().all(|p| p[3] == 0));
        assert!(!sb.is_active());
    }
}
