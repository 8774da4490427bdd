// ============================================================================
// COORDINATE SPACES — screen, document and layer-local points
// ============================================================================
//
// Layers can be smaller than, larger than, or offset from the document, so a
// position only means something together with the space it lives in.  Every
// conversion between document and layer space goes through the functions in
// this module instead of ad-hoc `x - layer.x` arithmetic at call sites.

use serde::{Deserialize, Serialize};

/// A position on the host's drawing surface, in physical screen pixels.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

impl ScreenPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A position in document space (origin = top-left of the canvas).
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct DocPoint {
    pub x: f32,
    pub y: f32,
}

impl DocPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Integer pixel cell containing this point.
    pub fn cell(self) -> (i32, i32) {
        (self.x.floor() as i32, self.y.floor() as i32)
    }

    /// Nearest pixel corner, for tools that round instead of floor.
    pub fn rounded(self) -> (i32, i32) {
        (self.x.round() as i32, self.y.round() as i32)
    }

    pub fn distance(self, other: DocPoint) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }
}

/// A position in one layer's own pixel buffer (origin = that layer's top-left).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct LayerPoint {
    pub x: i32,
    pub y: i32,
}

impl LayerPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Anything with a document-space offset: layers, and snapshots of layers.
pub trait Placed {
    fn origin(&self) -> (i32, i32);
    fn extent(&self) -> (u32, u32);
}

/// Map a document pixel cell into `layer`'s local space.
pub fn doc_to_layer<L: Placed>(layer: &L, x: i32, y: i32) -> LayerPoint {
    let (ox, oy) = layer.origin();
    LayerPoint { x: x - ox, y: y - oy }
}

/// Map a click position into `layer`'s local space.  Rounds to the nearest
/// cell, so the bucket, the wand and the eyedropper agree on the pixel.
pub fn doc_point_to_layer<L: Placed>(layer: &L, p: DocPoint) -> LayerPoint {
    let (cx, cy) = p.rounded();
    doc_to_layer(layer, cx, cy)
}

/// Map a layer-local cell back into document space.
pub fn layer_to_doc<L: Placed>(layer: &L, p: LayerPoint) -> (i32, i32) {
    let (ox, oy) = layer.origin();
    (p.x + ox, p.y + oy)
}

/// Returns the layer-local cell if it lies inside the layer buffer.
pub fn layer_cell_in_bounds<L: Placed>(layer: &L, p: LayerPoint) -> Option<(u32, u32)> {
    let (w, h) = layer.extent();
    if p.x < 0 || p.y < 0 || p.x >= w as i32 || p.y >= h as i32 {
        return None;
    }
    Some((p.x as u32, p.y as u32))
}

/// Convert a screen position into document space given the on-screen origin
/// of the canvas and the current zoom factor.
pub fn screen_to_document(screen: ScreenPoint, canvas_origin: ScreenPoint, zoom: f32) -> DocPoint {
    let zoom = if zoom > 0.0 { zoom } else { 1.0 };
    DocPoint {
        x: (screen.x - canvas_origin.x) / zoom,
        y: (screen.y - canvas_origin.y) / zoom,
    }
}

// ============================================================================
// RECT
// ============================================================================

/// Integer axis-aligned rectangle `{x, y, w, h}`, half-open on the right/bottom.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Build from two arbitrary corners, normalising so width/height are non-negative.
    pub fn from_corners(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        let (x0, x1) = (x1.min(x2), x1.max(x2));
        let (y0, y1) = (y1.min(y2), y1.max(y2));
        Self { x: x0, y: y0, w: (x1 - x0) as u32, h: (y1 - y0) as u32 }
    }

    pub fn right(&self) -> i32 {
        self.x + self.w as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h as i32
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::from_corners(x0, y0, x1, y1))
    }

    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::from_corners(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    /// Clamp to `0..width, 0..height`.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Rect> {
        self.intersect(&Rect::new(0, 0, width, height))
    }

    /// Grow by `pad` pixels on every side.
    pub fn inflate(&self, pad: i32) -> Rect {
        Rect::from_corners(self.x - pad, self.y - pad, self.right() + pad, self.bottom() + pad)
    }

    /// Same rectangle expressed in `layer`'s local space.
    pub fn to_layer<L: Placed>(&self, layer: &L) -> Rect {
        let p = doc_to_layer(layer, self.x, self.y);
        Rect { x: p.x, y: p.y, w: self.w, h: self.h }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Offset(i32, i32, u32, u32);

    impl Placed for Offset {
        fn origin(&self) -> (i32, i32) {
            (self.0, self.1)
        }
        fn extent(&self) -> (u32, u32) {
            (self.2, self.3)
        }
    }

    #[test]
    fn doc_layer_round_trip_respects_offset() {
        let layer = Offset(-12, 30, 50, 50);
        let lp = doc_to_layer(&layer, 5, 40);
        assert_eq!(lp, LayerPoint::new(17, 10));
        assert_eq!(layer_to_doc(&layer, lp), (5, 40));
        assert_eq!(layer_cell_in_bounds(&layer, lp), Some((17, 10)));
        assert_eq!(layer_cell_in_bounds(&layer, doc_to_layer(&layer, 0, 0)), None);
    }

    #[test]
    fn click_positions_round_to_nearest_cell() {
        let layer = Offset(2, 2, 10, 10);
        assert_eq!(doc_point_to_layer(&layer, DocPoint::new(4.6, 4.4)), LayerPoint::new(3, 2));
        assert_eq!(doc_point_to_layer(&layer, DocPoint::new(1.5, 1.6)), LayerPoint::new(0, 0));
    }

    #[test]
    fn screen_mapping_divides_by_zoom() {
        let p = screen_to_document(ScreenPoint::new(150.0, 90.0), ScreenPoint::new(50.0, 10.0), 2.0);
        assert_eq!(p, DocPoint::new(50.0, 40.0));
    }

    #[test]
    fn rect_from_swapped_corners_is_normalised() {
        let r = Rect::from_corners(40, 30, 10, 5);
        assert_eq!(r, Rect::new(10, 5, 30, 25));
        assert_eq!(r.clamp_to(20, 20), Some(Rect::new(10, 5, 10, 15)));
        assert!(Rect::new(0, 0, 5, 5).intersect(&Rect::new(5, 0, 5, 5)).is_none());
    }
}
