// ============================================================================
// SELECTION MASK — per-pixel coverage, shape rasterisation, boundary tracing
// ============================================================================

use std::cell::OnceCell;
use std::collections::HashMap;

use image::{Rgba, RgbaImage};

use crate::canvas::Layer;
use crate::geometry::{DocPoint, LayerPoint, Rect, doc_point_to_layer, layer_cell_in_bounds, layer_to_doc};
use crate::ops::raster::{self, Morphology};

/// How a new selection shape interacts with the existing mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Clear any existing selection, then set the new shape.
    #[default]
    Replace,
    /// Union – add to the existing mask.
    Add,
    /// Difference – subtract from the existing mask.
    Subtract,
    /// Keep only pixels present in both the existing mask AND the new shape.
    Intersect,
}

impl SelectionMode {
    pub fn all() -> &'static [SelectionMode] {
        &[SelectionMode::Replace, SelectionMode::Add, SelectionMode::Subtract, SelectionMode::Intersect]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SelectionMode::Replace => "new",
            SelectionMode::Add => "add",
            SelectionMode::Subtract => "subtract",
            SelectionMode::Intersect => "intersect",
        }
    }
}

/// Pixel-edge outline of a selection.
///
/// `horizontal` holds `(y, x0, x1)` runs on grid line `y`; `vertical` holds
/// `(x, y0, y1)` runs on grid line `x`.  Ranges are half-open.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Boundary {
    pub horizontal: Vec<(i32, i32, i32)>,
    pub vertical: Vec<(i32, i32, i32)>,
}

impl Boundary {
    pub fn is_empty(&self) -> bool {
        self.horizontal.is_empty() && self.vertical.is_empty()
    }

    /// Total edge length in pixels.
    pub fn len(&self) -> usize {
        let h: i32 = self.horizontal.iter().map(|s| s.2 - s.1).sum();
        let v: i32 = self.vertical.iter().map(|s| s.2 - s.1).sum();
        (h + v) as usize
    }
}

pub struct SelectionMask {
    width: u32,
    height: u32,
    mask: Vec<u8>,
    bbox: Option<Rect>,
    alpha_surface: OnceCell<RgbaImage>,
    boundary: OnceCell<Boundary>,
}

impl Clone for SelectionMask {
    fn clone(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            mask: self.mask.clone(),
            bbox: self.bbox,
            alpha_surface: OnceCell::new(),
            boundary: OnceCell::new(),
        }
    }
}

impl std::fmt::Debug for SelectionMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionMask")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bbox", &self.bbox)
            .finish()
    }
}

impl SelectionMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mask: vec![0; (width as usize) * (height as usize)],
            bbox: None,
            alpha_surface: OnceCell::new(),
            boundary: OnceCell::new(),
        }
    }

    /// Reallocate at the given document size, all zero.
    pub fn reset(&mut self, width: u32, height: u32) {
        *self = Self::new(width, height);
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.mask
    }

    /// Coverage at a document cell, 0 outside the document.
    pub fn value(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return 0;
        }
        self.mask[y as usize * self.width as usize + x as usize]
    }

    pub fn is_empty(&self) -> bool {
        self.bbox.is_none()
    }

    /// Coverage resampled into `layer`'s own pixel grid, row-major at the
    /// layer's size.  `None` when nothing is selected, meaning the whole
    /// layer is in play.
    pub fn coverage_in(&self, layer: &Layer) -> Option<Vec<u8>> {
        self.bbox?;
        let (w, h) = (layer.width(), layer.height());
        let mut out = vec![0u8; (w * h) as usize];
        for (i, v) in out.iter_mut().enumerate() {
            let local = LayerPoint::new((i % w as usize) as i32, (i / w as usize) as i32);
            let (x, y) = layer_to_doc(layer, local);
            *v = self.value(x, y);
        }
        Some(out)
    }

    /// True when applying a pixel operation to `layer` could change anything:
    /// no selection, or a selection that overlaps the layer's buffer.
    pub fn touches(&self, layer: &Layer) -> bool {
        self.bbox.is_none_or(|b| b.intersect(&layer.bounds()).is_some())
    }

    pub fn bounding_box(&self) -> Option<Rect> {
        self.bbox
    }

    fn area(&self) -> usize {
        self.mask.len()
    }

    fn invalidate(&mut self) {
        self.alpha_surface.take();
        self.boundary.take();
    }

    fn recompute_bbox(&mut self) {
        self.bbox = raster::nonzero_bounds(&self.mask, self.width, self.height);
        self.invalidate();
    }

    /// Adopt raw mask bytes (history restore).  The length must match the
    /// document area; anything else is an internal bug.
    pub fn restore_raw(&mut self, width: u32, height: u32, mask: Vec<u8>, bbox: Option<Rect>) {
        assert_eq!(
            mask.len(),
            width as usize * height as usize,
            "selection mask length does not match document area"
        );
        self.width = width;
        self.height = height;
        self.mask = mask;
        self.bbox = bbox;
        self.invalidate();
    }

    // ------------------------------------------------------------------
    // Combination
    // ------------------------------------------------------------------

    /// Merge a document-sized temporary mask into the selection.
    pub fn combine(&mut self, temp: &[u8], mode: SelectionMode) {
        assert_eq!(temp.len(), self.area(), "temporary mask length does not match document area");
        match mode {
            SelectionMode::Replace => self.mask.copy_from_slice(temp),
            SelectionMode::Add => {
                for (m, &t) in self.mask.iter_mut().zip(temp) {
                    *m = (*m).max(t);
                }
            }
            SelectionMode::Subtract => {
                for (m, &t) in self.mask.iter_mut().zip(temp) {
                    *m &= !t;
                }
            }
            SelectionMode::Intersect => {
                for (m, &t) in self.mask.iter_mut().zip(temp) {
                    *m &= t;
                }
            }
        }
        self.recompute_bbox();
    }

    fn scratch(&self) -> Vec<u8> {
        vec![0; self.area()]
    }

    // ------------------------------------------------------------------
    // Shapes
    // ------------------------------------------------------------------

    /// Select the half-open cell range spanned by two corners.
    pub fn set_from_rectangle(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, mode: SelectionMode) {
        if self.area() == 0 {
            return;
        }
        let (w, h) = (self.width as f32, self.height as f32);
        let rx0 = x1.min(x2).clamp(0.0, w).round() as usize;
        let ry0 = y1.min(y2).clamp(0.0, h).round() as usize;
        let rx1 = x1.max(x2).clamp(0.0, w).round() as usize;
        let ry1 = y1.max(y2).clamp(0.0, h).round() as usize;

        let mut tmp = self.scratch();
        let stride = self.width as usize;
        for y in ry0..ry1 {
            tmp[y * stride + rx0..y * stride + rx1].fill(255);
        }
        self.combine(&tmp, mode);
    }

    /// Select the ellipse inscribed in the box spanned by two corners.
    pub fn set_from_ellipse(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, mode: SelectionMode) {
        if self.area() == 0 {
            return;
        }
        let cx = (x1 + x2) / 2.0;
        let cy = (y1 + y2) / 2.0;
        let rx = (x2 - x1).abs() / 2.0;
        let ry = (y2 - y1).abs() / 2.0;

        let mut tmp = self.scratch();
        if rx > 0.0 && ry > 0.0 {
            let (w, h) = (self.width as f32, self.height as f32);
            let x0 = (cx - rx).clamp(0.0, w).round() as usize;
            let xe = ((cx + rx).clamp(0.0, w).round() as usize).min(self.width as usize - 1);
            let y0 = (cy - ry).clamp(0.0, h).round() as usize;
            let ye = ((cy + ry).clamp(0.0, h).round() as usize).min(self.height as usize - 1);
            let stride = self.width as usize;
            for y in y0..=ye {
                let dy = (y as f32 - cy) / ry;
                for x in x0..=xe {
                    let dx = (x as f32 - cx) / rx;
                    if dx * dx + dy * dy <= 1.0 {
                        tmp[y * stride + x] = 255;
                    }
                }
            }
        }
        self.combine(&tmp, mode);
    }

    /// Even-odd polygon (lasso / polygon tool).  Fewer than three points is ignored.
    pub fn set_from_polygon(&mut self, points: &[DocPoint], mode: SelectionMode) {
        if points.len() < 3 || self.area() == 0 {
            return;
        }
        let pts: Vec<(f32, f32)> = points.iter().map(|p| (p.x, p.y)).collect();
        let mut tmp = self.scratch();
        raster::fill_polygon(&pts, self.width, self.height, &mut tmp);
        self.combine(&tmp, mode);
    }

    /// Magic wand.  The seed is the click rounded to the nearest cell, and
    /// colours are sampled from `layer` in its own space; cells outside the
    /// layer buffer never match.  A match is a summed absolute
    /// RGBA difference of at most `tolerance * 4`.
    pub fn flood_fill_select(
        &mut self,
        point: DocPoint,
        layer: &Layer,
        tolerance: i32,
        mode: SelectionMode,
        contiguous: bool,
    ) {
        if self.area() == 0 {
            return;
        }
        let Some((sx, sy)) = layer_cell_in_bounds(layer, doc_point_to_layer(layer, point)) else {
            return;
        };
        let target = *layer.pixels.get_pixel(sx, sy);
        let threshold = tolerance.clamp(0, 255) * 4;
        let stride = self.width as usize;
        let matches = |idx: usize| {
            let x = (idx % stride) as i32;
            let y = (idx / stride) as i32;
            layer
                .pixel_at_doc(x, y)
                .is_some_and(|p| color_distance(p, target) <= threshold)
        };

        let mut tmp = self.scratch();
        if contiguous {
            let (cx, cy) = point.rounded();
            raster::flood_fill(self.width, self.height, cx, cy, &mut tmp, matches);
        } else if let Some(area) = layer.bounds().clamp_to(self.width, self.height) {
            for y in area.y..area.bottom() {
                for x in area.x..area.right() {
                    let idx = y as usize * stride + x as usize;
                    if matches(idx) {
                        tmp[idx] = 255;
                    }
                }
            }
        }
        self.combine(&tmp, mode);
    }

    // ------------------------------------------------------------------
    // Whole-mask operations
    // ------------------------------------------------------------------

    pub fn select_all(&mut self) {
        if self.area() == 0 {
            return;
        }
        self.mask.fill(255);
        self.bbox = Some(Rect::new(0, 0, self.width, self.height));
        self.invalidate();
    }

    pub fn deselect(&mut self) {
        self.mask.fill(0);
        self.bbox = None;
        self.invalidate();
    }

    pub fn invert(&mut self) {
        for m in &mut self.mask {
            *m = 255 - *m;
        }
        self.recompute_bbox();
    }

    /// Morphological dilation over a square neighbourhood.
    pub fn expand(&mut self, radius: u32) {
        self.morph(radius, Morphology::Dilate);
    }

    /// Morphological erosion over a square neighbourhood.
    pub fn contract(&mut self, radius: u32) {
        self.morph(radius, Morphology::Erode);
    }

    fn morph(&mut self, radius: u32, op: Morphology) {
        if radius == 0 || self.is_empty() {
            return;
        }
        self.mask = raster::morphology(&self.mask, self.width, self.height, radius, op);
        self.recompute_bbox();
    }

    /// Soften the edge with a separable box blur.
    pub fn feather(&mut self, radius: u32) {
        if radius == 0 || self.is_empty() {
            return;
        }
        self.mask = raster::box_blur(&self.mask, self.width, self.height, radius);
        self.recompute_bbox();
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// True everywhere when nothing is selected (the whole canvas is
    /// implicitly in play); otherwise coverage > 0 at the rounded cell.
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        if self.is_empty() {
            return true;
        }
        let (x, y) = (x.round() as i32, y.round() as i32);
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return false;
        }
        self.value(x, y) > 0
    }

    /// White RGB with alpha = coverage.  Cached until the next mutation.
    pub fn as_alpha_surface(&self) -> &RgbaImage {
        self.alpha_surface.get_or_init(|| {
            let mut surface = RgbaImage::new(self.width, self.height);
            for (px, &m) in surface.pixels_mut().zip(&self.mask) {
                *px = Rgba([255, 255, 255, m]);
            }
            surface
        })
    }

    /// Every grid edge between two orthogonally adjacent cells whose
    /// selected state differs.  Cells outside the document count as
    /// unselected.  Cached until the next mutation.
    pub fn trace_boundary(&self) -> &Boundary {
        self.boundary.get_or_init(|| self.build_boundary())
    }

    fn selected(&self, x: i32, y: i32) -> bool {
        self.value(x, y) > 0
    }

    fn build_boundary(&self) -> Boundary {
        let mut out = Boundary::default();
        if self.is_empty() {
            return out;
        }
        let (w, h) = (self.width as i32, self.height as i32);

        for y in 0..=h {
            let mut run: Option<i32> = None;
            for x in 0..=w {
                let edge = x < w && self.selected(x, y) != self.selected(x, y - 1);
                match (edge, run) {
                    (true, None) => run = Some(x),
                    (false, Some(start)) => {
                        out.horizontal.push((y, start, x));
                        run = None;
                    }
                    _ => {}
                }
            }
        }

        for x in 0..=w {
            let mut run: Option<i32> = None;
            for y in 0..=h {
                let edge = y < h && self.selected(x, y) != self.selected(x - 1, y);
                match (edge, run) {
                    (true, None) => run = Some(y),
                    (false, Some(start)) => {
                        out.vertical.push((x, start, y));
                        run = None;
                    }
                    _ => {}
                }
            }
        }
        out
    }

    /// Link the boundary into closed corner polylines, one per loop.
    ///
    /// Edges are oriented so the selected side is consistent, then walked
    /// preferring right turns; diagonal pinch points therefore split into
    /// separate loops.
    pub fn boundary_loops(&self) -> Vec<Vec<(i32, i32)>> {
        type Vertex = (i32, i32);
        let boundary = self.trace_boundary();
        let mut outgoing: HashMap<Vertex, Vec<Vertex>> = HashMap::new();

        for &(y, x0, x1) in &boundary.horizontal {
            for x in x0..x1 {
                let (from, to) = if self.selected(x, y) { ((x, y), (x + 1, y)) } else { ((x + 1, y), (x, y)) };
                outgoing.entry(from).or_default().push(to);
            }
        }
        for &(x, y0, y1) in &boundary.vertical {
            for y in y0..y1 {
                let (from, to) = if self.selected(x, y) { ((x, y + 1), (x, y)) } else { ((x, y), (x, y + 1)) };
                outgoing.entry(from).or_default().push(to);
            }
        }

        let mut starts: Vec<Vertex> = outgoing.keys().copied().collect();
        starts.sort_unstable();

        let mut loops = Vec::new();
        for start in starts {
            while outgoing.get(&start).is_some_and(|v| !v.is_empty()) {
                let mut path = vec![start];
                let mut prev = start;
                let mut cur = match outgoing.get_mut(&start).and_then(|v| v.pop()) {
                    Some(v) => v,
                    None => break,
                };
                while cur != start {
                    let dir = (cur.0 - prev.0, cur.1 - prev.1);
                    let Some(choices) = outgoing.get_mut(&cur) else { break };
                    let Some(pick) = pick_turn(dir, cur, choices) else { break };
                    let next = choices.swap_remove(pick);
                    path.push(cur);
                    prev = cur;
                    cur = next;
                }
                loops.push(simplify_loop(path));
            }
        }
        loops
    }
}

/// Summed absolute RGBA difference.
pub fn color_distance(a: Rgba<u8>, b: Rgba<u8>) -> i32 {
    (0..4).map(|i| (a[i] as i32 - b[i] as i32).abs()).sum()
}

/// Index into `choices` of the preferred continuation: right, straight, left.
fn pick_turn(dir: (i32, i32), at: (i32, i32), choices: &[(i32, i32)]) -> Option<usize> {
    // y grows downward, so a right turn of (dx, dy) is (-dy, dx).
    let right = (-dir.1, dir.0);
    let left = (dir.1, -dir.0);
    for want in [right, dir, left] {
        if let Some(i) = choices.iter().position(|&c| (c.0 - at.0, c.1 - at.1) == want) {
            return Some(i);
        }
    }
    (!choices.is_empty()).then_some(0)
}

/// Drop vertices that sit in the middle of a straight run.
fn simplify_loop(path: Vec<(i32, i32)>) -> Vec<(i32, i32)> {
    let n = path.len();
    if n < 3 {
        return path;
    }
    (0..n)
        .filter(|&i| {
            let a = path[(i + n - 1) % n];
            let b = path[i];
            let c = path[(i + 1) % n];
            (b.0 - a.0) * (c.1 - b.1) != (b.1 - a.1) * (c.0 - b.0)
        })
        .map(|i| path[i])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_selected(sel: &SelectionMask) -> usize {
        sel.data().iter().filter(|&&v| v > 0).count()
    }

    #[test]
    fn rectangle_is_half_open_and_clamped() {
        let mut sel = SelectionMask::new(20, 20);
        sel.set_from_rectangle(15.0, 18.0, 30.0, -5.0, SelectionMode::Replace);
        assert_eq!(sel.bounding_box(), Some(Rect::new(15, 0, 5, 18)));
        assert_eq!(count_selected(&sel), 5 * 18);
    }

    #[test]
    fn zero_area_rectangle_selects_nothing() {
        let mut sel = SelectionMask::new(10, 10);
        sel.set_from_rectangle(3.0, 3.0, 3.0, 8.0, SelectionMode::Replace);
        assert!(sel.is_empty());
        assert!(sel.contains_point(100.0, 100.0));
    }

    #[test]
    fn ellipse_is_symmetric() {
        let mut sel = SelectionMask::new(21, 21);
        sel.set_from_ellipse(0.0, 0.0, 20.0, 20.0, SelectionMode::Replace);
        assert_eq!(sel.value(10, 10), 255);
        assert_eq!(sel.value(0, 0), 0);
        for (x, y) in [(3, 5), (7, 1), (2, 14)] {
            assert_eq!(sel.value(x, y), sel.value(20 - x, 20 - y));
        }
        assert_eq!(sel.bounding_box(), Some(Rect::new(0, 0, 21, 21)));
    }

    #[test]
    fn subtract_and_intersect() {
        let mut sel = SelectionMask::new(10, 10);
        sel.set_from_rectangle(0.0, 0.0, 6.0, 6.0, SelectionMode::Replace);
        sel.set_from_rectangle(3.0, 3.0, 10.0, 10.0, SelectionMode::Subtract);
        assert_eq!(count_selected(&sel), 36 - 9);
        sel.set_from_rectangle(0.0, 0.0, 2.0, 10.0, SelectionMode::Intersect);
        assert_eq!(sel.bounding_box(), Some(Rect::new(0, 0, 2, 6)));
    }

    #[test]
    fn contains_point_rounds_and_bounds_checks() {
        let mut sel = SelectionMask::new(10, 10);
        sel.set_from_rectangle(2.0, 2.0, 4.0, 4.0, SelectionMode::Replace);
        assert!(sel.contains_point(2.6, 3.4));
        assert!(!sel.contains_point(3.6, 3.0));
        assert!(!sel.contains_point(-1.0, 2.0));
    }

    #[test]
    fn alpha_surface_tracks_mutations() {
        let mut sel = SelectionMask::new(4, 4);
        sel.set_from_rectangle(0.0, 0.0, 1.0, 1.0, SelectionMode::Replace);
        assert_eq!(*sel.as_alpha_surface().get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        sel.invert();
        assert_eq!(sel.as_alpha_surface().get_pixel(0, 0)[3], 0);
        assert_eq!(sel.as_alpha_surface().get_pixel(3, 3)[3], 255);
    }

    #[test]
    fn single_pixel_boundary_is_one_square_loop() {
        let mut sel = SelectionMask::new(5, 5);
        sel.set_from_rectangle(2.0, 2.0, 3.0, 3.0, SelectionMode::Replace);
        assert_eq!(sel.trace_boundary().len(), 4);
        let loops = sel.boundary_loops();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].len(), 4);
    }

    #[test]
    fn selection_touching_document_edge_is_closed() {
        let mut sel = SelectionMask::new(4, 4);
        sel.select_all();
        let b = sel.trace_boundary();
        assert_eq!(b.len(), 16);
        assert_eq!(sel.boundary_loops().len(), 1);
    }

    #[test]
    fn feather_softens_but_keeps_core() {
        let mut sel = SelectionMask::new(20, 20);
        sel.set_from_rectangle(5.0, 5.0, 15.0, 15.0, SelectionMode::Replace);
        sel.feather(2);
        assert_eq!(sel.value(10, 10), 255);
        let edge = sel.value(5, 10);
        assert!(edge > 0 && edge < 255);
        assert_eq!(sel.bounding_box(), Some(Rect::new(3, 3, 14, 14)));
    }

    #[test]
    fn operations_on_empty_document_are_noops() {
        let mut sel = SelectionMask::new(0, 0);
        sel.set_from_rectangle(0.0, 0.0, 5.0, 5.0, SelectionMode::Replace);
        sel.set_from_ellipse(0.0, 0.0, 5.0, 5.0, SelectionMode::Add);
        sel.select_all();
        sel.expand(3);
        assert!(sel.is_empty());
    }
}
