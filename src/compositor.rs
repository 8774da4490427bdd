// ============================================================================
// COMPOSITING ENGINE — layer blending, overlay surface, marching ants, grid
// ============================================================================

use std::time::Duration;

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::canvas::{BlendMode, Document};
use crate::components::tools::Tool;
use crate::geometry::{DocPoint, Rect, ScreenPoint, screen_to_document};
use crate::selection::SelectionMask;

/// Default spacing of the optional overlay grid, in document pixels.
pub const DEFAULT_GRID_SPACING: u32 = 32;
/// Dash length of the marching ants (on and off segments are equal).
pub const ANTS_DASH: u32 = 5;
/// Default marching-ants step interval (~12 Hz).
pub const DEFAULT_ANTS_INTERVAL: Duration = Duration::from_millis(80);

const GRID_COLOR: Rgba<u8> = Rgba([255, 255, 255, 20]);
const ANTS_BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const ANTS_WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

// ============================================================================
// BLEND EQUATIONS
// ============================================================================

/// Blend `top` over `base` with the given mode and opacity (0.0–1.0).
///
/// Follows the W3C compositing model: the blended colour is weighted by the
/// backdrop alpha (`(1 - ab) * Cs + ab * B(Cb, Cs)`) and then composited
/// source-over.  Fully transparent backdrops therefore behave like Normal.
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, mode: BlendMode, opacity: f32) -> Rgba<u8> {
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    if mode == BlendMode::Normal && opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let opacity = opacity.clamp(0.0, 1.0);
    let cb = [base[0] as f32 / 255.0, base[1] as f32 / 255.0, base[2] as f32 / 255.0];
    let cs = [top[0] as f32 / 255.0, top[1] as f32 / 255.0, top[2] as f32 / 255.0];
    let ab = base[3] as f32 / 255.0;
    let a_s = (top[3] as f32 / 255.0) * opacity;

    let mixed = if mode == BlendMode::Normal || ab == 0.0 {
        cs
    } else {
        let b = blend_color(cb, cs, mode);
        [
            (1.0 - ab) * cs[0] + ab * b[0],
            (1.0 - ab) * cs[1] + ab * b[1],
            (1.0 - ab) * cs[2] + ab * b[2],
        ]
    };

    let ao = a_s + ab * (1.0 - a_s);
    if ao <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |i: usize| {
        let c = (mixed[i] * a_s + cb[i] * ab * (1.0 - a_s)) / ao;
        (c * 255.0).round().clamp(0.0, 255.0) as u8
    };
    Rgba([channel(0), channel(1), channel(2), (ao * 255.0).round().clamp(0.0, 255.0) as u8])
}

/// `B(Cb, Cs)` for every supported mode, on unpremultiplied 0–1 colour.
pub fn blend_color(cb: [f32; 3], cs: [f32; 3], mode: BlendMode) -> [f32; 3] {
    let sep = |f: fn(f32, f32) -> f32| [f(cb[0], cs[0]), f(cb[1], cs[1]), f(cb[2], cs[2])];
    match mode {
        BlendMode::Normal => cs,
        BlendMode::Multiply => sep(|b, s| b * s),
        BlendMode::Screen => sep(|b, s| b + s - b * s),
        BlendMode::Overlay => sep(|b, s| hard_light_channel(s, b)),
        BlendMode::Darken => sep(f32::min),
        BlendMode::Lighten => sep(f32::max),
        BlendMode::ColorDodge => sep(color_dodge_channel),
        BlendMode::ColorBurn => sep(color_burn_channel),
        BlendMode::HardLight => sep(hard_light_channel),
        BlendMode::SoftLight => sep(soft_light_channel),
        BlendMode::Difference => sep(|b, s| (b - s).abs()),
        BlendMode::Exclusion => sep(|b, s| b + s - 2.0 * b * s),
        BlendMode::Hue => set_lum(set_sat(cs, sat(cb)), lum(cb)),
        BlendMode::Saturation => set_lum(set_sat(cb, sat(cs)), lum(cb)),
        BlendMode::Color => set_lum(cs, lum(cb)),
        BlendMode::Luminosity => set_lum(cb, lum(cs)),
    }
}

fn hard_light_channel(base: f32, top: f32) -> f32 {
    if top <= 0.5 {
        base * 2.0 * top
    } else {
        let s = 2.0 * top - 1.0;
        base + s - base * s
    }
}

fn color_dodge_channel(base: f32, top: f32) -> f32 {
    if base <= 0.0 {
        0.0
    } else if top >= 1.0 {
        1.0
    } else {
        (base / (1.0 - top)).min(1.0)
    }
}

fn color_burn_channel(base: f32, top: f32) -> f32 {
    if base >= 1.0 {
        1.0
    } else if top <= 0.0 {
        0.0
    } else {
        1.0 - ((1.0 - base) / top).min(1.0)
    }
}

fn soft_light_channel(base: f32, top: f32) -> f32 {
    if top <= 0.5 {
        base - (1.0 - 2.0 * top) * base * (1.0 - base)
    } else {
        let d = if base <= 0.25 {
            ((16.0 * base - 12.0) * base + 4.0) * base
        } else {
            base.sqrt()
        };
        base + (2.0 * top - 1.0) * (d - base)
    }
}

// Non-separable helpers (hue / saturation / color / luminosity).

fn lum(c: [f32; 3]) -> f32 {
    0.3 * c[0] + 0.59 * c[1] + 0.11 * c[2]
}

fn clip_color(c: [f32; 3]) -> [f32; 3] {
    let l = lum(c);
    let n = c[0].min(c[1]).min(c[2]);
    let x = c[0].max(c[1]).max(c[2]);
    let mut out = c;
    if n < 0.0 {
        for v in &mut out {
            *v = l + (*v - l) * l / (l - n);
        }
    }
    if x > 1.0 {
        for v in &mut out {
            *v = l + (*v - l) * (1.0 - l) / (x - l);
        }
    }
    out
}

fn set_lum(c: [f32; 3], l: f32) -> [f32; 3] {
    let d = l - lum(c);
    clip_color([c[0] + d, c[1] + d, c[2] + d])
}

fn sat(c: [f32; 3]) -> f32 {
    c[0].max(c[1]).max(c[2]) - c[0].min(c[1]).min(c[2])
}

fn set_sat(c: [f32; 3], s: f32) -> [f32; 3] {
    let mut idx = [0usize, 1, 2];
    idx.sort_by(|&a, &b| c[a].total_cmp(&c[b]));
    let (min_i, mid_i, max_i) = (idx[0], idx[1], idx[2]);
    let mut out = [0.0f32; 3];
    if c[max_i] > c[min_i] {
        out[mid_i] = (c[mid_i] - c[min_i]) * s / (c[max_i] - c[min_i]);
        out[max_i] = s;
    }
    out
}

// ============================================================================
// IMAGE-LEVEL DRAWING
// ============================================================================

/// Draw `src` onto `dst` with its top-left at `(dx, dy)` in `dst` space.
/// Rows are blended in parallel; only the overlapping region is touched.
pub fn draw_image(dst: &mut RgbaImage, src: &RgbaImage, dx: i32, dy: i32, opacity: f32, mode: BlendMode) {
    let Some(area) = overlap(dst, src, dx, dy) else { return };
    let dst_w = dst.width() as usize;
    let buf: &mut [u8] = dst;
    buf.par_chunks_mut(dst_w * 4)
        .enumerate()
        .skip(area.y as usize)
        .take(area.h as usize)
        .for_each(|(y, row)| {
            let sy = (y as i32 - dy) as u32;
            for x in area.x..area.right() {
                let sx = (x - dx) as u32;
                let top = *src.get_pixel(sx, sy);
                if top[3] == 0 {
                    continue;
                }
                let o = x as usize * 4;
                let base = Rgba([row[o], row[o + 1], row[o + 2], row[o + 3]]);
                let out = blend_pixel(base, top, mode, opacity);
                row[o..o + 4].copy_from_slice(&out.0);
            }
        });
}

/// "destination-out": scale `dst` alpha by `1 - src alpha` where they overlap.
pub fn erase_image(dst: &mut RgbaImage, src: &RgbaImage, dx: i32, dy: i32) {
    let Some(area) = overlap(dst, src, dx, dy) else { return };
    for y in area.y..area.bottom() {
        for x in area.x..area.right() {
            let cut = src.get_pixel((x - dx) as u32, (y - dy) as u32)[3];
            if cut == 0 {
                continue;
            }
            let p = dst.get_pixel_mut(x as u32, y as u32);
            let a = p[3] as f32 * (1.0 - cut as f32 / 255.0);
            p[3] = a.round() as u8;
            if p[3] == 0 {
                *p = Rgba([0, 0, 0, 0]);
            }
        }
    }
}

/// Region of `dst` covered by `src` placed at `(dx, dy)`.
fn overlap(dst: &RgbaImage, src: &RgbaImage, dx: i32, dy: i32) -> Option<Rect> {
    Rect::new(dx, dy, src.width(), src.height()).clamp_to(dst.width(), dst.height())
}

// ============================================================================
// OVERLAY PAINTER
// ============================================================================

/// Thin drawing surface over the overlay buffer used by ants, tools and grid.
pub struct Overlay<'a> {
    img: &'a mut RgbaImage,
}

impl<'a> Overlay<'a> {
    pub fn new(img: &'a mut RgbaImage) -> Self {
        Self { img }
    }

    pub fn width(&self) -> u32 {
        self.img.width()
    }

    pub fn height(&self) -> u32 {
        self.img.height()
    }

    pub fn put(&mut self, x: i32, y: i32, color: Rgba<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < self.img.width() && (y as u32) < self.img.height() {
            self.img.put_pixel(x as u32, y as u32, color);
        }
    }

    /// Bresenham line between two document points.
    pub fn line(&mut self, from: DocPoint, to: DocPoint, color: Rgba<u8>) {
        let (mut x0, mut y0) = from.cell();
        let (x1, y1) = to.cell();
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.put(x0, y0, color);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    pub fn polyline(&mut self, points: &[DocPoint], closed: bool, color: Rgba<u8>) {
        for pair in points.windows(2) {
            self.line(pair[0], pair[1], color);
        }
        if closed && points.len() > 2 {
            self.line(points[points.len() - 1], points[0], color);
        }
    }

    pub fn rect_outline(&mut self, r: Rect, color: Rgba<u8>) {
        if r.is_empty() {
            return;
        }
        let (x0, y0) = (r.x as f32, r.y as f32);
        let (x1, y1) = ((r.right() - 1) as f32, (r.bottom() - 1) as f32);
        let corners = [
            DocPoint::new(x0, y0),
            DocPoint::new(x1, y0),
            DocPoint::new(x1, y1),
            DocPoint::new(x0, y1),
        ];
        self.polyline(&corners, true, color);
    }

    /// Outline of the ellipse inscribed in `r`.
    pub fn ellipse_outline(&mut self, r: Rect, color: Rgba<u8>) {
        if r.is_empty() {
            return;
        }
        let rx = r.w as f32 / 2.0;
        let ry = r.h as f32 / 2.0;
        let cx = r.x as f32 + rx;
        let cy = r.y as f32 + ry;
        let steps = ((rx + ry) * 4.0).ceil().max(16.0) as usize;
        let pts: Vec<DocPoint> = (0..steps)
            .map(|i| {
                let t = i as f32 / steps as f32 * std::f32::consts::TAU;
                DocPoint::new(cx + rx * t.cos(), cy + ry * t.sin())
            })
            .collect();
        self.polyline(&pts, true, color);
    }

    pub fn circle_outline(&mut self, center: DocPoint, radius: f32, color: Rgba<u8>) {
        let r = radius.max(0.5);
        let rect = Rect::from_corners(
            (center.x - r).round() as i32,
            (center.y - r).round() as i32,
            (center.x + r).round() as i32,
            (center.y + r).round() as i32,
        );
        self.ellipse_outline(rect, color);
    }
}

// ============================================================================
// MARCHING ANTS CLOCK
// ============================================================================

/// Fixed-interval phase counter driving the marching-ants animation.
#[derive(Clone, Debug)]
pub struct AntsClock {
    interval: Duration,
    pending: Duration,
    phase: u32,
}

impl Default for AntsClock {
    fn default() -> Self {
        Self::new(DEFAULT_ANTS_INTERVAL)
    }
}

impl AntsClock {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            pending: Duration::ZERO,
            phase: 0,
        }
    }

    pub fn phase(&self) -> u32 {
        self.phase
    }

    /// Feed wall-clock time; returns `true` if the phase moved and the
    /// overlay needs redrawing.
    pub fn tick(&mut self, elapsed: Duration) -> bool {
        self.pending += elapsed;
        let mut moved = false;
        while self.pending >= self.interval {
            self.pending -= self.interval;
            self.phase = (self.phase + 1) % (ANTS_DASH * 2);
            moved = true;
        }
        moved
    }
}

/// Whether position `p` along a dashed line is inside an "on" dash.
fn dash_on(p: i32, phase: u32) -> bool {
    let period = (ANTS_DASH * 2) as i32;
    (p + phase as i32).rem_euclid(period) < ANTS_DASH as i32
}

// ============================================================================
// ENGINE
// ============================================================================

/// Owns the composite, main and overlay surfaces for one document.
pub struct CompositingEngine {
    width: u32,
    height: u32,
    composite: RgbaImage,
    main: RgbaImage,
    overlay: RgbaImage,
    pub ants: AntsClock,
    pub zoom: f32,
    /// On-screen position of the document's top-left corner.
    pub canvas_origin: ScreenPoint,
    pub show_grid: bool,
    pub grid_spacing: u32,
}

impl CompositingEngine {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            composite: RgbaImage::new(width, height),
            main: RgbaImage::new(width, height),
            overlay: RgbaImage::new(width, height),
            ants: AntsClock::default(),
            zoom: 1.0,
            canvas_origin: ScreenPoint::default(),
            show_grid: false,
            grid_spacing: DEFAULT_GRID_SPACING,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Resize all surfaces.  Layers are untouched.
    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.width = width;
        self.height = height;
        self.composite = RgbaImage::new(width, height);
        self.main = RgbaImage::new(width, height);
        self.overlay = RgbaImage::new(width, height);
    }

    /// Composite every visible layer bottom-to-top into the composite buffer,
    /// then publish it to the main surface.
    pub fn composite(&mut self, document: &Document) {
        self.resize(document.width, document.height);
        self.composite.fill(0);
        for layer in document.layers.iter().filter(|l| l.visible) {
            draw_image(
                &mut self.composite,
                &layer.pixels,
                layer.x,
                layer.y,
                layer.opacity as f32 / 100.0,
                layer.blend_mode,
            );
        }
        self.main.copy_from_slice(&self.composite);
    }

    /// Redraw the overlay: marching ants, active tool overlay, then grid.
    pub fn draw_overlay(&mut self, selection: &SelectionMask, tool: Option<&Tool>) {
        self.overlay.fill(0);
        let phase = self.ants.phase();
        let zoom = self.zoom;
        let show_grid = self.show_grid;
        let spacing = self.grid_spacing.max(1);
        let mut painter = Overlay::new(&mut self.overlay);
        if !selection.is_empty() {
            draw_ants(&mut painter, selection, phase);
        }
        if let Some(tool) = tool {
            tool.draw_overlay(&mut painter, zoom);
        }
        if show_grid {
            draw_grid(&mut painter, spacing);
        }
    }

    /// Advance the marching ants; redraws the overlay when the phase moves
    /// and a selection exists.
    pub fn tick(&mut self, elapsed: Duration, selection: &SelectionMask, tool: Option<&Tool>) -> bool {
        if selection.is_empty() {
            return false;
        }
        let moved = self.ants.tick(elapsed);
        if moved {
            self.draw_overlay(selection, tool);
        }
        moved
    }

    pub fn screen_to_document(&self, screen: ScreenPoint) -> DocPoint {
        screen_to_document(screen, self.canvas_origin, self.zoom)
    }

    /// Read back a composited pixel (eyedropper, clone source).
    pub fn sample_composite(&self, x: i32, y: i32) -> Option<Rgba<u8>> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(*self.composite.get_pixel(x as u32, y as u32))
    }

    pub fn composite_surface(&self) -> &RgbaImage {
        &self.composite
    }

    pub fn main_surface(&self) -> &RgbaImage {
        &self.main
    }

    pub fn overlay_surface(&self) -> &RgbaImage {
        &self.overlay
    }
}

/// Draw the selection boundary twice: black dashes at `phase`, white dashes
/// half a period later, so the outline reads on any background.
fn draw_ants(painter: &mut Overlay<'_>, selection: &SelectionMask, phase: u32) {
    let boundary = selection.trace_boundary();
    let max_x = painter.width() as i32 - 1;
    let max_y = painter.height() as i32 - 1;
    for (color, pass_phase) in [(ANTS_BLACK, phase), (ANTS_WHITE, phase + ANTS_DASH)] {
        for &(line, x0, x1) in &boundary.horizontal {
            let y = line.min(max_y);
            for x in x0..x1 {
                if dash_on(x, pass_phase) {
                    painter.put(x, y, color);
                }
            }
        }
        for &(line, y0, y1) in &boundary.vertical {
            let x = line.min(max_x);
            for y in y0..y1 {
                if dash_on(y, pass_phase) {
                    painter.put(x, y, color);
                }
            }
        }
    }
}

fn draw_grid(painter: &mut Overlay<'_>, spacing: u32) {
    let (w, h) = (painter.width(), painter.height());
    for y in 0..h {
        for x in 0..w {
            if x % spacing == 0 || y % spacing == 0 {
                painter.put(x as i32, y as i32, GRID_COLOR);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Layer;

    #[test]
    fn normal_over_transparent_keeps_color() {
        let out = blend_pixel(Rgba([0, 0, 0, 0]), Rgba([10, 20, 30, 255]), BlendMode::Multiply, 1.0);
        assert_eq!(out, Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn multiply_on_opaque_white_is_identity() {
        let out = blend_pixel(Rgba([255, 255, 255, 255]), Rgba([90, 140, 200, 255]), BlendMode::Multiply, 1.0);
        assert_eq!(out, Rgba([90, 140, 200, 255]));
    }

    #[test]
    fn screen_and_difference_equations() {
        let base = Rgba([128, 0, 255, 255]);
        let top = Rgba([128, 255, 0, 255]);
        let screen = blend_pixel(base, top, BlendMode::Screen, 1.0);
        assert_eq!(screen, Rgba([192, 255, 255, 255]));
        let diff = blend_pixel(base, top, BlendMode::Difference, 1.0);
        assert_eq!(diff, Rgba([0, 255, 255, 255]));
    }

    #[test]
    fn luminosity_of_gray_onto_color_keeps_lightness_of_top() {
        let out = blend_pixel(Rgba([200, 40, 40, 255]), Rgba([128, 128, 128, 255]), BlendMode::Luminosity, 1.0);
        let l = 0.3 * out[0] as f32 + 0.59 * out[1] as f32 + 0.11 * out[2] as f32;
        assert!((l - 128.0).abs() <= 2.0, "lum {l}");
        assert!(out[0] > out[1]);
    }

    #[test]
    fn hidden_layers_are_skipped() {
        let mut doc = Document::blank(4, 4);
        let mut layer = Layer::filled("red", 4, 4, Rgba([255, 0, 0, 255]));
        layer.visible = false;
        doc.layers.push(layer);
        let mut engine = CompositingEngine::new(4, 4);
        engine.composite(&doc);
        assert_eq!(engine.sample_composite(1, 1), Some(Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn ants_clock_wraps_after_one_period() {
        let mut clock = AntsClock::new(Duration::from_millis(80));
        assert!(!clock.tick(Duration::from_millis(79)));
        assert!(clock.tick(Duration::from_millis(1)));
        assert_eq!(clock.phase(), 1);
        clock.tick(Duration::from_millis(80 * 9));
        assert_eq!(clock.phase(), 0);
    }

    #[test]
    fn ant_passes_are_complementary() {
        for p in 0..20 {
            assert_ne!(dash_on(p, 3), dash_on(p, 3 + ANTS_DASH));
        }
    }
}
