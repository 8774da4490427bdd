// ============================================================================
// ADJUSTMENT OPERATIONS — per-pixel colour corrections (selection + layer aware)
// ============================================================================
//
// Every adjustment maps each pixel of one layer independently.  With an
// active selection the result is blended back by the coverage of the pixel's
// document cell; without one the whole layer changes.  Rows run in parallel
// via rayon.
// ============================================================================

use rayon::prelude::*;

use crate::canvas::Layer;
use crate::selection::SelectionMask;

/// Rec. 601 luma of an RGB triple (0–255 in, 0–255 out).
pub fn luma(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

// ============================================================================
// HELPER: selection-aware per-pixel transform
// ============================================================================

/// Run `transform` over every pixel of `layer` the selection touches.
/// `transform` receives the layer-local cell and the RGBA channels as f32.
pub(crate) fn apply_pixel_transform<F>(layer: &mut Layer, selection: &SelectionMask, transform: F)
where
    F: Fn(u32, u32, [f32; 4]) -> [f32; 4] + Sync,
{
    let coverage = selection.coverage_in(layer);
    let w = layer.width() as usize;
    let buf: &mut [u8] = &mut layer.pixels;
    buf.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let cov = coverage.as_ref().map_or(255, |c| c[y * w + x]);
            if cov == 0 {
                continue;
            }
            let pi = x * 4;
            let src = [row[pi] as f32, row[pi + 1] as f32, row[pi + 2] as f32, row[pi + 3] as f32];
            let out = transform(x as u32, y as u32, src);
            write_weighted(&mut row[pi..pi + 4], src, out, cov);
        }
    });
}

/// Store `out` over `src`, weighted by selection coverage.
pub(crate) fn write_weighted(dst: &mut [u8], src: [f32; 4], out: [f32; 4], coverage: u8) {
    let t = coverage as f32 / 255.0;
    for c in 0..4 {
        let v = src[c] + (out[c].clamp(0.0, 255.0) - src[c]) * t;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
}

fn apply_lut(layer: &mut Layer, selection: &SelectionMask, lut: [u8; 256]) {
    apply_pixel_transform(layer, selection, move |_, _, [r, g, b, a]| {
        [lut[r as usize] as f32, lut[g as usize] as f32, lut[b as usize] as f32, a]
    });
}

// ============================================================================
// INSTANT OPERATIONS
// ============================================================================

/// Invert R, G and B.  Alpha is preserved.
pub fn invert_colors(layer: &mut Layer, selection: &SelectionMask) {
    apply_pixel_transform(layer, selection, |_, _, [r, g, b, a]| [255.0 - r, 255.0 - g, 255.0 - b, a]);
}

/// Replace colour with its luma.
pub fn desaturate(layer: &mut Layer, selection: &SelectionMask) {
    apply_pixel_transform(layer, selection, |_, _, [r, g, b, a]| {
        let v = luma(r, g, b).round();
        [v, v, v, a]
    });
}

// ============================================================================
// PARAMETERIZED OPERATIONS
// ============================================================================

/// Brightness/Contrast.
/// `brightness`: -255..255 (additive offset)
/// `contrast`: -255..255 (multiplier around the midpoint)
pub fn brightness_contrast(layer: &mut Layer, selection: &SelectionMask, brightness: f32, contrast: f32) {
    let contrast = contrast.clamp(-255.0, 255.0);
    let factor = (259.0 * (contrast + 255.0)) / (255.0 * (259.0 - contrast));
    apply_pixel_transform(layer, selection, move |_, _, [r, g, b, a]| {
        let f = |v: f32| factor * (v + brightness - 128.0) + 128.0;
        [f(r), f(g), f(b), a]
    });
}

/// Hue/Saturation/Lightness in HSV space.
/// `hue_shift`: -180..180 degrees
/// `saturation`, `lightness`: -100..100, added to S and V (0..100)
pub fn hue_saturation_lightness(
    layer: &mut Layer,
    selection: &SelectionMask,
    hue_shift: f32,
    saturation: f32,
    lightness: f32,
) {
    apply_pixel_transform(layer, selection, move |_, _, [r, g, b, a]| {
        let (h, s, v) = rgb_to_hsv(r, g, b);
        let h = (h + hue_shift).rem_euclid(360.0);
        let s = (s + saturation).clamp(0.0, 100.0);
        let v = (v + lightness).clamp(0.0, 100.0);
        let (nr, ng, nb) = hsv_to_rgb(h, s, v);
        [nr, ng, nb, a]
    });
}

/// Levels: input black/white points with a midtone gamma, remapped onto
/// the output range.
pub fn levels(
    layer: &mut Layer,
    selection: &SelectionMask,
    in_black: f32,
    gamma: f32,
    in_white: f32,
    out_black: f32,
    out_white: f32,
) {
    apply_lut(layer, selection, build_levels_lut(in_black, gamma, in_white, out_black, out_white));
}

fn build_levels_lut(in_black: f32, gamma: f32, in_white: f32, out_black: f32, out_white: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    let in_range = (in_white - in_black).max(1.0);
    let inv_gamma = 1.0 / gamma.max(0.01);
    for (i, slot) in lut.iter_mut().enumerate() {
        let normalized = ((i as f32 - in_black) / in_range).clamp(0.0, 1.0);
        let out = out_black + normalized.powf(inv_gamma) * (out_white - out_black);
        *slot = out.round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Curves through control points `(input, output)` in 0..255, joined by
/// straight segments.  Fewer than two points leave the layer unchanged.
pub fn curves(layer: &mut Layer, selection: &SelectionMask, points: &[(f32, f32)]) {
    if points.len() < 2 {
        return;
    }
    apply_lut(layer, selection, build_curves_lut(points));
}

/// 256-entry lookup from piecewise-linear control points.  Inputs outside
/// the first/last point extend the end segments.
pub fn build_curves_lut(points: &[(f32, f32)]) -> [u8; 256] {
    let mut lut = [0u8; 256];
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    if sorted.len() < 2 {
        for (i, slot) in lut.iter_mut().enumerate() {
            *slot = i as u8;
        }
        return lut;
    }
    for (i, slot) in lut.iter_mut().enumerate() {
        let x = i as f32;
        let mut seg = 0;
        while seg < sorted.len() - 2 && sorted[seg + 1].0 <= x {
            seg += 1;
        }
        let (x0, y0) = sorted[seg];
        let (x1, y1) = sorted[seg + 1];
        let span = x1 - x0;
        let t = if span.abs() < 1e-6 { 0.0 } else { (x - x0) / span };
        *slot = (y0 + (y1 - y0) * t).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Colour balance.  Each of `shadows`, `midtones` and `highlights` is an
/// `[r, g, b]` shift in -100..100, weighted by the pixel's luma band.
pub fn color_balance(
    layer: &mut Layer,
    selection: &SelectionMask,
    shadows: [f32; 3],
    midtones: [f32; 3],
    highlights: [f32; 3],
) {
    apply_pixel_transform(layer, selection, move |_, _, [r, g, b, a]| {
        let lum = luma(r, g, b) / 255.0;
        let sw = ((0.5 - lum) * 2.0).max(0.0);
        let hw = ((lum - 0.5) * 2.0).max(0.0);
        let mw = 1.0 - sw - hw;
        let shift = |c: usize| (shadows[c] * sw + midtones[c] * mw + highlights[c] * hw) * 2.55;
        [r + shift(0), g + shift(1), b + shift(2), a]
    });
}

/// Black and white by luma: at or above `level` becomes white.
pub fn threshold(layer: &mut Layer, selection: &SelectionMask, level: f32) {
    apply_pixel_transform(layer, selection, move |_, _, [r, g, b, a]| {
        let v = if luma(r, g, b) >= level { 255.0 } else { 0.0 };
        [v, v, v, a]
    });
}

/// Reduce each channel to `levels` evenly spaced values.
pub fn posterize(layer: &mut Layer, selection: &SelectionMask, levels: u32) {
    let step = 255.0 / levels.saturating_sub(1).max(1) as f32;
    apply_pixel_transform(layer, selection, move |_, _, [r, g, b, a]| {
        let p = |v: f32| (v / step).round() * step;
        [p(r), p(g), p(b), a]
    });
}

// ============================================================================
// COLOR SPACE HELPERS
// ============================================================================

/// RGB (0..255) → HSV (H: 0..360, S: 0..100, V: 0..100)
pub fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let (r, g, b) = (r / 255.0, g / 255.0, b / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let d = max - min;
    let s = if max <= 0.0 { 0.0 } else { d / max };
    let h = if d.abs() < 1e-6 {
        0.0
    } else if max == r {
        ((g - b) / d).rem_euclid(6.0)
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    (h * 60.0, s * 100.0, max * 100.0)
}

/// HSV (H: 0..360, S: 0..100, V: 0..100) → RGB (0..255)
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let (s, v) = (s / 100.0, v / 100.0);
    let f = |n: f32| {
        let k = (n + h / 60.0) % 6.0;
        (v - v * s * k.min(4.0 - k).clamp(0.0, 1.0)) * 255.0
    };
    (f(5.0), f(3.0), f(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::SelectionMode;
    use image::Rgba;

    fn solid(color: [u8; 4]) -> Layer {
        Layer::filled("L", 8, 8, Rgba(color))
    }

    #[test]
    fn invert_keeps_alpha() {
        let mut layer = solid([10, 200, 30, 128]);
        invert_colors(&mut layer, &SelectionMask::new(8, 8));
        assert_eq!(*layer.pixels.get_pixel(3, 3), Rgba([245, 55, 225, 128]));
    }

    #[test]
    fn selection_limits_and_weights_adjustment() {
        let mut layer = solid([0, 0, 0, 255]);
        layer.x = 4;
        let mut sel = SelectionMask::new(16, 8);
        sel.set_from_rectangle(0.0, 0.0, 6.0, 8.0, SelectionMode::Replace);
        invert_colors(&mut layer, &sel);
        assert_eq!(*layer.pixels.get_pixel(1, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(*layer.pixels.get_pixel(2, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn hsv_round_trip_is_stable() {
        for &(r, g, b) in &[(255.0, 0.0, 0.0), (12.0, 200.0, 99.0), (128.0, 128.0, 128.0)] {
            let (h, s, v) = rgb_to_hsv(r, g, b);
            let (nr, ng, nb) = hsv_to_rgb(h, s, v);
            assert!((nr - r).abs() < 0.5 && (ng - g).abs() < 0.5 && (nb - b).abs() < 0.5);
        }
    }

    #[test]
    fn hue_shift_turns_red_green() {
        let mut layer = solid([255, 0, 0, 255]);
        hue_saturation_lightness(&mut layer, &SelectionMask::new(8, 8), 120.0, 0.0, 0.0);
        assert_eq!(*layer.pixels.get_pixel(0, 0), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn levels_identity_and_clip() {
        let lut = build_levels_lut(0.0, 1.0, 255.0, 0.0, 255.0);
        assert!(lut.iter().enumerate().all(|(i, &v)| v as usize == i));
        let clip = build_levels_lut(64.0, 1.0, 192.0, 0.0, 255.0);
        assert_eq!((clip[0], clip[64], clip[128], clip[192], clip[255]), (0, 0, 128, 255, 255));
    }

    #[test]
    fn curves_interpolate_between_points() {
        let lut = build_curves_lut(&[(255.0, 0.0), (0.0, 255.0)]);
        assert_eq!((lut[0], lut[255]), (255, 0));
        assert_eq!(lut[51], 204);
        let kinked = build_curves_lut(&[(0.0, 0.0), (128.0, 64.0), (255.0, 255.0)]);
        assert_eq!(kinked[64], 32);
        assert_eq!(kinked[128], 64);
    }

    #[test]
    fn threshold_and_posterize() {
        let mut layer = solid([200, 200, 200, 255]);
        threshold(&mut layer, &SelectionMask::new(8, 8), 128.0);
        assert_eq!(*layer.pixels.get_pixel(0, 0), Rgba([255, 255, 255, 255]));

        let mut layer = solid([100, 30, 220, 255]);
        posterize(&mut layer, &SelectionMask::new(8, 8), 2);
        assert_eq!(*layer.pixels.get_pixel(0, 0), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn brightness_only_offsets() {
        let mut layer = solid([100, 100, 100, 255]);
        brightness_contrast(&mut layer, &SelectionMask::new(8, 8), 20.0, 0.0);
        assert_eq!(*layer.pixels.get_pixel(0, 0), Rgba([120, 120, 120, 255]));
    }

    #[test]
    fn color_balance_shifts_midtones() {
        let mut layer = solid([128, 128, 128, 255]);
        color_balance(&mut layer, &SelectionMask::new(8, 8), [0.0; 3], [20.0, 0.0, -20.0], [0.0; 3]);
        let p = *layer.pixels.get_pixel(0, 0);
        assert!(p[0] > 170 && p[2] < 90 && p[1] == 128);
    }
}
