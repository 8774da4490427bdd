// ============================================================================
// FILTERS — neighbourhood effects on one layer, plus the catalogue of every
// colour operation the editor can run as a single undoable step
// ============================================================================
//
// Spatial filters read the untouched source and write a fresh buffer, which
// is then blended back through the selection coverage.  Sampling past the
// buffer edge clamps to the nearest edge pixel.
// ============================================================================

use rayon::prelude::*;

use crate::canvas::Layer;
use crate::ops::adjustments::{self, write_weighted};
use crate::selection::SelectionMask;

// ============================================================================
// FILTER CATALOGUE
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    BrightnessContrast { brightness: f32, contrast: f32 },
    HueSaturation { hue: f32, saturation: f32, lightness: f32 },
    Invert,
    Desaturate,
    Levels { in_black: f32, gamma: f32, in_white: f32, out_black: f32, out_white: f32 },
    Curves { points: Vec<(f32, f32)> },
    ColorBalance { shadows: [f32; 3], midtones: [f32; 3], highlights: [f32; 3] },
    Threshold { level: f32 },
    Posterize { levels: u32 },
    GaussianBlur { radius: f32 },
    BoxBlur { radius: u32 },
    Sharpen { amount: f32 },
    UnsharpMask { radius: f32, amount: f32, threshold: f32 },
    Noise { amount: f32, monochrome: bool, seed: u32 },
    Median { radius: u32 },
    MotionBlur { angle: f32, distance: u32 },
    Pixelate { block: u32 },
    Emboss,
    Vignette { amount: f32 },
}

impl Filter {
    /// History label.
    pub fn name(&self) -> &'static str {
        match self {
            Filter::BrightnessContrast { .. } => "Brightness/Contrast",
            Filter::HueSaturation { .. } => "Hue/Saturation",
            Filter::Invert => "Invert Colors",
            Filter::Desaturate => "Desaturate",
            Filter::Levels { .. } => "Levels",
            Filter::Curves { .. } => "Curves",
            Filter::ColorBalance { .. } => "Color Balance",
            Filter::Threshold { .. } => "Threshold",
            Filter::Posterize { .. } => "Posterize",
            Filter::GaussianBlur { .. } => "Gaussian Blur",
            Filter::BoxBlur { .. } => "Box Blur",
            Filter::Sharpen { .. } => "Sharpen",
            Filter::UnsharpMask { .. } => "Unsharp Mask",
            Filter::Noise { .. } => "Add Noise",
            Filter::Median { .. } => "Median",
            Filter::MotionBlur { .. } => "Motion Blur",
            Filter::Pixelate { .. } => "Pixelate",
            Filter::Emboss => "Emboss",
            Filter::Vignette { .. } => "Vignette",
        }
    }

    /// Run the filter over `layer`, limited to `selection` when one is active.
    pub fn apply(&self, layer: &mut Layer, selection: &SelectionMask) {
        match self {
            Filter::BrightnessContrast { brightness, contrast } => {
                adjustments::brightness_contrast(layer, selection, *brightness, *contrast)
            }
            Filter::HueSaturation { hue, saturation, lightness } => {
                adjustments::hue_saturation_lightness(layer, selection, *hue, *saturation, *lightness)
            }
            Filter::Invert => adjustments::invert_colors(layer, selection),
            Filter::Desaturate => adjustments::desaturate(layer, selection),
            Filter::Levels { in_black, gamma, in_white, out_black, out_white } => {
                adjustments::levels(layer, selection, *in_black, *gamma, *in_white, *out_black, *out_white)
            }
            Filter::Curves { points } => adjustments::curves(layer, selection, points),
            Filter::ColorBalance { shadows, midtones, highlights } => {
                adjustments::color_balance(layer, selection, *shadows, *midtones, *highlights)
            }
            Filter::Threshold { level } => adjustments::threshold(layer, selection, *level),
            Filter::Posterize { levels } => adjustments::posterize(layer, selection, *levels),
            Filter::GaussianBlur { radius } => gaussian_blur(layer, selection, *radius),
            Filter::BoxBlur { radius } => box_blur(layer, selection, *radius),
            Filter::Sharpen { amount } => sharpen(layer, selection, *amount),
            Filter::UnsharpMask { radius, amount, threshold } => {
                unsharp_mask(layer, selection, *radius, *amount, *threshold)
            }
            Filter::Noise { amount, monochrome, seed } => add_noise(layer, selection, *amount, *monochrome, *seed),
            Filter::Median { radius } => median(layer, selection, *radius),
            Filter::MotionBlur { angle, distance } => motion_blur(layer, selection, *angle, *distance),
            Filter::Pixelate { block } => pixelate(layer, selection, *block),
            Filter::Emboss => emboss(layer, selection),
            Filter::Vignette { amount } => vignette(layer, selection, *amount),
        }
    }
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Source view with clamped sampling.
struct Source<'a> {
    raw: &'a [u8],
    w: usize,
    h: usize,
}

impl Source<'_> {
    fn at(&self, x: i64, y: i64) -> [f32; 4] {
        let x = x.clamp(0, self.w as i64 - 1) as usize;
        let y = y.clamp(0, self.h as i64 - 1) as usize;
        let i = (y * self.w + x) * 4;
        [self.raw[i] as f32, self.raw[i + 1] as f32, self.raw[i + 2] as f32, self.raw[i + 3] as f32]
    }
}

/// Blend a filtered copy of the layer back in by selection coverage.
fn commit_filtered(layer: &mut Layer, selection: &SelectionMask, filtered: &[u8]) {
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
            let fi = (y * w + x) * 4;
            let src = [row[pi] as f32, row[pi + 1] as f32, row[pi + 2] as f32, row[pi + 3] as f32];
            let out = [
                filtered[fi] as f32,
                filtered[fi + 1] as f32,
                filtered[fi + 2] as f32,
                filtered[fi + 3] as f32,
            ];
            write_weighted(&mut row[pi..pi + 4], src, out, cov);
        }
    });
}

/// Build the output of a spatial effect.  `processor` gets the source and
/// the cell and returns the new RGBA.
fn spatial<F>(layer: &Layer, processor: F) -> Vec<u8>
where
    F: Fn(&Source<'_>, i64, i64) -> [f32; 4] + Sync,
{
    let w = layer.width() as usize;
    let h = layer.height() as usize;
    let src = Source { raw: layer.pixels.as_raw(), w, h };
    let mut out = vec![0u8; w * h * 4];
    out.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let px = processor(&src, x as i64, y as i64);
            for c in 0..4 {
                row[x * 4 + c] = px[c].round().clamp(0.0, 255.0) as u8;
            }
        }
    });
    out
}

/// Normalised 1-D gaussian kernel of `round(r)*2+1` taps, sigma `r/3`.
fn gaussian_kernel(radius: f32) -> Vec<f32> {
    let r = radius.max(0.0).round() as i32;
    let sigma = if radius / 3.0 > 0.0 { radius / 3.0 } else { 1.0 };
    let mut k: Vec<f32> = (-r..=r).map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp()).collect();
    let sum: f32 = k.iter().sum();
    for v in &mut k {
        *v /= sum;
    }
    k
}

/// Horizontal then vertical pass of a symmetric 1-D kernel, all channels.
fn separable_convolve(layer: &Layer, kernel: &[f32]) -> Vec<u8> {
    let w = layer.width() as usize;
    let h = layer.height() as usize;
    let half = (kernel.len() / 2) as i64;
    let src = layer.pixels.as_raw();

    let mut horiz = vec![0f32; w * h * 4];
    horiz.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let mut acc = [0f32; 4];
            for (k, &wt) in kernel.iter().enumerate() {
                let sx = (x as i64 + k as i64 - half).clamp(0, w as i64 - 1) as usize;
                let si = (y * w + sx) * 4;
                for c in 0..4 {
                    acc[c] += src[si + c] as f32 * wt;
                }
            }
            row[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });

    let mut out = vec![0u8; w * h * 4];
    out.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let mut acc = [0f32; 4];
            for (k, &wt) in kernel.iter().enumerate() {
                let sy = (y as i64 + k as i64 - half).clamp(0, h as i64 - 1) as usize;
                let si = (sy * w + x) * 4;
                for c in 0..4 {
                    acc[c] += horiz[si + c] * wt;
                }
            }
            for c in 0..4 {
                row[x * 4 + c] = acc[c].round().clamp(0.0, 255.0) as u8;
            }
        }
    });
    out
}

/// Deterministic per-pixel hash.
fn hash_u32(mut x: u32) -> u32 {
    x ^= x >> 17;
    x = x.wrapping_mul(0xED5A_D4BB);
    x ^= x >> 11;
    x = x.wrapping_mul(0xAC4C_1B51);
    x ^= x >> 15;
    x = x.wrapping_mul(0x3184_8BAB);
    x ^= x >> 14;
    x
}

/// Hash to f32 in [0, 1).
fn hash_f32(x: u32, y: u32, seed: u32) -> f32 {
    let h = hash_u32(x.wrapping_mul(0x27D4_EB2F) ^ y.wrapping_mul(0x1656_67B1) ^ seed);
    (h >> 8) as f32 / 16_777_216.0
}

// ============================================================================
// BLUR
// ============================================================================

pub fn gaussian_blur(layer: &mut Layer, selection: &SelectionMask, radius: f32) {
    if radius <= 0.0 {
        return;
    }
    let out = separable_convolve(layer, &gaussian_kernel(radius));
    commit_filtered(layer, selection, &out);
}

/// Mean over a `(2r+1)²` window.
pub fn box_blur(layer: &mut Layer, selection: &SelectionMask, radius: u32) {
    if radius == 0 {
        return;
    }
    let taps = radius as usize * 2 + 1;
    let out = separable_convolve(layer, &vec![1.0 / taps as f32; taps]);
    commit_filtered(layer, selection, &out);
}

/// Average of samples along a line through each pixel.
/// `angle`: degrees, `distance`: line length in pixels.
pub fn motion_blur(layer: &mut Layer, selection: &SelectionMask, angle: f32, distance: u32) {
    if distance == 0 {
        return;
    }
    let (sin, cos) = angle.to_radians().sin_cos();
    let half = distance as f32 / 2.0;
    let out = spatial(layer, |src, x, y| {
        let mut acc = [0f32; 4];
        for i in 0..=distance {
            let t = i as f32 - half;
            let p = src.at(x + (cos * t).round() as i64, y + (sin * t).round() as i64);
            for c in 0..4 {
                acc[c] += p[c];
            }
        }
        acc.map(|v| v / (distance + 1) as f32)
    });
    commit_filtered(layer, selection, &out);
}

// ============================================================================
// SHARPEN
// ============================================================================

/// 3x3 cross kernel: centre `1 + 4a`, arms `-a`.  Alpha is preserved.
pub fn sharpen(layer: &mut Layer, selection: &SelectionMask, amount: f32) {
    let out = spatial(layer, |src, x, y| {
        let c = src.at(x, y);
        let n = [src.at(x, y - 1), src.at(x - 1, y), src.at(x + 1, y), src.at(x, y + 1)];
        let mut px = c;
        for ch in 0..3 {
            let arms: f32 = n.iter().map(|p| p[ch]).sum();
            px[ch] = c[ch] * (1.0 + 4.0 * amount) - arms * amount;
        }
        px
    });
    commit_filtered(layer, selection, &out);
}

/// Add back the difference from a gaussian blur where it reaches
/// `threshold`.  `amount` is a percentage.
pub fn unsharp_mask(layer: &mut Layer, selection: &SelectionMask, radius: f32, amount: f32, threshold: f32) {
    let blurred = separable_convolve(layer, &gaussian_kernel(radius));
    let w = layer.width() as usize;
    let out = spatial(layer, |src, x, y| {
        let o = src.at(x, y);
        let bi = (y as usize * w + x as usize) * 4;
        let mut px = o;
        for c in 0..3 {
            let diff = o[c] - blurred[bi + c] as f32;
            if diff.abs() >= threshold {
                px[c] = o[c] + diff * amount / 100.0;
            }
        }
        px
    });
    commit_filtered(layer, selection, &out);
}

// ============================================================================
// NOISE
// ============================================================================

/// Uniform noise in `±amount`.  `monochrome` shifts all channels together.
/// The same `seed` always produces the same grain.
pub fn add_noise(layer: &mut Layer, selection: &SelectionMask, amount: f32, monochrome: bool, seed: u32) {
    let out = spatial(layer, |src, x, y| {
        let mut px = src.at(x, y);
        let (ux, uy) = (x as u32, y as u32);
        let mono = (hash_f32(ux, uy, seed) - 0.5) * amount * 2.0;
        for c in 0..3 {
            px[c] += if monochrome {
                mono
            } else {
                (hash_f32(ux, uy, seed.wrapping_add(c as u32 + 1)) - 0.5) * amount * 2.0
            };
        }
        px
    });
    commit_filtered(layer, selection, &out);
}

/// Per-channel median of the `(2r+1)²` window.  Alpha is preserved.
pub fn median(layer: &mut Layer, selection: &SelectionMask, radius: u32) {
    if radius == 0 {
        return;
    }
    let r = radius as i64;
    let out = spatial(layer, |src, x, y| {
        let mut window: [Vec<f32>; 3] = Default::default();
        for dy in -r..=r {
            for dx in -r..=r {
                let p = src.at(x + dx, y + dy);
                for c in 0..3 {
                    window[c].push(p[c]);
                }
            }
        }
        let mut px = src.at(x, y);
        for c in 0..3 {
            let mid = window[c].len() / 2;
            let (_, m, _) = window[c].select_nth_unstable_by(mid, f32::total_cmp);
            px[c] = *m;
        }
        px
    });
    commit_filtered(layer, selection, &out);
}

// ============================================================================
// STYLIZE
// ============================================================================

/// Replace each `block`-sized tile with its average colour.
pub fn pixelate(layer: &mut Layer, selection: &SelectionMask, block: u32) {
    if block <= 1 {
        return;
    }
    let b = block as i64;
    let out = spatial(layer, |src, x, y| {
        let (bx, by) = (x - x % b, y - y % b);
        let mut acc = [0f32; 4];
        let mut n = 0.0;
        for ty in by..(by + b).min(src.h as i64) {
            for tx in bx..(bx + b).min(src.w as i64) {
                let p = src.at(tx, ty);
                for c in 0..4 {
                    acc[c] += p[c];
                }
                n += 1.0;
            }
        }
        acc.map(|v| v / n)
    });
    commit_filtered(layer, selection, &out);
}

/// Relief kernel over RGB.  Alpha is preserved.
pub fn emboss(layer: &mut Layer, selection: &SelectionMask) {
    const KERNEL: [[f32; 3]; 3] = [[-2.0, -1.0, 0.0], [-1.0, 1.0, 1.0], [0.0, 1.0, 2.0]];
    let out = spatial(layer, |src, x, y| {
        let mut px = src.at(x, y);
        let mut acc = [0f32; 3];
        for (ky, row) in KERNEL.iter().enumerate() {
            for (kx, &k) in row.iter().enumerate() {
                let p = src.at(x + kx as i64 - 1, y + ky as i64 - 1);
                for c in 0..3 {
                    acc[c] += p[c] * k;
                }
            }
        }
        px[..3].copy_from_slice(&acc);
        px
    });
    commit_filtered(layer, selection, &out);
}

/// Darken towards the corners.  `amount`: 0..100.
pub fn vignette(layer: &mut Layer, selection: &SelectionMask, amount: f32) {
    let (w, h) = (layer.width() as f32, layer.height() as f32);
    let (cx, cy) = (w / 2.0, h / 2.0);
    let max_d = (cx * cx + cy * cy).sqrt().max(1.0);
    let strength = amount.clamp(0.0, 100.0) / 100.0;
    adjustments::apply_pixel_transform(layer, selection, move |x, y, [r, g, b, a]| {
        let (dx, dy) = (x as f32 + 0.5 - cx, y as f32 + 0.5 - cy);
        let d = (dx * dx + dy * dy).sqrt() / max_d;
        let f = 1.0 - strength * d * d;
        [r * f, g * f, b * f, a]
    });
}
