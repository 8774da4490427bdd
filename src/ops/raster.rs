// ============================================================================
// RASTER KERNELS — scanline polygon fill, flood fill, morphology, box blur
// ============================================================================
//
// All kernels operate on flat single-channel `u8` buffers of `width * height`
// (row-major) so the selection mask, feathering and fill tools can share them.

use crate::geometry::Rect;

/// Even-odd scanline fill of `points` into `out`, writing 255 into covered cells.
///
/// Rows are sampled at integer y; an edge crosses row `y` when it spans
/// `[min(y1,y2), max(y1,y2))`.  Crossing pairs are filled between their
/// rounded, clamped x positions (half-open).  Fewer than three points is a no-op.
pub fn fill_polygon(points: &[(f32, f32)], width: u32, height: u32, out: &mut [u8]) {
    if points.len() < 3 || width == 0 || height == 0 {
        return;
    }
    let w = width as i32;
    let h = height as i32;
    debug_assert_eq!(out.len(), (width * height) as usize);

    let (min_y, max_y) = points
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), p| (lo.min(p.1), hi.max(p.1)));
    let y0 = (min_y.floor() as i32).max(0);
    let y1 = (max_y.ceil() as i32).min(h - 1);

    let mut xs: Vec<f32> = Vec::with_capacity(16);
    for y in y0..=y1 {
        let yf = y as f32;
        xs.clear();
        for i in 0..points.len() {
            let p1 = points[i];
            let p2 = points[(i + 1) % points.len()];
            if (p1.1 <= yf && yf < p2.1) || (p2.1 <= yf && yf < p1.1) {
                let t = (yf - p1.1) / (p2.1 - p1.1);
                xs.push(p1.0 + t * (p2.0 - p1.0));
            }
        }
        xs.sort_by(|a, b| a.total_cmp(b));

        let row = (y * w) as usize;
        for pair in xs.chunks_exact(2) {
            let xa = (pair[0].clamp(0.0, w as f32)).round() as i32;
            let xb = (pair[1].clamp(0.0, w as f32)).round() as i32;
            for x in xa.max(0)..xb.min(w) {
                out[row + x as usize] = 255;
            }
        }
    }
}

/// 4-connected flood fill from `(start_x, start_y)`.
///
/// `matches(idx)` decides whether a flat cell index belongs to the region.
/// `out` doubles as the visited array; covered cells are set to 255.
/// Returns the bounding box of the filled region, or `None` if the seed
/// itself does not match.
pub fn flood_fill<F>(
    width: u32,
    height: u32,
    start_x: i32,
    start_y: i32,
    out: &mut [u8],
    mut matches: F,
) -> Option<Rect>
where
    F: FnMut(usize) -> bool,
{
    if start_x < 0 || start_y < 0 || start_x >= width as i32 || start_y >= height as i32 {
        return None;
    }
    let wu = width as usize;
    let seed = start_y as usize * wu + start_x as usize;
    if out[seed] != 0 || !matches(seed) {
        return None;
    }

    let (mut min_x, mut min_y) = (start_x as usize, start_y as usize);
    let (mut max_x, mut max_y) = (min_x, min_y);

    // Packed flat indices keep the stack small.
    let mut stack: Vec<usize> = Vec::with_capacity(4096);
    out[seed] = 255;
    stack.push(seed);

    while let Some(idx) = stack.pop() {
        let x = idx % wu;
        let y = idx / wu;
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);

        let neighbours = [
            (x > 0).then(|| idx - 1),
            (x + 1 < wu).then(|| idx + 1),
            (y > 0).then(|| idx - wu),
            (y + 1 < height as usize).then(|| idx + wu),
        ];
        for ni in neighbours.into_iter().flatten() {
            if out[ni] == 0 && matches(ni) {
                out[ni] = 255;
                stack.push(ni);
            }
        }
    }

    Some(Rect::from_corners(
        min_x as i32,
        min_y as i32,
        max_x as i32 + 1,
        max_y as i32 + 1,
    ))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Morphology {
    Dilate,
    Erode,
}

/// Square (Chebyshev) neighbourhood max/min of radius `radius`.
///
/// Neighbours outside the buffer are ignored rather than treated as zero, so
/// eroding a fully selected mask leaves it fully selected.  Run as two 1-D
/// passes since a square window's extremum separates per axis.
pub fn morphology(src: &[u8], width: u32, height: u32, radius: u32, op: Morphology) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    if radius == 0 || w == 0 || h == 0 {
        return src.to_vec();
    }
    let r = radius as usize;
    let pick = |a: u8, b: u8| match op {
        Morphology::Dilate => a.max(b),
        Morphology::Erode => a.min(b),
    };
    let seed = match op {
        Morphology::Dilate => 0u8,
        Morphology::Erode => 255u8,
    };

    let mut horiz = vec![0u8; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let lo = x.saturating_sub(r);
            let hi = (x + r).min(w - 1);
            horiz[y * w + x] = row[lo..=hi].iter().fold(seed, |acc, &v| pick(acc, v));
        }
    }

    let mut out = vec![0u8; w * h];
    for x in 0..w {
        for y in 0..h {
            let lo = y.saturating_sub(r);
            let hi = (y + r).min(h - 1);
            let mut best = seed;
            for ny in lo..=hi {
                best = pick(best, horiz[ny * w + x]);
            }
            out[y * w + x] = best;
        }
    }
    out
}

/// Separable sliding-window box blur with edge-count normalisation.
///
/// Each output cell is the mean of the in-bounds cells of a
/// `(2r+1) x (2r+1)` window.
pub fn box_blur(src: &[u8], width: u32, height: u32, radius: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    if radius == 0 || w == 0 || h == 0 {
        return src.to_vec();
    }
    let r = radius as usize;

    let mut horiz = vec![0f32; w * h];
    for y in 0..h {
        let row = y * w;
        let mut sum = 0f32;
        let mut count = 0f32;
        for x in 0..=r.min(w - 1) {
            sum += src[row + x] as f32;
            count += 1.0;
        }
        for x in 0..w {
            horiz[row + x] = sum / count;
            if x >= r {
                sum -= src[row + x - r] as f32;
                count -= 1.0;
            }
            if x + r + 1 < w {
                sum += src[row + x + r + 1] as f32;
                count += 1.0;
            }
        }
    }

    let mut out = vec![0u8; w * h];
    for x in 0..w {
        let mut sum = 0f32;
        let mut count = 0f32;
        for y in 0..=r.min(h - 1) {
            sum += horiz[y * w + x];
            count += 1.0;
        }
        for y in 0..h {
            out[y * w + x] = (sum / count).round().clamp(0.0, 255.0) as u8;
            if y >= r {
                sum -= horiz[(y - r) * w + x];
                count -= 1.0;
            }
            if y + r + 1 < h {
                sum += horiz[(y + r + 1) * w + x];
                count += 1.0;
            }
        }
    }
    out
}

/// Tight bounding box of the non-zero cells, or `None` when all are zero.
pub fn nonzero_bounds(buf: &[u8], width: u32, height: u32) -> Option<Rect> {
    let w = width as usize;
    let (mut x0, mut y0, mut x1, mut y1) = (usize::MAX, usize::MAX, 0usize, 0usize);
    for y in 0..height as usize {
        let row = &buf[y * w..(y + 1) * w];
        let Some(first) = row.iter().position(|&v| v != 0) else { continue };
        let last = row.iter().rposition(|&v| v != 0).unwrap_or(first);
        x0 = x0.min(first);
        x1 = x1.max(last);
        y0 = y0.min(y);
        y1 = y;
    }
    if x0 == usize::MAX {
        return None;
    }
    Some(Rect::from_corners(x0 as i32, y0 as i32, x1 as i32 + 1, y1 as i32 + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_polygon_fills_half_open_interior() {
        let mut buf = vec![0u8; 20 * 20];
        fill_polygon(&[(2.0, 2.0), (8.0, 2.0), (8.0, 6.0), (2.0, 6.0)], 20, 20, &mut buf);
        let count = buf.iter().filter(|&&v| v == 255).count();
        assert_eq!(count, 6 * 4);
        assert_eq!(nonzero_bounds(&buf, 20, 20), Some(Rect::new(2, 2, 6, 4)));
    }

    #[test]
    fn degenerate_polygon_is_ignored() {
        let mut buf = vec![0u8; 16];
        fill_polygon(&[(0.0, 0.0), (3.0, 3.0)], 4, 4, &mut buf);
        assert!(buf.iter().all(|&v| v == 0));
    }

    #[test]
    fn bowtie_uses_even_odd_rule() {
        // Self-intersecting star: centre region is crossed twice and stays empty.
        let star = [(10.0, 0.0), (16.0, 19.0), (0.0, 7.0), (20.0, 7.0), (4.0, 19.0)];
        let mut buf = vec![0u8; 20 * 20];
        fill_polygon(&star, 20, 20, &mut buf);
        assert_eq!(buf[10 * 20 + 10], 0);
        assert_eq!(buf[8 * 20 + 2], 255);
    }

    #[test]
    fn flood_fill_stays_in_component() {
        // Two columns of ones separated by a zero column.
        let w = 5;
        let h = 3;
        let src: Vec<u8> = (0..w * h).map(|i| if i % w == 2 { 0 } else { 1 }).collect();
        let mut out = vec![0u8; (w * h) as usize];
        let bbox = flood_fill(w, h, 0, 0, &mut out, |i| src[i] == 1);
        assert_eq!(bbox, Some(Rect::new(0, 0, 2, 3)));
        assert_eq!(out.iter().filter(|&&v| v == 255).count(), 6);
        assert_eq!(out[4], 0);
    }

    #[test]
    fn dilate_then_erode_single_pixel() {
        let mut src = vec![0u8; 7 * 7];
        src[3 * 7 + 3] = 255;
        let grown = morphology(&src, 7, 7, 2, Morphology::Dilate);
        assert_eq!(nonzero_bounds(&grown, 7, 7), Some(Rect::new(1, 1, 5, 5)));
        let shrunk = morphology(&grown, 7, 7, 2, Morphology::Erode);
        assert_eq!(shrunk, src);
    }

    #[test]
    fn box_blur_preserves_flat_field_and_softens_edge() {
        let flat = vec![200u8; 9 * 9];
        assert_eq!(box_blur(&flat, 9, 9, 3), flat);

        let mut step = vec![0u8; 9];
        for v in step.iter_mut().skip(5) {
            *v = 255;
        }
        let blurred = box_blur(&step, 9, 1, 1);
        assert_eq!(blurred[0], 0);
        assert_eq!(blurred[8], 255);
        assert!(blurred[4] > 0 && blurred[4] < 255);
    }
}
