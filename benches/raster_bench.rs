use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::Rgba;

use paintcore::canvas::{BlendMode, Document};
use paintcore::compositor::CompositingEngine;
use paintcore::geometry::DocPoint;
use paintcore::ops::raster;
use paintcore::selection::{SelectionMask, SelectionMode};
use paintcore::stroke::{BrushParams, StrokeBuffer};

const W: u32 = 1024;
const H: u32 = 768;

fn layered_document() -> Document {
    let mut doc = Document::new(W, H);
    for i in 0..4 {
        let idx = doc.add_layer(None);
        let layer = &mut doc.layers[idx];
        layer.opacity = 70;
        layer.blend_mode = if i % 2 == 0 { BlendMode::Multiply } else { BlendMode::Screen };
        for (x, y, px) in layer.pixels.enumerate_pixels_mut() {
            *px = Rgba([(x % 256) as u8, (y % 256) as u8, (i * 60) as u8, 200]);
        }
    }
    doc
}

fn bench_composite(c: &mut Criterion) {
    let doc = layered_document();
    let mut engine = CompositingEngine::new(W, H);
    c.bench_function("composite 5 layers 1024x768", |b| b.iter(|| engine.composite(black_box(&doc))));
}

fn bench_wand(c: &mut Criterion) {
    let doc = Document::new(W, H);
    let mut sel = SelectionMask::new(W, H);
    c.bench_function("magic wand full canvas", |b| {
        b.iter(|| sel.flood_fill_select(DocPoint::new(10.0, 10.0), &doc.layers[0], 32, SelectionMode::Replace, true))
    });
}

fn bench_feather(c: &mut Criterion) {
    let mut mask = vec![0u8; (W * H) as usize];
    for y in 200..500 {
        for x in 300..700 {
            mask[(y * W + x) as usize] = 255;
        }
    }
    c.bench_function("box blur r=8", |b| b.iter(|| raster::box_blur(black_box(&mask), W, H, 8)));
}

fn bench_stroke(c: &mut Criterion) {
    let mut doc = Document::new(W, H);
    let sel = SelectionMask::new(W, H);
    let mut stroke = StrokeBuffer::new(W, H);
    let brush = BrushParams { size: 40.0, ..BrushParams::default() };
    c.bench_function("brush stroke 600px", |b| {
        b.iter(|| {
            let layer = &mut doc.layers[0];
            stroke.begin(layer);
            stroke.line(DocPoint::new(100.0, 100.0), DocPoint::new(700.0, 500.0), &brush);
            stroke.flush(layer, &sel, false);
            stroke.end()
        })
    });
}

criterion_group!(benches, bench_composite, bench_wand, bench_feather, bench_stroke);
criterion_main!(benches);
