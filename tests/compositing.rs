use std::time::Duration;

use image::Rgba;

use paintcore::canvas::{BlendMode, Document, Layer};
use paintcore::compositor::CompositingEngine;
use paintcore::{EditingContext, EditorSettings};

#[test]
fn offset_layers_composite_in_document_space() {
    let mut doc = Document::new(10, 10);
    let mut patch = Layer::filled("patch", 3, 3, Rgba([0, 0, 255, 255]));
    patch.x = -1;
    patch.y = 8;
    doc.insert_layer(patch);

    let mut engine = CompositingEngine::new(1, 1);
    engine.composite(&doc);
    assert_eq!(engine.size(), (10, 10));
    assert_eq!(engine.sample_composite(0, 9), Some(Rgba([0, 0, 255, 255])));
    assert_eq!(engine.sample_composite(2, 9), Some(Rgba([255, 255, 255, 255])));
    assert_eq!(engine.sample_composite(0, 7), Some(Rgba([255, 255, 255, 255])));
    assert_eq!(engine.sample_composite(10, 0), None);
}

#[test]
fn layer_opacity_and_blend_apply() {
    let mut doc = Document::new(4, 4);
    let mut top = Layer::filled("top", 4, 4, Rgba([0, 0, 0, 255]));
    top.opacity = 50;
    doc.insert_layer(top);
    let mut engine = CompositingEngine::new(4, 4);
    engine.composite(&doc);
    let half = engine.sample_composite(1, 1).unwrap();
    assert!((126..=129).contains(&half[0]));

    doc.layers[1].opacity = 100;
    doc.layers[1].blend_mode = BlendMode::Screen;
    engine.composite(&doc);
    assert_eq!(engine.sample_composite(1, 1), Some(Rgba([255, 255, 255, 255])));
}

#[test]
fn ants_tick_only_with_selection() {
    let mut ctx = EditingContext::new("doc", 20, 20);
    assert!(!ctx.tick(Duration::from_millis(500)));

    ctx.select_all();
    let before = ctx.engine.overlay_surface().clone();
    assert!(before.pixels().any(|p| p[3] > 0));
    assert!(!ctx.tick(Duration::from_millis(10)));
    assert!(ctx.tick(Duration::from_millis(80)));
    assert_ne!(&before, ctx.engine.overlay_surface());
}

#[test]
fn grid_draws_on_overlay() {
    let mut ctx = EditingContext::new("doc", 40, 40);
    ctx.apply_settings(&EditorSettings { show_grid: true, grid_spacing: 16, ..Default::default() });
    let overlay = ctx.engine.overlay_surface();
    assert!(overlay.get_pixel(16, 3)[3] > 0);
    assert_eq!(overlay.get_pixel(15, 3)[3], 0);
}

#[test]
fn half_opacity_over_transparency() {
    let mut doc = Document::blank(4, 4);
    doc.layers[0] = Layer::filled("solid", 4, 4, Rgba([200, 100, 50, 255]));
    doc.layers[0].opacity = 50;
    let mut engine = CompositingEngine::new(4, 4);
    engine.composite(&doc);
    let p = engine.sample_composite(2, 2).unwrap();
    assert_eq!((p[0], p[1], p[2]), (200, 100, 50));
    assert!((127..=128).contains(&p[3]));
}
