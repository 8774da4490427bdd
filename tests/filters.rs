use image::Rgba;

use paintcore::components::tools::{Modifiers, ToolKind};
use paintcore::geometry::DocPoint;
use paintcore::{EditingContext, Filter};

fn p(x: f32, y: f32) -> DocPoint {
    DocPoint::new(x, y)
}

fn pixel(ctx: &EditingContext, x: u32, y: u32) -> Rgba<u8> {
    *ctx.document.layers[ctx.document.active_layer_index].pixels.get_pixel(x, y)
}

fn select_rect(ctx: &mut EditingContext, from: DocPoint, to: DocPoint) {
    ctx.select_tool(ToolKind::RectSelect);
    ctx.pointer_down(from, Modifiers::NONE, 1.0);
    ctx.pointer_move(to, Modifiers::NONE, 1.0);
    ctx.pointer_up(to, Modifiers::NONE);
}

/// Opaque colour ramp, left to right, with one white speck at (10, 8).
fn ramp_document() -> EditingContext {
    let mut ctx = EditingContext::new("ramp", 32, 16);
    for (x, _, px) in ctx.document.layers[0].pixels.enumerate_pixels_mut() {
        let v = (x * 8) as u8;
        *px = Rgba([v, v / 2, 255 - v, 255]);
    }
    ctx.document.layers[0].pixels.put_pixel(10, 8, Rgba([255, 255, 255, 255]));
    ctx.refresh();
    ctx
}

fn every_filter() -> Vec<Filter> {
    vec![
        Filter::BrightnessContrast { brightness: 20.0, contrast: 30.0 },
        Filter::HueSaturation { hue: 90.0, saturation: -20.0, lightness: 10.0 },
        Filter::Invert,
        Filter::Desaturate,
        Filter::Levels { in_black: 20.0, gamma: 1.4, in_white: 230.0, out_black: 0.0, out_white: 255.0 },
        Filter::Curves { points: vec![(0.0, 30.0), (128.0, 100.0), (255.0, 255.0)] },
        Filter::ColorBalance { shadows: [10.0, 0.0, 0.0], midtones: [0.0, 20.0, 0.0], highlights: [0.0, 0.0, -30.0] },
        Filter::Threshold { level: 128.0 },
        Filter::Posterize { levels: 3 },
        Filter::GaussianBlur { radius: 3.0 },
        Filter::BoxBlur { radius: 2 },
        Filter::Sharpen { amount: 0.8 },
        Filter::UnsharpMask { radius: 2.0, amount: 150.0, threshold: 0.0 },
        Filter::Noise { amount: 30.0, monochrome: false, seed: 3 },
        Filter::Median { radius: 1 },
        Filter::MotionBlur { angle: 0.0, distance: 6 },
        Filter::Pixelate { block: 4 },
        Filter::Emboss,
        Filter::Vignette { amount: 80.0 },
    ]
}

#[test]
fn each_filter_is_one_undoable_step() {
    for filter in every_filter() {
        let mut ctx = ramp_document();
        let before = ctx.document.layers[0].pixels.clone();
        assert!(ctx.apply_filter(&filter), "{}", filter.name());
        assert_eq!(ctx.history.labels(), vec![filter.name()]);
        assert_ne!(ctx.document.layers[0].pixels, before, "{} changed nothing", filter.name());
        assert!(ctx.is_dirty);

        assert_eq!(ctx.undo().as_deref(), Some(filter.name()));
        assert_eq!(ctx.document.layers[0].pixels, before);
    }
}

#[test]
fn filters_respect_the_selection() {
    let mut ctx = EditingContext::new("doc", 20, 20);
    select_rect(&mut ctx, p(0.0, 0.0), p(10.0, 20.0));
    assert!(ctx.apply_filter(&Filter::Invert));
    assert_eq!(pixel(&ctx, 5, 5), Rgba([0, 0, 0, 255]));
    assert_eq!(pixel(&ctx, 15, 5), Rgba([255, 255, 255, 255]));
}

#[test]
fn blur_stays_inside_selection() {
    let mut ctx = ramp_document();
    let before = ctx.document.layers[0].pixels.clone();
    select_rect(&mut ctx, p(8.0, 0.0), p(24.0, 16.0));
    assert!(ctx.apply_filter(&Filter::BoxBlur { radius: 3 }));
    let after = &ctx.document.layers[0].pixels;
    assert_eq!(after.get_pixel(4, 8), before.get_pixel(4, 8));
    assert_eq!(after.get_pixel(28, 8), before.get_pixel(28, 8));
    assert_ne!(after.get_pixel(8, 8), before.get_pixel(8, 8));
}

#[test]
fn refused_filters_leave_no_history() {
    let mut ctx = EditingContext::new("doc", 20, 20);
    ctx.set_layer_locked(0, true);
    assert!(!ctx.apply_filter(&Filter::Invert));
    assert_eq!(ctx.history.labels(), vec!["Lock Layer"]);
    ctx.set_layer_locked(0, false);

    // A small layer pushed off to the side of the selection.
    let idx = ctx.add_layer(None);
    ctx.document.layers[idx].x = 15;
    select_rect(&mut ctx, p(0.0, 0.0), p(5.0, 5.0));
    ctx.document.layers[idx].pixels = image::RgbaImage::new(4, 4);
    let len = ctx.history.len();
    assert!(!ctx.apply_filter(&Filter::GaussianBlur { radius: 2.0 }));
    assert_eq!(ctx.history.len(), len);
}

#[test]
fn filtering_a_text_layer_rasterizes_it() {
    let mut ctx = EditingContext::new("doc", 20, 20);
    ctx.add_text_layer(Default::default(), 2, 2);
    assert!(ctx.apply_filter(&Filter::Invert));
    let layer = &ctx.document.layers[ctx.document.active_layer_index];
    assert_eq!(layer.kind, paintcore::canvas::LayerKind::Raster);
    assert!(layer.text.is_none());
}
