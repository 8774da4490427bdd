use image::Rgba;

use paintcore::canvas::Layer;
use paintcore::geometry::DocPoint;
use paintcore::selection::{SelectionMask, SelectionMode};
use paintcore::stroke::{BrushParams, StrokeBuffer};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

fn brush(size: f32, hardness: f32) -> BrushParams {
    BrushParams { size, hardness, color: Rgba([0, 0, 255, 255]), ..BrushParams::default() }
}

#[test]
fn stroke_never_leaves_the_selection() {
    let mut layer = Layer::filled("bg", 40, 40, WHITE);
    let mut sel = SelectionMask::new(40, 40);
    sel.set_from_ellipse(10.0, 10.0, 30.0, 30.0, SelectionMode::Replace);
    let mut sb = StrokeBuffer::new(40, 40);

    sb.begin(&layer);
    sb.line(DocPoint::new(0.0, 20.0), DocPoint::new(40.0, 20.0), &brush(16.0, 50.0));
    sb.flush(&mut layer, &sel, false);
    sb.end();

    for (x, y, px) in layer.pixels.enumerate_pixels() {
        if sel.value(x as i32, y as i32) == 0 {
            assert_eq!(*px, WHITE, "pixel ({x}, {y}) outside the selection changed");
        }
    }
    assert_ne!(*layer.pixels.get_pixel(20, 20), WHITE);
}

#[test]
fn repeated_flush_matches_single_flush() {
    let sel = SelectionMask::new(30, 30);
    let b = brush(10.0, 30.0);

    let mut once = Layer::filled("a", 30, 30, WHITE);
    let mut sb = StrokeBuffer::new(30, 30);
    sb.begin(&once);
    sb.dab(DocPoint::new(15.0, 15.0), &b);
    sb.flush(&mut once, &sel, false);

    let mut twice = Layer::filled("b", 30, 30, WHITE);
    let mut sb2 = StrokeBuffer::new(30, 30);
    sb2.begin(&twice);
    sb2.dab(DocPoint::new(15.0, 15.0), &b);
    sb2.flush(&mut twice, &sel, false);
    sb2.flush(&mut twice, &sel, false);

    assert_eq!(once.pixels, twice.pixels);
}

#[test]
fn offset_layer_receives_document_space_dabs() {
    let mut layer = Layer::new("small", 10, 10);
    layer.x = 20;
    layer.y = 20;
    let sel = SelectionMask::new(40, 40);
    let mut sb = StrokeBuffer::new(40, 40);

    sb.begin(&layer);
    sb.dab(DocPoint::new(25.0, 25.0), &brush(4.0, 100.0));
    sb.flush(&mut layer, &sel, false);
    let dirty = sb.end().unwrap();

    assert_eq!(layer.pixels.get_pixel(5, 5)[3], 255);
    assert_eq!(layer.pixels.get_pixel(0, 0)[3], 0);
    assert!(dirty.contains(25, 25));
}
