use image::Rgba;

use paintcore::canvas::Layer;
use paintcore::geometry::DocPoint;
use paintcore::selection::{SelectionMask, SelectionMode};

const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

#[test]
fn ring_traces_two_loops() {
    let mut sel = SelectionMask::new(12, 12);
    sel.set_from_rectangle(2.0, 2.0, 10.0, 10.0, SelectionMode::Replace);
    sel.set_from_rectangle(4.0, 4.0, 8.0, 8.0, SelectionMode::Subtract);

    let loops = sel.boundary_loops();
    assert_eq!(loops.len(), 2);
    for l in &loops {
        assert_eq!(l.len(), 4);
    }
}

#[test]
fn polygon_then_add_rectangle() {
    let mut sel = SelectionMask::new(30, 30);
    let tri = [DocPoint::new(0.0, 0.0), DocPoint::new(20.0, 0.0), DocPoint::new(0.0, 20.0)];
    sel.set_from_polygon(&tri, SelectionMode::Replace);
    assert!(sel.contains_point(3.0, 3.0));
    assert!(!sel.contains_point(15.0, 15.0));

    sel.set_from_rectangle(14.0, 14.0, 18.0, 18.0, SelectionMode::Add);
    assert!(sel.contains_point(15.0, 15.0));
    assert!(sel.contains_point(3.0, 3.0));
    assert_eq!(sel.bounding_box().map(|r| (r.right(), r.bottom())), Some((20, 20)));
}

#[test]
fn wand_on_offset_layer_stays_inside_layer() {
    let mut layer = Layer::filled("patch", 5, 5, RED);
    layer.x = 5;
    layer.y = 5;
    let mut sel = SelectionMask::new(20, 20);
    sel.flood_fill_select(DocPoint::new(6.0, 6.0), &layer, 0, SelectionMode::Replace, true);

    let bbox = sel.bounding_box().unwrap();
    assert_eq!((bbox.x, bbox.y, bbox.w, bbox.h), (5, 5, 5, 5));
}

#[test]
fn global_wand_finds_disjoint_regions() {
    let mut layer = Layer::filled("bg", 10, 10, Rgba([255, 255, 255, 255]));
    layer.pixels.put_pixel(1, 1, RED);
    layer.pixels.put_pixel(8, 8, RED);
    let mut sel = SelectionMask::new(10, 10);

    sel.flood_fill_select(DocPoint::new(1.0, 1.0), &layer, 10, SelectionMode::Replace, true);
    assert_eq!(sel.value(8, 8), 0);

    sel.flood_fill_select(DocPoint::new(1.0, 1.0), &layer, 10, SelectionMode::Replace, false);
    assert_eq!(sel.value(1, 1), 255);
    assert_eq!(sel.value(8, 8), 255);
    assert_eq!(sel.value(4, 4), 0);
}

#[test]
fn expand_then_intersect() {
    let mut sel = SelectionMask::new(20, 20);
    sel.set_from_rectangle(8.0, 8.0, 12.0, 12.0, SelectionMode::Replace);
    sel.expand(2);
    assert_eq!(sel.bounding_box().map(|r| (r.x, r.w)), Some((6, 8)));

    sel.set_from_rectangle(0.0, 0.0, 10.0, 20.0, SelectionMode::Intersect);
    assert_eq!(sel.bounding_box().map(|r| (r.x, r.w)), Some((6, 4)));
}

fn brute_bounds(sel: &SelectionMask) -> Option<(i32, i32, i32, i32)> {
    let w = sel.width() as i32;
    let mut out: Option<(i32, i32, i32, i32)> = None;
    for (i, &v) in sel.data().iter().enumerate() {
        if v == 0 {
            continue;
        }
        let (x, y) = (i as i32 % w, i as i32 / w);
        out = Some(match out {
            None => (x, y, x + 1, y + 1),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x + 1), y1.max(y + 1)),
        });
    }
    out
}

#[test]
fn combine_laws_and_tight_bbox() {
    let mut a = SelectionMask::new(32, 32);
    a.set_from_ellipse(2.0, 3.0, 20.0, 25.0, SelectionMode::Replace);
    let mut b = SelectionMask::new(32, 32);
    b.set_from_rectangle(10.0, 0.0, 30.0, 18.0, SelectionMode::Replace);
    b.feather(2);

    let mut inter = a.clone();
    inter.combine(b.data(), SelectionMode::Intersect);
    let mut union = a.clone();
    union.combine(b.data(), SelectionMode::Add);
    for i in 0..a.data().len() {
        assert!(inter.data()[i] <= a.data()[i] && inter.data()[i] <= b.data()[i]);
        assert!(union.data()[i] >= a.data()[i] && union.data()[i] >= b.data()[i]);
    }

    let mut twice = a.clone();
    twice.invert();
    twice.invert();
    assert_eq!(twice.data(), a.data());

    for sel in [&a, &b, &inter, &union] {
        let expected = brute_bounds(sel);
        let actual = sel.bounding_box().map(|r| (r.x, r.y, r.right(), r.bottom()));
        assert_eq!(actual, expected);
    }
}
