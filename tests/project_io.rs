use std::path::PathBuf;

use image::{Rgba, RgbaImage};
use uuid::Uuid;

use paintcore::canvas::BlendMode;
use paintcore::io::{self, ProjectError};
use paintcore::EditingContext;

fn temp_path(ext: &str) -> PathBuf {
    std::env::temp_dir().join(format!("paintcore-test-{}.{}", Uuid::new_v4(), ext))
}

#[test]
fn project_round_trip_keeps_layers() {
    let mut ctx = EditingContext::new("doc", 24, 16);
    let top = ctx.add_layer(Some("Ink"));
    ctx.document.layers[top].pixels.put_pixel(3, 4, Rgba([10, 20, 30, 200]));
    ctx.document.layers[top].x = 2;
    ctx.set_layer_opacity(top, 60);
    ctx.set_layer_blend_mode(top, BlendMode::Multiply);
    ctx.colors.fg = Rgba([1, 2, 3, 255]);
    assert!(ctx.is_dirty);

    let path = temp_path("pcp");
    ctx.save_project(&path).unwrap();
    assert!(!ctx.is_dirty);
    assert_eq!(ctx.name, path.file_name().unwrap().to_string_lossy());

    let back = EditingContext::open(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!((back.document.width, back.document.height), (24, 16));
    assert_eq!(back.document.layers.len(), 2);
    let ink = &back.document.layers[1];
    assert_eq!(ink.name, "Ink");
    assert_eq!(ink.opacity, 60);
    assert_eq!(ink.blend_mode, BlendMode::Multiply);
    assert_eq!(ink.x, 2);
    assert_eq!(*ink.pixels.get_pixel(3, 4), Rgba([10, 20, 30, 200]));
    assert_eq!(back.colors.fg, Rgba([1, 2, 3, 255]));
    assert!(back.selection.is_empty());
    assert!(back.history.is_empty());
    assert!(!back.is_dirty);
}

#[test]
fn png_export_flattens_visible_layers() {
    let mut ctx = EditingContext::new("doc", 8, 8);
    let hidden = ctx.add_layer(Some("hidden"));
    ctx.document.layers[hidden].pixels.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
    ctx.set_layer_visible(hidden, false);

    let path = temp_path("png");
    ctx.export_png(&path).unwrap();
    assert!(ctx.is_dirty);

    let opened = EditingContext::open(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(opened.document.layers.len(), 1);
    assert_eq!(*opened.document.layers[0].pixels.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
}

#[test]
fn imported_image_is_named_after_stem() {
    let path = temp_path("png");
    let img = RgbaImage::from_pixel(5, 3, Rgba([9, 9, 9, 255]));
    io::save_png(&img, &path).unwrap();

    let ctx = EditingContext::open(&path).unwrap();
    std::fs::remove_file(&path).ok();
    let stem = path.file_stem().unwrap().to_string_lossy().to_string();
    assert_eq!(ctx.document.layers[0].name, stem);
    assert_eq!((ctx.document.width, ctx.document.height), (5, 3));
}

#[test]
fn garbage_project_is_rejected() {
    let path = temp_path("pcp");
    std::fs::write(&path, b"definitely not a project").unwrap();
    let result = EditingContext::open(&path);
    std::fs::remove_file(&path).ok();
    assert!(result.is_err());
}

#[test]
fn missing_file_is_an_io_error() {
    let result = EditingContext::open(&temp_path("pcp"));
    assert!(matches!(result, Err(ProjectError::Io(_))));
}
