use std::path::PathBuf;

use clap::Parser;
use image::{GenericImageView, Rgba, RgbaImage};
use uuid::Uuid;

use paintcore::cli::{self, CliArgs};
use paintcore::io;

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("paintcore-cli-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// 20x20 transparent image with an opaque 6x4 block at (5, 7).
fn sprite(dir: &PathBuf, name: &str) -> PathBuf {
    let mut img = RgbaImage::new(20, 20);
    for y in 7..11 {
        for x in 5..11 {
            img.put_pixel(x, y, Rgba([0, 128, 0, 255]));
        }
    }
    let path = dir.join(name);
    io::save_png(&img, &path).unwrap();
    path
}

fn run(args: &[&str]) -> Result<usize, String> {
    let mut full = vec!["paintcore"];
    full.extend_from_slice(args);
    cli::run_batch(&CliArgs::try_parse_from(full).unwrap())
}

#[test]
fn crop_to_opaque_pixels() {
    let dir = temp_dir();
    let input = sprite(&dir, "a.png");
    let output = dir.join("out.png");

    let code = run(&["-i", input.to_str().unwrap(), "--crop-to-selection", "-o", output.to_str().unwrap()]);
    assert_eq!(code, Ok(0));
    let out = image::open(&output).unwrap().to_rgba8();
    assert_eq!(out.dimensions(), (6, 4));

    let grown = dir.join("grown.png");
    let code = run(&[
        "-i",
        input.to_str().unwrap(),
        "--grow",
        "1",
        "--crop-to-selection",
        "-o",
        grown.to_str().unwrap(),
    ]);
    assert_eq!(code, Ok(0));
    assert_eq!(image::open(&grown).unwrap().dimensions(), (8, 6));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn batch_writes_into_output_dir_as_projects() {
    let dir = temp_dir();
    sprite(&dir, "one.png");
    sprite(&dir, "two.png");
    let out_dir = dir.join("out");
    let pattern = format!("{}/*.png", dir.display());

    let code = run(&["-i", &pattern, "--rotate", "cw", "--format", "pcp", "--output-dir", out_dir.to_str().unwrap()]);
    assert_eq!(code, Ok(0));
    for name in ["one.pcp", "two.pcp"] {
        let project = io::load_project(&out_dir.join(name)).unwrap();
        assert_eq!((project.document.width, project.document.height), (20, 20));
        assert_eq!(project.document.layers.len(), 1);
    }
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn empty_selection_crop_fails() {
    let dir = temp_dir();
    let input = dir.join("clear.png");
    io::save_png(&RgbaImage::new(4, 4), &input).unwrap();
    let code = run(&["-i", input.to_str().unwrap(), "--crop-to-selection", "-o", dir.join("x.png").to_str().unwrap()]);
    assert_eq!(code, Ok(1));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn single_output_rejects_multiple_inputs() {
    let dir = temp_dir();
    let a = sprite(&dir, "a.png");
    let b = sprite(&dir, "b.png");
    let code = run(&["-i", a.to_str().unwrap(), b.to_str().unwrap(), "-o", dir.join("o.png").to_str().unwrap()]);
    assert!(code.is_err());
    std::fs::remove_dir_all(&dir).ok();
}
