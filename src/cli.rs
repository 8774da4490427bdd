// ============================================================================
// PaintCore CLI — headless batch processing via command-line arguments
// ============================================================================
//
// Usage examples:
//   paintcore -i photo.png --crop-to-selection -o trimmed.png
//   paintcore -i sprites/*.png --grow 2 --crop-to-selection --output-dir out/
//   paintcore -i scan.png --rotate cw --format pcp -o scan.pcp
//   paintcore -i project.pcp --flatten -o flat.png
//
// The crop selection is derived from the image's alpha: every pixel with
// non-zero alpha in the flattened image is selected.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, ValueEnum};

use crate::logger;
use crate::ops::canvas_ops::{FlipAxis, Interpolation, Rotation};
use crate::project::EditingContext;
use crate::selection::SelectionMode;
use crate::settings::EditorSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Png,
    Pcp,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Pcp => "pcp",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RotateArg {
    Cw,
    Ccw,
    #[value(name = "180")]
    Half,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FlipArg {
    H,
    V,
}

/// PaintCore headless image processor.
#[derive(Parser, Debug)]
#[command(
    name = "paintcore",
    about = "PaintCore headless batch image processor",
    long_about = "Load PNG images or PCP projects, apply document operations and save\n\
                  them as PNG or PCP without opening an editor.\n\n\
                  Example:\n  \
                  paintcore -i sprite.png --grow 1 --crop-to-selection -o out.png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.pcp").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format. Inferred from --output's extension when omitted, defaulting to png.
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Dilate the alpha-derived selection by N pixels.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub grow: u32,

    /// Erode the alpha-derived selection by N pixels.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub shrink: u32,

    /// Crop the document to the selection's bounding box.
    #[arg(long)]
    pub crop_to_selection: bool,

    /// Resize the image, e.g. "800x600".
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    pub resize: Option<(u32, u32)>,

    /// Rotate the whole document.
    #[arg(long, value_enum)]
    pub rotate: Option<RotateArg>,

    /// Mirror the whole document horizontally (h) or vertically (v).
    #[arg(long, value_enum)]
    pub flip: Option<FlipArg>,

    /// Collapse all layers into one before saving a project.
    #[arg(long)]
    pub flatten: bool,

    /// Print per-file timing and mirror the session log to stderr.
    #[arg(short, long)]
    pub verbose: bool,

    /// Editor settings file to use instead of the default location.
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process arguments.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s.split_once(['x', 'X']).ok_or_else(|| format!("expected WxH, got '{}'", s))?;
    let w: u32 = w.trim().parse().map_err(|_| format!("invalid width in '{}'", s))?;
    let h: u32 = h.trim().parse().map_err(|_| format!("invalid height in '{}'", s))?;
    if w == 0 || h == 0 {
        return Err("width and height must be at least 1".to_string());
    }
    Ok((w, h))
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = setup failed or one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    match run_batch(&args) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Process every input.  Returns the number of files that failed, or an
/// error when the batch could not start at all.
pub fn run_batch(args: &CliArgs) -> Result<usize, String> {
    if args.verbose {
        logger::set_echo(true);
    }

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        return Err("no input files matched the given pattern(s).".to_string());
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        return Err(format!(
            "{} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        ));
    }

    let settings = match &args.settings {
        Some(path) => EditorSettings::load_from(path),
        None => EditorSettings::load(),
    };
    let format = parse_format(args.format, args.output.as_deref());

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("could not create output directory '{}': {}", dir.display(), e))?;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut failures = 0;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) =
            build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref(), format)
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            failures += 1;
            continue;
        };

        match run_one(input_path, &output_path, format, args, &settings) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                failures += 1;
            }
        }
    }

    Ok(failures)
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    input: &Path,
    output: &Path,
    format: OutputFormat,
    args: &CliArgs,
    settings: &EditorSettings,
) -> Result<(), String> {
    // -- Step 1: Load ----------------------------------------------------
    let mut ctx = EditingContext::open(input).map_err(|e| format!("load failed: {}", e))?;
    ctx.apply_settings(settings);

    // -- Step 2: Selection-driven crop -----------------------------------
    if args.grow > 0 || args.shrink > 0 || args.crop_to_selection {
        select_opaque(&mut ctx);
        ctx.expand_selection(args.grow);
        ctx.contract_selection(args.shrink);
        if args.crop_to_selection && !ctx.crop_to_selection() {
            return Err("nothing to crop: the selection is empty".to_string());
        }
    }

    // -- Step 3: Whole-document transforms -------------------------------
    if let Some((w, h)) = args.resize {
        ctx.resize_image(w, h, Interpolation::default());
    }
    if let Some(rotate) = args.rotate {
        ctx.rotate(match rotate {
            RotateArg::Cw => Rotation::Cw90,
            RotateArg::Ccw => Rotation::Ccw90,
            RotateArg::Half => Rotation::Half,
        });
    }
    if let Some(flip) = args.flip {
        ctx.flip(match flip {
            FlipArg::H => FlipAxis::Horizontal,
            FlipArg::V => FlipAxis::Vertical,
        });
    }

    // -- Step 4: Save ----------------------------------------------------
    match format {
        OutputFormat::Pcp => {
            if args.flatten {
                ctx.flatten();
            }
            ctx.save_project(output).map_err(|e| format!("PCP save failed: {}", e))
        }
        OutputFormat::Png => ctx.export_png(output).map_err(|e| format!("save failed: {}", e)),
    }
}

/// Select every pixel that is not fully transparent in the flattened image.
fn select_opaque(ctx: &mut EditingContext) {
    let flat = ctx.document.flattened_image();
    let alpha: Vec<u8> = flat.pixels().map(|p| if p[3] > 0 { 255 } else { 0 }).collect();
    ctx.selection.combine(&alpha, SelectionMode::Replace);
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);
        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => eprintln!("warning: invalid glob '{}': {}", pattern, e),
        }
    }

    result
}

/// Explicit `--format` wins; otherwise the output extension decides.
fn parse_format(format_arg: Option<OutputFormat>, output: Option<&Path>) -> OutputFormat {
    if let Some(f) = format_arg {
        return f;
    }
    match output.and_then(|o| o.extension()).and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("pcp") => OutputFormat::Pcp,
        _ => OutputFormat::Png,
    }
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output`
/// 2. `--output-dir` (input stem + format extension)
/// 3. Next to the input, with `_out` appended when it would overwrite the input
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: OutputFormat,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.{}", stem, ext));
    if candidate == input {
        Some(parent.join(format!("{}_out.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_parser_accepts_wxh() {
        assert_eq!(parse_size("800x600"), Ok((800, 600)));
        assert_eq!(parse_size("10X2"), Ok((10, 2)));
        assert!(parse_size("0x5").is_err());
        assert!(parse_size("wide").is_err());
    }

    #[test]
    fn format_follows_output_extension() {
        assert_eq!(parse_format(None, Some(Path::new("a/b.PCP"))), OutputFormat::Pcp);
        assert_eq!(parse_format(None, Some(Path::new("a/b.png"))), OutputFormat::Png);
        assert_eq!(parse_format(Some(OutputFormat::Pcp), Some(Path::new("x.png"))), OutputFormat::Pcp);
    }

    #[test]
    fn output_path_never_overwrites_input() {
        let p = build_output_path(Path::new("dir/img.png"), None, None, OutputFormat::Png).unwrap();
        assert_eq!(p, Path::new("dir/img_out.png"));
        let p = build_output_path(Path::new("dir/img.png"), None, Some(Path::new("out")), OutputFormat::Pcp).unwrap();
        assert_eq!(p, Path::new("out/img.pcp"));
    }

    #[test]
    fn args_parse_with_clap() {
        let args = CliArgs::try_parse_from(["paintcore", "-i", "a.png", "--grow", "2", "--rotate", "180", "--flip", "h"])
            .unwrap();
        assert_eq!(args.grow, 2);
        assert_eq!(args.rotate, Some(RotateArg::Half));
        assert_eq!(args.flip, Some(FlipArg::H));
    }
}
