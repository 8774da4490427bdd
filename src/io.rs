use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::Path;

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, ImageError, ImageFormat, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::canvas::{BlendMode, Document, Layer, LayerKind, MAX_CANVAS_DIM};
use crate::ops::text::TextData;
use crate::{log_info, log_warn};

// ============================================================================
// LOSSLESS PIXEL CODEC
// ============================================================================

/// Encode an RGBA buffer as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ProjectError> {
    let mut out = Vec::with_capacity(image.as_raw().len() / 4);
    PngEncoder::new(&mut out).write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgba8)?;
    Ok(out)
}

/// Decode PNG bytes into an RGBA buffer.
pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, ProjectError> {
    let img = image::load(Cursor::new(bytes), ImageFormat::Png)?;
    Ok(img.to_rgba8())
}

/// Write a flattened image as a PNG file.
pub fn save_png(image: &RgbaImage, path: &Path) -> Result<(), ProjectError> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    PngEncoder::new(writer).write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgba8)?;
    Ok(())
}

// ============================================================================
// PCP PROJECT FILE FORMAT
// ============================================================================

/// Magic header of the layered project format.
const PCP_MAGIC: &str = "PCP1";
const PCP_VERSION: u32 = 1;

/// Maximum number of layers in a project file.
pub const MAX_LAYERS: usize = 256;

#[derive(Serialize, Deserialize)]
struct ProjectFile {
    magic: String,
    version: u32,
    width: u32,
    height: u32,
    active_layer_index: usize,
    fg_color: [u8; 4],
    bg_color: [u8; 4],
    zoom: f32,
    layers: Vec<LayerData>,
}

/// One layer as stored on disk.  Pixels are PNG-encoded.
#[derive(Serialize, Deserialize)]
struct LayerData {
    id: Uuid,
    name: String,
    visible: bool,
    locked: bool,
    opacity: u8,
    blend_mode: String,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    png: Vec<u8>,
    kind: LayerKind,
    text: Option<TextData>,
}

/// Everything a project file restores besides the (always empty) selection.
#[derive(Clone, Debug)]
pub struct ProjectData {
    pub document: Document,
    pub fg_color: [u8; 4],
    pub bg_color: [u8; 4],
    pub zoom: f32,
}

impl ProjectData {
    pub fn new(document: Document) -> Self {
        Self { document, fg_color: [0, 0, 0, 255], bg_color: [255, 255, 255, 255], zoom: 1.0 }
    }
}

/// Error type for project and image file operations
#[derive(Debug)]
pub enum ProjectError {
    Io(std::io::Error),
    Serialize(String),
    Image(String),
    InvalidFormat(String),
}

impl std::fmt::Display for ProjectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectError::Io(e) => write!(f, "I/O error: {}", e),
            ProjectError::Serialize(e) => write!(f, "Serialization error: {}", e),
            ProjectError::Image(e) => write!(f, "Image error: {}", e),
            ProjectError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
        }
    }
}

impl std::error::Error for ProjectError {}

impl From<std::io::Error> for ProjectError {
    fn from(e: std::io::Error) -> Self {
        ProjectError::Io(e)
    }
}

impl From<Box<bincode::ErrorKind>> for ProjectError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        ProjectError::Serialize(e.to_string())
    }
}

impl From<ImageError> for ProjectError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::IoError(io) => ProjectError::Io(io),
            other => ProjectError::Image(other.to_string()),
        }
    }
}

/// Save a document and its editor state as a `.pcp` project file.
pub fn save_project(project: &ProjectData, path: &Path) -> Result<(), ProjectError> {
    let doc = &project.document;
    let layers = doc
        .layers
        .par_iter()
        .map(|l| {
            Ok(LayerData {
                id: l.id,
                name: l.name.clone(),
                visible: l.visible,
                locked: l.locked,
                opacity: l.opacity,
                blend_mode: l.blend_mode.op_name().to_string(),
                x: l.x,
                y: l.y,
                width: l.width(),
                height: l.height(),
                png: encode_png(&l.pixels)?,
                kind: l.kind,
                text: l.text.clone(),
            })
        })
        .collect::<Result<Vec<_>, ProjectError>>()?;

    let file = ProjectFile {
        magic: PCP_MAGIC.to_string(),
        version: PCP_VERSION,
        width: doc.width,
        height: doc.height,
        active_layer_index: doc.active_layer_index,
        fg_color: project.fg_color,
        bg_color: project.bg_color,
        zoom: project.zoom,
        layers,
    };

    let writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(writer, &file)?;
    log_info!("saved project {} ({} layers)", path.display(), doc.layers.len());
    Ok(())
}

/// Load a `.pcp` project file.
pub fn load_project(path: &Path) -> Result<ProjectData, ProjectError> {
    let raw = std::fs::read(path)?;
    if raw.len() < 12 {
        return Err(ProjectError::InvalidFormat("File too small".into()));
    }

    // bincode encodes a String as an 8-byte length prefix + UTF-8 data,
    // so bytes 8..12 hold the magic.
    let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");
    if magic != PCP_MAGIC {
        return Err(ProjectError::InvalidFormat(format!("Unknown magic '{}'", magic)));
    }

    let project: ProjectFile = bincode::deserialize(&raw)?;
    if project.version != PCP_VERSION {
        return Err(ProjectError::InvalidFormat(format!("Unsupported version {}", project.version)));
    }
    validate_size(project.width, project.height)?;
    if project.layers.is_empty() {
        return Err(ProjectError::InvalidFormat("Project contains no layers".into()));
    }
    if project.layers.len() > MAX_LAYERS {
        return Err(ProjectError::InvalidFormat(format!(
            "Project contains {} layers, which exceeds the maximum of {}",
            project.layers.len(),
            MAX_LAYERS
        )));
    }
    for ld in &project.layers {
        if ld.width == 0 || ld.height == 0 || ld.width > MAX_CANVAS_DIM || ld.height > MAX_CANVAS_DIM {
            return Err(ProjectError::InvalidFormat(format!(
                "Layer '{}' has invalid size {}x{}",
                ld.name, ld.width, ld.height
            )));
        }
    }

    // Decode every layer before building the document.
    let layers: Vec<Layer> = project
        .layers
        .into_par_iter()
        .map(|ld| {
            let pixels = match decode_png(&ld.png) {
                Ok(img) if img.dimensions() == (ld.width, ld.height) => img,
                Ok(img) => {
                    log_warn!(
                        "layer '{}': decoded {}x{}, expected {}x{}; using blank pixels",
                        ld.name,
                        img.width(),
                        img.height(),
                        ld.width,
                        ld.height
                    );
                    RgbaImage::new(ld.width, ld.height)
                }
                Err(e) => {
                    log_warn!("layer '{}': {}; using blank pixels", ld.name, e);
                    RgbaImage::new(ld.width, ld.height)
                }
            };
            let mut layer = Layer::from_pixels(ld.name, pixels);
            layer.id = ld.id;
            layer.visible = ld.visible;
            layer.locked = ld.locked;
            layer.opacity = ld.opacity.min(100);
            layer.blend_mode = BlendMode::from_op_name(&ld.blend_mode);
            layer.x = ld.x;
            layer.y = ld.y;
            layer.kind = ld.kind;
            layer.text = ld.text;
            layer
        })
        .collect();

    let mut document = Document { width: project.width, height: project.height, layers, active_layer_index: project.active_layer_index };
    document.clamp_active();
    log_info!("loaded project {} ({} layers)", path.display(), document.layers.len());

    Ok(ProjectData {
        document,
        fg_color: project.fg_color,
        bg_color: project.bg_color,
        zoom: if project.zoom > 0.0 { project.zoom } else { 1.0 },
    })
}

fn validate_size(width: u32, height: u32) -> Result<(), ProjectError> {
    if width == 0 || height == 0 {
        return Err(ProjectError::InvalidFormat("Canvas dimensions cannot be zero".into()));
    }
    if width > MAX_CANVAS_DIM || height > MAX_CANVAS_DIM {
        return Err(ProjectError::InvalidFormat(format!(
            "Canvas size {}x{} exceeds maximum allowed {}x{}",
            width, height, MAX_CANVAS_DIM, MAX_CANVAS_DIM
        )));
    }
    Ok(())
}

// ============================================================================
// SYNCHRONOUS IMAGE LOADER (CLI / headless mode)
// ============================================================================

/// Load any supported input into a [`ProjectData`].
///
/// - `.pcp` — native project (layers preserved)
/// - anything else — decoded by `image` into a single-layer document named
///   after the file stem
pub fn load_image_document(path: &Path) -> Result<ProjectData, ProjectError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
    if ext == "pcp" {
        return load_project(path);
    }

    let img = image::open(path)?.to_rgba8();
    validate_size(img.width(), img.height())?;
    let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("Background").to_string();
    log_info!("imported {} ({}x{})", path.display(), img.width(), img.height());
    Ok(ProjectData::new(Document::from_image(name, img)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn png_codec_is_lossless() {
        let img = RgbaImage::from_fn(7, 5, |x, y| Rgba([x as u8 * 30, y as u8 * 40, 7, (x * y) as u8]));
        let bytes = encode_png(&img).unwrap();
        assert_eq!(decode_png(&bytes).unwrap(), img);
    }

    #[test]
    fn garbage_png_is_rejected() {
        assert!(decode_png(&[7u8; 64]).is_err());
    }

    #[test]
    fn rejects_zero_and_oversized_canvas() {
        assert!(validate_size(0, 10).is_err());
        assert!(validate_size(MAX_CANVAS_DIM + 1, 10).is_err());
        assert!(validate_size(640, 480).is_ok());
    }
}
