use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compositor::draw_image;
use crate::geometry::{Placed, Rect, doc_to_layer, layer_cell_in_bounds};
use crate::ops::text::{FontRegistry, TextData, render_text_layer};
use crate::{log_info, log_warn};

/// Hard ceiling on document edge length (per axis).
pub const MAX_CANVAS_DIM: u32 = 32_768;

pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

// ============================================================================
// BLEND MODE
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    /// Returns all blend modes in menu order
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Darken,
            BlendMode::Lighten,
            BlendMode::ColorDodge,
            BlendMode::ColorBurn,
            BlendMode::HardLight,
            BlendMode::SoftLight,
            BlendMode::Difference,
            BlendMode::Exclusion,
            BlendMode::Hue,
            BlendMode::Saturation,
            BlendMode::Color,
            BlendMode::Luminosity,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
            BlendMode::Overlay => "Overlay",
            BlendMode::Darken => "Darken",
            BlendMode::Lighten => "Lighten",
            BlendMode::ColorDodge => "Color Dodge",
            BlendMode::ColorBurn => "Color Burn",
            BlendMode::HardLight => "Hard Light",
            BlendMode::SoftLight => "Soft Light",
            BlendMode::Difference => "Difference",
            BlendMode::Exclusion => "Exclusion",
            BlendMode::Hue => "Hue",
            BlendMode::Saturation => "Saturation",
            BlendMode::Color => "Color",
            BlendMode::Luminosity => "Luminosity",
        }
    }

    /// Compositing-operator name used in project files.
    pub fn op_name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "source-over",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
            BlendMode::ColorDodge => "color-dodge",
            BlendMode::ColorBurn => "color-burn",
            BlendMode::HardLight => "hard-light",
            BlendMode::SoftLight => "soft-light",
            BlendMode::Difference => "difference",
            BlendMode::Exclusion => "exclusion",
            BlendMode::Hue => "hue",
            BlendMode::Saturation => "saturation",
            BlendMode::Color => "color",
            BlendMode::Luminosity => "luminosity",
        }
    }

    /// Reverse of [`op_name`](Self::op_name); unknown names fall back to Normal.
    pub fn from_op_name(name: &str) -> Self {
        BlendMode::all()
            .iter()
            .copied()
            .find(|m| m.op_name() == name)
            .unwrap_or_default()
    }
}

// ============================================================================
// LAYER
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayerKind {
    #[default]
    Raster,
    Text,
}

#[derive(Clone, Debug)]
pub struct Layer {
    /// Stable identity across undo/redo.
    pub id: Uuid,
    pub name: String,
    pub visible: bool,
    pub locked: bool,
    /// 0–100
    pub opacity: u8,
    pub blend_mode: BlendMode,
    /// Document-space offset of the buffer's top-left corner.
    pub x: i32,
    pub y: i32,
    pub kind: LayerKind,
    pub text: Option<TextData>,
    pub pixels: RgbaImage,
}

impl Placed for Layer {
    fn origin(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    fn extent(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

impl Layer {
    /// Transparent raster layer.
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self::filled(name, width, height, TRANSPARENT)
    }

    pub fn filled(name: impl Into<String>, width: u32, height: u32, color: Rgba<u8>) -> Self {
        Self::from_pixels(name, RgbaImage::from_pixel(width.max(1), height.max(1), color))
    }

    pub fn from_pixels(name: impl Into<String>, pixels: RgbaImage) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            visible: true,
            locked: false,
            opacity: 100,
            blend_mode: BlendMode::Normal,
            x: 0,
            y: 0,
            kind: LayerKind::Raster,
            text: None,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Document-space rectangle covered by this layer's buffer.
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width(), self.height())
    }

    /// Pixel under a document cell, `None` when the cell lies outside the buffer.
    pub fn pixel_at_doc(&self, x: i32, y: i32) -> Option<Rgba<u8>> {
        let (lx, ly) = layer_cell_in_bounds(self, doc_to_layer(self, x, y))?;
        Some(*self.pixels.get_pixel(lx, ly))
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Re-rasterise a text layer from its description.  No-op for raster layers.
    pub fn render_text(&mut self, fonts: &FontRegistry) {
        if self.kind != LayerKind::Text {
            return;
        }
        if let Some(text) = &self.text {
            self.pixels = render_text_layer(text, fonts);
        }
    }

    /// Pixel edits turn a text layer into an ordinary raster layer.
    pub fn rasterize(&mut self) {
        self.kind = LayerKind::Raster;
        self.text = None;
    }
}

// ============================================================================
// DOCUMENT — ordered layer stack (index 0 = bottom)
// ============================================================================

#[derive(Clone, Debug)]
pub struct Document {
    pub width: u32,
    pub height: u32,
    pub layers: Vec<Layer>,
    pub active_layer_index: usize,
}

impl Document {
    /// New document with an opaque white background layer.
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height) = clamp_size(width, height);
        Self {
            width,
            height,
            layers: vec![Layer::filled("Background", width, height, WHITE)],
            active_layer_index: 0,
        }
    }

    /// New document with a single transparent layer.
    pub fn blank(width: u32, height: u32) -> Self {
        let (width, height) = clamp_size(width, height);
        Self {
            width,
            height,
            layers: vec![Layer::new("Layer 1", width, height)],
            active_layer_index: 0,
        }
    }

    /// Single-layer document adopting `pixels` at their own size.
    pub fn from_image(name: impl Into<String>, pixels: RgbaImage) -> Self {
        let (width, height) = pixels.dimensions();
        Self {
            width,
            height,
            layers: vec![Layer::from_pixels(name, pixels)],
            active_layer_index: 0,
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.layers.get(self.active_layer_index)
    }

    pub fn active_layer_mut(&mut self) -> Option<&mut Layer> {
        self.layers.get_mut(self.active_layer_index)
    }

    pub fn layer_index(&self, id: Uuid) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn clamp_active(&mut self) {
        self.active_layer_index = self.active_layer_index.min(self.layers.len().saturating_sub(1));
    }

    pub fn select_layer(&mut self, index: usize) {
        self.active_layer_index = index;
        self.clamp_active();
    }

    /// Insert `layer` directly above the active layer and make it active.
    pub fn insert_layer(&mut self, layer: Layer) -> usize {
        let index = if self.layers.is_empty() { 0 } else { self.active_layer_index + 1 };
        self.layers.insert(index, layer);
        self.active_layer_index = index;
        index
    }

    /// Add a transparent document-sized layer above the active one.
    pub fn add_layer(&mut self, name: Option<&str>) -> usize {
        let name = match name {
            Some(n) => n.to_string(),
            None => format!("Layer {}", self.layers.len() + 1),
        };
        self.insert_layer(Layer::new(name, self.width, self.height))
    }

    /// Add a text layer at document position `(x, y)`.
    pub fn add_text_layer(&mut self, text: TextData, x: i32, y: i32, fonts: &FontRegistry) -> usize {
        let mut layer = Layer::new("Text", 4, 4);
        layer.kind = LayerKind::Text;
        layer.text = Some(text);
        layer.x = x;
        layer.y = y;
        layer.render_text(fonts);
        self.insert_layer(layer)
    }

    pub fn duplicate_layer(&mut self) -> Option<usize> {
        let src = self.active_layer()?;
        let mut copy = src.clone();
        copy.id = Uuid::new_v4();
        copy.name = format!("{} copy", src.name);
        Some(self.insert_layer(copy))
    }

    /// Remove a layer.  The last remaining layer can never be deleted.
    pub fn delete_layer(&mut self, index: usize) -> bool {
        if self.layers.len() <= 1 {
            log_warn!("delete_layer: refusing to delete the only layer");
            return false;
        }
        if index >= self.layers.len() {
            return false;
        }
        self.layers.remove(index);
        self.active_layer_index = index.saturating_sub(1);
        self.clamp_active();
        true
    }

    pub fn move_layer_up(&mut self, index: usize) -> bool {
        if index + 1 >= self.layers.len() {
            return false;
        }
        self.layers.swap(index, index + 1);
        if self.active_layer_index == index {
            self.active_layer_index += 1;
        } else if self.active_layer_index == index + 1 {
            self.active_layer_index -= 1;
        }
        true
    }

    pub fn move_layer_down(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.layers.len() {
            return false;
        }
        self.move_layer_up(index - 1)
    }

    /// Merge the layer at `index` into the one below it.  The upper layer's
    /// opacity and blend mode are applied; the result is always a raster layer.
    pub fn merge_down(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.layers.len() {
            return false;
        }
        let top = self.layers.remove(index);
        let bottom = &mut self.layers[index - 1];
        draw_image(
            &mut bottom.pixels,
            &top.pixels,
            top.x - bottom.x,
            top.y - bottom.y,
            top.opacity as f32 / 100.0,
            top.blend_mode,
        );
        bottom.rasterize();
        self.active_layer_index = index - 1;
        log_info!("merged '{}' into '{}'", top.name, self.layers[index - 1].name);
        true
    }

    /// Collapse all visible layers onto a white document-sized background.
    pub fn flatten(&mut self) {
        let mut flat = Layer::filled("Background", self.width, self.height, WHITE);
        for layer in self.layers.iter().filter(|l| l.visible) {
            draw_image(
                &mut flat.pixels,
                &layer.pixels,
                layer.x,
                layer.y,
                layer.opacity as f32 / 100.0,
                layer.blend_mode,
            );
        }
        self.layers = vec![flat];
        self.active_layer_index = 0;
    }

    /// Visible layers composited over transparency at document size.
    pub fn flattened_image(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width, self.height);
        for layer in self.layers.iter().filter(|l| l.visible) {
            draw_image(&mut out, &layer.pixels, layer.x, layer.y, layer.opacity as f32 / 100.0, layer.blend_mode);
        }
        out
    }

    pub fn rename_layer(&mut self, index: usize, name: &str) -> bool {
        let Some(layer) = self.layers.get_mut(index) else { return false };
        layer.name = name.to_string();
        true
    }

    pub fn set_opacity(&mut self, index: usize, opacity: i32) -> bool {
        let Some(layer) = self.layers.get_mut(index) else { return false };
        layer.opacity = opacity.clamp(0, 100) as u8;
        true
    }

    pub fn set_blend_mode(&mut self, index: usize, mode: BlendMode) -> bool {
        let Some(layer) = self.layers.get_mut(index) else { return false };
        layer.blend_mode = mode;
        true
    }

    pub fn set_visible(&mut self, index: usize, visible: bool) -> bool {
        let Some(layer) = self.layers.get_mut(index) else { return false };
        layer.visible = visible;
        true
    }

    pub fn set_locked(&mut self, index: usize, locked: bool) -> bool {
        let Some(layer) = self.layers.get_mut(index) else { return false };
        layer.locked = locked;
        true
    }
}

/// Clamp requested document dimensions into `1..=MAX_CANVAS_DIM`.
pub fn clamp_size(width: u32, height: u32) -> (u32, u32) {
    (width.clamp(1, MAX_CANVAS_DIM), height.clamp(1, MAX_CANVAS_DIM))
}
