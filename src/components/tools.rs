use image::{Rgba, RgbaImage};
use uuid::Uuid;

use crate::canvas::{Document, LayerKind};
use crate::components::history::HistoryManager;
use crate::compositor::{CompositingEngine, Overlay};
use crate::geometry::{DocPoint, Rect};
use crate::ops::canvas_ops;
use crate::ops::fill::{self, GradientKind};
use crate::ops::text::{FontRegistry, TextData, render_text_layer};
use crate::ops::transform::{self, HandlePos, TransformBox, TransformHandle};
use crate::selection::{SelectionMask, SelectionMode};
use crate::stroke::{BrushParams, StrokeBuffer};
use crate::{log_info, log_warn};

/// Screen-pixel radius within which a polygon click snaps closed.
const POLYGON_SNAP_PX: f32 = 8.0;
/// Smallest crop, in document pixels, that can be committed.
const MIN_CROP: u32 = 2;
/// Clone-stamp dabs are spaced at this fraction of the brush size.
const CLONE_SPACING: f32 = 0.2;

const GUIDE: Rgba<u8> = Rgba([255, 255, 255, 230]);
const GUIDE_SHADOW: Rgba<u8> = Rgba([0, 0, 0, 160]);
const SNAP_MARK: Rgba<u8> = Rgba([255, 220, 50, 230]);
const CROP_DIM: Rgba<u8> = Rgba([0, 0, 0, 102]);
const CROP_THIRDS: Rgba<u8> = Rgba([255, 255, 255, 77]);
/// Half-size of a drawn transform handle, in screen pixels.
const HANDLE_DRAW_PX: f32 = 3.0;

/// Tool identity without any in-flight state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ToolKind {
    #[default]
    Brush,
    Pencil,
    Eraser,
    CloneStamp,
    Fill,
    Eyedropper,
    RectSelect,
    EllipseSelect,
    Lasso,
    Polygon,
    MagicWand,
    Gradient,
    Crop,
    Move,
    Transform,
    Text,
}

impl ToolKind {
    pub fn all() -> &'static [ToolKind] {
        &[
            ToolKind::Brush,
            ToolKind::Pencil,
            ToolKind::Eraser,
            ToolKind::CloneStamp,
            ToolKind::Fill,
            ToolKind::Eyedropper,
            ToolKind::RectSelect,
            ToolKind::EllipseSelect,
            ToolKind::Lasso,
            ToolKind::Polygon,
            ToolKind::MagicWand,
            ToolKind::Gradient,
            ToolKind::Crop,
            ToolKind::Move,
            ToolKind::Transform,
            ToolKind::Text,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Brush => "Brush",
            ToolKind::Pencil => "Pencil",
            ToolKind::Eraser => "Eraser",
            ToolKind::CloneStamp => "Clone Stamp",
            ToolKind::Fill => "Fill",
            ToolKind::Eyedropper => "Eyedropper",
            ToolKind::RectSelect => "Rectangle Select",
            ToolKind::EllipseSelect => "Ellipse Select",
            ToolKind::Lasso => "Lasso",
            ToolKind::Polygon => "Polygon Select",
            ToolKind::MagicWand => "Magic Wand",
            ToolKind::Gradient => "Gradient",
            ToolKind::Crop => "Crop",
            ToolKind::Move => "Move Layer",
            ToolKind::Transform => "Transform",
            ToolKind::Text => "Text",
        }
    }

    pub fn is_selection_tool(&self) -> bool {
        matches!(
            self,
            ToolKind::RectSelect | ToolKind::EllipseSelect | ToolKind::Lasso | ToolKind::Polygon | ToolKind::MagicWand
        )
    }
}

// ============================================================================
// SHARED TOOL INPUTS
// ============================================================================

/// Options shared by every tool; the editor's tool-options bar edits these.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSettings {
    pub brush: BrushParams,
    /// 0–255, compared against the summed RGBA difference / 4.
    pub tolerance: i32,
    pub contiguous: bool,
    /// Mode used when no modifier is held.
    pub selection_mode: SelectionMode,
    pub gradient: GradientKind,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            brush: BrushParams::default(),
            tolerance: 32,
            contiguous: true,
            selection_mode: SelectionMode::Replace,
            gradient: GradientKind::Linear,
        }
    }
}

/// Foreground / background colour pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorPair {
    pub fg: Rgba<u8>,
    pub bg: Rgba<u8>,
}

impl Default for ColorPair {
    fn default() -> Self {
        Self { fg: Rgba([0, 0, 0, 255]), bg: Rgba([255, 255, 255, 255]) }
    }
}

impl ColorPair {
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.fg, &mut self.bg);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers { shift: false, alt: false };
    pub const SHIFT: Modifiers = Modifiers { shift: true, alt: false };
    pub const ALT: Modifiers = Modifiers { shift: false, alt: true };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Escape,
    Enter,
}

/// Split borrows of one editing context, handed to the active tool per event.
pub struct ToolContext<'a> {
    pub document: &'a mut Document,
    pub selection: &'a mut SelectionMask,
    pub history: &'a mut HistoryManager,
    pub stroke: &'a mut StrokeBuffer,
    pub engine: &'a mut CompositingEngine,
    pub settings: &'a ToolSettings,
    pub colors: &'a mut ColorPair,
    pub fonts: &'a FontRegistry,
}

impl ToolContext<'_> {
    fn snapshot(&mut self, label: &str) {
        self.history.snapshot(label, self.document, self.selection);
    }

    fn composite(&mut self) {
        self.engine.composite(self.document);
    }

    /// Selection mode for this event: Shift adds, Alt subtracts.
    fn selection_mode(&self, mods: Modifiers) -> SelectionMode {
        if mods.shift {
            SelectionMode::Add
        } else if mods.alt {
            SelectionMode::Subtract
        } else {
            self.settings.selection_mode
        }
    }

    /// Whether the active layer accepts pixel edits.  Logs the refusal.
    fn can_paint(&self, tool: ToolKind) -> bool {
        match self.document.active_layer() {
            None => false,
            Some(l) if l.locked => {
                log_warn!("{}: layer '{}' is locked", tool.name(), l.name);
                false
            }
            Some(l) if l.kind == LayerKind::Text => {
                log_warn!("{}: layer '{}' is a text layer", tool.name(), l.name);
                false
            }
            Some(_) => true,
        }
    }

    fn brush_for(&self, tool: ToolKind, pressure: f32) -> BrushParams {
        let mut brush = self.settings.brush;
        brush.color = self.colors.fg;
        match tool {
            ToolKind::Pencil => {
                brush.hardness = 100.0;
                brush.spacing = 0.25;
            }
            ToolKind::Eraser => brush.color = Rgba([255, 255, 255, 255]),
            _ => {}
        }
        brush.with_pressure(pressure)
    }
}

// ============================================================================
// PER-TOOL STATE
// ============================================================================

#[derive(Clone, Debug, Default)]
pub struct PaintState {
    drawing: bool,
    last: DocPoint,
    cursor: Option<DocPoint>,
    cursor_radius: f32,
}

#[derive(Clone, Debug, Default)]
pub struct CloneState {
    paint: PaintState,
    source: Option<DocPoint>,
    /// Destination minus source, fixed by the first stroke after the source is set.
    offset: Option<(f32, f32)>,
    sample: Option<image::RgbaImage>,
}

#[derive(Clone, Debug, Default)]
pub struct DragState {
    active: bool,
    start: DocPoint,
    end: DocPoint,
    mode: SelectionMode,
}

impl DragState {
    fn rect(&self) -> Rect {
        let (x0, y0) = self.start.rounded();
        let (x1, y1) = self.end.rounded();
        Rect::from_corners(x0, y0, x1, y1)
    }
}

#[derive(Clone, Debug, Default)]
pub struct PathState {
    active: bool,
    points: Vec<DocPoint>,
    cursor: Option<DocPoint>,
    mode: SelectionMode,
}

#[derive(Clone, Debug, Default)]
pub struct CropState {
    drag: DragState,
    pending: Option<Rect>,
}

#[derive(Clone, Debug, Default)]
pub struct MoveState {
    dragging: bool,
    start: DocPoint,
    origin: (i32, i32),
    /// Set once the drag has actually shifted the layer and been snapshotted.
    recorded: bool,
}

/// Pixels lifted off a layer while a free transform is open.
#[derive(Clone, Debug)]
pub struct TransformSession {
    layer: Uuid,
    /// Layer buffer before the lift, restored on cancel and before commit.
    original: RgbaImage,
    cut: RgbaImage,
    float: RgbaImage,
    start: Rect,
    bbox: TransformBox,
}

#[derive(Clone, Debug, Default)]
pub struct TransformState {
    session: Option<TransformSession>,
    grab: Option<(TransformHandle, DocPoint)>,
}

#[derive(Clone, Debug, PartialEq)]
enum TextTarget {
    New { x: i32, y: i32 },
    Edit(Uuid),
}

/// Text being typed, not yet in the document.
#[derive(Clone, Debug)]
pub struct TextSession {
    target: TextTarget,
    draft: TextData,
    /// Document position of the preview's top-left corner.
    origin: (i32, i32),
    preview: Option<RgbaImage>,
}

#[derive(Clone, Debug, Default)]
pub struct TextState {
    session: Option<TextSession>,
}

/// The active tool together with its in-flight interaction state.
#[derive(Clone, Debug)]
pub enum Tool {
    Brush(PaintState),
    Pencil(PaintState),
    Eraser(PaintState),
    CloneStamp(CloneState),
    Fill,
    Eyedropper { pressed: bool },
    RectSelect(DragState),
    EllipseSelect(DragState),
    Lasso(PathState),
    Polygon(PathState),
    MagicWand,
    Gradient(DragState),
    Crop(CropState),
    Move(MoveState),
    Transform(TransformState),
    Text(TextState),
}

impl Default for Tool {
    fn default() -> Self {
        Tool::new(ToolKind::default())
    }
}

impl Tool {
    pub fn new(kind: ToolKind) -> Self {
        match kind {
            ToolKind::Brush => Tool::Brush(PaintState::default()),
            ToolKind::Pencil => Tool::Pencil(PaintState::default()),
            ToolKind::Eraser => Tool::Eraser(PaintState::default()),
            ToolKind::CloneStamp => Tool::CloneStamp(CloneState::default()),
            ToolKind::Fill => Tool::Fill,
            ToolKind::Eyedropper => Tool::Eyedropper { pressed: false },
            ToolKind::RectSelect => Tool::RectSelect(DragState::default()),
            ToolKind::EllipseSelect => Tool::EllipseSelect(DragState::default()),
            ToolKind::Lasso => Tool::Lasso(PathState::default()),
            ToolKind::Polygon => Tool::Polygon(PathState::default()),
            ToolKind::MagicWand => Tool::MagicWand,
            ToolKind::Gradient => Tool::Gradient(DragState::default()),
            ToolKind::Crop => Tool::Crop(CropState::default()),
            ToolKind::Move => Tool::Move(MoveState::default()),
            ToolKind::Transform => Tool::Transform(TransformState::default()),
            ToolKind::Text => Tool::Text(TextState::default()),
        }
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Tool::Brush(_) => ToolKind::Brush,
            Tool::Pencil(_) => ToolKind::Pencil,
            Tool::Eraser(_) => ToolKind::Eraser,
            Tool::CloneStamp(_) => ToolKind::CloneStamp,
            Tool::Fill => ToolKind::Fill,
            Tool::Eyedropper { .. } => ToolKind::Eyedropper,
            Tool::RectSelect(_) => ToolKind::RectSelect,
            Tool::EllipseSelect(_) => ToolKind::EllipseSelect,
            Tool::Lasso(_) => ToolKind::Lasso,
            Tool::Polygon(_) => ToolKind::Polygon,
            Tool::MagicWand => ToolKind::MagicWand,
            Tool::Gradient(_) => ToolKind::Gradient,
            Tool::Crop(_) => ToolKind::Crop,
            Tool::Move(_) => ToolKind::Move,
            Tool::Transform(_) => ToolKind::Transform,
            Tool::Text(_) => ToolKind::Text,
        }
    }

    /// True while a drag, stroke, multi-click path or open transform/text
    /// session is in progress.
    pub fn is_busy(&self) -> bool {
        match self {
            Tool::Brush(s) | Tool::Pencil(s) | Tool::Eraser(s) => s.drawing,
            Tool::CloneStamp(s) => s.paint.drawing,
            Tool::Eyedropper { pressed } => *pressed,
            Tool::RectSelect(s) | Tool::EllipseSelect(s) | Tool::Gradient(s) => s.active,
            Tool::Lasso(s) | Tool::Polygon(s) => s.active,
            Tool::Crop(s) => s.drag.active || s.pending.is_some(),
            Tool::Move(s) => s.dragging,
            Tool::Transform(s) => s.session.is_some(),
            Tool::Text(s) => s.session.is_some(),
            Tool::Fill | Tool::MagicWand => false,
        }
    }

    /// Position of the clone source, once set.
    pub fn clone_source(&self) -> Option<DocPoint> {
        match self {
            Tool::CloneStamp(s) => s.source,
            _ => None,
        }
    }

    /// Crop rectangle awaiting confirmation.
    pub fn pending_crop(&self) -> Option<Rect> {
        match self {
            Tool::Crop(s) => s.pending,
            _ => None,
        }
    }

    /// Box of the open transform.
    pub fn transform_box(&self) -> Option<TransformBox> {
        match self {
            Tool::Transform(s) => s.session.as_ref().map(|t| t.bbox),
            _ => None,
        }
    }

    /// Text of the open text session.
    pub fn text_draft(&self) -> Option<&TextData> {
        match self {
            Tool::Text(s) => s.session.as_ref().map(|t| &t.draft),
            _ => None,
        }
    }

    /// Replace the text being typed and re-render its preview.  Returns
    /// `false` when no text session is open.
    pub fn set_text_draft(&mut self, ctx: &ToolContext<'_>, text: TextData) -> bool {
        let Tool::Text(TextState { session: Some(t) }) = self else { return false };
        t.preview = (!text.text.is_empty()).then(|| render_text_layer(&text, ctx.fonts));
        t.draft = text;
        true
    }

    // ------------------------------------------------------------------
    // Pointer events
    // ------------------------------------------------------------------

    pub fn on_pointer_down(&mut self, ctx: &mut ToolContext<'_>, pos: DocPoint, mods: Modifiers, pressure: f32) {
        let kind = self.kind();
        match self {
            Tool::Brush(s) | Tool::Pencil(s) | Tool::Eraser(s) => paint_down(kind, s, ctx, pos, pressure),
            Tool::CloneStamp(s) => clone_down(s, ctx, pos, mods, pressure),
            Tool::Fill => bucket_down(ctx, pos),
            Tool::Eyedropper { pressed } => {
                *pressed = true;
                pick_color(ctx, pos);
            }
            Tool::RectSelect(s) | Tool::EllipseSelect(s) => {
                *s = DragState { active: true, start: pos, end: pos, mode: ctx.selection_mode(mods) };
            }
            Tool::Gradient(s) => {
                *s = DragState { active: true, start: pos, end: pos, mode: SelectionMode::Replace };
            }
            Tool::Lasso(s) => {
                *s = PathState { active: true, points: vec![pos], cursor: Some(pos), mode: ctx.selection_mode(mods) };
            }
            Tool::Polygon(s) => polygon_click(s, ctx, pos, mods),
            Tool::MagicWand => wand_click(ctx, pos, mods),
            Tool::Crop(s) => {
                if let Some(rect) = s.pending
                    && rect.contains(pos.x.floor() as i32, pos.y.floor() as i32)
                {
                    commit_crop(s, ctx);
                    return;
                }
                s.pending = None;
                s.drag = DragState { active: true, start: pos, end: pos, mode: SelectionMode::Replace };
            }
            Tool::Move(s) => move_down(s, ctx, pos),
            Tool::Transform(s) => transform_down(s, ctx, pos),
            Tool::Text(s) => text_click(s, ctx, pos),
        }
    }

    pub fn on_pointer_move(&mut self, ctx: &mut ToolContext<'_>, pos: DocPoint, mods: Modifiers, pressure: f32) {
        let kind = self.kind();
        match self {
            Tool::Brush(s) | Tool::Pencil(s) | Tool::Eraser(s) => paint_move(kind, s, ctx, pos, pressure),
            Tool::CloneStamp(s) => clone_move(s, ctx, pos, pressure),
            Tool::Eyedropper { pressed } => {
                if *pressed {
                    pick_color(ctx, pos);
                }
            }
            Tool::RectSelect(s) | Tool::EllipseSelect(s) | Tool::Gradient(s) => {
                if s.active {
                    s.end = pos;
                }
            }
            Tool::Crop(s) => {
                if s.drag.active {
                    s.drag.end = pos;
                }
            }
            Tool::Lasso(s) => {
                s.cursor = Some(pos);
                if s.active && s.points.last().is_none_or(|p| p.distance(pos) >= 1.0) {
                    s.points.push(pos);
                }
            }
            Tool::Polygon(s) => s.cursor = Some(pos),
            Tool::Move(s) => move_drag(s, ctx, pos),
            Tool::Transform(s) => transform_drag(s, ctx, pos, mods),
            Tool::Fill | Tool::MagicWand | Tool::Text(_) => {}
        }
    }

    pub fn on_pointer_up(&mut self, ctx: &mut ToolContext<'_>, pos: DocPoint, mods: Modifiers) {
        let ellipse = matches!(self, Tool::EllipseSelect(_));
        match self {
            Tool::Brush(s) | Tool::Pencil(s) | Tool::Eraser(s) => end_stroke(s, ctx),
            Tool::CloneStamp(s) => {
                end_stroke(&mut s.paint, ctx);
                s.sample = None;
            }
            Tool::Eyedropper { pressed } => *pressed = false,
            Tool::RectSelect(s) | Tool::EllipseSelect(s) => {
                if !s.active {
                    return;
                }
                s.end = pos;
                s.active = false;
                commit_marquee(s, ellipse, ctx);
            }
            Tool::Lasso(s) => {
                if !s.active {
                    return;
                }
                s.points.push(pos);
                let points = std::mem::take(&mut s.points);
                s.active = false;
                if points.len() >= 3 {
                    ctx.snapshot("Lasso Select");
                    ctx.selection.set_from_polygon(&points, s.mode);
                }
            }
            Tool::Gradient(s) => {
                if !s.active {
                    return;
                }
                s.end = pos;
                s.active = false;
                apply_gradient(s, ctx);
            }
            Tool::Crop(s) => {
                if !s.drag.active {
                    return;
                }
                s.drag.end = pos;
                s.drag.active = false;
                s.pending = s
                    .drag
                    .rect()
                    .clamp_to(ctx.document.width, ctx.document.height)
                    .filter(|r| r.w >= MIN_CROP && r.h >= MIN_CROP);
            }
            Tool::Move(s) => {
                move_drag(s, ctx, pos);
                s.dragging = false;
            }
            Tool::Transform(s) => {
                transform_drag(s, ctx, pos, mods);
                s.grab = None;
            }
            Tool::Polygon(_) | Tool::Fill | Tool::MagicWand | Tool::Text(_) => {}
        }
    }

    /// Returns `true` when the key was consumed.
    pub fn on_key_down(&mut self, ctx: &mut ToolContext<'_>, key: Key) -> bool {
        if key == Key::Enter && matches!(self, Tool::Polygon(_)) {
            return self.close_polygon(ctx);
        }
        match (self, key) {
            (Tool::Lasso(s) | Tool::Polygon(s), Key::Escape) if s.active => {
                *s = PathState::default();
                true
            }
            (Tool::RectSelect(s) | Tool::EllipseSelect(s) | Tool::Gradient(s), Key::Escape) if s.active => {
                s.active = false;
                true
            }
            (Tool::Crop(s), Key::Escape) if s.drag.active || s.pending.is_some() => {
                *s = CropState::default();
                true
            }
            (Tool::Crop(s), Key::Enter) if s.pending.is_some() => {
                commit_crop(s, ctx);
                true
            }
            (Tool::Transform(s), Key::Enter) if s.session.is_some() => {
                commit_transform(s, ctx);
                true
            }
            (Tool::Transform(s), Key::Escape) if s.session.is_some() => {
                cancel_transform(s, ctx);
                true
            }
            (Tool::Text(s), Key::Enter) if s.session.is_some() => {
                commit_text(s, ctx);
                true
            }
            (Tool::Text(s), Key::Escape) if s.session.is_some() => {
                s.session = None;
                true
            }
            _ => false,
        }
    }

    /// Commit an open polygon.  Needs at least three vertices.
    pub fn close_polygon(&mut self, ctx: &mut ToolContext<'_>) -> bool {
        let Tool::Polygon(s) = self else { return false };
        if !s.active {
            return false;
        }
        let points = std::mem::take(&mut s.points);
        let mode = s.mode;
        *s = PathState::default();
        if points.len() < 3 {
            return false;
        }
        ctx.snapshot("Polygon Select");
        ctx.selection.set_from_polygon(&points, mode);
        true
    }

    /// Finish anything in flight before the tool is switched away.
    pub fn deactivate(&mut self, ctx: &mut ToolContext<'_>) {
        match self {
            Tool::Brush(s) | Tool::Pencil(s) | Tool::Eraser(s) => end_stroke(s, ctx),
            Tool::CloneStamp(s) => end_stroke(&mut s.paint, ctx),
            Tool::Transform(s) => commit_transform(s, ctx),
            Tool::Text(s) => commit_text(s, ctx),
            _ => {}
        }
        *self = Tool::new(self.kind());
    }

    // ------------------------------------------------------------------
    // Overlay
    // ------------------------------------------------------------------

    /// Draw this tool's preview into the overlay.  `zoom` converts screen
    /// sizes (snap rings, handles) into document pixels.
    pub fn draw_overlay(&self, painter: &mut Overlay<'_>, zoom: f32) {
        let zoom = zoom.max(0.01);
        match self {
            Tool::Brush(s) | Tool::Pencil(s) | Tool::Eraser(s) => draw_brush_ring(painter, s),
            Tool::CloneStamp(s) => {
                draw_brush_ring(painter, &s.paint);
                if let Some(src) = s.source {
                    let src = match (s.paint.drawing, s.offset, s.paint.cursor) {
                        (true, Some((dx, dy)), Some(c)) => c.offset(-dx, -dy),
                        _ => src,
                    };
                    let arm = 6.0 / zoom;
                    painter.line(src.offset(-arm, 0.0), src.offset(arm, 0.0), GUIDE);
                    painter.line(src.offset(0.0, -arm), src.offset(0.0, arm), GUIDE);
                }
            }
            Tool::RectSelect(s) if s.active => {
                painter.rect_outline(s.rect(), GUIDE);
            }
            Tool::EllipseSelect(s) if s.active => {
                painter.ellipse_outline(s.rect(), GUIDE);
            }
            Tool::Gradient(s) if s.active => {
                painter.line(s.start, s.end, GUIDE_SHADOW);
                painter.line(s.start, s.end, GUIDE);
                painter.circle_outline(s.start, 3.0 / zoom, GUIDE);
                painter.circle_outline(s.end, 3.0 / zoom, GUIDE);
            }
            Tool::Lasso(s) if s.active => painter.polyline(&s.points, false, GUIDE),
            Tool::Polygon(s) if s.active => {
                painter.polyline(&s.points, false, GUIDE);
                for p in &s.points {
                    painter.circle_outline(*p, 3.0 / zoom, GUIDE);
                }
                if let (Some(last), Some(cursor)) = (s.points.last(), s.cursor) {
                    painter.line(*last, cursor, GUIDE_SHADOW);
                    let first = s.points[0];
                    if s.points.len() >= 3 && cursor.distance(first) <= POLYGON_SNAP_PX / zoom {
                        painter.circle_outline(first, POLYGON_SNAP_PX / zoom, SNAP_MARK);
                    }
                }
            }
            Tool::Crop(s) => {
                let rect = if s.drag.active { Some(s.drag.rect()) } else { s.pending };
                if let Some(rect) = rect {
                    draw_crop_guides(painter, rect);
                }
            }
            Tool::Transform(TransformState { session: Some(t), .. }) => draw_transform_box(painter, &t.bbox, zoom),
            Tool::Text(TextState { session: Some(t) }) => draw_text_preview(painter, t),
            _ => {}
        }
    }
}

// ============================================================================
// PAINT TOOLS
// ============================================================================

fn paint_down(kind: ToolKind, s: &mut PaintState, ctx: &mut ToolContext<'_>, pos: DocPoint, pressure: f32) {
    s.cursor = Some(pos);
    if !ctx.can_paint(kind) {
        return;
    }
    let brush = ctx.brush_for(kind, pressure);
    s.cursor_radius = brush.size / 2.0;
    ctx.snapshot(kind.name());
    ctx.stroke.resize(ctx.document.width, ctx.document.height);
    let Some(layer) = ctx.document.active_layer_mut() else { return };
    ctx.stroke.begin(layer);
    ctx.stroke.dab(pos, &brush);
    ctx.stroke.flush(layer, ctx.selection, kind == ToolKind::Eraser);
    s.drawing = true;
    s.last = pos;
    ctx.composite();
}

fn paint_move(kind: ToolKind, s: &mut PaintState, ctx: &mut ToolContext<'_>, pos: DocPoint, pressure: f32) {
    s.cursor = Some(pos);
    let brush = ctx.brush_for(kind, pressure);
    s.cursor_radius = brush.size / 2.0;
    if !s.drawing {
        return;
    }
    let Some(layer) = ctx.document.active_layer_mut() else { return };
    ctx.stroke.line(s.last, pos, &brush);
    ctx.stroke.flush(layer, ctx.selection, kind == ToolKind::Eraser);
    s.last = pos;
    ctx.composite();
}

fn end_stroke(s: &mut PaintState, ctx: &mut ToolContext<'_>) {
    if !s.drawing {
        return;
    }
    s.drawing = false;
    ctx.stroke.end();
}

fn clone_down(s: &mut CloneState, ctx: &mut ToolContext<'_>, pos: DocPoint, mods: Modifiers, pressure: f32) {
    s.paint.cursor = Some(pos);
    if mods.alt {
        s.source = Some(pos);
        s.offset = None;
        log_info!("clone stamp: source set at ({:.0}, {:.0})", pos.x, pos.y);
        return;
    }
    let Some(source) = s.source else {
        log_warn!("clone stamp: Alt+click to set a source first");
        return;
    };
    if !ctx.can_paint(ToolKind::CloneStamp) {
        return;
    }
    let offset = *s.offset.get_or_insert((pos.x - source.x, pos.y - source.y));
    let brush = ctx.brush_for(ToolKind::CloneStamp, pressure);
    s.paint.cursor_radius = brush.size / 2.0;

    ctx.snapshot(ToolKind::CloneStamp.name());
    ctx.composite();
    let sample = ctx.engine.composite_surface().clone();
    ctx.stroke.resize(ctx.document.width, ctx.document.height);
    let Some(layer) = ctx.document.active_layer_mut() else { return };
    ctx.stroke.begin(layer);
    ctx.stroke.clone_dab(pos, &brush, &sample, offset);
    ctx.stroke.flush(layer, ctx.selection, false);
    s.sample = Some(sample);
    s.paint.drawing = true;
    s.paint.last = pos;
    ctx.composite();
}

fn clone_move(s: &mut CloneState, ctx: &mut ToolContext<'_>, pos: DocPoint, pressure: f32) {
    s.paint.cursor = Some(pos);
    let brush = ctx.brush_for(ToolKind::CloneStamp, pressure);
    s.paint.cursor_radius = brush.size / 2.0;
    if !s.paint.drawing {
        return;
    }
    let (Some(sample), Some(offset)) = (s.sample.as_ref(), s.offset) else { return };
    if pos.distance(s.paint.last) < (brush.size * CLONE_SPACING).max(1.0) {
        return;
    }
    let Some(layer) = ctx.document.active_layer_mut() else { return };
    ctx.stroke.clone_dab(pos, &brush, sample, offset);
    ctx.stroke.flush(layer, ctx.selection, false);
    s.paint.last = pos;
    ctx.composite();
}

fn draw_brush_ring(painter: &mut Overlay<'_>, s: &PaintState) {
    if let Some(c) = s.cursor
        && s.cursor_radius > 0.0
    {
        painter.circle_outline(c, s.cursor_radius + 1.0, GUIDE_SHADOW);
        painter.circle_outline(c, s.cursor_radius, GUIDE);
    }
}

// ============================================================================
// FILL / PICK / GRADIENT
// ============================================================================

fn bucket_down(ctx: &mut ToolContext<'_>, pos: DocPoint) {
    if !ctx.can_paint(ToolKind::Fill) {
        return;
    }
    let fg = ctx.colors.fg;
    let fill_color = Rgba([fg[0], fg[1], fg[2], 255]);
    let (x, y) = pos.rounded();
    // Skip the history entry when the click cannot change anything.
    if !ctx.selection.contains_point(pos.x, pos.y) {
        return;
    }
    match ctx.document.active_layer().and_then(|l| l.pixel_at_doc(x, y)) {
        Some(p) if p != fill_color => {}
        _ => return,
    }
    ctx.snapshot(ToolKind::Fill.name());
    let tolerance = ctx.settings.tolerance;
    let Some(layer) = ctx.document.active_layer_mut() else { return };
    if fill::bucket_fill(layer, ctx.selection, pos, fg, tolerance).is_some() {
        ctx.composite();
    }
}

fn pick_color(ctx: &mut ToolContext<'_>, pos: DocPoint) {
    let (w, h) = (ctx.document.width as i32, ctx.document.height as i32);
    if w == 0 || h == 0 {
        return;
    }
    let (x, y) = pos.rounded();
    if let Some(p) = ctx.engine.sample_composite(x.clamp(0, w - 1), y.clamp(0, h - 1)) {
        ctx.colors.fg = Rgba([p[0], p[1], p[2], 255]);
    }
}

fn apply_gradient(s: &DragState, ctx: &mut ToolContext<'_>) {
    if s.start.distance(s.end) <= f32::EPSILON || !ctx.can_paint(ToolKind::Gradient) {
        return;
    }
    ctx.snapshot(ToolKind::Gradient.name());
    let (fg, bg, kind) = (ctx.colors.fg, ctx.colors.bg, ctx.settings.gradient);
    let Some(layer) = ctx.document.active_layer_mut() else { return };
    if fill::gradient_fill(layer, ctx.selection, s.start, s.end, fg, bg, kind) {
        ctx.composite();
    }
}

// ============================================================================
// SELECTION TOOLS
// ============================================================================

fn commit_marquee(s: &DragState, ellipse: bool, ctx: &mut ToolContext<'_>) {
    let (a, b) = (s.start, s.end);
    if ellipse {
        ctx.snapshot(ToolKind::EllipseSelect.name());
        ctx.selection.set_from_ellipse(a.x, a.y, b.x, b.y, s.mode);
    } else {
        ctx.snapshot(ToolKind::RectSelect.name());
        ctx.selection.set_from_rectangle(a.x, a.y, b.x, b.y, s.mode);
    }
}

fn polygon_click(s: &mut PathState, ctx: &mut ToolContext<'_>, pos: DocPoint, mods: Modifiers) {
    if !s.active {
        *s = PathState { active: true, points: vec![pos], cursor: Some(pos), mode: ctx.selection_mode(mods) };
        return;
    }
    let snap = POLYGON_SNAP_PX / ctx.engine.zoom.max(0.01);
    if s.points.len() >= 3 && pos.distance(s.points[0]) <= snap {
        let points = std::mem::take(&mut s.points);
        let mode = s.mode;
        *s = PathState::default();
        ctx.snapshot(ToolKind::Polygon.name());
        ctx.selection.set_from_polygon(&points, mode);
        return;
    }
    s.points.push(pos);
    s.cursor = Some(pos);
}

fn wand_click(ctx: &mut ToolContext<'_>, pos: DocPoint, mods: Modifiers) {
    let (x, y) = pos.rounded();
    if ctx.document.active_layer().and_then(|l| l.pixel_at_doc(x, y)).is_none() {
        return;
    }
    let mode = ctx.selection_mode(mods);
    ctx.snapshot(ToolKind::MagicWand.name());
    let (tolerance, contiguous) = (ctx.settings.tolerance, ctx.settings.contiguous);
    let Some(layer) = ctx.document.active_layer() else { return };
    ctx.selection.flood_fill_select(pos, layer, tolerance, mode, contiguous);
}

// ============================================================================
// CROP / MOVE
// ============================================================================

fn commit_crop(s: &mut CropState, ctx: &mut ToolContext<'_>) {
    let Some(rect) = s.pending.take() else { return };
    *s = CropState::default();
    ctx.snapshot(ToolKind::Crop.name());
    if canvas_ops::crop_document(ctx.document, ctx.selection, rect) {
        ctx.stroke.resize(ctx.document.width, ctx.document.height);
        ctx.composite();
    }
}

fn draw_crop_guides(painter: &mut Overlay<'_>, rect: Rect) {
    let (w, h) = (painter.width() as i32, painter.height() as i32);
    for y in 0..h {
        for x in 0..w {
            if !rect.contains(x, y) {
                painter.put(x, y, CROP_DIM);
            }
        }
    }
    for i in 1..3 {
        let gx = rect.x as f32 + rect.w as f32 * i as f32 / 3.0;
        let gy = rect.y as f32 + rect.h as f32 * i as f32 / 3.0;
        painter.line(DocPoint::new(gx, rect.y as f32), DocPoint::new(gx, (rect.bottom() - 1) as f32), CROP_THIRDS);
        painter.line(DocPoint::new(rect.x as f32, gy), DocPoint::new((rect.right() - 1) as f32, gy), CROP_THIRDS);
    }
    painter.rect_outline(rect, GUIDE);
}

fn move_down(s: &mut MoveState, ctx: &mut ToolContext<'_>, pos: DocPoint) {
    let origin = match ctx.document.active_layer() {
        None => return,
        Some(l) if l.locked => {
            log_warn!("Move Layer: layer '{}' is locked", l.name);
            return;
        }
        Some(l) => (l.x, l.y),
    };
    *s = MoveState { dragging: true, start: pos, origin, recorded: false };
}

/// Follow the pointer.  The history entry is taken on the first real shift,
/// so a click without a drag records nothing.
fn move_drag(s: &mut MoveState, ctx: &mut ToolContext<'_>, pos: DocPoint) {
    if !s.dragging {
        return;
    }
    let x = (s.origin.0 as f32 + (pos.x - s.start.x)).round() as i32;
    let y = (s.origin.1 as f32 + (pos.y - s.start.y)).round() as i32;
    if ctx.document.active_layer().is_none_or(|l| (l.x, l.y) == (x, y)) {
        return;
    }
    if !s.recorded {
        ctx.snapshot(ToolKind::Move.name());
        s.recorded = true;
    }
    let Some(layer) = ctx.document.active_layer_mut() else { return };
    layer.x = x;
    layer.y = y;
    ctx.composite();
}

// ============================================================================
// FREE TRANSFORM
// ============================================================================

fn transform_down(s: &mut TransformState, ctx: &mut ToolContext<'_>, pos: DocPoint) {
    let zoom = ctx.engine.zoom.max(0.01);
    if let Some(t) = &s.session {
        match t.bbox.hit_test(pos, zoom) {
            Some(handle) => s.grab = Some((handle, pos)),
            None => commit_transform(s, ctx),
        }
        return;
    }
    if begin_transform(s, ctx) {
        s.grab = s.session.as_ref().and_then(|t| t.bbox.hit_test(pos, zoom)).map(|h| (h, pos));
    }
}

/// Lift the selection (or the whole active layer) into a floating session.
fn begin_transform(s: &mut TransformState, ctx: &mut ToolContext<'_>) -> bool {
    let layer = match ctx.document.active_layer() {
        None => return false,
        Some(l) if l.locked => {
            log_warn!("Transform: layer '{}' is locked", l.name);
            return false;
        }
        Some(l) => l,
    };
    let Some(lifted) = transform::lift(layer, ctx.selection) else {
        log_warn!("Transform: selection does not overlap layer '{}'", layer.name);
        return false;
    };
    s.session = Some(TransformSession {
        layer: layer.id,
        original: layer.pixels.clone(),
        cut: lifted.cut,
        float: lifted.float,
        start: lifted.rect,
        bbox: TransformBox::from_rect(lifted.rect),
    });
    true
}

fn transform_drag(s: &mut TransformState, ctx: &mut ToolContext<'_>, pos: DocPoint, mods: Modifiers) {
    let (Some(t), Some((handle, last))) = (s.session.as_mut(), s.grab.as_mut()) else { return };
    if pos == *last {
        return;
    }
    t.bbox.drag(*handle, *last, pos, mods.shift, ctx.engine.zoom.max(0.01));
    *last = pos;
    let Some(idx) = ctx.document.layer_index(t.layer) else { return };
    let layer = &mut ctx.document.layers[idx];
    layer.pixels = t.cut.clone();
    transform::render(&mut layer.pixels, (layer.x, layer.y), &t.float, &t.bbox);
    ctx.composite();
}

/// Bake the float into its layer as one history entry and drop the
/// selection.  A box that was never changed records nothing.
fn commit_transform(s: &mut TransformState, ctx: &mut ToolContext<'_>) {
    s.grab = None;
    let Some(t) = s.session.take() else { return };
    let Some(idx) = ctx.document.layer_index(t.layer) else { return };
    ctx.document.layers[idx].pixels = t.original;
    if t.bbox.is_untouched(t.start) {
        ctx.composite();
        return;
    }
    ctx.snapshot(ToolKind::Transform.name());
    let layer = &mut ctx.document.layers[idx];
    layer.pixels = t.cut;
    transform::render(&mut layer.pixels, (layer.x, layer.y), &t.float, &t.bbox);
    layer.rasterize();
    ctx.selection.deselect();
    log_info!(
        "Transform: {:.0}x{:.0} at {:.1} deg on layer '{}'",
        t.bbox.w,
        t.bbox.h,
        t.bbox.angle.to_degrees(),
        ctx.document.layers[idx].name
    );
    ctx.composite();
}

fn cancel_transform(s: &mut TransformState, ctx: &mut ToolContext<'_>) {
    s.grab = None;
    let Some(t) = s.session.take() else { return };
    if let Some(idx) = ctx.document.layer_index(t.layer) {
        ctx.document.layers[idx].pixels = t.original;
        ctx.composite();
    }
}

fn draw_transform_box(painter: &mut Overlay<'_>, bbox: &TransformBox, zoom: f32) {
    let corners = bbox.corners();
    painter.polyline(&corners, true, GUIDE_SHADOW);
    painter.polyline(&corners, true, GUIDE);
    let knob = bbox.rotation_handle(zoom);
    painter.line(bbox.handle_point(HandlePos::Top), knob, GUIDE);
    painter.circle_outline(knob, HANDLE_DRAW_PX / zoom, GUIDE);
    let r = (HANDLE_DRAW_PX / zoom).max(1.0);
    for h in HandlePos::all() {
        let (x, y) = bbox.handle_point(*h).rounded();
        let r = r.round() as i32;
        painter.rect_outline(Rect::from_corners(x - r, y - r, x + r + 1, y + r + 1), GUIDE);
    }
}

// ============================================================================
// TEXT
// ============================================================================

/// Open a text session, or commit the open one.  Clicking the active,
/// unlocked text layer edits it; anywhere else anchors a new layer.
fn text_click(s: &mut TextState, ctx: &mut ToolContext<'_>, pos: DocPoint) {
    if s.session.is_some() {
        commit_text(s, ctx);
        return;
    }
    let (x, y) = pos.rounded();
    let editable = ctx
        .document
        .active_layer()
        .filter(|l| l.kind == LayerKind::Text && !l.locked && l.bounds().contains(x, y))
        .and_then(|l| Some((l.id, l.text.clone()?, (l.x, l.y))));
    s.session = Some(match editable {
        Some((id, draft, origin)) => TextSession { target: TextTarget::Edit(id), draft, origin, preview: None },
        None => TextSession {
            target: TextTarget::New { x, y },
            draft: TextData { color: ctx.colors.fg.0, ..TextData::default() },
            origin: (x, y),
            preview: None,
        },
    });
}

fn commit_text(s: &mut TextState, ctx: &mut ToolContext<'_>) {
    let Some(t) = s.session.take() else { return };
    if t.draft.text.trim().is_empty() {
        return;
    }
    match t.target {
        TextTarget::New { x, y } => {
            ctx.snapshot(ToolKind::Text.name());
            ctx.document.add_text_layer(t.draft, x, y, ctx.fonts);
        }
        TextTarget::Edit(id) => {
            let Some(idx) = ctx.document.layer_index(id) else { return };
            if ctx.document.layers[idx].text.as_ref() == Some(&t.draft) {
                return;
            }
            ctx.snapshot("Edit Text");
            let layer = &mut ctx.document.layers[idx];
            layer.text = Some(t.draft);
            layer.render_text(ctx.fonts);
        }
    }
    ctx.composite();
}

fn draw_text_preview(painter: &mut Overlay<'_>, t: &TextSession) {
    let (ox, oy) = t.origin;
    let Some(preview) = &t.preview else {
        let caret = t.draft.size.max(1.0);
        painter.line(
            DocPoint::new(ox as f32, oy as f32),
            DocPoint::new(ox as f32, oy as f32 + caret),
            GUIDE,
        );
        return;
    };
    for (x, y, p) in preview.enumerate_pixels() {
        if p[3] > 0 {
            painter.put(ox + x as i32, oy + y as i32, *p);
        }
    }
    painter.rect_outline(Rect::new(ox, oy, preview.width(), preview.height()), GUIDE_SHADOW);
}
