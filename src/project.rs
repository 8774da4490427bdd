use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::Rgba;
use uuid::Uuid;

use crate::canvas::{BlendMode, Document, LayerKind};
use crate::components::history::HistoryManager;
use crate::components::tools::{ColorPair, Key, Modifiers, Tool, ToolContext, ToolKind, ToolSettings};
use crate::compositor::{AntsClock, CompositingEngine};
use crate::geometry::{DocPoint, Rect};
use crate::io::{self, ProjectData, ProjectError};
use crate::ops::canvas_ops::{self, Clipboard, FlipAxis, Interpolation, Rotation};
use crate::ops::filters::Filter;
use crate::ops::text::{FontRegistry, TextData};
use crate::selection::SelectionMask;
use crate::settings::EditorSettings;
use crate::stroke::StrokeBuffer;
use crate::{log_info, log_warn};

// ============================================================================
// EDITING CONTEXT — one open document and everything that edits it
// ============================================================================

/// Single open document with its selection, history, stroke buffer,
/// compositor, colours and active tool.
pub struct EditingContext {
    pub id: Uuid,
    /// Display name (file name or "Untitled-N").
    pub name: String,
    /// `None` for documents that were never saved.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,

    pub document: Document,
    pub selection: SelectionMask,
    pub history: HistoryManager,
    pub engine: CompositingEngine,
    pub tool_settings: ToolSettings,
    pub colors: ColorPair,
    stroke: StrokeBuffer,
    tool: Tool,
    fonts: Arc<FontRegistry>,
    /// History state id the document was last saved or loaded at.
    clean_state: u64,
}

impl EditingContext {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self::from_document(name, Document::new(width, height))
    }

    pub fn from_document(name: impl Into<String>, document: Document) -> Self {
        let (w, h) = (document.width, document.height);
        let mut ctx = Self {
            id: Uuid::new_v4(),
            name: name.into(),
            path: None,
            is_dirty: false,
            selection: SelectionMask::new(w, h),
            history: HistoryManager::default(),
            engine: CompositingEngine::new(w, h),
            tool_settings: ToolSettings::default(),
            colors: ColorPair::default(),
            stroke: StrokeBuffer::new(w, h),
            tool: Tool::default(),
            fonts: Arc::new(FontRegistry::new()),
            clean_state: 0,
            document,
        };
        ctx.refresh();
        ctx
    }

    /// Context for a loaded project or imported image.
    pub fn from_project(path: &Path, project: ProjectData) -> Self {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        let mut ctx = Self::from_document(name, project.document);
        ctx.path = Some(path.to_path_buf());
        ctx.colors = ColorPair { fg: Rgba(project.fg_color), bg: Rgba(project.bg_color) };
        ctx.engine.zoom = project.zoom;
        ctx
    }

    /// Open any supported file (`.pcp` project or image).
    pub fn open(path: &Path) -> Result<Self, ProjectError> {
        Ok(Self::from_project(path, io::load_image_document(path)?))
    }

    /// Apply editor preferences: history limits, grid, ants speed and tool defaults.
    pub fn apply_settings(&mut self, settings: &EditorSettings) {
        self.history.set_limits(settings.max_undo_steps, settings.history_memory_bytes());
        self.engine.show_grid = settings.show_grid;
        self.engine.grid_spacing = settings.grid_spacing;
        self.engine.ants = AntsClock::new(settings.ants_interval());
        self.tool_settings = settings.tool_settings();
        self.redraw_overlay();
    }

    pub fn set_fonts(&mut self, fonts: Arc<FontRegistry>) {
        self.fonts = fonts;
    }

    pub fn fonts(&self) -> &FontRegistry {
        &self.fonts
    }

    pub fn tool(&self) -> &Tool {
        &self.tool
    }

    /// Editor state worth persisting alongside the document.
    pub fn project_data(&self) -> ProjectData {
        ProjectData {
            document: self.document.clone(),
            fg_color: self.colors.fg.0,
            bg_color: self.colors.bg.0,
            zoom: self.engine.zoom,
        }
    }

    /// Save as a `.pcp` project and mark the context clean.
    pub fn save_project(&mut self, path: &Path) -> Result<(), ProjectError> {
        io::save_project(&self.project_data(), path)?;
        self.path = Some(path.to_path_buf());
        if let Some(name) = path.file_name() {
            self.name = name.to_string_lossy().to_string();
        }
        self.mark_clean();
        Ok(())
    }

    /// Write the flattened image as PNG.  Does not change the dirty flag.
    pub fn export_png(&self, path: &Path) -> Result<(), ProjectError> {
        io::save_png(&self.document.flattened_image(), path)
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
        self.clean_state = self.history.state_id();
    }

    /// Display title with a dirty marker.
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Resize working buffers to the document, recomposite and redraw the overlay.
    pub fn refresh(&mut self) {
        self.stroke.resize(self.document.width, self.document.height);
        self.engine.composite(&self.document);
        self.redraw_overlay();
        self.is_dirty = self.history.state_id() != self.clean_state;
    }

    pub fn redraw_overlay(&mut self) {
        self.engine.draw_overlay(&self.selection, Some(&self.tool));
    }

    /// Advance the marching ants.  Returns `true` when the overlay changed.
    pub fn tick(&mut self, elapsed: Duration) -> bool {
        self.engine.tick(elapsed, &self.selection, Some(&self.tool))
    }

    // ------------------------------------------------------------------
    // Tool input
    // ------------------------------------------------------------------

    fn split(&mut self) -> (&mut Tool, ToolContext<'_>) {
        (
            &mut self.tool,
            ToolContext {
                document: &mut self.document,
                selection: &mut self.selection,
                history: &mut self.history,
                stroke: &mut self.stroke,
                engine: &mut self.engine,
                settings: &self.tool_settings,
                colors: &mut self.colors,
                fonts: &self.fonts,
            },
        )
    }

    /// Switch tools, finishing whatever the previous tool had in flight.
    pub fn select_tool(&mut self, kind: ToolKind) {
        if self.tool.kind() == kind {
            return;
        }
        let (tool, mut ctx) = self.split();
        tool.deactivate(&mut ctx);
        self.tool = Tool::new(kind);
        self.after_input();
    }

    pub fn pointer_down(&mut self, pos: DocPoint, mods: Modifiers, pressure: f32) {
        let (tool, mut ctx) = self.split();
        tool.on_pointer_down(&mut ctx, pos, mods, pressure);
        self.after_input();
    }

    pub fn pointer_move(&mut self, pos: DocPoint, mods: Modifiers, pressure: f32) {
        let (tool, mut ctx) = self.split();
        tool.on_pointer_move(&mut ctx, pos, mods, pressure);
        self.after_input();
    }

    pub fn pointer_up(&mut self, pos: DocPoint, mods: Modifiers) {
        let (tool, mut ctx) = self.split();
        tool.on_pointer_up(&mut ctx, pos, mods);
        self.after_input();
    }

    /// Returns `true` when the active tool consumed the key.
    pub fn key_down(&mut self, key: Key) -> bool {
        let (tool, mut ctx) = self.split();
        let handled = tool.on_key_down(&mut ctx, key);
        self.after_input();
        handled
    }

    pub fn close_polygon(&mut self) -> bool {
        let (tool, mut ctx) = self.split();
        let closed = tool.close_polygon(&mut ctx);
        self.after_input();
        closed
    }

    /// Update the text the Text tool is typing.  Returns `false` when no
    /// text session is open.
    pub fn set_text_draft(&mut self, text: TextData) -> bool {
        let (tool, ctx) = self.split();
        let changed = tool.set_text_draft(&ctx, text);
        self.redraw_overlay();
        changed
    }

    /// Tools composite as they paint; keep sizes and the overlay in step.
    fn after_input(&mut self) {
        self.stroke.resize(self.document.width, self.document.height);
        if self.engine.size() != (self.document.width, self.document.height) {
            self.engine.composite(&self.document);
        }
        self.redraw_overlay();
        self.is_dirty = self.history.state_id() != self.clean_state;
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub fn undo(&mut self) -> Option<String> {
        if self.tool.is_busy() {
            log_warn!("undo ignored while {} is in use", self.tool.kind().name());
            return None;
        }
        let label = self.history.undo(&mut self.document, &mut self.selection, &self.fonts)?;
        self.refresh();
        Some(label)
    }

    pub fn redo(&mut self) -> Option<String> {
        if self.tool.is_busy() {
            log_warn!("redo ignored while {} is in use", self.tool.kind().name());
            return None;
        }
        let label = self.history.redo(&mut self.document, &mut self.selection, &self.fonts)?;
        self.refresh();
        Some(label)
    }

    pub fn jump_to(&mut self, index: usize) -> bool {
        if self.tool.is_busy() {
            return false;
        }
        let moved = self.history.jump_to(index, &mut self.document, &mut self.selection, &self.fonts);
        if moved {
            self.refresh();
        }
        moved
    }

    /// Snapshot, mutate, refresh.  Callers check preconditions first so a
    /// refused operation never leaves an empty history entry behind.
    fn apply<R>(&mut self, label: &str, op: impl FnOnce(&mut Document, &mut SelectionMask, &FontRegistry) -> R) -> R {
        self.history.snapshot(label, &self.document, &self.selection);
        let out = op(&mut self.document, &mut self.selection, &self.fonts);
        self.refresh();
        out
    }

    fn valid_layer(&self, index: usize, action: &str) -> bool {
        if index < self.document.layers.len() {
            return true;
        }
        log_warn!("{}: no layer at index {}", action, index);
        false
    }

    fn unlocked_active(&self, action: &str) -> bool {
        match self.document.active_layer() {
            Some(l) if l.locked => {
                log_warn!("{}: layer '{}' is locked", action, l.name);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Layer operations
    // ------------------------------------------------------------------

    pub fn select_layer(&mut self, index: usize) {
        self.document.select_layer(index);
    }

    pub fn add_layer(&mut self, name: Option<&str>) -> usize {
        self.apply("New Layer", |doc, _, _| doc.add_layer(name))
    }

    pub fn add_text_layer(&mut self, text: TextData, x: i32, y: i32) -> usize {
        self.apply("Text", |doc, _, fonts| doc.add_text_layer(text, x, y, fonts))
    }

    /// Replace a text layer's description and re-render it.
    pub fn edit_text_layer(&mut self, index: usize, text: TextData) -> bool {
        if !self.valid_layer(index, "edit text") {
            return false;
        }
        if self.document.layers[index].kind != LayerKind::Text {
            log_warn!("edit text: layer '{}' is not a text layer", self.document.layers[index].name);
            return false;
        }
        self.apply("Edit Text", |doc, _, fonts| {
            let layer = &mut doc.layers[index];
            layer.text = Some(text);
            layer.render_text(fonts);
            true
        })
    }

    pub fn duplicate_layer(&mut self) -> Option<usize> {
        self.document.active_layer()?;
        self.apply("Duplicate Layer", |doc, _, _| doc.duplicate_layer())
    }

    pub fn delete_layer(&mut self, index: usize) -> bool {
        if !self.valid_layer(index, "delete layer") {
            return false;
        }
        if self.document.layers.len() <= 1 {
            log_warn!("delete layer: cannot delete the last layer");
            return false;
        }
        self.apply("Delete Layer", |doc, _, _| doc.delete_layer(index))
    }

    pub fn move_layer_up(&mut self, index: usize) -> bool {
        if index + 1 >= self.document.layers.len() {
            return false;
        }
        self.apply("Move Layer Up", |doc, _, _| doc.move_layer_up(index))
    }

    pub fn move_layer_down(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.document.layers.len() {
            return false;
        }
        self.apply("Move Layer Down", |doc, _, _| doc.move_layer_down(index))
    }

    pub fn merge_down(&mut self, index: usize) -> bool {
        if index == 0 || !self.valid_layer(index, "merge down") {
            return false;
        }
        self.apply("Merge Down", |doc, _, _| doc.merge_down(index))
    }

    pub fn flatten(&mut self) {
        self.apply("Flatten", |doc, _, _| doc.flatten());
    }

    pub fn rename_layer(&mut self, index: usize, name: &str) -> bool {
        if !self.valid_layer(index, "rename layer") || self.document.layers[index].name == name {
            return false;
        }
        self.apply("Rename Layer", |doc, _, _| doc.rename_layer(index, name))
    }

    pub fn set_layer_opacity(&mut self, index: usize, opacity: i32) -> bool {
        if !self.valid_layer(index, "layer opacity")
            || i32::from(self.document.layers[index].opacity) == opacity.clamp(0, 100)
        {
            return false;
        }
        self.apply("Layer Opacity", |doc, _, _| doc.set_opacity(index, opacity))
    }

    pub fn set_layer_blend_mode(&mut self, index: usize, mode: BlendMode) -> bool {
        if !self.valid_layer(index, "blend mode") || self.document.layers[index].blend_mode == mode {
            return false;
        }
        self.apply("Blend Mode", |doc, _, _| doc.set_blend_mode(index, mode))
    }

    pub fn set_layer_visible(&mut self, index: usize, visible: bool) -> bool {
        if !self.valid_layer(index, "layer visibility") || self.document.layers[index].visible == visible {
            return false;
        }
        self.apply("Layer Visibility", |doc, _, _| doc.set_visible(index, visible))
    }

    pub fn set_layer_locked(&mut self, index: usize, locked: bool) -> bool {
        if !self.valid_layer(index, "lock layer") || self.document.layers[index].locked == locked {
            return false;
        }
        self.apply("Lock Layer", |doc, _, _| doc.set_locked(index, locked))
    }

    // ------------------------------------------------------------------
    // Document operations
    // ------------------------------------------------------------------

    pub fn crop(&mut self, rect: Rect) -> bool {
        let Some(rect) = rect.clamp_to(self.document.width, self.document.height) else {
            log_warn!("crop: rectangle lies outside the document");
            return false;
        };
        self.apply("Crop", |doc, sel, _| canvas_ops::crop_document(doc, sel, rect))
    }

    /// Crop to the selection's bounding box.
    pub fn crop_to_selection(&mut self) -> bool {
        match self.selection.bounding_box() {
            Some(rect) => self.crop(rect),
            None => false,
        }
    }

    pub fn resize_image(&mut self, width: u32, height: u32, interp: Interpolation) {
        self.apply("Resize Image", |doc, sel, _| canvas_ops::resize_document(doc, sel, width, height, interp));
    }

    pub fn resize_canvas(&mut self, width: u32, height: u32, anchor_x: f32, anchor_y: f32) {
        self.apply("Resize Canvas", |doc, sel, _| {
            canvas_ops::canvas_resize(doc, sel, width, height, anchor_x, anchor_y)
        });
    }

    pub fn rotate(&mut self, rotation: Rotation) {
        self.apply("Rotate", |doc, sel, _| canvas_ops::rotate_document(doc, sel, rotation));
    }

    pub fn flip(&mut self, axis: FlipAxis) {
        self.apply("Flip", |doc, _, _| canvas_ops::flip_document(doc, axis));
    }

    /// Fill the selection (or the whole layer) with the foreground colour.
    pub fn fill_with_foreground(&mut self) -> bool {
        if !self.unlocked_active("fill") {
            return false;
        }
        let color = self.colors.fg;
        self.apply("Fill", |doc, sel, _| canvas_ops::fill_selection(doc, sel, color))
    }

    /// Run a colour adjustment or filter on the active layer as one undoable
    /// step.  Refused (no history entry) when there is no active layer, the
    /// layer is locked, or the selection misses the layer entirely.
    pub fn apply_filter(&mut self, filter: &Filter) -> bool {
        if !self.unlocked_active(filter.name()) {
            return false;
        }
        if !self.document.active_layer().is_some_and(|l| self.selection.touches(l)) {
            log_warn!("{}: selection does not overlap the active layer", filter.name());
            return false;
        }
        log_info!("{} on layer {}", filter.name(), self.document.active_layer_index);
        self.apply(filter.name(), |doc, sel, _| {
            let Some(layer) = doc.active_layer_mut() else {
                return false;
            };
            filter.apply(layer, sel);
            layer.rasterize();
            true
        })
    }

    // ------------------------------------------------------------------
    // Selection commands
    // ------------------------------------------------------------------

    pub fn select_all(&mut self) {
        self.apply("Select All", |_, sel, _| sel.select_all());
    }

    pub fn deselect(&mut self) {
        if self.selection.is_empty() {
            return;
        }
        self.apply("Deselect", |_, sel, _| sel.deselect());
    }

    pub fn invert_selection(&mut self) {
        self.apply("Invert Selection", |_, sel, _| sel.invert());
    }

    pub fn expand_selection(&mut self, radius: u32) {
        if self.selection.is_empty() || radius == 0 {
            return;
        }
        self.apply("Expand Selection", |_, sel, _| sel.expand(radius));
    }

    pub fn contract_selection(&mut self, radius: u32) {
        if self.selection.is_empty() || radius == 0 {
            return;
        }
        self.apply("Contract Selection", |_, sel, _| sel.contract(radius));
    }

    pub fn feather_selection(&mut self, radius: u32) {
        if self.selection.is_empty() || radius == 0 {
            return;
        }
        self.apply("Feather Selection", |_, sel, _| sel.feather(radius));
    }

    // ------------------------------------------------------------------
    // Clipboard
    // ------------------------------------------------------------------

    pub fn copy(&self) -> Option<Clipboard> {
        canvas_ops::copy_selection(&self.document, &self.selection)
    }

    pub fn cut(&mut self) -> Option<Clipboard> {
        if !self.unlocked_active("cut") {
            return None;
        }
        self.apply("Cut", |doc, sel, _| canvas_ops::cut_selection(doc, sel))
    }

    pub fn delete_selected(&mut self) -> bool {
        if !self.unlocked_active("delete") {
            return false;
        }
        self.apply("Delete", |doc, sel, _| canvas_ops::erase_selection(doc, sel))
    }

    pub fn paste(&mut self, clip: &Clipboard) -> usize {
        self.apply("Paste", |doc, _, _| canvas_ops::paste_as_layer(doc, clip))
    }
}

// ============================================================================
// WORKSPACE — open documents as tabs
// ============================================================================

/// Every open editing context plus the shared clipboard.  Exactly one
/// context is active while any are open.
#[derive(Default)]
pub struct Workspace {
    pub contexts: Vec<EditingContext>,
    active: Option<usize>,
    pub clipboard: Option<Clipboard>,
    untitled_counter: usize,
    settings: EditorSettings,
    fonts: Arc<FontRegistry>,
}

impl Workspace {
    pub fn new(settings: EditorSettings, fonts: Arc<FontRegistry>) -> Self {
        Self { settings, fonts, ..Self::default() }
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active(&self) -> Option<&EditingContext> {
        self.active.and_then(|i| self.contexts.get(i))
    }

    pub fn active_mut(&mut self) -> Option<&mut EditingContext> {
        self.active.and_then(|i| self.contexts.get_mut(i))
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Add a context as a new tab and make it active.  Returns its index.
    pub fn open(&mut self, mut ctx: EditingContext) -> usize {
        ctx.apply_settings(&self.settings);
        ctx.set_fonts(Arc::clone(&self.fonts));
        log_info!("workspace: opened '{}'", ctx.name);
        self.deactivate_active();
        self.contexts.push(ctx);
        let index = self.contexts.len() - 1;
        self.active = Some(index);
        index
    }

    /// Create a new untitled document and switch to it.
    pub fn new_document(&mut self, width: u32, height: u32) -> usize {
        self.untitled_counter += 1;
        let ctx = EditingContext::new(format!("Untitled-{}", self.untitled_counter), width, height);
        self.open(ctx)
    }

    /// Open a file, or switch to it when it is already open.
    pub fn open_path(&mut self, path: &Path) -> Result<usize, ProjectError> {
        if let Some(index) = self.find_by_path(path) {
            self.switch_to(index);
            return Ok(index);
        }
        let ctx = EditingContext::open(path)?;
        Ok(self.open(ctx))
    }

    pub fn find_by_path(&self, path: &Path) -> Option<usize> {
        self.contexts.iter().position(|c| c.path.as_deref() == Some(path))
    }

    /// Make `index` the active tab.  Returns `false` for an invalid index
    /// or the tab that is already active.
    pub fn switch_to(&mut self, index: usize) -> bool {
        if index >= self.contexts.len() || Some(index) == self.active {
            return false;
        }
        self.deactivate_active();
        self.active = Some(index);
        let ctx = &mut self.contexts[index];
        ctx.refresh();
        log_info!("workspace: switched to '{}'", ctx.name);
        true
    }

    /// Finish whatever the active tab's tool has in flight before focus moves.
    fn deactivate_active(&mut self) {
        if let Some(prev) = self.active_mut() {
            let (tool, mut ctx) = prev.split();
            tool.deactivate(&mut ctx);
            prev.after_input();
        }
    }

    /// Close a tab.  The active index follows the remaining tabs; closing
    /// the last one leaves the workspace empty.
    pub fn close(&mut self, index: usize) -> Option<EditingContext> {
        if index >= self.contexts.len() {
            return None;
        }
        let closed = self.contexts.remove(index);
        let was_active = self.active == Some(index);
        self.active = match self.active {
            _ if self.contexts.is_empty() => None,
            Some(a) if a > index => Some(a - 1),
            Some(a) => Some(a.min(self.contexts.len() - 1)),
            None => None,
        };
        if was_active && let Some(ctx) = self.active_mut() {
            ctx.refresh();
        }
        log_info!("workspace: closed '{}'", closed.name);
        Some(closed)
    }

    /// Copy from the active context into the shared clipboard.
    pub fn copy(&mut self) -> bool {
        let clip = self.active().and_then(|c| c.copy());
        let copied = clip.is_some();
        if copied {
            self.clipboard = clip;
        }
        copied
    }

    pub fn cut(&mut self) -> bool {
        let clip = self.active_mut().and_then(|c| c.cut());
        let cut = clip.is_some();
        if cut {
            self.clipboard = clip;
        }
        cut
    }

    /// Paste the shared clipboard into the active context as a new layer.
    pub fn paste(&mut self) -> Option<usize> {
        let clip = self.clipboard.clone()?;
        Some(self.active_mut()?.paste(&clip))
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    /// Replace the editor settings and push them into every open context.
    pub fn set_settings(&mut self, settings: EditorSettings) {
        for ctx in &mut self.contexts {
            ctx.apply_settings(&settings);
        }
        self.settings = settings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::SelectionMode;

    #[test]
    fn refused_layer_op_leaves_no_history() {
        let mut ctx = EditingContext::new("t", 8, 8);
        assert!(!ctx.delete_layer(0));
        assert!(!ctx.merge_down(0));
        assert!(ctx.history.is_empty());
        assert!(!ctx.is_dirty);
    }

    #[test]
    fn undo_returns_to_clean() {
        let mut ctx = EditingContext::new("t", 8, 8);
        ctx.add_layer(None);
        assert!(ctx.is_dirty);
        assert_eq!(ctx.display_title(), "t*");
        assert_eq!(ctx.undo().as_deref(), Some("New Layer"));
        assert_eq!(ctx.document.layers.len(), 1);
        assert!(!ctx.is_dirty);
    }

    #[test]
    fn crop_to_selection_resizes_everything() {
        let mut ctx = EditingContext::new("t", 20, 20);
        ctx.selection.set_from_rectangle(2.0, 2.0, 8.0, 6.0, SelectionMode::Replace);
        assert!(ctx.crop_to_selection());
        assert_eq!((ctx.document.width, ctx.document.height), (6, 4));
        assert_eq!(ctx.engine.size(), (6, 4));
        assert!(ctx.selection.is_empty());
        ctx.undo();
        assert_eq!((ctx.document.width, ctx.document.height), (20, 20));
        assert_eq!(ctx.engine.size(), (20, 20));
    }

    #[test]
    fn tabs_keep_independent_state() {
        let mut ws = Workspace::default();
        let a = ws.new_document(10, 10);
        ws.active_mut().unwrap().select_all();
        let b = ws.new_document(5, 5);
        assert_eq!(ws.active_index(), Some(b));
        assert!(ws.active().unwrap().selection.is_empty());
        assert!(ws.switch_to(a));
        assert!(!ws.active().unwrap().selection.is_empty());
        assert!(!ws.switch_to(a));
    }

    #[test]
    fn closing_tabs_tracks_active_index() {
        let mut ws = Workspace::default();
        ws.new_document(4, 4);
        ws.new_document(4, 4);
        ws.new_document(4, 4);
        ws.switch_to(2);
        ws.close(0);
        assert_eq!(ws.active_index(), Some(1));
        ws.close(1);
        assert_eq!(ws.active_index(), Some(0));
        ws.close(0);
        assert_eq!(ws.active_index(), None);
        assert!(ws.close(0).is_none());
    }

    #[test]
    fn clipboard_pastes_across_tabs() {
        let mut ws = Workspace::default();
        ws.new_document(6, 6);
        assert!(ws.copy());
        ws.new_document(6, 6);
        let idx = ws.paste().unwrap();
        let ctx = ws.active().unwrap();
        assert_eq!(ctx.document.layers[idx].name, "Pasted Layer");
        assert_eq!(ctx.history.len(), 1);
    }
}
