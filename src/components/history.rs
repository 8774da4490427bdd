use std::collections::{HashMap, VecDeque};

use image::RgbaImage;
use rayon::prelude::*;
use uuid::Uuid;

use crate::canvas::{BlendMode, Document, Layer, LayerKind};
use crate::geometry::Rect;
use crate::io::{decode_png, encode_png};
use crate::ops::text::{FontRegistry, TextData};
use crate::selection::SelectionMask;
use crate::{log_err, log_info, log_warn};

/// Default number of undo steps kept.
pub const DEFAULT_MAX_ENTRIES: usize = 30;
/// Default memory cap across all entries (256 MB).
pub const DEFAULT_MEMORY_LIMIT: usize = 256 * 1024 * 1024;

// ============================================================================
// SNAPSHOTS — full-document state, PNG-compressed per layer
// ============================================================================

/// One layer as captured in history.  Raster pixels are PNG-encoded; text
/// layers keep only their description and are re-rendered on restore.
#[derive(Clone, Debug)]
pub struct LayerSnapshot {
    pub id: Uuid,
    pub name: String,
    pub visible: bool,
    pub locked: bool,
    pub opacity: u8,
    pub blend_mode: BlendMode,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub kind: LayerKind,
    pub text: Option<TextData>,
    pub png: Vec<u8>,
}

impl LayerSnapshot {
    fn capture(layer: &Layer) -> Self {
        let is_text = layer.kind == LayerKind::Text && layer.text.is_some();
        let png = if is_text {
            Vec::new()
        } else {
            encode_png(&layer.pixels).unwrap_or_else(|e| {
                log_err!("history: failed to encode layer '{}': {}", layer.name, e);
                Vec::new()
            })
        };
        Self {
            id: layer.id,
            name: layer.name.clone(),
            visible: layer.visible,
            locked: layer.locked,
            opacity: layer.opacity,
            blend_mode: layer.blend_mode,
            x: layer.x,
            y: layer.y,
            width: layer.width(),
            height: layer.height(),
            kind: layer.kind,
            text: layer.text.clone(),
            png,
        }
    }

    fn is_text(&self) -> bool {
        self.kind == LayerKind::Text && self.text.is_some()
    }

    /// Decode the stored pixels.  A corrupt snapshot yields a blank buffer
    /// at the recorded size so the layer stays registered.
    fn decode(&self) -> RgbaImage {
        match decode_png(&self.png) {
            Ok(img) if img.dimensions() == (self.width, self.height) => img,
            Ok(img) => {
                log_warn!(
                    "history: layer '{}' decoded as {}x{}, expected {}x{}",
                    self.name,
                    img.width(),
                    img.height(),
                    self.width,
                    self.height
                );
                RgbaImage::new(self.width.max(1), self.height.max(1))
            }
            Err(e) => {
                log_warn!("history: failed to decode layer '{}': {}", self.name, e);
                RgbaImage::new(self.width.max(1), self.height.max(1))
            }
        }
    }

    fn memory_bytes(&self) -> usize {
        self.png.len() + self.name.len() + self.text.as_ref().map_or(0, |t| t.text.len())
    }
}

/// Complete editable state of one document: layers, selection and size.
#[derive(Clone, Debug)]
pub struct DocumentSnapshot {
    pub width: u32,
    pub height: u32,
    pub active_layer_index: usize,
    pub layers: Vec<LayerSnapshot>,
    /// Raw coverage bytes; empty when nothing was selected.
    pub mask: Vec<u8>,
    pub bbox: Option<Rect>,
}

impl DocumentSnapshot {
    /// Capture `document` and `selection`.  Layers are encoded in parallel.
    pub fn capture(document: &Document, selection: &SelectionMask) -> Self {
        let layers = document.layers.par_iter().map(LayerSnapshot::capture).collect();
        let bbox = selection.bounding_box();
        Self {
            width: document.width,
            height: document.height,
            active_layer_index: document.active_layer_index,
            layers,
            mask: if bbox.is_some() { selection.data().to_vec() } else { Vec::new() },
            bbox,
        }
    }

    /// Replace the live document and selection with this snapshot.
    ///
    /// Live layers whose id still exists are reused, missing ones are
    /// created, absent ones dropped, and the stack is reordered to match.
    /// All pixel data is decoded before any layer is touched.
    pub fn restore(&self, document: &mut Document, selection: &mut SelectionMask, fonts: &FontRegistry) {
        let decoded: Vec<Option<RgbaImage>> = self
            .layers
            .par_iter()
            .map(|ls| if ls.is_text() { None } else { Some(ls.decode()) })
            .collect();

        document.width = self.width;
        document.height = self.height;

        let mut live: HashMap<Uuid, Layer> = document.layers.drain(..).map(|l| (l.id, l)).collect();
        for (ls, pixels) in self.layers.iter().zip(decoded) {
            let mut layer = live.remove(&ls.id).unwrap_or_else(|| {
                let mut fresh = Layer::new(ls.name.clone(), 1, 1);
                fresh.id = ls.id;
                fresh
            });
            layer.name = ls.name.clone();
            layer.visible = ls.visible;
            layer.locked = ls.locked;
            layer.opacity = ls.opacity;
            layer.blend_mode = ls.blend_mode;
            layer.x = ls.x;
            layer.y = ls.y;
            layer.kind = ls.kind;
            layer.text = ls.text.clone();
            match pixels {
                Some(img) => layer.pixels = img,
                None => layer.render_text(fonts),
            }
            document.layers.push(layer);
        }

        if self.mask.len() == self.width as usize * self.height as usize && self.bbox.is_some() {
            selection.restore_raw(self.width, self.height, self.mask.clone(), self.bbox);
        } else {
            selection.reset(self.width, self.height);
        }

        document.active_layer_index = self.active_layer_index;
        document.clamp_active();
    }

    pub fn memory_bytes(&self) -> usize {
        self.layers.iter().map(LayerSnapshot::memory_bytes).sum::<usize>() + self.mask.len()
    }
}

/// A labelled snapshot of the state *before* an action.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub label: String,
    pub before: DocumentSnapshot,
    /// State id before and after this action.
    parent: u64,
    serial: u64,
}

// ============================================================================
// HISTORY MANAGER — linear snapshot stack with count and memory limits
// ============================================================================

/// Linear undo/redo stack.
///
/// `entries[k]` holds the state before action `k`; `cursor` is the number
/// of actions currently applied.  When the cursor sits at the tip, the live
/// state is captured on the first undo so redo can return to it.
pub struct HistoryManager {
    entries: VecDeque<HistoryEntry>,
    cursor: usize,
    tip: Option<DocumentSnapshot>,
    max_entries: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across all entries.
    total_memory: usize,
    /// Id of the live state; see [`HistoryManager::state_id`].
    current: u64,
    next_serial: u64,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl HistoryManager {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: 0,
            tip: None,
            max_entries: max_entries.max(1),
            max_memory_bytes: Some(DEFAULT_MEMORY_LIMIT),
            total_memory: 0,
            current: 0,
            next_serial: 1,
        }
    }

    pub fn with_memory_limit(mut self, bytes: Option<usize>) -> Self {
        self.max_memory_bytes = bytes;
        self
    }

    /// Record the current state.  Call BEFORE performing the operation.
    pub fn snapshot(&mut self, label: &str, document: &Document, selection: &SelectionMask) {
        for dropped in self.entries.drain(self.cursor..) {
            self.total_memory = self.total_memory.saturating_sub(dropped.before.memory_bytes());
        }
        self.tip = None;

        let before = DocumentSnapshot::capture(document, selection);
        self.total_memory += before.memory_bytes();
        let serial = self.next_serial;
        self.next_serial += 1;
        self.entries.push_back(HistoryEntry { label: label.to_string(), before, parent: self.current, serial });
        self.current = serial;
        self.prune();
        self.cursor = self.entries.len();
        log_info!("history: '{}' ({} entries, {} bytes)", label, self.entries.len(), self.total_memory);
    }

    /// Step back one action.  Returns the label of the undone action.
    pub fn undo(&mut self, document: &mut Document, selection: &mut SelectionMask, fonts: &FontRegistry) -> Option<String> {
        if self.cursor == 0 {
            return None;
        }
        if self.cursor == self.entries.len() {
            self.tip = Some(DocumentSnapshot::capture(document, selection));
        }
        self.cursor -= 1;
        let entry = &self.entries[self.cursor];
        self.current = entry.parent;
        entry.before.restore(document, selection, fonts);
        log_info!("undo: '{}'", entry.label);
        Some(entry.label.clone())
    }

    /// Re-apply one undone action.  Returns its label.
    pub fn redo(&mut self, document: &mut Document, selection: &mut SelectionMask, fonts: &FontRegistry) -> Option<String> {
        if self.cursor >= self.entries.len() {
            return None;
        }
        let label = self.entries[self.cursor].label.clone();
        self.cursor += 1;
        self.current = self.state_at(self.cursor);
        self.restore_cursor(document, selection, fonts);
        log_info!("redo: '{}'", label);
        Some(label)
    }

    /// Restore the state with `index` actions applied (`len()` = latest).
    pub fn jump_to(&mut self, index: usize, document: &mut Document, selection: &mut SelectionMask, fonts: &FontRegistry) -> bool {
        if index > self.entries.len() || index == self.cursor {
            return false;
        }
        if self.cursor == self.entries.len() {
            self.tip = Some(DocumentSnapshot::capture(document, selection));
        }
        self.cursor = index;
        self.current = self.state_at(index);
        self.restore_cursor(document, selection, fonts);
        log_info!("history: jumped to step {}", index);
        true
    }

    fn restore_cursor(&self, document: &mut Document, selection: &mut SelectionMask, fonts: &FontRegistry) {
        let snapshot = match self.entries.get(self.cursor) {
            Some(entry) => Some(&entry.before),
            None => self.tip.as_ref(),
        };
        match snapshot {
            Some(s) => s.restore(document, selection, fonts),
            None => log_warn!("history: no state recorded for step {}", self.cursor),
        }
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.cursor.checked_sub(1).and_then(|i| self.entries.get(i)).map(|e| e.label.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.entries.get(self.cursor).map(|e| e.label.as_str())
    }

    /// Labels of every recorded action, oldest first.
    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    /// Identifies the live document state.  Every snapshot starts a new id;
    /// undo and redo return to the id the restored state had, so comparing
    /// against a saved id tells whether the document is dirty.
    pub fn state_id(&self) -> u64 {
        self.current
    }

    fn state_at(&self, cursor: usize) -> u64 {
        match self.entries.get(cursor) {
            Some(entry) => entry.parent,
            None => self.entries.back().map_or(self.current, |e| e.serial),
        }
    }

    /// Apply new limits, evicting old entries if they no longer fit.
    pub fn set_limits(&mut self, max_entries: usize, max_memory_bytes: Option<usize>) {
        self.max_entries = max_entries.max(1);
        self.max_memory_bytes = max_memory_bytes;
        let before = self.entries.len();
        self.prune();
        self.cursor = self.cursor.saturating_sub(before - self.entries.len());
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
        self.tip = None;
        self.total_memory = 0;
    }

    /// Evict the oldest entries beyond the count and memory limits.
    fn prune(&mut self) {
        while self.entries.len() > self.max_entries {
            if let Some(removed) = self.entries.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.before.memory_bytes());
            }
        }
        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.entries.len() > 1 {
                if let Some(removed) = self.entries.pop_front() {
                    self.total_memory = self.total_memory.saturating_sub(removed.before.memory_bytes());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn paint(doc: &mut Document, color: Rgba<u8>) {
        doc.layers[0].pixels.put_pixel(1, 1, color);
    }

    #[test]
    fn undo_redo_walks_the_stack() {
        let fonts = FontRegistry::new();
        let mut doc = Document::blank(4, 4);
        let mut sel = SelectionMask::new(4, 4);
        let mut h = HistoryManager::new(10);

        h.snapshot("red", &doc, &sel);
        paint(&mut doc, Rgba([255, 0, 0, 255]));
        h.snapshot("green", &doc, &sel);
        paint(&mut doc, Rgba([0, 255, 0, 255]));

        assert_eq!(h.undo(&mut doc, &mut sel, &fonts).as_deref(), Some("green"));
        assert_eq!(*doc.layers[0].pixels.get_pixel(1, 1), Rgba([255, 0, 0, 255]));
        assert_eq!(h.undo(&mut doc, &mut sel, &fonts).as_deref(), Some("red"));
        assert_eq!(doc.layers[0].pixels.get_pixel(1, 1)[3], 0);
        assert!(h.undo(&mut doc, &mut sel, &fonts).is_none());

        assert_eq!(h.redo(&mut doc, &mut sel, &fonts).as_deref(), Some("red"));
        assert_eq!(h.redo(&mut doc, &mut sel, &fonts).as_deref(), Some("green"));
        assert_eq!(*doc.layers[0].pixels.get_pixel(1, 1), Rgba([0, 255, 0, 255]));
        assert!(!h.can_redo());
    }

    #[test]
    fn new_snapshot_discards_redo_branch() {
        let fonts = FontRegistry::new();
        let mut doc = Document::blank(4, 4);
        let mut sel = SelectionMask::new(4, 4);
        let mut h = HistoryManager::new(10);
        h.snapshot("a", &doc, &sel);
        h.snapshot("b", &doc, &sel);
        h.undo(&mut doc, &mut sel, &fonts);
        h.snapshot("c", &doc, &sel);
        assert_eq!(h.labels(), vec!["a", "c"]);
        assert!(!h.can_redo());
    }

    #[test]
    fn oldest_entries_are_evicted() {
        let doc = Document::blank(2, 2);
        let sel = SelectionMask::new(2, 2);
        let mut h = HistoryManager::new(3);
        for label in ["1", "2", "3", "4", "5"] {
            h.snapshot(label, &doc, &sel);
        }
        assert_eq!(h.labels(), vec!["3", "4", "5"]);
        assert_eq!(h.cursor(), 3);
    }

    #[test]
    fn corrupt_pixels_restore_as_blank_layer() {
        let fonts = FontRegistry::new();
        let mut doc = Document::new(3, 3);
        let mut sel = SelectionMask::new(3, 3);
        let mut h = HistoryManager::new(5);
        h.snapshot("x", &doc, &sel);
        h.entries[0].before.layers[0].png = vec![0xde, 0xad];
        doc.layers[0].pixels.put_pixel(0, 0, Rgba([1, 2, 3, 4]));

        h.undo(&mut doc, &mut sel, &fonts);
        assert_eq!(doc.layers.len(), 1);
        assert_eq!(doc.layers[0].pixels.dimensions(), (3, 3));
        assert!(doc.layers[0].pixels.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn restore_reuses_ids_and_order() {
        let fonts = FontRegistry::new();
        let mut doc = Document::new(4, 4);
        let mut sel = SelectionMask::new(4, 4);
        doc.add_layer(None);
        let ids: Vec<Uuid> = doc.layers.iter().map(|l| l.id).collect();
        let mut h = HistoryManager::new(5);
        h.snapshot("delete", &doc, &sel);
        doc.delete_layer(0);

        h.undo(&mut doc, &mut sel, &fonts);
        assert_eq!(doc.layers.iter().map(|l| l.id).collect::<Vec<_>>(), ids);
        assert_eq!(doc.active_layer_index, 1);
    }

    #[test]
    fn jump_to_tip_returns_to_latest_state() {
        let fonts = FontRegistry::new();
        let mut doc = Document::blank(4, 4);
        let mut sel = SelectionMask::new(4, 4);
        let mut h = HistoryManager::new(10);
        h.snapshot("select", &doc, &sel);
        sel.set_from_rectangle(0.0, 0.0, 2.0, 2.0, crate::selection::SelectionMode::Replace);

        assert!(h.jump_to(0, &mut doc, &mut sel, &fonts));
        assert!(sel.is_empty());
        assert!(h.jump_to(1, &mut doc, &mut sel, &fonts));
        assert_eq!(sel.bounding_box(), Some(Rect::new(0, 0, 2, 2)));
    }
}
