use std::sync::Arc;

use uuid::Uuid;

use paintcore::components::tools::{Modifiers, ToolKind};
use paintcore::geometry::DocPoint;
use paintcore::ops::text::FontRegistry;
use paintcore::{EditorSettings, Workspace};

fn workspace() -> Workspace {
    Workspace::new(EditorSettings::default(), Arc::new(FontRegistry::new()))
}

#[test]
fn new_documents_get_untitled_names() {
    let mut ws = workspace();
    ws.new_document(10, 10);
    ws.new_document(10, 10);
    assert_eq!(ws.contexts[0].name, "Untitled-1");
    assert_eq!(ws.contexts[1].name, "Untitled-2");
    assert_eq!(ws.active_index(), Some(1));
}

#[test]
fn tool_state_stays_with_its_tab() {
    let mut ws = workspace();
    let a = ws.new_document(20, 20);
    ws.active_mut().unwrap().select_tool(ToolKind::Lasso);
    let b = ws.new_document(20, 20);
    assert_eq!(ws.active().unwrap().tool().kind(), ToolKind::default());

    assert!(ws.switch_to(a));
    assert_eq!(ws.active().unwrap().tool().kind(), ToolKind::Lasso);
    assert!(!ws.switch_to(a));
    assert!(ws.switch_to(b));
}

#[test]
fn switching_finishes_an_open_lasso() {
    let mut ws = workspace();
    let a = ws.new_document(20, 20);
    let ctx = ws.active_mut().unwrap();
    ctx.select_tool(ToolKind::Lasso);
    ctx.pointer_down(DocPoint::new(2.0, 2.0), Modifiers::NONE, 1.0);
    ctx.pointer_move(DocPoint::new(15.0, 2.0), Modifiers::NONE, 1.0);
    assert!(ctx.tool().is_busy());

    ws.new_document(20, 20);
    assert!(!ws.contexts[a].tool().is_busy());
}

#[test]
fn clipboard_is_shared_between_tabs() {
    let mut ws = workspace();
    ws.new_document(12, 12);
    ws.active_mut().unwrap().select_all();
    assert!(ws.copy());

    ws.new_document(30, 30);
    let layer = ws.paste().unwrap();
    let ctx = ws.active().unwrap();
    assert_eq!(ctx.document.layers.len(), 2);
    assert_eq!(ctx.document.layers[layer].width(), 12);
    assert!(ctx.is_dirty);
}

#[test]
fn paste_without_clipboard_is_none() {
    let mut ws = workspace();
    ws.new_document(5, 5);
    assert_eq!(ws.paste(), None);
}

#[test]
fn open_path_reuses_existing_tab() {
    let mut ws = workspace();
    ws.new_document(6, 6);
    let path = std::env::temp_dir().join(format!("paintcore-ws-{}.pcp", Uuid::new_v4()));
    ws.active_mut().unwrap().save_project(&path).unwrap();

    ws.new_document(6, 6);
    let index = ws.open_path(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(index, 0);
    assert_eq!(ws.len(), 2);
    assert_eq!(ws.active_index(), Some(0));
}

#[test]
fn closing_tabs_keeps_active_index_valid() {
    let mut ws = workspace();
    ws.new_document(4, 4);
    ws.new_document(4, 4);
    ws.new_document(4, 4);
    ws.switch_to(1);

    ws.close(0);
    assert_eq!(ws.active_index(), Some(0));
    assert_eq!(ws.active().unwrap().name, "Untitled-2");

    ws.close(0);
    ws.close(0);
    assert!(ws.is_empty());
    assert_eq!(ws.active_index(), None);
    assert!(ws.close(0).is_none());
}

#[test]
fn settings_reach_every_tab() {
    let mut ws = workspace();
    ws.new_document(4, 4);
    ws.new_document(4, 4);
    ws.set_settings(EditorSettings { show_grid: true, grid_spacing: 8, brush_size: 3.0, ..Default::default() });
    for ctx in &ws.contexts {
        assert!(ctx.engine.show_grid);
        assert_eq!(ctx.engine.grid_spacing, 8);
        assert_eq!(ctx.tool_settings.brush.size, 3.0);
    }
    assert!(ws.settings().show_grid);
}
