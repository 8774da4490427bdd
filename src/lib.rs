//! PaintCore: a layered raster image editor core.
//!
//! The crate models a document of RGBA layers with a soft selection mask,
//! a snapshot undo history, a toolbox driven by pointer events and a
//! compositing engine that renders the document plus tool overlays into a
//! flat surface.  Frontends own the window; everything below is headless.

#![allow(clippy::too_many_arguments)]
#![allow(clippy::large_enum_variant)]

pub mod logger;

pub mod canvas;
pub mod cli;
pub mod components;
pub mod compositor;
pub mod geometry;
pub mod io;
pub mod ops;
pub mod project;
pub mod selection;
pub mod settings;
pub mod stroke;

pub use canvas::{BlendMode, Document, Layer};
pub use components::history::HistoryManager;
pub use components::tools::{Key, Modifiers, Tool, ToolKind};
pub use compositor::CompositingEngine;
pub use geometry::{DocPoint, Rect};
pub use ops::filters::Filter;
pub use project::{EditingContext, Workspace};
pub use selection::{SelectionMask, SelectionMode};
pub use settings::EditorSettings;
