pub mod adjustments;
pub mod canvas_ops;
pub mod fill;
pub mod filters;
pub mod raster;
pub mod text;
pub mod transform;
