//! Rasterises a laid-out latency graph into a PNG.

pub mod canvas;
pub mod image_out;
pub mod raster;
pub mod viewport;

pub use canvas::{render_graph, show_graph, PngCanvas, RenderError, RenderSettings};
pub use image_out::write_png;
pub use viewport::Viewport;
