use crate::image_out::write_png;
use crate::raster::{draw_cross, draw_line, fill_disc};
use crate::viewport::Viewport;
use image::{ImageError, Rgb, RgbImage};
use latmesh_graph::{compute_positions, load_existing_graph, GraphIoError, GraphStore, Layout};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Graph(#[from] GraphIoError),
    #[error("failed to write png {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
    pub node_radius: f32,
    pub edge_alpha: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 800,
            height: 800,
            margin: 24,
            node_radius: 2.5,
            edge_alpha: 0.3,
        }
    }
}

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const EDGE: Rgb<u8> = Rgb([40, 40, 40]);
const NODE: Rgb<u8> = Rgb([31, 119, 180]);
const ORIGIN: Rgb<u8> = Rgb([214, 39, 40]);

pub fn render_graph(graph: &GraphStore, layout: Layout, settings: &RenderSettings) -> RgbImage {
    let mut image = RgbImage::from_pixel(settings.width, settings.height, BACKGROUND);
    draw_into(&mut image, graph, layout, settings);
    image
}

fn draw_into(image: &mut RgbImage, graph: &GraphStore, layout: Layout, settings: &RenderSettings) {
    let positions = compute_positions(graph, layout);
    let view = Viewport::fit(
        positions.values(),
        settings.width,
        settings.height,
        settings.margin,
    );

    for (a, b, _) in graph.edges() {
        if let (Some(pa), Some(pb)) = (positions.get(a), positions.get(b)) {
            draw_line(image, view.project(*pa), view.project(*pb), EDGE, settings.edge_alpha);
        }
    }
    for point in positions.values() {
        fill_disc(image, view.project(*point), settings.node_radius, NODE);
    }
    if layout == Layout::Radial {
        draw_cross(image, view.project([0.0, 0.0]), settings.node_radius * 2.0, ORIGIN);
    }
}

/// Live redraw target: re-renders into one reused buffer and rewrites the
/// same PNG on every draw.
#[derive(Debug)]
pub struct PngCanvas {
    output: PathBuf,
    layout: Layout,
    settings: RenderSettings,
    buffer: Option<RgbImage>,
}

impl PngCanvas {
    pub fn new(output: impl Into<PathBuf>, layout: Layout, settings: RenderSettings) -> Self {
        Self {
            output: output.into(),
            layout,
            settings,
            buffer: None,
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn draw(&mut self, graph: &GraphStore) -> Result<(), RenderError> {
        let settings = &self.settings;
        let image = self.buffer.get_or_insert_with(|| {
            RgbImage::from_pixel(settings.width, settings.height, BACKGROUND)
        });
        for pixel in image.pixels_mut() {
            *pixel = BACKGROUND;
        }
        draw_into(image, graph, self.layout, settings);

        write_png(&self.output, image).map_err(|source| RenderError::Image {
            path: self.output.clone(),
            source,
        })?;
        tracing::debug!(nodes = graph.node_count(), path = %self.output.display(), "redrew map");
        Ok(())
    }

    /// Drop the pixel buffer. A later `draw` allocates a fresh one.
    pub fn close(&mut self) {
        self.buffer = None;
    }

    pub fn is_open(&self) -> bool {
        self.buffer.is_some()
    }
}

/// Render a saved graph to `<base>_<layout>.png` (or `output`).
pub fn show_graph(
    graph_path: &Path,
    layout: Layout,
    output: Option<&Path>,
    settings: &RenderSettings,
) -> Result<PathBuf, RenderError> {
    let (resolved, graph) = load_existing_graph(graph_path)?;
    let target = match output {
        Some(path) => path.to_path_buf(),
        None => {
            let stem = resolved.with_extension("");
            let mut name = stem.into_os_string();
            name.push(format!("_{layout}.png"));
            PathBuf::from(name)
        }
    };

    let image = render_graph(&graph, layout, settings);
    write_png(&target, &image).map_err(|source| RenderError::Image {
        path: target.clone(),
        source,
    })?;
    Ok(target)
}
