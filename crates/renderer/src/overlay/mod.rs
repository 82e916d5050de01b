//! Pixmap-backed overlays composited above the shader layers.

mod blur;
mod fog;
mod graph;

pub use blur::box_blur;
pub use fog::{FogCanvas, FogOverlay};
pub use graph::{keywords, CardNode, ConnectionGraph, ConnectionOverlay, Edge};
