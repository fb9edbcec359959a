//! Panel and frame pixels, SVG overlays and series charts.

/// Series chart data and the chart renderer boundary.
pub mod chart;
/// Premultiplied RGBA8 compositing primitives.
pub mod composite;
/// Frame buffers.
pub mod frame;
/// SVG generation and rasterization.
pub mod svg;
