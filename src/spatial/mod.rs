//! Raster layers, reference grids and per-year layer collections.

/// Per-year layer collections.
pub mod collection;
/// Reference grid geometry and CRS identifiers.
pub mod grid;
/// Immutable raster layers and pixel-wise operations.
pub mod layer;
/// Point transforms and resampling kernels.
pub mod reproject;
/// Raster sources (ESRI ASCII grids, in-memory grids).
pub mod source;
