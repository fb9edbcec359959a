//! Value classification into colors, palettes and legends.

/// Quantile, equal-interval and custom colorizers.
pub mod colorizer;
/// Explicit code to color tables.
pub mod custom;
/// Legends and their rendering.
pub mod legend;
/// Named palettes.
pub mod palette;
pub(crate) mod quantile;
