//! Spatial animation of forest carbon-budget simulation output.
//!
//! Per-year raster layers are reconciled onto one reference grid, colorized, arranged in a
//! layout and assembled into an MP4 or GIF:
//!
//! - Load per-year layers into a [`LayerCollection`]
//! - Wrap them in indicators ([`SpatialIndicator`], [`CompositeIndicator`],
//!   [`SeriesIndicator`]) with a [`ColorizerSpec`]
//! - Bind indicators and legends to the slots of a [`Layout`] and run an [`Animator`]
//!
//! [`Session`] does all of this from an [`AnimationConfig`] JSON document.
#![forbid(unsafe_code)]

mod foundation;

/// Frame assembly: per-year rendering, staging and MP4/GIF output.
pub mod animate;
/// Run-scoped memoization, optionally persisted on disk.
pub mod cache;
/// Value-to-color classification, palettes and legends.
pub mod color;
/// JSON run configuration.
pub mod config;
/// Disturbance color tables and overlay setup.
pub mod disturbance;
/// Things that can be drawn into a panel for a given year.
pub mod indicator;
/// Slot geometry and frame composition.
pub mod layout;
/// Panel frames, compositing, SVG rasterization and charts.
pub mod render;
/// Configured runs.
pub mod session;
/// Grids, layers, raster sources and collections.
pub mod spatial;

pub use crate::foundation::core::{Canvas, LayerYear, Rect, Rgba8, Year};
pub use crate::foundation::error::{AnimError, AnimResult};

pub use crate::animate::animator::{
    AnimationReport, Animator, AnimatorOpts, FrameFailure, RenderThreading, SlotBinding,
    SlotContent, Strictness,
};
pub use crate::animate::assemble::{AssembleOpts, OutputFormat};
pub use crate::cache::{RunCache, RunContext};
pub use crate::color::colorizer::{Colorizer, ColorizerSpec, CustomSpecEntry};
pub use crate::color::legend::{Legend, LegendEntry};
pub use crate::config::AnimationConfig;
pub use crate::disturbance::{DisturbanceColorConfig, DisturbanceLayerConfigurer};
pub use crate::indicator::Indicator;
pub use crate::indicator::composite::{CompositeChild, CompositeIndicator};
pub use crate::indicator::series::{AnnualSeries, SeriesIndicator};
pub use crate::indicator::spatial::{SpatialIndicator, SpatialOptions};
pub use crate::layout::{BoxLayout, BoxSpec, Layout, LayoutSpec, QuadrantLayout};
pub use crate::render::frame::FrameRGBA;
pub use crate::session::Session;
pub use crate::spatial::collection::{LayerCollection, LoadFailure, ResolutionPolicy};
pub use crate::spatial::grid::{BoundingBox, Crs};
pub use crate::spatial::layer::{Aggregation, BlendMode, Interpretation, Layer};
pub use crate::spatial::reproject::Resampling;
pub use crate::spatial::source::{AsciiGridSource, MemorySource, RasterData, RasterSource};
