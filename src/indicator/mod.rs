//! Renderable per-year quantities: colorized rasters, composites and charts.

/// Stacked indicators.
pub mod composite;
/// Year-indexed scalar series and their chart panels.
pub mod series;
/// Colorized raster indicators.
pub mod spatial;

use std::collections::BTreeSet;

use crate::{
    cache::RunContext,
    cache::key::Fingerprint,
    color::legend::Legend,
    foundation::core::Year,
    foundation::error::AnimResult,
    render::frame::FrameRGBA,
};

use self::{composite::CompositeIndicator, series::SeriesIndicator, spatial::SpatialIndicator};

/// A quantity that renders to one panel image per year.
#[derive(Clone, Debug)]
pub enum Indicator {
    Spatial(SpatialIndicator),
    Composite(CompositeIndicator),
    Series(SeriesIndicator),
}

impl Indicator {
    pub fn name(&self) -> &str {
        match self {
            Self::Spatial(i) => i.name(),
            Self::Composite(i) => i.name(),
            Self::Series(i) => i.name(),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Spatial(i) => i.title(),
            Self::Composite(i) => i.title(),
            Self::Series(i) => i.title(),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        match self {
            Self::Spatial(i) => i.fingerprint(),
            Self::Composite(i) => i.fingerprint(),
            Self::Series(i) => i.fingerprint(),
        }
    }

    pub fn has_data(&self, year: Year) -> bool {
        match self {
            Self::Spatial(i) => i.has_data(year),
            Self::Composite(i) => i.has_data(year),
            Self::Series(i) => i.has_data(year),
        }
    }

    /// Data for `year` was expected but could not be loaded.
    pub fn is_failed(&self, year: Year) -> bool {
        match self {
            Self::Spatial(i) => i.is_failed(year),
            Self::Composite(i) => i.is_failed(year),
            Self::Series(_) => false,
        }
    }

    /// Years this indicator has (or was expected to have) data for.
    pub fn years(&self) -> BTreeSet<Year> {
        match self {
            Self::Spatial(i) => i.years(),
            Self::Composite(i) => i
                .children()
                .iter()
                .flat_map(|c| c.indicator.years())
                .collect(),
            Self::Series(i) => i.series().years().collect(),
        }
    }

    /// Legends describing the panel, bottom layer first, without duplicates.
    pub fn legends(&self) -> Vec<Legend> {
        let mut out: Vec<Legend> = Vec::new();
        let mut push = |legend: Legend| {
            if !out.iter().any(|l| l == &legend) {
                out.push(legend);
            }
        };
        match self {
            Self::Spatial(i) => push(i.legend()),
            Self::Composite(i) => {
                for legend in i.children().iter().flat_map(|c| c.indicator.legends()) {
                    push(legend);
                }
            }
            Self::Series(_) => {}
        }
        out
    }

    pub fn render(&self, year: Year, ctx: &RunContext) -> AnimResult<FrameRGBA> {
        match self {
            Self::Spatial(i) => i.render(year, ctx),
            Self::Composite(i) => i.render(year, ctx),
            Self::Series(i) => i.render(year, ctx),
        }
    }
}

impl From<SpatialIndicator> for Indicator {
    fn from(i: SpatialIndicator) -> Self {
        Self::Spatial(i)
    }
}

impl From<CompositeIndicator> for Indicator {
    fn from(i: CompositeIndicator) -> Self {
        Self::Composite(i)
    }
}

impl From<SeriesIndicator> for Indicator {
    fn from(i: SeriesIndicator) -> Self {
        Self::Series(i)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/indicator/composite.rs"]
mod tests;
