use std::{collections::BTreeMap, sync::Arc};

use crate::{
    cache::RunContext,
    cache::key::{Fingerprint, KeyBuilder},
    foundation::core::Year,
    foundation::error::{AnimError, AnimResult},
    render::chart::{ChartRenderer, SeriesChart, SvgLineChart},
    render::frame::FrameRGBA,
};

/// Year-indexed scalar results (for example total NBP per year), as delivered by a tabular
/// results query.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnnualSeries {
    pub name: String,
    #[serde(default)]
    pub units: String,
    pub values: BTreeMap<Year, f64>,
}

impl AnnualSeries {
    pub fn new(name: impl Into<String>, units: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: units.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn from_pairs(
        name: impl Into<String>,
        units: impl Into<String>,
        pairs: impl IntoIterator<Item = (Year, f64)>,
    ) -> Self {
        let mut out = Self::new(name, units);
        out.values.extend(pairs);
        out
    }

    pub fn insert(&mut self, year: Year, value: f64) {
        self.values.insert(year, value);
    }

    pub fn get(&self, year: Year) -> Option<f64> {
        self.values.get(&year).copied()
    }

    pub fn years(&self) -> impl Iterator<Item = Year> + '_ {
        self.values.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(first, last)` year, if any.
    pub fn year_range(&self) -> Option<(Year, Year)> {
        let first = self.values.keys().next()?;
        let last = self.values.keys().next_back()?;
        Some((*first, *last))
    }

    /// Min and max over finite values, always including zero so bars and lines share a
    /// baseline.
    pub fn value_range(&self) -> (f64, f64) {
        self.values
            .values()
            .filter(|v| v.is_finite())
            .fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(*v), hi.max(*v)))
    }

    /// Points up to and including `year`.
    pub fn up_to(&self, year: Year) -> Vec<(Year, f64)> {
        self.values
            .range(..=year)
            .map(|(y, v)| (*y, *v))
            .collect()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let mut kb = KeyBuilder::new("annual_series");
        kb.str(&self.name)
            .str(&self.units)
            .u64(self.values.len() as u64);
        for (y, v) in &self.values {
            kb.i64(i64::from(*y)).f64(*v);
        }
        kb.finish()
    }
}

/// Tabular indicator drawn as a chart of the values up to the frame's year.
#[derive(Clone, Debug)]
pub struct SeriesIndicator {
    name: String,
    title: String,
    series: AnnualSeries,
    renderer: Arc<dyn ChartRenderer>,
    size: (u32, u32),
    fingerprint: Fingerprint,
}

impl SeriesIndicator {
    pub fn new(name: impl Into<String>, title: impl Into<String>, series: AnnualSeries) -> Self {
        Self::with_renderer(name, title, series, Arc::new(SvgLineChart::default()))
    }

    pub fn with_renderer(
        name: impl Into<String>,
        title: impl Into<String>,
        series: AnnualSeries,
        renderer: Arc<dyn ChartRenderer>,
    ) -> Self {
        let mut out = Self {
            name: name.into(),
            title: title.into(),
            series,
            renderer,
            size: (640, 480),
            fingerprint: Fingerprint { hi: 0, lo: 0 },
        };
        out.fingerprint = out.compute_fingerprint();
        out
    }

    /// Panel size in pixels; the layout scales it into its slot.
    pub fn with_size(mut self, width: u32, height: u32) -> AnimResult<Self> {
        if width == 0 || height == 0 {
            return Err(AnimError::validation("series panel size must be non-zero"));
        }
        self.size = (width, height);
        self.fingerprint = self.compute_fingerprint();
        Ok(self)
    }

    fn compute_fingerprint(&self) -> Fingerprint {
        let mut kb = KeyBuilder::new("series_indicator");
        kb.str(&self.name)
            .str(&self.title)
            .fingerprint(self.series.fingerprint())
            .str(&self.renderer.identity())
            .u64(u64::from(self.size.0))
            .u64(u64::from(self.size.1));
        kb.finish()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn series(&self) -> &AnnualSeries {
        &self.series
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn has_data(&self, year: Year) -> bool {
        self.series.get(year).is_some()
    }

    /// Chart for `year`: values up to `year` on axes spanning the whole series.
    pub fn chart(&self, year: Year) -> SeriesChart {
        let x_range = self.series.year_range().unwrap_or((year, year));
        SeriesChart {
            title: self.title.clone(),
            units: self.series.units.clone(),
            points: self.series.up_to(year),
            highlight: self.has_data(year).then_some(year),
            x_range: (x_range.0.min(year), x_range.1.max(year)),
            y_range: self.series.value_range(),
        }
    }

    #[tracing::instrument(skip(self, ctx), fields(indicator = %self.name))]
    pub fn render(&self, year: Year, ctx: &RunContext) -> AnimResult<FrameRGBA> {
        let chart = self.chart(year);
        let mut kb = KeyBuilder::new("panel/series");
        kb.fingerprint(self.fingerprint).fingerprint(chart.fingerprint());
        let inputs = kb.finish();
        let (w, h) = self.size;
        ctx.cache
            .panels
            .get_or_compute_persisted(&kb.key(), inputs, || {
                self.renderer.render(&chart, w, h, &ctx.svg)
            })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/indicator/series.rs"]
mod tests;
