use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use anyhow::Context;

use crate::{
    animate::animator::{AnimationReport, Animator, SlotBinding},
    cache::{RunCache, RunContext},
    config::{AnimationConfig, ChartConfig, LayerPaths},
    disturbance::{DisturbanceColorConfig, DisturbanceLayerConfigurer},
    foundation::core::{LayerYear, Year},
    foundation::error::{AnimError, AnimResult},
    indicator::Indicator,
    indicator::composite::{CompositeChild, CompositeIndicator},
    indicator::series::{AnnualSeries, SeriesIndicator},
    indicator::spatial::{SpatialIndicator, SpatialOptions},
    layout::{Layout, LayoutSpec},
    render::frame::FrameRGBA,
    render::svg::SvgRasterizer,
    spatial::collection::{LayerCollection, LoadFailure},
    spatial::grid::Crs,
    spatial::layer::Interpretation,
    spatial::source::{AsciiGridSource, RasterSource, load_layer},
};

/// Name of the disturbance indicator built from [`crate::config::DisturbanceConfig`].
pub const DISTURBANCE_INDICATOR: &str = "disturbances";

/// A configured run: indicators loaded and set up, ready to render.
#[derive(Debug)]
pub struct Session {
    animator: Animator<LayoutSpec>,
    years: BTreeSet<Year>,
    load_failures: Vec<LoadFailure>,
}

impl Session {
    /// Load a config document and build its run. Relative paths resolve against the
    /// document's directory.
    pub fn from_path(path: &Path) -> AnimResult<Self> {
        let config = AnimationConfig::from_path(path)?;
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::build(&config, base)
    }

    #[tracing::instrument(skip_all, fields(name = %config.name))]
    pub fn build(config: &AnimationConfig, base: &Path) -> AnimResult<Self> {
        config.validate()?;
        let ctx = run_context(config, base)?;
        let requested = config.years();
        let crs = config.crs.as_deref().map(Crs::parse);
        let mut load_failures = Vec::new();

        let background = match &config.bounding_box {
            Some(path) => {
                let mut source = AsciiGridSource::new(resolve(base, path));
                if let Some(crs) = &crs {
                    source = source.with_crs(crs.clone());
                }
                Some(load_layer(&source, LayerYear::Static, None)?)
            }
            None => None,
        };
        let options = |title: &str, units: &str| SpatialOptions {
            title: title.to_string(),
            units: units.to_string(),
            policy: config.resolution_policy,
            background: background.clone(),
            years: requested.clone(),
            ..SpatialOptions::default()
        };

        let mut indicators: BTreeMap<String, Indicator> = BTreeMap::new();
        let mut series: Vec<(ChartConfig, SeriesIndicator)> = Vec::new();
        for ind in &config.indicators {
            let (collection, failures) = load_collection(
                &ind.name,
                ind.paths(),
                base,
                requested.as_ref(),
                crs.as_ref(),
                None,
            );
            let mut opts = options(&ind.title, &ind.units);
            opts.colorizer = ind.colorizer.clone();
            opts.resampling = ind.resampling;
            let spatial = SpatialIndicator::build(&ind.name, collection, &failures, opts, &ctx)?;
            load_failures.extend(failures);

            if let Some(chart) = &ind.chart {
                let data = match &chart.series {
                    Some(path) => read_series(&resolve(base, path))?,
                    None => spatial.annual_series(chart.aggregation),
                };
                let title = chart.title.clone().unwrap_or_else(|| spatial.title().to_string());
                let mut indicator = SeriesIndicator::new(format!("{}_chart", ind.name), title, data);
                if let Some((w, h)) = slot_size(config, &chart.slot) {
                    indicator = indicator.with_size(w, h)?;
                }
                series.push((chart.clone(), indicator));
            }
            indicators.insert(ind.name.clone(), spatial.into());
        }

        let mut disturbances = None;
        if let Some(dist) = &config.disturbances {
            let colors = match &dist.colors {
                Some(path) => DisturbanceColorConfig::from_path(&resolve(base, path))?,
                None => DisturbanceColorConfig::default(),
            };
            let mut configurer = DisturbanceLayerConfigurer::new(colors);
            if let Some(filter) = &dist.filter {
                configurer = configurer.with_filter(filter.iter().cloned());
            }
            if let Some(title) = &dist.title {
                configurer = configurer.with_title(title.clone());
            }
            let (collection, failures) = load_collection(
                DISTURBANCE_INDICATOR,
                dist.paths(),
                base,
                requested.as_ref(),
                crs.as_ref(),
                Some(&dist.codes),
            );
            let indicator: Indicator = configurer
                .build_indicator(
                    DISTURBANCE_INDICATOR,
                    &collection,
                    &failures,
                    options("", ""),
                    &ctx,
                )?
                .into();
            load_failures.extend(failures);

            for name in &dist.overlay {
                let Some(base_indicator) = indicators.remove(name) else {
                    continue;
                };
                let title = base_indicator.title().to_string();
                let composite = CompositeIndicator::new(
                    name.clone(),
                    title,
                    vec![
                        CompositeChild {
                            indicator: base_indicator,
                            z: 0,
                            opacity: 1.0,
                        },
                        CompositeChild {
                            indicator: indicator.clone(),
                            z: 1,
                            opacity: dist.overlay_opacity,
                        },
                    ],
                )?;
                indicators.insert(name.clone(), composite.into());
            }
            disturbances = Some(indicator);
        }

        let mut bindings = Vec::new();
        let mut maps: Vec<Indicator> = Vec::new();
        for ind in &config.indicators {
            if let Some(indicator) = indicators.remove(&ind.name) {
                maps.push(indicator.clone());
                bindings.push(SlotBinding::indicator(&ind.slot, indicator));
            }
        }
        if let Some(dist) = &config.disturbances
            && let Some(indicator) = disturbances
        {
            // without a slot the disturbances only appear inside overlay composites
            if let Some(slot) = &dist.slot {
                maps.push(indicator.clone());
                bindings.push(SlotBinding::indicator(slot, indicator));
            }
        }
        if let Some(slot) = &config.legend_slot {
            bindings.push(SlotBinding::legend_of(slot, &maps));
        }
        for (chart, indicator) in series {
            bindings.push(SlotBinding::indicator(chart.slot, indicator));
        }

        let animator = Animator::new(
            config.layout.clone(),
            bindings,
            config.animator_opts(base),
            ctx,
        )?;

        let years = match requested {
            Some(years) => years,
            None => {
                let mut years = animator.available_years();
                years.extend(load_failures.iter().map(|f| f.year));
                years
            }
        };
        if years.is_empty() {
            return Err(AnimError::validation("no years to animate"));
        }
        tracing::info!(
            years = years.len(),
            load_failures = load_failures.len(),
            "session ready"
        );
        Ok(Self {
            animator,
            years,
            load_failures,
        })
    }

    pub fn animator(&self) -> &Animator<LayoutSpec> {
        &self.animator
    }

    pub fn years(&self) -> &BTreeSet<Year> {
        &self.years
    }

    /// Layers that could not be read. Their years fail at render time.
    pub fn load_failures(&self) -> &[LoadFailure] {
        &self.load_failures
    }

    pub fn run(&self) -> AnimResult<AnimationReport> {
        self.animator.run(self.years.iter().copied())
    }

    pub fn render_frame(&self, year: Year) -> AnimResult<FrameRGBA> {
        self.animator.render_frame(year)
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn run_context(config: &AnimationConfig, base: &Path) -> AnimResult<RunContext> {
    let cache = match &config.cache_dir {
        Some(dir) => RunCache::with_disk(&resolve(base, dir))?,
        None => RunCache::in_memory(),
    };
    let font_dir = config.font_dir.as_ref().map(|d| resolve(base, d));
    Ok(RunContext::new(cache, SvgRasterizer::new(font_dir.as_deref())))
}

fn load_collection(
    name: &str,
    paths: LayerPaths<'_>,
    base: &Path,
    years: Option<&BTreeSet<Year>>,
    crs: Option<&Crs>,
    codes: Option<&Interpretation>,
) -> (LayerCollection, Vec<LoadFailure>) {
    let sources: Vec<(Year, Box<dyn RasterSource>)> = paths
        .resolve(base, years)
        .into_iter()
        .map(|(year, path)| {
            let mut source = AsciiGridSource::new(path);
            if let Some(crs) = crs {
                source = source.with_crs(crs.clone());
            }
            (year, Box::new(source) as Box<dyn RasterSource>)
        })
        .collect();
    LayerCollection::load(name, &sources, codes)
}

fn read_series(path: &Path) -> AnimResult<AnnualSeries> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read series '{}'", path.display()))?;
    serde_json::from_str(&text)
        .map_err(|e| AnimError::data_source(format!("series '{}': {e}", path.display())))
}

/// Pixel size of a slot on the configured canvas.
fn slot_size(config: &AnimationConfig, slot: &str) -> Option<(u32, u32)> {
    config
        .layout
        .geometry(config.canvas, config.title.is_some())
        .into_iter()
        .find(|g| g.name == slot)
        .map(|g| (g.rect.width() as u32, g.rect.height() as u32))
        .filter(|(w, h)| *w > 0 && *h > 0)
}

#[cfg(test)]
#[path = "../tests/unit/session.rs"]
mod tests;
