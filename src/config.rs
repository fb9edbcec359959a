use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use anyhow::Context;

use crate::{
    animate::{
        assemble::{AssembleOpts, OutputFormat},
        animator::{AnimatorOpts, RenderThreading, Strictness},
    },
    color::colorizer::ColorizerSpec,
    foundation::core::{Canvas, Rgba8, Year},
    foundation::error::{AnimError, AnimResult},
    layout::{Layout, LayoutSpec},
    spatial::collection::ResolutionPolicy,
    spatial::layer::{Aggregation, Interpretation},
    spatial::reproject::Resampling,
};

/// Placeholder replaced by the year in layer path patterns.
pub const YEAR_PLACEHOLDER: &str = "{year}";

fn default_name() -> String {
    "animation".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

fn default_fps() -> u32 {
    1
}

fn default_overlay_opacity() -> f32 {
    0.8
}

/// Per-year raster layers, listed explicitly or through a `{year}` path pattern.
#[derive(Clone, Copy, Debug)]
pub struct LayerPaths<'a> {
    pub layers: &'a BTreeMap<Year, PathBuf>,
    pub pattern: Option<&'a str>,
}

impl LayerPaths<'_> {
    fn validate(&self, what: &str) -> AnimResult<()> {
        match (self.pattern, self.layers.is_empty()) {
            (Some(_), false) => Err(AnimError::validation(format!(
                "{what}: set either 'layers' or 'pattern', not both"
            ))),
            (None, true) => Err(AnimError::validation(format!(
                "{what}: no 'layers' and no 'pattern'"
            ))),
            (Some(p), true) if !p.contains(YEAR_PLACEHOLDER) => Err(AnimError::validation(
                format!("{what}: pattern '{p}' has no {YEAR_PLACEHOLDER} placeholder"),
            )),
            _ => Ok(()),
        }
    }

    /// Year → path, relative paths resolved against `base`. A pattern expands over `years`.
    pub fn resolve(&self, base: &Path, years: Option<&BTreeSet<Year>>) -> BTreeMap<Year, PathBuf> {
        let absolute = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base.join(p)
            }
        };
        match self.pattern {
            Some(pattern) => years
                .into_iter()
                .flatten()
                .map(|y| {
                    let path = pattern.replace(YEAR_PLACEHOLDER, &y.to_string());
                    (*y, absolute(Path::new(&path)))
                })
                .collect(),
            None => self
                .layers
                .iter()
                .filter(|(y, _)| years.is_none_or(|ys| ys.contains(y)))
                .map(|(y, p)| (*y, absolute(p)))
                .collect(),
        }
    }
}

/// A line chart of an indicator's per-year totals.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChartConfig {
    pub slot: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub aggregation: Aggregation,
    /// Precomputed series JSON; when absent the series is aggregated from the layers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndicatorConfig {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub units: String,
    /// Year → raster path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub layers: BTreeMap<Year, PathBuf>,
    /// Raster path with a `{year}` placeholder, expanded over the animated years.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default)]
    pub colorizer: ColorizerSpec,
    #[serde(default)]
    pub resampling: Resampling,
    pub slot: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartConfig>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DisturbanceConfig {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub layers: BTreeMap<Year, PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Raster code → disturbance type name.
    pub codes: Interpretation,
    /// Disturbance color table JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<PathBuf>,
    /// Keep only these disturbance types (or group labels).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Panel showing the disturbances on their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    /// Indicators drawn with the disturbances on top.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overlay: Vec<String>,
    #[serde(default = "default_overlay_opacity")]
    pub overlay_opacity: f32,
}

impl IndicatorConfig {
    pub fn paths(&self) -> LayerPaths<'_> {
        LayerPaths {
            layers: &self.layers,
            pattern: self.pattern.as_deref(),
        }
    }
}

impl DisturbanceConfig {
    pub fn paths(&self) -> LayerPaths<'_> {
        LayerPaths {
            layers: &self.layers,
            pattern: self.pattern.as_deref(),
        }
    }
}

/// One animation run, as stored in a JSON document. Relative paths are resolved against the
/// document's directory.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnimationConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default)]
    pub hold_last_frame: bool,
    #[serde(default)]
    pub canvas: Canvas,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub years: Option<Vec<Year>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_year: Option<Year>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_year: Option<Year>,
    #[serde(default)]
    pub strictness: Strictness,
    #[serde(default)]
    pub threading: RenderThreading,
    #[serde(default)]
    pub save_frames: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_dir: Option<PathBuf>,
    #[serde(default)]
    pub resolution_policy: ResolutionPolicy,
    /// Fallback CRS for grids without a `.prj` sidecar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<String>,
    /// Static raster marking the study area.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<PathBuf>,
    #[serde(default)]
    pub layout: LayoutSpec,
    /// Slot receiving the legends of every map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend_slot: Option<String>,
    #[serde(default)]
    pub indicators: Vec<IndicatorConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disturbances: Option<DisturbanceConfig>,
}

impl AnimationConfig {
    pub fn from_json_str(s: &str) -> AnimResult<Self> {
        let cfg: Self = serde_json::from_str(s)
            .map_err(|e| AnimError::validation(format!("animation config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> AnimResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read animation config '{}'", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Years to animate when the document names them; `None` animates every year with data.
    pub fn years(&self) -> Option<BTreeSet<Year>> {
        if let Some(years) = &self.years {
            return Some(years.iter().copied().collect());
        }
        match (self.start_year, self.end_year) {
            (Some(start), Some(end)) => Some((start..=end).collect()),
            _ => None,
        }
    }

    pub fn animator_opts(&self, base: &Path) -> AnimatorOpts {
        let output_dir = if self.output_dir.is_absolute() {
            self.output_dir.clone()
        } else {
            base.join(&self.output_dir)
        };
        AnimatorOpts {
            name: self.name.clone(),
            title: self.title.clone(),
            canvas: self.canvas,
            output_dir,
            assemble: AssembleOpts {
                format: self.format,
                fps: self.fps,
                hold_last_frame: self.hold_last_frame,
                background: Rgba8::WHITE,
            },
            strictness: self.strictness,
            threading: self.threading.clone(),
            save_frames: self.save_frames,
        }
    }

    pub fn validate(&self) -> AnimResult<()> {
        Canvas::new(self.canvas.width, self.canvas.height)?;
        self.animator_opts(Path::new(".")).validate()?;
        self.layout.validate()?;

        if self.years.is_some() && (self.start_year.is_some() || self.end_year.is_some()) {
            return Err(AnimError::validation(
                "set either 'years' or 'start_year'/'end_year', not both",
            ));
        }
        match (self.start_year, self.end_year) {
            (Some(start), Some(end)) if start > end => {
                return Err(AnimError::validation(format!(
                    "start_year {start} is after end_year {end}"
                )));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(AnimError::validation(
                    "'start_year' and 'end_year' must be set together",
                ));
            }
            _ => {}
        }
        if self.years.as_ref().is_some_and(Vec::is_empty) {
            return Err(AnimError::validation("'years' is empty"));
        }

        if self.indicators.is_empty() && self.disturbances.is_none() {
            return Err(AnimError::validation(
                "animation config has no indicators and no disturbances",
            ));
        }

        let slots: BTreeSet<String> = self.layout.slots().into_iter().map(|s| s.name).collect();
        let mut bound = BTreeSet::new();
        let mut bind = |slot: &str, what: &str| -> AnimResult<()> {
            if !slots.contains(slot) {
                return Err(AnimError::validation(format!(
                    "{what}: layout '{}' has no slot '{slot}'",
                    self.layout.name()
                )));
            }
            if !bound.insert(slot.to_string()) {
                return Err(AnimError::validation(format!(
                    "{what}: slot '{slot}' is already bound"
                )));
            }
            Ok(())
        };
        if let Some(slot) = &self.legend_slot {
            bind(slot, "legend_slot")?;
        }

        let has_years = self.years().is_some();
        let mut names = BTreeSet::new();
        for ind in &self.indicators {
            let what = format!("indicator '{}'", ind.name);
            if ind.name.is_empty() {
                return Err(AnimError::validation("indicator name is empty"));
            }
            if !names.insert(ind.name.as_str()) {
                return Err(AnimError::validation(format!("{what} is listed twice")));
            }
            ind.paths().validate(&what)?;
            if ind.pattern.is_some() && !has_years {
                return Err(AnimError::validation(format!(
                    "{what}: a layer pattern needs 'years' or 'start_year'/'end_year'"
                )));
            }
            ind.colorizer.validate()?;
            bind(&ind.slot, &what)?;
            if let Some(chart) = &ind.chart {
                bind(&chart.slot, &format!("{what} chart"))?;
            }
        }

        if let Some(dist) = &self.disturbances {
            let what = "disturbances";
            dist.paths().validate(what)?;
            if dist.pattern.is_some() && !has_years {
                return Err(AnimError::validation(
                    "disturbances: a layer pattern needs 'years' or 'start_year'/'end_year'",
                ));
            }
            if dist.codes.is_empty() {
                return Err(AnimError::validation("disturbances: 'codes' is empty"));
            }
            if !(dist.overlay_opacity.is_finite() && (0.0..=1.0).contains(&dist.overlay_opacity)) {
                return Err(AnimError::validation(
                    "disturbances: overlay_opacity must be within [0, 1]",
                ));
            }
            if let Some(slot) = &dist.slot {
                bind(slot, what)?;
            }
            if let Some(missing) = dist.overlay.iter().find(|n| !names.contains(n.as_str())) {
                return Err(AnimError::validation(format!(
                    "disturbances: overlay names unknown indicator '{missing}'"
                )));
            }
            if dist.slot.is_none() && dist.overlay.is_empty() {
                return Err(AnimError::validation(
                    "disturbances: neither 'slot' nor 'overlay' is set",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
