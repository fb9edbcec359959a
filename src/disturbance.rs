//! Categorical styling of disturbance layers (fire, harvest, insects, ...).

use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use anyhow::Context;

use crate::{
    cache::RunContext,
    color::colorizer::{Colorizer, ColorizerSpec, CustomSpecEntry},
    color::legend::Legend,
    color::palette::Palette,
    foundation::core::Rgba8,
    foundation::error::{AnimError, AnimResult},
    indicator::spatial::{SpatialIndicator, SpatialOptions},
    spatial::collection::{LayerCollection, LoadFailure},
    spatial::layer::Interpretation,
    spatial::reproject::Resampling,
};

/// One group of disturbance types sharing a legend entry or a palette.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DisturbanceColorGroup {
    pub disturbance_types: Vec<String>,
    /// Replaces every type of the group in the legend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Rgba8>,
}

impl DisturbanceColorGroup {
    /// Legend labels produced by this group: its label, or each type name.
    fn labels(&self) -> Vec<&str> {
        match &self.label {
            Some(label) => vec![label.as_str()],
            None => self.disturbance_types.iter().map(String::as_str).collect(),
        }
    }
}

/// Disturbance color table, as stored in a JSON list of groups.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct DisturbanceColorConfig {
    pub groups: Vec<DisturbanceColorGroup>,
}

impl DisturbanceColorConfig {
    pub fn from_json_str(s: &str) -> AnimResult<Self> {
        let cfg: Self = serde_json::from_str(s)
            .map_err(|e| AnimError::validation(format!("disturbance colors: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> AnimResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read disturbance colors '{}'", path.display()))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> AnimResult<()> {
        for (i, g) in self.groups.iter().enumerate() {
            if g.disturbance_types.is_empty() {
                return Err(AnimError::validation(format!(
                    "disturbance color group {i} lists no disturbance types"
                )));
            }
            if g.palette.is_some() && g.color.is_some() {
                return Err(AnimError::validation(format!(
                    "disturbance color group {i} sets both 'palette' and 'color'"
                )));
            }
            if let Some(p) = &g.palette {
                Palette::parse(p)?;
            }
        }
        Ok(())
    }

    /// Type name → group label for groups that define one.
    pub fn substitutions(&self) -> BTreeMap<&str, &str> {
        let mut out = BTreeMap::new();
        for g in &self.groups {
            if let Some(label) = &g.label {
                for t in &g.disturbance_types {
                    out.insert(t.as_str(), label.as_str());
                }
            }
        }
        out
    }

    /// Every configured type name.
    pub fn types(&self) -> BTreeSet<String> {
        self.groups
            .iter()
            .flat_map(|g| g.disturbance_types.iter().cloned())
            .collect()
    }
}

/// Builds the custom colorizer and legend for disturbance overlays from a color table and the
/// codes actually present in the data.
#[derive(Clone, Debug)]
pub struct DisturbanceLayerConfigurer {
    colors: DisturbanceColorConfig,
    filter: Option<BTreeSet<String>>,
    fallback_palette: Palette,
    default_color: Rgba8,
    title: String,
}

impl Default for DisturbanceLayerConfigurer {
    fn default() -> Self {
        Self::new(DisturbanceColorConfig::default())
    }
}

impl DisturbanceLayerConfigurer {
    pub fn new(colors: DisturbanceColorConfig) -> Self {
        Self {
            colors,
            filter: None,
            fallback_palette: Palette::default(),
            default_color: Rgba8::rgb(128, 128, 128),
            title: "Disturbances".to_string(),
        }
    }

    /// Keep only these disturbance types.
    pub fn with_filter(mut self, types: impl IntoIterator<Item = String>) -> Self {
        self.filter = Some(types.into_iter().collect());
        self
    }

    /// Keep only the types named in the color table.
    pub fn filter_to_configured(self) -> Self {
        let types = self.colors.types();
        self.with_filter(types)
    }

    /// Palette for types the color table does not cover.
    pub fn with_fallback_palette(mut self, palette: Palette) -> Self {
        self.fallback_palette = palette;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    fn allowed(&self, name: &str) -> bool {
        match &self.filter {
            None => true,
            Some(types) => {
                types.contains(name) || self.colors.groups.iter().any(|g| g.label.as_deref() == Some(name))
            }
        }
    }

    fn label_for<'a>(&'a self, name: &'a str) -> &'a str {
        self.colors
            .groups
            .iter()
            .find(|g| g.disturbance_types.iter().any(|t| t == name))
            .and_then(|g| g.label.as_deref())
            .unwrap_or(name)
    }

    /// Observed codes after the type filter, with configured labels substituted.
    pub fn legend_labels(&self, observed: &Interpretation) -> Interpretation {
        observed
            .iter()
            .filter(|(_, name)| self.allowed(name))
            .map(|(code, name)| (*code, self.label_for(name).to_string()))
            .collect()
    }

    /// Label → color for every label in `labels`: configured groups first, then the
    /// fallback palette over the remaining labels in sorted order.
    fn color_map(&self, labels: &BTreeSet<&str>) -> BTreeMap<String, Rgba8> {
        let mut out = BTreeMap::new();
        for g in &self.colors.groups {
            let group_labels = g.labels();
            let colors = match (&g.color, &g.palette) {
                (Some(c), _) => vec![*c; group_labels.len()],
                (None, Some(p)) => match Palette::parse(p) {
                    Ok(p) => p.colors(group_labels.len()),
                    Err(_) => continue,
                },
                (None, None) => continue,
            };
            for (label, color) in group_labels.into_iter().zip(colors) {
                out.entry(label.to_string()).or_insert(color);
            }
        }
        let remaining: Vec<&str> = labels
            .iter()
            .copied()
            .filter(|l| !out.contains_key(*l))
            .collect();
        if !remaining.is_empty() {
            tracing::debug!(n = remaining.len(), "using fallback palette for unconfigured disturbances");
        }
        let fallback = self.fallback_palette.colors(remaining.len());
        for (label, color) in remaining.into_iter().zip(fallback) {
            out.insert(label.to_string(), color);
        }
        out
    }

    /// Custom colorizer configuration covering exactly the observed (and allowed) codes.
    pub fn colorizer_spec(&self, observed: &Interpretation) -> ColorizerSpec {
        let labels = self.legend_labels(observed);
        let distinct: BTreeSet<&str> = labels.values().map(String::as_str).collect();
        let colors = self.color_map(&distinct);
        let entries = labels
            .iter()
            .map(|(code, label)| CustomSpecEntry {
                code: *code,
                color: colors.get(label).copied().unwrap_or(self.default_color),
                label: label.clone(),
            })
            .collect();
        ColorizerSpec::Custom {
            entries,
            default_color: self.default_color,
        }
    }

    /// Colorizer and legend for the observed code → disturbance type map. Unknown codes and
    /// types never fail; they get fallback colors.
    pub fn configure(&self, observed: &Interpretation) -> AnimResult<(Colorizer, Legend)> {
        let colorizer = self.colorizer_spec(observed).build(&self.title, &[])?;
        let legend = colorizer.legend();
        Ok((colorizer, legend))
    }

    /// Apply the type filter and label substitution to every interpreted layer, then
    /// renumber codes so each label has the same code in every year. Pixels of filtered-out
    /// types become nodata.
    pub fn normalize(&self, collection: &LayerCollection) -> AnimResult<LayerCollection> {
        let relabeled = collection.iter().map(|(_, layer)| match layer.interpretation() {
            Some(interp) => {
                let labels = self.legend_labels(interp);
                layer.clone().with_interpretation(labels)
            }
            None => layer.clone(),
        });
        LayerCollection::from_layers(collection.name(), relabeled)?.normalize_interpretations()
    }

    /// Disturbance overlay indicator: normalized codes, nearest-neighbour reconciliation and
    /// the configured categorical colors.
    pub fn build_indicator(
        &self,
        name: &str,
        collection: &LayerCollection,
        failures: &[LoadFailure],
        mut opts: SpatialOptions,
        ctx: &RunContext,
    ) -> AnimResult<SpatialIndicator> {
        let normalized = self.normalize(collection)?;
        let observed = normalized.observed_codes();
        tracing::info!(codes = observed.len(), "configured disturbance colors");
        opts.colorizer = self.colorizer_spec(&observed);
        opts.resampling = Resampling::Nearest;
        if opts.title.is_empty() {
            opts.title = self.title.clone();
        }
        SpatialIndicator::build(name, normalized, failures, opts, ctx)
    }
}

#[cfg(test)]
#[path = "../tests/unit/disturbance.rs"]
mod tests;
