use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;

use crate::{
    cache::{RunCache, key::KeyBuilder},
    foundation::core::{LayerYear, Year},
    foundation::error::{AnimError, AnimResult},
    spatial::grid::BoundingBox,
    spatial::layer::{BlendMode, Interpretation, Layer},
    spatial::reproject::Resampling,
    spatial::source::{RasterSource, load_layer},
};

/// Which grid becomes the reference when a collection's layers disagree on resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Inconsistent resolutions are a grid mismatch.
    #[default]
    Reject,
    /// Smallest pixel area wins.
    Finest,
    /// Largest pixel area wins.
    Coarsest,
    /// The earliest year's grid wins.
    First,
}

/// A year that failed to load. The rest of the collection is unaffected.
#[derive(Debug)]
pub struct LoadFailure {
    pub year: Year,
    pub source: String,
    pub error: AnimError,
}

/// Per-year layers of one data source, ordered by year.
#[derive(Clone, Debug, Default)]
pub struct LayerCollection {
    name: String,
    layers: BTreeMap<Year, Layer>,
}

impl LayerCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layers: BTreeMap::new(),
        }
    }

    /// Build from layers; several layers of one year are merged.
    pub fn from_layers(
        name: impl Into<String>,
        layers: impl IntoIterator<Item = Layer>,
    ) -> AnimResult<Self> {
        let mut out = Self::new(name);
        for layer in layers {
            out.insert(layer)?;
        }
        Ok(out)
    }

    /// Load every `(year, source)` pair in parallel. Sources that fail are reported and
    /// skipped.
    #[tracing::instrument(skip(sources, interpretation), fields(n = sources.len()))]
    pub fn load(
        name: &str,
        sources: &[(Year, Box<dyn RasterSource>)],
        interpretation: Option<&Interpretation>,
    ) -> (Self, Vec<LoadFailure>) {
        let loaded: Vec<(Year, String, AnimResult<Layer>)> = sources
            .par_iter()
            .map(|(year, src)| {
                (
                    *year,
                    src.identity(),
                    load_layer(src.as_ref(), LayerYear::Year(*year), interpretation),
                )
            })
            .collect();

        let mut out = Self::new(name);
        let mut failures = Vec::new();
        for (year, source, res) in loaded {
            match res.and_then(|layer| out.insert(layer)) {
                Ok(()) => {}
                Err(error) => {
                    tracing::warn!(year, %source, %error, "layer failed to load");
                    failures.push(LoadFailure {
                        year,
                        source,
                        error,
                    });
                }
            }
        }
        (out, failures)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insert(&mut self, layer: Layer) -> AnimResult<()> {
        let Some(year) = layer.year().year() else {
            return Err(AnimError::validation(format!(
                "collection '{}' only holds per-year layers",
                self.name
            )));
        };
        // The existing layer stays in place when the merge fails.
        let merged = match self.layers.get(&year) {
            Some(existing) => Layer::merge(&[existing.clone(), layer])?,
            None => layer,
        };
        self.layers.insert(year, merged);
        Ok(())
    }

    pub fn get(&self, year: Year) -> Option<&Layer> {
        self.layers.get(&year)
    }

    pub fn years(&self) -> impl Iterator<Item = Year> + '_ {
        self.layers.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Year, &Layer)> + '_ {
        self.layers.iter().map(|(y, l)| (*y, l))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Keep only the given years.
    pub fn restrict(&self, years: &BTreeSet<Year>) -> Self {
        Self {
            name: self.name.clone(),
            layers: self
                .layers
                .iter()
                .filter(|(y, _)| years.contains(y))
                .map(|(y, l)| (*y, l.clone()))
                .collect(),
        }
    }

    /// Reference grid for this collection under `policy`.
    pub fn reference_grid(&self, policy: ResolutionPolicy) -> AnimResult<BoundingBox> {
        let mut grids = self.layers.values().map(|l| l.grid());
        let Some(first) = grids.next() else {
            return Err(AnimError::data_source(format!(
                "collection '{}' has no layers",
                self.name
            )));
        };
        let mut chosen = first;
        for g in grids {
            if g.same_resolution(first) {
                continue;
            }
            match policy {
                ResolutionPolicy::Reject => {
                    return Err(AnimError::grid_mismatch(format!(
                        "collection '{}' mixes resolutions {}x{} and {}x{}",
                        self.name,
                        first.pixel_width,
                        first.pixel_height,
                        g.pixel_width,
                        g.pixel_height
                    )));
                }
                ResolutionPolicy::First => {}
                ResolutionPolicy::Finest => {
                    if g.pixel_area() < chosen.pixel_area() {
                        chosen = g;
                    }
                }
                ResolutionPolicy::Coarsest => {
                    if g.pixel_area() > chosen.pixel_area() {
                        chosen = g;
                    }
                }
            }
        }
        Ok(chosen.clone())
    }

    /// Reconcile every layer onto `target` in parallel.
    pub fn reconcile(&self, target: &BoundingBox, resampling: Resampling) -> AnimResult<Self> {
        let layers = self
            .layers
            .par_iter()
            .map(|(y, l)| Ok((*y, l.reconcile(target, resampling)?)))
            .collect::<AnimResult<BTreeMap<_, _>>>()?;
        Ok(Self {
            name: self.name.clone(),
            layers,
        })
    }

    /// [`reconcile`](Self::reconcile) through the run cache: each layer is reconciled at
    /// most once per `(layer, target, resampling)`.
    pub fn reconcile_cached(
        &self,
        target: &BoundingBox,
        resampling: Resampling,
        cache: &RunCache,
    ) -> AnimResult<Self> {
        let layers = self
            .layers
            .par_iter()
            .map(|(y, l)| {
                let mut kb = KeyBuilder::new("layer/reconcile");
                kb.fingerprint(l.fingerprint()).u8(resampling.tag());
                target.write_key(&mut kb);
                let fp = kb.finish();
                let out = cache.layers.get_or_compute_persisted(&kb.key(), fp, || {
                    l.reconcile(target, resampling)
                })?;
                Ok((*y, out))
            })
            .collect::<AnimResult<BTreeMap<_, _>>>()?;
        Ok(Self {
            name: self.name.clone(),
            layers,
        })
    }

    /// Clip every layer to a static mask layer (reconcile onto its grid, then apply its
    /// nodata mask).
    pub fn clip_to(&self, mask: &Layer, resampling: Resampling) -> AnimResult<Self> {
        let layers = self
            .layers
            .par_iter()
            .map(|(y, l)| Ok((*y, l.clip_to(mask, resampling)?)))
            .collect::<AnimResult<BTreeMap<_, _>>>()?;
        Ok(Self {
            name: self.name.clone(),
            layers,
        })
    }

    /// Year-by-year [`Layer::blend`] with other aligned collections. Years missing from this
    /// collection use a zero-valued placeholder shaped like any available layer.
    pub fn blend(&self, others: &[(&LayerCollection, BlendMode)]) -> AnimResult<Self> {
        let years: BTreeSet<Year> = self
            .years()
            .chain(others.iter().flat_map(|(c, _)| c.years()))
            .collect();
        let mut out = Self::new(self.name.clone());
        for year in years {
            let local = match self.get(year) {
                Some(l) => l.clone(),
                None => {
                    let template = self
                        .layers
                        .values()
                        .next()
                        .or_else(|| others.iter().find_map(|(c, _)| c.layers.values().next()))
                        .ok_or_else(|| AnimError::validation("cannot blend empty collections"))?;
                    template.flatten(0.0).with_year(LayerYear::Year(year))
                }
            };
            let operands: Vec<(&Layer, BlendMode)> = others
                .iter()
                .filter_map(|(c, mode)| c.get(year).map(|l| (l, *mode)))
                .collect();
            let blended = if operands.is_empty() {
                local
            } else {
                local.blend(&operands)?
            };
            out.layers.insert(year, blended);
        }
        Ok(out)
    }

    /// Every valid pixel value across all years.
    pub fn value_population(&self) -> Vec<f32> {
        self.layers
            .values()
            .flat_map(|l| l.valid_values())
            .collect()
    }

    /// Remap interpreted layers so the same label has the same code in every year: labels
    /// are sorted and numbered from 1. Collections without interpretations are returned
    /// unchanged.
    pub fn normalize_interpretations(&self) -> AnimResult<Self> {
        let labels: BTreeSet<&str> = self
            .layers
            .values()
            .filter_map(|l| l.interpretation())
            .flat_map(|i| i.values().map(String::as_str))
            .collect();
        if labels.is_empty() {
            return Ok(self.clone());
        }
        let common: Interpretation = labels
            .into_iter()
            .enumerate()
            .map(|(i, label)| (i as i64 + 1, label.to_string()))
            .collect();
        let layers = self
            .layers
            .par_iter()
            .map(|(y, l)| {
                let out = if l.interpretation().is_some() {
                    l.reclassify(&common, 0.0)?
                } else {
                    l.clone()
                };
                Ok((*y, out))
            })
            .collect::<AnimResult<BTreeMap<_, _>>>()?;
        Ok(Self {
            name: self.name.clone(),
            layers,
        })
    }

    /// Codes present in the pixel data, with their labels.
    pub fn observed_codes(&self) -> Interpretation {
        let mut out = Interpretation::new();
        for layer in self.layers.values() {
            let Some(interp) = layer.interpretation() else {
                continue;
            };
            let present: BTreeSet<i64> = layer
                .values()
                .iter()
                .filter_map(|v| layer.code_of(*v))
                .collect();
            for code in present {
                if let Some(label) = interp.get(&code) {
                    out.insert(code, label.clone());
                }
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "../../tests/unit/spatial/collection.rs"]
mod tests;
