use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;

use crate::{
    cache::RunContext,
    cache::key::{Fingerprint, KeyBuilder},
    color::colorizer::{Colorizer, ColorizerSpec},
    color::legend::Legend,
    foundation::core::{Rgba8, Year},
    foundation::error::{AnimError, AnimResult},
    indicator::series::AnnualSeries,
    render::composite::over,
    render::frame::FrameRGBA,
    spatial::collection::{LayerCollection, LoadFailure, ResolutionPolicy},
    spatial::grid::BoundingBox,
    spatial::layer::{Aggregation, Layer},
    spatial::reproject::Resampling,
};

/// Setup parameters of a [`SpatialIndicator`].
#[derive(Clone, Debug)]
pub struct SpatialOptions {
    pub title: String,
    pub units: String,
    pub colorizer: ColorizerSpec,
    /// Nearest for categorical data, bilinear or average for continuous data.
    pub resampling: Resampling,
    pub policy: ResolutionPolicy,
    /// Static layer whose valid pixels mark the study area. Its grid becomes the reference
    /// grid and every layer is clipped to it.
    pub background: Option<Layer>,
    pub background_color: Rgba8,
    /// Years shown by the animation. The colorizer population only covers these years.
    pub years: Option<BTreeSet<Year>>,
}

impl Default for SpatialOptions {
    fn default() -> Self {
        Self {
            title: String::new(),
            units: String::new(),
            colorizer: ColorizerSpec::default(),
            resampling: Resampling::default(),
            policy: ResolutionPolicy::default(),
            background: None,
            background_color: Rgba8::rgb(224, 224, 224),
            years: None,
        }
    }
}

/// A per-year raster quantity colorized onto the reference grid.
#[derive(Clone, Debug)]
pub struct SpatialIndicator {
    name: String,
    title: String,
    units: String,
    grid: BoundingBox,
    collection: LayerCollection,
    colorizer: Colorizer,
    background: Option<Layer>,
    background_color: Rgba8,
    failed_years: BTreeMap<Year, String>,
    fingerprint: Fingerprint,
}

impl SpatialIndicator {
    /// Reconcile `collection` onto the reference grid and build the colorizer from every
    /// valid value. Grid mismatches and classification errors surface here, before any
    /// frame is rendered.
    ///
    /// Years listed in `failures` could not be loaded; rendering them fails instead of
    /// producing a blank panel.
    #[tracing::instrument(skip_all, fields(indicator = %name))]
    pub fn build(
        name: &str,
        collection: LayerCollection,
        failures: &[LoadFailure],
        opts: SpatialOptions,
        ctx: &RunContext,
    ) -> AnimResult<Self> {
        let name = name.to_string();
        let collection = match &opts.years {
            Some(years) => collection.restrict(years),
            None => collection,
        };
        let background = opts.background.as_ref().map(|bg| bg.flatten(1.0));
        let grid = match &background {
            Some(bg) => bg.grid().clone(),
            None => collection.reference_grid(opts.policy)?,
        };

        let mut reconciled = collection.reconcile_cached(&grid, opts.resampling, &ctx.cache)?;
        if let Some(bg) = &background {
            reconciled = reconciled.clip_to(bg, opts.resampling)?;
        }
        let title = if opts.title.is_empty() {
            name.clone()
        } else {
            opts.title.clone()
        };
        let colorizer = opts
            .colorizer
            .build(&title, &reconciled.value_population())?;

        let failed_years: BTreeMap<Year, String> = failures
            .iter()
            .filter(|f| opts.years.as_ref().is_none_or(|ys| ys.contains(&f.year)))
            .map(|f| (f.year, f.error.to_string()))
            .collect();
        if !failed_years.is_empty() {
            tracing::warn!(
                failed = failed_years.len(),
                "indicator has years that failed to load"
            );
        }

        let mut kb = KeyBuilder::new("spatial_indicator");
        kb.str(&name)
            .fingerprint(colorizer.fingerprint())
            .str(&opts.background_color.to_hex());
        grid.write_key(&mut kb);
        match &background {
            Some(bg) => kb.u8(1).fingerprint(bg.fingerprint()),
            None => kb.u8(0),
        };
        kb.u64(reconciled.len() as u64);
        for (year, layer) in reconciled.iter() {
            kb.i64(i64::from(year)).fingerprint(layer.fingerprint());
        }
        tracing::info!(
            years = reconciled.len(),
            bins = colorizer.bin_count(),
            width = grid.width,
            height = grid.height,
            "indicator ready"
        );

        Ok(Self {
            name,
            title,
            units: opts.units,
            grid,
            collection: reconciled,
            colorizer,
            background,
            background_color: opts.background_color,
            failed_years,
            fingerprint: kb.finish(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn grid(&self) -> &BoundingBox {
        &self.grid
    }

    pub fn collection(&self) -> &LayerCollection {
        &self.collection
    }

    pub fn colorizer(&self) -> &Colorizer {
        &self.colorizer
    }

    pub fn legend(&self) -> Legend {
        self.colorizer.legend()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn has_data(&self, year: Year) -> bool {
        self.collection.get(year).is_some()
    }

    /// The year's source failed to load.
    pub fn is_failed(&self, year: Year) -> bool {
        self.failed_years.contains_key(&year)
    }

    pub fn years(&self) -> BTreeSet<Year> {
        self.collection
            .years()
            .chain(self.failed_years.keys().copied())
            .collect()
    }

    /// Colorized panel for `year`. A year without a layer renders the blank panel
    /// (background only); a year whose source failed to load is an error.
    #[tracing::instrument(skip(self, ctx), fields(indicator = %self.name))]
    pub fn render(&self, year: Year, ctx: &RunContext) -> AnimResult<FrameRGBA> {
        if let Some(err) = self.failed_years.get(&year) {
            return Err(AnimError::data_source(format!(
                "'{}' has no usable layer for {year}: {err}",
                self.name
            )));
        }
        let layer = self.collection.get(year);
        let mut kb = KeyBuilder::new("panel/spatial");
        kb.fingerprint(self.fingerprint);
        match layer {
            Some(l) => kb.u8(1).fingerprint(l.fingerprint()),
            None => kb.u8(0),
        };
        let inputs = kb.finish();
        ctx.cache
            .panels
            .get_or_compute_persisted(&kb.key(), inputs, || Ok(self.paint(layer)))
    }

    fn paint(&self, layer: Option<&Layer>) -> FrameRGBA {
        let w = self.grid.width as usize;
        let h = self.grid.height as usize;
        let bg = self.background_color.to_premul();
        let mut data = vec![0u8; w * h * 4];
        data.par_chunks_mut(w * 4).enumerate().for_each(|(row, out)| {
            for col in 0..w {
                let i = row * w + col;
                let mut px = [0u8; 4];
                if let Some(b) = &self.background
                    && !b.is_nodata(b.values()[i])
                {
                    px = bg;
                }
                if let Some(l) = layer {
                    let v = l.values()[i];
                    if !l.is_nodata(v) {
                        let c = self.colorizer.classify(f64::from(v));
                        if c.a > 0 {
                            px = over(px, c.to_premul(), 1.0);
                        }
                    }
                }
                out[col * 4..col * 4 + 4].copy_from_slice(&px);
            }
        });
        FrameRGBA {
            width: self.grid.width,
            height: self.grid.height,
            data,
            scale_m: Some(self.grid.scale_m()),
        }
    }

    /// Per-year sum or mean of the valid pixels.
    pub fn annual_series(&self, aggregation: Aggregation) -> AnnualSeries {
        AnnualSeries::from_pairs(
            self.name.clone(),
            self.units.clone(),
            self.collection
                .iter()
                .map(|(y, l)| (y, l.aggregate(aggregation))),
        )
    }
}

#[cfg(test)]
#[path = "../../tests/unit/indicator/spatial.rs"]
mod tests;
