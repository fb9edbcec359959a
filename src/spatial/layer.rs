use std::{collections::BTreeMap, sync::Arc};

use rayon::prelude::*;

use crate::{
    cache::key::{Fingerprint, KeyBuilder},
    foundation::core::LayerYear,
    foundation::error::{AnimError, AnimResult},
    spatial::grid::BoundingBox,
    spatial::reproject::{Resampling, Transform},
};

/// Pixel value → category label for interpreted (categorical) layers.
pub type Interpretation = BTreeMap<i64, String>;

/// How [`Layer::blend`] combines an operand with the accumulated value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    Add,
    Subtract,
}

/// Reduction applied by [`Layer::aggregate`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Absolute quantities: sum of valid pixels.
    #[default]
    Sum,
    /// Per-area quantities: mean of valid pixels.
    Mean,
}

/// One immutable raster grid for one year (or a static layer).
///
/// Pixel storage is shared, so cloning a layer is cheap and derived layers never copy their
/// parent's values unless they change them.
#[derive(Clone, Debug)]
pub struct Layer {
    year: LayerYear,
    grid: BoundingBox,
    nodata: f32,
    values: Arc<Vec<f32>>,
    interpretation: Option<Arc<Interpretation>>,
    source: Arc<str>,
    fingerprint: Fingerprint,
}

impl PartialEq for Layer {
    fn eq(&self, other: &Self) -> bool {
        self.year == other.year
            && self.grid == other.grid
            && self.nodata.to_bits() == other.nodata.to_bits()
            && self.interpretation == other.interpretation
            && (Arc::ptr_eq(&self.values, &other.values)
                || self
                    .values
                    .iter()
                    .zip(other.values.iter())
                    .all(|(a, b)| a.to_bits() == b.to_bits()))
    }
}

impl Layer {
    pub fn new(
        year: LayerYear,
        grid: BoundingBox,
        values: Vec<f32>,
        nodata: f32,
    ) -> AnimResult<Self> {
        if values.len() != grid.len() {
            return Err(AnimError::data_source(format!(
                "raster has {} values, grid {}x{} expects {}",
                values.len(),
                grid.width,
                grid.height,
                grid.len()
            )));
        }
        Ok(Self::build(
            year,
            grid,
            Arc::new(values),
            nodata,
            None,
            Arc::from("memory"),
        ))
    }

    fn build(
        year: LayerYear,
        grid: BoundingBox,
        values: Arc<Vec<f32>>,
        nodata: f32,
        interpretation: Option<Arc<Interpretation>>,
        source: Arc<str>,
    ) -> Self {
        let mut kb = KeyBuilder::new("layer");
        match year {
            LayerYear::Static => kb.u8(0),
            LayerYear::Year(y) => kb.u8(1).i64(i64::from(y)),
        };
        grid.write_key(&mut kb);
        kb.u64(u64::from(nodata.to_bits())).f32_slice(&values);
        if let Some(interp) = &interpretation {
            kb.u64(interp.len() as u64);
            for (code, label) in interp.iter() {
                kb.i64(*code).str(label);
            }
        }
        let fingerprint = kb.finish();
        Self {
            year,
            grid,
            nodata,
            values,
            interpretation,
            source,
            fingerprint,
        }
    }

    /// Reassemble a layer from stored parts; the fingerprint is recomputed.
    pub(crate) fn from_parts(
        year: LayerYear,
        grid: BoundingBox,
        values: Vec<f32>,
        nodata: f32,
        interpretation: Option<Interpretation>,
        source: &str,
    ) -> AnimResult<Self> {
        if values.len() != grid.len() {
            return Err(AnimError::data_source(format!(
                "stored layer has {} values, grid expects {}",
                values.len(),
                grid.len()
            )));
        }
        Ok(Self::build(
            year,
            grid,
            Arc::new(values),
            nodata,
            interpretation.map(Arc::new),
            Arc::from(source),
        ))
    }

    fn derive(&self, grid: BoundingBox, values: Vec<f32>, what: &str) -> Self {
        Self::build(
            self.year,
            grid,
            Arc::new(values),
            self.nodata,
            self.interpretation.clone(),
            Arc::from(format!("{}|{what}", self.source)),
        )
    }

    pub fn with_interpretation(self, interpretation: Interpretation) -> Self {
        Self::build(
            self.year,
            self.grid,
            self.values,
            self.nodata,
            Some(Arc::new(interpretation)),
            self.source,
        )
    }

    pub fn with_year(self, year: LayerYear) -> Self {
        Self::build(
            year,
            self.grid,
            self.values,
            self.nodata,
            self.interpretation,
            self.source,
        )
    }

    /// Replace the source identity used in logs and derived cache keys.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Arc::from(source.into());
        self
    }

    pub fn year(&self) -> LayerYear {
        self.year
    }

    pub fn grid(&self) -> &BoundingBox {
        &self.grid
    }

    pub fn nodata(&self) -> f32 {
        self.nodata
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn interpretation(&self) -> Option<&Interpretation> {
        self.interpretation.as_deref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Content fingerprint covering year, grid, nodata, values and interpretation.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub(crate) fn shares_storage_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }

    pub fn is_nodata(&self, v: f32) -> bool {
        v.is_nan() || v == self.nodata
    }

    pub fn value(&self, col: u32, row: u32) -> Option<f32> {
        if col >= self.grid.width || row >= self.grid.height {
            return None;
        }
        let v = self.values[self.grid.index(col, row)];
        (!self.is_nodata(v)).then_some(v)
    }

    pub fn valid_values(&self) -> impl Iterator<Item = f32> + '_ {
        self.values.iter().copied().filter(|v| !self.is_nodata(*v))
    }

    /// Integer category code of a valid pixel value.
    pub fn code_of(&self, v: f32) -> Option<i64> {
        (!self.is_nodata(v) && v.fract() == 0.0).then_some(v as i64)
    }

    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.valid_values().fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    /// Place this layer exactly on `target`.
    ///
    /// An already aligned layer is returned as-is with shared storage, which makes
    /// reconciliation idempotent. Target cells outside the source extent are nodata.
    #[tracing::instrument(skip(self, target), fields(source = %self.source, year = ?self.year))]
    pub fn reconcile(&self, target: &BoundingBox, resampling: Resampling) -> AnimResult<Layer> {
        if self.grid.is_aligned_with(target) {
            return Ok(self.clone());
        }
        let transform = Transform::between(&target.crs, &self.grid.crs)?;
        let mut out = vec![self.nodata; target.len()];
        let row_len = target.width as usize;
        out.par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(row, line)| {
                for (col, px) in line.iter_mut().enumerate() {
                    *px = self.sample(target, transform, col as u32, row as u32, resampling);
                }
            });
        tracing::debug!(
            from = ?(self.grid.width, self.grid.height),
            to = ?(target.width, target.height),
            ?resampling,
            "reconciled layer"
        );
        Ok(self.derive(target.clone(), out, "reconciled"))
    }

    fn sample(
        &self,
        target: &BoundingBox,
        transform: Transform,
        col: u32,
        row: u32,
        resampling: Resampling,
    ) -> f32 {
        let (tx, ty) = target.cell_center(col, row);
        let (sx, sy) = transform.apply(tx, ty);
        let (fc, fr) = self.grid.to_pixel(sx, sy);
        match resampling {
            Resampling::Nearest => self.sample_nearest(fc, fr),
            Resampling::Bilinear => self.sample_bilinear(fc, fr),
            Resampling::Average => self.sample_average(target, transform, col, row, fc, fr),
        }
    }

    fn sample_nearest(&self, fc: f64, fr: f64) -> f32 {
        if fc < 0.0 || fr < 0.0 {
            return self.nodata;
        }
        let (c, r) = (fc.floor(), fr.floor());
        if c >= f64::from(self.grid.width) || r >= f64::from(self.grid.height) {
            return self.nodata;
        }
        self.values[self.grid.index(c as u32, r as u32)]
    }

    fn sample_bilinear(&self, fc: f64, fr: f64) -> f32 {
        let px = fc - 0.5;
        let py = fr - 0.5;
        let (x0, y0) = (px.floor(), py.floor());
        if x0 < 0.0
            || y0 < 0.0
            || x0 + 1.0 >= f64::from(self.grid.width)
            || y0 + 1.0 >= f64::from(self.grid.height)
        {
            return self.sample_nearest(fc, fr);
        }
        let (c0, r0) = (x0 as u32, y0 as u32);
        let taps = [
            self.values[self.grid.index(c0, r0)],
            self.values[self.grid.index(c0 + 1, r0)],
            self.values[self.grid.index(c0, r0 + 1)],
            self.values[self.grid.index(c0 + 1, r0 + 1)],
        ];
        if taps.iter().any(|v| self.is_nodata(*v)) {
            return self.sample_nearest(fc, fr);
        }
        let (tx, ty) = (px - x0, py - y0);
        let top = f64::from(taps[0]) * (1.0 - tx) + f64::from(taps[1]) * tx;
        let bottom = f64::from(taps[2]) * (1.0 - tx) + f64::from(taps[3]) * tx;
        (top * (1.0 - ty) + bottom * ty) as f32
    }

    fn sample_average(
        &self,
        target: &BoundingBox,
        transform: Transform,
        col: u32,
        row: u32,
        fc: f64,
        fr: f64,
    ) -> f32 {
        let (cx, cy) = target.cell_center(col, row);
        let (hw, hh) = (target.pixel_width / 2.0, target.pixel_height / 2.0);
        let corners = [
            (cx - hw, cy - hh),
            (cx + hw, cy - hh),
            (cx - hw, cy + hh),
            (cx + hw, cy + hh),
        ];
        let (mut min_c, mut min_r) = (f64::INFINITY, f64::INFINITY);
        let (mut max_c, mut max_r) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            let (sx, sy) = transform.apply(x, y);
            let (c, r) = self.grid.to_pixel(sx, sy);
            min_c = min_c.min(c);
            max_c = max_c.max(c);
            min_r = min_r.min(r);
            max_r = max_r.max(r);
        }

        // Source cells whose centers fall inside [min, max).
        let first = |lo: f64| (lo - 0.5).ceil().max(0.0);
        let last = |hi: f64, n: u32| ((hi - 0.5).ceil() - 1.0).min(f64::from(n) - 1.0);
        let (c0, c1) = (first(min_c), last(max_c, self.grid.width));
        let (r0, r1) = (first(min_r), last(max_r, self.grid.height));

        let mut sum = 0.0_f64;
        let mut count = 0_u32;
        if c0 <= c1 && r0 <= r1 {
            for r in r0 as u32..=r1 as u32 {
                for c in c0 as u32..=c1 as u32 {
                    let v = self.values[self.grid.index(c, r)];
                    if !self.is_nodata(v) {
                        sum += f64::from(v);
                        count += 1;
                    }
                }
            }
        }
        if count == 0 {
            return self.sample_nearest(fc, fr);
        }
        (sum / f64::from(count)) as f32
    }

    fn require_aligned(&self, other: &Layer, op: &str) -> AnimResult<()> {
        if self.grid.is_aligned_with(&other.grid) {
            Ok(())
        } else {
            Err(AnimError::grid_mismatch(format!(
                "{op}: '{}' and '{}' are not on the same grid",
                self.source, other.source
            )))
        }
    }

    /// Set every pixel outside the mask's valid pixels to nodata.
    pub fn masked_by(&self, mask: &Layer) -> AnimResult<Layer> {
        self.require_aligned(mask, "mask")?;
        let values = self
            .values
            .iter()
            .zip(mask.values.iter())
            .map(|(v, m)| if mask.is_nodata(*m) { self.nodata } else { *v })
            .collect();
        Ok(self.derive(self.grid.clone(), values, "masked"))
    }

    /// Reconcile onto the mask's grid, then apply its nodata mask.
    pub fn clip_to(&self, mask: &Layer, resampling: Resampling) -> AnimResult<Layer> {
        self.reconcile(&mask.grid, resampling)?.masked_by(mask)
    }

    /// Every valid pixel becomes `value`; the interpretation is dropped.
    pub fn flatten(&self, value: f32) -> Layer {
        let values = self
            .values
            .iter()
            .map(|v| if self.is_nodata(*v) { self.nodata } else { value })
            .collect();
        Self::build(
            self.year,
            self.grid.clone(),
            Arc::new(values),
            self.nodata,
            None,
            Arc::from(format!("{}|flat({value})", self.source)),
        )
    }

    /// Combine fragmented layers of one year (for example fire and harvest in separate
    /// files). The first valid value at each pixel wins.
    pub fn merge(layers: &[Layer]) -> AnimResult<Layer> {
        let Some((first, rest)) = layers.split_first() else {
            return Err(AnimError::validation("cannot merge an empty set of layers"));
        };
        if rest.is_empty() {
            return Ok(first.clone());
        }
        let mut interpretation = first.interpretation().cloned();
        for layer in rest {
            first.require_aligned(layer, "merge")?;
            if layer.year != first.year {
                return Err(AnimError::validation(format!(
                    "cannot merge layers of {:?} and {:?}",
                    first.year, layer.year
                )));
            }
            if let Some(other) = layer.interpretation() {
                let merged = interpretation.get_or_insert_with(Interpretation::new);
                for (code, label) in other {
                    if let Some(existing) = merged.get(code)
                        && existing != label
                    {
                        return Err(AnimError::validation(format!(
                            "merge: code {code} is '{existing}' in one layer and '{label}' in another"
                        )));
                    }
                    merged.insert(*code, label.clone());
                }
            }
        }

        let mut values = first.values.as_ref().clone();
        for layer in rest {
            for (dst, src) in values.iter_mut().zip(layer.values.iter()) {
                if first.is_nodata(*dst) && !layer.is_nodata(*src) {
                    *dst = *src;
                }
            }
        }
        let sources: Vec<&str> = layers.iter().map(|l| l.source()).collect();
        Ok(Self::build(
            first.year,
            first.grid.clone(),
            Arc::new(values),
            first.nodata,
            interpretation.map(Arc::new),
            Arc::from(format!("merge({})", sources.join(","))),
        ))
    }

    /// Pixel-wise arithmetic with other aligned layers. Pixels where any operand is nodata
    /// become zero.
    pub fn blend(&self, others: &[(&Layer, BlendMode)]) -> AnimResult<Layer> {
        for (other, _) in others {
            self.require_aligned(other, "blend")?;
        }
        let values = (0..self.values.len())
            .map(|i| {
                let base = self.values[i];
                if self.is_nodata(base) {
                    return 0.0;
                }
                let mut acc = f64::from(base);
                for (other, mode) in others {
                    let v = other.values[i];
                    if other.is_nodata(v) {
                        return 0.0;
                    }
                    match mode {
                        BlendMode::Add => acc += f64::from(v),
                        BlendMode::Subtract => acc -= f64::from(v),
                    }
                }
                acc as f32
            })
            .collect();
        Ok(self.derive(self.grid.clone(), values, "blend"))
    }

    /// Remap pixel codes through their labels onto `target` codes. Codes whose label has no
    /// counterpart in `target` (or that have no label at all) become `nodata`.
    pub fn reclassify(&self, target: &Interpretation, nodata: f32) -> AnimResult<Layer> {
        let Some(current) = self.interpretation() else {
            return Err(AnimError::validation(format!(
                "layer '{}' has no interpretation to reclassify",
                self.source
            )));
        };
        let by_label: BTreeMap<&str, i64> =
            target.iter().map(|(c, l)| (l.as_str(), *c)).collect();
        let remap: BTreeMap<i64, i64> = current
            .iter()
            .filter_map(|(code, label)| by_label.get(label.as_str()).map(|new| (*code, *new)))
            .collect();
        for label in current.values() {
            if !by_label.contains_key(label.as_str()) {
                tracing::info!(label = %label, "no new pixel value; setting to nodata");
            }
        }
        let values = self
            .values
            .iter()
            .map(|v| match self.code_of(*v).and_then(|c| remap.get(&c)) {
                Some(new) => *new as f32,
                None => nodata,
            })
            .collect();
        Ok(Self::build(
            self.year,
            self.grid.clone(),
            Arc::new(values),
            nodata,
            Some(Arc::new(target.clone())),
            Arc::from(format!("{}|reclassified", self.source)),
        ))
    }

    pub fn aggregate(&self, how: Aggregation) -> f64 {
        let (sum, count) = self
            .valid_values()
            .fold((0.0_f64, 0_u64), |(s, n), v| (s + f64::from(v), n + 1));
        match how {
            Aggregation::Sum => sum,
            Aggregation::Mean if count == 0 => 0.0,
            Aggregation::Mean => sum / count as f64,
        }
    }

    /// Inclusive `(col_min, row_min, col_max, row_max)` around the valid pixels.
    pub fn data_extent(&self) -> Option<(u32, u32, u32, u32)> {
        let mut ext: Option<(u32, u32, u32, u32)> = None;
        for row in 0..self.grid.height {
            for col in 0..self.grid.width {
                if self.value(col, row).is_none() {
                    continue;
                }
                ext = Some(match ext {
                    None => (col, row, col, row),
                    Some((c0, r0, c1, r1)) => (c0.min(col), r0.min(row), c1.max(col), r1.max(row)),
                });
            }
        }
        ext
    }

    pub fn window(&self, col0: u32, row0: u32, width: u32, height: u32) -> AnimResult<Layer> {
        let grid = self.grid.window(col0, row0, width, height)?;
        let mut values = Vec::with_capacity(grid.len());
        for row in row0..row0 + height {
            let start = self.grid.index(col0, row);
            values.extend_from_slice(&self.values[start..start + width as usize]);
        }
        Ok(self.derive(grid, values, "window"))
    }

    /// Shrink to the minimum box around the valid pixels plus `pad` pixels on each side
    /// (clamped to the grid).
    pub fn crop_to_data(&self, pad: u32) -> AnimResult<Layer> {
        let Some((c0, r0, c1, r1)) = self.data_extent() else {
            return Err(AnimError::data_source(format!(
                "layer '{}' has no valid pixels",
                self.source
            )));
        };
        let c0 = c0.saturating_sub(pad);
        let r0 = r0.saturating_sub(pad);
        let c1 = (c1 + pad).min(self.grid.width - 1);
        let r1 = (r1 + pad).min(self.grid.height - 1);
        self.window(c0, r0, c1 - c0 + 1, r1 - r0 + 1)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/spatial/layer.rs"]
mod tests;
