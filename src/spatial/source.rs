use std::{
    fmt::Write as _,
    io::Write as _,
    path::{Path, PathBuf},
};

use anyhow::Context;

use crate::{
    foundation::core::LayerYear,
    foundation::error::{AnimError, AnimResult},
    spatial::grid::{BoundingBox, Crs},
    spatial::layer::{Interpretation, Layer},
};

/// Raw raster contents returned by a [`RasterSource`].
#[derive(Clone, Debug, PartialEq)]
pub struct RasterData {
    pub grid: BoundingBox,
    pub nodata: f32,
    pub values: Vec<f32>,
}

/// Anything that can produce one raster grid.
pub trait RasterSource: Send + Sync {
    /// Stable identity (path or name) used in logs and layer provenance.
    fn identity(&self) -> String;

    fn read(&self) -> AnimResult<RasterData>;
}

/// Read a source into a [`Layer`] for the given year.
pub fn load_layer(
    source: &dyn RasterSource,
    year: LayerYear,
    interpretation: Option<&Interpretation>,
) -> AnimResult<Layer> {
    let data = source.read()?;
    let layer = Layer::new(year, data.grid, data.values, data.nodata)?.with_source(source.identity());
    Ok(match interpretation {
        Some(interp) => layer.with_interpretation(interp.clone()),
        None => layer,
    })
}

/// ESRI ASCII grid (`.asc`) on disk. The CRS comes from a `.prj` sidecar whose first token is
/// the CRS identifier, or from [`AsciiGridSource::with_crs`].
#[derive(Clone, Debug)]
pub struct AsciiGridSource {
    path: PathBuf,
    crs: Option<Crs>,
}

impl AsciiGridSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            crs: None,
        }
    }

    /// Fallback CRS used when no `.prj` sidecar exists.
    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn resolve_crs(&self) -> AnimResult<Crs> {
        let prj = self.path.with_extension("prj");
        if prj.exists() {
            let text = std::fs::read_to_string(&prj)
                .with_context(|| format!("read projection sidecar '{}'", prj.display()))?;
            let Some(id) = text.split_whitespace().next() else {
                return Err(AnimError::data_source(format!(
                    "projection sidecar '{}' is empty",
                    prj.display()
                )));
            };
            return Ok(Crs::parse(id));
        }
        Ok(self
            .crs
            .clone()
            .unwrap_or_else(|| Crs::Projected("unknown".to_string())))
    }
}

impl RasterSource for AsciiGridSource {
    fn identity(&self) -> String {
        self.path.display().to_string()
    }

    fn read(&self) -> AnimResult<RasterData> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            AnimError::data_source(format!("read '{}': {e}", self.path.display()))
        })?;
        parse_ascii_grid(&text, self.resolve_crs()?)
            .map_err(|e| AnimError::data_source(format!("'{}': {e}", self.path.display())))
    }
}

fn parse_ascii_grid(text: &str, crs: Crs) -> Result<RasterData, String> {
    let mut tokens = text.split_whitespace().peekable();
    let mut ncols = None;
    let mut nrows = None;
    let mut xll = None;
    let mut yll = None;
    let mut centered = false;
    let mut cellsize = None;
    let mut nodata = -9999.0_f32;

    while let Some(tok) = tokens.peek() {
        if tok.parse::<f64>().is_ok() {
            break;
        }
        let key = tok.to_ascii_lowercase();
        tokens.next();
        let value = tokens
            .next()
            .ok_or_else(|| format!("header '{key}' has no value"))?;
        let num = value
            .parse::<f64>()
            .map_err(|_| format!("header '{key}' value '{value}' is not a number"))?;
        match key.as_str() {
            "ncols" => ncols = Some(dimension(&key, num)?),
            "nrows" => nrows = Some(dimension(&key, num)?),
            "xllcorner" => xll = Some(num),
            "yllcorner" => yll = Some(num),
            "xllcenter" => {
                xll = Some(num);
                centered = true;
            }
            "yllcenter" => {
                yll = Some(num);
                centered = true;
            }
            "cellsize" => cellsize = Some(num),
            "nodata_value" => nodata = num as f32,
            other => return Err(format!("unknown header '{other}'")),
        }
    }

    let ncols = ncols.ok_or("missing ncols")?;
    let nrows = nrows.ok_or("missing nrows")?;
    let expected = (ncols as usize)
        .checked_mul(nrows as usize)
        .ok_or_else(|| format!("grid {ncols}x{nrows} is too large"))?;
    let cellsize = cellsize.ok_or("missing cellsize")?;
    let (mut x0, mut y0) = (xll.ok_or("missing xllcorner")?, yll.ok_or("missing yllcorner")?);
    if centered {
        x0 -= cellsize / 2.0;
        y0 -= cellsize / 2.0;
    }
    let top = y0 + cellsize * f64::from(nrows);
    let grid = BoundingBox::new(crs, (x0, top), (cellsize, cellsize), ncols, nrows)
        .map_err(|e| e.to_string())?;

    let mut values = Vec::new();
    for tok in tokens {
        if values.len() == expected {
            return Err(format!("more than {expected} values for {ncols}x{nrows}"));
        }
        let v = tok
            .parse::<f32>()
            .map_err(|_| format!("value '{tok}' is not a number"))?;
        values.push(v);
    }
    if values.len() != expected {
        return Err(format!(
            "expected {expected} values for {ncols}x{nrows}, found {}",
            values.len()
        ));
    }
    Ok(RasterData {
        grid,
        nodata,
        values,
    })
}

/// Grid dimensions are positive whole numbers that fit a `u32`.
fn dimension(key: &str, num: f64) -> Result<u32, String> {
    if !num.is_finite() || num.fract() != 0.0 || num < 1.0 {
        return Err(format!("header '{key}' must be a positive integer, got {num}"));
    }
    u32::try_from(num as u64).map_err(|_| format!("header '{key}' value {num} is too large"))
}

/// Write a layer as an ESRI ASCII grid plus `.prj` sidecar.
pub fn write_ascii_grid(path: &Path, layer: &Layer) -> AnimResult<()> {
    let g = layer.grid();
    if (g.pixel_width - g.pixel_height).abs() > f64::EPSILON * g.pixel_width.max(1.0) {
        return Err(AnimError::validation(
            "ASCII grids require square pixels",
        ));
    }
    let (min_x, min_y, _, _) = g.extent();
    let mut out = String::new();
    let _ = writeln!(out, "ncols {}", g.width);
    let _ = writeln!(out, "nrows {}", g.height);
    let _ = writeln!(out, "xllcorner {min_x}");
    let _ = writeln!(out, "yllcorner {min_y}");
    let _ = writeln!(out, "cellsize {}", g.pixel_width);
    let _ = writeln!(out, "NODATA_value {}", layer.nodata());
    for row in layer.values().chunks(g.width as usize) {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        let _ = writeln!(out, "{}", line.join(" "));
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create dir '{}'", parent.display()))?;
    }
    let mut f = std::fs::File::create(path)
        .with_context(|| format!("create '{}'", path.display()))?;
    f.write_all(out.as_bytes())
        .with_context(|| format!("write '{}'", path.display()))?;
    std::fs::write(path.with_extension("prj"), format!("{}\n", g.crs.id()))
        .with_context(|| format!("write projection sidecar for '{}'", path.display()))?;
    Ok(())
}

/// In-memory raster, used at the results-provider boundary and in tests.
#[derive(Clone, Debug)]
pub struct MemorySource {
    name: String,
    data: RasterData,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: RasterData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

impl RasterSource for MemorySource {
    fn identity(&self) -> String {
        format!("memory:{}", self.name)
    }

    fn read(&self) -> AnimResult<RasterData> {
        Ok(self.data.clone())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/spatial/source.rs"]
mod tests;
