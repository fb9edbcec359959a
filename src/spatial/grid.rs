use std::fmt;

use crate::{
    cache::key::KeyBuilder,
    foundation::error::{AnimError, AnimResult},
    foundation::math::approx_eq,
};

const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Coordinate reference system of a raster grid.
///
/// Serialized as an identifier string (`EPSG:4326`, `EPSG:3857`, anything else is kept
/// verbatim as a projected CRS).
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Crs {
    /// EPSG:4326, coordinates in degrees.
    Geographic,
    /// EPSG:3857, coordinates in metres.
    WebMercator,
    /// Any other projected CRS, coordinates in metres.
    Projected(String),
}

impl Crs {
    pub fn parse(id: &str) -> Self {
        let norm = id.trim().to_ascii_uppercase();
        match norm.as_str() {
            "EPSG:4326" | "4326" | "WGS84" | "WGS 84" => Self::Geographic,
            "EPSG:3857" | "3857" | "EPSG:900913" => Self::WebMercator,
            _ => Self::Projected(id.trim().to_string()),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Geographic => "EPSG:4326",
            Self::WebMercator => "EPSG:3857",
            Self::Projected(id) => id,
        }
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, Self::Geographic)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl From<String> for Crs {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<Crs> for String {
    fn from(value: Crs) -> Self {
        value.id().to_string()
    }
}

/// Spatial frame of reference shared by every layer drawn together: CRS, upper-left origin,
/// pixel size and pixel dimensions. Rows run from the top (north) downwards.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoundingBox {
    pub crs: Crs,
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(
        crs: Crs,
        origin: (f64, f64),
        pixel_size: (f64, f64),
        width: u32,
        height: u32,
    ) -> AnimResult<Self> {
        let (origin_x, origin_y) = origin;
        let (pixel_width, pixel_height) = pixel_size;
        if !(origin_x.is_finite() && origin_y.is_finite()) {
            return Err(AnimError::validation("grid origin must be finite"));
        }
        if !(pixel_width.is_finite() && pixel_width > 0.0)
            || !(pixel_height.is_finite() && pixel_height > 0.0)
        {
            return Err(AnimError::validation(format!(
                "grid pixel size must be positive, got {pixel_width}x{pixel_height}"
            )));
        }
        if width == 0 || height == 0 {
            return Err(AnimError::validation("grid must be at least 1x1 pixels"));
        }
        Ok(Self {
            crs,
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            width,
            height,
        })
    }

    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(min_x, min_y, max_x, max_y)` in CRS units.
    pub fn extent(&self) -> (f64, f64, f64, f64) {
        (
            self.origin_x,
            self.origin_y - self.pixel_height * f64::from(self.height),
            self.origin_x + self.pixel_width * f64::from(self.width),
            self.origin_y,
        )
    }

    pub fn cell_center(&self, col: u32, row: u32) -> (f64, f64) {
        (
            self.origin_x + (f64::from(col) + 0.5) * self.pixel_width,
            self.origin_y - (f64::from(row) + 0.5) * self.pixel_height,
        )
    }

    /// Continuous pixel coordinates of a CRS position. Cell `(c, r)` covers `[c, c + 1)` on
    /// both axes.
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (self.origin_y - y) / self.pixel_height,
        )
    }

    pub fn cell_at(&self, x: f64, y: f64) -> Option<(u32, u32)> {
        let (fc, fr) = self.to_pixel(x, y);
        if fc < 0.0 || fr < 0.0 {
            return None;
        }
        let (c, r) = (fc.floor(), fr.floor());
        (c < f64::from(self.width) && r < f64::from(self.height)).then_some((c as u32, r as u32))
    }

    pub fn index(&self, col: u32, row: u32) -> usize {
        row as usize * self.width as usize + col as usize
    }

    /// True when both boxes describe exactly the same pixels.
    pub fn is_aligned_with(&self, other: &Self) -> bool {
        self.crs == other.crs
            && self.width == other.width
            && self.height == other.height
            && approx_eq(self.origin_x, other.origin_x)
            && approx_eq(self.origin_y, other.origin_y)
            && approx_eq(self.pixel_width, other.pixel_width)
            && approx_eq(self.pixel_height, other.pixel_height)
    }

    pub fn same_resolution(&self, other: &Self) -> bool {
        self.crs == other.crs
            && approx_eq(self.pixel_width, other.pixel_width)
            && approx_eq(self.pixel_height, other.pixel_height)
    }

    /// Pixel area in CRS units, used to order grids by resolution.
    pub fn pixel_area(&self) -> f64 {
        self.pixel_width * self.pixel_height
    }

    /// Same extent resampled to a new pixel size; dimensions round up to cover the extent.
    pub fn with_pixel_size(&self, pixel_width: f64, pixel_height: f64) -> AnimResult<Self> {
        let (min_x, min_y, max_x, max_y) = self.extent();
        let width = ((max_x - min_x) / pixel_width - 1e-9).ceil().max(1.0) as u32;
        let height = ((max_y - min_y) / pixel_height - 1e-9).ceil().max(1.0) as u32;
        Self::new(
            self.crs.clone(),
            (self.origin_x, self.origin_y),
            (pixel_width, pixel_height),
            width,
            height,
        )
    }

    /// Sub-grid covering columns `col0..col0 + width` and rows `row0..row0 + height`.
    pub fn window(&self, col0: u32, row0: u32, width: u32, height: u32) -> AnimResult<Self> {
        if col0.saturating_add(width) > self.width || row0.saturating_add(height) > self.height {
            return Err(AnimError::validation(format!(
                "window {col0},{row0} {width}x{height} exceeds grid {}x{}",
                self.width, self.height
            )));
        }
        Self::new(
            self.crs.clone(),
            (
                self.origin_x + f64::from(col0) * self.pixel_width,
                self.origin_y - f64::from(row0) * self.pixel_height,
            ),
            (self.pixel_width, self.pixel_height),
            width,
            height,
        )
    }

    /// Horizontal ground distance of one pixel in metres.
    ///
    /// Metric CRSs report the pixel width directly; geographic grids measure one pixel along
    /// the parallel through the grid center.
    pub fn scale_m(&self) -> f64 {
        match self.crs {
            Crs::Geographic => {
                let (_, min_y, _, max_y) = self.extent();
                let lat = ((min_y + max_y) / 2.0).to_radians();
                self.pixel_width.to_radians() * EARTH_RADIUS_M * lat.cos()
            }
            Crs::WebMercator | Crs::Projected(_) => self.pixel_width,
        }
    }

    pub(crate) fn write_key(&self, kb: &mut KeyBuilder) {
        kb.str(self.crs.id())
            .f64(self.origin_x)
            .f64(self.origin_y)
            .f64(self.pixel_width)
            .f64(self.pixel_height)
            .u64(u64::from(self.width))
            .u64(u64::from(self.height));
    }
}

#[cfg(test)]
#[path = "../../tests/unit/spatial/grid.rs"]
mod tests;
