use crate::{
    foundation::error::{AnimError, AnimResult},
    spatial::grid::Crs,
};

const R: f64 = 6_378_137.0;
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// Resampling kernel used when a layer is moved onto another grid.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Resampling {
    /// Categorical data (disturbance codes).
    Nearest,
    /// Continuous data.
    #[default]
    Bilinear,
    /// Area-weighted mean of the source cells inside each target cell.
    Average,
}

impl Resampling {
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Nearest => 0,
            Self::Bilinear => 1,
            Self::Average => 2,
        }
    }
}

/// Point transform between two CRSs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transform {
    Identity,
    GeographicToMercator,
    MercatorToGeographic,
}

impl Transform {
    pub fn between(from: &Crs, to: &Crs) -> AnimResult<Self> {
        match (from, to) {
            (a, b) if a == b => Ok(Self::Identity),
            (Crs::Geographic, Crs::WebMercator) => Ok(Self::GeographicToMercator),
            (Crs::WebMercator, Crs::Geographic) => Ok(Self::MercatorToGeographic),
            _ => Err(AnimError::grid_mismatch(format!(
                "no transform from {from} to {to}"
            ))),
        }
    }

    pub fn apply(self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Self::Identity => (x, y),
            Self::GeographicToMercator => {
                let lat = y.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
                (
                    R * x.to_radians(),
                    R * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln(),
                )
            }
            Self::MercatorToGeographic => (
                (x / R).to_degrees(),
                (2.0 * (y / R).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees(),
            ),
        }
    }
}
