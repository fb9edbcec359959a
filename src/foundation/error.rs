use crate::foundation::core::Year;

/// Convenience result type used across the crate.
pub type AnimResult<T> = Result<T, AnimError>;

/// Top-level error taxonomy used by engine APIs.
#[derive(thiserror::Error, Debug)]
pub enum AnimError {
    /// Unreadable or corrupt raster source, or a missing expected layer.
    #[error("data source error: {0}")]
    DataSource(String),

    /// Sources that cannot be reconciled onto one reference grid.
    #[error("grid mismatch: {0}")]
    GridMismatch(String),

    /// Value population that cannot produce a meaningful legend.
    #[error("classification error: {0}")]
    Classification(String),

    /// Content bound to a slot the layout does not define.
    #[error("layout error: {0}")]
    Layout(String),

    /// Persisted cache entry failed validation. Recovered inside the cache.
    #[error("cache corruption: {0}")]
    CacheCorruption(String),

    /// Invalid user-provided configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// Errors while rasterizing, composing or encoding frames.
    #[error("render error: {0}")]
    Render(String),

    /// One year's frame failed. Carries the year for run reports.
    #[error("frame for year {year} failed: {source}")]
    Frame {
        year: Year,
        #[source]
        source: Box<AnimError>,
    },

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AnimError {
    /// Build a [`AnimError::DataSource`] value.
    pub fn data_source(msg: impl Into<String>) -> Self {
        Self::DataSource(msg.into())
    }

    /// Build a [`AnimError::GridMismatch`] value.
    pub fn grid_mismatch(msg: impl Into<String>) -> Self {
        Self::GridMismatch(msg.into())
    }

    /// Build a [`AnimError::Classification`] value.
    pub fn classification(msg: impl Into<String>) -> Self {
        Self::Classification(msg.into())
    }

    /// Build a [`AnimError::Layout`] value.
    pub fn layout(msg: impl Into<String>) -> Self {
        Self::Layout(msg.into())
    }

    /// Build a [`AnimError::CacheCorruption`] value.
    pub fn cache_corruption(msg: impl Into<String>) -> Self {
        Self::CacheCorruption(msg.into())
    }

    /// Build a [`AnimError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`AnimError::Render`] value.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Attach the failing year to an error raised while producing that year's frame.
    pub fn for_year(self, year: Year) -> Self {
        match self {
            Self::Frame { .. } => self,
            other => Self::Frame {
                year,
                source: Box::new(other),
            },
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
