//! Run-scoped memoization of expensive steps, optionally persisted across runs.

/// File-backed entry store.
pub mod disk;
/// Deterministic cache keys and fingerprints.
pub mod key;
/// Single-flight in-memory memoization.
pub mod memo;

use std::{path::Path, sync::Arc};

use anyhow::Context;

use crate::{
    foundation::core::LayerYear,
    foundation::error::{AnimError, AnimResult},
    render::frame::FrameRGBA,
    render::svg::SvgRasterizer,
    spatial::grid::BoundingBox,
    spatial::layer::{Interpretation, Layer},
};

use self::{disk::DiskStore, memo::MemoCache};

/// Values that can be persisted by a [`DiskStore`].
pub trait CacheValue: Sized {
    fn encode(&self) -> AnimResult<Vec<u8>>;
    fn decode(bytes: &[u8]) -> AnimResult<Self>;
}

/// `[u32 header length][json header][raw payload]`
fn encode_with_header<H: serde::Serialize>(header: &H, payload: &[u8]) -> AnimResult<Vec<u8>> {
    let head = serde_json::to_vec(header).context("serialize cache header")?;
    let head_len = u32::try_from(head.len())
        .map_err(|_| AnimError::cache_corruption("cache header too large"))?;
    let mut out = Vec::with_capacity(4 + head.len() + payload.len());
    out.extend_from_slice(&head_len.to_le_bytes());
    out.extend_from_slice(&head);
    out.extend_from_slice(payload);
    Ok(out)
}

fn decode_with_header<H: serde::de::DeserializeOwned>(bytes: &[u8]) -> AnimResult<(H, &[u8])> {
    let Some((len, rest)) = bytes.split_first_chunk::<4>() else {
        return Err(AnimError::cache_corruption("truncated cache entry"));
    };
    let len = u32::from_le_bytes(*len) as usize;
    if rest.len() < len {
        return Err(AnimError::cache_corruption("truncated cache header"));
    }
    let (head, payload) = rest.split_at(len);
    let header = serde_json::from_slice(head)
        .map_err(|e| AnimError::cache_corruption(format!("bad cache header: {e}")))?;
    Ok((header, payload))
}

#[derive(serde::Serialize, serde::Deserialize)]
struct LayerHeader {
    year: LayerYear,
    grid: BoundingBox,
    nodata: f32,
    interpretation: Option<Interpretation>,
    source: String,
}

impl CacheValue for Layer {
    fn encode(&self) -> AnimResult<Vec<u8>> {
        let header = LayerHeader {
            year: self.year(),
            grid: self.grid().clone(),
            nodata: self.nodata(),
            interpretation: self.interpretation().cloned(),
            source: self.source().to_string(),
        };
        let mut payload = Vec::with_capacity(self.values().len() * 4);
        for v in self.values() {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        encode_with_header(&header, &payload)
    }

    fn decode(bytes: &[u8]) -> AnimResult<Self> {
        let (h, payload): (LayerHeader, _) = decode_with_header(bytes)?;
        if payload.len() % 4 != 0 {
            return Err(AnimError::cache_corruption("layer payload is not f32 aligned"));
        }
        let values = payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Layer::from_parts(h.year, h.grid, values, h.nodata, h.interpretation, &h.source)
            .map_err(|e| AnimError::cache_corruption(e.to_string()))
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct FrameHeader {
    width: u32,
    height: u32,
    scale_m: Option<f64>,
}

impl CacheValue for FrameRGBA {
    fn encode(&self) -> AnimResult<Vec<u8>> {
        let header = FrameHeader {
            width: self.width,
            height: self.height,
            scale_m: self.scale_m,
        };
        encode_with_header(&header, &self.data)
    }

    fn decode(bytes: &[u8]) -> AnimResult<Self> {
        let (h, payload): (FrameHeader, _) = decode_with_header(bytes)?;
        FrameRGBA::from_premul(h.width, h.height, payload.to_vec())
            .map(|f| f.with_scale(h.scale_m))
            .map_err(|e| AnimError::cache_corruption(e.to_string()))
    }
}

/// Per-kind caches for one run.
#[derive(Debug)]
pub struct RunCache {
    /// Reconciled layers.
    pub layers: MemoCache<Layer>,
    /// Colorized indicator panels, one per `(indicator, year)`.
    pub panels: MemoCache<FrameRGBA>,
    /// Rendered legend images.
    pub legends: MemoCache<FrameRGBA>,
    /// Composed frames. Persisted only; frames leave memory as soon as they are written.
    pub frames: MemoCache<FrameRGBA>,
    disk: Option<Arc<DiskStore>>,
}

impl RunCache {
    pub fn in_memory() -> Self {
        Self {
            layers: MemoCache::new("layers"),
            panels: MemoCache::new("panels"),
            legends: MemoCache::new("legends"),
            frames: MemoCache::new("frames").without_retention(),
            disk: None,
        }
    }

    /// Caches backed by a [`DiskStore`] in `dir`, so repeated builds reuse earlier work.
    pub fn with_disk(dir: &Path) -> AnimResult<Self> {
        let disk = Arc::new(DiskStore::open(dir)?);
        Ok(Self {
            layers: MemoCache::new("layers").with_disk(disk.clone()),
            panels: MemoCache::new("panels").with_disk(disk.clone()),
            legends: MemoCache::new("legends"),
            frames: MemoCache::new("frames")
                .with_disk(disk.clone())
                .without_retention(),
            disk: Some(disk),
        })
    }

    pub fn disk(&self) -> Option<&DiskStore> {
        self.disk.as_deref()
    }

    /// Drop every cached entry, in memory and on disk.
    pub fn clear(&self) -> AnimResult<()> {
        self.layers.clear();
        self.panels.clear();
        self.legends.clear();
        self.frames.clear();
        if let Some(disk) = &self.disk {
            disk.clear()?;
        }
        Ok(())
    }
}

impl Default for RunCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Everything a render step needs besides its own inputs. Passed explicitly; there is no
/// global state.
#[derive(Clone, Debug)]
pub struct RunContext {
    pub cache: Arc<RunCache>,
    pub svg: SvgRasterizer,
}

impl RunContext {
    pub fn new(cache: RunCache, svg: SvgRasterizer) -> Self {
        Self {
            cache: Arc::new(cache),
            svg,
        }
    }

    /// In-memory cache and system fonts.
    pub fn in_memory() -> Self {
        Self::new(RunCache::in_memory(), SvgRasterizer::new(None))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/value.rs"]
mod tests;
