use std::path::{Path, PathBuf};

use anyhow::Context;
use sha2::Digest as _;

use crate::{
    cache::key::{CacheKey, Fingerprint},
    foundation::error::{AnimError, AnimResult},
};

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
struct EntryMeta {
    key: String,
    component: String,
    inputs: String,
    sha256: String,
    len: u64,
}

/// On-disk store of cache entries: `<dir>/<stem>.json` metadata next to `<dir>/<stem>.bin`.
///
/// Entries are written through a temporary file and renamed into place, so readers only
/// ever observe complete files.
#[derive(Clone, Debug)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub fn open(dir: impl Into<PathBuf>) -> AnimResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create cache dir '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn paths(&self, key: &CacheKey) -> (PathBuf, PathBuf) {
        let stem = key.file_stem();
        (
            self.dir.join(format!("{stem}.json")),
            self.dir.join(format!("{stem}.bin")),
        )
    }

    /// Payload for `key` if present and valid for `inputs`.
    ///
    /// `Ok(None)` means no entry exists; a `CacheCorruption` error means an entry exists but
    /// must be discarded.
    pub fn load(&self, key: &CacheKey, inputs: Fingerprint) -> AnimResult<Option<Vec<u8>>> {
        let (meta_path, bin_path) = self.paths(key);
        if !meta_path.exists() {
            return Ok(None);
        }
        let meta_text = std::fs::read_to_string(&meta_path)
            .with_context(|| format!("read cache meta '{}'", meta_path.display()))?;
        let meta: EntryMeta = serde_json::from_str(&meta_text).map_err(|e| {
            AnimError::cache_corruption(format!("bad metadata '{}': {e}", meta_path.display()))
        })?;
        if meta.key != key.to_string() {
            return Err(AnimError::cache_corruption(format!(
                "entry '{}' belongs to key {}",
                meta_path.display(),
                meta.key
            )));
        }
        if meta.inputs != inputs.to_hex() {
            return Err(AnimError::cache_corruption(format!(
                "stale entry for {key}: inputs changed"
            )));
        }
        let bytes = std::fs::read(&bin_path).map_err(|e| {
            AnimError::cache_corruption(format!("missing payload '{}': {e}", bin_path.display()))
        })?;
        if bytes.len() as u64 != meta.len || sha256_hex(&bytes) != meta.sha256 {
            return Err(AnimError::cache_corruption(format!(
                "payload digest mismatch for {key}"
            )));
        }
        Ok(Some(bytes))
    }

    pub fn store(&self, key: &CacheKey, inputs: Fingerprint, bytes: &[u8]) -> AnimResult<()> {
        let (meta_path, bin_path) = self.paths(key);
        let meta = EntryMeta {
            key: key.to_string(),
            component: key.component().to_string(),
            inputs: inputs.to_hex(),
            sha256: sha256_hex(bytes),
            len: bytes.len() as u64,
        };
        let meta_json = serde_json::to_vec_pretty(&meta).context("serialize cache meta")?;
        // Payload first: a meta file never points at a missing payload.
        write_atomic(&bin_path, bytes)?;
        write_atomic(&meta_path, &meta_json)?;
        Ok(())
    }

    /// Remove one entry, ignoring missing files.
    pub fn remove(&self, key: &CacheKey) {
        let (meta_path, bin_path) = self.paths(key);
        let _ = std::fs::remove_file(meta_path);
        let _ = std::fs::remove_file(bin_path);
    }

    /// Remove every entry in the store.
    pub fn clear(&self) -> AnimResult<()> {
        let rd = std::fs::read_dir(&self.dir)
            .with_context(|| format!("read cache dir '{}'", self.dir.display()))?;
        for entry in rd.flatten() {
            let path = entry.path();
            let is_entry = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "json" || e == "bin" || e == "tmp");
            if is_entry && path.is_file() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("remove cache file '{}'", path.display()))?;
            }
        }
        tracing::info!(dir = %self.dir.display(), "cleared disk cache");
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> AnimResult<()> {
    let tmp = path.with_extension(format!(
        "{}.{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("dat"),
        std::process::id()
    ));
    std::fs::write(&tmp, bytes).with_context(|| format!("write '{}'", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| {
        let _ = std::fs::remove_file(&tmp);
        format!("rename into '{}'", path.display())
    })?;
    Ok(())
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let digest = sha2::Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/cache/disk.rs"]
mod tests;
