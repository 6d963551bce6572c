//! Exact vector index with an on-disk pair and lazy, load-once startup.
//!
//! [`VectorIndex`] holds the current generation behind an `Arc`. A build
//! persists first and then swaps the `Arc`, so searches see either the old
//! or the new generation, never a mix.

pub mod flat;
pub mod store;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use notesearch_core::types::{ChunkMeta, ScoredChunk};
use notesearch_core::{Error, Result};

pub use flat::FlatIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub count: usize,
    pub dim: usize,
}

pub struct VectorIndex {
    dir: PathBuf,
    current: RwLock<Option<Arc<FlatIndex>>>,
    // Serializes builds and the first lazy load.
    write_lock: Mutex<()>,
}

impl VectorIndex {
    /// Does not touch the filesystem; the persisted pair is read on first use.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), current: RwLock::new(None), write_lock: Mutex::new(()) }
    }

    pub fn dir(&self) -> &Path { &self.dir }

    pub fn is_loaded(&self) -> bool { self.current.read().is_some() }

    /// Replaces the whole index. On a storage failure the resident generation
    /// is left as it was.
    pub fn build(&self, vectors: Vec<Vec<f32>>, metas: Vec<ChunkMeta>) -> Result<()> {
        let index = FlatIndex::build(vectors, metas)?;
        let _guard = self.write_lock.lock();
        store::save(&self.dir, &index)?;
        info!(count = index.len(), dim = index.dim(), "index rebuilt");
        *self.current.write() = Some(Arc::new(index));
        Ok(())
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Err(Error::InvalidInput("k must be >= 1".to_string()));
        }
        let index = self.resident()?;
        debug!(k, entries = index.len(), "searching index");
        index.search(query, k)
    }

    /// Size of the resident index, loading it from disk if needed. `None` when
    /// no usable index exists.
    pub fn stats(&self) -> Result<Option<IndexStats>> {
        match self.resident() {
            Ok(index) => Ok(Some(IndexStats { count: index.len(), dim: index.dim() })),
            Err(Error::IndexNotBuilt) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn resident(&self) -> Result<Arc<FlatIndex>> {
        if let Some(index) = self.current.read().as_ref() {
            return Ok(Arc::clone(index));
        }
        let _guard = self.write_lock.lock();
        // Another caller may have loaded or built while we waited.
        if let Some(index) = self.current.read().as_ref() {
            return Ok(Arc::clone(index));
        }
        let loaded = Arc::new(store::load(&self.dir)?.ok_or(Error::IndexNotBuilt)?);
        *self.current.write() = Some(Arc::clone(&loaded));
        Ok(loaded)
    }
}
