use anyhow::anyhow;
use indicatif::ProgressBar;
use std::sync::Arc;
use tracing::debug;

use notesearch_core::traits::Embedder;
use notesearch_core::types::ScoredChunk;
use notesearch_core::{Error, Result};
use notesearch_vector::VectorIndex;

/// Query text in, ranked chunks out.
pub struct RetrievalService {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
}

impl RetrievalService {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Self { Self { embedder, index } }

    pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }
    pub fn index(&self) -> &Arc<VectorIndex> { &self.index }

    pub fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query = embed_checked(self.embedder.as_ref(), &[text.to_string()])?
            .pop()
            .ok_or_else(|| Error::Embedding(anyhow!("no vector returned for query")))?;
        let hits = self.index.search(&query, k)?;
        debug!(k, hits = hits.len(), "query answered");
        Ok(hits)
    }
}

/// Embeds `texts` in batches of `batch_size`, advancing `progress` per batch.
pub fn embed_all(embedder: &dyn Embedder, texts: &[String], batch_size: usize, progress: &ProgressBar) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        out.extend(embed_checked(embedder, batch)?);
        progress.inc(batch.len() as u64);
    }
    Ok(out)
}

fn embed_checked(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let vectors = embedder.embed_batch(texts).map_err(Error::Embedding)?;
    if vectors.len() != texts.len() {
        return Err(Error::Embedding(anyhow!("embedder returned {} vectors for {} texts", vectors.len(), texts.len())));
    }
    let dim = embedder.dim();
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(Error::Embedding(anyhow!("embedder returned a {}-dim vector, expected {dim}", bad.len())));
    }
    Ok(vectors)
}
