//! Request-layer operations over the chunker, the embedder and the vector
//! index: `index`, `search`, `health` and `status`.

pub mod retrieval;

use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use notesearch_core::chunker::Chunker;
use notesearch_core::config::Settings;
use notesearch_core::traits::Embedder;
use notesearch_core::types::ScoredChunk;
use notesearch_core::{Error, Result};
use notesearch_vector::VectorIndex;

pub use retrieval::{RetrievalService, embed_all};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRequest {
    #[serde(default)]
    pub folder: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexResponse {
    pub chunks_indexed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub score: f32,
    pub id: String,
    pub source: String,
    pub text: String,
}

impl From<ScoredChunk> for SearchResult {
    fn from(hit: ScoredChunk) -> Self {
        Self { score: hit.score, id: hit.meta.id, source: hit.meta.source, text: hit.meta.text }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub notes_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub built: bool,
    pub count: usize,
    pub dim: usize,
    pub index_dir: String,
}

pub struct NotesService {
    settings: Settings,
    chunker: Chunker,
    retrieval: RetrievalService,
}

impl NotesService {
    pub fn new(settings: Settings, embedder: Arc<dyn Embedder>) -> Self {
        let index = Arc::new(VectorIndex::open(settings.data.index_dir()));
        Self::with_index(settings, embedder, index)
    }

    pub fn with_index(settings: Settings, embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Self {
        let chunker = Chunker::new(settings.chunking.clone());
        Self { settings, chunker, retrieval: RetrievalService::new(embedder, index) }
    }

    pub fn settings(&self) -> &Settings { &self.settings }
    pub fn retrieval(&self) -> &RetrievalService { &self.retrieval }

    pub fn index(&self, req: IndexRequest) -> Result<IndexResponse> {
        self.index_with_progress(req, &ProgressBar::hidden())
    }

    /// Chunks the folder (the configured notes dir when `req.folder` is
    /// unset), embeds every chunk and rebuilds the index. Nothing is written
    /// when the folder yields no chunks.
    pub fn index_with_progress(&self, req: IndexRequest, progress: &ProgressBar) -> Result<IndexResponse> {
        let start = Instant::now();
        let folder = req.folder.unwrap_or_else(|| self.settings.data.notes_dir());
        let chunks = self.chunker.build_chunks(&folder);
        if chunks.is_empty() {
            info!(folder = %folder.display(), "no chunks produced; index left untouched");
            return Ok(IndexResponse { chunks_indexed: 0 });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        progress.set_length(texts.len() as u64);
        let embedded = embed_all(self.retrieval.embedder().as_ref(), &texts, self.settings.embedding.batch_size, progress);
        progress.finish_and_clear();
        let vectors = embedded?;

        let count = chunks.len();
        self.retrieval.index().build(vectors, chunks)?;
        info!(folder = %folder.display(), chunks = count, elapsed_ms = start.elapsed().as_millis() as u64, "indexed notes");
        Ok(IndexResponse { chunks_indexed: count })
    }

    pub fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
        let max_k = self.settings.search.max_k;
        let k = req.k.unwrap_or(self.settings.search.default_k);
        if k == 0 || k > max_k {
            return Err(Error::InvalidInput(format!("k must be within 1..={max_k}, got {k}")));
        }
        let hits = self.retrieval.query(&req.query, k)?;
        Ok(SearchResponse { results: hits.into_iter().map(SearchResult::from).collect() })
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse { ok: true, notes_dir: self.settings.data.notes_dir().display().to_string() }
    }

    pub fn status(&self) -> Result<StatusResponse> {
        let index = self.retrieval.index();
        let stats = index.stats()?;
        Ok(StatusResponse {
            built: stats.is_some(),
            count: stats.map_or(0, |s| s.count),
            dim: stats.map_or(0, |s| s.dim),
            index_dir: index.dir().display().to_string(),
        })
    }
}
