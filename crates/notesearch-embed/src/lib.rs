//! Vectorizers for notesearch.
//!
//! `MiniLmEmbedder` runs sentence-transformers/all-MiniLM-L6-v2 locally with
//! candle. `FakeEmbedder` is a deterministic token-hash embedder for tests and
//! offline development (`APP_USE_FAKE_EMBEDDINGS=1`). `LazyEmbedder` defers
//! model loading to the first embedding call and does it exactly once.

pub mod device;
pub mod pool;
pub mod tokenize;

use anyhow::{Result, anyhow, ensure};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{info, warn};

use notesearch_core::config::EmbeddingSettings;
pub use notesearch_core::traits::Embedder;

pub use device::select_device;
pub use pool::masked_mean_l2;
pub use tokenize::tokenize_on_device;

pub struct MiniLmEmbedder { model: BertModel, tokenizer: Tokenizer, device: Device, dim: usize, max_len: usize }

impl MiniLmEmbedder {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        info!(dir = %model_dir.display(), "loading MiniLM model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        // Truncation and padding are applied by `tokenize_on_device`.
        tokenizer.with_padding(None);
        tokenizer.with_truncation(None).map_err(|e| anyhow!("Failed to reset truncation: {}", e))?;
        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let vb = load_weights(model_dir, &device)?;
        let model = BertModel::load(vb, &config)?;
        let dim = config.hidden_size;
        let max_len = max_len.min(config.max_position_embeddings);
        info!(dim, max_len, "MiniLM model loaded");
        Ok(Self { model, tokenizer, device, dim, max_len })
    }

    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden_states = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden_states, &attention_mask)?;
        let emb = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1::<f32>()?;
        ensure!(emb.len() == self.dim, "model produced {} dims, expected {}", emb.len(), self.dim);
        if start.elapsed().as_millis() > 100 { warn!(elapsed_ms = start.elapsed().as_millis() as u64, "slow embedding"); }
        Ok(emb)
    }
}

impl Embedder for MiniLmEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> { texts.iter().map(|t| self.embed_text(t)).collect() }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        // SAFETY: the weights file is not modified while the model is loaded.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device)? };
        return Ok(vb);
    }
    let weights_path = model_dir.join("pytorch_model.bin");
    let weights = candle_core::pickle::read_all(&weights_path)?;
    let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
    Ok(VarBuilder::from_tensors(weights_map, DType::F32, device))
}

/// Deterministic bag-of-tokens embedder. Same text, same vector; shared tokens
/// pull vectors together, so ranking in tests is meaningful. A zero `dim`
/// yields empty vectors.
pub struct FakeEmbedder { dim: usize }

impl FakeEmbedder { pub fn new(dim: usize) -> Self { Self { dim } } }

impl FakeEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher}; use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        if self.dim == 0 { return v; }
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            let mut hasher = XxHash64::with_seed(0); token.hash(&mut hasher); let h = hasher.finish();
            let idx = (h as usize) % self.dim; let val = 0.5 + (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-6 { v[0] = 1.0; return v; }
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> { Ok(texts.iter().map(|t| self.embed_text(t)).collect()) }
}

type EmbedderInit = Box<dyn Fn() -> Result<Box<dyn Embedder>> + Send + Sync>;

/// Wraps an embedder whose construction is expensive. The first call to
/// [`LazyEmbedder::get`] (or any embedding call) builds it; concurrent first
/// callers block until that single initialization finishes.
pub struct LazyEmbedder { dim: usize, max_len: usize, init: EmbedderInit, cell: OnceCell<Box<dyn Embedder>> }

impl LazyEmbedder {
    pub fn new<F>(dim: usize, max_len: usize, init: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Embedder>> + Send + Sync + 'static,
    {
        Self { dim, max_len, init: Box::new(init), cell: OnceCell::new() }
    }

    pub fn get(&self) -> Result<&dyn Embedder> {
        let inner = self.cell.get_or_try_init(|| {
            let embedder = (self.init)()?;
            ensure!(embedder.dim() == self.dim, "embedder produces {} dims but {} are configured", embedder.dim(), self.dim);
            Ok(embedder)
        })?;
        Ok(inner.as_ref())
    }

    pub fn is_initialized(&self) -> bool { self.cell.get().is_some() }
}

impl Embedder for LazyEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.cell.get().map_or(self.max_len, |e| e.max_len()) }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> { self.get()?.embed_batch(texts) }
}

pub fn use_fake_from_env() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// The embedder described by `settings`, not yet loaded.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> LazyEmbedder {
    let dim = settings.dim;
    let max_len = settings.max_len;
    if settings.use_fake || use_fake_from_env() {
        return LazyEmbedder::new(dim, max_len, move || {
            info!(dim, "using FakeEmbedder");
            Ok(Box::new(FakeEmbedder::new(dim)) as Box<dyn Embedder>)
        });
    }
    let configured = settings.model_dir();
    LazyEmbedder::new(dim, max_len, move || {
        let dir = resolve_model_dir(&configured)?;
        Ok(Box::new(MiniLmEmbedder::load(&dir, max_len)?) as Box<dyn Embedder>)
    })
}

fn resolve_model_dir(configured: &Path) -> Result<PathBuf> {
    if configured.exists() { return Ok(configured.to_path_buf()); }
    if let Ok(dir) = std::env::var("MODEL_DIR") { let p = PathBuf::from(&dir); if p.exists() { info!(dir = %p.display(), "using MODEL_DIR"); return Ok(p); } }
    Err(anyhow!("Could not locate MiniLM model directory (looked in {})", configured.display()))
}
