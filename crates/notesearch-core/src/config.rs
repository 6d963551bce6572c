use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::chunker::ChunkingConfig;
use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    /// The fully typed, validated view of the merged configuration.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub chunking: ChunkingConfig,
    pub search: SearchSettings,
    pub embedding: EmbeddingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub notes_dir: String,
    pub index_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_k: usize,
    pub max_k: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_dir: String,
    pub dim: usize,
    pub max_len: usize,
    pub batch_size: usize,
    pub use_fake: bool,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { notes_dir: "notes".to_string(), index_dir: "data".to_string() }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { default_k: 5, max_k: 20 }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model_dir: "models/all-MiniLM-L6-v2".to_string(),
            dim: 384,
            max_len: 256,
            batch_size: 32,
            use_fake: false,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));
        if self.chunking.max_chars == 0 {
            return invalid("chunking.max_chars must be > 0".to_string());
        }
        if self.chunking.overlap >= self.chunking.max_chars {
            return invalid(format!(
                "chunking.overlap ({}) must be smaller than chunking.max_chars ({})",
                self.chunking.overlap, self.chunking.max_chars
            ));
        }
        if self.search.default_k == 0 || self.search.default_k > self.search.max_k {
            return invalid(format!(
                "search.default_k ({}) must be within 1..={}",
                self.search.default_k, self.search.max_k
            ));
        }
        if self.embedding.dim == 0 {
            return invalid("embedding.dim must be > 0".to_string());
        }
        if self.embedding.batch_size == 0 {
            return invalid("embedding.batch_size must be > 0".to_string());
        }
        Ok(())
    }
}

impl DataSettings {
    pub fn notes_dir(&self) -> PathBuf { expand_path(&self.notes_dir) }
    pub fn index_dir(&self) -> PathBuf { expand_path(&self.index_dir) }
}

impl EmbeddingSettings {
    pub fn model_dir(&self) -> PathBuf { expand_path(&self.model_dir) }
}

/// Expands `~` and `$VAR` / `${VAR}`. When a variable is unset only the tilde
/// is expanded and the rest is kept as written. No canonicalization.
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let raw = input.as_ref();
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).into_owned()),
    }
}
