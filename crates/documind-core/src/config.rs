//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge defaults + `config.toml` + `config.<env>.toml` +
//! `APP_*` env vars (nested keys split on `__`, e.g. `APP_LLM__TIMEOUT_SECS`).
//! Paths expand `~` and `${VAR}`.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::{Error, Result};

pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_CHAT_MODEL: &str = "HuggingFaceH4/zephyr-7b-beta";
pub const DEFAULT_CHAT_ENDPOINT: &str = "https://router.huggingface.co/v1/chat/completions";
pub const DEFAULT_TOKEN_ENV: &str = "HUGGINGFACEHUB_API_TOKEN";

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
        config.settings()?.validate()?;
        Ok(config)
    }

    /// Wrap an already assembled figment; defaults are layered underneath.
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment: Figment::from(Serialized::defaults(Settings::default())).merge(figment) }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    pub fn settings(&self) -> Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub index: IndexSettings,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub llm: LlmSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.retrieval.top_k == 0 {
            return Err(Error::InvalidConfig("retrieval.top_k must be at least 1".into()));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(Error::InvalidConfig(format!("llm.temperature out of range: {}", self.llm.temperature)));
        }
        if self.llm.top_p <= 0.0 || self.llm.top_p > 1.0 {
            return Err(Error::InvalidConfig(format!("llm.top_p out of range: {}", self.llm.top_p)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Directory holding the persisted index (manifest plus generations).
    pub dir: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { dir: "data/index".to_string() }
    }
}

impl IndexSettings {
    pub fn path(&self) -> PathBuf {
        expand_path(&self.dir)
    }
}

/// Chunk sizing, both values counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_len: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_len: 1000, overlap: 200 }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_len == 0 {
            return Err(Error::InvalidConfig("chunking.max_len must be positive".into()));
        }
        if self.overlap >= self.max_len {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap ({}) must be smaller than chunking.max_len ({})",
                self.overlap, self.max_len
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_id: String,
    pub device: DeviceChoice,
    pub model_dir: Option<String>,
    /// L2-normalize vectors. Recorded in the index; must match at query time.
    pub normalize: bool,
    pub max_tokens: usize,
    pub use_fake: bool,
    pub load_timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_EMBEDDING_MODEL.to_string(),
            device: DeviceChoice::Auto,
            model_dir: None,
            normalize: false,
            max_tokens: 256,
            use_fake: false,
            load_timeout_secs: 120,
        }
    }
}

/// Where the embedding model runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceChoice {
    /// Metal when built with it and a device is present, otherwise CPU.
    #[default]
    Auto,
    Cpu,
    /// Metal or a load error; never silently CPU.
    Metal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub separator: String,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 3, separator: " ".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub endpoint: String,
    pub model_id: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Name of the environment variable holding the API token.
    pub token_env: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CHAT_ENDPOINT.to_string(),
            model_id: DEFAULT_CHAT_MODEL.to_string(),
            max_tokens: 512,
            temperature: 0.3,
            top_p: 0.9,
            timeout_secs: 60,
            max_retries: 2,
            token_env: DEFAULT_TOKEN_ENV.to_string(),
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
