use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info, warn};

use documind_core::config::DeviceChoice;
use documind_core::traits::Embedder;
use documind_core::{Error, Result as CoreResult};

use crate::device::select_device;
use crate::pool::{l2_normalize, masked_mean};
use crate::tokenize::tokenize_on_device;

pub const MINILM_DIM: usize = 384;
const DEFAULT_MODEL_DIR: &str = "models/all-MiniLM-L6-v2";

struct LoadedModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

/// Sentence-transformers MiniLM encoder running on candle.
///
/// Weights are loaded on first use and kept for the life of the process. A
/// failed load leaves nothing cached, so the next call tries again.
pub struct MiniLmEmbedder {
    model_id: String,
    model_dir: Option<PathBuf>,
    normalize: bool,
    max_tokens: usize,
    device: DeviceChoice,
    state: Mutex<Option<Arc<LoadedModel>>>,
}

impl MiniLmEmbedder {
    pub fn new(model_id: impl Into<String>, model_dir: Option<PathBuf>, normalize: bool, max_tokens: usize) -> Self {
        Self {
            model_id: model_id.into(),
            model_dir,
            normalize,
            max_tokens,
            device: DeviceChoice::Auto,
            state: Mutex::new(None),
        }
    }

    pub fn with_device(mut self, device: DeviceChoice) -> Self {
        self.device = device;
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    fn loaded(&self) -> CoreResult<Arc<LoadedModel>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::EmbeddingModelUnavailable("model state lock poisoned".into()))?;
        if let Some(model) = state.as_ref() {
            return Ok(Arc::clone(model));
        }
        let model_dir = resolve_model_dir(self.model_dir.as_deref())
            .map_err(|e| Error::EmbeddingModelUnavailable(e.to_string()))?;
        let model = Arc::new(
            load_model(&model_dir, self.max_tokens, self.device)
                .map_err(|e| Error::EmbeddingModelUnavailable(format!("{:#}", e)))?,
        );
        *state = Some(Arc::clone(&model));
        Ok(model)
    }

    fn embed_one(&self, loaded: &LoadedModel, text: &str) -> Result<Vec<f32>> {
        let (input_ids, attention_mask) = tokenize_on_device(&loaded.tokenizer, text, self.max_tokens, &loaded.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = loaded.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let mut pooled = masked_mean(&hidden, &attention_mask)?;
        if self.normalize {
            pooled = l2_normalize(&pooled)?;
        }
        let v: Vec<f32> = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        if v.len() != MINILM_DIM {
            return Err(anyhow!("expected {} dimensions, model produced {}", MINILM_DIM, v.len()));
        }
        Ok(v)
    }
}

impl Embedder for MiniLmEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dim(&self) -> usize {
        MINILM_DIM
    }

    fn normalized(&self) -> bool {
        self.normalize
    }

    fn load(&self) -> CoreResult<()> {
        self.loaded().map(|_| ())
    }

    fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        let loaded = self.loaded()?;
        let start = Instant::now();
        // One text per forward pass keeps results independent of batch composition.
        let out = texts
            .iter()
            .map(|t| self.embed_one(&loaded, t))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| Error::Embedding(format!("{:#}", e)))?;
        debug!(count = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "embedded batch");
        Ok(out)
    }
}

fn load_model(model_dir: &Path, max_tokens: usize, choice: DeviceChoice) -> Result<LoadedModel> {
    let start = Instant::now();
    let device = select_device(choice)?;
    info!(dir = %model_dir.display(), "loading MiniLM embedding model");

    let tokenizer_path = model_dir.join("tokenizer.json");
    let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
    tokenizer
        .with_truncation(Some(TruncationParams { max_length: max_tokens, ..Default::default() }))
        .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;
    tokenizer.with_padding(None);

    let config_path = model_dir.join("config.json");
    let raw_config = std::fs::read_to_string(&config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    let hidden_size = serde_json::from_str::<serde_json::Value>(&raw_config)?
        .get("hidden_size")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| anyhow!("config.json has no hidden_size"))?;
    if hidden_size as usize != MINILM_DIM {
        return Err(anyhow!("model hidden size {} does not match expected {}", hidden_size, MINILM_DIM));
    }
    let config: BertConfig = serde_json::from_str(&raw_config)?;

    let safetensors = model_dir.join("model.safetensors");
    let weights: HashMap<String, Tensor> = if safetensors.exists() {
        candle_core::safetensors::load(&safetensors, &device)?
    } else {
        let pth = model_dir.join("pytorch_model.bin");
        candle_core::pickle::read_all(&pth)
            .with_context(|| format!("reading weights from {}", pth.display()))?
            .into_iter()
            .collect()
    };
    let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
    let model = BertModel::load(vb, &config)?;
    info!(elapsed_ms = start.elapsed().as_millis() as u64, "MiniLM model loaded");
    Ok(LoadedModel { model, tokenizer, device })
}

fn resolve_model_dir(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = configured {
        if p.exists() { return Ok(p.to_path_buf()); }
        warn!(dir = %p.display(), "configured model dir does not exist");
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() { debug!(var, dir = %p.display(), "using model dir from env"); return Ok(p); }
        }
    }
    for candidate in [DEFAULT_MODEL_DIR.to_string(), format!("../{}", DEFAULT_MODEL_DIR)] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Ok(p); }
    }
    Err(anyhow!("Could not locate the all-MiniLM-L6-v2 model directory (set embedding.model_dir or APP_MODEL_DIR)"))
}
