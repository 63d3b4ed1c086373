//! End-to-end orchestration: `ingest` builds and persists an index from
//! uploaded documents, `answer` retrieves context and asks the language model.

pub mod retriever;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use documind_core::chunk::Chunker;
use documind_core::config::Settings;
use documind_core::extract::Extractor;
use documind_core::traits::Embedder;
use documind_core::types::{AnswerResult, Document, IngestReport};
use documind_core::{Error, Result};
use documind_llm::{ChatModel, GenerationParams, HfInferenceClient, Synthesizer};
use documind_vector::{IndexSpec, IndexStore, Manifest, VectorIndex};

pub use retriever::Retriever;

/// What is currently persisted at the index location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStatus {
    pub generation: u64,
    pub entries: usize,
    pub model_id: String,
    pub dim: usize,
    pub created_at: DateTime<Utc>,
}

impl From<Manifest> for IndexStatus {
    fn from(m: Manifest) -> Self {
        Self { generation: m.generation, entries: m.count, model_id: m.model_id, dim: m.dim, created_at: m.created_at }
    }
}

pub struct Pipeline {
    store: IndexStore,
    extractor: Extractor,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    load_timeout: Duration,
    retriever: Retriever,
    synthesizer: Synthesizer,
    cache: RwLock<Option<Arc<VectorIndex>>>,
}

impl Pipeline {
    pub fn new(settings: &Settings, embedder: Arc<dyn Embedder>, chat: Arc<dyn ChatModel>) -> Result<Self> {
        settings.validate()?;
        let retriever = Retriever::new(
            Arc::clone(&embedder),
            settings.retrieval.top_k,
            settings.retrieval.separator.clone(),
        );
        let synthesizer = Synthesizer::new(
            chat,
            GenerationParams::from(&settings.llm),
            Duration::from_secs(settings.llm.timeout_secs.max(1)),
        );
        Ok(Self {
            store: IndexStore::new(settings.index.path()),
            extractor: Extractor::new(),
            chunker: Chunker::new(settings.chunking)?,
            embedder,
            load_timeout: Duration::from_secs(settings.embedding.load_timeout_secs.max(1)),
            retriever,
            synthesizer,
            cache: RwLock::new(None),
        })
    }

    /// Wire up the configured embedder and the Hugging Face chat client.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let embedder = documind_embed::default_embedder(&settings.embedding);
        let chat = HfInferenceClient::from_settings(&settings.llm).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Self::new(settings, embedder, Arc::new(chat))
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Replace the persisted index with one built from `documents`.
    ///
    /// On any failure the previously saved index stays live.
    pub async fn ingest(&self, documents: Vec<Document>) -> Result<IngestReport> {
        if documents.is_empty() {
            return Err(Error::NoDocuments);
        }
        let started = Instant::now();
        let guard = self.store.lock().await?;
        let document_count = documents.len();

        let extractor = self.extractor;
        let extracted = tokio::task::spawn_blocking(move || extractor.extract(&documents))
            .await
            .map_err(|e| Error::InvalidInput(format!("extraction task failed: {}", e)))?;
        if extracted.is_blank() {
            warn!(documents = document_count, pages = extracted.pages, "no text extracted");
            return Err(Error::ExtractionEmpty);
        }
        info!(
            documents = document_count,
            pages = extracted.pages,
            empty_pages = extracted.empty_pages,
            "text extracted"
        );

        let chunks = self.chunker.split(&extracted.text);
        info!(chunks = chunks.len(), "text chunked");

        self.ensure_embedder_loaded().await?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embedder = Arc::clone(&self.embedder);
        let embeddings = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
            .await
            .map_err(|e| Error::Embedding(format!("embedding task failed: {}", e)))??;

        let mut index = VectorIndex::from_chunks(IndexSpec::of(self.embedder.as_ref()), &chunks, embeddings)?;
        let generation = self.store.save(&mut index, &guard).await?;
        *self.cache.write().await = Some(Arc::new(index));

        let report = IngestReport {
            documents: document_count,
            pages: extracted.pages,
            empty_pages: extracted.empty_pages,
            characters: extracted.text.chars().count(),
            chunks: chunks.len(),
            generation,
        };
        info!(generation, chunks = report.chunks, elapsed_ms = started.elapsed().as_millis() as u64, "ingestion complete");
        Ok(report)
    }

    /// Answer `question` from the indexed documents. Never fails; every
    /// outcome is an [`AnswerResult`].
    pub async fn answer(&self, question: &str) -> AnswerResult {
        let index = match self.current_index().await {
            Ok(index) => index,
            Err(e) if e.needs_ingest() => {
                if matches!(e, Error::IndexCorrupt { .. }) {
                    warn!(error = %e, "index unusable, documents must be ingested again");
                }
                return AnswerResult::NotIndexedYet;
            }
            Err(e) => return AnswerResult::Failed { reason: e.to_string() },
        };

        let question = question.trim();
        if question.is_empty() {
            return AnswerResult::Failed { reason: Error::InvalidInput("the question is empty".into()).to_string() };
        }

        if let Err(e) = self.ensure_embedder_loaded().await {
            return AnswerResult::Failed { reason: e.to_string() };
        }
        let context = match self.retriever.retrieve(&index, question).await {
            Ok(context) => context,
            Err(e) => return AnswerResult::Failed { reason: e.to_string() },
        };
        debug!(passages = context.passages.len(), chars = context.text.len(), "context assembled");

        match self.synthesizer.synthesize(&context.text, question).await {
            Ok(answer) => AnswerResult::Answered { answer, context },
            Err(Error::SynthesisFailure(reason)) => AnswerResult::SynthesisFailed { reason, context },
            Err(e) => AnswerResult::SynthesisFailed { reason: e.to_string(), context },
        }
    }

    /// The persisted index, if `answer` could use it.
    ///
    /// `None` when there is no manifest, the manifest is unreadable, its data
    /// directory is gone, or it was built with a different embedder. The
    /// table itself is not opened.
    pub fn status(&self) -> Option<IndexStatus> {
        let manifest = match self.store.manifest() {
            Ok(m) => m,
            Err(Error::IndexNotFound(_)) => return None,
            Err(e) => {
                warn!(error = %e, "index manifest unreadable");
                return None;
            }
        };
        let location = self.store.location();
        if !location.join(&manifest.data_dir).is_dir() {
            warn!(generation = manifest.generation, data_dir = %manifest.data_dir, "index data missing");
            return None;
        }
        if let Err(e) = manifest.check_compatible(&IndexSpec::of(self.embedder.as_ref()), location) {
            warn!(error = %e, "index unusable");
            return None;
        }
        Some(manifest.into())
    }

    /// Cached index, reloaded when the manifest names a newer generation.
    async fn current_index(&self) -> Result<Arc<VectorIndex>> {
        let live = self.store.manifest()?.generation;
        if let Some(index) = self.cache.read().await.as_ref() {
            if index.generation() == live {
                return Ok(Arc::clone(index));
            }
        }
        let mut slot = self.cache.write().await;
        if let Some(index) = slot.as_ref() {
            if index.generation() == live {
                return Ok(Arc::clone(index));
            }
        }
        let index = Arc::new(self.store.load(&IndexSpec::of(self.embedder.as_ref())).await?);
        info!(generation = index.generation(), entries = index.len(), "index loaded into cache");
        *slot = Some(Arc::clone(&index));
        Ok(index)
    }

    async fn ensure_embedder_loaded(&self) -> Result<()> {
        let embedder = Arc::clone(&self.embedder);
        let load = tokio::task::spawn_blocking(move || embedder.load());
        match tokio::time::timeout(self.load_timeout, load).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::EmbeddingModelUnavailable(format!("model load task failed: {}", e))),
            Err(_) => Err(Error::EmbeddingModelUnavailable(format!(
                "model did not load within {}s",
                self.load_timeout.as_secs()
            ))),
        }
    }
}
