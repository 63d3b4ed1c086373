use std::sync::Arc;

use tracing::debug;

use documind_core::traits::Embedder;
use documind_core::types::RetrievedContext;
use documind_core::{Error, Result};
use documind_vector::VectorIndex;

/// Embeds a question and collects the `top_k` closest chunks as context.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    separator: String,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, top_k: usize, separator: impl Into<String>) -> Self {
        Self { embedder, top_k, separator: separator.into() }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn retrieve(&self, index: &VectorIndex, question: &str) -> Result<RetrievedContext> {
        let query = embed_query(Arc::clone(&self.embedder), question.to_string()).await?;
        let hits = index.search(&query, self.top_k)?;
        debug!(
            hits = hits.len(),
            top_score = hits.first().map(|h| h.score),
            "retrieved passages"
        );
        Ok(RetrievedContext::new(hits, &self.separator))
    }
}

async fn embed_query(embedder: Arc<dyn Embedder>, question: String) -> Result<Vec<f32>> {
    tokio::task::spawn_blocking(move || embedder.embed_batch(&[question]))
        .await
        .map_err(|e| Error::Embedding(format!("embedding task failed: {}", e)))??
        .pop()
        .ok_or_else(|| Error::Embedding("embedder returned no vector for the question".into()))
}
