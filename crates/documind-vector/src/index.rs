//! In-memory vector index with exact cosine search.

use serde::{Deserialize, Serialize};

use documind_core::traits::Embedder;
use documind_core::types::{Chunk, ScoredChunk};
use documind_core::{Error, Result};

/// The embedding parameters an index was built with. Queries must match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub model_id: String,
    pub dim: usize,
    pub normalized: bool,
}

impl IndexSpec {
    pub fn of(embedder: &dyn Embedder) -> Self {
        Self { model_id: embedder.model_id().to_string(), dim: embedder.dim(), normalized: embedder.normalized() }
    }
}

#[derive(Debug, Clone)]
struct IndexEntry {
    text: String,
    vector: Vec<f32>,
    norm: f32,
}

/// (vector, chunk text) pairs in insertion order.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    spec: IndexSpec,
    entries: Vec<IndexEntry>,
    generation: u64,
}

impl VectorIndex {
    pub fn build(spec: IndexSpec, texts: Vec<String>, embeddings: Vec<Vec<f32>>) -> Result<Self> {
        if texts.len() != embeddings.len() {
            return Err(Error::Embedding(format!(
                "{} chunks but {} embeddings",
                texts.len(),
                embeddings.len()
            )));
        }
        let mut entries = Vec::with_capacity(texts.len());
        for (i, (text, vector)) in texts.into_iter().zip(embeddings).enumerate() {
            if vector.len() != spec.dim {
                return Err(Error::Embedding(format!(
                    "embedding {} has dimension {}, expected {}",
                    i,
                    vector.len(),
                    spec.dim
                )));
            }
            if vector.iter().any(|x| !x.is_finite()) {
                return Err(Error::Embedding(format!("embedding {} contains non-finite values", i)));
            }
            let norm = l2_norm(&vector);
            entries.push(IndexEntry { text, vector, norm });
        }
        Ok(Self { spec, entries, generation: 0 })
    }

    pub fn from_chunks(spec: IndexSpec, chunks: &[Chunk], embeddings: Vec<Vec<f32>>) -> Result<Self> {
        Self::build(spec, chunks.iter().map(|c| c.text.clone()).collect(), embeddings)
    }

    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Generation this index was saved as or loaded from; 0 if never persisted.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.entries.iter().map(|e| (e.text.as_str(), e.vector.as_slice()))
    }

    /// The `k` entries most similar to `query`, best first. Equal scores keep
    /// insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if query.len() != self.spec.dim {
            return Err(Error::InvalidInput(format!(
                "query vector has dimension {}, index expects {}",
                query.len(),
                self.spec.dim
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let q_norm = l2_norm(query);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine(query, q_norm, &e.vector, e.norm)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk { position: i, text: self.entries[i].text.clone(), score })
            .collect())
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Zero vectors have no direction; they score 0 against everything.
fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let score = dot / (a_norm * b_norm);
    if score.is_nan() { f32::NEG_INFINITY } else { score }
}
