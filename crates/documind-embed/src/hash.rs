use std::hash::{Hash, Hasher};

use twox_hash::XxHash64;

use documind_core::traits::Embedder;
use documind_core::Result;

/// Deterministic bag-of-words embedder for tests and development.
///
/// Each lowercased alphanumeric token is hashed into one of `dim` buckets with
/// a hash-derived weight, so texts sharing words score as similar.
pub struct HashEmbedder {
    id: String,
    dim: usize,
    normalize: bool,
}

impl HashEmbedder {
    pub fn new(dim: usize, normalize: bool) -> Self {
        Self { id: format!("hash:xxh64:d{}", dim), dim, normalize }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let weight = 0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += weight;
        }
        if self.normalize {
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for x in &mut v { *x /= norm; }
            }
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn normalized(&self) -> bool { self.normalize }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
