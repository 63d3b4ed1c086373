//! Text embedders: the MiniLM sentence encoder on candle, and a hashing
//! stand-in for tests. Both implement `documind_core::traits::Embedder`.

use std::sync::Arc;

use tracing::info;

use documind_core::config::{expand_path, EmbeddingSettings};
use documind_core::traits::Embedder;

pub mod device;
pub mod hash;
pub mod minilm;
pub mod pool;
pub mod tokenize;

pub use hash::HashEmbedder;
pub use minilm::{MiniLmEmbedder, MINILM_DIM};
pub use pool::{l2_normalize, masked_mean, masked_mean_l2};

/// Build the embedder described by `settings`. Does not load model weights.
///
/// `APP_USE_FAKE_EMBEDDINGS=1` forces the hashing embedder regardless of
/// configuration.
pub fn default_embedder(settings: &EmbeddingSettings) -> Arc<dyn Embedder> {
    let env_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if settings.use_fake || env_fake {
        info!("using HashEmbedder");
        return Arc::new(HashEmbedder::new(MINILM_DIM, settings.normalize));
    }
    Arc::new(MiniLmEmbedder::new(
        settings.model_id.clone(),
        settings.model_dir.as_deref().map(expand_path),
        settings.normalize,
        settings.max_tokens,
    )
    .with_device(settings.device))
}
