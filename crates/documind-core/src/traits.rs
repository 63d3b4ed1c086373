use crate::error::Result;

/// Maps text to fixed-dimension vectors.
///
/// Implementations must be deterministic: the same text always yields the same
/// vector, whatever else is in the batch.
pub trait Embedder: Send + Sync {
    /// Stable identifier recorded in the index (e.g. the model name).
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    /// Whether returned vectors are L2-normalized.
    fn normalized(&self) -> bool;
    /// Load model weights ahead of the first `embed_batch`. Cheap once loaded.
    fn load(&self) -> Result<()> {
        Ok(())
    }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
