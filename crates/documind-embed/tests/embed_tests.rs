use documind_core::config::EmbeddingSettings;
use documind_embed::{default_embedder, HashEmbedder, MINILM_DIM};

#[test]
fn fake_embedder_shapes_and_determinism() {
    let settings = EmbeddingSettings { use_fake: true, normalize: true, ..Default::default() };
    let embedder = default_embedder(&settings);
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), MINILM_DIM);
    assert_eq!(embedder.dim(), MINILM_DIM);
    assert!(embedder.normalized());

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    assert_eq!(v1, v2, "same input, bit-identical output");
}

#[test]
fn batch_composition_does_not_change_vectors() {
    let embedder = HashEmbedder::new(64, false);
    let alone = embedder.embed_text("the quick brown fox");
    let batch = documind_core::traits::Embedder::embed_batch(
        &embedder,
        &["lazy dog".to_string(), "the quick brown fox".to_string()],
    )
    .expect("batch");
    assert_eq!(alone, batch[1]);
}

#[test]
fn unnormalized_vectors_keep_magnitude() {
    let embedder = HashEmbedder::new(64, false);
    let v = embedder.embed_text("fox fox fox fox");
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!(norm > 1.0, "repeated token accumulates weight (norm={norm})");
}

#[test]
fn shared_words_are_more_similar() {
    let embedder = HashEmbedder::new(MINILM_DIM, true);
    let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
    let q = embedder.embed_text("What animal jumps?");
    let fox = embedder.embed_text("The quick brown fox jumps over the lazy dog.");
    let other = embedder.embed_text("Quarterly revenue grew by eight percent.");
    assert!(dot(&q, &fox) > dot(&q, &other));
}
