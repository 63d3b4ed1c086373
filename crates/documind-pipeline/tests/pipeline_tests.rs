use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use documind_core::config::Settings;
use documind_core::traits::Embedder;
use documind_core::types::{AnswerResult, Document};
use documind_core::{Error, Result};
use documind_embed::HashEmbedder;
use documind_llm::{ChatMessage, ChatModel, GenerationParams, LlmError};
use documind_pipeline::Pipeline;
use documind_vector::manifest::MANIFEST_FILE;

const DIM: usize = 384;

/// Answers with a fixed string and remembers the last user message.
struct CannedChat {
    reply: String,
    last_prompt: Mutex<Option<String>>,
}

impl CannedChat {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self { reply: reply.to_string(), last_prompt: Mutex::new(None) })
    }

    fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ChatModel for CannedChat {
    fn model_id(&self) -> &str {
        "canned"
    }

    async fn chat(&self, messages: &[ChatMessage], _params: &GenerationParams) -> std::result::Result<String, LlmError> {
        *self.last_prompt.lock().expect("lock") = messages.last().map(|m| m.content.clone());
        Ok(self.reply.clone())
    }
}

struct DownChat;

#[async_trait]
impl ChatModel for DownChat {
    fn model_id(&self) -> &str {
        "down"
    }

    async fn chat(&self, _messages: &[ChatMessage], _params: &GenerationParams) -> std::result::Result<String, LlmError> {
        Err(LlmError::Http { status: 503, body: "model is loading".into() })
    }
}

/// Looks like the hashing embedder but never manages to load.
struct BrokenEmbedder {
    id: String,
}

impl BrokenEmbedder {
    fn new() -> Self {
        Self { id: HashEmbedder::new(DIM, true).model_id().to_string() }
    }
}

impl Embedder for BrokenEmbedder {
    fn model_id(&self) -> &str {
        &self.id
    }
    fn dim(&self) -> usize {
        DIM
    }
    fn normalized(&self) -> bool {
        true
    }
    fn load(&self) -> Result<()> {
        Err(Error::EmbeddingModelUnavailable("weights not found".into()))
    }
    fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::EmbeddingModelUnavailable("weights not found".into()))
    }
}

fn settings(dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.index.dir = dir.path().join("index").to_string_lossy().into_owned();
    settings
}

fn pipeline_with(dir: &TempDir, embedder: Arc<dyn Embedder>, chat: Arc<dyn ChatModel>) -> Pipeline {
    Pipeline::new(&settings(dir), embedder, chat).expect("pipeline")
}

fn pipeline(dir: &TempDir, chat: Arc<dyn ChatModel>) -> Pipeline {
    pipeline_with(dir, Arc::new(HashEmbedder::new(DIM, true)), chat)
}

fn fox_document() -> Document {
    let text = "The quick brown fox jumps over the lazy dog. ".repeat(30);
    Document::new("fox.txt", text)
}

#[tokio::test]
async fn answer_before_ingest_is_not_indexed_yet() {
    let tmp = TempDir::new().expect("tmp");
    let chat = CannedChat::new("unused");
    let p = pipeline(&tmp, chat.clone());
    let result = p.answer("anything").await;
    assert!(matches!(result, AnswerResult::NotIndexedYet), "got {result:?}");
    assert_eq!(result.display_text(), "Please upload and process documents before asking questions.");
    assert!(chat.last_prompt().is_none());
    assert!(p.status().is_none());
}

#[tokio::test]
async fn ingest_without_documents_is_rejected() {
    let tmp = TempDir::new().expect("tmp");
    let p = pipeline(&tmp, CannedChat::new("unused"));
    assert!(matches!(p.ingest(Vec::new()).await, Err(Error::NoDocuments)));
}

#[tokio::test]
async fn blank_documents_are_extraction_empty() {
    let tmp = TempDir::new().expect("tmp");
    let p = pipeline(&tmp, CannedChat::new("unused"));
    let docs = vec![Document::new("blank.txt", "   \n\t\n"), Document::new("empty.txt", "")];
    assert!(matches!(p.ingest(docs).await, Err(Error::ExtractionEmpty)));
    assert!(p.status().is_none());
    assert!(matches!(p.answer("anything").await, AnswerResult::NotIndexedYet));
}

#[tokio::test]
async fn fox_question_is_answered_from_context() {
    let tmp = TempDir::new().expect("tmp");
    let chat = CannedChat::new("A fox.");
    let p = pipeline(&tmp, chat.clone());

    let report = p.ingest(vec![fox_document()]).await.expect("ingest");
    assert_eq!(report.documents, 1);
    assert_eq!(report.generation, 1);
    assert!(report.chunks > 1);

    match p.answer("What animal jumps?").await {
        AnswerResult::Answered { answer, context } => {
            assert!(!answer.is_empty());
            assert!(context.text.contains("fox"));
            assert!(!context.passages.is_empty() && context.passages.len() <= 3);
        }
        other => panic!("expected an answer, got {other:?}"),
    }
    let prompt = chat.last_prompt().expect("model called");
    assert!(prompt.starts_with("Context:\n"));
    assert!(prompt.ends_with("\n\nQuestion: What animal jumps?"));

    let status = p.status().expect("status");
    assert_eq!(status.generation, 1);
    assert_eq!(status.entries, report.chunks);
    assert_eq!(status.dim, DIM);
}

#[tokio::test]
async fn synthesis_failure_keeps_context_and_is_distinct() {
    let tmp = TempDir::new().expect("tmp");
    let p = pipeline(&tmp, Arc::new(DownChat));
    p.ingest(vec![fox_document()]).await.expect("ingest");

    let result = p.answer("What animal jumps?").await;
    match &result {
        AnswerResult::SynthesisFailed { reason, context } => {
            assert!(reason.contains("503"));
            assert!(context.text.contains("fox"));
        }
        other => panic!("expected a synthesis failure, got {other:?}"),
    }
    assert!(result.display_text().starts_with("⚠️ Error: "));
}

#[tokio::test]
async fn empty_question_fails() {
    let tmp = TempDir::new().expect("tmp");
    let chat = CannedChat::new("unused");
    let p = pipeline(&tmp, chat.clone());
    p.ingest(vec![fox_document()]).await.expect("ingest");
    assert!(matches!(p.answer("   ").await, AnswerResult::Failed { .. }));
    assert!(chat.last_prompt().is_none());
}

#[tokio::test]
async fn failed_ingest_leaves_previous_index_live() {
    let tmp = TempDir::new().expect("tmp");
    let p = pipeline(&tmp, CannedChat::new("A fox."));
    p.ingest(vec![fox_document()]).await.expect("ingest");

    assert!(matches!(p.ingest(vec![Document::new("blank.txt", " ")]).await, Err(Error::ExtractionEmpty)));

    let broken = pipeline_with(&tmp, Arc::new(BrokenEmbedder::new()), CannedChat::new("unused"));
    let err = broken.ingest(vec![Document::new("zebra.txt", "Zebras have stripes.")]).await;
    assert!(matches!(err, Err(Error::EmbeddingModelUnavailable(_))), "got {err:?}");

    assert_eq!(p.status().expect("status").generation, 1);
    match p.answer("What animal jumps?").await {
        AnswerResult::Answered { context, .. } => assert!(context.text.contains("fox")),
        other => panic!("expected an answer, got {other:?}"),
    }
}

#[tokio::test]
async fn unavailable_embedder_fails_the_answer() {
    let tmp = TempDir::new().expect("tmp");
    pipeline(&tmp, CannedChat::new("unused")).ingest(vec![fox_document()]).await.expect("ingest");

    let chat = CannedChat::new("unused");
    let broken = pipeline_with(&tmp, Arc::new(BrokenEmbedder::new()), chat.clone());
    match broken.answer("What animal jumps?").await {
        AnswerResult::Failed { reason } => assert!(reason.contains("weights not found")),
        other => panic!("expected a failure, got {other:?}"),
    }
    assert!(chat.last_prompt().is_none());
}

#[tokio::test]
async fn reingest_replaces_the_index() {
    let tmp = TempDir::new().expect("tmp");
    let p = pipeline(&tmp, CannedChat::new("ok"));
    p.ingest(vec![Document::new("apples.txt", "Apples grow on trees in orchards.")]).await.expect("first");
    let report = p.ingest(vec![Document::new("zebras.txt", "Zebras graze on the savanna.")]).await.expect("second");
    assert_eq!(report.generation, 2);

    match p.answer("Where do apples grow?").await {
        AnswerResult::Answered { context, .. } => {
            assert!(context.text.contains("Zebras"));
            assert!(!context.text.contains("Apples"));
        }
        other => panic!("expected an answer, got {other:?}"),
    }
}

#[tokio::test]
async fn other_instances_pick_up_new_generations() {
    let tmp = TempDir::new().expect("tmp");
    let writer = pipeline(&tmp, CannedChat::new("ok"));
    let reader = pipeline(&tmp, CannedChat::new("ok"));

    writer.ingest(vec![Document::new("apples.txt", "Apples grow on trees.")]).await.expect("first");
    match reader.answer("apples?").await {
        AnswerResult::Answered { context, .. } => assert!(context.text.contains("Apples")),
        other => panic!("expected an answer, got {other:?}"),
    }

    writer.ingest(vec![Document::new("zebras.txt", "Zebras graze on grass.")]).await.expect("second");
    match reader.answer("zebras?").await {
        AnswerResult::Answered { context, .. } => assert_eq!(context.text, "Zebras graze on grass."),
        other => panic!("expected an answer, got {other:?}"),
    }
}

#[tokio::test]
async fn corrupt_index_asks_for_reingest() {
    let tmp = TempDir::new().expect("tmp");
    let p = pipeline(&tmp, CannedChat::new("ok"));
    p.ingest(vec![fox_document()]).await.expect("ingest");
    std::fs::write(tmp.path().join("index").join(MANIFEST_FILE), b"{ not json").expect("clobber");

    let fresh = pipeline(&tmp, CannedChat::new("ok"));
    assert!(matches!(fresh.answer("What animal jumps?").await, AnswerResult::NotIndexedYet));
    assert!(fresh.status().is_none());

    // A new ingestion repairs it.
    let report = fresh.ingest(vec![fox_document()]).await.expect("reingest");
    assert!(report.generation >= 2);
    assert!(matches!(fresh.answer("What animal jumps?").await, AnswerResult::Answered { .. }));
}

#[tokio::test]
async fn status_agrees_with_answer_when_data_is_missing() {
    let tmp = TempDir::new().expect("tmp");
    let p = pipeline(&tmp, CannedChat::new("ok"));
    p.ingest(vec![fox_document()]).await.expect("ingest");
    std::fs::remove_dir_all(tmp.path().join("index").join("gen-000001")).expect("remove data");

    let fresh = pipeline(&tmp, CannedChat::new("ok"));
    assert!(fresh.status().is_none());
    assert!(matches!(fresh.answer("What animal jumps?").await, AnswerResult::NotIndexedYet));
}

#[tokio::test]
async fn status_rejects_index_from_another_embedder() {
    let tmp = TempDir::new().expect("tmp");
    pipeline(&tmp, CannedChat::new("ok")).ingest(vec![fox_document()]).await.expect("ingest");

    let other = pipeline_with(&tmp, Arc::new(HashEmbedder::new(64, true)), CannedChat::new("ok"));
    assert!(other.status().is_none());
    assert!(matches!(other.answer("What animal jumps?").await, AnswerResult::NotIndexedYet));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_ingests_into_one_location_serialize() {
    let tmp = TempDir::new().expect("tmp");
    let a = pipeline(&tmp, CannedChat::new("ok"));
    let b = pipeline(&tmp, CannedChat::new("ok"));
    let apples = "Apples grow on trees in orchards.";
    let zebras = "Zebras graze on the savanna.";

    let (ra, rb) = tokio::join!(
        a.ingest(vec![Document::new("apples.txt", apples)]),
        b.ingest(vec![Document::new("zebras.txt", zebras)]),
    );
    let (ra, rb) = (ra.expect("first ingest"), rb.expect("second ingest"));
    let mut generations = vec![ra.generation, rb.generation];
    generations.sort_unstable();
    assert_eq!(generations, vec![1, 2]);

    let last = if ra.generation == 2 { apples } else { zebras };
    let fresh = pipeline(&tmp, CannedChat::new("ok"));
    assert_eq!(fresh.status().expect("status").generation, 2);
    match fresh.answer("what is indexed?").await {
        AnswerResult::Answered { context, .. } => assert_eq!(context.text, last),
        other => panic!("expected an answer, got {other:?}"),
    }
}
