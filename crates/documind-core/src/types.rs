//! Domain types passed between pipeline stages.

use serde::{Deserialize, Serialize};

/// An uploaded document: a name plus its raw bytes.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), bytes: bytes.into() }
    }
}

/// A bounded, overlapping span of the extracted text.
///
/// - `index`: position in the chunk sequence of one ingestion
/// - `start`: offset of the first character within the raw text, in characters
/// - `text`: the payload that gets embedded and retrieved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub start: usize,
    pub text: String,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// One passage returned by similarity search. Higher `score` is better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub position: usize,
    pub text: String,
    pub score: f32,
}

/// Ranked passages for a single question, plus their joined text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub passages: Vec<ScoredChunk>,
    pub text: String,
}

impl RetrievedContext {
    pub fn new(passages: Vec<ScoredChunk>, separator: &str) -> Self {
        let text = passages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(separator);
        Self { passages, text }
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// Outcome of a single `answer` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerResult {
    Answered { answer: String, context: RetrievedContext },
    /// No usable index; documents must be ingested first.
    NotIndexedYet,
    /// The language model call failed; the retrieved context is still returned.
    SynthesisFailed { reason: String, context: RetrievedContext },
    Failed { reason: String },
}

impl AnswerResult {
    /// The text a chat UI shows for this outcome.
    pub fn display_text(&self) -> String {
        match self {
            Self::Answered { answer, .. } => answer.clone(),
            Self::NotIndexedYet => "Please upload and process documents before asking questions.".to_string(),
            Self::SynthesisFailed { reason, .. } => format!("⚠️ Error: {}", reason),
            Self::Failed { reason } => format!("⚠️ {}", reason),
        }
    }

    pub fn context(&self) -> Option<&RetrievedContext> {
        match self {
            Self::Answered { context, .. } | Self::SynthesisFailed { context, .. } => Some(context),
            Self::NotIndexedYet | Self::Failed { .. } => None,
        }
    }
}

/// Summary of a completed ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub documents: usize,
    pub pages: usize,
    pub empty_pages: usize,
    pub characters: usize,
    pub chunks: usize,
    pub generation: u64,
}
