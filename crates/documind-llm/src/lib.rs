//! Answer synthesis: prompt construction, the `ChatModel` capability and its
//! Hugging Face implementation.

pub mod hf;
pub mod model;
pub mod prompt;
pub mod synthesizer;

pub use hf::HfInferenceClient;
pub use model::{ChatMessage, ChatModel, GenerationParams, LlmError, Role};
pub use prompt::{NOT_FOUND_PHRASE, SYSTEM_INSTRUCTION};
pub use synthesizer::Synthesizer;
