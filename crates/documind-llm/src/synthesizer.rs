use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use documind_core::{Error, Result};

use crate::model::{ChatModel, GenerationParams};
use crate::prompt::build_messages;

/// Turns retrieved context plus a question into a grounded answer.
///
/// Every failure of the underlying model, including a timeout or an empty
/// completion, comes back as [`Error::SynthesisFailure`].
pub struct Synthesizer {
    model: Arc<dyn ChatModel>,
    params: GenerationParams,
    timeout: Duration,
}

impl Synthesizer {
    pub fn new(model: Arc<dyn ChatModel>, params: GenerationParams, timeout: Duration) -> Self {
        Self { model, params, timeout }
    }

    pub async fn synthesize(&self, context: &str, question: &str) -> Result<String> {
        let messages = build_messages(context, question);
        let call = self.model.chat(&messages, &self.params);
        let answer = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(model = %self.model.model_id(), error = %e, "language model call failed");
                return Err(Error::SynthesisFailure(e.to_string()));
            }
            Err(_) => {
                warn!(model = %self.model.model_id(), timeout_secs = self.timeout.as_secs_f64(), "language model timed out");
                return Err(Error::SynthesisFailure(format!(
                    "the language model did not respond within {:.1}s",
                    self.timeout.as_secs_f64()
                )));
            }
        };
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(Error::SynthesisFailure("the language model returned an empty answer".into()));
        }
        info!(model = %self.model.model_id(), chars = answer.len(), "answer synthesized");
        Ok(answer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChatMessage, LlmError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recording {
        reply: std::result::Result<String, fn() -> LlmError>,
        delay: Duration,
        seen: Mutex<Vec<(Vec<ChatMessage>, GenerationParams)>>,
    }

    impl Recording {
        fn replying(text: &str) -> Self {
            Self { reply: Ok(text.to_string()), delay: Duration::ZERO, seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl ChatModel for Recording {
        fn model_id(&self) -> &str { "recording" }
        async fn chat(&self, messages: &[ChatMessage], params: &GenerationParams) -> std::result::Result<String, LlmError> {
            self.seen.lock().expect("lock").push((messages.to_vec(), *params));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.reply {
                Ok(t) => Ok(t.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    #[tokio::test]
    async fn passes_context_question_and_params() {
        let model = Arc::new(Recording::replying("  The fox.  "));
        let synth = Synthesizer::new(model.clone(), GenerationParams::default(), Duration::from_secs(5));
        let answer = synth.synthesize("foxes jump", "What jumps?").await.expect("answer");
        assert_eq!(answer, "The fox.");
        let seen = model.seen.lock().expect("lock");
        let (messages, params) = &seen[0];
        assert_eq!(messages[1].content, "Context:\nfoxes jump\n\nQuestion: What jumps?");
        assert_eq!(*params, GenerationParams { max_tokens: 512, temperature: 0.3, top_p: 0.9 });
    }

    #[tokio::test]
    async fn model_errors_become_synthesis_failures() {
        let model = Arc::new(Recording {
            reply: Err(|| LlmError::Unauthorized { status: 401, body: "bad token".into() }),
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        });
        let synth = Synthesizer::new(model, GenerationParams::default(), Duration::from_secs(5));
        match synth.synthesize("c", "q").await {
            Err(Error::SynthesisFailure(reason)) => assert!(reason.contains("bad token")),
            other => panic!("expected SynthesisFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let model = Arc::new(Recording { delay: Duration::from_secs(5), ..Recording::replying("late") });
        let synth = Synthesizer::new(model, GenerationParams::default(), Duration::from_millis(20));
        assert!(matches!(synth.synthesize("c", "q").await, Err(Error::SynthesisFailure(_))));
    }

    #[tokio::test]
    async fn blank_completion_is_a_failure() {
        let synth = Synthesizer::new(Arc::new(Recording::replying("   ")), GenerationParams::default(), Duration::from_secs(1));
        assert!(matches!(synth.synthesize("c", "q").await, Err(Error::SynthesisFailure(_))));
    }
}
