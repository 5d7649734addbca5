//! Mock narrator for testing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use readscope_core::error::ProviderError;
use readscope_core::traits::{
    ModelInfo, NarrativeGenerator, NarrativeRequest, NarrativeResponse, TokenUsage,
};

enum Reply {
    Text(String),
    Fail(fn() -> ProviderError),
}

/// A narrator that returns a canned reply or a canned error, without
/// touching the network.
pub struct MockNarrator {
    reply: Reply,
    call_count: AtomicU32,
    last_request: Mutex<Option<NarrativeRequest>>,
}

impl MockNarrator {
    /// A narrator that always returns `text`.
    pub fn with_fixed_response(text: &str) -> Self {
        Self::new(Reply::Text(text.to_string()))
    }

    /// A narrator that always fails with the error `make` produces.
    pub fn failing(make: fn() -> ProviderError) -> Self {
        Self::new(Reply::Fail(make))
    }

    fn new(reply: Reply) -> Self {
        Self {
            reply,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Get the number of calls made to this narrator.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this narrator.
    pub fn last_request(&self) -> Option<NarrativeRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl NarrativeGenerator for MockNarrator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &NarrativeRequest) -> anyhow::Result<NarrativeResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(request.clone());

        let content = match &self.reply {
            Reply::Text(text) => text.clone(),
            Reply::Fail(make) => return Err(make().into()),
        };

        // Rough estimate: four bytes per token.
        let prompt_tokens = (request.prompt.len() / 4) as u32;
        let completion_tokens = (content.len() / 4) as u32;

        Ok(NarrativeResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> NarrativeRequest {
        NarrativeRequest {
            model: "mock-model".into(),
            prompt: "- Correct answers: 3 of 4".into(),
            system_prompt: None,
            max_tokens: 100,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn fixed_response() {
        let narrator = MockNarrator::with_fixed_response("Well done.");

        let response = narrator.generate(&request()).await.unwrap();
        assert_eq!(response.content, "Well done.");
        assert_eq!(response.model, "mock-model");
        assert_eq!(narrator.call_count(), 1);
        assert_eq!(
            narrator.last_request().unwrap().prompt,
            "- Correct answers: 3 of 4"
        );
    }

    #[tokio::test]
    async fn failing_narrator_returns_provider_error() {
        let narrator = MockNarrator::failing(|| ProviderError::Timeout(30));

        let err = narrator.generate(&request()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::Timeout(30))
        ));
        assert_eq!(narrator.call_count(), 1);
    }
}
