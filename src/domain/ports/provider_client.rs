//! Provider Client Port
//!
//! Abstraction over whatever service turns a prompt into a completion for a named
//! model. The pipeline treats implementations as stateless and reentrant: the same
//! client is shared by every branch and by the reduction stages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::error::ProviderError;
use crate::domain::models::{ModelDescriptor, Snapshot, TokenUsage};

/// Expected shape of the completion text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    /// Ask the provider for a JSON object reply
    Json,
}

/// Image attached to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisionInput {
    /// What the image shows, e.g. "branch 2 snapshot"
    pub caption: String,
    pub image: Snapshot,
}

/// Request to generate a completion
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Target model and its capabilities
    pub model: ModelDescriptor,

    /// Role instructions for the model
    pub system_prompt: String,

    /// Task content
    pub prompt: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Images; only forwarded to models that support vision
    pub vision_inputs: Vec<VisionInput>,

    pub response_format: ResponseFormat,
}

impl CompletionRequest {
    pub fn new(model: ModelDescriptor, system_prompt: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model,
            system_prompt: system_prompt.into(),
            prompt: prompt.into(),
            temperature: 0.0,
            max_tokens: 4000,
            vision_inputs: vec![],
            response_format: ResponseFormat::Text,
        }
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub const fn with_format(mut self, response_format: ResponseFormat) -> Self {
        self.response_format = response_format;
        self
    }

    /// Attach images, dropping them when the target model lacks vision support
    #[must_use]
    pub fn with_vision_inputs(mut self, inputs: Vec<VisionInput>) -> Self {
        if self.model.supports_vision {
            self.vision_inputs = inputs;
        } else if !inputs.is_empty() {
            self.prompt.push_str(NO_VISION_NOTE);
        }
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model.id
    }
}

/// Appended to prompts when screenshots exist but the model cannot see them
pub const NO_VISION_NOTE: &str =
    "\n\n[SYSTEM NOTE: Screenshots were available but not provided because this model does not accept image input.]";

/// Provider reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// Port trait for model providers
///
/// Implementations must be `Send + Sync` for concurrent use across tokio tasks.
///
/// # Errors
/// - `ProviderError::RateLimited`, `Timeout`, `ServerError` - transient, caller may retry
/// - `ProviderError::AuthError`, `Unavailable` - fatal for this call
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vision_inputs_kept_for_vision_models() {
        let request = CompletionRequest::new(
            ModelDescriptor::new("vision").with_vision(true),
            "sys",
            "look",
        )
        .with_vision_inputs(vec![VisionInput {
            caption: "snap".to_string(),
            image: Snapshot::jpeg("AAAA"),
        }]);
        assert_eq!(request.vision_inputs.len(), 1);
        assert_eq!(request.prompt, "look");
    }

    #[test]
    fn test_vision_inputs_dropped_for_text_models() {
        let request = CompletionRequest::new(ModelDescriptor::new("text-only"), "sys", "look")
            .with_vision_inputs(vec![VisionInput {
                caption: "snap".to_string(),
                image: Snapshot::jpeg("AAAA"),
            }]);
        assert!(request.vision_inputs.is_empty());
        assert!(request.prompt.ends_with(NO_VISION_NOTE));
    }

    #[test]
    fn test_no_note_without_images() {
        let request = CompletionRequest::new(ModelDescriptor::new("text-only"), "sys", "look")
            .with_vision_inputs(vec![]);
        assert_eq!(request.prompt, "look");
    }
}
