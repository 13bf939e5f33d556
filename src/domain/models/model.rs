use serde::{Deserialize, Serialize};

/// Uniform capability descriptor for any model the pipeline talks to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelDescriptor {
    /// Provider model identifier, e.g. `anthropic/claude-3.5-sonnet`
    pub id: String,

    /// Whether the model accepts image inputs
    #[serde(default)]
    pub supports_vision: bool,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            supports_vision: false,
        }
    }

    #[must_use]
    pub const fn with_vision(mut self, supports_vision: bool) -> Self {
        self.supports_vision = supports_vision;
        self
    }
}

/// One fan-out branch, resolved once at run start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BranchConfig {
    #[serde(flatten)]
    pub model: ModelDescriptor,

    /// Sampling temperature used for generation
    #[serde(default)]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_branch_max_tokens")]
    pub max_tokens: u32,

    /// Optional human-readable name used in logs and reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

const fn default_branch_max_tokens() -> u32 {
    8000
}

impl BranchConfig {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model: ModelDescriptor::new(model_id),
            temperature: 0.0,
            max_tokens: default_branch_max_tokens(),
            label: None,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model.id
    }
}
