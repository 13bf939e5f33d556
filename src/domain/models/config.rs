use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::model::{BranchConfig, ModelDescriptor};

/// Main configuration structure for Tribunal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Fan-out branches, one per generating model
    #[serde(default)]
    pub branches: Vec<BranchConfig>,

    /// Model that verifies each branch; verification is skipped when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier_model: Option<ModelDescriptor>,

    #[serde(default = "default_verifier_temperature")]
    pub verifier_temperature: f32,

    /// Model that compares all attempts and picks a winner
    #[serde(default = "default_judge_model")]
    pub judge_model: ModelDescriptor,

    #[serde(default)]
    pub judge_temperature: f32,

    /// Used only when the winning model cannot synthesize
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesizer_fallback_model: Option<ModelDescriptor>,

    #[serde(default)]
    pub synthesizer_temperature: f32,

    /// Token ceiling for judge, verifier and synthesizer replies
    #[serde(default = "default_reduction_max_tokens")]
    pub reduction_max_tokens: u32,

    /// Sandbox executor settings, passed through unchanged
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Retry policy for provider calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Provider HTTP client settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Shape of the produced artifact
    #[serde(default)]
    pub artifact: ArtifactConfig,

    /// Run-level limits
    #[serde(default)]
    pub run: RunConfig,

    /// Report output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_judge_model() -> ModelDescriptor {
    ModelDescriptor::new("anthropic/claude-3.5-sonnet").with_vision(true)
}

const fn default_verifier_temperature() -> f32 {
    0.2
}

const fn default_reduction_max_tokens() -> u32 {
    8000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            branches: vec![],
            verifier_model: None,
            verifier_temperature: default_verifier_temperature(),
            judge_model: default_judge_model(),
            judge_temperature: 0.0,
            synthesizer_fallback_model: None,
            synthesizer_temperature: 0.0,
            reduction_max_tokens: default_reduction_max_tokens(),
            sandbox: SandboxConfig::default(),
            retry: RetryConfig::default(),
            provider: ProviderConfig::default(),
            artifact: ArtifactConfig::default(),
            run: RunConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Sandbox viewport in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Sandbox configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SandboxConfig {
    /// Command template for the command sandbox, program first
    #[serde(default)]
    pub command: Vec<String>,

    /// Execution deadline in milliseconds
    #[serde(default = "default_sandbox_timeout_ms")]
    pub timeout_ms: u64,

    /// JPEG quality of the snapshot (1-100)
    #[serde(default = "default_screenshot_quality")]
    pub screenshot_quality: u8,

    #[serde(default)]
    pub viewport: Viewport,
}

const fn default_sandbox_timeout_ms() -> u64 {
    10_000
}

const fn default_screenshot_quality() -> u8 {
    80
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            command: vec![],
            timeout_ms: default_sandbox_timeout_ms(),
            screenshot_quality: default_screenshot_quality(),
            viewport: Viewport::default(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Total provider calls allowed per request, first try included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    2000
}

const fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Provider HTTP client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible chat completions API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key; falls back to `OPENROUTER_API_KEY`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,

    /// Client-side request rate ceiling
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

const fn default_provider_timeout_secs() -> u64 {
    300
}

const fn default_requests_per_second() -> u32 {
    10
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: default_provider_timeout_secs(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

impl ProviderConfig {
    /// Get API key from config or environment
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
    }
}

/// Artifact shape used by extraction and persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ArtifactConfig {
    /// Fence language tag marking the code block
    #[serde(default = "default_artifact_language")]
    pub language: String,

    /// File extension for persisted code
    #[serde(default = "default_artifact_extension")]
    pub file_extension: String,
}

fn default_artifact_language() -> String {
    "html".to_string()
}

fn default_artifact_extension() -> String {
    "html".to_string()
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            language: default_artifact_language(),
            file_extension: default_artifact_extension(),
        }
    }
}

/// Run-level limits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunConfig {
    /// Global deadline; cancels the run when elapsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Report output configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OutputConfig {
    /// Directory receiving one sub-directory per run
    #[serde(default = "default_experiments_dir")]
    pub experiments_dir: PathBuf,
}

fn default_experiments_dir() -> PathBuf {
    PathBuf::from("experiments")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            experiments_dir: default_experiments_dir(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rotated JSON log files (console only when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
