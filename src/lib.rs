//! Tribunal - multi-model generate, execute, judge and synthesize
//!
//! Tribunal sends one task to several language models in parallel, runs each
//! model's code in a sandbox, optionally verifies the result with a
//! vision-capable model, lets a judge model pick a winner and finally has the
//! winning model synthesize an improved artifact.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Run data model, error taxonomy and port traits
//! - **Application Layer** (`application`): Branch pipeline, judge, synthesizer, orchestrator
//! - **Infrastructure Layer** (`infrastructure`): Provider client, sandbox, persistence, config, logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use tribunal::application::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = tribunal::ConfigLoader::load()?;
//!     // Build a provider client and sandbox, then run the orchestrator
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use application::{Judge, Orchestrator, RetryPolicy, Synthesizer, Verifier};
pub use domain::models::{
    Attempt, BranchConfig, Config, Decision, ExecutionStatus, ModelDescriptor, RealityCheck,
    Report, SynthesisResult,
};
pub use domain::ports::{ProviderClient, ReportSink, SandboxExecutor};
pub use domain::{ProviderError, RunError, SandboxError};
pub use infrastructure::config::{ConfigError, ConfigLoader};
