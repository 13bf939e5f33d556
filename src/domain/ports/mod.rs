//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that infrastructure adapters must implement:
//! - ProviderClient: model completions over any provider
//! - SandboxExecutor: isolated execution of generated code
//! - ReportSink: persistence of run output
//!
//! These traits keep the pipeline independent of specific providers, sandboxes and
//! storage layouts.

pub mod provider_client;
pub mod report_sink;
pub mod sandbox_executor;

pub use provider_client::{
    Completion, CompletionRequest, ProviderClient, ResponseFormat, VisionInput, NO_VISION_NOTE,
};
pub use report_sink::ReportSink;
pub use sandbox_executor::{SandboxExecutor, SandboxRequest, SandboxResponse, SandboxStatus};
