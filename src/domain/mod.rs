//! Domain layer for the Tribunal pipeline
//!
//! This module contains the run data model, the error taxonomy and the port
//! traits for the external collaborators (provider, sandbox, persistence).

pub mod error;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use error::{
    AccumulatorError, JudgeError, ProviderError, RunError, SandboxError, SynthesisError,
};
