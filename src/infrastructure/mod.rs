//! Infrastructure layer module
//!
//! Adapters that satisfy the domain ports plus process-wide concerns:
//! - OpenAI-compatible provider HTTP client
//! - External command sandbox
//! - Filesystem report persistence
//! - Configuration management
//! - Logging infrastructure
//! - Scripted doubles for tests

pub mod config;
pub mod logging;
pub mod mock;
pub mod persistence;
pub mod provider;
pub mod sandbox;
