//! Application layer: the orchestration pipeline
//!
//! Branch state machine, the two reduction stages (judge, synthesizer) and the
//! orchestrator that drives a run across them.

pub mod branch;
pub mod extraction;
pub mod judge;
pub mod orchestrator;
pub mod prompts;
pub mod reality_check;
pub mod retry;
pub mod synthesizer;
pub mod verifier;

pub use branch::{Branch, BranchContext};
pub use judge::Judge;
pub use orchestrator::Orchestrator;
pub use retry::{RetryError, RetryOutcome, RetryPolicy};
pub use synthesizer::Synthesizer;
pub use verifier::Verifier;
