pub mod attempt;
pub mod config;
pub mod decision;
pub mod model;
pub mod run_state;

pub use attempt::{
    Attempt, AttemptDraft, BranchError, BranchState, ExecutionStatus, RealityCheck, Snapshot,
    TokenUsage, Verification,
};
pub use config::{
    ArtifactConfig, Config, LoggingConfig, OutputConfig, ProviderConfig, RetryConfig, RunConfig,
    SandboxConfig, Viewport,
};
pub use decision::{Decision, DecisionSource, Report, SynthesisResult};
pub use model::{BranchConfig, ModelDescriptor};
pub use run_state::RunState;
