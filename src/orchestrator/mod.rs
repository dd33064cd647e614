//! Orchestrator: runs a user turn through planning, tool execution, and
//! response synthesis.
//!
//! Submodules:
//! - `pipeline`: the `Orchestrator` entry point and turn state machine
//! - `planner`: model, template, and heuristic tool selection
//! - `executor`: bounded-parallel tool execution with parameter merging
//! - `retry`: exponential backoff around dispatcher calls
//! - `synthesis`: model-written answers with deterministic fallbacks
//! - `conversation`: per-conversation turn history
//! - `prompts`: system prompts and `{placeholder}` templates
//! - `types`, `errors`: request/response shapes and error types

pub mod conversation;
pub mod errors;
pub mod executor;
pub mod pipeline;
pub mod planner;
pub mod prompts;
pub mod retry;
pub mod synthesis;
pub mod types;

pub use conversation::ConversationStore;
pub use errors::OrchestratorError;
pub use pipeline::Orchestrator;
pub use types::{
    ConversationTurn, ModelHealth, ModelStatus, Plan, PlanSource, ToolStatus, TurnRequest,
    TurnResponse,
};
