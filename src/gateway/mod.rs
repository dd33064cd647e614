//! Model Gateway: text generation over heterogeneous model backends.
//!
//! Two backend families sit behind `TextGenerator`:
//! - `hosted`: OpenAI-compatible chat completions over HTTP
//! - `local_process`: a worker process speaking line-delimited JSON on stdio
//!
//! `ModelHandle` adds structured generation and health checks on top of any
//! backend; `ModelCatalogue` turns config entries into handles.

pub mod backend;
pub mod errors;
pub mod handle;
pub mod hosted;
pub mod local_process;
pub mod structured;
pub mod types;

pub use backend::{build_backend, TextGenerator};
pub use errors::ModelError;
pub use handle::{ModelCatalogue, ModelHandle, RESPONSE_SYNTHESIS_CAPABILITY};
pub use types::{ModelConfig, ModelDescriptor, ModelKind};
