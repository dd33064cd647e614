//! Capability Dispatcher: executes one tool call against its bound transport.
//!
//! Submodules:
//! - `container`: multipart POST to the document-processing container
//! - `capability_server`: probe/launch/poll plus candidate-endpoint fallback
//! - `lifecycle`: launching and stopping capability server processes
//! - `client`: the `ToolExecutor` seam and the `Dispatcher` implementation
//!
//! Retries are not done here. The orchestrator wraps whole dispatcher calls
//! so each retry re-probes connectivity.

pub mod capability_server;
pub mod client;
pub mod container;
pub mod errors;
pub mod lifecycle;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{Dispatcher, ToolExecutor};
pub use errors::DispatchError;
pub use types::{CapabilityServerConfig, ContainerSettings, ToolInvocation, ToolResult};
