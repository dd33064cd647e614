//! Tool registry error types.

use thiserror::Error;

/// Errors raised while building the tool catalogue.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Two descriptors share an id.
    #[error("duplicate tool id: '{id}'")]
    DuplicateTool { id: String },

    /// A container-bound tool has no endpoint and no default is configured.
    #[error("tool '{id}' has no container endpoint")]
    MissingEndpoint { id: String },
}
