//! Tool Registry: static catalogue of tool descriptors.
//!
//! Submodules:
//! - `types`: descriptors, transport bindings, parameter specs, availability
//! - `catalogue`: the load-once `ToolRegistry` and its lookups
//! - `builtin`: default catalogue used when the config lists no tools
//! - `errors`: registry error types

pub mod builtin;
pub mod catalogue;
pub mod errors;
pub mod types;

pub use catalogue::{catalogue_json, ToolRegistry};
pub use errors::RegistryError;
pub use types::{Availability, ParameterSpec, ToolDescriptor, TransportBinding};
