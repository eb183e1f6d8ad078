//! Typed errors
//!
//! Most of the crate propagates `anyhow::Error` with context. The failures
//! callers need to tell apart (bad configuration, a malformed resource graph)
//! get their own types so they can be matched on.

use thiserror::Error;

/// Problems found while loading the stack configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A required key is absent from the stack file and from every override.
    #[error("Missing required configuration value: {0}")]
    Missing(String),

    /// The value exists but is encrypted; we cannot decrypt it.
    #[error("Configuration value {0} is encrypted; pass it in plaintext through a flag or environment variable")]
    Encrypted(String),

    /// The release URL cannot be turned into an asset name. The URL itself
    /// may carry credentials and is not repeated.
    #[error("Invalid release URL: {reason}")]
    InvalidRelease { reason: String },

    /// The value has the wrong shape (e.g. a map where a string was expected).
    #[error("Invalid configuration value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Structural problems in a resource graph, detected before anything is submitted.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate resource name: {0}")]
    DuplicateName(String),

    #[error("Resource {resource} depends on unknown resource {dependency}")]
    UnknownDependency { resource: String, dependency: String },

    /// The dependency exists but is declared at or after the dependent.
    #[error("Resource {resource} depends on {dependency}, which is declared after it")]
    ForwardDependency { resource: String, dependency: String },

    #[error("Resource {resource} has no {field} output to satisfy a reference")]
    UnresolvedOutput { resource: String, field: String },
}
