//! Error types for the registry crate.
//!
//! [`RegistryError`] covers everything an adapter can report to its caller.
//! Dependency lookups never surface it; adapters swallow those failures.

use miette::Diagnostic;
use thiserror::Error;

/// Errors that can occur while talking to an upstream ecosystem.
#[derive(Error, Diagnostic, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    #[diagnostic(
        code(pkgsync_registry::http),
        help("Check your network connection and the registry URL")
    )]
    UreqError(#[from] ureq::Error),

    #[error("Failed to fetch from remote source: {0}")]
    #[diagnostic(
        code(pkgsync_registry::fetch_remote),
        help("Verify the registry URL is correct and accessible")
    )]
    FailedToFetchRemote(String),

    #[error(transparent)]
    #[diagnostic(
        code(pkgsync_registry::json),
        help("The upstream response is not in the expected format")
    )]
    JsonError(#[from] serde_json::Error),

    #[error("Unknown ecosystem: {0}")]
    #[diagnostic(
        code(pkgsync_registry::unknown_ecosystem),
        help("Supported ecosystems are: bower, docker")
    )]
    UnknownEcosystem(String),
}

/// A specialized Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
