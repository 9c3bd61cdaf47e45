//! Error types for pkgsync-core.

use miette::Diagnostic;
use pkgsync_config::error::ConfigError;
use pkgsync_db::DbError;
use pkgsync_registry::RegistryError;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum SyncError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Database(#[from] DbError),

    #[error("Unknown registry: {0}")]
    #[diagnostic(
        code(pkgsync::unknown_registry),
        help("Run `pkgsync registries` to list the configured registries")
    )]
    UnknownRegistry(String),

    #[error("Registry `{registry}` has unsupported ecosystem `{ecosystem}`")]
    #[diagnostic(
        code(pkgsync::unsupported_ecosystem),
        help("Fix the registry's ecosystem in your config file; supported: bower, docker")
    )]
    UnsupportedEcosystem { registry: String, ecosystem: String },

    #[error("Task queue is closed")]
    #[diagnostic(
        code(pkgsync::queue_closed),
        help("The worker pool has shut down; restart it to enqueue more work")
    )]
    QueueClosed,

    #[error("No task queue configured")]
    #[diagnostic(code(pkgsync::queue_unavailable))]
    QueueUnavailable,

    #[error("Error while {action}")]
    #[diagnostic(code(pkgsync::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    #[diagnostic(code(pkgsync::custom))]
    Custom(String),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> SyncResult<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> SyncResult<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            SyncError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
