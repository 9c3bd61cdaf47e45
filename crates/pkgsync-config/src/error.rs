use miette::Diagnostic;
use pkgsync_utils::error::{DurationError, PathError, UtilsError};
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(pkgsync_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(pkgsync_config::toml_deserialize),
        help("Check your config.toml syntax and structure. Ecosystems must be one of: bower, docker")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Configuration file already exists")]
    #[diagnostic(
        code(pkgsync_config::already_exists),
        help("Remove the existing config file or use a different location")
    )]
    ConfigAlreadyExists,

    #[error("Registry name cannot be empty")]
    #[diagnostic(
        code(pkgsync_config::empty_registry_name),
        help("Give every [[registries]] entry a non-empty name")
    )]
    EmptyRegistryName,

    #[error("Invalid registry URL: {0}")]
    #[diagnostic(
        code(pkgsync_config::invalid_registry_url),
        help("Registry URLs must be absolute http(s) URLs")
    )]
    InvalidRegistryUrl(String),

    #[error("Duplicate registry name: {0}")]
    #[diagnostic(
        code(pkgsync_config::duplicate_registry),
        help("Each registry must have a unique name")
    )]
    DuplicateRegistryName(String),

    #[error("Duplicate registry URL: {0}")]
    #[diagnostic(
        code(pkgsync_config::duplicate_registry_url),
        help("Each registry must point at a different URL")
    )]
    DuplicateRegistryUrl(String),

    #[error("Unknown registry: {0}")]
    #[diagnostic(
        code(pkgsync_config::unknown_registry),
        help("Run `pkgsync registries` to list the configured registries")
    )]
    UnknownRegistry(String),

    #[error("Invalid value for `{field}`: {value}")]
    #[diagnostic(code(pkgsync_config::invalid_value))]
    InvalidValue { field: &'static str, value: String },

    #[error("IO error: {0}")]
    #[diagnostic(code(pkgsync_config::io))]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Utils(#[from] UtilsError),
}

impl From<PathError> for ConfigError {
    fn from(err: PathError) -> Self {
        Self::Utils(UtilsError::Path(err))
    }
}

impl From<DurationError> for ConfigError {
    fn from(err: DurationError) -> Self {
        Self::Utils(UtilsError::Duration(err))
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
