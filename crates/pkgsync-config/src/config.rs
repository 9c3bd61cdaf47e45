use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::{LazyLock, RwLock},
    time::Duration,
};

use pkgsync_utils::{
    path::{resolve_path, xdg_config_home, xdg_data_home},
    time::{parse_duration, RefreshInterval},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{ConfigError, Result},
    registry::{default_registries, RegistryConfig},
};

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_RECENTLY_UPDATED_LIMIT: usize = 100;
pub const DEFAULT_REPOS_API: &str = "https://repos.ecosyste.ms";
const DEFAULT_ADAPTER_REFRESH_INTERVAL: &str = "1h";
const DEFAULT_REPO_METADATA_INTERVAL: &str = "1d";

/// Application's configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// Path of the SQLite store.
    /// Default: $PKGSYNC_ROOT/pkgsync.db
    pub db_path: Option<String>,

    /// Number of tasks the worker pool runs concurrently.
    /// Default: 4
    pub workers: Option<usize>,

    /// How long a worker keeps an adapter (and its memoized index) before
    /// building a fresh one. Accepts durations like "30m", or "always"/"never".
    /// Default: "1h"
    pub adapter_refresh_interval: Option<String>,

    /// Minimum age of repository metadata before it is fetched again.
    /// Default: "1d"
    pub repo_metadata_interval: Option<String>,

    /// Maximum number of recently updated names synced per run.
    /// Default: 100
    pub recently_updated_limit: Option<usize>,

    /// Base URL of the repository metadata service.
    pub repos_api: Option<String>,

    /// Global HTTP timeout, e.g. "30s". No timeout when unset.
    pub http_timeout: Option<String>,

    /// User agent sent to upstream registries.
    pub user_agent: Option<String>,

    /// Upstream registries to sync.
    #[serde(default)]
    pub registries: Vec<RegistryConfig>,
}

pub static CONFIG: LazyLock<RwLock<Option<Config>>> = LazyLock::new(|| RwLock::new(None));

pub static CONFIG_PATH: LazyLock<RwLock<PathBuf>> = LazyLock::new(|| {
    RwLock::new(match std::env::var("PKGSYNC_CONFIG") {
        Ok(path_str) => PathBuf::from(path_str),
        Err(_) => xdg_config_home().join("pkgsync").join("config.toml"),
    })
});

pub fn config_path() -> PathBuf {
    CONFIG_PATH
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

pub fn set_config_path(path: PathBuf) {
    let mut config_path = CONFIG_PATH
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *config_path = path;
}

pub fn init() -> Result<()> {
    let config = Config::new()?;
    let mut global_config = CONFIG
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *global_config = Some(config);
    Ok(())
}

/// Returns the loaded configuration, or the defaults when [`init`] was never called.
pub fn get_config() -> Config {
    let mut config_guard = CONFIG
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    config_guard.get_or_insert_with(Config::default_config).clone()
}

fn pkgsync_root() -> String {
    std::env::var("PKGSYNC_ROOT")
        .unwrap_or_else(|_| format!("{}/pkgsync", xdg_data_home().display()))
}

impl Config {
    pub fn default_config() -> Self {
        Self {
            db_path: Some(format!("{}/pkgsync.db", pkgsync_root())),
            workers: Some(DEFAULT_WORKERS),
            adapter_refresh_interval: Some(DEFAULT_ADAPTER_REFRESH_INTERVAL.to_string()),
            repo_metadata_interval: Some(DEFAULT_REPO_METADATA_INTERVAL.to_string()),
            recently_updated_limit: Some(DEFAULT_RECENTLY_UPDATED_LIMIT),
            repos_api: Some(DEFAULT_REPOS_API.to_string()),
            http_timeout: None,
            user_agent: None,
            registries: default_registries().into_iter().map(Into::into).collect(),
        }
    }

    /// Loads the configuration from [`CONFIG_PATH`], falling back to the
    /// defaults when the file does not exist.
    pub fn new() -> Result<Self> {
        Self::from_path(&config_path())
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let mut config = match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no config at {}, using defaults", path.display());
                Self::default_config()
            }
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;

        Ok(config)
    }

    /// Fills unset fields with defaults and validates the rest.
    pub fn resolve(&mut self) -> Result<()> {
        self.workers.get_or_insert(DEFAULT_WORKERS);
        self.recently_updated_limit
            .get_or_insert(DEFAULT_RECENTLY_UPDATED_LIMIT);
        self.repos_api
            .get_or_insert_with(|| DEFAULT_REPOS_API.to_string());
        self.adapter_refresh_interval
            .get_or_insert_with(|| DEFAULT_ADAPTER_REFRESH_INTERVAL.to_string());
        self.repo_metadata_interval
            .get_or_insert_with(|| DEFAULT_REPO_METADATA_INTERVAL.to_string());

        if self.workers == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "workers",
                value: "0".into(),
            });
        }

        self.adapter_refresh_interval()?;
        self.repo_metadata_interval()?;
        self.http_timeout()?;

        let mut seen_names = HashSet::new();
        let mut seen_urls = HashSet::new();

        for registry in &mut self.registries {
            registry.name = registry.name.trim().to_string();
            if registry.name.is_empty() {
                return Err(ConfigError::EmptyRegistryName);
            }

            let parsed = url::Url::parse(&registry.url)
                .map_err(|_| ConfigError::InvalidRegistryUrl(registry.url.clone()))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidRegistryUrl(registry.url.clone()));
            }

            if !seen_names.insert(registry.name.clone()) {
                return Err(ConfigError::DuplicateRegistryName(registry.name.clone()));
            }
            if !seen_urls.insert(registry.url.trim_end_matches('/').to_string()) {
                return Err(ConfigError::DuplicateRegistryUrl(registry.url.clone()));
            }
        }

        Ok(())
    }

    pub fn get_db_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("PKGSYNC_DB") {
            return Ok(resolve_path(&env_path)?);
        }
        if let Some(db_path) = &self.db_path {
            return Ok(resolve_path(db_path)?);
        }
        Ok(resolve_path(&pkgsync_root())?.join("pkgsync.db"))
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or(DEFAULT_WORKERS).max(1)
    }

    pub fn recently_updated_limit(&self) -> usize {
        self.recently_updated_limit
            .unwrap_or(DEFAULT_RECENTLY_UPDATED_LIMIT)
    }

    pub fn repos_api(&self) -> &str {
        self.repos_api
            .as_deref()
            .unwrap_or(DEFAULT_REPOS_API)
            .trim_end_matches('/')
    }

    pub fn adapter_refresh_interval(&self) -> Result<RefreshInterval> {
        Ok(self
            .adapter_refresh_interval
            .as_deref()
            .unwrap_or(DEFAULT_ADAPTER_REFRESH_INTERVAL)
            .parse()?)
    }

    pub fn repo_metadata_interval(&self) -> Result<RefreshInterval> {
        Ok(self
            .repo_metadata_interval
            .as_deref()
            .unwrap_or(DEFAULT_REPO_METADATA_INTERVAL)
            .parse()?)
    }

    pub fn http_timeout(&self) -> Result<Option<Duration>> {
        self.http_timeout
            .as_deref()
            .map(|value| {
                parse_duration(value).ok_or_else(|| {
                    ConfigError::InvalidValue {
                        field: "http_timeout",
                        value: value.to_string(),
                    }
                })
            })
            .transpose()
    }

    pub fn get_registry(&self, name: &str) -> Result<&RegistryConfig> {
        self.registries
            .iter()
            .find(|registry| registry.name == name)
            .ok_or_else(|| ConfigError::UnknownRegistry(name.to_string()))
    }
}

pub fn generate_default_config() -> Result<()> {
    let config_path = config_path();

    if config_path.exists() {
        return Err(ConfigError::ConfigAlreadyExists);
    }

    let body = toml::to_string_pretty(&Config::default_config())?;
    let content = format!(
        "# pkgsync configuration\n#\n# Registries are seeded into the store on every run, keyed by name.\n# Supported ecosystems: bower, docker\n\n{body}"
    );

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&config_path, content)?;
    info!(
        "Default configuration file generated at: {}",
        config_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use pkgsync_registry::Ecosystem;
    use serial_test::serial;
    use tempfile::TempDir;

    use super::*;
    use crate::test_utils::with_env;

    fn registry(name: &str, url: &str) -> RegistryConfig {
        RegistryConfig {
            name: name.to_string(),
            url: url.to_string(),
            ecosystem: Ecosystem::Bower,
        }
    }

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_config();

        assert_eq!(config.workers(), 4);
        assert_eq!(config.recently_updated_limit(), 100);
        assert_eq!(config.repos_api(), "https://repos.ecosyste.ms");
        assert_eq!(
            config.adapter_refresh_interval().unwrap(),
            RefreshInterval::Every(Duration::from_secs(3600))
        );
        assert_eq!(config.registries.len(), 2);
        assert!(config
            .registries
            .iter()
            .any(|r| r.ecosystem == Ecosystem::Docker));
    }

    #[test]
    fn test_resolve_sets_defaults() {
        let mut config: Config = toml::from_str("").unwrap();
        config.resolve().unwrap();

        assert_eq!(config.workers, Some(4));
        assert_eq!(config.recently_updated_limit, Some(100));
        assert_eq!(config.adapter_refresh_interval.as_deref(), Some("1h"));
        assert!(config.registries.is_empty());
    }

    #[test]
    fn test_resolve_duplicate_registry_name() {
        let mut config = Config::default_config();
        config.registries = vec![
            registry("dup", "https://a.example.com"),
            registry("dup", "https://b.example.com"),
        ];
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::DuplicateRegistryName(_))
        ));
    }

    #[test]
    fn test_resolve_duplicate_registry_url() {
        let mut config = Config::default_config();
        config.registries = vec![
            registry("a", "https://a.example.com"),
            registry("b", "https://a.example.com/"),
        ];
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::DuplicateRegistryUrl(_))
        ));
    }

    #[test]
    fn test_resolve_rejects_bad_values() {
        let mut config = Config::default_config();
        config.registries = vec![registry("  ", "https://a.example.com")];
        assert!(matches!(config.resolve(), Err(ConfigError::EmptyRegistryName)));

        let mut config = Config::default_config();
        config.registries = vec![registry("a", "ftp://a.example.com")];
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidRegistryUrl(_))
        ));

        let mut config = Config::default_config();
        config.workers = Some(0);
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidValue { field: "workers", .. })
        ));

        let mut config = Config::default_config();
        config.http_timeout = Some("soon".into());
        assert!(config.resolve().is_err());

        let mut config = Config::default_config();
        config.adapter_refresh_interval = Some("sometimes".into());
        assert!(config.resolve().is_err());
    }

    #[test]
    fn test_unknown_ecosystem_rejected_at_parse() {
        let content = r#"
            [[registries]]
            name = "crates"
            url = "https://crates.io"
            ecosystem = "cargo"
        "#;
        let result: std::result::Result<Config, _> = toml::from_str(content);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_path_reads_registries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
workers = 8
http_timeout = "30s"

[[registries]]
name = "local-docker"
url = "http://localhost:5000"
ecosystem = "docker"
"#,
        )
        .unwrap();

        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.workers(), 8);
        assert_eq!(config.http_timeout().unwrap(), Some(Duration::from_secs(30)));
        let registry = config.get_registry("local-docker").unwrap();
        assert_eq!(registry.ecosystem, Ecosystem::Docker);
        assert!(matches!(
            config.get_registry("nope"),
            Err(ConfigError::UnknownRegistry(_))
        ));
    }

    #[test]
    fn test_from_path_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::from_path(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.registries.len(), 2);
    }

    #[test]
    #[serial]
    fn test_get_db_path_env_override() {
        let config = Config::default_config();
        with_env(&[("PKGSYNC_DB", Some("/tmp/custom/pkgsync.db"))], || {
            assert_eq!(
                config.get_db_path().unwrap(),
                PathBuf::from("/tmp/custom/pkgsync.db")
            );
        });

        let mut config = Config::default_config();
        config.db_path = None;
        with_env(
            &[("PKGSYNC_DB", None), ("PKGSYNC_ROOT", Some("/tmp/pkgsync-root"))],
            || {
                assert_eq!(
                    config.get_db_path().unwrap(),
                    PathBuf::from("/tmp/pkgsync-root/pkgsync.db")
                );
            },
        );
    }

    #[test]
    #[serial]
    fn test_generate_default_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let previous = config_path();
        set_config_path(path.clone());

        generate_default_config().unwrap();
        let loaded = Config::from_path(&path).unwrap();
        assert_eq!(loaded.registries.len(), 2);
        assert!(matches!(
            generate_default_config(),
            Err(ConfigError::ConfigAlreadyExists)
        ));

        set_config_path(previous);
    }
}
