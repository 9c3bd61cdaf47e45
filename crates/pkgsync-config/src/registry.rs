use pkgsync_registry::Ecosystem;
use serde::{Deserialize, Serialize};

/// An upstream registry declared in the configuration file.
///
/// Registries are seeded into the store at startup, keyed by `name`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegistryConfig {
    /// Unique name, used on the command line and in lookups.
    pub name: String,

    /// Base URL of the upstream registry.
    pub url: String,

    /// Selects the adapter used to talk to this registry.
    pub ecosystem: Ecosystem,
}

pub struct DefaultRegistryInfo {
    pub name: &'static str,
    pub url: &'static str,
    pub ecosystem: Ecosystem,
}

pub fn default_registries() -> Vec<DefaultRegistryInfo> {
    vec![
        DefaultRegistryInfo {
            name: "bower.io",
            url: "https://registry.bower.io",
            ecosystem: Ecosystem::Bower,
        },
        DefaultRegistryInfo {
            name: "hub.docker.com",
            url: "https://registry.hub.docker.com",
            ecosystem: Ecosystem::Docker,
        },
    ]
}

impl From<DefaultRegistryInfo> for RegistryConfig {
    fn from(info: DefaultRegistryInfo) -> Self {
        Self {
            name: info.name.to_string(),
            url: info.url.to_string(),
            ecosystem: info.ecosystem,
        }
    }
}
