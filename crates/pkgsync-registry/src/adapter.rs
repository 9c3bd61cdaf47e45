//! The adapter contract every ecosystem implements, plus the canonical
//! records adapters produce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{bower::BowerAdapter, docker::DockerAdapter, ecosystem::Ecosystem, error::Result};

/// The registry an adapter instance is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryHandle {
    pub id: i32,
    pub name: String,
    pub url: String,
    pub ecosystem: Ecosystem,
}

impl RegistryHandle {
    /// Registry base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

/// Canonical package record produced by an adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub repository_url: Option<String>,
    pub licenses: Option<String>,
    pub keywords: Vec<String>,
    pub homepage: Option<String>,
    pub description: Option<String>,
    pub namespace: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionMetadata {
    pub number: String,
    pub published_at: Option<DateTime<Utc>>,
    pub licenses: Option<String>,
    pub integrity: Option<String>,
    pub metadata: serde_json::Value,
}

impl VersionMetadata {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyMetadata {
    pub package_name: String,
    pub requirements: String,
    pub kind: String,
    pub optional: bool,
    pub ecosystem: Ecosystem,
}

/// Translates one upstream ecosystem into canonical records.
///
/// Adapters are blocking and may memoize their full package index for their
/// lifetime. An instance is never shared between registries.
pub trait EcosystemAdapter: Send + Sync {
    fn registry(&self) -> &RegistryHandle;

    fn ecosystem(&self) -> Ecosystem {
        self.registry().ecosystem
    }

    fn all_package_names(&self) -> Result<Vec<String>>;

    /// Most recently updated first. Callers apply their own limit.
    fn recently_updated_package_names(&self) -> Result<Vec<String>>;

    /// `Ok(None)` when upstream has no package by that name.
    fn package_metadata(&self, name: &str) -> Result<Option<PackageMetadata>>;

    fn versions_metadata(&self, package: &PackageMetadata) -> Result<Vec<VersionMetadata>>;

    /// Never fails. Upstream errors yield an empty list, which leaves the
    /// version eligible for another attempt on the next sync.
    fn dependencies_metadata(
        &self,
        name: &str,
        version: &str,
        package: &PackageMetadata,
    ) -> Vec<DependencyMetadata>;
}

/// Builds the adapter registered for the handle's ecosystem.
pub fn create_adapter(registry: RegistryHandle) -> Box<dyn EcosystemAdapter> {
    match registry.ecosystem {
        Ecosystem::Bower => Box::new(BowerAdapter::new(registry)),
        Ecosystem::Docker => Box::new(DockerAdapter::new(registry)),
    }
}
