use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// The closed set of upstream ecosystems pkgsync knows how to sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Bower,
    Docker,
}

impl Ecosystem {
    pub const ALL: [Ecosystem; 2] = [Ecosystem::Bower, Ecosystem::Docker];

    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Bower => "bower",
            Ecosystem::Docker => "docker",
        }
    }

    /// Rewrites a user-supplied name into the form stored upstream.
    ///
    /// Docker images without a namespace live under `library/`.
    pub fn canonical_name(&self, name: &str) -> String {
        match self {
            Ecosystem::Docker if !name.contains('/') => format!("library/{name}"),
            _ => name.to_string(),
        }
    }

    /// Case and shape folding used for fallback lookups and the
    /// `normalized_name` column.
    pub fn normalize_name(&self, name: &str) -> String {
        match self {
            Ecosystem::Bower => name.trim().to_lowercase(),
            Ecosystem::Docker => self.canonical_name(name.trim()).to_lowercase(),
        }
    }

    pub fn from_purl_type(purl_type: &str) -> Option<Ecosystem> {
        match purl_type.to_ascii_lowercase().as_str() {
            "bower" => Some(Ecosystem::Bower),
            "docker" => Some(Ecosystem::Docker),
            _ => None,
        }
    }

    /// Separator between a purl namespace and name when building a package name.
    pub fn purl_namespace_separator(&self) -> &'static str {
        "/"
    }

    /// Joins purl components into a package name for this ecosystem.
    pub fn name_from_purl(&self, namespace: Option<&str>, name: &str) -> String {
        match namespace.filter(|ns| !ns.is_empty()) {
            Some(ns) => format!("{ns}{}{name}", self.purl_namespace_separator()),
            None => name.to_string(),
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ecosystem {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bower" => Ok(Ecosystem::Bower),
            "docker" => Ok(Ecosystem::Docker),
            _ => Err(RegistryError::UnknownEcosystem(s.to_string())),
        }
    }
}
