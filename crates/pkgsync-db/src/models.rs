use diesel::prelude::*;
use serde::Serialize;
use serde_json::Value;

use crate::schema::{dependencies, packages, registries, versions};

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = registries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Registry {
    pub id: i32,
    pub name: String,
    pub url: String,
    pub ecosystem: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = registries)]
pub struct NewRegistry<'a> {
    pub name: &'a str,
    pub url: &'a str,
    pub ecosystem: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = packages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Package {
    pub id: i32,
    pub registry_id: i32,
    pub name: String,
    pub normalized_name: String,
    pub ecosystem: String,
    pub description: Option<String>,
    pub homepage: Option<String>,
    pub repository_url: Option<String>,
    pub licenses: Option<String>,
    pub keywords: Value,
    pub namespace: Option<String>,
    pub metadata: Value,
    pub repo_metadata: Option<Value>,
    pub versions_count: i32,
    pub dependent_packages_count: i32,
    pub latest_release_number: Option<String>,
    pub latest_release_published_at: Option<String>,
    pub first_release_published_at: Option<String>,
    pub last_synced_at: Option<String>,
    pub repo_metadata_updated_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Package {
    pub fn keyword_list(&self) -> Vec<String> {
        self.keywords
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The canonical attributes currently stored for this package.
    pub fn attributes(&self) -> PackageAttributes {
        PackageAttributes {
            normalized_name: self.normalized_name.clone(),
            ecosystem: self.ecosystem.clone(),
            description: self.description.clone(),
            homepage: self.homepage.clone(),
            repository_url: self.repository_url.clone(),
            licenses: self.licenses.clone(),
            keywords: self.keywords.clone(),
            namespace: self.namespace.clone(),
            metadata: self.metadata.clone(),
        }
    }

    pub fn stats(&self) -> PackageStats {
        PackageStats {
            last_synced_at: self.last_synced_at.clone(),
            versions_count: self.versions_count,
            dependent_packages_count: self.dependent_packages_count,
            latest_release_number: self.latest_release_number.clone(),
            latest_release_published_at: self.latest_release_published_at.clone(),
            first_release_published_at: self.first_release_published_at.clone(),
        }
    }
}

/// Upstream-derived package attributes, written by every sync.
#[derive(Debug, Clone, PartialEq, AsChangeset)]
#[diesel(table_name = packages)]
#[diesel(treat_none_as_null = true)]
pub struct PackageAttributes {
    pub normalized_name: String,
    pub ecosystem: String,
    pub description: Option<String>,
    pub homepage: Option<String>,
    pub repository_url: Option<String>,
    pub licenses: Option<String>,
    pub keywords: Value,
    pub namespace: Option<String>,
    pub metadata: Value,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = packages)]
pub struct NewPackage<'a> {
    pub registry_id: i32,
    pub name: &'a str,
    pub normalized_name: &'a str,
    pub ecosystem: &'a str,
    pub description: Option<&'a str>,
    pub homepage: Option<&'a str>,
    pub repository_url: Option<&'a str>,
    pub licenses: Option<&'a str>,
    pub keywords: &'a Value,
    pub namespace: Option<&'a str>,
    pub metadata: &'a Value,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

impl<'a> NewPackage<'a> {
    pub fn from_attributes(
        registry_id: i32,
        name: &'a str,
        attrs: &'a PackageAttributes,
        now: &'a str,
    ) -> Self {
        Self {
            registry_id,
            name,
            normalized_name: &attrs.normalized_name,
            ecosystem: &attrs.ecosystem,
            description: attrs.description.as_deref(),
            homepage: attrs.homepage.as_deref(),
            repository_url: attrs.repository_url.as_deref(),
            licenses: attrs.licenses.as_deref(),
            keywords: &attrs.keywords,
            namespace: attrs.namespace.as_deref(),
            metadata: &attrs.metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Counters and release fields recomputed at the end of a sync.
#[derive(Debug, Clone, PartialEq, AsChangeset)]
#[diesel(table_name = packages)]
#[diesel(treat_none_as_null = true)]
pub struct PackageStats {
    pub last_synced_at: Option<String>,
    pub versions_count: i32,
    pub dependent_packages_count: i32,
    pub latest_release_number: Option<String>,
    pub latest_release_published_at: Option<String>,
    pub first_release_published_at: Option<String>,
}

impl PackageStats {
    /// Equality ignoring `last_synced_at`, which changes on every sync.
    pub fn same_counters(&self, other: &PackageStats) -> bool {
        self.versions_count == other.versions_count
            && self.dependent_packages_count == other.dependent_packages_count
            && self.latest_release_number == other.latest_release_number
            && self.latest_release_published_at == other.latest_release_published_at
            && self.first_release_published_at == other.first_release_published_at
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = versions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Version {
    pub id: i32,
    pub package_id: i32,
    pub number: String,
    pub published_at: Option<String>,
    pub licenses: Option<String>,
    pub integrity: Option<String>,
    pub metadata: Value,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = versions)]
#[diesel(treat_none_as_default_value = false)]
pub struct NewVersion {
    pub package_id: i32,
    pub number: String,
    pub published_at: Option<String>,
    pub licenses: Option<String>,
    pub integrity: Option<String>,
    pub metadata: Value,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = dependencies)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Dependency {
    pub id: i32,
    pub version_id: i32,
    pub package_name: String,
    pub ecosystem: String,
    pub kind: String,
    pub requirements: String,
    pub optional: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = dependencies)]
pub struct NewDependency {
    pub version_id: i32,
    pub package_name: String,
    pub ecosystem: String,
    pub kind: String,
    pub requirements: String,
    pub optional: bool,
    pub created_at: String,
    pub updated_at: String,
}
