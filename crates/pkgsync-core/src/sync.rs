//! Per-package sync pipeline.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use pkgsync_db::{
    format_timestamp, now_timestamp, parse_timestamp,
    models::{NewDependency, NewVersion, Package, PackageAttributes, PackageStats, Version},
    repository::{DependencyRepository, PackageRepository, VersionRepository},
};
use pkgsync_registry::{EcosystemAdapter, PackageMetadata, VersionMetadata};
use serde_json::Value;
use tracing::{debug, info, trace};

use crate::{context::SyncContext, error::SyncResult};

#[derive(Debug, Clone)]
pub struct SyncedPackage {
    pub package: Package,
    pub new_versions: usize,
    pub new_dependencies: usize,
}

#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// Upstream has no package by that name. Nothing was written.
    NotFound,
    Synced(SyncedPackage),
}

impl SyncOutcome {
    pub fn package(&self) -> Option<&Package> {
        match self {
            SyncOutcome::NotFound => None,
            SyncOutcome::Synced(synced) => Some(&synced.package),
        }
    }
}

/// Brings one package's stored rows up to date with its upstream registry.
#[derive(Clone)]
pub struct SyncEngine {
    ctx: SyncContext,
}

impl SyncEngine {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Syncs `name` from the adapter's registry.
    ///
    /// Re-running with unchanged upstream data inserts nothing and leaves the
    /// counters and `updated_at` untouched; only `last_synced_at` moves.
    /// Both upstream fetches happen before the first write, so an error from
    /// `package_metadata` or `versions_metadata` leaves the store untouched.
    pub fn sync_package(&self, adapter: &dyn EcosystemAdapter, name: &str) -> SyncResult<SyncOutcome> {
        let registry = adapter.registry();
        let ecosystem = adapter.ecosystem();
        let db = self.ctx.db();

        let Some(meta) = adapter.package_metadata(name)? else {
            debug!(registry = %registry.name, package = name, "package not found upstream");
            return Ok(SyncOutcome::NotFound);
        };

        let upstream = adapter.versions_metadata(&meta)?;

        let attrs = package_attributes(adapter, &meta);
        let now = now_timestamp();
        let upsert = db.with_conn(|conn| {
            PackageRepository::upsert(conn, registry.id, &meta.name, &attrs, &now)
        })?;
        let package = upsert.package;
        trace!(
            package = %package.name,
            created = upsert.created,
            changed = upsert.changed,
            "upserted package"
        );

        let stored: HashSet<String> = db
            .with_conn(|conn| VersionRepository::numbers_for_package(conn, package.id))?
            .into_iter()
            .collect();
        let delta = version_delta(upstream, &stored);

        let now = now_timestamp();
        let rows: Vec<NewVersion> = delta
            .into_iter()
            .map(|version| new_version(package.id, version, &now))
            .collect();
        let new_versions = db.with_conn(|conn| VersionRepository::insert_batch(conn, &rows))?;

        let versions = db.with_conn(|conn| VersionRepository::list_for_package(conn, package.id))?;
        let with_deps = db.with_conn(|conn| VersionRepository::ids_with_dependencies(conn, package.id))?;
        // Versions still without dependency rows, new ones included. Fetches
        // that came back empty last time are retried here.
        let pending: Vec<&Version> = versions
            .iter()
            .filter(|version| !with_deps.contains(&version.id))
            .collect();

        let mut new_dependencies = 0;
        if !pending.is_empty() {
            let now = now_timestamp();
            let mut rows = Vec::new();
            for version in pending {
                let deps = adapter.dependencies_metadata(&meta.name, &version.number, &meta);
                if deps.is_empty() {
                    trace!(package = %meta.name, version = %version.number, "no dependencies");
                    continue;
                }
                rows.extend(deps.into_iter().map(|dep| {
                    NewDependency {
                        version_id: version.id,
                        package_name: dep.package_name,
                        ecosystem: dep.ecosystem.to_string(),
                        kind: dep.kind,
                        requirements: dep.requirements,
                        optional: dep.optional,
                        created_at: now.clone(),
                        updated_at: now.clone(),
                    }
                }));
            }
            if !rows.is_empty() {
                new_dependencies =
                    db.with_conn(|conn| DependencyRepository::insert_batch(conn, &rows))?;
            }
        }

        let dependents = db.with_conn(|conn| {
            PackageRepository::dependent_packages_count(conn, registry.id, &package.name)
        })?;
        let now = now_timestamp();
        let stats = compute_stats(&versions, dependents, &now);
        let touched = upsert.changed || !stats.same_counters(&package.stats());
        let package = db.with_conn(|conn| {
            PackageRepository::update_stats(conn, package.id, &stats, touched.then_some(now.as_str()))
        })?;

        info!(
            registry = %registry.name,
            ecosystem = %ecosystem,
            package = %package.name,
            new_versions,
            new_dependencies,
            "synced {}",
            package.name
        );

        Ok(SyncOutcome::Synced(SyncedPackage {
            package,
            new_versions,
            new_dependencies,
        }))
    }
}

fn package_attributes(adapter: &dyn EcosystemAdapter, meta: &PackageMetadata) -> PackageAttributes {
    let ecosystem = adapter.ecosystem();
    PackageAttributes {
        normalized_name: ecosystem.normalize_name(&meta.name),
        ecosystem: ecosystem.to_string(),
        description: meta.description.clone(),
        homepage: meta.homepage.clone(),
        repository_url: meta.repository_url.clone(),
        licenses: meta.licenses.clone(),
        keywords: Value::from(meta.keywords.clone()),
        namespace: meta.namespace.clone(),
        metadata: meta.metadata.clone(),
    }
}

/// Upstream versions whose number is not stored yet, first occurrence wins.
fn version_delta(upstream: Vec<VersionMetadata>, stored: &HashSet<String>) -> Vec<VersionMetadata> {
    let mut seen = HashSet::new();
    upstream
        .into_iter()
        .filter(|version| !stored.contains(&version.number))
        .filter(|version| seen.insert(version.number.clone()))
        .collect()
}

fn new_version(package_id: i32, version: VersionMetadata, now: &str) -> NewVersion {
    NewVersion {
        package_id,
        number: version.number,
        published_at: version.published_at.map(format_timestamp),
        licenses: version.licenses,
        integrity: version.integrity,
        metadata: version.metadata,
        created_at: now.to_string(),
        updated_at: now.to_string(),
    }
}

fn compute_stats(versions: &[Version], dependents: i64, now: &str) -> PackageStats {
    let published: Vec<(DateTime<Utc>, &Version)> = versions
        .iter()
        .filter_map(|v| {
            v.published_at
                .as_deref()
                .and_then(parse_timestamp)
                .map(|at| (at, v))
        })
        .collect();

    let latest = latest_release(versions, &published);
    let first_release_published_at = published
        .iter()
        .min_by_key(|(at, _)| *at)
        .map(|(at, _)| format_timestamp(*at));

    PackageStats {
        last_synced_at: Some(now.to_string()),
        versions_count: i32::try_from(versions.len()).unwrap_or(i32::MAX),
        dependent_packages_count: i32::try_from(dependents).unwrap_or(i32::MAX),
        latest_release_number: latest.map(|v| v.number.clone()),
        latest_release_published_at: latest.and_then(|v| v.published_at.clone()),
        first_release_published_at,
    }
}

/// Newest by publish time, else highest semver, else the last stored row.
fn latest_release<'a>(
    versions: &'a [Version],
    published: &[(DateTime<Utc>, &'a Version)],
) -> Option<&'a Version> {
    if let Some((_, version)) = published.iter().max_by_key(|(at, v)| (*at, v.id)) {
        return Some(version);
    }

    versions
        .iter()
        .filter_map(|v| parse_semver(&v.number).map(|parsed| (parsed, v)))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, v)| v)
        .or_else(|| versions.last())
}

fn parse_semver(number: &str) -> Option<semver::Version> {
    let trimmed = number.strip_prefix('v').unwrap_or(number);
    semver::Version::parse(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn version(id: i32, number: &str, published_at: Option<&str>) -> Version {
        Version {
            id,
            package_id: 1,
            number: number.into(),
            published_at: published_at.map(String::from),
            licenses: None,
            integrity: None,
            metadata: json!({}),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_version_delta_dedupes_and_skips_stored() {
        let stored: HashSet<String> = ["1.0.0".to_string()].into();
        let upstream = vec![
            VersionMetadata::new("1.0.0"),
            VersionMetadata::new("2.0.0"),
            VersionMetadata::new("2.0.0"),
            VersionMetadata::new("2.0.0-rc.1"),
        ];

        let numbers: Vec<_> = version_delta(upstream, &stored)
            .into_iter()
            .map(|v| v.number)
            .collect();
        assert_eq!(numbers, vec!["2.0.0", "2.0.0-rc.1"]);
    }

    #[test]
    fn test_latest_release_prefers_publish_time() {
        let versions = vec![
            version(1, "2.0.0", Some("2024-01-01T00:00:00.000000Z")),
            version(2, "1.5.0", Some("2024-06-01T00:00:00.000000Z")),
            version(3, "3.0.0", None),
        ];
        let stats = compute_stats(&versions, 0, "now");
        assert_eq!(stats.latest_release_number.as_deref(), Some("1.5.0"));
        assert_eq!(
            stats.first_release_published_at.as_deref(),
            Some("2024-01-01T00:00:00.000000Z")
        );
        assert_eq!(stats.versions_count, 3);
    }

    #[test]
    fn test_latest_release_falls_back_to_semver_then_last_row() {
        let versions = vec![
            version(1, "v1.10.0", None),
            version(2, "1.9.0", None),
            version(3, "latest", None),
        ];
        let stats = compute_stats(&versions, 2, "now");
        assert_eq!(stats.latest_release_number.as_deref(), Some("v1.10.0"));
        assert_eq!(stats.dependent_packages_count, 2);
        assert!(stats.latest_release_published_at.is_none());

        let tags = vec![version(1, "latest", None), version(2, "alpine", None)];
        let stats = compute_stats(&tags, 0, "now");
        assert_eq!(stats.latest_release_number.as_deref(), Some("alpine"));

        assert!(compute_stats(&[], 0, "now").latest_release_number.is_none());
    }
}
