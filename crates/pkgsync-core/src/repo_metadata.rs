//! Auxiliary repository metadata (stars, forks, ...) fetched from a repos service.

use chrono::Utc;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use pkgsync_db::{
    models::Package, now_timestamp, parse_timestamp, repository::PackageRepository,
};
use pkgsync_registry::http::get_json_optional;
use pkgsync_utils::time::RefreshInterval;
use serde_json::Value;
use tracing::{debug, info};

use crate::{context::SyncContext, error::SyncResult};

pub trait RepoMetadataProvider: Send + Sync {
    /// `Ok(None)` when the service does not know the repository.
    fn fetch(&self, repository_url: &str) -> SyncResult<Option<Value>>;
}

pub struct ReposServiceClient {
    base_url: String,
}

impl ReposServiceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn lookup_url(&self, repository_url: &str) -> String {
        format!(
            "{}/api/v1/repositories/lookup?url={}",
            self.base_url,
            utf8_percent_encode(repository_url, NON_ALPHANUMERIC)
        )
    }
}

impl RepoMetadataProvider for ReposServiceClient {
    fn fetch(&self, repository_url: &str) -> SyncResult<Option<Value>> {
        Ok(get_json_optional(&self.lookup_url(repository_url))?)
    }
}

/// Whether a synced package should have its repository metadata fetched again.
pub fn repo_metadata_due(package: &Package, interval: RefreshInterval) -> bool {
    if package.repository_url.is_none() {
        return false;
    }
    match package
        .repo_metadata_updated_at
        .as_deref()
        .and_then(parse_timestamp)
    {
        None => true,
        Some(at) => interval.is_stale((Utc::now() - at).to_std().unwrap_or_default()),
    }
}

/// Fetches and stores repository metadata for a package.
///
/// Returns `None` when the package is gone, has no repository URL, or the
/// service has nothing for it; stored metadata is left as is in those cases.
pub fn refresh_repo_metadata(
    ctx: &SyncContext,
    provider: &dyn RepoMetadataProvider,
    package_id: i32,
) -> SyncResult<Option<Package>> {
    let db = ctx.db();
    let Some(package) = db.with_conn(|conn| PackageRepository::find_by_id(conn, package_id))? else {
        debug!(package_id, "package no longer exists");
        return Ok(None);
    };
    let Some(url) = package.repository_url.as_deref() else {
        return Ok(None);
    };

    let Some(metadata) = provider.fetch(url)? else {
        debug!(package = %package.name, url, "no repository metadata");
        return Ok(None);
    };

    let now = now_timestamp();
    let updated =
        db.with_conn(|conn| PackageRepository::update_repo_metadata(conn, package.id, &metadata, &now))?;
    info!(package = %updated.name, url, "refreshed repository metadata");
    Ok(Some(updated))
}
