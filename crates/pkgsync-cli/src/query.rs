use nu_ansi_term::Color::{Blue, Cyan, Green, LightRed, Magenta};
use pkgsync_core::{
    error::{SyncError, SyncResult},
    lookup::{Lookup, LookupQuery, PingOutcome},
    repo_metadata::{refresh_repo_metadata, ReposServiceClient},
    SyncContext,
};
use pkgsync_db::{
    models::Package,
    repository::{DependencyRepository, RegistryRepository, VersionRepository},
};
use std::sync::Arc;
use tabled::{
    builder::Builder,
    settings::{peaker::PriorityMax, themes::BorderCorrection, Panel, Style, Width},
};
use tracing::{info, warn};

use crate::{
    sync::with_worker_pool,
    utils::{or_dash, term_width, Colored, Icons},
};

fn packages_table(ctx: &SyncContext, packages: &[Package]) -> SyncResult<String> {
    let registries = ctx.db().with_conn(RegistryRepository::list_all)?;
    let registry_name = |id: i32| {
        registries
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.name.clone())
            .unwrap_or_default()
    };

    let mut builder = Builder::new();
    builder.push_record(["Registry", "Name", "Latest", "Versions", "Dependents", "License"]);
    for package in packages {
        builder.push_record([
            registry_name(package.registry_id),
            format!("{}", Colored(Blue, &package.name)),
            format!("{}", Colored(LightRed, or_dash(package.latest_release_number.as_deref()))),
            package.versions_count.to_string(),
            package.dependent_packages_count.to_string(),
            or_dash(package.licenses.as_deref()),
        ]);
    }

    Ok(builder
        .build()
        .with(Style::rounded())
        .with(BorderCorrection {})
        .with(Width::wrap(term_width()).priority(PriorityMax::default()))
        .to_string())
}

pub async fn lookup_packages(ctx: &SyncContext, query: LookupQuery) -> SyncResult<()> {
    let packages = with_worker_pool(ctx, |queue, _| {
        Lookup::new(ctx.clone(), Arc::new(queue.clone())).lookup(&query)
    })
    .await?;

    if packages.is_empty() {
        if query.fills_on_miss() {
            warn!("{} No stored package matches; a sync was requested", Icons::CROSS);
        } else {
            warn!("{} No stored package matches", Icons::CROSS);
        }
        return Ok(());
    }

    for package in &packages {
        info!(
            name = package.name.as_str(),
            ecosystem = package.ecosystem.as_str(),
            versions_count = package.versions_count,
            latest = package.latest_release_number.as_deref(),
            repository_url = package.repository_url.as_deref(),
        );
    }
    info!("\n{}", packages_table(ctx, &packages)?);
    Ok(())
}

pub async fn show_package(ctx: &SyncContext, registry: &str, name: &str) -> SyncResult<()> {
    let found = with_worker_pool(ctx, |queue, _| {
        Lookup::new(ctx.clone(), Arc::new(queue.clone())).find_in_registry(registry, name)
    })
    .await?;
    let Some(package) = found else {
        warn!(registry, package = name, "{} {name} is not stored for {registry}", Icons::CROSS);
        return Ok(());
    };

    let versions = ctx
        .db()
        .with_conn(|conn| VersionRepository::list_for_package(conn, package.id))?;
    let dependencies = ctx
        .db()
        .with_conn(|conn| DependencyRepository::count_for_package(conn, package.id))?;

    let mut builder = Builder::new();
    let rows = [
        ("Name", format!("{}", Colored(Cyan, &package.name))),
        ("Ecosystem", package.ecosystem.clone()),
        ("Description", or_dash(package.description.as_deref())),
        ("Homepage", or_dash(package.homepage.as_deref())),
        ("Repository", or_dash(package.repository_url.as_deref())),
        ("License", or_dash(package.licenses.as_deref())),
        ("Keywords", package.keyword_list().join(", ")),
        (
            "Latest",
            format!("{}", Colored(LightRed, or_dash(package.latest_release_number.as_deref()))),
        ),
        ("Versions", format!("{}", Colored(Green, versions.len()))),
        ("Dependencies", dependencies.to_string()),
        ("Dependents", package.dependent_packages_count.to_string()),
        ("Last synced", or_dash(package.last_synced_at.as_deref())),
    ];
    for (key, value) in rows {
        builder.push_record([key.to_string(), value]);
    }

    let table = builder
        .build()
        .with(Panel::header(format!("{} {}", Icons::PACKAGE, package.name)))
        .with(Style::rounded())
        .with(BorderCorrection {})
        .with(Width::wrap(term_width()).priority(PriorityMax::default()))
        .to_string();

    info!(
        package = package.name.as_str(),
        versions = versions.len(),
        "\n{table}"
    );
    for version in versions.iter().rev().take(10) {
        info!(
            version = version.number.as_str(),
            published_at = version.published_at.as_deref(),
            "  {} {}",
            Colored(Magenta, &version.number),
            or_dash(version.published_at.as_deref())
        );
    }
    Ok(())
}

pub async fn ping_package(ctx: &SyncContext, registry: &str, name: &str) -> SyncResult<()> {
    let outcome = with_worker_pool(ctx, |queue, _| {
        Lookup::new(ctx.clone(), Arc::new(queue.clone())).ping(registry, name)
    })
    .await?;

    match outcome {
        PingOutcome::Known(package) => {
            info!(registry, package = package.name.as_str(), "{} synced {}", Icons::CHECK, package.name)
        }
        PingOutcome::Unknown => {
            info!(registry, package = name, "{} checked {name} upstream", Icons::CHECK)
        }
    }
    Ok(())
}

pub async fn ping_repository(ctx: &SyncContext, url: &str) -> SyncResult<()> {
    let count = with_worker_pool(ctx, |queue, _| {
        Lookup::new(ctx.clone(), Arc::new(queue.clone())).ping_repository(url)
    })
    .await?;
    info!(url, count, "{} synced {count} packages for {url}", Icons::CHECK);
    Ok(())
}

pub async fn refresh_metadata(ctx: &SyncContext, registry: &str, name: &str) -> SyncResult<()> {
    let package = with_worker_pool(ctx, |queue, _| {
        Lookup::new(ctx.clone(), Arc::new(queue.clone())).find_in_registry(registry, name)
    })
    .await?
    .ok_or_else(|| SyncError::Custom(format!("{name} is not stored for {registry}")))?;

    let client = ReposServiceClient::new(ctx.config().repos_api());
    let refreshed = tokio::task::block_in_place(|| refresh_repo_metadata(ctx, &client, package.id))?;
    match refreshed {
        Some(package) => {
            let metadata = package.repo_metadata.unwrap_or_default();
            info!(
                package = package.name.as_str(),
                "{}",
                serde_json::to_string_pretty(&metadata).unwrap_or_default()
            );
        }
        None => warn!(package = name, "no repository metadata available for {name}"),
    }
    Ok(())
}
