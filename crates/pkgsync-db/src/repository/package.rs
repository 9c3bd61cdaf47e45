use diesel::{dsl::count_distinct, prelude::*};
use serde_json::Value;

use crate::{
    models::{NewPackage, Package, PackageAttributes, PackageStats},
    schema::{dependencies, packages, versions},
};

/// Outcome of [`PackageRepository::upsert`].
#[derive(Debug, Clone)]
pub struct PackageUpsert {
    pub package: Package,
    pub created: bool,
    /// Whether any stored attribute differs from before.
    pub changed: bool,
}

pub struct PackageRepository;

impl PackageRepository {
    pub fn find_by_id(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Package>> {
        packages::table
            .find(id)
            .select(Package::as_select())
            .first(conn)
            .optional()
    }

    pub fn find_by_name(
        conn: &mut SqliteConnection,
        registry_id: i32,
        name: &str,
    ) -> QueryResult<Option<Package>> {
        packages::table
            .filter(packages::registry_id.eq(registry_id))
            .filter(packages::name.eq(name))
            .select(Package::as_select())
            .first(conn)
            .optional()
    }

    pub fn find_by_normalized_name(
        conn: &mut SqliteConnection,
        registry_id: i32,
        normalized_name: &str,
    ) -> QueryResult<Option<Package>> {
        packages::table
            .filter(packages::registry_id.eq(registry_id))
            .filter(packages::normalized_name.eq(normalized_name))
            .order(packages::id.asc())
            .select(Package::as_select())
            .first(conn)
            .optional()
    }

    pub fn existing_names(conn: &mut SqliteConnection, registry_id: i32) -> QueryResult<Vec<String>> {
        packages::table
            .filter(packages::registry_id.eq(registry_id))
            .select(packages::name)
            .load(conn)
    }

    pub fn count_for_registry(conn: &mut SqliteConnection, registry_id: i32) -> QueryResult<i64> {
        packages::table
            .filter(packages::registry_id.eq(registry_id))
            .count()
            .get_result(conn)
    }

    /// Exact-name lookup across registries, optionally restricted to one ecosystem.
    pub fn find_all_by_name(
        conn: &mut SqliteConnection,
        name: &str,
        ecosystem: Option<&str>,
    ) -> QueryResult<Vec<Package>> {
        let mut query = packages::table
            .filter(packages::name.eq(name))
            .into_boxed();

        if let Some(ecosystem) = ecosystem {
            query = query.filter(packages::ecosystem.eq(ecosystem));
        }

        query
            .order(packages::id.asc())
            .select(Package::as_select())
            .load(conn)
    }

    pub fn find_by_repository_url(
        conn: &mut SqliteConnection,
        repository_url: &str,
        limit: i64,
    ) -> QueryResult<Vec<Package>> {
        packages::table
            .filter(packages::repository_url.eq(repository_url))
            .order(packages::id.asc())
            .limit(limit)
            .select(Package::as_select())
            .load(conn)
    }

    /// Creates or updates the package keyed by `(registry_id, name)`.
    ///
    /// Runs in an immediate transaction so concurrent writers serialize on
    /// the row. An unchanged package is returned untouched.
    pub fn upsert(
        conn: &mut SqliteConnection,
        registry_id: i32,
        name: &str,
        attrs: &PackageAttributes,
        now: &str,
    ) -> QueryResult<PackageUpsert> {
        conn.immediate_transaction(|conn| {
            let existing = Self::find_by_name(conn, registry_id, name)?;
            if let Some(package) = existing.as_ref().filter(|p| p.attributes() == *attrs) {
                return Ok(PackageUpsert {
                    package: package.clone(),
                    created: false,
                    changed: false,
                });
            }

            let record = NewPackage::from_attributes(registry_id, name, attrs, now);
            let package = diesel::insert_into(packages::table)
                .values(&record)
                .on_conflict((packages::registry_id, packages::name))
                .do_update()
                .set((attrs, packages::updated_at.eq(now)))
                .returning(Package::as_returning())
                .get_result(conn)?;

            Ok(PackageUpsert {
                package,
                created: existing.is_none(),
                changed: true,
            })
        })
    }

    /// Writes recomputed stats. `updated_at` is bumped only when given.
    pub fn update_stats(
        conn: &mut SqliteConnection,
        id: i32,
        stats: &PackageStats,
        updated_at: Option<&str>,
    ) -> QueryResult<Package> {
        let target = packages::table.find(id);
        match updated_at {
            Some(ts) => {
                diesel::update(target)
                    .set((stats, packages::updated_at.eq(ts)))
                    .returning(Package::as_returning())
                    .get_result(conn)
            }
            None => {
                diesel::update(target)
                    .set(stats)
                    .returning(Package::as_returning())
                    .get_result(conn)
            }
        }
    }

    pub fn update_repo_metadata(
        conn: &mut SqliteConnection,
        id: i32,
        repo_metadata: &Value,
        now: &str,
    ) -> QueryResult<Package> {
        diesel::update(packages::table.find(id))
            .set((
                packages::repo_metadata.eq(Some(repo_metadata)),
                packages::repo_metadata_updated_at.eq(Some(now)),
            ))
            .returning(Package::as_returning())
            .get_result(conn)
    }

    /// Distinct packages in the registry with at least one version depending on `name`.
    pub fn dependent_packages_count(
        conn: &mut SqliteConnection,
        registry_id: i32,
        name: &str,
    ) -> QueryResult<i64> {
        packages::table
            .inner_join(versions::table.inner_join(dependencies::table))
            .filter(packages::registry_id.eq(registry_id))
            .filter(dependencies::package_name.eq(name))
            .select(count_distinct(packages::id))
            .get_result(conn)
    }
}
