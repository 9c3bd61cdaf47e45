use std::collections::HashSet;

use diesel::prelude::*;

use crate::{
    models::{NewVersion, Version},
    schema::{dependencies, versions},
};

/// Rows per statement in the bulk inserts.
pub const INSERT_BATCH_SIZE: usize = 100;

pub struct VersionRepository;

impl VersionRepository {
    pub fn numbers_for_package(
        conn: &mut SqliteConnection,
        package_id: i32,
    ) -> QueryResult<Vec<String>> {
        versions::table
            .filter(versions::package_id.eq(package_id))
            .select(versions::number)
            .load(conn)
    }

    pub fn list_for_package(
        conn: &mut SqliteConnection,
        package_id: i32,
    ) -> QueryResult<Vec<Version>> {
        versions::table
            .filter(versions::package_id.eq(package_id))
            .order(versions::id.asc())
            .select(Version::as_select())
            .load(conn)
    }

    pub fn count_for_package(conn: &mut SqliteConnection, package_id: i32) -> QueryResult<i64> {
        versions::table
            .filter(versions::package_id.eq(package_id))
            .count()
            .get_result(conn)
    }

    /// Ids of the package's versions that already have dependency rows.
    pub fn ids_with_dependencies(
        conn: &mut SqliteConnection,
        package_id: i32,
    ) -> QueryResult<HashSet<i32>> {
        let ids: Vec<i32> = dependencies::table
            .inner_join(versions::table)
            .filter(versions::package_id.eq(package_id))
            .select(dependencies::version_id)
            .distinct()
            .load(conn)?;
        Ok(ids.into_iter().collect())
    }

    /// Inserts versions with one multi-row statement per [`INSERT_BATCH_SIZE`]
    /// rows. Numbers that already exist are skipped. Returns the number inserted.
    pub fn insert_batch(conn: &mut SqliteConnection, rows: &[NewVersion]) -> QueryResult<usize> {
        rows.chunks(INSERT_BATCH_SIZE).try_fold(0, |inserted, chunk| {
            diesel::insert_or_ignore_into(versions::table)
                .values(chunk)
                .execute(conn)
                .map(|n| inserted + n)
        })
    }
}
