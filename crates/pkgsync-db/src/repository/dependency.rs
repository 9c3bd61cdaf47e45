use diesel::prelude::*;

use super::version::INSERT_BATCH_SIZE;
use crate::{
    models::{Dependency, NewDependency},
    schema::{dependencies, versions},
};

pub struct DependencyRepository;

impl DependencyRepository {
    pub fn list_for_version(
        conn: &mut SqliteConnection,
        version_id: i32,
    ) -> QueryResult<Vec<Dependency>> {
        dependencies::table
            .filter(dependencies::version_id.eq(version_id))
            .order(dependencies::id.asc())
            .select(Dependency::as_select())
            .load(conn)
    }

    pub fn count_for_package(conn: &mut SqliteConnection, package_id: i32) -> QueryResult<i64> {
        dependencies::table
            .inner_join(versions::table)
            .filter(versions::package_id.eq(package_id))
            .count()
            .get_result(conn)
    }

    /// Inserts dependency rows, one statement per roughly [`INSERT_BATCH_SIZE`] rows.
    ///
    /// Rows must be grouped by `version_id`. A version's set is never split
    /// across statements, so each version ends up with all of its edges or
    /// none. Duplicate edges are ignored. Returns the number inserted.
    pub fn insert_batch(conn: &mut SqliteConnection, rows: &[NewDependency]) -> QueryResult<usize> {
        batches_by_version(rows, INSERT_BATCH_SIZE)
            .into_iter()
            .try_fold(0, |inserted, batch| {
                diesel::insert_or_ignore_into(dependencies::table)
                    .values(batch)
                    .execute(conn)
                    .map(|n| inserted + n)
            })
    }
}

/// Splits `rows` into slices of about `size` rows on version boundaries.
fn batches_by_version(rows: &[NewDependency], size: usize) -> Vec<&[NewDependency]> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut idx = 0;

    while idx < rows.len() {
        let version_id = rows[idx].version_id;
        let mut end = idx;
        while end < rows.len() && rows[end].version_id == version_id {
            end += 1;
        }
        if end - start > size && idx > start {
            batches.push(&rows[start..idx]);
            start = idx;
        }
        idx = end;
    }
    if start < rows.len() {
        batches.push(&rows[start..]);
    }

    batches
}
