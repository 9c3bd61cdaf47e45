use diesel::prelude::*;

use crate::{
    models::{NewRegistry, Registry},
    schema::registries,
};

pub struct RegistryRepository;

impl RegistryRepository {
    /// Inserts the registry or refreshes its URL and ecosystem, keyed by name.
    pub fn upsert(conn: &mut SqliteConnection, registry: &NewRegistry) -> QueryResult<Registry> {
        diesel::insert_into(registries::table)
            .values(registry)
            .on_conflict(registries::name)
            .do_update()
            .set((
                registries::url.eq(registry.url),
                registries::ecosystem.eq(registry.ecosystem),
                registries::updated_at.eq(registry.updated_at),
            ))
            .returning(Registry::as_returning())
            .get_result(conn)
    }

    pub fn list_all(conn: &mut SqliteConnection) -> QueryResult<Vec<Registry>> {
        registries::table
            .order(registries::id.asc())
            .select(Registry::as_select())
            .load(conn)
    }

    pub fn find_by_id(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Registry>> {
        registries::table
            .find(id)
            .select(Registry::as_select())
            .first(conn)
            .optional()
    }

    pub fn find_by_name(conn: &mut SqliteConnection, name: &str) -> QueryResult<Option<Registry>> {
        registries::table
            .filter(registries::name.eq(name))
            .select(Registry::as_select())
            .first(conn)
            .optional()
    }

    /// The oldest registry serving `ecosystem`.
    pub fn find_by_ecosystem(
        conn: &mut SqliteConnection,
        ecosystem: &str,
    ) -> QueryResult<Option<Registry>> {
        registries::table
            .filter(registries::ecosystem.eq(ecosystem))
            .order(registries::id.asc())
            .select(Registry::as_select())
            .first(conn)
            .optional()
    }
}
