diesel::table! {
    registries (id) {
        id -> Integer,
        name -> Text,
        url -> Text,
        ecosystem -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    packages (id) {
        id -> Integer,
        registry_id -> Integer,
        name -> Text,
        normalized_name -> Text,
        ecosystem -> Text,
        description -> Nullable<Text>,
        homepage -> Nullable<Text>,
        repository_url -> Nullable<Text>,
        licenses -> Nullable<Text>,
        keywords -> Jsonb,
        namespace -> Nullable<Text>,
        metadata -> Jsonb,
        repo_metadata -> Nullable<Jsonb>,
        versions_count -> Integer,
        dependent_packages_count -> Integer,
        latest_release_number -> Nullable<Text>,
        latest_release_published_at -> Nullable<Text>,
        first_release_published_at -> Nullable<Text>,
        last_synced_at -> Nullable<Text>,
        repo_metadata_updated_at -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    versions (id) {
        id -> Integer,
        package_id -> Integer,
        number -> Text,
        published_at -> Nullable<Text>,
        licenses -> Nullable<Text>,
        integrity -> Nullable<Text>,
        metadata -> Jsonb,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    dependencies (id) {
        id -> Integer,
        version_id -> Integer,
        package_name -> Text,
        ecosystem -> Text,
        kind -> Text,
        requirements -> Text,
        optional -> Bool,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::joinable!(packages -> registries (registry_id));
diesel::joinable!(versions -> packages (package_id));
diesel::joinable!(dependencies -> versions (version_id));

diesel::allow_tables_to_appear_in_same_query!(registries, packages, versions, dependencies,);
