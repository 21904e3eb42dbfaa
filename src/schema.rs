// Table definitions mirror the DDL in `db::STORE_SCHEMA_SQL` and `db::CACHE_SCHEMA_SQL`.

diesel::table! {
    tasks (id) {
        id -> Text,
        seq -> BigInt,
        task_type -> Text,
        args -> Text,
        status -> Text,
        result -> Nullable<Text>,
        error -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    companies (name) {
        name -> Text,
        details -> Text,
        initial_message -> Nullable<Text>,
        reply_message -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    cache_entries (stage, function_name, fingerprint) {
        stage -> Integer,
        function_name -> Text,
        fingerprint -> Text,
        value -> Text,
        created_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(tasks, companies, cache_entries,);
