//! Esquema Diesel del state store. Las tablas no se califican con schema: cada
//! conexión fija `search_path` al `sqitch_schema` configurado.

diesel::table! {
    steps (step_id) {
        step_id -> Text,
        step -> Text,
        requires -> Array<Text>,
        conflicts -> Array<Text>,
        deployed_by -> Text,
        deployed_at -> Timestamptz,
    }
}

diesel::table! {
    tags (tag_id) {
        tag_id -> Text,
        tag -> Text,
        step_id -> Text,
        applied_by -> Text,
        applied_at -> Timestamptz,
    }
}

// `events` no tiene PK; Diesel exige una para el macro, no se usa en queries.
diesel::table! {
    events (node_id, logged_at) {
        event -> Text,
        node_id -> Text,
        node -> Text,
        logged_by -> Text,
        logged_at -> Timestamptz,
    }
}

diesel::joinable!(tags -> steps (step_id));

diesel::allow_tables_to_appear_in_same_query!(
    steps,
    tags,
    events,
);
