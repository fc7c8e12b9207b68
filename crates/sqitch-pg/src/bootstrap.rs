//! Creación del state store dentro de la base destino.
//!
//! El DDL completo corre en una sola transacción (Postgres soporta DDL
//! transaccional): o queda el schema con sus tres tablas, o no queda nada.

use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{Bool, Text};

use crate::error::PgStoreError;

#[derive(QueryableByName, Debug)]
struct SchemaPresence {
    #[diesel(sql_type = Bool)]
    present: bool,
}

/// Cita un identificador SQL (`"meta"`, `"we""ird"`).
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn schema_exists(conn: &mut PgConnection, schema: &str) -> Result<bool, diesel::result::Error> {
    let row: SchemaPresence =
        diesel::sql_query("SELECT EXISTS(SELECT 1 FROM pg_catalog.pg_namespace WHERE nspname = $1) AS present")
            .bind::<Text, _>(schema)
            .get_result(conn)?;
    Ok(row.present)
}

pub fn set_search_path(conn: &mut PgConnection, schema: &str) -> Result<(), diesel::result::Error> {
    conn.batch_execute(&format!("SET search_path = {}", quote_ident(schema)))
}

/// DDL del state store; `events.event` restringido a los cinco tipos.
pub fn schema_ddl(schema: &str) -> String {
    let s = quote_ident(schema);
    format!(r#"
CREATE SCHEMA {s};

COMMENT ON SCHEMA {s} IS 'Sqitch database deployment metadata.';

CREATE TABLE {s}.steps (
    step_id     TEXT        PRIMARY KEY,
    step        TEXT        NOT NULL,
    requires    TEXT[]      NOT NULL DEFAULT '{{}}',
    conflicts   TEXT[]      NOT NULL DEFAULT '{{}}',
    deployed_by TEXT        NOT NULL,
    deployed_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
);

COMMENT ON TABLE {s}.steps IS 'Tracks the steps currently deployed to the database.';

CREATE TABLE {s}.tags (
    tag_id     TEXT        PRIMARY KEY,
    tag        TEXT        NOT NULL UNIQUE,
    step_id    TEXT        NOT NULL REFERENCES {s}.steps(step_id),
    applied_by TEXT        NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
);

COMMENT ON TABLE {s}.tags IS 'Tracks the tags currently applied to the database.';

CREATE TABLE {s}.events (
    event     TEXT        NOT NULL CHECK (event IN ('deploy', 'revert', 'fail', 'apply', 'remove')),
    node_id   TEXT        NOT NULL,
    node      TEXT        NOT NULL,
    logged_by TEXT        NOT NULL,
    logged_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
);

CREATE INDEX events_logged_at_idx ON {s}.events (logged_at);

COMMENT ON TABLE {s}.events IS 'Append-only log of every deployment event.';

SET search_path = {s};
"#)
}

/// Crea el schema completo; `SchemaExists` si ya existe.
pub fn create_state_store(conn: &mut PgConnection, schema: &str) -> Result<(), PgStoreError> {
    conn.build_transaction().read_write().run(|tx| {
                                             if schema_exists(tx, schema)? {
                                                 return Err(PgStoreError::SchemaExists(schema.to_string()));
                                             }
                                             tx.batch_execute(&schema_ddl(schema))?;
                                             Ok(())
                                         })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("meta"), "\"meta\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn ddl_targets_configured_schema() {
        let ddl = schema_ddl("meta");
        assert!(ddl.contains("CREATE SCHEMA \"meta\";"));
        assert!(ddl.contains("CREATE TABLE \"meta\".steps"));
        assert!(ddl.contains("REFERENCES \"meta\".steps(step_id)"));
        assert!(ddl.contains("DEFAULT '{}'"));
        assert!(ddl.trim_end().ends_with("SET search_path = \"meta\";"));
    }
}
