//! Schema introspection service.
//!
//! Queries `pg_catalog` and `information_schema` to describe databases,
//! tables and columns. Nothing is cached; every call goes to the server.

use std::collections::HashSet;

use crate::error::PicoError;
use crate::models::{ColumnDetail, DatabaseInfo, QueryResult, TableInfo};
use crate::services::connection::PooledConnection;
use crate::services::query::QueryService;

/// Schema used when the caller does not name one.
pub const DEFAULT_SCHEMA: &str = "public";

/// Rows shown by a table preview when no limit is given.
pub const DEFAULT_PREVIEW_LIMIT: u32 = 100;

/// Schema introspection service.
pub struct SchemaService;

impl SchemaService {
    /// List non-template databases on the server.
    pub async fn list_databases(conn: &PooledConnection) -> Result<Vec<DatabaseInfo>, PicoError> {
        tracing::debug!(connection_id = %conn.connection_id(), "Listing databases");
        let rows = conn
            .query(
                r#"
                SELECT datname::text AS name
                FROM pg_catalog.pg_database
                WHERE datistemplate = false
                ORDER BY datname
                "#,
                &[],
            )
            .await?;

        Ok(rows.into_iter().map(|row| DatabaseInfo { name: row.get("name") }).collect())
    }

    /// List user tables with their row estimate and columns.
    pub async fn list_tables(conn: &PooledConnection) -> Result<Vec<TableInfo>, PicoError> {
        tracing::debug!(connection_id = %conn.connection_id(), "Listing tables");
        let rows = conn
            .query(
                r#"
                SELECT
                    t.schemaname::text AS schema,
                    t.tablename::text AS name,
                    c.reltuples::bigint AS estimated_rows
                FROM pg_catalog.pg_tables t
                LEFT JOIN pg_catalog.pg_namespace n ON n.nspname = t.schemaname
                LEFT JOIN pg_catalog.pg_class c
                    ON c.relnamespace = n.oid AND c.relname = t.tablename
                WHERE t.schemaname NOT IN ('pg_catalog', 'information_schema')
                ORDER BY t.schemaname, t.tablename
                "#,
                &[],
            )
            .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let schema: String = row.get("schema");
            let name: String = row.get("name");
            // -1 means never vacuumed or analyzed
            let row_count = row.get::<_, Option<i64>>("estimated_rows").filter(|n| *n >= 0);
            let columns = Self::table_columns(conn, &schema, &name).await?;
            tables.push(TableInfo { schema, name, row_count, columns });
        }

        tracing::debug!(connection_id = %conn.connection_id(), count = tables.len(), "Tables listed");
        Ok(tables)
    }

    /// Columns of one table in ordinal order, with key flags.
    ///
    /// An unknown table yields an empty list.
    pub async fn table_columns(
        conn: &PooledConnection,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnDetail>, PicoError> {
        let rows = conn
            .query(
                r#"
                SELECT
                    column_name::text AS name,
                    data_type::text AS data_type,
                    is_nullable::text = 'YES' AS is_nullable,
                    column_default::text AS default_value
                FROM information_schema.columns
                WHERE table_schema::text = $1
                  AND table_name::text = $2
                ORDER BY ordinal_position
                "#,
                &[&schema, &table],
            )
            .await?;

        let primary_keys = Self::constraint_columns(conn, schema, table, "PRIMARY KEY").await?;
        let foreign_keys = Self::constraint_columns(conn, schema, table, "FOREIGN KEY").await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let name: String = row.get("name");
                ColumnDetail {
                    is_primary_key: primary_keys.contains(&name),
                    is_foreign_key: foreign_keys.contains(&name),
                    data_type: row.get("data_type"),
                    is_nullable: row.get("is_nullable"),
                    default_value: row.get("default_value"),
                    name,
                }
            })
            .collect())
    }

    async fn constraint_columns(
        conn: &PooledConnection,
        schema: &str,
        table: &str,
        constraint_type: &str,
    ) -> Result<HashSet<String>, PicoError> {
        let rows = conn
            .query(
                r#"
                SELECT kcu.column_name::text AS name
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                    ON tc.constraint_name = kcu.constraint_name
                   AND tc.table_schema = kcu.table_schema
                   AND tc.table_name = kcu.table_name
                WHERE tc.constraint_type::text = $1
                  AND tc.table_schema::text = $2
                  AND tc.table_name::text = $3
                "#,
                &[&constraint_type, &schema, &table],
            )
            .await?;

        Ok(rows.into_iter().map(|row| row.get("name")).collect())
    }

    /// First `limit` rows of a table, in server order.
    pub async fn preview_table(
        conn: &PooledConnection,
        schema: &str,
        table: &str,
        limit: u32,
    ) -> Result<QueryResult, PicoError> {
        if table.is_empty() {
            return Err(PicoError::validation("Table name is required"));
        }
        tracing::debug!(connection_id = %conn.connection_id(), schema, table, limit, "Previewing table");
        QueryService::execute(conn, &preview_sql(schema, table, limit)).await
    }
}

/// Quote an identifier so it is used verbatim, whatever its case or characters.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn preview_sql(schema: &str, table: &str, limit: u32) -> String {
    format!("SELECT * FROM {}.{} LIMIT {limit}", quote_ident(schema), quote_ident(table))
}
