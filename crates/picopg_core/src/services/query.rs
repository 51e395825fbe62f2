//! Ad-hoc query execution.
//!
//! The query text is sent exactly as typed. Results are fully materialized:
//! there is no paging, streaming to the caller, or row limit.

use crate::error::PicoError;
use crate::models::{ColumnInfo, QueryResult, QueryType, ResultRow};
use crate::services::connection::PooledConnection;
use crate::services::values;

use futures_util::TryStreamExt;
use serde_json::Value as JsonValue;
use std::pin::pin;
use std::time::Instant;
use tokio_postgres::{SimpleColumn, SimpleQueryMessage};

/// SQLSTATE for syntax errors; also raised for multi-command text on prepare.
const SYNTAX_ERROR: &str = "42601";

/// Service for executing queries.
pub struct QueryService;

impl QueryService {
    /// Execute `sql` and collect every row.
    ///
    /// Column metadata comes from the prepared statement, so it is present
    /// even when no rows come back. Text holding several commands is run
    /// through the simple query protocol instead; only the last command's
    /// rows and count are returned, and its values are text.
    pub async fn execute(conn: &PooledConnection, sql: &str) -> Result<QueryResult, PicoError> {
        if sql.trim().is_empty() {
            return Err(PicoError::validation("Query is empty"));
        }

        let start = Instant::now();
        let query_type = Self::detect_query_type(sql);

        tracing::debug!(
            connection_id = %conn.connection_id(),
            query_type = ?query_type,
            sql = %truncate_sql(sql, 100),
            "Executing query"
        );

        let statement = match conn.prepare(sql).await {
            Ok(statement) => statement,
            Err(e) if is_multi_command(&e) => {
                tracing::debug!("Falling back to simple query protocol");
                return Self::execute_simple(conn, sql, query_type, start).await;
            }
            Err(e) => return Err(e),
        };

        let columns: Vec<ColumnInfo> = statement
            .columns()
            .iter()
            .map(|col| ColumnInfo {
                name: col.name().to_string(),
                type_name: col.type_().name().to_string(),
            })
            .collect();

        let mut stream = pin!(conn.query_raw(&statement).await?);
        let mut rows = Vec::new();
        while let Some(row) = stream.try_next().await? {
            rows.push(values::row_to_json(&row));
        }
        let row_count = stream.rows_affected().unwrap_or(rows.len() as u64);

        let execution_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            connection_id = %conn.connection_id(),
            execution_time_ms,
            row_count,
            "Query completed"
        );

        Ok(QueryResult { columns, rows, row_count, execution_time_ms, query_type })
    }

    async fn execute_simple(
        conn: &PooledConnection,
        sql: &str,
        query_type: QueryType,
        start: Instant,
    ) -> Result<QueryResult, PicoError> {
        let messages = conn.simple_query(sql).await?;

        let mut columns: Vec<ColumnInfo> = Vec::new();
        let mut rows: Vec<ResultRow> = Vec::new();
        let mut row_count = 0;

        let mut pending_columns: Vec<ColumnInfo> = Vec::new();
        let mut pending_rows: Vec<ResultRow> = Vec::new();

        for message in messages {
            match message {
                SimpleQueryMessage::RowDescription(description) => {
                    pending_columns = text_columns(&description);
                }
                SimpleQueryMessage::Row(row) => {
                    if pending_columns.is_empty() {
                        pending_columns = text_columns(row.columns());
                    }
                    let mut map = ResultRow::new();
                    for (i, col) in row.columns().iter().enumerate() {
                        let value = row.get(i).map(|v| JsonValue::String(v.to_string()));
                        map.insert(col.name().to_string(), value.unwrap_or(JsonValue::Null));
                    }
                    pending_rows.push(map);
                }
                SimpleQueryMessage::CommandComplete(count) => {
                    columns = std::mem::take(&mut pending_columns);
                    rows = std::mem::take(&mut pending_rows);
                    row_count = count;
                }
                _ => {}
            }
        }

        let execution_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            connection_id = %conn.connection_id(),
            execution_time_ms,
            row_count,
            "Multi-statement query completed"
        );

        Ok(QueryResult { columns, rows, row_count, execution_time_ms, query_type })
    }

    /// Detect the type of SQL query.
    pub fn detect_query_type(sql: &str) -> QueryType {
        QueryType::detect(sql)
    }
}

/// Simple-protocol values arrive as text, whatever the column type.
fn text_columns(columns: &[SimpleColumn]) -> Vec<ColumnInfo> {
    columns
        .iter()
        .map(|col| ColumnInfo { name: col.name().to_string(), type_name: "text".to_string() })
        .collect()
}

fn is_multi_command(err: &PicoError) -> bool {
    err.pg_code() == Some(SYNTAX_ERROR) && err.to_string().contains("multiple commands")
}

/// Truncate SQL for logging.
fn truncate_sql(sql: &str, max_chars: usize) -> String {
    let sql = sql.trim();
    match sql.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &sql[..end]),
        None => sql.to_string(),
    }
}
