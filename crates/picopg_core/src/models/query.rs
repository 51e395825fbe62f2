//! Query execution models.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Type of SQL query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryType {
    /// SELECT query returning rows
    Select,
    /// INSERT operation
    Insert,
    /// UPDATE operation
    Update,
    /// DELETE operation
    Delete,
    /// DDL, COPY, or other operations
    Other,
}

impl QueryType {
    /// Detect the type of SQL query from its leading keyword.
    pub fn detect(sql: &str) -> Self {
        let keyword = sql
            .trim_start()
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or_default()
            .to_uppercase();

        match keyword.as_str() {
            "SELECT" | "WITH" | "VALUES" | "TABLE" | "SHOW" => Self::Select,
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            _ => Self::Other,
        }
    }
}

/// Column metadata from query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Human-readable type name
    pub type_name: String,
}

/// One result row: column name to value.
pub type ResultRow = Map<String, Value>;

/// Results from query execution.
///
/// The whole result set is materialized; there is no paging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// Column metadata, in result order
    pub columns: Vec<ColumnInfo>,
    /// Result rows, in result order
    pub rows: Vec<ResultRow>,
    /// Rows returned or affected, as reported by the server
    pub row_count: u64,
    /// Time to execute in milliseconds
    pub execution_time_ms: u64,
    /// Type of query
    pub query_type: QueryType,
}

impl QueryResult {
    /// Get the number of rows returned.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_query_type() {
        assert_eq!(QueryType::detect("  select 1"), QueryType::Select);
        assert_eq!(QueryType::detect("WITH t AS (SELECT 1) SELECT * FROM t"), QueryType::Select);
        assert_eq!(QueryType::detect("insert into t values (1)"), QueryType::Insert);
        assert_eq!(QueryType::detect("UPDATE t SET a = 1"), QueryType::Update);
        assert_eq!(QueryType::detect("delete from t"), QueryType::Delete);
        assert_eq!(QueryType::detect("CREATE TABLE t (a int)"), QueryType::Other);
        assert_eq!(QueryType::detect(""), QueryType::Other);
        assert_eq!(QueryType::detect("(select 1)"), QueryType::Other);
    }

    #[test]
    fn test_column_names_keep_order() {
        let result = QueryResult {
            columns: vec![
                ColumnInfo { name: "id".into(), type_name: "int4".into() },
                ColumnInfo { name: "name".into(), type_name: "text".into() },
            ],
            rows: Vec::new(),
            row_count: 0,
            execution_time_ms: 1,
            query_type: QueryType::Select,
        };
        assert_eq!(result.column_names(), vec!["id", "name"]);
        assert!(result.is_empty());
    }

    #[test]
    fn test_result_json_is_camel_case() {
        let result = QueryResult {
            columns: vec![ColumnInfo { name: "id".into(), type_name: "int4".into() }],
            rows: Vec::new(),
            row_count: 0,
            execution_time_ms: 3,
            query_type: QueryType::Select,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["columns"][0]["typeName"], "int4");
        assert!(json["columns"][0].get("type_name").is_none());
        assert_eq!(json["rowCount"], 0);
        assert_eq!(json["executionTimeMs"], 3);
    }
}
