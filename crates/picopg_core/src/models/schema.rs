//! Schema introspection models.
//!
//! Data structures describing PostgreSQL objects for the table browser.
//! They are read fresh on every request and never cached.

use serde::{Deserialize, Serialize};

/// A database on the connected server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    /// Database name.
    pub name: String,
}

/// A PostgreSQL table with its columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    /// Schema name containing this table.
    pub schema: String,
    /// Table name.
    pub name: String,
    /// Planner row estimate, when the table has been analyzed.
    pub row_count: Option<i64>,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnDetail>,
}

impl TableInfo {
    /// `schema.table`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Names of the primary key columns, in ordinal order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns.iter().filter(|c| c.is_primary_key).map(|c| c.name.as_str()).collect()
    }
}

/// A PostgreSQL column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDetail {
    /// Column name.
    pub name: String,
    /// Data type as reported by `information_schema` (e.g., "integer").
    pub data_type: String,
    /// Whether the column allows NULL values.
    pub is_nullable: bool,
    /// Whether this column is part of the primary key.
    pub is_primary_key: bool,
    /// Whether this column takes part in a foreign key.
    pub is_foreign_key: bool,
    /// Default value expression, if any.
    pub default_value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, pk: bool) -> ColumnDetail {
        ColumnDetail {
            name: name.to_string(),
            data_type: "integer".to_string(),
            is_nullable: !pk,
            is_primary_key: pk,
            is_foreign_key: false,
            default_value: None,
        }
    }

    #[test]
    fn test_qualified_name_and_primary_key() {
        let table = TableInfo {
            schema: "public".to_string(),
            name: "order_items".to_string(),
            row_count: None,
            columns: vec![column("order_id", true), column("qty", false), column("line", true)],
        };
        assert_eq!(table.qualified_name(), "public.order_items");
        assert_eq!(table.primary_key(), vec!["order_id", "line"]);
    }
}
