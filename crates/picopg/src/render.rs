//! Text and JSON rendering of results.

use picopg_core::{ColumnDetail, ConnectionProfile, DatabaseInfo, QueryResult, QueryType, TableInfo};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Aligned text table in the style of psql.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let mut out = String::new();
    out.push_str(&padded_line(headers.iter().copied(), &widths));
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
    out.push_str(&rule.join("+"));
    out.push('\n');
    for row in rows {
        out.push_str(&padded_line(row.iter().map(String::as_str), &widths));
        out.push('\n');
    }
    out.push_str(&match rows.len() {
        1 => "(1 row)".to_string(),
        n => format!("({n} rows)"),
    });
    out
}

fn padded_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, width)| format!(" {:<width$} ", cell, width = *width))
        .collect();
    padded.join("|").trim_end().to_string()
}

/// Display text for one result value.
pub fn cell(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn query_result(result: &QueryResult) -> String {
    let timing = format!("Time: {} ms", result.execution_time_ms);
    if result.columns.is_empty() {
        let summary = match result.query_type {
            QueryType::Insert => format!("INSERT {}", result.row_count),
            QueryType::Update => format!("UPDATE {}", result.row_count),
            QueryType::Delete => format!("DELETE {}", result.row_count),
            QueryType::Select | QueryType::Other => "OK".to_string(),
        };
        return format!("{summary}\n{timing}");
    }

    let headers = result.column_names();
    let rows: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| headers.iter().map(|h| row.get(*h).map(cell).unwrap_or_default()).collect())
        .collect();
    format!("{}\n{timing}", table(&headers, &rows))
}

pub fn profiles(profiles: &[ConnectionProfile]) -> String {
    let rows: Vec<Vec<String>> = profiles
        .iter()
        .map(|p| {
            vec![
                p.name.clone(),
                p.display_url(),
                p.effective_ssl_mode().to_string(),
                p.last_connected
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string()),
                p.id.to_string(),
            ]
        })
        .collect();
    table(&["name", "url", "ssl", "last connected", "id"], &rows)
}

/// Profiles as JSON, without passwords.
pub fn profiles_json(profiles: &[ConnectionProfile]) -> Result<String, serde_json::Error> {
    let mut values = Vec::with_capacity(profiles.len());
    for profile in profiles {
        let mut value = serde_json::to_value(profile)?;
        if let Some(object) = value.as_object_mut() {
            object.remove("password");
        }
        values.push(value);
    }
    serde_json::to_string_pretty(&values)
}

pub fn tables(tables: &[TableInfo]) -> String {
    let rows: Vec<Vec<String>> = tables
        .iter()
        .map(|t| {
            vec![
                t.schema.clone(),
                t.name.clone(),
                t.row_count.map(|n| n.to_string()).unwrap_or_default(),
                t.columns.len().to_string(),
                t.primary_key().join(", "),
            ]
        })
        .collect();
    table(&["schema", "table", "est. rows", "columns", "primary key"], &rows)
}

pub fn columns(columns: &[ColumnDetail]) -> String {
    let rows: Vec<Vec<String>> = columns
        .iter()
        .map(|c| {
            let key = match (c.is_primary_key, c.is_foreign_key) {
                (true, true) => "PK, FK",
                (true, false) => "PK",
                (false, true) => "FK",
                (false, false) => "",
            };
            vec![
                c.name.clone(),
                c.data_type.clone(),
                if c.is_nullable { "YES" } else { "NO" }.to_string(),
                key.to_string(),
                c.default_value.clone().unwrap_or_default(),
            ]
        })
        .collect();
    table(&["column", "type", "nullable", "key", "default"], &rows)
}

pub fn databases(databases: &[DatabaseInfo]) -> String {
    let rows: Vec<Vec<String>> = databases.iter().map(|d| vec![d.name.clone()]).collect();
    table(&["database"], &rows)
}

pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}
