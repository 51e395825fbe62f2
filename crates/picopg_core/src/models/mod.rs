//! Data models for picopg.
//!
//! - `connection` - ConnectionProfile, SslMode, ConnectionOptions
//! - `query` - QueryResult, QueryType, ColumnInfo
//! - `schema` - Table and column metadata

pub mod connection;
pub mod query;
pub mod schema;

pub use connection::{ConnectionOptions, ConnectionProfile, ConnectionProfileBuilder, SslMode};
pub use query::{ColumnInfo, QueryResult, QueryType, ResultRow};
pub use schema::{ColumnDetail, DatabaseInfo, TableInfo};
