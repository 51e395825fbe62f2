//! Core library for picopg, a small local PostgreSQL client.
//!
//! - **error**: Error handling with PostgreSQL-specific details
//! - **models**: Connection profiles, query results, schema metadata
//! - **services**: Local storage, saved profiles, connections, queries, introspection
//! - **config**: Defaults and environment overrides
//! - **state**: Application state used by front ends
//! - **logging**: Structured logging setup

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;


pub use config::AppConfig;
pub use error::{ErrorInfo, PicoError};
pub use models::{
    ColumnDetail, ColumnInfo, ConnectionOptions, ConnectionProfile, ConnectionProfileBuilder,
    DatabaseInfo, QueryResult, QueryType, ResultRow, SslMode, TableInfo,
};
pub use services::{
    ConnectionPool, ConnectionService, ConnectionTestResult, LocalStorage, ProfileStore,
    QueryService, SchemaService,
};
pub use state::PicoState;
