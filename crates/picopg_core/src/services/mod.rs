//! Backend services for picopg.
//!
//! - `storage` - SQLite key/value storage for local state
//! - `password` - Reversible password encoding for stored profiles
//! - `profiles` - Saved connection profiles
//! - `connection` - Per-operation connection pools with deadpool-postgres
//! - `query` - Ad-hoc query execution
//! - `values` - PostgreSQL value to JSON conversion
//! - `schema` - Table and column introspection

pub mod connection;
pub mod password;
pub mod profiles;
pub mod query;
pub mod schema;
pub mod storage;
pub mod values;

pub use connection::{ConnectionPool, ConnectionService, ConnectionTestResult, PooledConnection};
pub use profiles::ProfileStore;
pub use query::QueryService;
pub use schema::SchemaService;
pub use storage::LocalStorage;
