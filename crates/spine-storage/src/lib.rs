//! Connection + Dialect (spec.md §4.1) and the repository layer (§4.2):
//! the single access path to persisted `core_*` state. Every repository is
//! stated as a trait in `repo`; `SqliteStore` and `PostgresStore` each
//! implement the full set against their own pool.

pub mod dialect;
pub mod error;
pub mod postgres;
pub mod query;
pub mod repo;
pub mod schema;
pub mod sql;
pub mod sqlite;

pub use dialect::{Dialect, PostgresDialect, SqliteDialect};
pub use error::{StorageError, StorageResult};
pub use postgres::PostgresStore;
pub use repo::*;
pub use sqlite::SqliteStore;
