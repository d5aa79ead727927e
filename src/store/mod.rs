//! Persistence layer: libSQL-backed storage for users, queries,
//! reach-outs, the message log and the match-job queue.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
