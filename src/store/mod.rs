//! Persistence layer: scoped key/value storage for survey state.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlStateStore;
pub use memory::MemoryStateStore;
pub use traits::StateStore;
