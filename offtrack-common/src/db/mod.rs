//! Database bootstrap shared by the player crates

pub mod init;
pub mod schema_sync;
pub mod table_schemas;

pub use init::{create_schema, init_database, init_memory_database};
