//! Database initialization for the SQLite index backend

pub mod init;

pub use init::{create_index_items_table, init_index_database};
