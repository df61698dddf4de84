//! # mediatag Common Library
//!
//! Shared code for the mediatag services including:
//! - Error type and result alias
//! - Configuration file loading (TOML) and path resolution
//! - Object store notification wire types
//! - SQLite index database initialization

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
