//! Storage layer.
//!
//! - [`ItemStore`]: `SQLite` item rows plus FTS5 and embedding indexes
//! - [`artifacts`]: JSON checkpoint and maintenance files
//! - [`migrations`]: forward-only schema creation

// Allow cast precision loss for score calculations where exact precision is not critical.
#![allow(clippy::cast_precision_loss)]
// Dropping the connection guard slightly earlier buys nothing.
#![allow(clippy::significant_drop_tightening)]

pub mod artifacts;
pub mod connection;
pub mod fts;
mod item_store;
pub mod migrations;
pub mod vector;

pub use item_store::{
    DEFAULT_LIST_LIMIT, IndexPresence, ItemStore, MAX_LIST_LIMIT, MAX_VECTOR_LIMIT, ScoredItem,
};
