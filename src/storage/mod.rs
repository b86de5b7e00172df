//! Storage module - Encrypted persistence of the aggregated index.
//!
//! This module contains:
//! - IndexStore: key management, sealed envelope, atomic replace on save

pub mod index_store;

pub use index_store::{IndexStore, INDEX_MAGIC, INDEX_VERSION};
