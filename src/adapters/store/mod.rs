//! Resource store abstraction layer
//!
//! This module provides a trait-based abstraction over the durable stores the
//! resource filer writes to, so a batch runs unchanged against memory, a JSON
//! directory or PostgreSQL.

pub mod factory;
pub mod json;
pub mod memory;
pub mod traits;

pub use factory::create_store;
pub use json::JsonDirectoryStore;
pub use memory::{MemoryStore, StoreOperation};
pub use traits::ResourceStore;
