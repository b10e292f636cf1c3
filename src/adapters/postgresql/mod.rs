//! PostgreSQL resource store
//!
//! Resources are kept in a single `resources` table keyed by
//! (resource type, source key); identities are kept in `resource_identities`.

pub mod adapter;
pub mod client;
pub mod models;

pub use adapter::PostgreSQLAdapter;
pub use client::PostgreSQLClient;
pub use models::PostgreSQLResource;
