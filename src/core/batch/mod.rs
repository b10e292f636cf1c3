//! Batch orchestration
//!
//! - [`coordinator`]: runs one payload through version resolution, the delete
//!   pre-pass, the transformer passes and relationship cleanup
//! - [`pool`]: bounded concurrency for store lookups
//! - [`prepass`]: deleted-key collection and existence checks
//! - [`summary`]: per-batch reporting

pub mod coordinator;
pub mod pool;
pub mod prepass;
pub mod summary;

pub use coordinator::BatchCoordinator;
pub use pool::LookupPool;
pub use summary::BatchSummary;
