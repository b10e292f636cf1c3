//! Core extract processing
//!
//! # Modules
//!
//! - [`parse`] - schema registry, typed cursors, format dispatch, version discovery
//! - [`relationships`] - deferred child to parent links within a batch
//! - [`transform`] - per-entity transformers and the pass driver
//! - [`batch`] - batch orchestration, delete pre-pass and summary
//!
//! # Example
//!
//! ```rust,no_run
//! use tributary::adapters::exchange::Payload;
//! use tributary::config::load_config;
//! use tributary::core::batch::BatchCoordinator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("tributary.toml")?;
//! let coordinator = BatchCoordinator::from_config(config).await?;
//!
//! let payload = Payload::load(std::path::Path::new("/data/extract-0042"))?;
//! let summary = coordinator.process(&payload).await?;
//!
//! println!("Saved: {}", summary.total_saved());
//! println!("Deleted: {}", summary.total_deleted());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod parse;
pub mod relationships;
pub mod transform;
