//! External system integrations for Tributary.
//!
//! This module provides adapters for the collaborators a transform batch talks to:
//!
//! - [`exchange`] - delivered extract payloads (directory or manifest)
//! - [`filer`] - batched, per-key ordered resource filing
//! - [`store`] - resource store abstraction (memory, JSON directory)
//! - [`postgresql`] - PostgreSQL resource store
//! - [`terminology`] - code translation (static table or FHIR server)
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern** to isolate external dependencies and
//! enable testing with in-memory implementations. Stores and terminology
//! services are trait objects created by factories from configuration.
//!
//! ```rust,no_run
//! use tributary::adapters::filer::ResourceFiler;
//! use tributary::adapters::store::create_store;
//! use tributary::config::TributaryConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TributaryConfig::default();
//! let store = create_store(&config).await?;
//! let filer = ResourceFiler::new(store, config.filer.queues);
//! filer.wait_to_finish().await?;
//! # Ok(())
//! # }
//! ```

pub mod exchange;
pub mod filer;
pub mod postgresql;
pub mod store;
pub mod terminology;
