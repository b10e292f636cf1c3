//! Domain models and types for Tributary.
//!
//! This module contains the core domain types shared by the parsing, transform
//! and filing layers.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`CompositeKey`], [`ResourceType`], [`SchemaVersion`])
//! - **Target resources** ([`Resource`], [`ResourceBuilder`], [`ResourceLink`], [`Coding`])
//! - **Provenance** ([`RecordProvenance`], [`CellProvenance`])
//! - **Error types** ([`TributaryError`], [`RecordError`], [`CellError`])
//! - **Result type alias** ([`Result`])
//!
//! # Composite Keys
//!
//! Vendor-local ids are only unique within a parent scope, so every entity is
//! addressed by a scope + local id pair:
//!
//! ```rust
//! use tributary::domain::CompositeKey;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let problem = CompositeKey::new("patient-42", "problem-7")?;
//! assert_eq!(problem.to_string(), "patient-42:problem-7");
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod ids;
pub mod provenance;
pub mod resource;
pub mod result;

// Re-export commonly used types for convenience
pub use errors::{CellError, RecordError, TributaryError};
pub use ids::{CompositeKey, ResourceType, SchemaVersion};
pub use provenance::{CellProvenance, RecordProvenance};
pub use resource::{Coding, Resource, ResourceBuilder, ResourceLink};
pub use result::Result;
