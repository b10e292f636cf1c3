//! Vendor file parsing
//!
//! - [`schema`]: versioned column lists per vendor format
//! - [`cell`]: typed access to one raw value
//! - [`cursor`]: pull iteration over the records of one file
//! - [`dispatch`]: type tag to cursor factory registry
//! - [`version`]: batch version discovery

pub mod cell;
pub mod cursor;
pub mod dispatch;
pub mod schema;
pub mod version;

pub use cell::{Cell, DatePrecision, PartialDate};
pub use cursor::{CsvCursor, FileSchema, HeaderSample, RowCursor, SourceRecord, XmlCursor};
pub use dispatch::{FormatDispatcher, FormatSpec, OpenedBatch, SourceEncoding};
pub use schema::{SchemaDescriptor, SchemaRegistry};
pub use version::{determine_version, resolve_version, VersionDetermination, VersionSelection};
