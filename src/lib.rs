// Tributary - Clinical Extract ETL Tool
// Copyright (c) 2025 Tributary Contributors
// Licensed under the MIT License

//! # Tributary - Clinical Extract ETL
//!
//! Tributary turns a clinical vendor's periodic extract (a directory of CSV and
//! XML files, one per record type) into standard clinical resources and files
//! them into a resource store.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Parsing** versioned vendor files through typed cursors with exact
//!   row and column provenance
//! - **Discovering** the schema version of an extract from its file headers
//! - **Transforming** records into resources with terminology translation
//! - **Linking** children to parents that arrive later in the same batch
//! - **Filing** resources through ordered queues into memory, JSON or PostgreSQL
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Business logic (parse, transform, relationships, batch)
//! - [`adapters`] - External integrations (exchange payloads, stores, terminology)
//! - [`domain`] - Core domain types and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tributary::adapters::exchange::Payload;
//! use tributary::config::load_config;
//! use tributary::core::batch::BatchCoordinator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("tributary.toml")?;
//!     let coordinator = BatchCoordinator::from_config(config).await?;
//!
//!     let payload = Payload::load(std::path::Path::new("/data/extract-0042"))?;
//!     let summary = coordinator.process(&payload).await?;
//!
//!     println!("Filed {} resources", summary.total_saved());
//!     Ok(())
//! }
//! ```
//!
//! ## Reading a file directly
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tributary::adapters::exchange::ExchangeFile;
//! use tributary::core::parse::{FormatDispatcher, SchemaRegistry};
//! use tributary::domain::SchemaVersion;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = FormatDispatcher::with_builtin_formats(Arc::new(SchemaRegistry::builtin()));
//! let version: SchemaVersion = "5.3".parse()?;
//! let file = ExchangeFile::new("Admin_Patient", "/data/extract-0042/Admin_Patient.csv");
//! let mut cursor = dispatcher.open(&file, &version)?;
//!
//! while cursor.next()?.is_some() {
//!     let patient = cursor.cell("PatientGuid")?.as_string()?;
//!     let dob = cursor.cell("DateOfBirth")?.as_date()?;
//!     println!("{patient:?} born {dob:?}");
//! }
//! cursor.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`domain::Result`], whose error type is
//! [`domain::TributaryError`]. Record-level failures carry the file, row and
//! column that produced them.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
