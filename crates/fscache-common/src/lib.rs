//! fscache Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the fscache workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`FscacheError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber setup shared by every binary
//! - **Naming**: layer name normalization and output file naming
//! - **Staging**: write-then-commit files for all-or-nothing outputs
//!
//! # Example
//!
//! ```no_run
//! use fscache_common::naming::{layer_file_name, normalize_layer_name};
//!
//! let name = normalize_layer_name("Storm Drains - 2024");
//! assert_eq!(layer_file_name("export_", &name, "geojson"), "export_storm_drains___2024.geojson");
//! ```

pub mod error;
pub mod logging;
pub mod naming;
pub mod staging;

// Re-export commonly used types
pub use error::{FscacheError, Result};
