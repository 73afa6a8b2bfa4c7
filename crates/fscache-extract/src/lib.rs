//! fscache Extract Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Streams every record of ArcGIS FeatureServer and MapServer layers into
//! GeoJSON feature collections, one file per layer.
//!
//! # Pipeline
//!
//! - **Layer enumeration**: group layers are skipped, tables are included
//! - **Range discovery**: smallest and largest object identifier per layer
//! - **Windowed paging**: fixed-width identifier windows, fetched with retry
//! - **Transformation**: geometry checks and coded-value substitution
//! - **Streaming output**: features are written as they arrive into a staged
//!   file that is only kept when the layer did not fail
//!
//! # Example
//!
//! ```no_run
//! use fscache_extract::{ExtractConfig, Extractor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ExtractConfig::builder().folder("./export").pretty(true).build()?;
//!     let summary = Extractor::new(config)?
//!         .run("https://example.com/arcgis/rest/services/Water/FeatureServer")
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&summary)?);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod esri;
pub mod extractor;
pub mod fetcher;
pub mod outcome;
pub mod paginator;
pub mod range;
pub mod service;
pub mod transform;
pub mod transport;
pub mod writer;

pub use config::{ExtractConfig, ScheduleMode, WireFormat};
pub use convert::VectorConverter;
pub use error::{ExtractError, Result};
pub use extractor::Extractor;
pub use outcome::{ErrorExample, ExtractionOutcome, OutcomeStatus, RunSummary};
pub use transport::{HttpTransport, Transport};
