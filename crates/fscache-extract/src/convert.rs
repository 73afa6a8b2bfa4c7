//! Conversion of finished GeoJSON outputs to other vector formats
//!
//! The extractor only knows the [`VectorConverter`] seam. It hands over the
//! path of a committed GeoJSON file and records whatever comes back.

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait VectorConverter: Send + Sync {
    /// Convert the GeoJSON file at `geojson` and return the converted file's
    /// path. The input file is left in place.
    async fn convert(&self, geojson: &Path) -> Result<PathBuf>;
}
