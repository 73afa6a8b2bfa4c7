//! Identifier field detection and range discovery

use crate::client::{ServiceClient, SortOrder};
use crate::error::{ExtractError, Result};
use crate::service::{LayerMetadata, OID_FIELD_TYPE};
use tracing::{debug, warn};

/// Inclusive bounds of a layer's identifier values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierRange {
    pub start: i64,
    pub end: i64,
}

impl IdentifierRange {
    /// Bounds with `0 <= start <= end`, or `None`
    pub fn new(start: i64, end: i64) -> Option<Self> {
        (start >= 0 && start <= end).then_some(Self { start, end })
    }
}

/// Result of range discovery.
///
/// A failed discovery carries `start = 0, end = 0` and a reason. Callers must
/// check [`RangeResolution::error`] rather than trust the bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeResolution {
    pub range: IdentifierRange,
    pub error: Option<String>,
}

impl RangeResolution {
    pub fn resolved(range: IdentifierRange) -> Self {
        Self { range, error: None }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            range: IdentifierRange { start: 0, end: 0 },
            error: Some(reason.into()),
        }
    }

    /// The range, or a layer-level error naming the layer
    pub fn into_result(self, layer: &str) -> Result<IdentifierRange> {
        match self.error {
            None => Ok(self.range),
            Some(reason) => Err(ExtractError::RangeUnresolved {
                layer: layer.to_string(),
                reason,
            }),
        }
    }
}

/// Pick the field to paginate on.
///
/// An explicit override wins, then the layer's `objectIdField`, then the first
/// field typed as an object identifier.
pub fn identifier_field(override_field: Option<&str>, metadata: &LayerMetadata) -> Option<String> {
    if let Some(field) = override_field.filter(|f| !f.trim().is_empty()) {
        return Some(field.trim().to_string());
    }
    if let Some(field) = metadata.object_id_field.as_deref().filter(|f| !f.is_empty()) {
        return Some(field.to_string());
    }
    metadata
        .fields
        .iter()
        .find(|f| f.field_type == OID_FIELD_TYPE)
        .map(|f| f.name.clone())
}

/// Find the smallest and largest identifier of a layer with two single-record
/// ordered queries.
pub async fn resolve_range(client: &ServiceClient, layer_id: i64, id_field: &str) -> RangeResolution {
    let bounds = tokio::try_join!(
        client.boundary_id(layer_id, id_field, SortOrder::Ascending),
        client.boundary_id(layer_id, id_field, SortOrder::Descending),
    );

    let resolution = match bounds {
        Err(e) => RangeResolution::failed(e.to_string()),
        Ok((Some(start), Some(end))) => match IdentifierRange::new(start, end) {
            Some(range) => RangeResolution::resolved(range),
            None => RangeResolution::failed(format!(
                "invalid identifier bounds [{}, {}] on {}",
                start, end, id_field
            )),
        },
        Ok(_) => RangeResolution::failed(format!("no records returned when ordering by {}", id_field)),
    };

    match &resolution.error {
        None => debug!(
            layer_id,
            start = resolution.range.start,
            end = resolution.range.end,
            "Resolved identifier range"
        ),
        Some(reason) => warn!(layer_id, %reason, "Identifier range unresolved"),
    }
    resolution
}
