//! Service and layer metadata
//!
//! Wire types for the `?f=json` documents of a service and of its layers, the
//! [`LayerDescriptor`] each extraction works from, and the layer enumerator.

use crate::config::ExtractConfig;
use crate::error::{ExtractError, Result};
use crate::transform::DomainTable;
use fscache_common::naming::normalize_layer_name;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Field type marking the object identifier column
pub const OID_FIELD_TYPE: &str = "esriFieldTypeOID";

/// Top-level service definition (`<service>/?f=json`)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    #[serde(default)]
    pub layers: Vec<LayerSummary>,

    #[serde(default)]
    pub tables: Vec<LayerSummary>,

    #[serde(default)]
    pub max_record_count: Option<u64>,
}

/// Entry of a service's `layers` or `tables` list
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSummary {
    pub id: i64,

    pub name: String,

    #[serde(default)]
    pub geometry_type: Option<GeometryType>,

    /// Present on group layers, which have no schema of their own
    #[serde(default)]
    pub sub_layer_ids: Option<Vec<i64>>,

    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl LayerSummary {
    fn is_group(&self) -> bool {
        let has_children = self.sub_layer_ids.as_ref().is_some_and(|ids| !ids.is_empty());
        let typed_group = self.kind.as_deref() == Some("Group Layer");
        has_children || typed_group
    }
}

/// Esri geometry type of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryType {
    #[serde(rename = "esriGeometryPoint")]
    Point,
    #[serde(rename = "esriGeometryMultipoint")]
    Multipoint,
    #[serde(rename = "esriGeometryPolyline")]
    Polyline,
    #[serde(rename = "esriGeometryPolygon")]
    Polygon,
    #[serde(rename = "esriGeometryEnvelope")]
    Envelope,
    #[serde(other)]
    Unknown,
}

/// Layer document (`<service>/<id>/?f=json`)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerMetadata {
    #[serde(default)]
    pub fields: Vec<FieldInfo>,

    #[serde(default)]
    pub object_id_field: Option<String>,

    #[serde(default)]
    pub max_record_count: Option<u64>,

    #[serde(default)]
    pub geometry_type: Option<GeometryType>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldInfo {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: String,

    #[serde(default)]
    pub alias: Option<String>,

    #[serde(default)]
    pub domain: Option<DomainInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainInfo {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub coded_values: Vec<CodedValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodedValue {
    pub name: String,
    pub code: serde_json::Value,
}

/// Whether a descriptor came from the `layers` or the `tables` list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Layer,
    Table,
}

/// One extractable layer or table
#[derive(Debug, Clone)]
pub struct LayerDescriptor {
    pub id: i64,

    /// Normalized name: lowercased, spaces and hyphens replaced by `_`
    pub name: String,

    /// Output file name without prefix or extension. Equal to `name` unless
    /// another extracted layer normalizes to the same name.
    pub file_stem: String,

    /// Name as published by the service
    pub display_name: String,

    pub kind: LayerKind,

    pub geometry_type: Option<GeometryType>,

    /// Record count reported by the service before extraction
    pub count: Option<u64>,

    /// Coded-value domains per field, empty when none were discovered
    pub domains: DomainTable,

    /// Page size limit advertised by the layer
    pub max_record_count: Option<u64>,
}

impl LayerDescriptor {
    fn from_summary(summary: &LayerSummary, kind: LayerKind) -> Self {
        let name = normalize_layer_name(&summary.name);
        Self {
            id: summary.id,
            file_stem: name.clone(),
            name,
            display_name: summary.name.clone(),
            kind,
            geometry_type: summary.geometry_type,
            count: None,
            domains: DomainTable::default(),
            max_record_count: None,
        }
    }

    /// Fold the layer document into the descriptor before extraction starts.
    pub fn apply_metadata(&mut self, metadata: &LayerMetadata, parse_domains: bool) {
        if metadata.geometry_type.is_some() {
            self.geometry_type = metadata.geometry_type;
        }
        self.max_record_count = metadata.max_record_count.filter(|&n| n > 0);
        if parse_domains {
            self.domains = DomainTable::from_fields(&metadata.fields);
        }
    }

    /// Whether features of this layer are expected to carry a geometry.
    /// Only tables are exempt.
    pub fn expects_geometry(&self) -> bool {
        self.kind == LayerKind::Layer
    }
}

/// List the layers and tables of a service that should be extracted.
///
/// Group layers are skipped, and so are layers whose normalized name does not
/// match the configured filter. An empty result is a run-level failure.
pub fn enumerate_layers(
    service: &ServiceDefinition,
    config: &ExtractConfig,
) -> Result<Vec<LayerDescriptor>> {
    let tables: &[LayerSummary] = if config.include_tables {
        &service.tables
    } else {
        &[]
    };

    let candidates = service
        .layers
        .iter()
        .map(|summary| (summary, LayerKind::Layer))
        .chain(tables.iter().map(|summary| (summary, LayerKind::Table)));

    let mut descriptors = Vec::new();
    for (summary, kind) in candidates {
        if summary.is_group() {
            debug!(layer = %summary.name, id = summary.id, "Skipping group layer");
            continue;
        }

        let descriptor = LayerDescriptor::from_summary(summary, kind);
        if !config.matches_filter(&descriptor.name) {
            info!(layer = %descriptor.name, "Skipping layer not matching filter");
            continue;
        }
        descriptors.push(descriptor);
    }

    if descriptors.is_empty() {
        return Err(ExtractError::NoLayersFound);
    }

    assign_file_stems(&mut descriptors);
    info!(count = descriptors.len(), "Found layers to extract");
    Ok(descriptors)
}

/// Give every descriptor an output file stem no other descriptor uses.
///
/// Names shared by several layers or tables get `_<id>` appended on all of
/// them; a further `_<n>` is added if that still collides.
fn assign_file_stems(descriptors: &mut [LayerDescriptor]) {
    let mut occurrences: HashMap<String, usize> = HashMap::new();
    for descriptor in descriptors.iter() {
        *occurrences.entry(descriptor.name.clone()).or_default() += 1;
    }
    let is_shared = |name: &str| occurrences.get(name).copied().unwrap_or(0) > 1;

    let mut taken: HashSet<String> = descriptors
        .iter()
        .filter(|d| !is_shared(d.name.as_str()))
        .map(|d| d.name.clone())
        .collect();

    for descriptor in descriptors.iter_mut() {
        if !is_shared(descriptor.name.as_str()) {
            continue;
        }
        let base = format!("{}_{}", descriptor.name, descriptor.id);
        let mut stem = base.clone();
        let mut n = 2;
        while taken.contains(&stem) {
            stem = format!("{}_{}", base, n);
            n += 1;
        }
        taken.insert(stem.clone());

        warn!(
            layer = %descriptor.display_name,
            id = descriptor.id,
            file_stem = %stem,
            "Layer name is not unique, writing to a disambiguated file"
        );
        descriptor.file_stem = stem;
    }
}
