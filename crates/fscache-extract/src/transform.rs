//! Per-record transformation and validation
//!
//! Every raw record coming out of a window becomes exactly one
//! [`OutputFeature`]. Problems with a record are reported next to the feature
//! as a [`RecordIssue`]; nothing here fails the stream.

use crate::config::WireFormat;
use crate::esri::to_geojson_geometry;
use crate::service::FieldInfo;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const MISSING_GEOMETRY: &str = "Feature is missing geometry";

/// A record after wire-format normalization
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub attributes: Map<String, Value>,
    pub geometry: Option<Value>,
}

impl FeatureRecord {
    /// Read a GeoJSON feature (`properties` + `geometry`)
    pub fn from_geojson(raw: Value) -> Result<Self, MalformedRecord> {
        Self::read(raw, "properties", |obj| obj.remove("geometry").filter(|g| !g.is_null()))
    }

    /// Read an Esri JSON feature (`attributes` + `geometry`), converting the
    /// geometry to GeoJSON
    pub fn from_esri(raw: Value) -> Result<Self, MalformedRecord> {
        Self::read(raw, "attributes", |obj| obj.get("geometry").and_then(to_geojson_geometry))
    }

    fn read(
        raw: Value,
        attributes_key: &str,
        geometry: impl FnOnce(&mut Map<String, Value>) -> Option<Value>,
    ) -> Result<Self, MalformedRecord> {
        let mut obj = match raw {
            Value::Object(obj) => obj,
            other => {
                let reason = format!("Malformed feature: expected an object, got {}", kind_of(&other));
                return Err(MalformedRecord { reason, raw: other });
            },
        };
        let attributes = match obj.remove(attributes_key) {
            Some(Value::Object(attrs)) => attrs,
            Some(Value::Null) | None => Map::new(),
            Some(other) => {
                let reason = format!("Malformed feature: {} is {}", attributes_key, kind_of(&other));
                obj.insert(attributes_key.to_string(), other);
                return Err(MalformedRecord {
                    reason,
                    raw: Value::Object(obj),
                });
            },
        };
        let geometry = geometry(&mut obj);
        Ok(Self { attributes, geometry })
    }
}

/// A record that could not be read, with the reason and the record itself
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedRecord {
    pub reason: String,
    pub raw: Value,
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Feature as written to the collection. `geometry` is omitted when absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputFeature {
    #[serde(rename = "type")]
    kind: &'static str,

    pub properties: Map<String, Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
}

impl OutputFeature {
    pub fn new(properties: Map<String, Value>, geometry: Option<Value>) -> Self {
        Self {
            kind: "Feature",
            properties,
            geometry,
        }
    }
}

impl From<FeatureRecord> for OutputFeature {
    fn from(record: FeatureRecord) -> Self {
        Self::new(record.attributes, record.geometry)
    }
}

/// Coded-value domains of one layer: field name to code to label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomainTable {
    fields: HashMap<String, HashMap<String, String>>,
}

impl DomainTable {
    /// Collect the coded-value domains declared on a layer's fields
    pub fn from_fields(fields: &[FieldInfo]) -> Self {
        let mut table = Self::default();
        for field in fields {
            let Some(domain) = field.domain.as_ref().filter(|d| d.kind == "codedValue") else {
                continue;
            };
            let labels: HashMap<String, String> = domain
                .coded_values
                .iter()
                .filter_map(|cv| code_key(&cv.code).map(|k| (k, cv.name.clone())))
                .collect();
            if !labels.is_empty() {
                table.fields.insert(field.name.clone(), labels);
            }
        }
        table
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Names of fields carrying a coded-value domain
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Replace every attribute value matching a domain code with its label
    pub fn apply(&self, attributes: &mut Map<String, Value>) {
        for (field, labels) in &self.fields {
            let Some(value) = attributes.get_mut(field) else {
                continue;
            };
            if let Some(label) = code_key(value).and_then(|k| labels.get(&k)) {
                *value = Value::String(label.clone());
            }
        }
    }
}

/// Comparable form of a code: strings as-is, integral numbers without a
/// fractional part
fn code_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Some((f as i64).to_string()),
                    Some(f) => Some(f.to_string()),
                    None => Some(n.to_string()),
                }
            }
        },
        _ => None,
    }
}

/// A problem found on one record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordIssue {
    pub reason: String,
    /// The raw record when it could not be read at all
    pub raw: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub feature: OutputFeature,
    pub issue: Option<RecordIssue>,
}

/// Converts raw window records into output features for one layer
#[derive(Debug, Clone, Copy)]
pub struct FeatureTransformer<'a> {
    format: WireFormat,
    domains: &'a DomainTable,
    expects_geometry: bool,
}

impl<'a> FeatureTransformer<'a> {
    pub fn new(format: WireFormat, domains: &'a DomainTable, expects_geometry: bool) -> Self {
        Self {
            format,
            domains,
            expects_geometry,
        }
    }

    pub fn transform(&self, raw: Value) -> Transformed {
        let parsed = match self.format {
            WireFormat::Geojson => FeatureRecord::from_geojson(raw),
            WireFormat::Json => FeatureRecord::from_esri(raw),
        };

        let mut record = match parsed {
            Ok(record) => record,
            Err(MalformedRecord { reason, raw }) => {
                return Transformed {
                    feature: OutputFeature::new(Map::new(), None),
                    issue: Some(RecordIssue {
                        reason,
                        raw: Some(raw),
                    }),
                }
            },
        };

        self.domains.apply(&mut record.attributes);

        let issue = (self.expects_geometry && record.geometry.is_none()).then(|| RecordIssue {
            reason: MISSING_GEOMETRY.to_string(),
            raw: None,
        });

        Transformed {
            feature: record.into(),
            issue,
        }
    }
}
