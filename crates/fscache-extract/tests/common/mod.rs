//! Mock ArcGIS service for integration tests
//!
//! [`MockService`] wraps a wiremock server and mounts the handful of
//! endpoints an extraction touches: the service definition, layer documents,
//! record counts, identifier boundaries and window queries.

#![allow(dead_code)]

use fscache_extract::ExtractConfig;
use serde_json::{json, Value};
use std::path::Path;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate, Times};

pub const SERVICE_PATH: &str = "/arcgis/rest/services/Test/FeatureServer";

pub struct MockService {
    pub server: MockServer,
}

impl MockService {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Service URL as a user would type it
    pub fn url(&self) -> String {
        format!("{}{}", self.server.uri(), SERVICE_PATH)
    }

    fn query_path(layer_id: i64) -> String {
        format!("{}/{}/query", SERVICE_PATH, layer_id)
    }

    pub async fn mount_definition(&self, body: Value) {
        self.mount_definition_response(ResponseTemplate::new(200).set_body_json(body))
            .await;
    }

    pub async fn mount_definition_response(&self, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(format!("{}/", SERVICE_PATH)))
            .and(query_param("f", "json"))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_layer(&self, layer_id: i64, metadata: Value) {
        Mock::given(method("GET"))
            .and(path(format!("{}/{}/", SERVICE_PATH, layer_id)))
            .and(query_param("f", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(metadata))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_count(&self, layer_id: i64, count: u64) {
        Mock::given(method("GET"))
            .and(path(Self::query_path(layer_id)))
            .and(query_param("returnCountOnly", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": count })))
            .mount(&self.server)
            .await;
    }

    /// Answer the ascending and descending identifier queries. `None` answers
    /// with `objectIds: null`, as services do for empty layers.
    pub async fn mount_bounds(&self, layer_id: i64, start: Option<i64>, end: Option<i64>) {
        for (order, value) in [("OBJECTID ASC", start), ("OBJECTID DESC", end)] {
            let ids = value.map(|id| json!([id])).unwrap_or(Value::Null);
            Mock::given(method("GET"))
                .and(path(Self::query_path(layer_id)))
                .and(query_param("returnIdsOnly", "true"))
                .and(query_param("orderByFields", order))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(json!({ "objectIdFieldName": "OBJECTID", "objectIds": ids })),
                )
                .mount(&self.server)
                .await;
        }
    }

    /// Answer the window `[start, end]` with `body`, expecting exactly
    /// `expected` requests
    pub async fn mount_window(
        &self,
        layer_id: i64,
        start: i64,
        end: i64,
        body: Value,
        expected: impl Into<Times>,
    ) {
        self.mount_window_response(
            layer_id,
            start,
            end,
            ResponseTemplate::new(200).set_body_json(body),
            expected,
        )
        .await;
    }

    pub async fn mount_window_response(
        &self,
        layer_id: i64,
        start: i64,
        end: i64,
        response: ResponseTemplate,
        expected: impl Into<Times>,
    ) {
        Mock::given(method("GET"))
            .and(path(Self::query_path(layer_id)))
            .and(query_param("where", format!("OBJECTID between {} and {}", start, end)))
            .respond_with(response)
            .expect(expected)
            .mount(&self.server)
            .await;
    }

    /// Mount definition-independent endpoints of a point layer whose
    /// identifiers run from `start` to `end`
    pub async fn mount_point_layer(&self, layer_id: i64, start: i64, end: i64, count: u64) {
        self.mount_layer(layer_id, point_layer_metadata(None)).await;
        self.mount_count(layer_id, count).await;
        self.mount_bounds(layer_id, Some(start), Some(end)).await;
    }
}

/// Service definition with the given layers and tables
pub fn definition(layers: Value, tables: Value) -> Value {
    json!({
        "currentVersion": 10.91,
        "maxRecordCount": 2000,
        "layers": layers,
        "tables": tables
    })
}

pub fn point_layer_metadata(max_record_count: Option<u64>) -> Value {
    json!({
        "id": 0,
        "name": "Hydrants",
        "geometryType": "esriGeometryPoint",
        "objectIdField": "OBJECTID",
        "maxRecordCount": max_record_count,
        "fields": [
            { "name": "OBJECTID", "type": "esriFieldTypeOID", "alias": "OBJECTID" },
            { "name": "NAME", "type": "esriFieldTypeString", "alias": "Name" },
            { "name": "STATUS", "type": "esriFieldTypeSmallInteger", "alias": "Status",
              "domain": { "type": "codedValue", "name": "Status",
                          "codedValues": [ { "name": "Active", "code": 1 }, { "name": "Retired", "code": 2 } ] } }
        ]
    })
}

pub fn point_feature(id: i64) -> Value {
    json!({
        "type": "Feature",
        "id": id,
        "properties": { "OBJECTID": id, "NAME": format!("hydrant {}", id), "STATUS": 1 },
        "geometry": { "type": "Point", "coordinates": [-71.0 + id as f64 / 100.0, 42.0] }
    })
}

pub fn feature_collection(features: Vec<Value>) -> Value {
    json!({ "type": "FeatureCollection", "features": features })
}

/// Features `start..=end` as a GeoJSON window response
pub fn points(start: i64, end: i64) -> Value {
    feature_collection((start..=end).map(point_feature).collect())
}

/// Configuration writing into `folder` with immediate retries
pub fn config(folder: &Path) -> ExtractConfig {
    ExtractConfig::builder()
        .folder(folder)
        .retry_delay_ms(0)
        .timeout_ms(5_000)
        .build()
        .expect("valid test configuration")
}

pub fn read_json(path: &Path) -> Value {
    let text = std::fs::read_to_string(path).expect("output file is readable");
    serde_json::from_str(&text).expect("output file is valid JSON")
}

/// Names of the files in `folder`, sorted
pub fn files_in(folder: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(folder)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
