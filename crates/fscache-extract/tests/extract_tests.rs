//! Integration tests for complete extraction runs against a mock service
//!
//! Covers:
//! - End-to-end output and summary shape
//! - Record-level and window-level errors
//! - Pagination over sparse and truncated identifier spaces
//! - Run-level failures
//! - Scheduling modes, cancellation and format conversion

mod common;

use async_trait::async_trait;
use common::*;
use fscache_extract::{
    ExtractConfig, ExtractError, Extractor, HttpTransport, OutcomeStatus, RunSummary, ScheduleMode,
    VectorConverter, WireFormat,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use wiremock::ResponseTemplate;

fn hydrants() -> Value {
    json!([{ "id": 0, "name": "Hydrants", "geometryType": "esriGeometryPoint" }])
}

async fn run(service: &MockService, config: ExtractConfig) -> fscache_extract::Result<RunSummary> {
    Extractor::new(config).unwrap().run(&service.url()).await
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_two_feature_layer_end_to_end() {
    let service = MockService::start().await;
    service.mount_definition(definition(hydrants(), json!([]))).await;
    service.mount_point_layer(0, 1, 2, 2).await;
    service.mount_window(0, 1, 1000, points(1, 2), 1).await;

    let dir = tempfile::tempdir().unwrap();
    let summary = run(&service, config(dir.path())).await.unwrap();

    assert_eq!(summary.layers.len(), 1);
    assert!(summary.tables.is_empty());
    let outcome = &summary.layers[0];
    assert_eq!(outcome.layer_name, "hydrants");
    assert_eq!(outcome.nbr_features, 2);
    assert_eq!(outcome.nbr_errors, 0);
    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.expected_count, Some(2));

    let path = dir.path().join("hydrants.geojson");
    assert_eq!(outcome.path.as_deref(), Some(path.as_path()));
    assert_eq!(files_in(dir.path()), vec!["hydrants.geojson"]);

    let doc = read_json(&path);
    assert_eq!(doc["type"], "FeatureCollection");
    assert_eq!(doc["layerId"], 0);
    let features = doc["features"].as_array().unwrap();
    assert_eq!(features.len(), 2);
    assert_eq!(features[0]["type"], "Feature");
    assert_eq!(features[0]["properties"]["OBJECTID"], 1);
    assert_eq!(features[1]["properties"]["OBJECTID"], 2);
    assert_eq!(features[1]["geometry"]["type"], "Point");
}

#[tokio::test]
async fn test_summary_serializes_camel_case() {
    let service = MockService::start().await;
    service.mount_definition(definition(hydrants(), json!([]))).await;
    service.mount_point_layer(0, 1, 2, 2).await;
    service.mount_window(0, 1, 1000, points(1, 2), 1).await;

    let dir = tempfile::tempdir().unwrap();
    let summary = run(&service, config(dir.path())).await.unwrap();
    let value = serde_json::to_value(&summary).unwrap();

    let layer = &value["layers"][0];
    assert_eq!(layer["layerName"], "hydrants");
    assert_eq!(layer["nbrFeatures"], 2);
    assert_eq!(layer["nbrErrors"], 0);
    assert_eq!(layer["exampleErrors"], json!([]));
    assert_eq!(layer["status"], "Success");
    assert_eq!(value["tables"], json!([]));
}

#[tokio::test]
async fn test_prefix_and_filter() {
    let service = MockService::start().await;
    service
        .mount_definition(definition(
            json!([
                { "id": 0, "name": "Hydrants", "geometryType": "esriGeometryPoint" },
                { "id": 1, "name": "Water Mains", "geometryType": "esriGeometryPolyline" }
            ]),
            json!([]),
        ))
        .await;
    service.mount_point_layer(1, 1, 1, 1).await;
    service.mount_window(1, 1, 1000, points(1, 1), 1).await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path())
        .into_builder()
        .prefix("city_")
        .filter("WATER")
        .build()
        .unwrap();
    let summary = run(&service, config).await.unwrap();

    assert_eq!(summary.layers.len(), 1);
    assert_eq!(summary.layers[0].layer_name, "water_mains");
    assert_eq!(files_in(dir.path()), vec!["city_water_mains.geojson"]);
}

#[tokio::test]
async fn test_pretty_output() {
    let service = MockService::start().await;
    service.mount_definition(definition(hydrants(), json!([]))).await;
    service.mount_point_layer(0, 1, 2, 2).await;
    service.mount_window(0, 1, 1000, points(1, 2), 1).await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path()).into_builder().pretty(true).build().unwrap();
    run(&service, config).await.unwrap();

    let path = dir.path().join("hydrants.geojson");
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("{\n  \"type\": \"FeatureCollection\""));
    assert_eq!(read_json(&path)["features"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_coded_domains_are_substituted() {
    let service = MockService::start().await;
    service.mount_definition(definition(hydrants(), json!([]))).await;
    service.mount_point_layer(0, 1, 1, 1).await;
    service.mount_window(0, 1, 1000, points(1, 1), 2).await;

    let dir = tempfile::tempdir().unwrap();
    run(&service, config(dir.path())).await.unwrap();
    let doc = read_json(&dir.path().join("hydrants.geojson"));
    assert_eq!(doc["features"][0]["properties"]["STATUS"], "Active");

    let config = config(dir.path()).into_builder().parse_domains(false).build().unwrap();
    run(&service, config).await.unwrap();
    let doc = read_json(&dir.path().join("hydrants.geojson"));
    assert_eq!(doc["features"][0]["properties"]["STATUS"], 1);
}

#[tokio::test]
async fn test_esri_json_wire_format() {
    let service = MockService::start().await;
    service.mount_definition(definition(hydrants(), json!([]))).await;
    service.mount_point_layer(0, 1, 2, 2).await;
    service
        .mount_window(
            0,
            1,
            1000,
            json!({
                "objectIdFieldName": "OBJECTID",
                "geometryType": "esriGeometryPoint",
                "features": [
                    { "attributes": { "OBJECTID": 1, "STATUS": 2 }, "geometry": { "x": -71.05, "y": 42.36 } },
                    { "attributes": { "OBJECTID": 2, "STATUS": 1 }, "geometry": { "x": -71.06, "y": 42.35 } }
                ]
            }),
            1,
        )
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path()).into_builder().format(WireFormat::Json).build().unwrap();
    let summary = run(&service, config).await.unwrap();
    assert_eq!(summary.layers[0].status, OutcomeStatus::Success);

    let doc = read_json(&dir.path().join("hydrants.geojson"));
    let first = &doc["features"][0];
    assert_eq!(first["properties"], json!({ "OBJECTID": 1, "STATUS": "Retired" }));
    assert_eq!(first["geometry"], json!({ "type": "Point", "coordinates": [-71.05, 42.36] }));
}

#[tokio::test]
async fn test_tables_are_reported_separately() {
    let service = MockService::start().await;
    service
        .mount_definition(definition(hydrants(), json!([{ "id": 5, "name": "Inspections" }])))
        .await;
    service.mount_point_layer(0, 1, 1, 1).await;
    service.mount_window(0, 1, 1000, points(1, 1), 1).await;

    service
        .mount_layer(
            5,
            json!({
                "id": 5,
                "name": "Inspections",
                "type": "Table",
                "fields": [ { "name": "OBJECTID", "type": "esriFieldTypeOID" } ]
            }),
        )
        .await;
    service.mount_count(5, 1).await;
    service.mount_bounds(5, Some(1), Some(1)).await;
    service
        .mount_window(
            5,
            1,
            1000,
            feature_collection(vec![json!({ "type": "Feature", "properties": { "OBJECTID": 1 }, "geometry": null })]),
            1,
        )
        .await;

    let dir = tempfile::tempdir().unwrap();
    let summary = run(&service, config(dir.path())).await.unwrap();

    assert_eq!(summary.layers.len(), 1);
    assert_eq!(summary.tables.len(), 1);
    let table = &summary.tables[0];
    assert_eq!(table.layer_name, "inspections");
    // rows without geometry are normal for tables
    assert_eq!(table.status, OutcomeStatus::Success);
    assert_eq!(table.nbr_errors, 0);
    assert_eq!(
        files_in(dir.path()),
        vec!["hydrants.geojson", "inspections.geojson"]
    );
}

// ============================================================================
// Record and window errors
// ============================================================================

#[tokio::test]
async fn test_missing_geometry_is_kept_and_flagged() {
    let service = MockService::start().await;
    service.mount_definition(definition(hydrants(), json!([]))).await;
    service.mount_point_layer(0, 1, 2, 2).await;
    let mut second = point_feature(2);
    second["geometry"] = Value::Null;
    service
        .mount_window(0, 1, 1000, feature_collection(vec![point_feature(1), second]), 1)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let summary = run(&service, config(dir.path())).await.unwrap();
    let outcome = &summary.layers[0];

    assert_eq!(outcome.status, OutcomeStatus::Warning);
    assert_eq!(outcome.nbr_features, 2);
    assert_eq!(outcome.nbr_errors, 1);
    assert_eq!(outcome.example_errors.len(), 1);
    assert_eq!(outcome.example_errors[0].index, 1);
    assert_eq!(outcome.example_errors[0].reason, "Feature is missing geometry");
    assert_eq!(outcome.example_errors[0].feature["properties"]["OBJECTID"], 2);

    let doc = read_json(&dir.path().join("hydrants.geojson"));
    let features = doc["features"].as_array().unwrap();
    assert_eq!(features.len(), 2);
    assert!(features[1].get("geometry").is_none());
}

#[tokio::test]
async fn test_missing_geometry_is_flagged_without_geometry_type() {
    let service = MockService::start().await;
    service
        .mount_definition(definition(json!([{ "id": 0, "name": "Assets" }]), json!([])))
        .await;
    service
        .mount_layer(
            0,
            json!({
                "objectIdField": "OBJECTID",
                "fields": [ { "name": "OBJECTID", "type": "esriFieldTypeOID" } ]
            }),
        )
        .await;
    service.mount_count(0, 1).await;
    service.mount_bounds(0, Some(1), Some(1)).await;
    service
        .mount_window(
            0,
            1,
            1000,
            feature_collection(vec![json!({
                "type": "Feature",
                "properties": { "OBJECTID": 1 },
                "geometry": null
            })]),
            1,
        )
        .await;

    let dir = tempfile::tempdir().unwrap();
    let summary = run(&service, config(dir.path())).await.unwrap();
    let outcome = &summary.layers[0];

    assert_eq!(outcome.status, OutcomeStatus::Warning);
    assert_eq!(outcome.nbr_features, 1);
    assert_eq!(outcome.nbr_errors, 1);
    assert_eq!(outcome.example_errors[0].reason, "Feature is missing geometry");
}

#[tokio::test]
async fn test_failed_window_does_not_stop_pagination() {
    let service = MockService::start().await;
    service.mount_definition(definition(hydrants(), json!([]))).await;
    service.mount_point_layer(0, 1, 15, 15).await;
    service
        .mount_window_response(0, 1, 5, ResponseTemplate::new(503), 5)
        .await;
    service.mount_window(0, 6, 10, points(6, 10), 1).await;
    service.mount_window(0, 11, 15, points(11, 15), 1).await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path()).into_builder().steps(5).build().unwrap();
    let summary = run(&service, config).await.unwrap();
    let outcome = &summary.layers[0];

    assert_eq!(outcome.status, OutcomeStatus::Warning);
    assert_eq!(outcome.nbr_features, 10);
    assert_eq!(outcome.nbr_errors, 1);
    assert_eq!(outcome.failed_windows, 1);
    assert_eq!(outcome.example_errors[0].feature, json!({ "window": { "start": 1, "end": 5 } }));
    assert!(outcome.example_errors[0].reason.contains("after 5 attempts"));
    assert_eq!(read_json(&dir.path().join("hydrants.geojson"))["features"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_all_windows_failing_discards_output() {
    let service = MockService::start().await;
    service.mount_definition(definition(hydrants(), json!([]))).await;
    service.mount_point_layer(0, 1, 2, 2).await;
    service
        .mount_window_response(0, 1, 1000, ResponseTemplate::new(500), 2)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path()).into_builder().max_attempts(2).build().unwrap();
    let summary = run(&service, config).await.unwrap();
    let outcome = &summary.layers[0];

    assert_eq!(outcome.status, OutcomeStatus::Failure);
    assert_eq!(outcome.nbr_features, 0);
    assert!(outcome.path.is_none());
    assert!(files_in(dir.path()).is_empty());
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test]
async fn test_sparse_identifiers_are_not_a_stop_signal() {
    let service = MockService::start().await;
    service.mount_definition(definition(hydrants(), json!([]))).await;
    service.mount_point_layer(0, 1, 3000, 2).await;
    service.mount_window(0, 1, 1000, points(1, 1), 1).await;
    service.mount_window(0, 1001, 2000, feature_collection(vec![]), 1).await;
    service.mount_window(0, 2001, 3000, points(3000, 3000), 1).await;

    let dir = tempfile::tempdir().unwrap();
    let summary = run(&service, config(dir.path())).await.unwrap();
    let outcome = &summary.layers[0];

    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.nbr_features, 2);
}

#[tokio::test]
async fn test_record_limit_narrows_windows() {
    let service = MockService::start().await;
    service.mount_definition(definition(hydrants(), json!([]))).await;
    service.mount_layer(0, point_layer_metadata(Some(5))).await;
    service.mount_count(0, 15).await;
    service.mount_bounds(0, Some(1), Some(15)).await;
    service.mount_window(0, 1, 5, points(1, 5), 1).await;
    service.mount_window(0, 6, 10, points(6, 10), 1).await;
    service.mount_window(0, 11, 15, points(11, 15), 1).await;

    let dir = tempfile::tempdir().unwrap();
    let summary = run(&service, config(dir.path())).await.unwrap();
    let outcome = &summary.layers[0];

    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.nbr_features, 15);

    let doc = read_json(&dir.path().join("hydrants.geojson"));
    let ids: Vec<i64> = doc["features"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["properties"]["OBJECTID"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, (1..=15).collect::<Vec<_>>());
}

// ============================================================================
// Layer-level failures
// ============================================================================

#[tokio::test]
async fn test_unresolved_range_fails_layer_only() {
    let service = MockService::start().await;
    service
        .mount_definition(definition(
            json!([
                { "id": 0, "name": "Hydrants", "geometryType": "esriGeometryPoint" },
                { "id": 1, "name": "Empty Layer", "geometryType": "esriGeometryPoint" }
            ]),
            json!([]),
        ))
        .await;
    service.mount_point_layer(0, 1, 2, 2).await;
    service.mount_window(0, 1, 1000, points(1, 2), 1).await;
    service.mount_layer(1, point_layer_metadata(None)).await;
    service.mount_count(1, 0).await;
    service.mount_bounds(1, None, None).await;

    let dir = tempfile::tempdir().unwrap();
    let summary = run(&service, config(dir.path())).await.unwrap();

    assert_eq!(summary.layers[0].status, OutcomeStatus::Success);
    let empty = &summary.layers[1];
    assert_eq!(empty.layer_name, "empty_layer");
    assert_eq!(empty.status, OutcomeStatus::Failure);
    assert_eq!(empty.nbr_features, 0);
    assert!(empty.reason.as_deref().unwrap().contains("identifier range"));
    assert_eq!(files_in(dir.path()), vec!["hydrants.geojson"]);
}

#[tokio::test]
async fn test_missing_identifier_field_fails_layer() {
    let service = MockService::start().await;
    service.mount_definition(definition(hydrants(), json!([]))).await;
    service
        .mount_layer(0, json!({ "fields": [ { "name": "NAME", "type": "esriFieldTypeString" } ] }))
        .await;

    let dir = tempfile::tempdir().unwrap();
    let summary = run(&service, config(dir.path())).await.unwrap();
    let outcome = &summary.layers[0];
    assert_eq!(outcome.status, OutcomeStatus::Failure);
    assert!(outcome.reason.as_deref().unwrap().contains("no object identifier field"));
}

#[tokio::test]
async fn test_id_field_override() {
    let service = MockService::start().await;
    service.mount_definition(definition(hydrants(), json!([]))).await;
    service
        .mount_layer(0, json!({ "fields": [ { "name": "OBJECTID", "type": "esriFieldTypeInteger" } ] }))
        .await;
    service.mount_count(0, 1).await;
    service.mount_bounds(0, Some(1), Some(1)).await;
    service.mount_window(0, 1, 1000, points(1, 1), 1).await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path()).into_builder().id_field("OBJECTID").build().unwrap();
    let summary = run(&service, config).await.unwrap();
    assert_eq!(summary.layers[0].status, OutcomeStatus::Success);
}

// ============================================================================
// Run-level failures
// ============================================================================

#[tokio::test]
async fn test_invalid_service_url() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = Extractor::new(config(dir.path())).unwrap();
    let err = extractor
        .run("https://example.com/arcgis/rest/services/Test/ImageServer")
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::InvalidServiceUrl(_)));
    assert!(err.to_string().contains("only works with FeatureServer and MapServer"));
}

#[tokio::test]
async fn test_no_layers_found() {
    let service = MockService::start().await;
    service
        .mount_definition(definition(
            json!([{ "id": 0, "name": "Group", "subLayerIds": [1] }]),
            json!([]),
        ))
        .await;

    let dir = tempfile::tempdir().unwrap();
    let err = run(&service, config(dir.path())).await.unwrap_err();
    assert!(matches!(err, ExtractError::NoLayersFound));
    assert_eq!(err.to_string(), "Fatal error, no layers found!");
}

#[tokio::test]
async fn test_service_definition_errors() {
    let cases = [
        (
            ResponseTemplate::new(400).set_body_json(json!({ "error": { "code": 400, "message": "Invalid URL" } })),
            "Could not find feature service definition: Invalid URL",
        ),
        (
            ResponseTemplate::new(200).set_body_json(json!({ "error": { "code": 499, "message": "Token Required" } })),
            "Could not find feature service definition: Token Required",
        ),
        (
            ResponseTemplate::new(404).set_body_string("<html>Not Found</html>"),
            "Could not find feature service definition: Request to",
        ),
        (
            ResponseTemplate::new(200).set_body_string("<html>login</html>"),
            "Could not find feature service definition: Unexpected response",
        ),
    ];

    for (response, expected) in cases {
        let service = MockService::start().await;
        service.mount_definition_response(response).await;

        let dir = tempfile::tempdir().unwrap();
        let err = run(&service, config(dir.path())).await.unwrap_err();
        assert!(matches!(err, ExtractError::ServiceDefinition(_)));
        assert!(
            err.to_string().starts_with(expected),
            "'{}' does not start with '{}'",
            err,
            expected
        );
    }
}

#[tokio::test]
async fn test_unreachable_service_is_retried_then_fatal() {
    let service = MockService::start().await;
    service.mount_definition_response(ResponseTemplate::new(503)).await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path()).into_builder().max_attempts(3).build().unwrap();
    let err = run(&service, config).await.unwrap_err();
    assert!(matches!(err, ExtractError::ServiceDefinition(_)));

    let requests = service.server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn test_token_is_sent() {
    let service = MockService::start().await;
    service.mount_definition(definition(hydrants(), json!([]))).await;
    service.mount_point_layer(0, 1, 1, 1).await;
    service.mount_window(0, 1, 1000, points(1, 1), 1).await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path()).into_builder().token("s3cret").build().unwrap();
    run(&service, config).await.unwrap();

    let requests = service.server.received_requests().await.unwrap();
    assert!(!requests.is_empty());
    for request in requests {
        assert!(request.url.query_pairs().any(|(k, v)| k == "token" && v == "s3cret"));
    }
}

// ============================================================================
// Scheduling and cancellation
// ============================================================================

#[tokio::test]
async fn test_concurrent_mode_settles_every_layer() {
    let service = MockService::start().await;
    service
        .mount_definition(definition(
            json!([
                { "id": 0, "name": "Hydrants", "geometryType": "esriGeometryPoint" },
                { "id": 1, "name": "Valves", "geometryType": "esriGeometryPoint" },
                { "id": 2, "name": "Broken", "geometryType": "esriGeometryPoint" }
            ]),
            json!([]),
        ))
        .await;
    for id in [0, 1] {
        service.mount_point_layer(id, 1, 2, 2).await;
        service
            .mount_window_response(
                id,
                1,
                1000,
                ResponseTemplate::new(200)
                    .set_body_json(points(1, 2))
                    .set_delay(Duration::from_millis(100)),
                1,
            )
            .await;
    }
    service.mount_layer(2, point_layer_metadata(None)).await;
    service.mount_bounds(2, None, None).await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path()).into_builder().mode(ScheduleMode::Concurrent).build().unwrap();
    let summary = run(&service, config).await.unwrap();

    let statuses: Vec<_> = summary.layers.iter().map(|o| (o.layer_name.as_str(), o.status)).collect();
    assert_eq!(
        statuses,
        vec![
            ("hydrants", OutcomeStatus::Success),
            ("valves", OutcomeStatus::Success),
            ("broken", OutcomeStatus::Failure),
        ]
    );
    assert_eq!(files_in(dir.path()), vec!["hydrants.geojson", "valves.geojson"]);
}

async fn extract_colliding_names(mode: ScheduleMode) {
    let service = MockService::start().await;
    service
        .mount_definition(definition(
            json!([
                { "id": 0, "name": "Water Mains", "geometryType": "esriGeometryPolyline" },
                { "id": 1, "name": "water-mains", "geometryType": "esriGeometryPolyline" }
            ]),
            json!([{ "id": 2, "name": "Water Mains" }]),
        ))
        .await;
    for (id, records) in [(0, 2), (1, 3), (2, 1)] {
        service.mount_point_layer(id, 1, records, records as u64).await;
        service
            .mount_window_response(
                id,
                1,
                1000,
                ResponseTemplate::new(200)
                    .set_body_json(points(1, records))
                    .set_delay(Duration::from_millis(50)),
                1,
            )
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path()).into_builder().mode(mode).build().unwrap();
    let summary = run(&service, config).await.unwrap();

    assert_eq!(
        files_in(dir.path()),
        vec!["water_mains_0.geojson", "water_mains_1.geojson", "water_mains_2.geojson"]
    );

    let outcomes: Vec<_> = summary.outcomes().collect();
    assert_eq!(outcomes.len(), 3);
    let mut paths = Vec::new();
    for outcome in outcomes {
        assert_eq!(outcome.status, OutcomeStatus::Success, "{:?}", outcome);
        assert_eq!(outcome.layer_name, "water_mains");

        let path = outcome.path.clone().unwrap();
        let doc = read_json(&path);
        assert_eq!(doc["layerId"], outcome.layer_id);
        assert_eq!(doc["features"].as_array().unwrap().len(), outcome.nbr_features);
        paths.push(path);
    }
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 3);
    assert_eq!(summary.layers[0].nbr_features, 2);
    assert_eq!(summary.layers[1].nbr_features, 3);
    assert_eq!(summary.tables[0].nbr_features, 1);
}

#[tokio::test]
async fn test_colliding_names_write_separate_files_sequentially() {
    extract_colliding_names(ScheduleMode::Sequential).await;
}

#[tokio::test]
async fn test_colliding_names_write_separate_files_concurrently() {
    extract_colliding_names(ScheduleMode::Concurrent).await;
}

#[tokio::test]
async fn test_cancelled_run_discards_outputs() {
    let service = MockService::start().await;
    service.mount_definition(definition(hydrants(), json!([]))).await;
    service.mount_point_layer(0, 1, 2, 2).await;
    service.mount_window(0, 1, 1000, points(1, 2), 0).await;

    let dir = tempfile::tempdir().unwrap();
    let extractor = Extractor::new(config(dir.path())).unwrap();
    extractor.cancellation_token().cancel();
    let summary = extractor.run(&service.url()).await.unwrap();

    let outcome = &summary.layers[0];
    assert_eq!(outcome.status, OutcomeStatus::Failure);
    assert_eq!(outcome.reason.as_deref(), Some("extraction cancelled"));
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_run_timeout_stops_issuing_windows() {
    let service = MockService::start().await;
    service.mount_definition(definition(hydrants(), json!([]))).await;
    service.mount_point_layer(0, 1, 100, 100).await;
    for id in 1..=100 {
        service
            .mount_window_response(
                0,
                id,
                id,
                ResponseTemplate::new(200)
                    .set_body_json(points(id, id))
                    .set_delay(Duration::from_millis(200)),
                0..=1u64,
            )
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path())
        .into_builder()
        .steps(1)
        .run_timeout_secs(1)
        .build()
        .unwrap();
    let summary = run(&service, config).await.unwrap();
    let outcome = &summary.layers[0];

    assert_eq!(outcome.status, OutcomeStatus::Failure);
    assert_eq!(outcome.reason.as_deref(), Some("extraction cancelled"));
    assert!(outcome.nbr_features < 100);
    assert!(files_in(dir.path()).is_empty());
}

// ============================================================================
// Format conversion
// ============================================================================

struct CopyConverter;

#[async_trait]
impl VectorConverter for CopyConverter {
    async fn convert(&self, geojson: &Path) -> fscache_extract::Result<PathBuf> {
        let target = geojson.with_extension("json");
        tokio::fs::copy(geojson, &target).await?;
        Ok(target)
    }
}

struct FailingConverter;

#[async_trait]
impl VectorConverter for FailingConverter {
    async fn convert(&self, _geojson: &Path) -> fscache_extract::Result<PathBuf> {
        Err(ExtractError::conversion("toolkit not installed"))
    }
}

#[tokio::test]
async fn test_converter_receives_committed_output() {
    let service = MockService::start().await;
    service.mount_definition(definition(hydrants(), json!([]))).await;
    service.mount_point_layer(0, 1, 2, 2).await;
    service.mount_window(0, 1, 1000, points(1, 2), 1).await;

    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(HttpTransport::new().unwrap());
    let summary = Extractor::with_transport(config(dir.path()), transport)
        .unwrap()
        .with_converter(Arc::new(CopyConverter))
        .run(&service.url())
        .await
        .unwrap();

    let outcome = &summary.layers[0];
    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.converted_path.as_deref(), Some(dir.path().join("hydrants.json").as_path()));
    assert_eq!(files_in(dir.path()), vec!["hydrants.geojson", "hydrants.json"]);
}

#[tokio::test]
async fn test_converter_failure_keeps_geojson() {
    let service = MockService::start().await;
    service.mount_definition(definition(hydrants(), json!([]))).await;
    service.mount_point_layer(0, 1, 2, 2).await;
    service.mount_window(0, 1, 1000, points(1, 2), 1).await;

    let dir = tempfile::tempdir().unwrap();
    let summary = Extractor::new(config(dir.path()))
        .unwrap()
        .with_converter(Arc::new(FailingConverter))
        .run(&service.url())
        .await
        .unwrap();

    let outcome = &summary.layers[0];
    assert_eq!(outcome.status, OutcomeStatus::Warning);
    assert_eq!(outcome.conversion_error.as_deref(), Some("Format conversion failed: toolkit not installed"));
    assert_eq!(files_in(dir.path()), vec!["hydrants.geojson"]);
}
