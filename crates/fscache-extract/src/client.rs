//! Query client for one feature or map service
//!
//! Builds the metadata, count, identifier-order and window query URLs and
//! sends them through the [`RetryingFetcher`].

use crate::config::{ApiToken, WireFormat};
use crate::error::{ExtractError, Result};
use crate::fetcher::RetryingFetcher;
use crate::paginator::Window;
use crate::service::{LayerMetadata, ServiceDefinition};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Sort direction for identifier boundary queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn keyword(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

/// Validate a service URL and normalize it to end with `/`.
///
/// Only URLs with a `FeatureServer` or `MapServer` path segment are accepted.
pub fn parse_service_url(raw: &str) -> Result<Url> {
    let mut url =
        Url::parse(raw.trim()).map_err(|_| ExtractError::InvalidServiceUrl(raw.to_string()))?;

    let is_service = url
        .path_segments()
        .map(|mut segments| segments.any(|s| s == "FeatureServer" || s == "MapServer"))
        .unwrap_or(false);
    if !is_service {
        return Err(ExtractError::InvalidServiceUrl(raw.to_string()));
    }

    url.set_query(None);
    url.set_fragment(None);
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// One page of a window query
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Raw feature objects, in whatever shape the wire format uses
    pub records: Vec<Value>,
    /// The service cut the page short at its record limit
    pub exceeded_transfer_limit: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdsResponse {
    #[serde(default)]
    object_ids: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

/// Client bound to one service URL
#[derive(Clone)]
pub struct ServiceClient {
    service_url: Url,
    fetcher: RetryingFetcher,
    token: Option<ApiToken>,
}

impl ServiceClient {
    pub fn new(service_url: Url, fetcher: RetryingFetcher, token: Option<ApiToken>) -> Self {
        Self {
            service_url,
            fetcher,
            token,
        }
    }

    pub fn service_url(&self) -> &Url {
        &self.service_url
    }

    /// Fetch the service definition. Any failure is run-level.
    pub async fn service_definition(&self) -> Result<ServiceDefinition> {
        let url = self.with_query(self.service_url.clone(), &[("f", "json")]);
        let doc = self
            .fetcher
            .fetch(&url)
            .await
            .map_err(|e| ExtractError::ServiceDefinition(e.definition_reason()))?;
        serde_json::from_value(doc).map_err(|e| ExtractError::ServiceDefinition(e.to_string()))
    }

    /// Fetch a layer or table document
    pub async fn layer_metadata(&self, layer_id: i64) -> Result<LayerMetadata> {
        let url = self.with_query(self.layer_url(layer_id)?, &[("f", "json")]);
        self.fetcher.fetch_as(&url).await
    }

    /// Number of records currently in the layer
    pub async fn record_count(&self, layer_id: i64) -> Result<u64> {
        let url = self.with_query(
            self.query_url(layer_id)?,
            &[("where", "1=1"), ("returnCountOnly", "true"), ("f", "json")],
        );
        let response: CountResponse = self.fetcher.fetch_as(&url).await?;
        Ok(response.count)
    }

    /// Smallest or largest identifier value of the layer, `None` when the
    /// layer has no records.
    pub async fn boundary_id(
        &self,
        layer_id: i64,
        id_field: &str,
        order: SortOrder,
    ) -> Result<Option<i64>> {
        let order_by = format!("{} {}", id_field, order.keyword());
        let query_url = self.query_url(layer_id)?;
        let url = self.with_query(
            query_url.clone(),
            &[
                ("where", "1=1"),
                ("returnIdsOnly", "true"),
                ("orderByFields", order_by.as_str()),
                ("resultRecordCount", "1"),
                ("f", "json"),
            ],
        );

        let response: IdsResponse = self.fetcher.fetch_as(&url).await?;
        let first = response.object_ids.unwrap_or_default().into_iter().next();
        match first {
            None => Ok(None),
            Some(value) => value.as_i64().map(Some).ok_or_else(|| {
                ExtractError::UnexpectedResponse {
                    url: query_url.to_string(),
                    reason: format!("identifier {} is not an integer", value),
                }
            }),
        }
    }

    /// Fetch every record whose identifier falls inside `window`
    pub async fn query_window(
        &self,
        layer_id: i64,
        id_field: &str,
        window: Window,
        format: WireFormat,
        out_fields: &str,
    ) -> Result<Page> {
        let clause = format!("{} between {} and {}", id_field, window.start, window.end);
        let url = self.with_query(
            self.query_url(layer_id)?,
            &[
                ("where", clause.as_str()),
                ("outFields", out_fields),
                ("f", format.as_query_value()),
            ],
        );
        debug!(layer_id, window_start = window.start, window_end = window.end, "Querying window");

        let doc = self.fetcher.fetch(&url).await?;
        parse_page(doc, format)
    }

    fn layer_url(&self, layer_id: i64) -> Result<Url> {
        self.service_url
            .join(&format!("{}/", layer_id))
            .map_err(|e| ExtractError::InvalidServiceUrl(e.to_string()))
    }

    fn query_url(&self, layer_id: i64) -> Result<Url> {
        self.service_url
            .join(&format!("{}/query", layer_id))
            .map_err(|e| ExtractError::InvalidServiceUrl(e.to_string()))
    }

    fn with_query(&self, mut url: Url, params: &[(&str, &str)]) -> Url {
        {
            let mut query = url.query_pairs_mut();
            if let Some(token) = &self.token {
                query.append_pair("token", token.expose());
            }
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        url
    }
}

/// Split a window response into its features and the truncation flag.
///
/// GeoJSON responses carry the flag under `properties`, Esri JSON at the top
/// level.
fn parse_page(mut doc: Value, format: WireFormat) -> Result<Page> {
    let exceeded_transfer_limit = match format {
        WireFormat::Geojson => doc.pointer("/properties/exceededTransferLimit"),
        WireFormat::Json => doc.get("exceededTransferLimit"),
    }
    .and_then(Value::as_bool)
    .or_else(|| doc.get("exceededTransferLimit").and_then(Value::as_bool))
    .unwrap_or(false);

    let records = match doc.get_mut("features").map(Value::take) {
        Some(Value::Array(features)) => features,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            return Err(ExtractError::UnexpectedResponse {
                url: String::from("window query"),
                reason: format!("`features` is not an array: {}", other),
            })
        },
    };

    Ok(Page {
        records,
        exceeded_transfer_limit,
    })
}
