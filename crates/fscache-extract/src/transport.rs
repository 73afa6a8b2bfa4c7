//! Network transport
//!
//! [`Transport`] issues exactly one GET and classifies the answer. Retries and
//! timeouts are not its concern; see [`crate::fetcher`].

use crate::error::{ExtractError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use url::Url;

const USER_AGENT: &str = concat!("fscache/", env!("CARGO_PKG_VERSION"));

/// One request, one JSON document
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_json(&self, url: &Url) -> Result<Value>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, url: &Url) -> Result<Value> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            // Services usually explain failures in a JSON `error` member
            let reason = serde_json::from_slice::<Value>(&body)
                .ok()
                .and_then(|doc| remote_error(&doc));
            return Err(match reason {
                Some((_, message)) => ExtractError::RemoteError {
                    code: i64::from(status.as_u16()),
                    message,
                },
                None => ExtractError::Status {
                    url: redact(url),
                    status: status.as_u16(),
                },
            });
        }

        let doc: Value = serde_json::from_slice(&body).map_err(|e| {
            ExtractError::UnexpectedResponse {
                url: redact(url),
                reason: format!("body is not JSON ({})", e),
            }
        })?;
        check_remote_error(doc)
    }
}

/// Turn a 200 response carrying an `error` member into an error.
pub fn check_remote_error(doc: Value) -> Result<Value> {
    match remote_error(&doc) {
        Some((code, message)) => Err(ExtractError::RemoteError { code, message }),
        None => Ok(doc),
    }
}

/// Extract `(code, message)` from an `error` member, which is either an
/// object `{code, message, details}` or a bare string.
fn remote_error(doc: &Value) -> Option<(i64, String)> {
    match doc.get("error")? {
        Value::String(message) => Some((0, message.clone())),
        Value::Object(err) => {
            let code = err.get("code").and_then(Value::as_i64).unwrap_or(0);
            let mut message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            let details: Vec<&str> = err
                .get("details")
                .and_then(Value::as_array)
                .map(|d| d.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            if !details.is_empty() {
                message = format!("{} ({})", message, details.join("; "));
            }
            Some((code, message))
        },
        _ => None,
    }
}

/// URL as a string with the `token` parameter masked, for logs and errors.
pub fn redact(url: &Url) -> String {
    if !url.query_pairs().any(|(k, _)| k == "token") {
        return url.to_string();
    }
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "token" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}
