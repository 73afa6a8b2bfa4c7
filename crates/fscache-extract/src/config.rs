//! Extraction run configuration
//!
//! [`ExtractConfig`] is built once per run and then only read. Every component
//! receives it (or the values derived from it) explicitly; nothing toggles it
//! while a run is in flight.

use crate::error::{ExtractError, Result};
use crate::fetcher::RetryPolicy;
use fscache_common::naming::normalize_layer_name;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

/// Default number of identifiers covered by one window request.
pub const DEFAULT_STEPS: u64 = 1000;

/// Default per-request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default number of attempts per request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default fixed delay between attempts in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Default cap on captured error examples per layer.
pub const DEFAULT_MAX_ERROR_EXAMPLES: usize = 10;

/// Wire format requested from the service for window queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Esri JSON, converted to GeoJSON locally
    Json,
    /// GeoJSON produced by the service
    #[default]
    Geojson,
}

impl WireFormat {
    /// Value of the `f=` query parameter
    pub fn as_query_value(self) -> &'static str {
        match self {
            WireFormat::Json => "json",
            WireFormat::Geojson => "geojson",
        }
    }
}

impl std::str::FromStr for WireFormat {
    type Err = ExtractError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" | "esrijson" => Ok(WireFormat::Json),
            "geojson" => Ok(WireFormat::Geojson),
            _ => Err(ExtractError::config(format!(
                "Invalid format '{}', expected 'json' or 'geojson'",
                s
            ))),
        }
    }
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_query_value())
    }
}

/// How layers of one run are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    /// One layer at a time
    #[default]
    Sequential,
    /// All layers at once, joined before the run completes
    Concurrent,
}

impl std::str::FromStr for ScheduleMode {
    type Err = ExtractError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" | "layer-by-layer" => Ok(ScheduleMode::Sequential),
            "concurrent" | "parallel" => Ok(ScheduleMode::Concurrent),
            _ => Err(ExtractError::config(format!(
                "Invalid mode '{}', expected 'sequential' or 'concurrent'",
                s
            ))),
        }
    }
}

/// Access token appended to every request. Never printed.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiToken(***)")
    }
}

/// Immutable per-run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Output directory, created if absent
    pub folder: PathBuf,

    /// Prefix added to every output file name
    pub prefix: String,

    /// Only extract layers whose normalized name contains this substring
    pub filter: Option<String>,

    /// Identifier field to paginate on, overriding detection
    pub id_field: Option<String>,

    /// Wire format requested for window queries
    pub format: WireFormat,

    /// Window width in identifiers
    pub steps: u64,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,

    /// Attempts per request, including the first
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds
    pub retry_delay_ms: u64,

    /// Indent the output documents
    pub pretty: bool,

    #[serde(skip_serializing)]
    pub token: Option<ApiToken>,

    /// `outFields` for window queries
    pub fields: Vec<String>,

    /// Replace coded-value domain codes with their labels
    pub parse_domains: bool,

    pub mode: ScheduleMode,

    /// Also extract the service's tables
    pub include_tables: bool,

    /// Run-level deadline in seconds; cancels the run when it elapses
    pub run_timeout_secs: Option<u64>,

    /// Maximum number of error examples kept per layer
    pub max_error_examples: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("./export"),
            prefix: String::new(),
            filter: None,
            id_field: None,
            format: WireFormat::Geojson,
            steps: DEFAULT_STEPS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            pretty: false,
            token: None,
            fields: vec!["*".to_string()],
            parse_domains: true,
            mode: ScheduleMode::Sequential,
            include_tables: true,
            run_timeout_secs: None,
            max_error_examples: DEFAULT_MAX_ERROR_EXAMPLES,
        }
    }
}

impl ExtractConfig {
    /// Load configuration from `FSCACHE_*` environment variables on top of
    /// the defaults.
    ///
    /// Environment variables:
    /// - `FSCACHE_FOLDER`, `FSCACHE_PREFIX`, `FSCACHE_FILTER`, `FSCACHE_ID_FIELD`
    /// - `FSCACHE_FORMAT`: json or geojson
    /// - `FSCACHE_STEPS`, `FSCACHE_TIMEOUT_MS`, `FSCACHE_MAX_ATTEMPTS`, `FSCACHE_RETRY_DELAY_MS`
    /// - `FSCACHE_PRETTY`, `FSCACHE_PARSE_DOMAINS`, `FSCACHE_INCLUDE_TABLES`: true/false
    /// - `FSCACHE_TOKEN`
    /// - `FSCACHE_MODE`: sequential or concurrent
    /// - `FSCACHE_RUN_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(folder) = std::env::var("FSCACHE_FOLDER") {
            config.folder = PathBuf::from(folder);
        }
        if let Ok(prefix) = std::env::var("FSCACHE_PREFIX") {
            config.prefix = prefix;
        }
        if let Ok(filter) = std::env::var("FSCACHE_FILTER") {
            config.filter = Some(filter);
        }
        if let Ok(field) = std::env::var("FSCACHE_ID_FIELD") {
            config.id_field = Some(field);
        }
        if let Ok(format) = std::env::var("FSCACHE_FORMAT") {
            config.format = format.parse()?;
        }
        if let Some(steps) = parse_env("FSCACHE_STEPS")? {
            config.steps = steps;
        }
        if let Some(timeout) = parse_env("FSCACHE_TIMEOUT_MS")? {
            config.timeout_ms = timeout;
        }
        if let Some(attempts) = parse_env("FSCACHE_MAX_ATTEMPTS")? {
            config.max_attempts = attempts;
        }
        if let Some(delay) = parse_env("FSCACHE_RETRY_DELAY_MS")? {
            config.retry_delay_ms = delay;
        }
        if let Some(pretty) = parse_env("FSCACHE_PRETTY")? {
            config.pretty = pretty;
        }
        if let Some(parse_domains) = parse_env("FSCACHE_PARSE_DOMAINS")? {
            config.parse_domains = parse_domains;
        }
        if let Some(include_tables) = parse_env("FSCACHE_INCLUDE_TABLES")? {
            config.include_tables = include_tables;
        }
        if let Ok(token) = std::env::var("FSCACHE_TOKEN") {
            if !token.is_empty() {
                config.token = Some(ApiToken::new(token));
            }
        }
        if let Ok(mode) = std::env::var("FSCACHE_MODE") {
            config.mode = mode.parse()?;
        }
        if let Some(secs) = parse_env("FSCACHE_RUN_TIMEOUT_SECS")? {
            config.run_timeout_secs = Some(secs);
        }

        Ok(config)
    }

    /// Create a builder starting from the defaults
    pub fn builder() -> ExtractConfigBuilder {
        ExtractConfigBuilder::default()
    }

    /// Continue building from this configuration
    pub fn into_builder(self) -> ExtractConfigBuilder {
        ExtractConfigBuilder { config: self }
    }

    /// Check invariants the extraction pipeline relies on
    pub fn validate(&self) -> Result<()> {
        if self.steps == 0 {
            return Err(ExtractError::config("steps must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(ExtractError::config("max_attempts must be at least 1"));
        }
        if self.timeout_ms == 0 {
            return Err(ExtractError::config("timeout must be greater than zero"));
        }
        if self.fields.is_empty() {
            return Err(ExtractError::config("at least one output field is required"));
        }
        if self.run_timeout_secs == Some(0) {
            return Err(ExtractError::config("run timeout must be greater than zero"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
            timeout: self.timeout(),
        }
    }

    /// Comma-joined `outFields` value
    pub fn out_fields(&self) -> String {
        self.fields.join(",")
    }

    /// Match a normalized layer name against the filter, normalized the same way
    pub fn matches_filter(&self, layer_name: &str) -> bool {
        match &self.filter {
            Some(filter) => layer_name.contains(&normalize_layer_name(filter)),
            None => true,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ExtractError::config(format!("Invalid value for {}: '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

/// Builder for ExtractConfig
#[derive(Default)]
pub struct ExtractConfigBuilder {
    config: ExtractConfig,
}

impl ExtractConfigBuilder {
    pub fn folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.config.folder = folder.into();
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.config.filter = Some(filter.into());
        self
    }

    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.config.id_field = Some(field.into());
        self
    }

    pub fn format(mut self, format: WireFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn steps(mut self, steps: u64) -> Self {
        self.config.steps = steps;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.timeout_ms = timeout_ms;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.config.retry_delay_ms = delay_ms;
        self
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.config.pretty = pretty;
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = Some(ApiToken::new(token));
        self
    }

    pub fn fields(mut self, fields: Vec<String>) -> Self {
        self.config.fields = fields;
        self
    }

    pub fn parse_domains(mut self, parse: bool) -> Self {
        self.config.parse_domains = parse;
        self
    }

    pub fn mode(mut self, mode: ScheduleMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn include_tables(mut self, include: bool) -> Self {
        self.config.include_tables = include;
        self
    }

    pub fn run_timeout_secs(mut self, secs: u64) -> Self {
        self.config.run_timeout_secs = Some(secs);
        self
    }

    pub fn max_error_examples(mut self, max: usize) -> Self {
        self.config.max_error_examples = max;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<ExtractConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
