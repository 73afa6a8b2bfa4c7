//! fscache - extract ArcGIS service layers to GeoJSON

use anyhow::{Context, Result};
use clap::Parser;
use fscache_common::logging::{init_logging, LogConfig, LogLevel};
use fscache_extract::{ExtractConfig, Extractor, ScheduleMode, WireFormat};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "fscache")]
#[command(author, version, about = "Extract every record of an ArcGIS FeatureServer or MapServer to GeoJSON")]
struct Cli {
    /// Service URL ending in FeatureServer or MapServer
    service_url: String,

    /// Output directory
    #[arg(short, long)]
    folder: Option<PathBuf>,

    /// Prefix for output file names
    #[arg(short, long)]
    prefix: Option<String>,

    /// Only extract layers whose name contains this text
    #[arg(long)]
    filter: Option<String>,

    /// Identifier field to paginate on
    #[arg(long = "id-field")]
    id_field: Option<String>,

    /// Wire format requested from the service (json or geojson)
    #[arg(long)]
    format: Option<WireFormat>,

    /// Identifiers per window request
    #[arg(short, long)]
    steps: Option<u64>,

    /// Per-request timeout in milliseconds
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Attempts per request
    #[arg(long = "max-attempts")]
    max_attempts: Option<u32>,

    /// Delay between attempts in milliseconds
    #[arg(long = "retry-delay-ms")]
    retry_delay_ms: Option<u64>,

    /// Indent output files
    #[arg(long)]
    pretty: bool,

    /// Access token
    #[arg(long, env = "FSCACHE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Comma-separated output fields
    #[arg(long, value_delimiter = ',')]
    fields: Option<Vec<String>>,

    /// Keep coded-value domain codes instead of their labels
    #[arg(long = "raw-domains")]
    raw_domains: bool,

    /// Layer scheduling (sequential or concurrent)
    #[arg(long)]
    mode: Option<ScheduleMode>,

    /// Skip the service's tables
    #[arg(long = "no-tables")]
    no_tables: bool,

    /// Cancel the run after this many seconds
    #[arg(long = "run-timeout-secs")]
    run_timeout_secs: Option<u64>,

    /// Error examples kept per layer
    #[arg(long = "max-error-examples")]
    max_error_examples: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Apply command line options on top of the environment configuration
    fn into_config(self, base: ExtractConfig) -> Result<ExtractConfig> {
        let mut builder = base.into_builder();

        if let Some(folder) = self.folder {
            builder = builder.folder(folder);
        }
        if let Some(prefix) = self.prefix {
            builder = builder.prefix(prefix);
        }
        if let Some(filter) = self.filter {
            builder = builder.filter(filter);
        }
        if let Some(field) = self.id_field {
            builder = builder.id_field(field);
        }
        if let Some(format) = self.format {
            builder = builder.format(format);
        }
        if let Some(steps) = self.steps {
            builder = builder.steps(steps);
        }
        if let Some(timeout) = self.timeout_ms {
            builder = builder.timeout_ms(timeout);
        }
        if let Some(attempts) = self.max_attempts {
            builder = builder.max_attempts(attempts);
        }
        if let Some(delay) = self.retry_delay_ms {
            builder = builder.retry_delay_ms(delay);
        }
        if self.pretty {
            builder = builder.pretty(true);
        }
        if let Some(token) = self.token.filter(|t| !t.is_empty()) {
            builder = builder.token(token);
        }
        if let Some(fields) = self.fields {
            builder = builder.fields(fields);
        }
        if self.raw_domains {
            builder = builder.parse_domains(false);
        }
        if let Some(mode) = self.mode {
            builder = builder.mode(mode);
        }
        if self.no_tables {
            builder = builder.include_tables(false);
        }
        if let Some(secs) = self.run_timeout_secs {
            builder = builder.run_timeout_secs(secs);
        }
        if let Some(max) = self.max_error_examples {
            builder = builder.max_error_examples(max);
        }

        Ok(builder.build()?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("fscache")
        .build();

    // Merge with environment variables (they take precedence)
    let log_config = log_config.merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    let service_url = cli.service_url.clone();
    let config = cli
        .into_config(ExtractConfig::from_env()?)
        .context("Invalid configuration")?;
    info!(
        folder = %config.folder.display(),
        steps = config.steps,
        format = %config.format,
        mode = ?config.mode,
        "Starting extraction"
    );

    let extractor = Extractor::new(config)?;
    let cancel = extractor.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight requests");
            cancel.cancel();
        }
    });

    let summary = match extractor.run(&service_url).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        },
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
