//! Extraction run orchestrator
//!
//! [`Extractor::run`] validates the service URL, reads the service definition,
//! enumerates layers and extracts each one into its own staged GeoJSON file.
//! Layers run one after another or all together depending on
//! [`ScheduleMode`]; in both modes the run returns only after every layer has
//! settled.
//!
//! Within a layer, windows are fetched strictly one at a time.

use crate::client::{parse_service_url, ServiceClient};
use crate::config::{ExtractConfig, ScheduleMode};
use crate::convert::VectorConverter;
use crate::error::{ExtractError, Result};
use crate::fetcher::RetryingFetcher;
use crate::outcome::{arbitrate, ExtractionOutcome, LayerTally, OutcomeStatus, RunSummary};
use crate::paginator::{effective_step, Paginator};
use crate::range::{identifier_field, resolve_range};
use crate::service::{enumerate_layers, LayerDescriptor, LayerKind};
use crate::transform::{FeatureTransformer, Transformed};
use crate::transport::{HttpTransport, Transport};
use crate::writer::FeatureCollectionWriter;
use fscache_common::naming::layer_file_name;
use fscache_common::staging::StagedFile;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

const OUTPUT_EXTENSION: &str = "geojson";

/// Extracts every layer of a service according to one [`ExtractConfig`]
pub struct Extractor {
    config: Arc<ExtractConfig>,
    transport: Arc<dyn Transport>,
    converter: Option<Arc<dyn VectorConverter>>,
    cancel: CancellationToken,
}

impl Extractor {
    /// Create an extractor talking HTTP through reqwest
    pub fn new(config: ExtractConfig) -> Result<Self> {
        Self::with_transport(config, Arc::new(HttpTransport::new()?))
    }

    /// Create an extractor on top of a custom transport
    pub fn with_transport(config: ExtractConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            transport,
            converter: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Convert every kept GeoJSON output with `converter`
    pub fn with_converter(mut self, converter: Arc<dyn VectorConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Token that stops the run when cancelled.
    ///
    /// Layers stop issuing window requests, close their streams and report
    /// `Failure`. Requests already in flight finish or time out on their own.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Extract every eligible layer and table of the service at `service_url`.
    ///
    /// Errors are run-level only: a malformed URL, an unreachable or invalid
    /// service definition, no layers to extract, or an unusable output
    /// folder. Layer failures are reported in the returned summary.
    pub async fn run(&self, service_url: &str) -> Result<RunSummary> {
        let url = parse_service_url(service_url)?;
        info!("Extracting service {}", url);

        let fetcher = RetryingFetcher::new(self.transport.clone(), self.config.retry_policy());
        let client = ServiceClient::new(url, fetcher, self.config.token.clone());

        let definition = client.service_definition().await?;
        let layers = enumerate_layers(&definition, &self.config)?;

        tokio::fs::create_dir_all(&self.config.folder).await?;

        let run_token = self.cancel.child_token();
        // cancelling on drop also stops the timer below
        let _run_guard = run_token.clone().drop_guard();
        if let Some(deadline) = self.config.run_timeout() {
            let timer_token = run_token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(deadline) => {
                        warn!(?deadline, "Run timeout elapsed, cancelling extraction");
                        timer_token.cancel();
                    }
                    _ = timer_token.cancelled() => {}
                }
            });
        }

        let results: Vec<(LayerKind, ExtractionOutcome)> = match self.config.mode {
            ScheduleMode::Sequential => {
                let mut results = Vec::with_capacity(layers.len());
                for layer in layers {
                    let kind = layer.kind;
                    results.push((kind, self.extract_layer(&client, layer, &run_token).await));
                }
                results
            },
            ScheduleMode::Concurrent => {
                let tasks = layers.into_iter().map(|layer| {
                    let client = &client;
                    let run_token = &run_token;
                    async move {
                        let kind = layer.kind;
                        (kind, self.extract_layer(client, layer, run_token).await)
                    }
                });
                join_all(tasks).await
            },
        };

        let mut summary = RunSummary::default();
        for (kind, outcome) in results {
            summary.push(kind, outcome);
        }

        info!(
            "Extraction complete: {} succeeded, {} with warnings, {} failed",
            summary.count(OutcomeStatus::Success),
            summary.count(OutcomeStatus::Warning),
            summary.count(OutcomeStatus::Failure)
        );
        Ok(summary)
    }

    /// Extract one layer. Never fails: layer-fatal errors become a `Failure`
    /// outcome.
    #[instrument(skip_all, fields(layer = %layer.name, id = layer.id))]
    async fn extract_layer(
        &self,
        client: &ServiceClient,
        mut layer: LayerDescriptor,
        cancel: &CancellationToken,
    ) -> ExtractionOutcome {
        match self.try_extract_layer(client, &mut layer, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Layer extraction failed");
                ExtractionOutcome::failed(&layer, e.to_string())
            },
        }
    }

    async fn try_extract_layer(
        &self,
        client: &ServiceClient,
        layer: &mut LayerDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ExtractionOutcome> {
        let config = &self.config;
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        let metadata = client.layer_metadata(layer.id).await?;
        layer.apply_metadata(&metadata, config.parse_domains);
        if !layer.domains.is_empty() {
            debug!(fields = ?layer.domains.field_names().collect::<Vec<_>>(), "Found coded-value domains");
        }

        let id_field = identifier_field(config.id_field.as_deref(), &metadata).ok_or_else(|| {
            ExtractError::IdentifierFieldMissing {
                layer: layer.name.clone(),
            }
        })?;

        match client.record_count(layer.id).await {
            Ok(count) => {
                info!(count, "Layer {} has {} records", layer.display_name, count);
                layer.count = Some(count);
            },
            Err(e) => warn!(error = %e, "Could not count records"),
        }

        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        let range = resolve_range(client, layer.id, &id_field)
            .await
            .into_result(&layer.name)?;
        let step = effective_step(config.steps, layer.max_record_count);
        if step < config.steps {
            debug!(step, "Window width reduced to the layer's record limit");
        }

        let final_path = config
            .folder
            .join(layer_file_name(&config.prefix, &layer.file_stem, OUTPUT_EXTENSION));
        let (staged, file) = StagedFile::create(&final_path).await?;
        let mut writer = FeatureCollectionWriter::begin(file, layer.id, config.pretty).await?;

        let transformer = FeatureTransformer::new(config.format, &layer.domains, layer.expects_geometry());
        let mut tally = LayerTally::new(config.max_error_examples);
        let out_fields = config.out_fields();
        let mut index = 0usize;

        for window in Paginator::new(range, step) {
            if cancel.is_cancelled() {
                warn!(window_start = window.start, "Extraction cancelled, closing output");
                tally.fail(ExtractError::Cancelled.to_string());
                break;
            }

            let page = match client
                .query_window(layer.id, &id_field, window, config.format, &out_fields)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        window_start = window.start,
                        window_end = window.end,
                        error = %e,
                        "Window failed, continuing with the next one"
                    );
                    tally.record_window_failure(index, window, e.to_string());
                    continue;
                },
            };

            tally.record_window();
            if page.exceeded_transfer_limit {
                warn!(
                    window_start = window.start,
                    window_end = window.end,
                    "Service truncated the window at its transfer limit"
                );
            }
            debug!(
                window_start = window.start,
                window_end = window.end,
                records = page.records.len(),
                "Window fetched"
            );

            for raw in page.records {
                let Transformed { feature, issue } = transformer.transform(raw);

                let mut unserializable = None;
                let written = writer
                    .write_feature(&feature, |_, _, e| unserializable = Some(e.to_string()))
                    .await?;

                if !written {
                    let reason = format!(
                        "Feature could not be serialized: {}",
                        unserializable.unwrap_or_default()
                    );
                    tally.record_issue(index, reason, || Value::Null);
                } else {
                    tally.record_feature();
                    if let Some(issue) = issue {
                        let raw = issue.raw;
                        tally.record_issue(index, issue.reason, || {
                            raw.unwrap_or_else(|| serde_json::to_value(&feature).unwrap_or(Value::Null))
                        });
                    }
                }
                index += 1;
            }
        }

        drop(writer.finish().await?);

        if let Some(expected) = layer.count {
            if expected != tally.features() as u64 {
                warn!(expected, written = tally.features(), "Record count mismatch");
            }
        }

        let verdict = arbitrate(&tally);
        let keep = verdict.keep;
        let mut outcome = ExtractionOutcome::new(layer, tally, verdict);

        if keep {
            let path = staged.commit().await?;
            if let Some(converter) = &self.converter {
                match converter.convert(&path).await {
                    Ok(converted) => outcome.converted_path = Some(converted),
                    Err(e) => {
                        warn!(error = %e, "Format conversion failed, keeping GeoJSON output");
                        outcome.conversion_error = Some(e.to_string());
                        if outcome.status == OutcomeStatus::Success {
                            outcome.status = OutcomeStatus::Warning;
                        }
                    },
                }
            }
            outcome.path = Some(path);
        } else {
            staged.discard().await?;
        }

        info!(
            features = outcome.nbr_features,
            errors = outcome.nbr_errors,
            status = ?outcome.status,
            "Layer {} finished",
            layer.name
        );
        Ok(outcome)
    }
}
