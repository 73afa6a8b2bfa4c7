//! Per-layer outcomes and the run summary
//!
//! A [`LayerTally`] accumulates counts while a layer streams. Once the stream
//! is closed, [`arbitrate`] turns it into a [`Verdict`]: the status and
//! whether the written artifact is kept.

use crate::paginator::Window;
use crate::service::{LayerDescriptor, LayerKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Success,
    Warning,
    Failure,
}

/// One captured error, with the offending record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorExample {
    pub index: usize,
    pub feature: Value,
    pub reason: String,
}

/// Counts gathered while a layer is extracted
#[derive(Debug, Clone)]
pub struct LayerTally {
    max_examples: usize,
    features: usize,
    record_errors: usize,
    windows_attempted: usize,
    windows_failed: usize,
    examples: Vec<ErrorExample>,
    fatal: Option<String>,
}

impl LayerTally {
    pub fn new(max_examples: usize) -> Self {
        Self {
            max_examples,
            features: 0,
            record_errors: 0,
            windows_attempted: 0,
            windows_failed: 0,
            examples: Vec::new(),
            fatal: None,
        }
    }

    pub fn features(&self) -> usize {
        self.features
    }

    pub fn errors(&self) -> usize {
        self.record_errors + self.windows_failed
    }

    pub fn windows_failed(&self) -> usize {
        self.windows_failed
    }

    pub fn record_feature(&mut self) {
        self.features += 1;
    }

    /// Count a record-level error. `record` is only evaluated while there is
    /// room for another example.
    pub fn record_issue(&mut self, index: usize, reason: impl Into<String>, record: impl FnOnce() -> Value) {
        self.record_errors += 1;
        self.push_example(index, reason.into(), record);
    }

    pub fn record_window(&mut self) {
        self.windows_attempted += 1;
    }

    /// Count a window whose request failed for good. `index` is the stream
    /// position the window's records would have started at.
    pub fn record_window_failure(&mut self, index: usize, window: Window, reason: impl Into<String>) {
        self.windows_attempted += 1;
        self.windows_failed += 1;
        self.push_example(index, reason.into(), || {
            json!({ "window": { "start": window.start, "end": window.end } })
        });
    }

    /// Mark the layer as failed regardless of what was written
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.fatal.get_or_insert_with(|| reason.into());
    }

    fn push_example(&mut self, index: usize, reason: String, record: impl FnOnce() -> Value) {
        if self.examples.len() < self.max_examples {
            self.examples.push(ErrorExample {
                index,
                feature: record(),
                reason,
            });
        }
    }
}

/// Decision on one layer's artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: OutcomeStatus,
    pub keep: bool,
    pub reason: Option<String>,
}

/// Decide a layer's status.
///
/// Failure when the layer hit a layer-fatal error, produced no features, or
/// every attempted window failed. Warning when anything was recorded against
/// it. Success otherwise. Only failed layers lose their artifact.
pub fn arbitrate(tally: &LayerTally) -> Verdict {
    let failure = |reason: String| Verdict {
        status: OutcomeStatus::Failure,
        keep: false,
        reason: Some(reason),
    };

    if let Some(reason) = &tally.fatal {
        return failure(reason.clone());
    }
    if tally.windows_attempted > 0 && tally.windows_failed == tally.windows_attempted {
        return failure(format!("all {} window requests failed", tally.windows_failed));
    }
    if tally.features == 0 {
        return failure("no features extracted".to_string());
    }

    let status = if tally.errors() > 0 {
        OutcomeStatus::Warning
    } else {
        OutcomeStatus::Success
    };
    Verdict {
        status,
        keep: true,
        reason: None,
    }
}

/// Summary of one layer, always reported
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutcome {
    pub layer_name: String,
    pub layer_id: i64,
    pub nbr_features: usize,
    pub nbr_errors: usize,
    pub example_errors: Vec<ErrorExample>,
    pub status: OutcomeStatus,
    pub failed_windows: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Committed artifact, when kept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion_error: Option<String>,

    /// Record count the service reported before extraction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_count: Option<u64>,
}

impl ExtractionOutcome {
    pub fn new(layer: &LayerDescriptor, tally: LayerTally, verdict: Verdict) -> Self {
        Self {
            layer_name: layer.name.clone(),
            layer_id: layer.id,
            nbr_features: tally.features,
            nbr_errors: tally.errors(),
            example_errors: tally.examples,
            status: verdict.status,
            failed_windows: tally.windows_failed,
            reason: verdict.reason,
            path: None,
            converted_path: None,
            conversion_error: None,
            expected_count: layer.count,
        }
    }

    /// Outcome of a layer that failed before anything was streamed
    pub fn failed(layer: &LayerDescriptor, reason: impl Into<String>) -> Self {
        let mut tally = LayerTally::new(0);
        tally.fail(reason);
        let verdict = arbitrate(&tally);
        Self::new(layer, tally, verdict)
    }
}

/// Result of a whole run, split by layers and tables
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub layers: Vec<ExtractionOutcome>,
    pub tables: Vec<ExtractionOutcome>,
}

impl RunSummary {
    pub fn push(&mut self, kind: LayerKind, outcome: ExtractionOutcome) {
        match kind {
            LayerKind::Layer => self.layers.push(outcome),
            LayerKind::Table => self.tables.push(outcome),
        }
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &ExtractionOutcome> {
        self.layers.iter().chain(self.tables.iter())
    }

    /// Number of outcomes with the given status
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes().filter(|o| o.status == status).count()
    }
}
