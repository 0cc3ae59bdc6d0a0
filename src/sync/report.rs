use std::time::Duration;

use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::convert::Compatibility;
use crate::error::Failure;
use crate::model::{AnnotationKind, CoercedValue, RecordId, SourceType};

/// Final state of one attempted field transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
    Success,
    /// The value was empty and nothing was sent.
    Skipped,
    /// The update was computed but not sent.
    DryRun,
}

/// One field transfer recorded on a [`SyncOutcome`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldUpdate {
    pub column: String,
    pub label: String,
    pub annotation_id: Option<String>,
    pub value: Option<CoercedValue>,
    pub source_type: SourceType,
    pub dest_type: AnnotationKind,
    pub compatibility: Option<Compatibility>,
    pub state: UpdateState,
}

/// Record level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Success,
    PartialError,
    Error,
}

/// Result of synchronising one source record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOutcome {
    pub record_id: RecordId,
    pub dossier_number: Option<i64>,
    pub dossier_id: Option<String>,
    pub updates: Vec<FieldUpdate>,
    pub errors: Vec<Failure>,
    pub status: RecordStatus,
}

impl SyncOutcome {
    /// Number of field entries that were sent or would have been sent.
    pub fn applied(&self) -> usize {
        self.updates
            .iter()
            .filter(|update| matches!(update.state, UpdateState::Success | UpdateState::DryRun))
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.status == RecordStatus::Success
    }

    /// Message stored in the source's `sync_message` column.
    pub fn summary(&self) -> String {
        if self.is_success() {
            format!("Synchronized {} annotations", self.applied())
        } else {
            format!("Errors: {}", self.errors.len())
        }
    }
}

/// Category of a batch level diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchErrorKind {
    ConfigError,
    SourceError,
    DestinationError,
}

/// Entry of [`BatchReport::error_details`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    /// A record that did not fully succeed.
    Record(SyncOutcome),
    /// A failure that stopped the batch itself.
    Batch {
        status: BatchErrorKind,
        error: String,
    },
}

/// Compatibility of one mapping, estimated before the batch runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingCompatibility {
    pub column: String,
    pub label: String,
    pub source_type: SourceType,
    pub dest_type: AnnotationKind,
    pub compatibility: Compatibility,
    pub sample_values: Vec<String>,
}

/// Pre-flight compatibility summary over a few sample records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompatibilityReport {
    pub compatible_count: usize,
    pub needs_conversion_count: usize,
    pub incompatible_count: usize,
    pub details: Vec<MappingCompatibility>,
}

impl CompatibilityReport {
    pub fn push(&mut self, entry: MappingCompatibility) {
        match entry.compatibility {
            Compatibility::Compatible => self.compatible_count += 1,
            Compatibility::NeedsConversion => self.needs_conversion_count += 1,
            Compatibility::Incompatible => self.incompatible_count += 1,
        }
        self.details.push(entry);
    }
}

/// Aggregate result of one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    /// Configuration was valid and both stores could be listed.
    pub success: bool,
    pub processed: usize,
    pub successful: usize,
    pub errors: usize,
    pub results: Vec<SyncOutcome>,
    pub error_details: Vec<ErrorDetail>,
    #[serde(rename = "execution_time", serialize_with = "serialize_seconds")]
    pub elapsed: Duration,
    pub interrupted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<CompatibilityReport>,
}

impl BatchReport {
    pub(crate) fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            success: true,
            processed: 0,
            successful: 0,
            errors: 0,
            results: Vec::new(),
            error_details: Vec::new(),
            elapsed: Duration::ZERO,
            interrupted: false,
            compatibility: None,
        }
    }

    /// Report for a batch that stopped before any record was processed.
    pub(crate) fn failed(run_id: Uuid, status: BatchErrorKind, errors: Vec<String>) -> Self {
        let mut report = Self::new(run_id);
        report.success = false;
        report.errors = errors.len();
        report.error_details = errors
            .into_iter()
            .map(|error| ErrorDetail::Batch { status, error })
            .collect();
        report
    }

    /// Classifies a finished record.
    pub(crate) fn record(&mut self, outcome: SyncOutcome) {
        self.processed += 1;
        if outcome.is_success() {
            self.successful += 1;
            self.results.push(outcome);
        } else {
            self.errors += 1;
            self.error_details.push(ErrorDetail::Record(outcome));
        }
    }

    /// Outcomes of records that did not fully succeed.
    pub fn failed_records(&self) -> impl Iterator<Item = &SyncOutcome> {
        self.error_details.iter().filter_map(|detail| match detail {
            ErrorDetail::Record(outcome) => Some(outcome),
            ErrorDetail::Batch { .. } => None,
        })
    }

    /// Batch level diagnostics, if the run stopped early.
    pub fn batch_errors(&self) -> impl Iterator<Item = (BatchErrorKind, &str)> {
        self.error_details.iter().filter_map(|detail| match detail {
            ErrorDetail::Batch { status, error } => Some((*status, error.as_str())),
            ErrorDetail::Record(_) => None,
        })
    }
}

fn serialize_seconds<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}
