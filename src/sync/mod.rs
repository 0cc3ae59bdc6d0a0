//! Batch orchestration: candidate selection, identity resolution, per-record
//! synchronisation and bookkeeping write-back.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{SourceConfig, SyncConfig};
use crate::convert::{Compatibility, resolve};
use crate::error::{Failure, Result};
use crate::io::{CaseSystem, DsClient, GristClient, SourceStore, WorkbookStore};
use crate::model::{
    AnnotationKind, DATE_COLUMN, Fields, HASH_COLUMN, MESSAGE_COLUMN, STATUS_COLUMN, SourceType,
    Value,
};

pub mod change;
pub mod record;
pub mod report;

pub use change::{Candidate, fingerprint, needs_sync, select_candidates};
pub use record::{IdentityMap, RecordSynchronizer, parse_dossier_number};
pub use report::{
    BatchErrorKind, BatchReport, CompatibilityReport, ErrorDetail, FieldUpdate,
    MappingCompatibility, RecordStatus, SyncOutcome, UpdateState,
};

/// Number of candidates inspected by the pre-flight compatibility report.
const COMPATIBILITY_SAMPLE_SIZE: usize = 5;
/// Longest message written to the `sync_message` column.
const MAX_MESSAGE_LEN: usize = 500;

/// Reachability of both stores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionReport {
    /// Error message when the source store could not be reached.
    pub source: Option<String>,
    /// Error message when the case system could not be reached.
    pub destination: Option<String>,
}

impl ConnectionReport {
    pub fn is_ok(&self) -> bool {
        self.source.is_none() && self.destination.is_none()
    }
}

/// Drives a full synchronisation batch from the source store to the case
/// system.
pub struct SyncEngine<S, C> {
    config: SyncConfig,
    source: S,
    cases: C,
    interrupt: Option<Arc<AtomicBool>>,
}

impl SyncEngine<Box<dyn SourceStore>, DsClient> {
    /// Builds the engine with the adapters named by the configuration.
    pub fn connect(config: SyncConfig) -> Result<Self> {
        let source: Box<dyn SourceStore> = match &config.source {
            SourceConfig::Grist {
                base_url,
                token,
                doc_id,
                ..
            } => Box::new(GristClient::new(base_url.as_str(), token.as_str(), doc_id.as_str())?),
            SourceConfig::Workbook { path, .. } => Box::new(WorkbookStore::new(path.clone())),
        };
        let destination = &config.destination;
        let cases = DsClient::new(
            destination.api_url.as_str(),
            destination.token.as_str(),
            destination.instructeur_id.as_str(),
        )?;
        Ok(Self::new(config, source, cases))
    }
}

impl<S: SourceStore, C: CaseSystem> SyncEngine<S, C> {
    pub fn new(config: SyncConfig, source: S, cases: C) -> Self {
        Self {
            config,
            source,
            cases,
            interrupt: None,
        }
    }

    /// Shares a flag that stops the batch before the next record once set.
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cases(&self) -> &C {
        &self.cases
    }

    /// Checks that both stores answer.
    #[instrument(level = "info", skip_all)]
    pub fn test_connections(&self) -> ConnectionReport {
        let source = self.source.test_connection().err().map(|err| err.to_string());
        let destination = self.cases.test_connection().err().map(|err| err.to_string());
        ConnectionReport {
            source,
            destination,
        }
    }

    /// Lists configuration problems, including unreachable stores.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = self.config.problems();
        let connections = self.test_connections();
        if let Some(error) = connections.source {
            problems.push(format!("source connection failed: {error}"));
        }
        if let Some(error) = connections.destination {
            problems.push(format!("destination connection failed: {error}"));
        }
        problems
    }

    /// Runs one batch. Never fails: configuration and listing problems are
    /// reported with `success == false`, record problems on their outcomes.
    pub fn run(&self) -> BatchReport {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let mut report = self.execute(run_id);
        report.elapsed = started.elapsed();
        // A request raised during the last record or the flush still counts.
        report.interrupted |= self.interrupted();

        info!(
            %run_id,
            success = report.success,
            processed = report.processed,
            successful = report.successful,
            errors = report.errors,
            elapsed_secs = report.elapsed.as_secs_f64(),
            "synchronisation finished"
        );
        report
    }

    #[instrument(level = "info", skip(self), fields(table = self.config.source.table_id()))]
    fn execute(&self, run_id: Uuid) -> BatchReport {
        let problems = self.validate();
        if !problems.is_empty() {
            for problem in &problems {
                warn!(%problem, "invalid configuration");
            }
            return BatchReport::failed(run_id, BatchErrorKind::ConfigError, problems);
        }

        let table = self.config.source.table_id();
        let mut candidates = match self.load_candidates(table) {
            Ok(candidates) => candidates,
            Err(error) => {
                warn!(%error, "source records unavailable");
                return BatchReport::failed(run_id, BatchErrorKind::SourceError, vec![error]);
            }
        };
        candidates.truncate(self.config.limit);

        let mut report = BatchReport::new(run_id);
        if candidates.is_empty() {
            info!("no record to synchronise");
            return report;
        }
        info!(count = candidates.len(), "synchronising records");

        let source_types = self.source_types(table);
        let compatibility = self.compatibility_report(&candidates, &source_types);
        info!(
            compatible = compatibility.compatible_count,
            needs_conversion = compatibility.needs_conversion_count,
            incompatible = compatibility.incompatible_count,
            "compatibility report"
        );
        report.compatibility = Some(compatibility);

        let destination = &self.config.destination;
        let identities: IdentityMap = match self
            .cases
            .list_cases(destination.demarche_number, destination.case_listing_limit)
        {
            Ok(cases) => cases.into_iter().map(|case| (case.number, case.id)).collect(),
            Err(err) => {
                warn!(error = %err, "dossier listing failed");
                let mut failed = BatchReport::failed(
                    run_id,
                    BatchErrorKind::DestinationError,
                    vec![format!("failed to list dossiers: {err}")],
                );
                failed.compatibility = report.compatibility;
                return failed;
            }
        };
        debug!(dossiers = identities.len(), "identity map built");

        let synchronizer = RecordSynchronizer::new(&self.cases, &self.config, &source_types);
        for candidate in candidates {
            if self.interrupted() {
                warn!("interrupted, remaining records are left untouched");
                report.interrupted = true;
                break;
            }

            let outcome = synchronizer.sync(&candidate.record, &identities);
            if self.config.update_status && !self.config.dry_run {
                self.write_bookkeeping(table, &candidate, &outcome);
            }
            report.record(outcome);
        }

        if let Err(err) = self.source.flush() {
            warn!(error = %err, "failed to persist source edits");
        }
        report
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn load_candidates(&self, table: &str) -> std::result::Result<Vec<Candidate>, String> {
        if self.config.update_status {
            let records = self
                .source
                .list_records(table, None)
                .map_err(|err| format!("failed to read source records: {err}"))?;
            Ok(select_candidates(
                records,
                &self.config.dossier_number_column,
                &self.config.tracked_columns(),
                self.config.detect_changes,
            ))
        } else {
            let records = self
                .source
                .list_records(table, Some(self.config.limit))
                .map_err(|err| format!("failed to read source records: {err}"))?;
            Ok(records
                .into_iter()
                .map(|record| Candidate {
                    record,
                    fingerprint: None,
                })
                .collect())
        }
    }

    fn source_types(&self, table: &str) -> HashMap<String, SourceType> {
        self.config
            .column_mapping
            .keys()
            .map(|column| (column.clone(), self.source.column_type(table, column)))
            .collect()
    }

    /// Estimates the compatibility of every mapping from a few candidates,
    /// using the configured annotation types.
    pub fn compatibility_report(
        &self,
        candidates: &[Candidate],
        source_types: &HashMap<String, SourceType>,
    ) -> CompatibilityReport {
        let mut report = CompatibilityReport::default();

        for (column, label) in &self.config.column_mapping {
            let source_type = source_types.get(column).cloned().unwrap_or(SourceType::Text);
            let dest_type = self
                .config
                .static_annotation_type(label)
                .unwrap_or(AnnotationKind::Text);

            let samples: Vec<&Value> = candidates
                .iter()
                .take(COMPATIBILITY_SAMPLE_SIZE)
                .filter_map(|candidate| candidate.record.get(column))
                .collect();
            let verdicts: Vec<Compatibility> = samples
                .iter()
                .filter(|value| !value.is_empty())
                .map(|value| resolve(&source_type, &dest_type, Some(*value)))
                .collect();

            let compatibility = if verdicts.contains(&Compatibility::Incompatible) {
                Compatibility::Incompatible
            } else if verdicts.contains(&Compatibility::NeedsConversion) {
                Compatibility::NeedsConversion
            } else {
                Compatibility::Compatible
            };

            report.push(MappingCompatibility {
                column: column.clone(),
                label: label.clone(),
                source_type,
                dest_type,
                compatibility,
                sample_values: samples.iter().take(3).map(|value| value.to_string()).collect(),
            });
        }
        report
    }

    fn write_bookkeeping(&self, table: &str, candidate: &Candidate, outcome: &SyncOutcome) {
        let status = if outcome.is_success() { "success" } else { "error" };
        let mut message = outcome.summary();
        if let Some((index, _)) = message.char_indices().nth(MAX_MESSAGE_LEN) {
            message.truncate(index);
        }

        let mut fields = Fields::new();
        fields.insert(STATUS_COLUMN.to_string(), Value::from(status));
        fields.insert(
            DATE_COLUMN.to_string(),
            Value::Text(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        fields.insert(MESSAGE_COLUMN.to_string(), Value::Text(message));
        if let Some(fingerprint) = &candidate.fingerprint {
            fields.insert(HASH_COLUMN.to_string(), Value::Text(fingerprint.clone()));
        }

        if let Err(err) = self.source.update_record(table, candidate.record.id, &fields) {
            let failure = Failure::BookkeepingWrite {
                record_id: candidate.record.id,
                message: err.to_string(),
            };
            warn!(error = %failure, "bookkeeping write ignored");
        }
    }
}
