use std::collections::HashMap;

use tracing::{debug, instrument, warn};

use crate::config::SyncConfig;
use crate::convert::{Compatibility, coerce, resolve};
use crate::error::Failure;
use crate::io::CaseSystem;
use crate::model::{
    Annotation, AnnotationKind, AnnotationUpdate, CoercedValue, RecordId, SourceRecord, SourceType,
    Value,
};
use crate::sync::report::{FieldUpdate, RecordStatus, SyncOutcome, UpdateState};

/// Dossier number → opaque dossier id, built once per batch.
pub type IdentityMap = HashMap<i64, String>;

/// Pushes the mapped columns of one record onto its dossier's annotations.
pub struct RecordSynchronizer<'a, C: ?Sized> {
    cases: &'a C,
    config: &'a SyncConfig,
    source_types: &'a HashMap<String, SourceType>,
}

struct OutcomeBuilder {
    record_id: RecordId,
    dossier_number: Option<i64>,
    dossier_id: Option<String>,
    updates: Vec<FieldUpdate>,
    errors: Vec<Failure>,
}

impl OutcomeBuilder {
    fn new(record_id: RecordId) -> Self {
        Self {
            record_id,
            dossier_number: None,
            dossier_id: None,
            updates: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Terminates the record on a record-level failure.
    fn fail(mut self, failure: Failure) -> SyncOutcome {
        warn!(record = self.record_id, error = %failure, "record not synchronised");
        self.errors.push(failure);
        self.finish()
    }

    fn finish(self) -> SyncOutcome {
        let applied = self
            .updates
            .iter()
            .any(|update| matches!(update.state, UpdateState::Success | UpdateState::DryRun));
        let status = match (self.errors.is_empty(), applied) {
            (true, _) => RecordStatus::Success,
            (false, true) => RecordStatus::PartialError,
            (false, false) => RecordStatus::Error,
        };
        SyncOutcome {
            record_id: self.record_id,
            dossier_number: self.dossier_number,
            dossier_id: self.dossier_id,
            updates: self.updates,
            errors: self.errors,
            status,
        }
    }
}

impl<'a, C: CaseSystem + ?Sized> RecordSynchronizer<'a, C> {
    /// `source_types` holds the declared type of every mapped column; missing
    /// entries read as text.
    pub fn new(
        cases: &'a C,
        config: &'a SyncConfig,
        source_types: &'a HashMap<String, SourceType>,
    ) -> Self {
        Self {
            cases,
            config,
            source_types,
        }
    }

    /// Synchronises one record. Never fails: every problem is recorded on
    /// the returned outcome with the scope it terminated.
    #[instrument(level = "info", skip_all, fields(record = record.id))]
    pub fn sync(&self, record: &SourceRecord, identities: &IdentityMap) -> SyncOutcome {
        let mut outcome = OutcomeBuilder::new(record.id);

        let column = &self.config.dossier_number_column;
        let number = match parse_dossier_number(record.get(column), column) {
            Ok(number) => number,
            Err(failure) => return outcome.fail(failure),
        };
        outcome.dossier_number = Some(number);

        let Some(dossier_id) = identities.get(&number) else {
            return outcome.fail(Failure::Identity {
                message: format!(
                    "dossier {number} not found in démarche {}",
                    self.config.destination.demarche_number
                ),
                dossier_number: Some(number),
            });
        };
        outcome.dossier_id = Some(dossier_id.clone());

        let annotations = match self.cases.case_annotations(number) {
            Ok(annotations) => annotations,
            Err(err) => {
                return outcome.fail(Failure::Fetch {
                    message: err.to_string(),
                });
            }
        };

        let mut by_label: HashMap<&str, &Annotation> = HashMap::new();
        for annotation in &annotations {
            by_label.entry(annotation.label.as_str()).or_insert(annotation);
        }

        for (column, label) in &self.config.column_mapping {
            let Some(value) = record.get(column) else {
                continue;
            };
            let annotation = by_label.get(label.as_str()).copied();
            let dest_type = self.annotation_type(label, annotation);
            let source_type = self
                .source_types
                .get(column)
                .cloned()
                .unwrap_or(SourceType::Text);

            let mut entry = FieldUpdate {
                column: column.clone(),
                label: label.clone(),
                annotation_id: annotation.map(|annotation| annotation.id.clone()),
                value: None,
                source_type,
                dest_type,
                compatibility: None,
                state: UpdateState::Skipped,
            };

            if value.is_empty() && !entry.dest_type.is_boolean() {
                debug!(column = %column, "empty value skipped");
                outcome.updates.push(entry);
                continue;
            }

            let Some(annotation) = annotation else {
                outcome.errors.push(Failure::UnknownAnnotation {
                    label: label.clone(),
                });
                continue;
            };

            let sample = (!value.is_empty()).then_some(value);
            let verdict = resolve(&entry.source_type, &entry.dest_type, sample);
            if verdict == Compatibility::Incompatible {
                outcome.errors.push(Failure::Compatibility {
                    column: column.clone(),
                    label: label.clone(),
                    source_type: entry.source_type.to_string(),
                    dest_type: entry.dest_type.to_string(),
                });
                continue;
            }

            // Only empty checkbox values are left without a coerced form.
            let coerced = coerce(value, &entry.dest_type).unwrap_or(CoercedValue::Bool(false));
            let update = AnnotationUpdate::new(&entry.dest_type, coerced);
            entry.compatibility = Some(verdict);
            entry.value = Some(update.value.clone());

            if self.config.dry_run {
                entry.state = UpdateState::DryRun;
                outcome.updates.push(entry);
                continue;
            }

            match self
                .cases
                .update_annotation(dossier_id, &annotation.id, &update)
            {
                Ok(()) => {
                    debug!(label = %label, value = %update.value, "annotation updated");
                    entry.state = UpdateState::Success;
                    outcome.updates.push(entry);
                }
                Err(err) => {
                    outcome.errors.push(Failure::Update {
                        label: label.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        outcome.finish()
    }

    /// Discovered type first, then the configured one, then text.
    fn annotation_type(&self, label: &str, annotation: Option<&Annotation>) -> AnnotationKind {
        annotation
            .and_then(|annotation| annotation.kind.clone())
            .or_else(|| self.config.static_annotation_type(label))
            .unwrap_or(AnnotationKind::Text)
    }
}

/// Reads the dossier number of a record: a positive integer given either as
/// a number (truncated) or as text (trimmed).
pub fn parse_dossier_number(value: Option<&Value>, column: &str) -> Result<i64, Failure> {
    let identity = |message: String| Failure::Identity {
        message,
        dossier_number: None,
    };

    let value = value.ok_or_else(|| identity(format!("column {column} not found")))?;
    if value.is_falsy() {
        return Err(identity("empty dossier number".to_string()));
    }

    let number = match value {
        Value::Number(number) if number.is_finite() => number.trunc() as i64,
        Value::Text(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|err| identity(format!("invalid dossier number: {text} ({err})")))?,
        other => {
            return Err(identity(format!(
                "invalid dossier number: {other} (unsupported type)"
            )));
        }
    };

    if number <= 0 {
        return Err(identity(format!(
            "invalid dossier number: {value} (must be positive)"
        )));
    }
    Ok(number)
}
