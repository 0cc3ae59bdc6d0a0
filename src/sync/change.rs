use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::model::{Fields, SourceRecord, SyncStatus, Value};

/// Length of the stored content fingerprint.
pub const FINGERPRINT_LEN: usize = 12;

/// Record selected for synchronisation together with its fresh fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub record: SourceRecord,
    /// `None` when no tracked columns are configured.
    pub fingerprint: Option<String>,
}

/// Computes the content fingerprint of the tracked columns of a record.
///
/// Untracked columns never influence the result, and every value is hashed in
/// its string form so that numeric formatting differences between reads do
/// not cause spurious re-syncs.
pub fn fingerprint(fields: &Fields, tracked: &[String]) -> String {
    let projection: BTreeMap<&str, Option<String>> = tracked
        .iter()
        .filter_map(|column| {
            fields
                .get(column)
                .map(|value| (column.as_str(), value.as_text()))
        })
        .collect();

    // A map of strings always serialises.
    let serialized = serde_json::to_string(&projection).unwrap_or_default();
    let digest = Sha256::digest(serialized.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(FINGERPRINT_LEN);
    encoded
}

/// Decides whether a record has to be (re)sent to the case system.
///
/// The content fingerprint is only consulted for records whose last sync
/// succeeded; unset, pending and failed records are always retried.
pub fn needs_sync(record: &SourceRecord, tracked: &[String], detect_changes: bool) -> bool {
    match &record.status {
        None => {
            debug!(record = record.id, "no status column, record needs sync");
            true
        }
        Some(SyncStatus::Unset | SyncStatus::Error | SyncStatus::Pending) => {
            debug!(record = record.id, status = ?record.status, "record needs sync");
            true
        }
        Some(SyncStatus::Success) if detect_changes && !tracked.is_empty() => {
            let current = fingerprint(&record.fields, tracked);
            let stored = record.fingerprint.as_deref().unwrap_or_default();
            if current != stored {
                debug!(record = record.id, %stored, %current, "tracked content changed");
                true
            } else {
                false
            }
        }
        Some(_) => false,
    }
}

/// Filters the records that carry a dossier number and need a sync, and
/// attaches the fingerprint to write back once they are processed.
pub fn select_candidates(
    records: Vec<SourceRecord>,
    dossier_column: &str,
    tracked: &[String],
    detect_changes: bool,
) -> Vec<Candidate> {
    let total = records.len();
    let candidates: Vec<Candidate> = records
        .into_iter()
        .filter(|record| {
            record
                .get(dossier_column)
                .is_some_and(|value| !Value::is_falsy(value))
        })
        .filter(|record| needs_sync(record, tracked, detect_changes))
        .map(|record| {
            let fingerprint =
                (!tracked.is_empty()).then(|| fingerprint(&record.fields, tracked));
            Candidate {
                record,
                fingerprint,
            }
        })
        .collect();

    info!(selected = candidates.len(), total, "change detection finished");
    candidates
}
