//! Capability contracts of the two stores and their concrete adapters.
//!
//! The engine only talks to [`SourceStore`] and [`CaseSystem`]; the Grist
//! and workbook adapters implement the former, the Démarches Simplifiées
//! GraphQL client the latter.

use std::time::Duration;

use crate::error::ClientResult;
use crate::model::{Annotation, AnnotationUpdate, CaseRef, Fields, RecordId, SourceRecord, SourceType};

pub mod ds;
pub mod grist;
pub mod workbook;

pub use ds::DsClient;
pub use grist::GristClient;
pub use workbook::WorkbookStore;

/// Timeout of connection checks and metadata reads.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout of single case reads.
pub const READ_TIMEOUT: Duration = Duration::from_secs(15);
/// Timeout of bulk listings and mutations.
pub const BULK_TIMEOUT: Duration = Duration::from_secs(30);

/// Tabular store the records are read from.
pub trait SourceStore {
    /// Checks that the document can be reached with the configured credentials.
    fn test_connection(&self) -> ClientResult<()>;

    /// Lists the records of a table, optionally capped.
    fn list_records(&self, table: &str, limit: Option<usize>) -> ClientResult<Vec<SourceRecord>>;

    /// Writes a partial set of columns onto one record.
    fn update_record(&self, table: &str, id: RecordId, fields: &Fields) -> ClientResult<()>;

    /// Declared type of a column; unknown columns read as [`SourceType::Text`].
    fn column_type(&self, table: &str, column: &str) -> SourceType;

    /// Persists buffered edits at the end of a batch.
    fn flush(&self) -> ClientResult<()> {
        Ok(())
    }
}

/// Remote case-management system holding the annotations.
pub trait CaseSystem {
    /// Checks that the API answers with the configured credentials.
    fn test_connection(&self) -> ClientResult<()>;

    /// Lists up to `limit` cases of a process.
    fn list_cases(&self, process_number: i64, limit: usize) -> ClientResult<Vec<CaseRef>>;

    /// Reads the private annotations of one case, with their discovered types.
    fn case_annotations(&self, case_number: i64) -> ClientResult<Vec<Annotation>>;

    /// Writes one annotation through the mutation selected by `update.kind`.
    fn update_annotation(
        &self,
        case_id: &str,
        annotation_id: &str,
        update: &AnnotationUpdate,
    ) -> ClientResult<()>;
}

impl<T: SourceStore + ?Sized> SourceStore for Box<T> {
    fn test_connection(&self) -> ClientResult<()> {
        (**self).test_connection()
    }

    fn list_records(&self, table: &str, limit: Option<usize>) -> ClientResult<Vec<SourceRecord>> {
        (**self).list_records(table, limit)
    }

    fn update_record(&self, table: &str, id: RecordId, fields: &Fields) -> ClientResult<()> {
        (**self).update_record(table, id, fields)
    }

    fn column_type(&self, table: &str, column: &str) -> SourceType {
        (**self).column_type(table, column)
    }

    fn flush(&self) -> ClientResult<()> {
        (**self).flush()
    }
}
