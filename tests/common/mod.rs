#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dossier_sync::config::{DestinationConfig, SourceConfig, SyncConfig};
use dossier_sync::error::{ClientError, ClientResult};
use dossier_sync::io::{CaseSystem, SourceStore};
use dossier_sync::model::{
    Annotation, AnnotationKind, AnnotationUpdate, CaseRef, Fields, RecordId, SourceRecord,
    SourceType, Value,
};
use indexmap::IndexMap;

pub const TABLE: &str = "Dossiers";
pub const DEMARCHE: i64 = 42;

/// Configuration targeting the in-memory fakes.
pub fn config(mapping: &[(&str, &str)]) -> SyncConfig {
    SyncConfig {
        source: SourceConfig::Workbook {
            path: "unused.xlsx".into(),
            table_id: TABLE.to_string(),
        },
        dossier_number_column: "numero".to_string(),
        destination: DestinationConfig {
            api_url: "http://localhost/graphql".to_string(),
            token: "token".to_string(),
            instructeur_id: "instructeur".to_string(),
            demarche_number: DEMARCHE,
            case_listing_limit: 1000,
        },
        column_mapping: mapping
            .iter()
            .map(|(column, label)| (column.to_string(), label.to_string()))
            .collect(),
        annotation_types: IndexMap::new(),
        limit: 50,
        update_status: true,
        dry_run: false,
        detect_changes: true,
    }
}

pub fn record(id: RecordId, cells: &[(&str, Value)]) -> SourceRecord {
    let fields: Fields = cells
        .iter()
        .map(|(column, value)| (column.to_string(), value.clone()))
        .collect();
    SourceRecord::new(id, fields)
}

pub fn annotation(id: &str, label: &str, kind: AnnotationKind) -> Annotation {
    Annotation {
        id: id.to_string(),
        label: label.to_string(),
        value: None,
        kind: Some(kind),
    }
}

/// In-memory source table.
#[derive(Default)]
pub struct FakeSource {
    pub records: Vec<SourceRecord>,
    pub types: HashMap<String, SourceType>,
    pub fail_listing: bool,
    pub fail_writes: bool,
    pub writes: RefCell<Vec<(RecordId, Fields)>>,
    pub flushes: Cell<usize>,
}

impl FakeSource {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn with_type(mut self, column: &str, kind: SourceType) -> Self {
        self.types.insert(column.to_string(), kind);
        self
    }

    pub fn writes_for(&self, id: RecordId) -> Vec<Fields> {
        self.writes
            .borrow()
            .iter()
            .filter(|(record, _)| *record == id)
            .map(|(_, fields)| fields.clone())
            .collect()
    }
}

impl SourceStore for FakeSource {
    fn test_connection(&self) -> ClientResult<()> {
        Ok(())
    }

    fn list_records(&self, _table: &str, limit: Option<usize>) -> ClientResult<Vec<SourceRecord>> {
        if self.fail_listing {
            return Err(ClientError::Status {
                status: 500,
                body: "boom".into(),
            });
        }
        let count = limit.unwrap_or(self.records.len());
        Ok(self.records.iter().take(count).cloned().collect())
    }

    fn update_record(&self, _table: &str, id: RecordId, fields: &Fields) -> ClientResult<()> {
        if self.fail_writes {
            return Err(ClientError::Status {
                status: 403,
                body: "read only".into(),
            });
        }
        self.writes.borrow_mut().push((id, fields.clone()));
        Ok(())
    }

    fn column_type(&self, _table: &str, column: &str) -> SourceType {
        self.types.get(column).cloned().unwrap_or(SourceType::Text)
    }

    fn flush(&self) -> ClientResult<()> {
        self.flushes.set(self.flushes.get() + 1);
        Ok(())
    }
}

/// In-memory case system recording every remote call.
#[derive(Default)]
pub struct FakeCases {
    pub cases: Vec<CaseRef>,
    pub annotations: HashMap<i64, Vec<Annotation>>,
    pub unreachable: bool,
    pub fail_listing: bool,
    pub rejected_annotation: Option<String>,
    /// Raised while annotations are being read, like a Ctrl-C mid-record.
    pub interrupt_on_read: Option<Arc<AtomicBool>>,
    pub listings: Cell<usize>,
    pub reads: Cell<usize>,
    pub updates: RefCell<Vec<(String, String, AnnotationUpdate)>>,
}

impl FakeCases {
    pub fn with_case(mut self, number: i64, annotations: Vec<Annotation>) -> Self {
        self.cases.push(CaseRef {
            number,
            id: format!("D-{number}"),
        });
        self.annotations.insert(number, annotations);
        self
    }

    pub fn remote_calls(&self) -> usize {
        self.listings.get() + self.reads.get() + self.updates.borrow().len()
    }
}

impl CaseSystem for FakeCases {
    fn test_connection(&self) -> ClientResult<()> {
        if self.unreachable {
            return Err(ClientError::Status {
                status: 401,
                body: "unauthorized".into(),
            });
        }
        Ok(())
    }

    fn list_cases(&self, _process_number: i64, limit: usize) -> ClientResult<Vec<CaseRef>> {
        self.listings.set(self.listings.get() + 1);
        if self.fail_listing {
            return Err(ClientError::NotFound(format!("démarche {DEMARCHE}")));
        }
        Ok(self.cases.iter().take(limit).cloned().collect())
    }

    fn case_annotations(&self, case_number: i64) -> ClientResult<Vec<Annotation>> {
        self.reads.set(self.reads.get() + 1);
        if let Some(flag) = &self.interrupt_on_read {
            flag.store(true, Ordering::SeqCst);
        }
        self.annotations
            .get(&case_number)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("dossier {case_number}")))
    }

    fn update_annotation(
        &self,
        case_id: &str,
        annotation_id: &str,
        update: &AnnotationUpdate,
    ) -> ClientResult<()> {
        if self.rejected_annotation.as_deref() == Some(annotation_id) {
            return Err(ClientError::GraphQl(vec!["valeur refusée".into()]));
        }
        self.updates.borrow_mut().push((
            case_id.to_string(),
            annotation_id.to_string(),
            update.clone(),
        ));
        Ok(())
    }
}
