use std::path::Path;

use dossier_sync::io::{SourceStore, WorkbookStore};
use dossier_sync::model::{Fields, STATUS_COLUMN, SourceType, SyncStatus, Value};
use rust_xlsxwriter::{Format, Workbook};
use tempfile::tempdir;

fn write_fixture(path: &Path) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Dossiers").expect("sheet named");
    for (col, header) in ["numero", "statut", "montant", "complet"].iter().enumerate() {
        sheet.write_string(0, col as u16, *header).expect("header");
    }
    let rows = [(482.0, "Accepté", 1200.5, true), (483.0, "Refusé", 0.0, false)];
    for (index, (numero, statut, montant, complet)) in rows.iter().enumerate() {
        let row = index as u32 + 1;
        sheet.write_number(row, 0, *numero).expect("numero");
        sheet.write_string(row, 1, *statut).expect("statut");
        sheet.write_number(row, 2, *montant).expect("montant");
        sheet.write_boolean(row, 3, *complet).expect("complet");
    }
    workbook.save(path).expect("fixture saved");
}

#[test]
fn rows_are_read_as_records_with_inferred_types() {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("dossiers.xlsx");
    write_fixture(&path);
    let store = WorkbookStore::new(&path);

    store.test_connection().expect("workbook readable");
    let records = store.list_records("Dossiers", None).expect("records");

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, 1);
    assert_eq!(records[1].id, 2);
    assert_eq!(records[0].get("numero"), Some(&Value::Number(482.0)));
    assert_eq!(records[0].get("statut"), Some(&Value::from("Accepté")));
    assert_eq!(records[1].get("complet"), Some(&Value::Bool(false)));
    assert_eq!(records[0].status, None);

    assert_eq!(store.column_type("Dossiers", "montant"), SourceType::Numeric);
    assert_eq!(store.column_type("Dossiers", "complet"), SourceType::Bool);
    assert_eq!(store.column_type("Dossiers", "statut"), SourceType::Text);
    assert_eq!(store.column_type("Dossiers", "absent"), SourceType::Text);

    let capped = store.list_records("Dossiers", Some(1)).expect("records");
    assert_eq!(capped.len(), 1);
}

#[test]
fn bookkeeping_edits_survive_a_flush() {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("dossiers.xlsx");
    write_fixture(&path);

    let store = WorkbookStore::new(&path);
    let mut fields = Fields::new();
    fields.insert(STATUS_COLUMN.to_string(), Value::from("success"));
    fields.insert("statut".to_string(), Value::from("En cours"));
    store.update_record("Dossiers", 2, &fields).expect("record updated");
    store.flush().expect("workbook saved");

    let reopened = WorkbookStore::new(&path);
    let records = reopened.list_records("Dossiers", None).expect("records");
    assert_eq!(records[1].status, Some(SyncStatus::Success));
    assert_eq!(records[1].get("statut"), Some(&Value::from("En cours")));
    assert_eq!(records[0].get("statut"), Some(&Value::from("Accepté")));
    assert_eq!(records[0].status, Some(SyncStatus::Unset));
    assert_eq!(records[1].get("montant"), Some(&Value::Number(0.0)));
}

#[test]
fn unknown_sheets_and_rows_are_errors() {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("dossiers.xlsx");
    write_fixture(&path);
    let store = WorkbookStore::new(&path);

    assert!(store.list_records("Autre", None).is_err());
    assert!(store.update_record("Dossiers", 9, &Fields::new()).is_err());
    assert!(store.update_record("Dossiers", 0, &Fields::new()).is_err());
}

#[test]
fn missing_workbook_fails_the_connection_test() {
    let dir = tempdir().expect("temporary directory");
    let store = WorkbookStore::new(dir.path().join("absent.xlsx"));
    assert!(store.test_connection().is_err());
}

#[test]
fn date_cells_outside_the_calendar_are_kept_as_numbers() {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("dates.xlsx");
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    let sheet = workbook.add_worksheet();
    sheet.set_name("Dossiers").expect("sheet named");
    sheet.write_string(0, 0, "commission").expect("header");
    sheet
        .write_number_with_format(1, 0, 45352.0, &date_format)
        .expect("regular date");
    sheet
        .write_number_with_format(2, 0, 1e15, &date_format)
        .expect("huge date");
    workbook.save(&path).expect("fixture saved");

    let records = WorkbookStore::new(&path)
        .list_records("Dossiers", None)
        .expect("records");

    assert_eq!(records[0].get("commission"), Some(&Value::Temporal("2024-03-01".into())));
    assert_eq!(records[1].get("commission"), Some(&Value::Number(1e15)));
}
