mod common;

use common::record;
use dossier_sync::Failure;
use dossier_sync::model::{HASH_COLUMN, STATUS_COLUMN, SourceRecord, Value};
use dossier_sync::sync::{fingerprint, needs_sync, parse_dossier_number, select_candidates};

fn tracked() -> Vec<String> {
    vec!["statut".to_string(), "montant".to_string()]
}

fn synced(cells: &[(&str, Value)]) -> SourceRecord {
    let base = record(1, cells);
    let hash = fingerprint(&base.fields, &tracked());
    let mut fields = base.fields;
    fields.insert(STATUS_COLUMN.to_string(), Value::from("success"));
    fields.insert(HASH_COLUMN.to_string(), Value::Text(hash));
    SourceRecord::new(1, fields)
}

#[test]
fn fingerprint_is_stable_and_short() {
    let a = record(1, &[("statut", Value::from("ok")), ("montant", Value::Number(10.0))]);
    let first = fingerprint(&a.fields, &tracked());
    let second = fingerprint(&a.fields, &tracked());
    assert_eq!(first, second);
    assert_eq!(first.len(), 12);
    assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn fingerprint_ignores_untracked_columns_and_column_order() {
    let a = record(
        1,
        &[
            ("statut", Value::from("ok")),
            ("montant", Value::Number(10.0)),
            ("commentaire", Value::from("a")),
        ],
    );
    let b = record(
        2,
        &[
            ("commentaire", Value::from("b")),
            ("montant", Value::Number(10.0)),
            ("statut", Value::from("ok")),
        ],
    );
    assert_eq!(fingerprint(&a.fields, &tracked()), fingerprint(&b.fields, &tracked()));

    let c = record(1, &[("statut", Value::from("ko")), ("montant", Value::Number(10.0))]);
    assert_ne!(fingerprint(&a.fields, &tracked()), fingerprint(&c.fields, &tracked()));
}

#[test]
fn records_without_a_successful_sync_are_always_selected() {
    let cells = [("numero", Value::from("1")), ("statut", Value::from("ok"))];
    assert!(needs_sync(&record(1, &cells), &tracked(), true));

    for status in ["", "pending", "error"] {
        let mut with_status = cells.to_vec();
        with_status.push((STATUS_COLUMN, Value::from(status)));
        assert!(needs_sync(&record(1, &with_status), &tracked(), true), "{status}");
    }
}

#[test]
fn successful_records_are_only_reselected_on_content_change() {
    let unchanged = synced(&[("statut", Value::from("ok")), ("montant", Value::Number(10.0))]);
    assert!(!needs_sync(&unchanged, &tracked(), true));

    let mut edited = unchanged.clone();
    edited.fields.insert("montant".to_string(), Value::Number(11.0));
    assert!(needs_sync(&edited, &tracked(), true));
    assert!(!needs_sync(&edited, &tracked(), false));
    assert!(!needs_sync(&edited, &[], true));

    let mut untracked_edit = unchanged.clone();
    untracked_edit
        .fields
        .insert("commentaire".to_string(), Value::from("nouveau"));
    assert!(!needs_sync(&untracked_edit, &tracked(), true));
}

#[test]
fn unknown_status_literals_are_left_alone() {
    let manual = record(
        1,
        &[("statut", Value::from("ok")), (STATUS_COLUMN, Value::from("ignored"))],
    );
    assert!(!needs_sync(&manual, &tracked(), true));
}

#[test]
fn candidates_need_a_dossier_number() {
    let records = vec![
        record(1, &[("numero", Value::from("12")), ("statut", Value::from("ok"))]),
        record(2, &[("numero", Value::from("")), ("statut", Value::from("ok"))]),
        record(3, &[("numero", Value::Number(0.0))]),
        record(4, &[("statut", Value::from("ok"))]),
    ];

    let candidates = select_candidates(records, "numero", &tracked(), true);

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].record.id, 1);
    assert_eq!(
        candidates[0].fingerprint,
        Some(fingerprint(&candidates[0].record.fields, &tracked()))
    );
    let none = select_candidates(
        vec![record(1, &[("numero", Value::from("12"))])],
        "numero",
        &[],
        true,
    );
    assert_eq!(none[0].fingerprint, None);
}

#[test]
fn dossier_numbers_accept_numbers_and_padded_text() {
    assert_eq!(parse_dossier_number(Some(&Value::from("  482  ")), "n"), Ok(482));
    assert_eq!(parse_dossier_number(Some(&Value::Number(17.9)), "n"), Ok(17));

    for invalid in [
        Value::from("abc"),
        Value::from("-3"),
        Value::from(""),
        Value::Number(0.0),
        Value::Bool(true),
    ] {
        assert!(
            matches!(
                parse_dossier_number(Some(&invalid), "n"),
                Err(Failure::Identity { .. })
            ),
            "{invalid:?}"
        );
    }
    assert!(parse_dossier_number(None, "n").is_err());
}
