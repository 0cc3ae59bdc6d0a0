use std::fs;

use dossier_sync::SyncError;
use dossier_sync::config::{DEFAULT_CASE_LISTING_LIMIT, DEFAULT_LIMIT, SourceConfig, SyncConfig};
use dossier_sync::io::ds::DEFAULT_API_URL;
use dossier_sync::model::AnnotationKind;
use tempfile::tempdir;

const MINIMAL: &str = r#"{
    "source": {"kind": "grist", "base_url": "https://grist.example/api", "token": "g", "doc_id": "doc", "table_id": "Dossiers"},
    "dossier_number_column": "numero",
    "destination": {"token": "d", "instructeur_id": "ins", "demarche_number": 42},
    "column_mapping": {"statut": "Statut interne", "avis": "Avis", "date": "Date"},
    "annotation_types": {"Statut interne": "annotation_descriptor_drop_down_list"},
    "update_grist_status": false
}"#;

#[test]
fn minimal_file_gets_defaults_and_keeps_mapping_order() {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("config.json");
    fs::write(&path, MINIMAL).expect("config written");

    let config = SyncConfig::load(&path).expect("config loaded");

    assert_eq!(config.limit, DEFAULT_LIMIT);
    assert!(!config.update_status);
    assert!(!config.dry_run);
    assert!(config.detect_changes);
    assert_eq!(config.destination.api_url, DEFAULT_API_URL);
    assert_eq!(config.destination.case_listing_limit, DEFAULT_CASE_LISTING_LIMIT);
    assert_eq!(config.source.table_id(), "Dossiers");
    assert_eq!(config.tracked_columns(), vec!["statut", "avis", "date"]);
    assert_eq!(
        config.static_annotation_type("Statut interne"),
        Some(AnnotationKind::DropDownList)
    );
    assert_eq!(config.static_annotation_type("Avis"), None);
    assert!(config.problems().is_empty(), "{:?}", config.problems());
}

#[test]
fn workbook_sources_are_accepted() {
    let json = MINIMAL.replace(
        r#"{"kind": "grist", "base_url": "https://grist.example/api", "token": "g", "doc_id": "doc", "table_id": "Dossiers"}"#,
        r#"{"kind": "workbook", "path": "dossiers.xlsx", "table_id": "Feuil1"}"#,
    );
    let config: SyncConfig = serde_json::from_str(&json).expect("config parsed");

    assert!(matches!(config.source, SourceConfig::Workbook { .. }));
    assert_eq!(config.source.table_id(), "Feuil1");
}

#[test]
fn problems_list_every_invalid_setting() {
    let mut config = SyncConfig::sample();
    config.destination.token.clear();
    config.destination.demarche_number = 0;
    config.column_mapping.clear();
    config.limit = 0;

    let problems = config.problems();

    assert_eq!(problems.len(), 4, "{problems:?}");
    assert!(problems.iter().any(|problem| problem.contains("destination.token")));
    assert!(problems.iter().any(|problem| problem.contains("demarche_number")));
    assert!(problems.iter().any(|problem| problem.contains("column_mapping")));
    assert!(problems.iter().any(|problem| problem.contains("limit")));
}

#[test]
fn sample_configuration_can_be_saved_and_reloaded() {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("sample.json");

    SyncConfig::sample().save(&path).expect("sample saved");
    let reloaded = SyncConfig::load(&path).expect("sample loaded");

    assert_eq!(reloaded, SyncConfig::sample());
}

#[test]
fn missing_file_is_reported_with_its_path() {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("absent.json");

    match SyncConfig::load(&path) {
        Err(SyncError::MissingInput(missing)) => assert_eq!(missing, path),
        other => panic!("unexpected result: {other:?}"),
    }
}
