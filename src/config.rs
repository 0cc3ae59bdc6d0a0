use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::io::ds::DEFAULT_API_URL;
use crate::model::AnnotationKind;

/// Default number of records processed per batch.
pub const DEFAULT_LIMIT: usize = 50;
/// Default number of dossiers listed to build the identity map.
pub const DEFAULT_CASE_LISTING_LIMIT: usize = 1000;

/// Where the records are read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// A table of a Grist document, reached through its REST API.
    Grist {
        base_url: String,
        #[serde(default)]
        token: String,
        doc_id: String,
        table_id: String,
    },
    /// A sheet of a local `.xlsx` workbook.
    Workbook { path: PathBuf, table_id: String },
}

impl SourceConfig {
    /// Table (or sheet) holding the records.
    pub fn table_id(&self) -> &str {
        match self {
            SourceConfig::Grist { table_id, .. } | SourceConfig::Workbook { table_id, .. } => {
                table_id
            }
        }
    }
}

/// Démarches Simplifiées connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub token: String,
    pub instructeur_id: String,
    pub demarche_number: i64,
    #[serde(default = "default_case_listing_limit")]
    pub case_listing_limit: usize,
}

/// Immutable settings of one synchronisation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub source: SourceConfig,
    pub dossier_number_column: String,
    pub destination: DestinationConfig,
    /// Source column → annotation label, in processing order.
    pub column_mapping: IndexMap<String, String>,
    /// Annotation label → declared type, used when a case does not report one.
    #[serde(default)]
    pub annotation_types: IndexMap<String, String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_true", alias = "update_grist_status")]
    pub update_status: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_true")]
    pub detect_changes: bool,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_case_listing_limit() -> usize {
    DEFAULT_CASE_LISTING_LIMIT
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_true() -> bool {
    true
}

impl SyncConfig {
    /// Reads a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SyncError::MissingInput(path.to_path_buf()));
        }
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Writes the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Example configuration written by `init-config`.
    pub fn sample() -> Self {
        let mut column_mapping = IndexMap::new();
        column_mapping.insert("statut_interne".to_string(), "Statut interne".to_string());
        column_mapping.insert("date_commission".to_string(), "Date de commission".to_string());
        column_mapping.insert("montant_accorde".to_string(), "Montant accordé".to_string());
        column_mapping.insert("dossier_complet".to_string(), "Dossier complet".to_string());

        let mut annotation_types = IndexMap::new();
        annotation_types.insert("Statut interne".to_string(), "drop_down_list".to_string());
        annotation_types.insert("Date de commission".to_string(), "date".to_string());
        annotation_types.insert("Montant accordé".to_string(), "decimal_number".to_string());
        annotation_types.insert("Dossier complet".to_string(), "checkbox".to_string());

        Self {
            source: SourceConfig::Grist {
                base_url: "https://docs.getgrist.com/api".to_string(),
                token: "YOUR_GRIST_API_KEY".to_string(),
                doc_id: "YOUR_DOC_ID".to_string(),
                table_id: "Dossiers".to_string(),
            },
            dossier_number_column: "numero_dossier".to_string(),
            destination: DestinationConfig {
                api_url: default_api_url(),
                token: "YOUR_DS_TOKEN".to_string(),
                instructeur_id: "YOUR_INSTRUCTEUR_ID".to_string(),
                demarche_number: 12345,
                case_listing_limit: DEFAULT_CASE_LISTING_LIMIT,
            },
            column_mapping,
            annotation_types,
            limit: DEFAULT_LIMIT,
            update_status: true,
            dry_run: false,
            detect_changes: true,
        }
    }

    /// Source columns under sync, in mapping order.
    pub fn tracked_columns(&self) -> Vec<String> {
        self.column_mapping.keys().cloned().collect()
    }

    /// Declared type of an annotation label, if configured.
    pub fn static_annotation_type(&self, label: &str) -> Option<AnnotationKind> {
        self.annotation_types
            .get(label)
            .map(|name| AnnotationKind::parse(name))
    }

    /// Lists every missing or invalid setting. The collaborators are not
    /// contacted here.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut require = |name: &str, value: &str| {
            if value.trim().is_empty() {
                problems.push(format!("missing required setting: {name}"));
            }
        };

        match &self.source {
            SourceConfig::Grist {
                base_url,
                token,
                doc_id,
                table_id,
            } => {
                require("source.base_url", base_url);
                require("source.token", token);
                require("source.doc_id", doc_id);
                require("source.table_id", table_id);
            }
            SourceConfig::Workbook { path, table_id } => {
                require("source.path", &path.to_string_lossy());
                require("source.table_id", table_id);
            }
        }
        require("dossier_number_column", &self.dossier_number_column);
        require("destination.api_url", &self.destination.api_url);
        require("destination.token", &self.destination.token);
        require("destination.instructeur_id", &self.destination.instructeur_id);

        if self.destination.demarche_number <= 0 {
            problems.push("destination.demarche_number must be positive".to_string());
        }
        if self.column_mapping.is_empty() {
            problems.push("column_mapping is empty".to_string());
        }
        if self.limit == 0 {
            problems.push("limit must be at least 1".to_string());
        }
        problems
    }
}
