use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Alias for results returned by the source and destination adapters.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Error type covering the failures that stop the tool before or outside a
/// synchronisation batch: loading configuration, building clients, or
/// reporting.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Raised when the configuration is structurally valid JSON but unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Errors bubbled up from one of the store adapters.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Raised when the interactive confirmation prompt fails.
    #[error("prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

/// Failure of a single call against the source store or the case system.
///
/// Timeouts and transport failures are reported exactly like application
/// level errors: the caller decides which scope (field, record, batch) the
/// failure terminates.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection, timeout or body decoding failure raised by the HTTP stack.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// GraphQL `errors` array, either top level or inside a mutation payload.
    #[error("GraphQL errors: {}", .0.join("; "))]
    GraphQl(Vec<String>),

    /// The remote system answered but the requested entity does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The response did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Errors raised while reading the workbook source.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Errors raised while persisting the workbook source.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Raised when a sheet does not follow the expected conventions.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Wrapper for IO failures of file-backed stores.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Scope terminated by a [`Failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureScope {
    Batch,
    Record,
    Field,
    None,
}

/// Structured failure entry recorded in sync outcomes and batch reports.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    /// Missing or invalid settings, or a collaborator that cannot be reached.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// The record's dossier number is unusable or unknown to the case system.
    #[error("{message}")]
    Identity {
        message: String,
        dossier_number: Option<i64>,
    },

    /// The case's annotations could not be read.
    #[error("failed to fetch annotations: {message}")]
    Fetch { message: String },

    /// No annotation with the configured label exists on the case.
    #[error("annotation '{label}' not found")]
    UnknownAnnotation { label: String },

    /// Source and destination types (or the value itself) do not allow the transfer.
    #[error("incompatible types for {column}: {source_type} -> {dest_type}")]
    Compatibility {
        column: String,
        label: String,
        source_type: String,
        dest_type: String,
    },

    /// The destination rejected the annotation update.
    #[error("failed to update annotation '{label}': {message}")]
    Update { label: String, message: String },

    /// Writing the bookkeeping columns back to the source failed.
    #[error("failed to write sync status for record {record_id}: {message}")]
    BookkeepingWrite { record_id: i64, message: String },
}

impl Failure {
    /// Returns the processing scope this failure terminates.
    pub fn scope(&self) -> FailureScope {
        match self {
            Failure::Config { .. } => FailureScope::Batch,
            Failure::Identity { .. } | Failure::Fetch { .. } => FailureScope::Record,
            Failure::UnknownAnnotation { .. }
            | Failure::Compatibility { .. }
            | Failure::Update { .. } => FailureScope::Field,
            Failure::BookkeepingWrite { .. } => FailureScope::None,
        }
    }
}
