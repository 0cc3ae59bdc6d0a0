//! Core library for the dossier-sync command line application.
//!
//! The library pushes values held in a tabular source (a Grist document or a
//! local workbook) onto the private annotations of Démarches Simplifiées
//! dossiers. Responsibilities are kept narrow: the store adapters live under
//! [`io`], the shared data representations inside [`model`], type
//! compatibility and value coercion in [`convert`], and the batch
//! orchestration under [`sync`].

pub mod config;
pub mod convert;
pub mod error;
pub mod io;
pub mod logging;
pub mod model;
pub mod sync;

pub use config::SyncConfig;
pub use error::{ClientError, Failure, FailureScope, Result, SyncError};
pub use sync::{BatchReport, SyncEngine, SyncOutcome};
