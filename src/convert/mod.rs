//! Pure conversions between the source and destination type systems.

pub mod coerce;
pub mod compat;

pub use coerce::coerce;
pub use compat::{Compatibility, resolve, resolve_names};
