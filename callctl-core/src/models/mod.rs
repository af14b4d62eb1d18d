//! Domain models with validation at construction
//!
//! Invalid input returns ValidationError, not panic.

pub mod call;
pub mod table;
pub mod validation;

pub use call::Call;
pub use table::{Column, Table};
pub use validation::ValidationError;

/// A table row as exchanged with the store
pub type Row = serde_json::Map<String, serde_json::Value>;
