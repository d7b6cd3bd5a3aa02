//! The error taxonomy.
//!
//! `RecordError` never escapes an adapter — it is only ever a value sent on
//! the error channel and counted against the error budget. `EngineError` is
//! the engine's public result type; `ConfigInvalid` and `PluginNotFound`
//! occur before the pipeline starts and abort the run outright.

use crate::schema::{FieldError, SemanticType};

/// A per-record extract/serialize/deserialize failure. Counted against the
/// error budget; never fatal on its own.
#[derive(Debug, Clone, thiserror::Error)]
#[error("record error: field {field}: declared {declared_type:?}, observed {observed}")]
pub struct RecordError {
    pub field: String,
    pub declared_type: SemanticType,
    pub observed: String,
    pub row_index: Option<usize>,
}

impl From<FieldError> for RecordError {
    fn from(e: FieldError) -> Self {
        RecordError {
            field: e.field,
            declared_type: e.declared_type,
            observed: e.observed,
            row_index: None,
        }
    }
}

impl RecordError {
    pub fn at_row(mut self, row_index: usize) -> Self {
        self.row_index = Some(row_index);
        self
    }
}

/// The engine's terminal result.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    #[error("no adapter registered for type {0:?}")]
    PluginNotFound(String),

    #[error("adapter fatal error: {0}")]
    AdapterFatal(#[from] anyhow::Error),

    #[error("too many errors: {count} exceeded the configured budget")]
    TooManyErrors { count: usize },
}
