//! # engine-core
//!
//! Core types and abstractions for the migration engine: the ordered
//! [`Record`]/[`Value`] model, schema-driven type coercion and transforms,
//! the [`Source`]/[`Sink`] adapter contracts, the error taxonomy, and run
//! configuration binding.
//!
//! This crate fixes the contracts every adapter and the pipeline engine
//! build on; it contains no I/O of its own.

pub mod adapter;
pub mod config;
pub mod error;
pub mod record;
pub mod schema;
pub mod value;

pub use adapter::{recv_batch, send_batch, send_error, BatchRx, BatchTx, ErrorRx, ErrorTx, Logger, Sink, Source};
pub use config::RawConfig;
pub use error::{EngineError, RecordError};
pub use record::{Batch, Record};
pub use schema::{coerce, apply_transforms, FieldError, FieldSpec, RawValue, Schema, SemanticType, Transform, TimeAs};
pub use value::Value;
