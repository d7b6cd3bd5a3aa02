//! # engine-adapters
//!
//! Concrete input and output adapters for the migration engine: a
//! synthetic source, a CSV source, an offset-paged SQL source, a
//! token-paged generic source, a file sink, a stdout sink, and a warehouse
//! staging sink. [`registry`] binds a run configuration's `type`
//! discriminators to these constructors.

pub mod csv_source;
pub mod file;
pub mod paged;
pub mod random;
pub mod registry;
pub mod sql;
pub mod stdout;
pub mod warehouse;

pub use csv_source::{CsvSource, CsvSourceSpec};
pub use file::{FileFormat, FileSink, FileSinkSpec};
pub use paged::{segmented_scan, InMemoryPager, JsonPager, PageFetcher, PagedSource, PagedSourceSpec};
pub use random::{RandomSource, RandomSourceSpec};
pub use registry::{bind_sink, bind_source};
pub use sql::{SqlSource, SqlSourceSpec};
pub use stdout::StdoutSink;
pub use warehouse::{LocalWarehouseClient, WarehouseClient, WarehouseSink, WarehouseSinkSpec, WriteDisposition};
