//! Binds a [`RawConfig`]'s `in`/`out` type discriminators to concrete
//! adapter constructors. Unknown discriminators surface as
//! `EngineError::PluginNotFound` rather than panicking.

use engine_core::{EngineError, RawConfig, Sink, Source};

use crate::csv_source::{CsvSource, CsvSourceSpec};
use crate::file::{FileSink, FileSinkSpec};
use crate::paged::{JsonPager, PagedSource, PagedSourceSpec};
use crate::random::{RandomSource, RandomSourceSpec};
use crate::sql::{SqlSource, SqlSourceSpec};
use crate::stdout::StdoutSink;
use crate::warehouse::{LocalWarehouseClient, WarehouseSink, WarehouseSinkSpec};

/// Binds the `in` block of `config` to a boxed [`Source`].
pub fn bind_source(config: &RawConfig) -> Result<Box<dyn Source>, EngineError> {
    match config.in_type()? {
        "random" => {
            let spec: RandomSourceSpec = config.parse_in()?;
            Ok(Box::new(RandomSource::new(spec)))
        }
        "csv" => {
            let spec: CsvSourceSpec = config.parse_in()?;
            Ok(Box::new(CsvSource::new(spec)))
        }
        "sql" => {
            let spec: SqlSourceSpec = config.parse_in()?;
            Ok(Box::new(SqlSource::new(spec)))
        }
        "paged" => {
            let spec: PagedSourceSpec = config.parse_in()?;
            let fetcher = JsonPager::new(spec.fields, spec.pages);
            Ok(Box::new(PagedSource::new(fetcher, spec.segments)))
        }
        other => Err(EngineError::PluginNotFound(other.to_string())),
    }
}

/// Binds the `out` block of `config` to a boxed [`Sink`]. The warehouse
/// sink's client is always the local directory-backed implementation,
/// rooted under `warehouse_root` — a real deployment would swap this for a
/// client that calls out to the actual warehouse.
pub fn bind_sink(config: &RawConfig, warehouse_root: &std::path::Path) -> Result<Box<dyn Sink>, EngineError> {
    match config.out_type()? {
        "file" => {
            let spec: FileSinkSpec = config.parse_out()?;
            Ok(Box::new(FileSink::new(spec)))
        }
        "stdout" => Ok(Box::new(StdoutSink::new())),
        "warehouse" => {
            let spec: WarehouseSinkSpec = config.parse_out()?;
            let client = LocalWarehouseClient::new(warehouse_root);
            Ok(Box::new(WarehouseSink::new(spec, client)))
        }
        other => Err(EngineError::PluginNotFound(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_source_type_is_plugin_not_found() {
        let cfg = RawConfig::parse("in:\n  type: nonexistent\nout:\n  type: stdout\n").unwrap();
        assert!(matches!(bind_source(&cfg), Err(EngineError::PluginNotFound(_))));
    }

    #[test]
    fn binds_stdout_sink() {
        let cfg = RawConfig::parse("in:\n  type: random\n  fields: {}\nout:\n  type: stdout\n").unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(bind_sink(&cfg, dir.path()).is_ok());
    }

    #[test]
    fn binds_paged_source() {
        let cfg = RawConfig::parse(
            "in:\n  type: paged\n  fields:\n    id:\n      type: int\n  pages:\n    - - id: 1\n      - id: 2\nout:\n  type: stdout\n",
        )
        .unwrap();
        assert!(bind_source(&cfg).is_ok());
    }
}
