//! Warehouse staging sink: temp table → gzip JSONL spool → bulk
//! load → copy-into-target → optional temp-table delete → spool cleanup on
//! every exit path.
//!
//! The real wire protocol (BigQuery REST jobs) is out of scope, so the sink
//! is built against a small [`WarehouseClient`] capability trait instead of
//! a captured client closure — the same re-architecture applied to source
//! adapters, applied symmetrically here. [`LocalWarehouseClient`] is the one
//! concrete implementation: a directory of newline-delimited-JSON "tables"
//! under a temp root, enough to exercise the full protocol end to end.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use engine_core::{BatchRx, ErrorTx, Logger, Record, Sink};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Total time a temp table is allowed to stay invisible before the run
/// gives up on it.
const VISIBILITY_POLL_TIMEOUT: Duration = Duration::from_secs(300);
/// Delay between visibility probes.
const VISIBILITY_POLL_PERIOD: Duration = Duration::from_secs(10);

/// Whether the final copy-into-target replaces or appends to the
/// destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteDisposition {
    WriteTruncate,
    WriteAppend,
}

/// The temp-table lifecycle a warehouse sink drives. One implementation
/// (`LocalWarehouseClient`) backs tests; a real client would wrap a
/// warehouse's job/table REST API behind the same five calls.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    async fn create_temp_table(&self, name: &str) -> anyhow::Result<()>;
    async fn await_table_visible(&self, name: &str) -> anyhow::Result<()>;
    async fn bulk_load(&self, name: &str, spool_path: &Path) -> anyhow::Result<()>;
    async fn copy_into_target(&self, temp_table: &str, target_table: &str, disposition: WriteDisposition) -> anyhow::Result<()>;
    async fn delete_table(&self, name: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseSinkSpec {
    pub target_table: String,
    #[serde(default)]
    pub disposition: Option<WriteDispositionConfig>,
    #[serde(default = "default_true")]
    pub delete_temp_table: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteDispositionConfig {
    WriteTruncate,
    WriteAppend,
}

impl From<WriteDispositionConfig> for WriteDisposition {
    fn from(c: WriteDispositionConfig) -> Self {
        match c {
            WriteDispositionConfig::WriteTruncate => WriteDisposition::WriteTruncate,
            WriteDispositionConfig::WriteAppend => WriteDisposition::WriteAppend,
        }
    }
}

pub struct WarehouseSink<C: WarehouseClient> {
    spec: WarehouseSinkSpec,
    client: C,
    logger: Logger,
}

impl<C: WarehouseClient> WarehouseSink<C> {
    pub fn new(spec: WarehouseSinkSpec, client: C) -> Self {
        Self {
            spec,
            client,
            logger: Logger::new("warehouse"),
        }
    }
}

#[async_trait]
impl<C: WarehouseClient + 'static> Sink for WarehouseSink<C> {
    fn name(&self) -> &str {
        "warehouse"
    }

    fn replace_logger(&mut self, logger: Logger) {
        self.logger = logger;
    }

    async fn load(&mut self, mut rx: BatchRx, _errors: ErrorTx, cancel: CancellationToken) -> anyhow::Result<()> {
        let _entered = self.logger.enter();
        let temp_table = format!("LOAD_TEMP_{}_{}", self.spec.target_table, Uuid::new_v4().simple());
        let spool_dir = tempfile::tempdir()?;
        let spool_path = spool_dir.path().join(format!("{temp_table}.jsonl.gz"));

        let result = self.run_protocol(&mut rx, &temp_table, &spool_path, &cancel).await;

        // Spool cleanup on every exit path, regardless of how far the
        // protocol got.
        let _ = std::fs::remove_file(&spool_path);
        if let Err(e) = &result {
            warn!(error = %e, "warehouse load failed, temp table left for inspection");
        }
        result
    }
}

impl<C: WarehouseClient> WarehouseSink<C> {
    async fn run_protocol(&self, rx: &mut BatchRx, temp_table: &str, spool_path: &Path, cancel: &CancellationToken) -> anyhow::Result<()> {
        self.client.create_temp_table(temp_table).await?;
        self.poll_table_visible(temp_table).await?;

        let row_count = spool_gzip_jsonl(rx, spool_path, cancel).await?;
        info!(temp_table, rows = row_count, "spooled batch to gzip jsonl");

        self.client.bulk_load(temp_table, spool_path).await?;

        let disposition: WriteDisposition = self
            .spec
            .disposition
            .map(Into::into)
            .unwrap_or(WriteDisposition::WriteTruncate);
        self.client
            .copy_into_target(temp_table, &self.spec.target_table, disposition)
            .await?;
        info!(temp_table, target = %self.spec.target_table, ?disposition, "copied staged rows into target");

        if self.spec.delete_temp_table {
            if let Err(e) = self.client.delete_table(temp_table).await {
                warn!(error = %e, temp_table, "failed to delete temp table");
            }
        }
        Ok(())
    }

    /// Polls `await_table_visible` at a fixed period until it succeeds or
    /// the total poll budget elapses.
    async fn poll_table_visible(&self, temp_table: &str) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + VISIBILITY_POLL_TIMEOUT;
        loop {
            match self.client.await_table_visible(temp_table).await {
                Ok(()) => return Ok(()),
                Err(_) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(VISIBILITY_POLL_PERIOD).await;
                }
                Err(e) => return Err(e.context("temp table never became visible within the poll budget")),
            }
        }
    }
}

async fn spool_gzip_jsonl(rx: &mut BatchRx, path: &Path, cancel: &CancellationToken) -> anyhow::Result<usize> {
    let file = std::fs::File::create(path)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    let mut count = 0usize;
    while let Some(batch) = engine_core::recv_batch(rx, cancel).await {
        for record in &batch {
            writeln!(encoder, "{}", record.to_json())?;
            count += 1;
        }
    }
    encoder.finish()?;
    Ok(count)
}

/// Backs `LocalWarehouseClient`'s "tables" as directories of
/// newline-delimited JSON under a temp root, enough to exercise the full
/// staging protocol without a real warehouse SDK.
pub struct LocalWarehouseClient {
    root: PathBuf,
}

impl LocalWarehouseClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn table_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.ndjson"))
    }

    /// Reads back a table's rows, used by tests to assert on the final
    /// copy-into-target result.
    pub fn read_table(&self, name: &str) -> anyhow::Result<Vec<Record>> {
        let text = std::fs::read_to_string(self.table_path(name))?;
        text.lines()
            .filter(|l| !l.is_empty())
            .map(|line| {
                let json: serde_json::Value = serde_json::from_str(line)?;
                Record::from_json_object(json).ok_or_else(|| anyhow::anyhow!("row is not an object"))
            })
            .collect()
    }
}

#[async_trait]
impl WarehouseClient for LocalWarehouseClient {
    async fn create_temp_table(&self, name: &str) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(self.table_path(name), "")?;
        Ok(())
    }

    async fn await_table_visible(&self, name: &str) -> anyhow::Result<()> {
        if !self.table_path(name).exists() {
            anyhow::bail!("temp table {name} never became visible");
        }
        Ok(())
    }

    async fn bulk_load(&self, name: &str, spool_path: &Path) -> anyhow::Result<()> {
        let gz = std::fs::File::open(spool_path)?;
        let mut decoder = flate2::read::GzDecoder::new(gz);
        let mut text = String::new();
        std::io::Read::read_to_string(&mut decoder, &mut text)?;
        std::fs::write(self.table_path(name), text)?;
        Ok(())
    }

    async fn copy_into_target(&self, temp_table: &str, target_table: &str, disposition: WriteDisposition) -> anyhow::Result<()> {
        let staged = std::fs::read_to_string(self.table_path(temp_table))?;
        let target_path = self.table_path(target_table);
        match disposition {
            WriteDisposition::WriteTruncate => {
                std::fs::write(&target_path, staged)?;
            }
            WriteDisposition::WriteAppend => {
                let mut existing = std::fs::read_to_string(&target_path).unwrap_or_default();
                existing.push_str(&staged);
                std::fs::write(&target_path, existing)?;
            }
        }
        Ok(())
    }

    async fn delete_table(&self, name: &str) -> anyhow::Result<()> {
        let _ = std::fs::remove_file(self.table_path(name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::Value;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn full_protocol_lands_rows_in_target_table() {
        let dir = tempfile::tempdir().unwrap();
        let client = LocalWarehouseClient::new(dir.path());
        let mut sink = WarehouseSink::new(
            WarehouseSinkSpec {
                target_table: "people".to_string(),
                disposition: Some(WriteDispositionConfig::WriteTruncate),
                delete_temp_table: true,
            },
            client,
        );

        let (tx, rx) = mpsc::channel(8);
        let (err_tx, _err_rx) = mpsc::channel(8);
        let mut record = Record::new();
        record.set("id", Value::Int(1));
        tx.send(vec![record]).await.unwrap();
        drop(tx);
        sink.load(rx, err_tx, CancellationToken::new()).await.unwrap();

        let client = LocalWarehouseClient::new(dir.path());
        let rows = client.read_table("people").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id").0, Some(&Value::Int(1)));
        assert!(temp_table_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn keeps_temp_table_when_delete_temp_table_is_false() {
        let dir = tempfile::tempdir().unwrap();
        let client = LocalWarehouseClient::new(dir.path());
        let mut sink = WarehouseSink::new(
            WarehouseSinkSpec {
                target_table: "people".to_string(),
                disposition: Some(WriteDispositionConfig::WriteTruncate),
                delete_temp_table: false,
            },
            client,
        );

        let (tx, rx) = mpsc::channel(8);
        let (err_tx, _err_rx) = mpsc::channel(8);
        let mut record = Record::new();
        record.set("id", Value::Int(1));
        tx.send(vec![record]).await.unwrap();
        drop(tx);
        sink.load(rx, err_tx, CancellationToken::new()).await.unwrap();

        assert_eq!(temp_table_files(dir.path()).len(), 1);
    }

    fn temp_table_files(root: &std::path::Path) -> Vec<std::path::PathBuf> {
        std::fs::read_dir(root)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.file_stem().and_then(|s| s.to_str()).is_some_and(|s| s.starts_with("LOAD_TEMP_")))
            .collect()
    }

    #[tokio::test]
    async fn append_disposition_keeps_prior_rows() {
        let dir = tempfile::tempdir().unwrap();
        let client = LocalWarehouseClient::new(dir.path());
        client.create_temp_table("people").await.unwrap();
        client.copy_into_target("people", "people", WriteDisposition::WriteTruncate).await.unwrap();
        std::fs::write(dir.path().join("people.ndjson"), "{\"id\":0}\n").unwrap();

        let mut sink = WarehouseSink::new(
            WarehouseSinkSpec {
                target_table: "people".to_string(),
                disposition: Some(WriteDispositionConfig::WriteAppend),
                delete_temp_table: true,
            },
            LocalWarehouseClient::new(dir.path()),
        );
        let (tx, rx) = mpsc::channel(8);
        let (err_tx, _err_rx) = mpsc::channel(8);
        let mut record = Record::new();
        record.set("id", Value::Int(1));
        tx.send(vec![record]).await.unwrap();
        drop(tx);
        sink.load(rx, err_tx, CancellationToken::new()).await.unwrap();

        let client = LocalWarehouseClient::new(dir.path());
        let rows = client.read_table("people").unwrap();
        assert_eq!(rows.len(), 2);
    }
}
