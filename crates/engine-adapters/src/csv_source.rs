//! CSV file source: glob expansion, per-file read loop, cancellation check
//! per batch. Rebuilt over the `csv` crate and the `Record` model.

use async_trait::async_trait;
use engine_core::{apply_transforms, coerce, BatchTx, ErrorTx, Logger, RawValue, Record, Schema, Source};
use glob::glob;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct CsvSourceSpec {
    pub path: String,
    pub fields: Schema,
    #[serde(default = "default_batch_rows")]
    pub batch_rows: usize,
    #[serde(default = "default_has_header")]
    pub has_header: bool,
}

fn default_batch_rows() -> usize {
    100
}

fn default_has_header() -> bool {
    true
}

pub struct CsvSource {
    spec: CsvSourceSpec,
    logger: Logger,
}

impl CsvSource {
    pub fn new(spec: CsvSourceSpec) -> Self {
        Self {
            spec,
            logger: Logger::new("csv"),
        }
    }
}

#[async_trait]
impl Source for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn replace_logger(&mut self, logger: Logger) {
        self.logger = logger;
    }

    async fn extract(&mut self, tx: BatchTx, errors: ErrorTx, cancel: CancellationToken) -> anyhow::Result<()> {
        let _entered = self.logger.enter();
        let mut paths: Vec<String> = vec![];
        for entry in glob(&self.spec.path)? {
            paths.push(entry?.display().to_string());
        }
        if paths.is_empty() {
            anyhow::bail!("no files matched: {}", self.spec.path);
        }

        let field_order: Vec<String> = self.spec.fields.iter().map(|(k, _)| k.clone()).collect();

        for path in &paths {
            if cancel.is_cancelled() {
                break;
            }
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(self.spec.has_header)
                .from_path(path)?;

            let header: Vec<String> = if self.spec.has_header {
                reader.headers()?.iter().map(|s| s.to_string()).collect()
            } else {
                field_order.clone()
            };
            let column_of: std::collections::HashMap<&str, usize> =
                header.iter().enumerate().map(|(i, k)| (k.as_str(), i)).collect();

            let mut batch = Vec::with_capacity(self.spec.batch_rows);
            for (row_index, row) in reader.records().enumerate() {
                if cancel.is_cancelled() {
                    break;
                }
                let row = match row {
                    Ok(row) => row,
                    Err(e) => {
                        warn!(error = %e, "csv read error");
                        continue;
                    }
                };
                let mut record = Record::with_capacity(self.spec.fields.len());
                for (key, field_spec) in self.spec.fields.iter() {
                    let Some(&col) = column_of.get(key.as_str()) else { continue };
                    let Some(cell) = row.get(col) else { continue };
                    let raw = if cell.is_empty() {
                        RawValue::Null
                    } else {
                        RawValue::Str(cell.to_string())
                    };
                    match coerce(key, raw, field_spec).and_then(|v| apply_transforms(key, v, field_spec)) {
                        Ok(value) => record.set(field_spec.output_key(key), value),
                        Err(e) => engine_core::send_error(&errors, e.at_row_context(row_index)),
                    }
                }
                batch.push(record);
                if batch.len() >= self.spec.batch_rows {
                    info!(path = %path, rows = batch.len(), "read batch");
                    if !engine_core::send_batch(&tx, std::mem::take(&mut batch), &cancel).await {
                        return Ok(());
                    }
                }
            }
            if !batch.is_empty() {
                info!(path = %path, rows = batch.len(), "read final batch");
                if !engine_core::send_batch(&tx, batch, &cancel).await {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

trait AtRowContext {
    fn at_row_context(self, row_index: usize) -> engine_core::RecordError;
}

impl AtRowContext for engine_core::FieldError {
    fn at_row_context(self, row_index: usize) -> engine_core::RecordError {
        engine_core::RecordError::from(self).at_row(row_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::{FieldSpec, SemanticType};
    use tokio::sync::mpsc;

    fn write_csv(dir: &std::path::Path, name: &str, contents: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path.display().to_string()
    }

    #[tokio::test]
    async fn reads_declared_columns_into_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "a.csv", "id,name\n1,ada\n2,grace\n");

        let mut fields = Schema::new();
        fields.insert("id", FieldSpec::new(SemanticType::Int));
        fields.insert("name", FieldSpec::new(SemanticType::String));

        let mut source = CsvSource::new(CsvSourceSpec {
            path,
            fields,
            batch_rows: 10,
            has_header: true,
        });

        let (batch_tx, mut batch_rx) = mpsc::channel(8);
        let (err_tx, _err_rx) = mpsc::channel(8);
        source.extract(batch_tx, err_tx, CancellationToken::new()).await.unwrap();

        let batch = batch_rx.recv().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].get("name").0, Some(&engine_core::Value::String("ada".to_string())));
    }

    #[tokio::test]
    async fn missing_glob_match_is_an_error() {
        let mut fields = Schema::new();
        fields.insert("id", FieldSpec::new(SemanticType::Int));
        let mut source = CsvSource::new(CsvSourceSpec {
            path: "/no/such/path/*.csv".to_string(),
            fields,
            batch_rows: 10,
            has_header: true,
        });
        let (batch_tx, _rx) = mpsc::channel(8);
        let (err_tx, _err_rx) = mpsc::channel(8);
        assert!(source.extract(batch_tx, err_tx, CancellationToken::new()).await.is_err());
    }
}
