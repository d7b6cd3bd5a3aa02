//! File sink: JSONL or CSV, one file opened once and closed on every exit
//! path, serializing `Record`s via `serde_json`/`csv`.

use std::io::Write;

use async_trait::async_trait;
use engine_core::{BatchRx, ErrorTx, Logger, Sink};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Jsonl,
    Csv,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileSinkSpec {
    pub path: String,
    pub format: FileFormat,
}

pub struct FileSink {
    spec: FileSinkSpec,
    logger: Logger,
}

impl FileSink {
    pub fn new(spec: FileSinkSpec) -> Self {
        Self {
            spec,
            logger: Logger::new("file"),
        }
    }
}

#[async_trait]
impl Sink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn replace_logger(&mut self, logger: Logger) {
        self.logger = logger;
    }

    async fn load(&mut self, mut rx: BatchRx, errors: ErrorTx, cancel: CancellationToken) -> anyhow::Result<()> {
        let _entered = self.logger.enter();
        let file = std::fs::File::create(&self.spec.path)?;
        let mut writer = std::io::BufWriter::new(file);
        let mut written = 0usize;

        match self.spec.format {
            FileFormat::Jsonl => {
                while let Some(batch) = engine_core::recv_batch(&mut rx, &cancel).await {
                    for record in &batch {
                        if let Err(e) = writeln!(writer, "{}", record.to_json()) {
                            engine_core::send_error(
                                &errors,
                                engine_core::RecordError {
                                    field: "<row>".to_string(),
                                    declared_type: engine_core::SemanticType::Json,
                                    observed: e.to_string(),
                                    row_index: None,
                                },
                            );
                            continue;
                        }
                        written += 1;
                    }
                }
            }
            FileFormat::Csv => {
                let mut csv_writer = csv::Writer::from_writer(Vec::new());
                let mut header_written = false;
                while let Some(batch) = engine_core::recv_batch(&mut rx, &cancel).await {
                    for record in &batch {
                        if !header_written {
                            let keys: Vec<&str> = record.keys().map(|s| s.as_str()).collect();
                            csv_writer.write_record(&keys)?;
                            header_written = true;
                        }
                        let fields: Vec<String> = record.iter().map(|(_, v)| v.to_csv_field()).collect();
                        csv_writer.write_record(&fields)?;
                        written += 1;
                    }
                }
                writer.write_all(&csv_writer.into_inner()?)?;
            }
        }

        writer.flush()?;
        info!(path = %self.spec.path, rows = written, "wrote file");
        Ok(())
    }
}
