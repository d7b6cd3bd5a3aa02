//! Line-oriented stdout sink: one printed line per record, no buffering
//! beyond stdout's own lock.

use async_trait::async_trait;
use engine_core::{BatchRx, ErrorTx, Logger, Sink};
use tokio_util::sync::CancellationToken;

pub struct StdoutSink {
    logger: Logger,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            logger: Logger::new("stdout"),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    fn replace_logger(&mut self, logger: Logger) {
        self.logger = logger;
    }

    async fn load(&mut self, mut rx: BatchRx, _errors: ErrorTx, cancel: CancellationToken) -> anyhow::Result<()> {
        let _entered = self.logger.enter();
        while let Some(batch) = engine_core::recv_batch(&mut rx, &cancel).await {
            for record in &batch {
                println!("{}", record.to_json());
            }
        }
        Ok(())
    }
}
