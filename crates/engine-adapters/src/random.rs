//! Synthetic source adapter: generates records from a declared schema
//! instead of reading them from anywhere. Used to exercise the pipeline
//! engine and the other sinks without external state.

use async_trait::async_trait;
use chrono::Utc;
use engine_core::{apply_transforms, coerce, BatchTx, ErrorTx, FieldSpec, Logger, RawValue, Record, SemanticType, Source};
use rand::{Rng, SeedableRng};
use rand::rngs::SmallRng;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

const FIRST_NAMES: &[&str] = &["ada", "grace", "linus", "margaret", "dennis", "barbara"];
const LAST_NAMES: &[&str] = &["lovelace", "hopper", "torvalds", "hamilton", "ritchie", "liskov"];

#[derive(Debug, Clone, Deserialize)]
pub struct RandomSourceSpec {
    pub fields: engine_core::Schema,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
}

fn default_page_size() -> usize {
    100
}

fn default_page_limit() -> usize {
    1
}

pub struct RandomSource {
    spec: RandomSourceSpec,
    logger: Logger,
}

impl RandomSource {
    pub fn new(spec: RandomSourceSpec) -> Self {
        Self {
            spec,
            logger: Logger::new("random"),
        }
    }
}

#[async_trait]
impl Source for RandomSource {
    fn name(&self) -> &str {
        "random"
    }

    fn replace_logger(&mut self, logger: Logger) {
        self.logger = logger;
    }

    async fn extract(&mut self, tx: BatchTx, errors: ErrorTx, cancel: CancellationToken) -> anyhow::Result<()> {
        let _entered = self.logger.enter();
        let mut rng = SmallRng::from_entropy();
        let mut row_index: usize = 0;

        for page in 0..self.spec.page_limit {
            if cancel.is_cancelled() {
                break;
            }
            let mut batch = Vec::with_capacity(self.spec.page_size);
            for _ in 0..self.spec.page_size {
                let mut record = Record::with_capacity(self.spec.fields.len());
                for (key, field_spec) in self.spec.fields.iter() {
                    match generate(&mut rng, row_index, field_spec) {
                        Ok(raw) => match coerce(key, raw, field_spec).and_then(|v| apply_transforms(key, v, field_spec)) {
                            Ok(value) => record.set(field_spec.output_key(key), value),
                            Err(e) => engine_core::send_error(&errors, e.into()),
                        },
                        Err(e) => engine_core::send_error(&errors, e.into()),
                    }
                }
                row_index += 1;
                batch.push(record);
            }
            info!(page, rows = batch.len(), "generated page");
            if !engine_core::send_batch(&tx, batch, &cancel).await {
                break;
            }
        }
        Ok(())
    }
}

fn generate(
    rng: &mut impl Rng,
    row_index: usize,
    spec: &FieldSpec,
) -> Result<RawValue, engine_core::FieldError> {
    let min = spec.min.unwrap_or(0.0) as i64;
    let max = spec.max.unwrap_or(1_000_000.0) as i64;
    Ok(match spec.data_type {
        SemanticType::Uuid => RawValue::Str(Uuid::new_v4().to_string()),
        SemanticType::Name => {
            let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
            let last = LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())];
            RawValue::Str(format!("{first} {last}"))
        }
        SemanticType::Email => {
            let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
            RawValue::Str(format!("{first}{row_index}@example.test"))
        }
        SemanticType::Int => RawValue::Int(if max > min { rng.gen_range(min..max) } else { min }),
        SemanticType::Float => RawValue::Float(rng.gen_range(min as f64..=max as f64)),
        SemanticType::Bool => RawValue::Bool(rng.gen_bool(0.5)),
        SemanticType::Time => RawValue::Int(Utc::now().timestamp() - row_index as i64),
        SemanticType::Unixtime => RawValue::Int(Utc::now().timestamp() - row_index as i64),
        _ => RawValue::Str(Uuid::new_v4().to_string()),
    })
}
