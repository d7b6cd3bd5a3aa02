//! # engine-pipeline
//!
//! The concurrent pipeline engine: extract/load
//! coordination over a bounded channel, cancellation, and error-budget
//! enforcement.
//!
//! Three cooperative tasks run concurrently: the extractor pushes batches,
//! the loader consumes and writes them, and a supervisor counts errors and
//! cancels the shared context when the budget is exceeded. Completion of
//! either the extractor or the loader — success or terminal failure —
//! cancels the context, draining the other.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use engine_core::{EngineError, ErrorRx, Sink, Source};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Tunables for one run: a small batch-channel capacity, a fixed small
/// error-channel capacity, and a 50-error budget.
#[derive(Debug, Clone, Copy)]
pub struct EngineOpts {
    pub batch_capacity: usize,
    pub error_capacity: usize,
    pub error_budget: usize,
}

impl Default for EngineOpts {
    fn default() -> Self {
        EngineOpts {
            batch_capacity: 8,
            error_capacity: 10,
            error_budget: 50,
        }
    }
}

/// A run's terminal status. A binding failure surfaces as `EngineError`
/// before `run` is ever called, so it has no `Outcome` variant of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Aborted,
}

/// Runs one extract → load pipeline to completion. Returns
/// `Ok(Outcome::Aborted)` if the error budget was exceeded, `Ok(Outcome::
/// Completed)` otherwise — including when individual records failed, as
/// long as the total stayed within budget. Only returns `Err` for an
/// adapter-fatal error that itself precludes a continued run (propagated
/// from `extract`/`load` — these are logged by the engine but do not
/// by themselves abort — they rely on the adapter stopping producing or
/// consuming, which is exactly what returning an `Err` does: the task ends,
/// which cancels the context and drains the other side).
pub async fn run(
    mut source: Box<dyn Source>,
    mut sink: Box<dyn Sink>,
    opts: EngineOpts,
) -> Result<Outcome, EngineError> {
    let (batch_tx, batch_rx) = mpsc::channel(opts.batch_capacity);
    let (err_tx, err_rx) = mpsc::channel(opts.error_capacity);
    let cancel = CancellationToken::new();
    let too_many_errors = Arc::new(AtomicBool::new(false));

    let extract_cancel = cancel.clone();
    let extract_err_tx = err_tx.clone();
    let source_name = source.name().to_string();
    let extract_handle = tokio::spawn(async move {
        info!(adapter = %source_name, "start extract");
        let result = source.extract(batch_tx, extract_err_tx, extract_cancel.clone()).await;
        info!(adapter = %source_name, "end extract");
        extract_cancel.cancel();
        result
    });

    let load_cancel = cancel.clone();
    let load_err_tx = err_tx.clone();
    let sink_name = sink.name().to_string();
    let load_handle = tokio::spawn(async move {
        info!(adapter = %sink_name, "start load");
        let result = sink.load(batch_rx, load_err_tx, load_cancel.clone()).await;
        info!(adapter = %sink_name, "end load");
        load_cancel.cancel();
        result
    });

    // The engine itself holds no extra clone of err_tx, so the channel
    // closes once both tasks above finish and drop theirs.
    drop(err_tx);

    let supervisor_cancel = cancel.clone();
    let supervisor_too_many = too_many_errors.clone();
    let budget = opts.error_budget;
    let supervisor_handle = tokio::spawn(supervise(err_rx, supervisor_cancel, supervisor_too_many, budget));

    let extract_result = extract_handle.await.map_err(|e| EngineError::AdapterFatal(e.into()))?;
    let load_result = load_handle.await.map_err(|e| EngineError::AdapterFatal(e.into()))?;

    // Either side finishing is the cancellation signal; make sure it fired
    // even if both ended cleanly with no errors so the supervisor exits.
    cancel.cancel();
    let _ = supervisor_handle.await;

    if let Err(e) = extract_result {
        warn!(error = %e, "adapter fatal error in extract");
        return Err(EngineError::AdapterFatal(e));
    }
    if let Err(e) = load_result {
        warn!(error = %e, "adapter fatal error in load");
        return Err(EngineError::AdapterFatal(e));
    }

    if too_many_errors.load(Ordering::SeqCst) {
        Ok(Outcome::Aborted)
    } else {
        Ok(Outcome::Completed)
    }
}

async fn supervise(
    mut err_rx: ErrorRx,
    cancel: CancellationToken,
    too_many_errors: Arc<AtomicBool>,
    budget: usize,
) {
    let count = AtomicUsize::new(0);
    loop {
        tokio::select! {
            maybe_err = err_rx.recv() => {
                match maybe_err {
                    Some(err) => {
                        let n = count.fetch_add(1, Ordering::SeqCst) + 1;
                        warn!(error = %err, count = n, "error in gallon");
                        if n > budget {
                            too_many_errors.store(true, Ordering::SeqCst);
                            cancel.cancel();
                        }
                    }
                    None => break,
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
    info!(count = count.load(Ordering::SeqCst), "quit");
}
