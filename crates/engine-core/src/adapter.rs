//! The input and output adapter contracts.
//!
//! Source adapters bound a serialize function at construction in the system
//! this engine is modeled on; here that closure is replaced with a trait
//! implemented once per adapter with its configured schema — no captured
//! state beyond the adapter's own fields.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::error::RecordError;
use crate::record::Batch;

/// Sender side of the batch channel: single producer (the extractor), single
/// consumer (the loader).
pub type BatchTx = mpsc::Sender<Batch>;
pub type BatchRx = mpsc::Receiver<Batch>;

/// Sender side of the error channel: many producers, one consumer (the
/// supervisor). Fixed small capacity; senders must not block on a full
/// channel — use [`send_error`].
pub type ErrorTx = mpsc::Sender<RecordError>;
pub type ErrorRx = mpsc::Receiver<RecordError>;

/// Best-effort error report: drops the error rather than blocking forward
/// progress when the supervisor is slow and the channel is full. Dropped
/// errors still under-count the budget slightly, which is acceptable.
pub fn send_error(tx: &ErrorTx, err: RecordError) {
    if tx.try_send(err).is_err() {
        tracing::warn!("error channel full, dropping record error");
    }
}

/// Sends `batch` on `tx`, racing against `cancel`. Returns `false` if the
/// loader side has closed its receiver or `cancel` fired first — either way
/// the caller should stop producing rather than block forever on a full,
/// abandoned channel. `biased` so a send that can complete immediately
/// always wins over a `cancel` that fired after the other side finished
/// successfully — otherwise a buffered-but-undelivered batch could be
/// dropped by the random branch selection a plain `select!` would use.
pub async fn send_batch(tx: &BatchTx, batch: Batch, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        result = tx.send(batch) => result.is_ok(),
        _ = cancel.cancelled() => false,
    }
}

/// Receives from `rx`, racing against `cancel`. Returns `None` if the
/// channel closed or `cancel` fired first, so a sink blocked on a stalled
/// producer still observes cancellation instead of hanging forever. `biased`
/// for the same reason as `send_batch`: a batch already sitting in the
/// channel must be drained before `cancel` is allowed to end the loop, so a
/// clean run (cancelled only because the extractor finished) never loses
/// batches that were already queued.
pub async fn recv_batch(rx: &mut BatchRx, cancel: &CancellationToken) -> Option<Batch> {
    tokio::select! {
        biased;
        batch = rx.recv() => batch,
        _ = cancel.cancelled() => None,
    }
}

/// An injected per-adapter logger, so adapters carry no module-level state.
/// Adapters that care about tagging their log lines hold one of these and
/// enter its span around their `extract`/`load` body.
#[derive(Clone)]
pub struct Logger {
    span: Span,
}

impl Logger {
    pub fn new(component: &str) -> Self {
        Logger {
            span: tracing::info_span!("adapter", component = %component),
        }
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Logger::new("unnamed")
    }
}

/// A data source: the entry point of a run. Implementations choose their own
/// batch size (typically 100 records), observe `cancel` at least once per
/// batch, and must never close `tx` themselves — the engine does that on
/// their behalf by dropping it when `extract` returns.
#[async_trait]
pub trait Source: Send {
    fn name(&self) -> &str;

    fn replace_logger(&mut self, _logger: Logger) {}

    /// Produces non-empty batches on `tx` and non-fatal per-record errors on
    /// `errors`. Returns `Ok(())` on a clean finish or a cooperative
    /// cancellation; returns `Err` only for a fatal that precludes further
    /// extraction.
    async fn extract(&mut self, tx: BatchTx, errors: ErrorTx, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// A data sink: the exit point of a run. Implementations acquire any
/// external resources with scoped acquisition and must release them on
/// every exit path (success, cancellation, fatal error).
#[async_trait]
pub trait Sink: Send {
    fn name(&self) -> &str;

    fn replace_logger(&mut self, _logger: Logger) {}

    /// Consumes from `rx` until it closes or `cancel` fires. Per-record
    /// serialization failures are sent on `errors`; the batch continues.
    /// Returns `Err` only for a fatal that precludes further loading.
    async fn load(&mut self, rx: BatchRx, errors: ErrorTx, cancel: CancellationToken) -> anyhow::Result<()>;
}
