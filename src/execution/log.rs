//! Append-only result log owned by a single task
//!
//! Workers never touch the result sequence directly. They send a read
//! request and get a snapshot back, or send an append. The owner services
//! one request at a time, so every snapshot is consistent.

use crate::error::{GbuildError, GbuildResult};
use crate::execution::result::TargetResult;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{trace, warn};

/// Pending requests before senders wait
const LOG_QUEUE_DEPTH: usize = 64;

/// Shared snapshot of the log
pub type Snapshot = Vec<Arc<TargetResult>>;

enum LogOp {
    Read(oneshot::Sender<Snapshot>),
    Append(TargetResult),
}

/// Handle to the result log owner task
///
/// The owner exits once every handle is dropped.
#[derive(Clone)]
pub struct ResultLog {
    tx: mpsc::Sender<LogOp>,
}

impl ResultLog {
    /// Spawn the owner task on the current runtime
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(LOG_QUEUE_DEPTH);
        tokio::spawn(own(rx));
        Self { tx }
    }

    /// Current contents, in append order
    pub async fn snapshot(&self) -> GbuildResult<Snapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(LogOp::Read(reply_tx))
            .await
            .map_err(|_| closed())?;
        reply_rx.await.map_err(|_| closed())
    }

    /// Record a terminal result
    ///
    /// A second result for a name already present is dropped.
    pub async fn append(&self, result: TargetResult) -> GbuildResult<()> {
        self.tx
            .send(LogOp::Append(result))
            .await
            .map_err(|_| closed())
    }
}

fn closed() -> GbuildError {
    GbuildError::Internal("result log is closed".to_string())
}

async fn own(mut rx: mpsc::Receiver<LogOp>) {
    let mut results: Snapshot = Vec::new();

    while let Some(op) = rx.recv().await {
        match op {
            LogOp::Read(reply) => {
                // The reader may have given up; that is fine
                let _ = reply.send(results.clone());
            }
            LogOp::Append(result) => {
                if results.iter().any(|r| r.name() == result.name()) {
                    warn!("Ignoring duplicate result for target {}", result.name());
                    continue;
                }
                trace!("Recorded {} as {}", result.name(), result.status());
                results.push(Arc::new(result));
            }
        }
    }
}

/// Whether the snapshot holds a result for `name`
pub fn contains(snapshot: &[Arc<TargetResult>], name: &str) -> bool {
    snapshot.iter().any(|r| r.name() == name)
}

/// Result recorded for `name`
pub fn find<'a>(snapshot: &'a [Arc<TargetResult>], name: &str) -> Option<&'a Arc<TargetResult>> {
    snapshot.iter().find(|r| r.name() == name)
}

/// First result carrying an error, in append order
pub fn first_failure(snapshot: &[Arc<TargetResult>]) -> Option<&Arc<TargetResult>> {
    snapshot.iter().find(|r| r.is_failure())
}
