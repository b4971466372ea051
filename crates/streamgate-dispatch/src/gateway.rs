use std::time::Duration;

use tokio::sync::oneshot;

use crate::batch::{Batch, BatchResults, CommandResult};
use crate::error::{DispatchError, Result};

/// Promise for the ordered results of one submitted batch.
pub type PendingReply = oneshot::Receiver<Result<Vec<CommandResult>>>;

/// Submits batches of command strings to the backend.
///
/// `submit` must return immediately; the backend's answer arrives on the
/// returned receiver, possibly after answers to later submissions. Each
/// batch is answered at most once and never retried.
pub trait DispatchGateway: Send + Sync {
    fn submit(&self, commands: Vec<String>) -> PendingReply;
}

/// A batch handed to a gateway, waiting for its answer.
#[derive(Debug)]
pub struct Submitted {
    batch: Batch,
    reply: PendingReply,
}

/// Render `batch` and hand it to `gateway`.
pub fn submit(gateway: &dyn DispatchGateway, batch: Batch) -> Submitted {
    let reply = gateway.submit(batch.render());
    Submitted { batch, reply }
}

impl Submitted {
    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    /// Wait for the answer and split it by role.
    pub async fn complete(self, timeout: Duration) -> Result<BatchResults> {
        let results = match tokio::time::timeout(timeout, self.reply).await {
            Ok(Ok(results)) => results?,
            Ok(Err(_)) => return Err(DispatchError::Cancelled),
            Err(_) => return Err(DispatchError::Timeout(timeout)),
        };
        self.batch.split_results(results)
    }
}
