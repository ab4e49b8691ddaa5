// Background task draining the result queue into the store

use futures_util::stream::{BoxStream, StreamExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::metrics;
use crate::store::{ResultStore, WriteOutcome};
use gradebox_common::types::extract_submission_id;

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Stored { submission_id: String },
    Replaced { submission_id: String },
    Discarded { reason: String },
}

/// Handle one result message. Never fails: every problem is logged and the
/// message dropped so the loop can move on.
pub async fn process_message(store: &ResultStore, payload: &[u8]) -> MessageOutcome {
    let submission_id = match extract_submission_id(payload) {
        Ok(id) => id,
        Err(e) => {
            error!(error = %e, bytes = payload.len(), "Discarding malformed result message");
            metrics::REPORTS_DISCARDED.inc();
            return MessageOutcome::Discarded {
                reason: e.to_string(),
            };
        }
    };

    match store.write_result(&submission_id, payload).await {
        Ok(WriteOutcome::Created) => {
            info!(submission_id = %submission_id, bytes = payload.len(), "Stored result");
            metrics::REPORTS_STORED.inc();
            MessageOutcome::Stored { submission_id }
        }
        Ok(WriteOutcome::Replaced) => {
            warn!(submission_id = %submission_id, "Result redelivered, replacing the earlier one");
            metrics::REPORTS_STORED.inc();
            metrics::REPORTS_OVERWRITTEN.inc();
            MessageOutcome::Replaced { submission_id }
        }
        Err(e) => {
            error!(submission_id = %submission_id, error = %e, "Failed to store result");
            metrics::REPORTS_DISCARDED.inc();
            MessageOutcome::Discarded {
                reason: e.to_string(),
            }
        }
    }
}

/// The running consumer. Dropping the handle leaves the task running; call
/// [`ConsumerHandle::stop`] to cancel it.
pub struct ConsumerHandle {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ConsumerHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            error!(error = %e, "Result consumer task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

pub fn spawn(store: ResultStore, mut inbound: BoxStream<'static, Vec<u8>>) -> ConsumerHandle {
    let (shutdown, mut stop) = oneshot::channel();
    let handle = tokio::spawn(async move {
        info!("Result consumer started");
        loop {
            tokio::select! {
                message = inbound.next() => match message {
                    Some(payload) => {
                        process_message(&store, &payload).await;
                    }
                    None => {
                        warn!("Result queue closed");
                        break;
                    }
                },
                _ = &mut stop => {
                    info!("Result consumer stopping");
                    break;
                }
            }
        }
    });
    ConsumerHandle { shutdown, handle }
}
