use crate::queue::{QueueClient, QueueError};
use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// In-process queue over unbounded tokio channels.
///
/// Used when the server and the engine share a process, and by tests. Each
/// channel has exactly one consumer: a second `receive` on the same channel is
/// an error, matching the non-restartable stream contract.
#[derive(Default)]
pub struct MemoryQueue {
    channels: Mutex<HashMap<String, Channel>>,
}

struct Channel {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl Channel {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Some(rx) }
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_channel<T>(&self, name: &str, f: impl FnOnce(&mut Channel) -> T) -> T {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let channel = channels.entry(name.to_string()).or_insert_with(Channel::new);
        f(channel)
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn post(&self, channel: &str, payload: &[u8]) -> Result<(), QueueError> {
        self.with_channel(channel, |c| c.tx.send(payload.to_vec()))
            .map_err(|_| QueueError::Closed(channel.to_string()))
    }

    async fn receive(&self, channel: &str) -> Result<BoxStream<'static, Vec<u8>>, QueueError> {
        let rx = self
            .with_channel(channel, |c| c.rx.take())
            .ok_or_else(|| QueueError::AlreadyConsumed(channel.to_string()))?;

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|payload| (payload, rx))
        });
        Ok(stream.boxed())
    }
}
