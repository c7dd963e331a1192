//! Outbound queue shared by the watcher (producer) and the session receive loop (sole consumer).

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::OutboundMessage;

/// Unbounded FIFO of messages waiting for the session's next idle turn.
///
/// Cloning is cheap and yields another handle to the same queue.
#[derive(Clone, Default)]
pub struct OutboundQueue {
    inner: Arc<RwLock<VecDeque<OutboundMessage>>>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, msg: OutboundMessage) {
        self.inner.write().await.push_back(msg);
    }

    /// Append a batch under one lock so a consumer never sees half of it.
    pub async fn push_all<I>(&self, msgs: I)
    where
        I: IntoIterator<Item = OutboundMessage>,
    {
        self.inner.write().await.extend(msgs);
    }

    /// Remove the head. `None` only when the queue is empty; an empty-payload message
    /// comes back as `Some`.
    pub async fn pop_front(&self) -> Option<OutboundMessage> {
        self.inner.write().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
