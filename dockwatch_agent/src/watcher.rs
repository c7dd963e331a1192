//! Background watcher: periodically diffs live inventories against the last observed ones
//! and queues change events for the session to send on its next idle turn.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::diff::{diff_containers, diff_images, Inventory};
use crate::queue::OutboundQueue;
use crate::resources::{ResourceError, ResourceManager};

pub struct Watcher {
    queue: OutboundQueue,
    resources: Arc<dyn ResourceManager>,
    previous: Inventory,
}

impl Watcher {
    pub fn new(
        queue: OutboundQueue,
        resources: Arc<dyn ResourceManager>,
        previous: Inventory,
    ) -> Self {
        Self {
            queue,
            resources,
            previous,
        }
    }

    pub fn previous(&self) -> &Inventory {
        &self.previous
    }

    /// One pass. On a listing failure nothing is queued and the previous inventory is kept.
    /// Returns the number of events queued.
    pub async fn tick(&mut self) -> Result<usize, ResourceError> {
        let containers = self.resources.list_containers().await?;
        let images = self.resources.list_images().await?;

        let mut events = diff_containers(&self.previous.containers, &containers);
        events.extend(diff_images(&self.previous.images, &images));

        let mut messages = Vec::with_capacity(events.len());
        for ev in &events {
            match ev.to_message() {
                Ok(msg) => messages.push(msg),
                Err(e) => warn!(hash = ev.hash(), "failed to encode change event: {e}"),
            }
        }
        let queued = messages.len();
        self.queue.push_all(messages).await;

        self.previous = Inventory::from_records(containers, images);
        Ok(queued)
    }
}

/// Run `watcher` every `period` until `shutdown` fires. A slow pass delays the next tick,
/// it never overlaps it.
pub fn spawn_watcher(
    mut watcher: Watcher,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(?period, "watcher started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let res = tokio::select! {
                _ = shutdown.cancelled() => break,
                res = watcher.tick() => res,
            };
            match res {
                Ok(0) => {}
                Ok(n) => debug!(events = n, "queued inventory changes"),
                Err(e) => warn!("inventory check skipped: {e}"),
            }
        }
        info!("watcher stopped");
    })
}
