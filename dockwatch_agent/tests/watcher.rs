//! Watcher ticks against a fake resource manager.

mod common;

use common::{container, image, FakeResources};
use dockwatch_agent::diff::Inventory;
use dockwatch_agent::queue::OutboundQueue;
use dockwatch_agent::types::{ContainerRecord, OutboundKind};
use dockwatch_agent::watcher::{spawn_watcher, Watcher};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn status_flip_between_ticks_queues_one_update() {
    let fake = FakeResources::with(vec![container("h1", "running")], Vec::new());
    let queue = OutboundQueue::new();
    let mut w = Watcher::new(queue.clone(), fake.clone(), Inventory::default());

    assert_eq!(w.tick().await.unwrap(), 1); // h1 first seen
    let added = queue.pop_front().await.unwrap();
    assert_eq!(added.kind, OutboundKind::AddedContainer);

    fake.set_containers(vec![container("h1", "exited")]);
    assert_eq!(w.tick().await.unwrap(), 1);
    let updated = queue.pop_front().await.unwrap();
    assert_eq!(updated.kind, OutboundKind::UpdatedContainer);
    let rec: ContainerRecord = serde_json::from_str(&updated.payload).unwrap();
    assert_eq!(rec, container("h1", "exited"));
    assert!(queue.is_empty().await);

    assert_eq!(
        w.previous(),
        &Inventory::from_records(vec![container("h1", "exited")], Vec::new())
    );
}

#[tokio::test]
async fn seeded_inventory_is_not_reported_again() {
    let cs = vec![container("a", "running")];
    let is = vec![image("i1")];
    let fake = FakeResources::with(cs.clone(), is.clone());
    let queue = OutboundQueue::new();
    let mut w = Watcher::new(queue.clone(), fake, Inventory::from_records(cs, is));
    assert_eq!(w.tick().await.unwrap(), 0);
    assert!(queue.is_empty().await);
}

#[tokio::test]
async fn containers_are_queued_before_images() {
    let fake = FakeResources::with(vec![container("c1", "running")], vec![image("i1")]);
    let queue = OutboundQueue::new();
    let mut w = Watcher::new(queue.clone(), fake.clone(), Inventory::default());
    w.tick().await.unwrap();

    fake.set_containers(Vec::new());
    fake.set_images(Vec::new());
    assert_eq!(w.tick().await.unwrap(), 2);

    let kinds = [
        queue.pop_front().await.unwrap().kind,
        queue.pop_front().await.unwrap().kind,
        queue.pop_front().await.unwrap().kind,
        queue.pop_front().await.unwrap().kind,
    ];
    assert_eq!(
        kinds,
        [
            OutboundKind::AddedContainer,
            OutboundKind::AddedImage,
            OutboundKind::RemovedContainer,
            OutboundKind::RemovedImage,
        ]
    );
}

#[tokio::test]
async fn listing_failure_keeps_previous_inventory() {
    let seed = Inventory::from_records(vec![container("a", "running")], Vec::new());
    let fake = FakeResources::with(Vec::new(), Vec::new());
    fake.fail_listing.store(true, Ordering::SeqCst);
    let queue = OutboundQueue::new();
    let mut w = Watcher::new(queue.clone(), fake.clone(), seed.clone());

    assert!(w.tick().await.is_err());
    assert!(queue.is_empty().await);
    assert_eq!(w.previous(), &seed);

    // recovers and diffs against the last good state
    fake.fail_listing.store(false, Ordering::SeqCst);
    assert_eq!(w.tick().await.unwrap(), 1);
    assert_eq!(
        queue.pop_front().await.unwrap().kind,
        OutboundKind::RemovedContainer
    );
}

#[tokio::test]
async fn spawned_watcher_runs_on_its_period_and_stops_on_shutdown() {
    let fake = FakeResources::with(vec![container("a", "running")], Vec::new());
    let queue = OutboundQueue::new();
    let shutdown = CancellationToken::new();
    let handle = spawn_watcher(
        Watcher::new(queue.clone(), fake, Inventory::default()),
        Duration::from_millis(20),
        shutdown.clone(),
    );

    tokio::time::timeout(Duration::from_secs(5), async {
        while queue.is_empty().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("watcher never ticked");
    assert_eq!(
        queue.pop_front().await.unwrap().kind,
        OutboundKind::AddedContainer
    );

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("watcher did not stop")
        .unwrap();
}
