//! Inventory diffing: two successive inventories in, minimal change events out.
//!
//! Identity is the record hash. Containers additionally count as updated when `status`
//! or `resources` changed; images are only ever added or removed.

use std::collections::{BTreeMap, HashSet};

use crate::types::{ContainerRecord, ImageRecord, OutboundKind, OutboundMessage};

pub type ContainerMap = BTreeMap<String, ContainerRecord>;
pub type ImageMap = BTreeMap<String, ImageRecord>;

/// Last observed state per resource class, keyed by hash.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    pub containers: ContainerMap,
    pub images: ImageMap,
}

impl Inventory {
    /// First record wins when a hash repeats, matching the diff functions.
    pub fn from_records(containers: Vec<ContainerRecord>, images: Vec<ImageRecord>) -> Self {
        let mut inv = Self::default();
        for c in containers {
            inv.containers.entry(c.hash.clone()).or_insert(c);
        }
        for i in images {
            inv.images.entry(i.hash.clone()).or_insert(i);
        }
        inv
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    AddedContainer(ContainerRecord),
    UpdatedContainer(ContainerRecord),
    RemovedContainer(ContainerRecord),
    AddedImage(ImageRecord),
    RemovedImage(ImageRecord),
}

impl ChangeEvent {
    pub fn kind(&self) -> OutboundKind {
        match self {
            ChangeEvent::AddedContainer(_) => OutboundKind::AddedContainer,
            ChangeEvent::UpdatedContainer(_) => OutboundKind::UpdatedContainer,
            ChangeEvent::RemovedContainer(_) => OutboundKind::RemovedContainer,
            ChangeEvent::AddedImage(_) => OutboundKind::AddedImage,
            ChangeEvent::RemovedImage(_) => OutboundKind::RemovedImage,
        }
    }

    pub fn hash(&self) -> &str {
        match self {
            ChangeEvent::AddedContainer(c)
            | ChangeEvent::UpdatedContainer(c)
            | ChangeEvent::RemovedContainer(c) => &c.hash,
            ChangeEvent::AddedImage(i) | ChangeEvent::RemovedImage(i) => &i.hash,
        }
    }

    /// Outbound message carrying the serialized record.
    pub fn to_message(&self) -> serde_json::Result<OutboundMessage> {
        let kind = self.kind();
        match self {
            ChangeEvent::AddedContainer(c)
            | ChangeEvent::UpdatedContainer(c)
            | ChangeEvent::RemovedContainer(c) => OutboundMessage::with_json(kind, c),
            ChangeEvent::AddedImage(i) | ChangeEvent::RemovedImage(i) => {
                OutboundMessage::with_json(kind, i)
            }
        }
    }
}

fn container_changed(prev: &ContainerRecord, cur: &ContainerRecord) -> bool {
    prev.status != cur.status || prev.resources != cur.resources
}

/// Added and updated in `current` order, then removed in hash order.
/// A hash repeated in `current` is only considered once.
pub fn diff_containers(previous: &ContainerMap, current: &[ContainerRecord]) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    let mut seen = HashSet::with_capacity(current.len());
    for ctr in current {
        if !seen.insert(ctr.hash.as_str()) {
            continue;
        }
        match previous.get(&ctr.hash) {
            None => events.push(ChangeEvent::AddedContainer(ctr.clone())),
            Some(prev) if container_changed(prev, ctr) => {
                events.push(ChangeEvent::UpdatedContainer(ctr.clone()))
            }
            Some(_) => {}
        }
    }
    events.extend(
        previous
            .iter()
            .filter(|(hash, _)| !seen.contains(hash.as_str()))
            .map(|(_, ctr)| ChangeEvent::RemovedContainer(ctr.clone())),
    );
    events
}

pub fn diff_images(previous: &ImageMap, current: &[ImageRecord]) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    let mut seen = HashSet::with_capacity(current.len());
    for img in current {
        if seen.insert(img.hash.as_str()) && !previous.contains_key(&img.hash) {
            events.push(ChangeEvent::AddedImage(img.clone()));
        }
    }
    events.extend(
        previous
            .iter()
            .filter(|(hash, _)| !seen.contains(hash.as_str()))
            .map(|(_, img)| ChangeEvent::RemovedImage(img.clone())),
    );
    events
}
