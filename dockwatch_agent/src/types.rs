//! Messages exchanged with the controller over WebSocket.
//! Keep this module minimal and stable: field names and kind numbering are the wire contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Inbound command kinds, numbered 0..=7 on the wire.
///
/// Any other number decodes to [`InboundKind::Unknown`] so the frame still reaches the
/// idle policy instead of being dropped as malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum InboundKind {
    StartContainer,
    StopContainer,
    RemoveContainer,
    RemoveImage,
    RunScript,
    RunCommand,
    Restart,
    Ok,
    Unknown(i64),
}

impl InboundKind {
    /// True for the seven kinds that map to an operation.
    pub fn is_command(self) -> bool {
        !matches!(self, InboundKind::Ok | InboundKind::Unknown(_))
    }
}

impl From<i64> for InboundKind {
    fn from(v: i64) -> Self {
        match v {
            0 => InboundKind::StartContainer,
            1 => InboundKind::StopContainer,
            2 => InboundKind::RemoveContainer,
            3 => InboundKind::RemoveImage,
            4 => InboundKind::RunScript,
            5 => InboundKind::RunCommand,
            6 => InboundKind::Restart,
            7 => InboundKind::Ok,
            other => InboundKind::Unknown(other),
        }
    }
}

impl From<InboundKind> for i64 {
    fn from(k: InboundKind) -> Self {
        match k {
            InboundKind::StartContainer => 0,
            InboundKind::StopContainer => 1,
            InboundKind::RemoveContainer => 2,
            InboundKind::RemoveImage => 3,
            InboundKind::RunScript => 4,
            InboundKind::RunCommand => 5,
            InboundKind::Restart => 6,
            InboundKind::Ok => 7,
            InboundKind::Unknown(v) => v,
        }
    }
}

/// Outbound message kinds, numbered 0..=9 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum OutboundKind {
    SendMetric,
    AddedImage,
    AddedContainer,
    RemovedImage,
    RemovedContainer,
    UpdatedContainer,
    Start,
    Result,
    Restarted,
    None,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown outbound message kind {0}")]
pub struct UnknownKind(pub i64);

impl TryFrom<i64> for OutboundKind {
    type Error = UnknownKind;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => OutboundKind::SendMetric,
            1 => OutboundKind::AddedImage,
            2 => OutboundKind::AddedContainer,
            3 => OutboundKind::RemovedImage,
            4 => OutboundKind::RemovedContainer,
            5 => OutboundKind::UpdatedContainer,
            6 => OutboundKind::Start,
            7 => OutboundKind::Result,
            8 => OutboundKind::Restarted,
            9 => OutboundKind::None,
            other => return Err(UnknownKind(other)),
        })
    }
}

impl From<OutboundKind> for i64 {
    fn from(k: OutboundKind) -> Self {
        k as i64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "Type")]
    pub kind: InboundKind,
    // resource hash, script text or command text depending on kind
    #[serde(rename = "Data", default, deserialize_with = "null_as_empty")]
    pub payload: String,
}

// `"Data": null` reads the same as a missing field.
fn null_as_empty<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(de)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "Type")]
    pub kind: OutboundKind,
    #[serde(rename = "Data", default)]
    pub payload: String,
}

impl OutboundMessage {
    pub fn new(kind: OutboundKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn result(body: impl Into<String>) -> Self {
        Self::new(OutboundKind::Result, body)
    }

    pub fn restarted() -> Self {
        Self::new(OutboundKind::Restarted, "Ok")
    }

    /// Wrap a record (or snapshot) as a JSON string payload.
    pub fn with_json<T: Serialize>(kind: OutboundKind, value: &T) -> serde_json::Result<Self> {
        Ok(Self::new(kind, serde_json::to_string(value)?))
    }
}

/// One telemetry sample. `-1` in a scalar (or a lone `-1` entry in the disk lists) means
/// that particular reading failed; the rest of the snapshot is still valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    #[serde(rename = "Cpus")]
    pub cpu_percent_per_core: Vec<f64>,
    #[serde(rename = "UseRam")]
    pub used_ram_bytes: i64,
    #[serde(rename = "TotalRam")]
    pub total_ram_bytes: i64,
    #[serde(rename = "UseDisks")]
    pub used_disk_bytes: Vec<i64>,
    #[serde(rename = "TotalDisks")]
    pub total_disk_bytes: Vec<i64>,
    #[serde(rename = "NetworkSend")]
    pub network_bytes_sent: i64,
    #[serde(rename = "NetworkReceive")]
    pub network_bytes_received: i64,
    #[serde(rename = "Time")]
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    // reserved for the controller's own numbering; always 0 here
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Size")]
    pub size_bytes: f64,
    #[serde(rename = "Hash")]
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ImageId")]
    pub image_id: i64,
    #[serde(rename = "ImageHash")]
    pub image_hash: String,
    #[serde(rename = "Status")]
    pub status: String,
    // the controller schema spells it this way
    #[serde(rename = "Recourses")]
    pub resources: String,
    #[serde(rename = "Hash")]
    pub hash: String,
}

/// First frame after the handshake: identity plus full inventories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartMessage {
    #[serde(rename = "Type")]
    pub kind: OutboundKind,
    #[serde(rename = "Token")]
    pub token: String,
    #[serde(rename = "Metric")]
    pub metric: MetricSnapshot,
    #[serde(rename = "DockerImages")]
    pub images: Vec<ImageRecord>,
    #[serde(rename = "DockerContainers")]
    pub containers: Vec<ContainerRecord>,
}

impl StartMessage {
    pub fn new(
        token: impl Into<String>,
        metric: MetricSnapshot,
        images: Vec<ImageRecord>,
        containers: Vec<ContainerRecord>,
    ) -> Self {
        Self {
            kind: OutboundKind::Start,
            token: token.into(),
            metric,
            images,
            containers,
        }
    }
}
