//! Fake collaborators and a fake controller shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tokio_util::sync::CancellationToken;

use dockwatch_agent::config::AgentConfig;
use dockwatch_agent::dispatch::Dispatcher;
use dockwatch_agent::exec::{ExecError, ExecOutcome, Executor};
use dockwatch_agent::queue::OutboundQueue;
use dockwatch_agent::resources::{OpOutcome, ResourceError, ResourceManager};
use dockwatch_agent::session::Session;
use dockwatch_agent::telemetry::TelemetrySampler;
use dockwatch_agent::types::{ContainerRecord, ImageRecord, MetricSnapshot};

pub fn container(hash: &str, status: &str) -> ContainerRecord {
    ContainerRecord {
        id: 0,
        name: format!("/{hash}-name"),
        image_id: 0,
        image_hash: "sha256:img".into(),
        status: status.into(),
        resources: String::new(),
        hash: hash.into(),
    }
}

pub fn image(hash: &str) -> ImageRecord {
    ImageRecord {
        id: 0,
        name: format!("{hash}:latest"),
        size_bytes: 1024.0,
        hash: hash.into(),
    }
}

pub fn metric() -> MetricSnapshot {
    MetricSnapshot {
        cpu_percent_per_core: vec![12.5, 3.0],
        used_ram_bytes: 512,
        total_ram_bytes: 2048,
        used_disk_bytes: vec![10],
        total_disk_bytes: vec![100],
        network_bytes_sent: -1,
        network_bytes_received: -1,
        captured_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    }
}

#[derive(Default)]
pub struct FakeResources {
    containers: Mutex<Vec<ContainerRecord>>,
    images: Mutex<Vec<ImageRecord>>,
    pub fail_listing: AtomicBool,
    pub fail_ops: AtomicBool,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeResources {
    pub fn with(containers: Vec<ContainerRecord>, images: Vec<ImageRecord>) -> Arc<Self> {
        let fake = Self::default();
        *fake.containers.lock().unwrap() = containers;
        *fake.images.lock().unwrap() = images;
        Arc::new(fake)
    }

    pub fn set_containers(&self, v: Vec<ContainerRecord>) {
        *self.containers.lock().unwrap() = v;
    }

    pub fn set_images(&self, v: Vec<ImageRecord>) {
        *self.images.lock().unwrap() = v;
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn op(&self, name: &str, hash: &str) -> OpOutcome {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), hash.to_string()));
        if self.fail_ops.load(Ordering::SeqCst) {
            OpOutcome::failed(format!("{name} {hash} failed: boom"))
        } else {
            OpOutcome::ok()
        }
    }
}

#[async_trait]
impl ResourceManager for FakeResources {
    async fn list_images(&self) -> Result<Vec<ImageRecord>, ResourceError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(ResourceError::List {
                what: "images",
                message: "engine down".into(),
            });
        }
        Ok(self.images.lock().unwrap().clone())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerRecord>, ResourceError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(ResourceError::List {
                what: "containers",
                message: "engine down".into(),
            });
        }
        Ok(self.containers.lock().unwrap().clone())
    }

    async fn start(&self, hash: &str) -> OpOutcome {
        self.op("start", hash)
    }

    async fn stop(&self, hash: &str) -> OpOutcome {
        self.op("stop", hash)
    }

    async fn remove(&self, hash: &str) -> OpOutcome {
        self.op("remove", hash)
    }

    async fn remove_image(&self, hash: &str) -> OpOutcome {
        self.op("remove_image", hash)
    }
}

#[derive(Default)]
pub struct FakeExecutor {
    pub fail: AtomicBool,
    /// Scripts never finish.
    pub hang: AtomicBool,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeExecutor {
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn run(&self, what: &str, text: &str) -> ExecOutcome {
        self.calls
            .lock()
            .unwrap()
            .push((what.to_string(), text.to_string()));
        ExecOutcome {
            output: format!("{what} output: {text}"),
            error: self
                .fail
                .load(Ordering::SeqCst)
                .then(|| ExecError::Script(io::Error::other("boom"))),
        }
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn run_script(&self, script: &str) -> ExecOutcome {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.run("script", script)
    }

    async fn run_command(&self, command: &str) -> ExecOutcome {
        self.run("command", command)
    }

    async fn reboot(&self) -> Result<(), ExecError> {
        self.calls
            .lock()
            .unwrap()
            .push(("reboot".to_string(), String::new()));
        if self.fail.load(Ordering::SeqCst) {
            Err(ExecError::Script(io::Error::other("not permitted")))
        } else {
            Ok(())
        }
    }
}

pub struct FixedSampler;

#[async_trait]
impl TelemetrySampler for FixedSampler {
    async fn sample(&self) -> MetricSnapshot {
        metric()
    }
}

// ---------- fake controller ----------

pub type ControllerWs = WebSocketStream<TcpStream>;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Listener on an ephemeral port plus the `host:port` string for the agent config.
pub async fn controller() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    (listener, addr.to_string())
}

pub async fn accept(listener: &TcpListener) -> ControllerWs {
    let (stream, _) = listener.accept().await.expect("accept");
    accept_async(stream).await.expect("ws handshake")
}

pub async fn send_text(ws: &mut ControllerWs, text: &str) {
    ws.send(Message::text(text.to_string()))
        .await
        .expect("controller send");
}

/// Next text frame from the agent.
pub async fn recv_text(ws: &mut ControllerWs) -> String {
    tokio::time::timeout(IO_TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(t))) => return t.as_str().to_owned(),
                Some(Ok(_)) => continue,
                other => panic!("expected a text frame, got {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for agent frame")
}

pub async fn recv_json(ws: &mut ControllerWs) -> serde_json::Value {
    serde_json::from_str(&recv_text(ws).await).expect("agent sent JSON")
}

pub fn session(
    ip: &str,
    resources: Arc<FakeResources>,
    executor: Arc<FakeExecutor>,
    queue: OutboundQueue,
    shutdown: CancellationToken,
) -> Session {
    let cfg = AgentConfig {
        ip: ip.to_string(),
        token: "secret-token".into(),
    };
    Session::new(
        &cfg,
        queue,
        Dispatcher::new(resources.clone(), executor),
        resources,
        Arc::new(FixedSampler),
        shutdown,
    )
    .expect("session")
}
