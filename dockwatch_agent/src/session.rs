//! Controller connection: handshake, Start message, receive loop and close.
//!
//! The receive loop is the only writer to the socket. Each inbound frame triggers exactly
//! one outbound message: the dispatch reply for a command, otherwise the idle policy
//! (one queued event if any, else a fresh metric sample). Shutdown interrupts both the
//! wait for a frame and the handling of one.

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::AgentConfig;
use crate::diff::Inventory;
use crate::dispatch::{Dispatch, Dispatcher};
use crate::queue::OutboundQueue;
use crate::resources::{ResourceError, ResourceManager};
use crate::telemetry::TelemetrySampler;
use crate::types::{
    ContainerRecord, ImageRecord, InboundMessage, OutboundKind, OutboundMessage, StartMessage,
};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const WS_PATH: &str = "/ws";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

/// Why the receive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The shared shutdown token fired.
    Shutdown,
    /// Read failure, close frame or end of stream.
    ConnectionLost,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid controller address {addr:?}: {source}")]
    Address {
        addr: String,
        #[source]
        source: url::ParseError,
    },
    #[error("cannot {op} while session is {state:?}")]
    NotConnected {
        op: &'static str,
        state: SessionState,
    },
    #[error("handshake with {url} failed: {source}")]
    Handshake {
        url: String,
        #[source]
        source: Box<WsError>,
    },
    #[error("inventory collection failed: {0}")]
    Inventory(#[from] ResourceError),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("send failed: {0}")]
    Send(#[source] Box<WsError>),
}

/// `host:port` becomes `ws://host:port/ws`; an explicit `ws://` or `wss://` prefix is kept.
pub fn controller_url(ip: &str) -> Result<Url, SessionError> {
    let ip = ip.trim();
    let base = if ip.starts_with("ws://") || ip.starts_with("wss://") {
        ip.to_string()
    } else {
        format!("ws://{ip}")
    };
    let mut url = Url::parse(&base).map_err(|source| SessionError::Address {
        addr: ip.to_string(),
        source,
    })?;
    if url.host_str().is_none() {
        return Err(SessionError::Address {
            addr: ip.to_string(),
            source: url::ParseError::EmptyHost,
        });
    }
    url.set_path(WS_PATH);
    Ok(url)
}

pub struct Session {
    url: Url,
    token: String,
    state: SessionState,
    ws: Option<WsStream>,
    queue: OutboundQueue,
    dispatcher: Dispatcher,
    resources: Arc<dyn ResourceManager>,
    sampler: Arc<dyn TelemetrySampler>,
    shutdown: CancellationToken,
}

impl Session {
    pub fn new(
        config: &AgentConfig,
        queue: OutboundQueue,
        dispatcher: Dispatcher,
        resources: Arc<dyn ResourceManager>,
        sampler: Arc<dyn TelemetrySampler>,
        shutdown: CancellationToken,
    ) -> Result<Self, SessionError> {
        Ok(Self {
            url: controller_url(&config.ip)?,
            token: config.token.clone(),
            state: SessionState::Disconnected,
            ws: None,
            queue,
            dispatcher,
            resources,
            sampler,
            shutdown,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Open the socket and send the Start message.
    ///
    /// Returns the inventories that went into Start so the watcher diffs against exactly
    /// what the controller was told.
    pub async fn connect(&mut self) -> Result<Inventory, SessionError> {
        if self.state != SessionState::Disconnected {
            return Err(SessionError::NotConnected {
                op: "connect",
                state: self.state,
            });
        }
        self.state = SessionState::Connecting;
        info!("connecting to {}", self.url);

        let ws = match connect_async(self.url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(source) => {
                self.state = SessionState::Closed;
                return Err(SessionError::Handshake {
                    url: self.url.to_string(),
                    source: Box::new(source),
                });
            }
        };
        self.ws = Some(ws);
        self.state = SessionState::Connected;
        info!("connected to {}", self.url);

        let (containers, images) = match self.inventories().await {
            Ok(inv) => inv,
            Err(e) => {
                self.close().await;
                return Err(e.into());
            }
        };
        let start = StartMessage::new(
            self.token.clone(),
            self.sampler.sample().await,
            images.clone(),
            containers.clone(),
        );
        if let Err(e) = self.send_json(&start).await {
            warn!("failed to send start message: {e}");
        }
        Ok(Inventory::from_records(containers, images))
    }

    async fn inventories(&self) -> Result<(Vec<ContainerRecord>, Vec<ImageRecord>), ResourceError> {
        let containers = self.resources.list_containers().await?;
        let images = self.resources.list_images().await?;
        Ok((containers, images))
    }

    async fn send_json<T: Serialize>(&mut self, value: &T) -> Result<(), SessionError> {
        let ws = match (self.state, self.ws.as_mut()) {
            (SessionState::Connected, Some(ws)) => ws,
            (state, _) => return Err(SessionError::NotConnected { op: "send", state }),
        };
        let json = serde_json::to_string(value)?;
        ws.send(Message::text(json))
            .await
            .map_err(|e| SessionError::Send(Box::new(e)))
    }

    pub async fn send(&mut self, msg: &OutboundMessage) -> Result<(), SessionError> {
        self.send_json(msg).await?;
        debug!(kind = ?msg.kind, bytes = msg.payload.len(), "sent");
        Ok(())
    }

    // Failed sends are dropped, not retried.
    async fn send_logged(&mut self, msg: &OutboundMessage) {
        match self.send(msg).await {
            Ok(()) => {}
            Err(e @ SessionError::NotConnected { .. }) => error!("{e}"),
            Err(e) => warn!(kind = ?msg.kind, "{e}"),
        }
    }

    async fn idle(&mut self) {
        let msg = match self.queue.pop_front().await {
            Some(msg) => msg,
            None => {
                let metric = self.sampler.sample().await;
                match OutboundMessage::with_json(OutboundKind::SendMetric, &metric) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!("failed to encode metric: {e}");
                        return;
                    }
                }
            }
        };
        self.send_logged(&msg).await;
    }

    async fn handle_frame(&mut self, text: &str) {
        let inbound: InboundMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                warn!("skipping undecodable frame: {e}");
                return;
            }
        };
        debug!(kind = ?inbound.kind, "received");
        match self.dispatcher.dispatch(&inbound).await {
            Dispatch::Reply { message, .. } => self.send_logged(&message).await,
            Dispatch::Idle => self.idle().await,
        }
    }

    /// Receive loop. Runs until the connection fails or the shutdown token fires, then
    /// closes the socket and cancels the token so the watcher stops too.
    pub async fn run(&mut self) -> Result<SessionEnd, SessionError> {
        if self.state != SessionState::Connected {
            return Err(SessionError::NotConnected {
                op: "run",
                state: self.state,
            });
        }
        let shutdown = self.shutdown.clone();
        let end = loop {
            let Some(ws) = self.ws.as_mut() else {
                break SessionEnd::ConnectionLost;
            };
            let frame = tokio::select! {
                _ = shutdown.cancelled() => break SessionEnd::Shutdown,
                frame = ws.next() => frame,
            };
            let text = match frame {
                Some(Ok(Message::Text(t))) => t.as_str().to_owned(),
                Some(Ok(Message::Binary(b))) => match String::from_utf8(b.to_vec()) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("skipping non-UTF-8 binary frame: {e}");
                        continue;
                    }
                },
                Some(Ok(Message::Close(reason))) => {
                    info!(?reason, "controller closed the connection");
                    break SessionEnd::ConnectionLost;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    error!("read failed: {e}");
                    break SessionEnd::ConnectionLost;
                }
                None => {
                    error!("connection ended");
                    break SessionEnd::ConnectionLost;
                }
            };
            // shutdown abandons an in-flight command; spawned children are killed on drop
            tokio::select! {
                _ = shutdown.cancelled() => break SessionEnd::Shutdown,
                _ = self.handle_frame(&text) => {}
            }
        };
        self.close().await;
        self.shutdown.cancel();
        Ok(end)
    }

    /// Release the socket. Closing twice only logs.
    pub async fn close(&mut self) {
        match self.ws.take() {
            Some(mut ws) => {
                match ws.close(None).await {
                    Ok(()) => info!("connection closed"),
                    Err(e) => debug!("close handshake incomplete: {e}"),
                }
            }
            None => debug!("close on a session without a connection"),
        }
        self.state = SessionState::Closed;
    }
}
