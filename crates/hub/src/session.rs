//! One client connection
//!
//! Lifecycle of a connection:
//! 1. WebSocket upgrade on `/socket.io/?EIO=4&transport=websocket`, origin checked
//! 2. Engine.IO open packet, then heartbeats every ping interval
//! 3. Socket.IO CONNECT registers the subscriber with the hub
//! 4. `get-files` events become snapshot requests; pushed snapshots become
//!    `files-updated` events
//! 5. DISCONNECT, a closed socket, a missed pong or server shutdown ends it

use crate::hub::{HubEvent, SnapshotReceiver, Subscriber, SubscriberId};
use crate::protocol::{
    files_updated_frame, EnginePacket, Handshake, SocketPacket, ENGINE_PROTOCOL,
    EVENT_GET_FILES, MAIN_NAMESPACE,
};
use crate::server::{AllowedOrigin, TransportConfig};
use fc_core::Snapshot;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async_with_config, WebSocketStream};
use tracing::{debug, warn};
use uuid::Uuid;

/// Path prefix served by the transport
pub const SOCKET_PATH: &str = "/socket.io";

/// Serve one accepted TCP connection until it ends
pub(crate) async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    id: SubscriberId,
    config: Arc<TransportConfig>,
    events: mpsc::UnboundedSender<HubEvent>,
    shutdown: watch::Receiver<bool>,
) {
    let allowed = config.allowed_origin.clone();
    let upgrade = accept_hdr_async_with_config(
        stream,
        move |request: &Request, response: Response| {
            check_upgrade(request, &allowed)?;
            Ok(response)
        },
        Some(websocket_config(&config)),
    );

    let ws = match tokio::time::timeout(config.handshake_timeout, upgrade).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            debug!("Rejected connection from {}: {}", peer, e);
            return;
        }
        Err(_) => {
            debug!("Handshake with {} timed out", peer);
            return;
        }
    };

    let mut session = Session {
        id,
        ws,
        config,
        events,
        shutdown,
        receiver: None,
        pong_deadline: None,
    };

    if let Err(e) = session.run().await {
        debug!("Connection {} from {} ended: {}", id, peer, e);
    }
    session.leave();
}

/// Validate the upgrade request before the WebSocket is accepted
fn check_upgrade(request: &Request, allowed: &AllowedOrigin) -> Result<(), ErrorResponse> {
    let uri = request.uri();
    if uri.path().trim_end_matches('/') != SOCKET_PATH {
        return Err(reject(StatusCode::BAD_REQUEST, "Unknown path"));
    }

    let query = uri.query().unwrap_or("");
    if query_param(query, "EIO") != Some(ENGINE_PROTOCOL) {
        return Err(reject(StatusCode::BAD_REQUEST, "Unsupported protocol version"));
    }
    if query_param(query, "transport") != Some("websocket") {
        return Err(reject(StatusCode::BAD_REQUEST, "Transport unknown"));
    }

    let origin = request
        .headers()
        .get("origin")
        .and_then(|value| value.to_str().ok());
    if !allowed.permits(origin) {
        return Err(reject(StatusCode::FORBIDDEN, "Origin not allowed"));
    }

    Ok(())
}

/// Frame limits enforced by tungstenite while reading
fn websocket_config(config: &TransportConfig) -> WebSocketConfig {
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_payload);
    ws_config.max_frame_size = Some(config.max_payload);
    ws_config
}

fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

/// Why a session stopped
#[derive(Debug)]
enum SessionEnd {
    Closed,
    Shutdown,
    PingTimeout,
    Protocol(String),
    Transport(tokio_tungstenite::tungstenite::Error),
    HubGone,
}

impl std::fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEnd::Closed => write!(f, "closed by client"),
            SessionEnd::Shutdown => write!(f, "server shutting down"),
            SessionEnd::PingTimeout => write!(f, "ping timeout"),
            SessionEnd::Protocol(reason) => write!(f, "protocol error: {}", reason),
            SessionEnd::Transport(e) => write!(f, "transport error: {}", e),
            SessionEnd::HubGone => write!(f, "hub no longer running"),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SessionEnd {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SessionEnd::Transport(e)
    }
}

/// What woke the session loop
enum Wake {
    Shutdown,
    PingDue,
    PongOverdue,
    Push(Arc<Snapshot>),
    Incoming(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
}

struct Session {
    id: SubscriberId,
    ws: WebSocketStream<TcpStream>,
    config: Arc<TransportConfig>,
    events: mpsc::UnboundedSender<HubEvent>,
    shutdown: watch::Receiver<bool>,
    /// Present while the socket is connected to the main namespace
    receiver: Option<SnapshotReceiver>,
    /// Set while a ping is waiting for its pong
    pong_deadline: Option<Instant>,
}

impl Session {
    async fn run(&mut self) -> Result<(), SessionEnd> {
        let open = EnginePacket::Open(Handshake {
            sid: Uuid::new_v4().to_string(),
            upgrades: Vec::new(),
            ping_interval: self.config.ping_interval.as_millis() as u64,
            ping_timeout: self.config.ping_timeout.as_millis() as u64,
            max_payload: self.config.max_payload,
        });
        self.send(open.encode()).await?;

        let period = self.config.ping_interval;
        let mut ping_timer = interval_at(Instant::now() + period, period);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let pong_deadline = self.pong_deadline;
            let wake = tokio::select! {
                _ = self.shutdown.changed() => Wake::Shutdown,
                _ = ping_timer.tick() => Wake::PingDue,
                _ = wait_until(pong_deadline) => Wake::PongOverdue,
                Some(snapshot) = next_push(&mut self.receiver) => Wake::Push(snapshot),
                incoming = self.ws.next() => Wake::Incoming(incoming),
            };

            match wake {
                Wake::Shutdown => {
                    let _ = self.ws.close(None).await;
                    return Err(SessionEnd::Shutdown);
                }
                Wake::PingDue => {
                    if self.pong_deadline.is_none() {
                        self.send(EnginePacket::Ping(String::new()).encode()).await?;
                        self.pong_deadline = Some(Instant::now() + self.config.ping_timeout);
                    }
                }
                Wake::PongOverdue => {
                    let _ = self.ws.close(None).await;
                    return Err(SessionEnd::PingTimeout);
                }
                Wake::Push(snapshot) => {
                    let frame = files_updated_frame(&snapshot)
                        .map_err(|e| SessionEnd::Protocol(e.to_string()))?;
                    self.send(frame).await?;
                }
                Wake::Incoming(None) | Wake::Incoming(Some(Ok(Message::Close(_)))) => {
                    return Ok(());
                }
                Wake::Incoming(Some(Ok(Message::Text(text)))) => {
                    if text.len() > self.config.max_payload {
                        let _ = self.ws.close(None).await;
                        return Err(SessionEnd::Protocol("payload too large".to_string()));
                    }
                    if let Err(end) = self.on_text(&text).await {
                        let _ = self.ws.close(None).await;
                        return match end {
                            SessionEnd::Closed => Ok(()),
                            other => Err(other),
                        };
                    }
                }
                Wake::Incoming(Some(Ok(Message::Binary(_)))) => {
                    let _ = self.ws.close(None).await;
                    return Err(SessionEnd::Protocol("binary frames are not supported".to_string()));
                }
                // WebSocket-level ping/pong is answered by tungstenite
                Wake::Incoming(Some(Ok(_))) => {}
                Wake::Incoming(Some(Err(e))) => return Err(e.into()),
            }
        }
    }

    /// Handle one Engine.IO text frame
    async fn on_text(&mut self, text: &str) -> Result<(), SessionEnd> {
        let packet =
            EnginePacket::decode(text).map_err(|e| SessionEnd::Protocol(e.to_string()))?;

        match packet {
            EnginePacket::Ping(data) => self.send(EnginePacket::Pong(data).encode()).await,
            EnginePacket::Pong(_) => {
                self.pong_deadline = None;
                Ok(())
            }
            EnginePacket::Close => Err(SessionEnd::Closed),
            EnginePacket::Message(body) => {
                let packet =
                    SocketPacket::decode(&body).map_err(|e| SessionEnd::Protocol(e.to_string()))?;
                self.on_socket_packet(packet).await
            }
            EnginePacket::Open(_) | EnginePacket::Upgrade | EnginePacket::Noop => Ok(()),
        }
    }

    async fn on_socket_packet(&mut self, packet: SocketPacket) -> Result<(), SessionEnd> {
        match packet {
            SocketPacket::Connect { namespace, .. } if namespace == MAIN_NAMESPACE => {
                if self.receiver.is_some() {
                    return Ok(());
                }
                let (subscriber, receiver) = Subscriber::channel(self.id);
                self.receiver = Some(receiver);
                self.send(SocketPacket::connected(&Uuid::new_v4().to_string()).to_frame())
                    .await?;
                self.notify(HubEvent::Connected(subscriber))
            }
            SocketPacket::Connect { namespace, .. } => {
                debug!("Connection {} asked for unknown namespace {}", self.id, namespace);
                self.send(SocketPacket::invalid_namespace(&namespace).to_frame())
                    .await
            }
            SocketPacket::Disconnect { namespace } if namespace == MAIN_NAMESPACE => {
                if self.receiver.take().is_some() {
                    self.notify(HubEvent::Disconnected(self.id))?;
                }
                Ok(())
            }
            SocketPacket::Event { namespace, name, .. }
                if namespace == MAIN_NAMESPACE && name == EVENT_GET_FILES =>
            {
                if self.receiver.is_none() {
                    debug!("Connection {} sent {} before connecting", self.id, name);
                    return Ok(());
                }
                self.notify(HubEvent::RequestSnapshot(self.id))
            }
            SocketPacket::Event { name, .. } => {
                debug!("Ignoring event {:?} from {}", name, self.id);
                Ok(())
            }
            other => {
                debug!("Ignoring packet {:?} from {}", other, self.id);
                Ok(())
            }
        }
    }

    async fn send(&mut self, frame: String) -> Result<(), SessionEnd> {
        self.ws.send(Message::Text(frame)).await?;
        Ok(())
    }

    fn notify(&self, event: HubEvent) -> Result<(), SessionEnd> {
        self.events.send(event).map_err(|_| SessionEnd::HubGone)
    }

    /// Deregister from the hub if still connected
    fn leave(&mut self) {
        if self.receiver.take().is_some() {
            if self.events.send(HubEvent::Disconnected(self.id)).is_err() {
                warn!("Hub stopped before connection {} was released", self.id);
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_push(receiver: &mut Option<SnapshotReceiver>) -> Option<Arc<Snapshot>> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}
