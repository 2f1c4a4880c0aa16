//! WebSocket transport server
//!
//! One listener per process. Every accepted connection runs as its own task
//! and reports to the hub through `HubEvent`s.

use crate::error::TransportError;
use crate::hub::{HubEvent, SubscriberId};
use crate::session;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default port clients connect to
pub const DEFAULT_PORT: u16 = 3000;

/// Default largest accepted text frame, in bytes
pub const DEFAULT_MAX_PAYLOAD: usize = 1_000_000;

/// Which browser origins may open a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigin {
    Any,
    Exact(String),
}

impl AllowedOrigin {
    /// Check the `Origin` header of an upgrade request
    ///
    /// Requests without an origin do not come from a browser and are allowed.
    pub fn permits(&self, origin: Option<&str>) -> bool {
        match (self, origin) {
            (AllowedOrigin::Any, _) | (_, None) => true,
            (AllowedOrigin::Exact(allowed), Some(origin)) => {
                allowed.trim_end_matches('/') == origin.trim_end_matches('/')
            }
        }
    }
}

/// Transport settings
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub allowed_origin: AllowedOrigin,
    /// Interval between server pings
    pub ping_interval: Duration,
    /// How long a client may take to answer a ping
    pub ping_timeout: Duration,
    /// Largest accepted text frame, in bytes
    pub max_payload: usize,
    /// Upper bound for the WebSocket upgrade
    pub handshake_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            allowed_origin: AllowedOrigin::Any,
            ping_interval: Duration::from_millis(25_000),
            ping_timeout: Duration::from_millis(20_000),
            max_payload: DEFAULT_MAX_PAYLOAD,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Running transport server
pub struct TransportServer {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
}

impl TransportServer {
    /// Bind the listener and start accepting connections
    pub async fn bind<A>(
        addr: A,
        config: TransportConfig,
        events: mpsc::UnboundedSender<HubEvent>,
    ) -> Result<Self, TransportError>
    where
        A: ToSocketAddrs + std::fmt::Debug,
    {
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: format!("{:?}", addr),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(TransportError::LocalAddr)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::new(config),
            events,
            shutdown_rx,
        ));

        info!("Socket.IO server running on port {}", local_addr.port());

        Ok(Self {
            local_addr,
            shutdown_tx,
            accept_task: Some(accept_task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.accept_task.is_some()
    }

    /// Stop accepting, close every session and release the listener
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if let Some(task) = self.accept_task.take() {
            let _ = self.shutdown_tx.send(true);
            task.abort();
            // Cancellation is the expected outcome
            let _ = task.await;
            info!("Socket.IO server on port {} stopped", self.local_addr.port());
        }
    }
}

impl Drop for TransportServer {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            let _ = self.shutdown_tx.send(true);
            task.abort();
        }
    }
}

impl std::fmt::Debug for TransportServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportServer")
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: Arc<TransportConfig>,
    events: mpsc::UnboundedSender<HubEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut next_id = 0u64;

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    next_id += 1;
                    let id = SubscriberId::new(next_id);
                    debug!("Accepted connection {} from {}", id, peer);

                    tokio::spawn(session::serve(
                        stream,
                        peer,
                        id,
                        config.clone(),
                        events.clone(),
                        shutdown_rx.clone(),
                    ));
                }
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    // Back off on resource exhaustion (e.g. EMFILE)
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }
}
