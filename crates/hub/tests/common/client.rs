//! Minimal Socket.IO client for driving the transport in tests
//!
//! Speaks Engine.IO v4 over a raw WebSocket, answers heartbeats on its own
//! and exposes the two application events as plain method calls.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Context, Result};
use futures::{SinkExt, StreamExt};
use hub::protocol::{EnginePacket, Handshake, SocketPacket, EVENT_FILES_UPDATED, EVENT_GET_FILES};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Default wait for anything the server is expected to send
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    handshake: Handshake,
}

impl TestClient {
    /// Open a connection without an `Origin` header
    pub async fn open(addr: SocketAddr) -> Result<Self> {
        Self::open_with_origin(addr, None).await
    }

    /// Open a connection, optionally presenting a browser origin
    pub async fn open_with_origin(addr: SocketAddr, origin: Option<&str>) -> Result<Self> {
        let url = format!("ws://{}/socket.io/?EIO=4&transport=websocket", addr);
        let mut request = url.into_client_request()?;
        if let Some(origin) = origin {
            request
                .headers_mut()
                .insert("Origin", HeaderValue::from_str(origin)?);
        }

        let (mut ws, _) = connect_async(request).await?;

        let first = recv_text(&mut ws, RECV_TIMEOUT).await?;
        let handshake = match EnginePacket::decode(&first)? {
            EnginePacket::Open(handshake) => handshake,
            other => bail!("expected open packet, got {:?}", other),
        };

        Ok(Self { ws, handshake })
    }

    /// Open a connection and join the main namespace
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let mut client = Self::open(addr).await?;
        client.join().await?;
        Ok(client)
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    /// Join the main namespace and wait for the acknowledgement
    pub async fn join(&mut self) -> Result<String> {
        self.send_raw("40").await?;
        match self.next_socket_packet(RECV_TIMEOUT).await? {
            SocketPacket::Connect {
                data: Some(data), ..
            } => data
                .get("sid")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| anyhow!("connect ack without sid: {}", data)),
            other => bail!("expected connect ack, got {:?}", other),
        }
    }

    /// Leave the main namespace
    pub async fn leave(&mut self) -> Result<()> {
        self.send_raw("41").await
    }

    /// Emit `get-files`
    pub async fn request_files(&mut self) -> Result<()> {
        let frame = SocketPacket::event(EVENT_GET_FILES, Vec::new()).to_frame();
        self.send_raw(&frame).await
    }

    /// Wait for the next `files-updated` event and return its payload
    pub async fn next_files(&mut self) -> Result<Value> {
        self.next_files_within(RECV_TIMEOUT).await
    }

    pub async fn next_files_within(&mut self, timeout: Duration) -> Result<Value> {
        match self.next_socket_packet(timeout).await? {
            SocketPacket::Event { name, mut args, .. } if name == EVENT_FILES_UPDATED => {
                if args.len() != 1 {
                    bail!("files-updated carried {} arguments", args.len());
                }
                Ok(args.remove(0))
            }
            other => bail!("expected files-updated, got {:?}", other),
        }
    }

    /// Assert that no Socket.IO packet arrives for `window`
    pub async fn expect_silence(&mut self, window: Duration) -> Result<()> {
        match self.next_socket_packet(window).await {
            Ok(packet) => bail!("expected silence, got {:?}", packet),
            Err(_) => Ok(()),
        }
    }

    /// Send an arbitrary Engine.IO text frame
    pub async fn send_raw(&mut self, frame: &str) -> Result<()> {
        self.ws.send(Message::Text(frame.to_string())).await?;
        Ok(())
    }

    /// Next Socket.IO packet, answering server pings on the way
    pub async fn next_socket_packet(&mut self, timeout: Duration) -> Result<SocketPacket> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let text = recv_text(&mut self.ws, remaining).await?;
            match EnginePacket::decode(&text)? {
                EnginePacket::Ping(data) => {
                    self.send_raw(&EnginePacket::Pong(data).encode()).await?;
                }
                EnginePacket::Message(body) => return Ok(SocketPacket::decode(&body)?),
                EnginePacket::Close => bail!("server closed the session"),
                _ => {}
            }
        }
    }

    /// Wait until the server ends the connection
    pub async fn expect_closed(&mut self) -> Result<()> {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, self.ws.next()).await {
                Err(_) => bail!("connection still open"),
                Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return Ok(()),
                Ok(Some(Ok(_))) => {}
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

async fn recv_text(
    ws: &mut WebSocketStream<MaybeTlsStream<TcpStream>>,
    timeout: Duration,
) -> Result<String> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let message = tokio::time::timeout(remaining, ws.next())
            .await
            .context("timed out waiting for a frame")?
            .ok_or_else(|| anyhow!("connection closed"))??;
        match message {
            Message::Text(text) => return Ok(text),
            Message::Close(_) => bail!("connection closed"),
            _ => {}
        }
    }
}

/// Names of the entries in a `files-updated` payload, in wire order
pub fn entry_names(payload: &Value) -> Vec<String> {
    payload
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
