//! Socket.IO v5 over Engine.IO v4, text packets only
//!
//! Engine.IO frame: `<type><data>`, one per WebSocket text message.
//! Socket.IO packet (inside an Engine.IO `4` message):
//! `<type>[<namespace>,][<ack id>][<JSON payload>]`, where the namespace is
//! omitted for the main namespace `/`.

use crate::error::ProtocolError;
use fc_core::Snapshot;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Client → server: request the current listing
pub const EVENT_GET_FILES: &str = "get-files";

/// Server → client: a fresh listing
pub const EVENT_FILES_UPDATED: &str = "files-updated";

/// The only namespace served
pub const MAIN_NAMESPACE: &str = "/";

/// Engine.IO protocol revision spoken by the server
pub const ENGINE_PROTOCOL: &str = "4";

/// Body of the Engine.IO open packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    pub max_payload: usize,
}

/// Engine.IO packet
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    /// Parse one text frame
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let kind = text.chars().next().ok_or(ProtocolError::Empty)?;
        let data = &text[kind.len_utf8()..];

        match kind {
            '0' => Ok(EnginePacket::Open(serde_json::from_str(data)?)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(data.to_string())),
            '3' => Ok(EnginePacket::Pong(data.to_string())),
            '4' => Ok(EnginePacket::Message(data.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            'b' => Err(ProtocolError::BinaryUnsupported),
            other => Err(ProtocolError::UnknownEngineType(other)),
        }
    }

    /// Render as a text frame
    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(handshake) => {
                // A struct of strings and integers always serializes
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data),
            EnginePacket::Pong(data) => format!("3{}", data),
            EnginePacket::Message(data) => format!("4{}", data),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

/// Socket.IO packet
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Value,
    },
}

impl SocketPacket {
    /// Event on the main namespace
    pub fn event(name: impl Into<String>, args: Vec<Value>) -> Self {
        SocketPacket::Event {
            namespace: MAIN_NAMESPACE.to_string(),
            ack: None,
            name: name.into(),
            args,
        }
    }

    /// Server reply to a successful CONNECT
    pub fn connected(sid: &str) -> Self {
        SocketPacket::Connect {
            namespace: MAIN_NAMESPACE.to_string(),
            data: Some(json!({ "sid": sid })),
        }
    }

    /// Server reply to a CONNECT for a namespace that does not exist
    pub fn invalid_namespace(namespace: &str) -> Self {
        SocketPacket::ConnectError {
            namespace: namespace.to_string(),
            data: json!({ "message": "Invalid namespace" }),
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::Ack { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. } => namespace,
        }
    }

    /// Parse the payload of an Engine.IO message
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let kind = text.chars().next().ok_or(ProtocolError::Empty)?;
        let rest = &text[kind.len_utf8()..];

        match kind {
            '0'..='4' => {}
            '5' | '6' => return Err(ProtocolError::BinaryUnsupported),
            other => return Err(ProtocolError::UnknownSocketType(other)),
        }

        let (namespace, rest) = if rest.starts_with('/') {
            match rest.find(',') {
                Some(comma) => (&rest[..comma], &rest[comma + 1..]),
                None => (rest, ""),
            }
        } else {
            (MAIN_NAMESPACE, rest)
        };
        let namespace = namespace.to_string();

        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (ack, payload) = rest.split_at(digits);
        let ack = if ack.is_empty() {
            None
        } else {
            Some(
                ack.parse::<u64>()
                    .map_err(|_| ProtocolError::InvalidAckId(ack.to_string()))?,
            )
        };

        let payload: Option<Value> = if payload.is_empty() {
            None
        } else {
            Some(serde_json::from_str(payload)?)
        };

        match kind {
            '0' => Ok(SocketPacket::Connect {
                namespace,
                data: payload,
            }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let mut items = match payload {
                    Some(Value::Array(items)) if !items.is_empty() => items,
                    _ => return Err(ProtocolError::InvalidEvent),
                };
                let name = match items.remove(0) {
                    Value::String(name) => name,
                    _ => return Err(ProtocolError::InvalidEvent),
                };
                Ok(SocketPacket::Event {
                    namespace,
                    ack,
                    name,
                    args: items,
                })
            }
            '3' => {
                let ack = ack.ok_or_else(|| ProtocolError::InvalidAckId(String::new()))?;
                let args = match payload {
                    Some(Value::Array(args)) => args,
                    _ => Vec::new(),
                };
                Ok(SocketPacket::Ack {
                    namespace,
                    ack,
                    args,
                })
            }
            _ => Ok(SocketPacket::ConnectError {
                namespace,
                data: payload.unwrap_or(Value::Null),
            }),
        }
    }

    /// Render as the payload of an Engine.IO message
    pub fn encode(&self) -> String {
        let (kind, payload, ack) = match self {
            SocketPacket::Connect { data, .. } => ('0', data.as_ref().map(Value::to_string), None),
            SocketPacket::Disconnect { .. } => ('1', None, None),
            SocketPacket::Event { ack, name, args, .. } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                ('2', Some(Value::Array(items).to_string()), *ack)
            }
            SocketPacket::Ack { ack, args, .. } => {
                ('3', Some(Value::Array(args.clone()).to_string()), Some(*ack))
            }
            SocketPacket::ConnectError { data, .. } => ('4', Some(data.to_string()), None),
        };

        let mut out = String::new();
        out.push(kind);
        if self.namespace() != MAIN_NAMESPACE {
            out.push_str(self.namespace());
            out.push(',');
        }
        if let Some(ack) = ack {
            out.push_str(&ack.to_string());
        }
        if let Some(payload) = payload {
            out.push_str(&payload);
        }
        out
    }

    /// Wrap in an Engine.IO message frame
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}

/// Complete `files-updated` frame for a snapshot
///
/// Serializes straight from the snapshot so the entry order and field order
/// are exactly those of the snapshot.
pub fn files_updated_frame(snapshot: &Snapshot) -> Result<String, ProtocolError> {
    let payload = serde_json::to_string(&(EVENT_FILES_UPDATED, snapshot))?;
    Ok(format!("42{}", payload))
}
