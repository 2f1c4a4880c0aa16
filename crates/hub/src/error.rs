//! Hub and transport errors

use crate::hub::SubscriberId;
use std::io;
use thiserror::Error;

/// A push to one subscriber did not succeed
#[derive(Debug, Error)]
#[error("subscriber {0} is no longer connected")]
pub struct DeliveryError(pub SubscriberId);

/// Malformed or unsupported wire packet
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty packet")]
    Empty,

    #[error("unknown engine packet type {0:?}")]
    UnknownEngineType(char),

    #[error("unknown socket packet type {0:?}")]
    UnknownSocketType(char),

    #[error("binary packets are not supported")]
    BinaryUnsupported,

    #[error("invalid ack id {0:?}")]
    InvalidAckId(String),

    #[error("event payload must be an array starting with the event name")]
    InvalidEvent,

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Transport server setup failure
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read bound address: {0}")]
    LocalAddr(#[source] io::Error),
}
