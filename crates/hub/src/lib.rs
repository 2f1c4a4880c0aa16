//! Snapshot fan-out for Filecast
//!
//! This crate provides:
//! - `BroadcastHub`: the subscriber set and snapshot delivery
//! - `SnapshotSource`: the seam between the hub and the file system
//! - The Socket.IO / Engine.IO wire codec
//! - `TransportServer`: the WebSocket endpoint clients connect to

pub mod error;
pub mod hub;
pub mod protocol;
pub mod server;
pub mod session;
pub mod source;

// Re-exports
pub use error::{DeliveryError, ProtocolError, TransportError};
pub use hub::{BroadcastHub, BroadcastReport, HubEvent, Subscriber, SubscriberId, SnapshotReceiver};
pub use server::{AllowedOrigin, TransportConfig, TransportServer};
pub use source::{DiskSnapshotter, SnapshotSource};
