//! Subscriber set and snapshot delivery
//!
//! The hub is owned by a single event loop and handles one event at a time,
//! so recomputations never overlap and every subscriber sees snapshots in
//! the order they were produced. Delivery goes through an unbounded
//! per-subscriber queue: pushing never waits on a slow connection.

use crate::error::DeliveryError;
use crate::source::SnapshotSource;
use fc_core::Snapshot;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Receiving end of a subscriber's snapshot queue
pub type SnapshotReceiver = mpsc::UnboundedReceiver<Arc<Snapshot>>;

/// Connection-scoped subscriber identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A live connection as seen by the hub
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    sender: mpsc::UnboundedSender<Arc<Snapshot>>,
}

impl Subscriber {
    /// Create a subscriber together with the queue its connection drains
    pub fn channel(id: SubscriberId) -> (Self, SnapshotReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { id, sender }, receiver)
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Queue a snapshot for this subscriber
    pub fn push(&self, snapshot: Arc<Snapshot>) -> Result<(), DeliveryError> {
        self.sender
            .send(snapshot)
            .map_err(|_| DeliveryError(self.id))
    }
}

/// Transport → hub notifications
#[derive(Debug)]
pub enum HubEvent {
    Connected(Subscriber),
    RequestSnapshot(SubscriberId),
    Disconnected(SubscriberId),
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: Vec<SubscriberId>,
}

/// Fans snapshots of the watch root out to connected subscribers
pub struct BroadcastHub {
    root: PathBuf,
    source: Arc<dyn SnapshotSource>,
    subscribers: BTreeMap<SubscriberId, Subscriber>,
    /// Last snapshot handed to any subscriber
    last_published: Option<Arc<Snapshot>>,
}

impl BroadcastHub {
    /// Create a hub for `root`
    pub fn new(root: impl Into<PathBuf>, source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            root: root.into(),
            source,
            subscribers: BTreeMap::new(),
            last_published: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    pub fn last_published(&self) -> Option<&Arc<Snapshot>> {
        self.last_published.as_ref()
    }

    /// Dispatch a transport event
    pub async fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connected(subscriber) => self.on_subscriber_connect(subscriber),
            HubEvent::RequestSnapshot(id) => {
                self.on_subscriber_request(id).await;
            }
            HubEvent::Disconnected(id) => {
                self.on_subscriber_disconnect(id);
            }
        }
    }

    /// Register a subscriber; nothing is pushed until it asks
    pub fn on_subscriber_connect(&mut self, subscriber: Subscriber) {
        info!("Client connected ({})", subscriber.id());
        self.subscribers.insert(subscriber.id(), subscriber);
    }

    /// Send a fresh snapshot to one subscriber
    ///
    /// Returns true if a snapshot was queued for it.
    pub async fn on_subscriber_request(&mut self, id: SubscriberId) -> bool {
        if !self.subscribers.contains_key(&id) {
            debug!("Ignoring snapshot request from unknown subscriber {}", id);
            return false;
        }

        let snapshot = match self.source.snapshot(&self.root).await {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                warn!("Error reading directory: {}", e);
                return false;
            }
        };

        // The subscriber may have gone while the scan ran
        let Some(subscriber) = self.subscribers.get(&id) else {
            return false;
        };

        match subscriber.push(snapshot.clone()) {
            Ok(()) => {
                self.last_published = Some(snapshot);
                true
            }
            Err(e) => {
                debug!("Delivery failed: {}", e);
                self.subscribers.remove(&id);
                false
            }
        }
    }

    /// Remove a subscriber; unknown ids are ignored
    ///
    /// Returns true if the subscriber was registered.
    pub fn on_subscriber_disconnect(&mut self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            info!("Client disconnected ({})", id);
        }
        removed
    }

    /// Recompute the root snapshot and broadcast it
    ///
    /// On failure nothing is published and `None` is returned; the last
    /// published snapshot stands.
    pub async fn refresh(&mut self) -> Option<BroadcastReport> {
        match self.source.snapshot(&self.root).await {
            Ok(snapshot) => Some(self.broadcast(Arc::new(snapshot))),
            Err(e) => {
                warn!("Error reading directory, keeping last snapshot: {}", e);
                None
            }
        }
    }

    /// Send the same snapshot to every connected subscriber
    ///
    /// A failed delivery is logged and the subscriber dropped; the others
    /// are unaffected.
    pub fn broadcast(&mut self, snapshot: Arc<Snapshot>) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for subscriber in self.subscribers.values() {
            match subscriber.push(snapshot.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    debug!("Delivery failed: {}", e);
                    report.failed.push(subscriber.id());
                }
            }
        }

        for id in &report.failed {
            self.subscribers.remove(id);
        }

        debug!(
            "Broadcast {} entries to {} subscribers ({} failed)",
            snapshot.len(),
            report.delivered,
            report.failed.len()
        );

        self.last_published = Some(snapshot);
        report
    }
}

impl fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("root", &self.root)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
