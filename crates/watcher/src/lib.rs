//! File system watching for Filecast
//!
//! This crate turns raw OS notifications for a directory tree into a single,
//! debounced "something changed" signal:
//! - Recursive watching through `notify`
//! - Hidden-entry and event-kind filtering
//! - Trailing-edge debouncing with a latency cap
//!
//! What changed is deliberately discarded; consumers recompute a full
//! snapshot on every signal.

pub mod debounce;
pub mod ignore;

use debounce::Debouncer;
use ignore::EventFilter;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Default quiet period before a burst fires
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Default upper bound on how long a burst may be held back
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1);

/// Errors raised while setting up a watch
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watch root {path} is not accessible: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create file watcher: {0}")]
    Backend(#[source] notify::Error),

    #[error("failed to watch {path}: {source}")]
    WatchPath {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("file watching must be started from within a Tokio runtime")]
    NoRuntime,

    #[error("invalid watch configuration: {0}")]
    InvalidConfig(String),
}

/// Watcher timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConfig {
    /// Quiet period that ends a burst
    pub debounce: Duration,
    /// Longest a burst may be held back under continuous writes
    pub max_delay: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl WatchConfig {
    /// Reject degenerate timings
    pub fn validate(&self) -> Result<(), WatchError> {
        if self.debounce.is_zero() {
            return Err(WatchError::InvalidConfig(
                "debounce window must be greater than zero".to_string(),
            ));
        }
        if self.max_delay < self.debounce {
            return Err(WatchError::InvalidConfig(format!(
                "max delay ({:?}) must not be shorter than the debounce window ({:?})",
                self.max_delay, self.debounce
            )));
        }
        Ok(())
    }
}

/// Start watching `root` recursively
///
/// `on_change` is called from a background task once per settled burst of
/// qualifying events. Must be called from within a Tokio runtime.
pub fn start<F>(root: &Path, config: WatchConfig, on_change: F) -> Result<WatchHandle, WatchError>
where
    F: Fn() + Send + Sync + 'static,
{
    config.validate()?;

    let runtime = tokio::runtime::Handle::try_current().map_err(|_| WatchError::NoRuntime)?;

    // Backends report canonical paths on some platforms
    let root = root.canonicalize().map_err(|source| WatchError::Root {
        path: root.to_path_buf(),
        source,
    })?;

    let filter = EventFilter::new(root.clone());
    let (raw_tx, raw_rx) = mpsc::unbounded_channel();

    let mut backend = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if filter.qualifies(&event) {
                debug!("Change event {:?} for {:?}", event.kind, event.paths);
                let _ = raw_tx.send(());
            }
        }
        Err(e) => warn!("File watcher error: {}", e),
    })
    .map_err(WatchError::Backend)?;

    backend
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|source| WatchError::WatchPath {
            path: root.clone(),
            source,
        })?;

    let debouncer = Debouncer::new(config.debounce, config.max_delay);
    let task = runtime.spawn(run_debounce(raw_rx, debouncer, Arc::new(on_change)));

    info!("Watching for file changes in {}", root.display());

    Ok(WatchHandle {
        root,
        active: Mutex::new(Some(ActiveWatch {
            _backend: backend,
            task,
        })),
    })
}

/// Turn raw event notifications into debounced change signals
///
/// Exits when the raw channel closes; a burst still pending at that point is
/// dropped.
async fn run_debounce(
    mut raw_rx: mpsc::UnboundedReceiver<()>,
    mut debouncer: Debouncer,
    on_change: Arc<dyn Fn() + Send + Sync>,
) {
    loop {
        match debouncer.deadline() {
            Some(deadline) => {
                tokio::select! {
                    raw = raw_rx.recv() => match raw {
                        Some(()) => debouncer.record(Instant::now()),
                        None => break,
                    },
                    _ = sleep_until(deadline) => {
                        if debouncer.fire(Instant::now()) {
                            on_change();
                        }
                    }
                }
            }
            None => match raw_rx.recv().await {
                Some(()) => debouncer.record(Instant::now()),
                None => break,
            },
        }
    }
}

struct ActiveWatch {
    /// Dropping the backend releases the OS watches
    _backend: RecommendedWatcher,
    task: JoinHandle<()>,
}

/// Handle to a running watch
///
/// Dropping the handle stops the watch.
pub struct WatchHandle {
    root: PathBuf,
    active: Mutex<Option<ActiveWatch>>,
}

impl WatchHandle {
    /// Stop watching
    ///
    /// Releases the OS watches and cancels any pending burst. Safe to call
    /// any number of times.
    pub fn stop(&self) {
        if let Some(active) = self.active.lock().take() {
            active.task.abort();
            drop(active._backend);
            info!("Stopped watching {}", self.root.display());
        }
    }

    /// Check if the watch is still running
    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Canonical root being watched
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("root", &self.root)
            .field("active", &self.is_active())
            .finish()
    }
}
