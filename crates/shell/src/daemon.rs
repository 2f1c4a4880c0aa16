//! Shell lifecycle and the event loop
//!
//! Startup order: file watcher, transport, window. A failure in any of them
//! aborts startup and releases what was already started. Once running, one
//! task handles every input in arrival order:
//! - quit requests from `ShellHandle`
//! - control requests from the frontend
//! - window events
//! - connection events from the transport
//! - debounced change notifications from the watcher

use crate::config::{QuitPolicy, ShellConfig};
use crate::ipc::{control_channel, ControlReceiver, ControlRequest, ControlSender};
use crate::window::{
    DisplaySurface, HeadlessSurface, HostMessage, SurfaceEvent, SurfaceEventReceiver,
    SurfaceEventSender,
};
use anyhow::{Context, Result};
use hub::{BroadcastHub, DiskSnapshotter, HubEvent, SnapshotSource, TransportServer};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, info};
use watcher::WatchHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

/// Cloneable remote control for a running shell
#[derive(Debug, Clone)]
pub struct ShellHandle {
    quit_tx: mpsc::UnboundedSender<()>,
    lifecycle: watch::Receiver<Lifecycle>,
    local_addr: SocketAddr,
}

impl ShellHandle {
    /// Ask the shell to shut down
    ///
    /// Returns false if the shell already stopped.
    pub fn quit(&self) -> bool {
        self.quit_tx.send(()).is_ok()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.borrow()
    }

    /// Address the transport is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait until the shell reaches `Stopped`
    pub async fn stopped(&mut self) {
        let _ = self
            .lifecycle
            .wait_for(|state| *state == Lifecycle::Stopped)
            .await;
    }
}

/// Step selected by one turn of the event loop
enum Step {
    Quit,
    Control(ControlRequest),
    Surface(SurfaceEvent),
    Hub(HubEvent),
    Changed,
}

/// The running application
pub struct Shell {
    config: ShellConfig,
    lifecycle: watch::Sender<Lifecycle>,
    handle: ShellHandle,
    quit_rx: mpsc::UnboundedReceiver<()>,

    watch: WatchHandle,
    changed: Arc<Notify>,

    hub: BroadcastHub,
    hub_rx: mpsc::UnboundedReceiver<HubEvent>,
    transport: TransportServer,

    surface: Box<dyn DisplaySurface>,
    control_tx: ControlSender,
    control_rx: ControlReceiver,
    surface_tx: SurfaceEventSender,
    surface_rx: SurfaceEventReceiver,
    /// Drag region already enabled for the current window
    drag_region_enabled: bool,
}

impl Shell {
    /// Start with the disk snapshotter and a headless window
    pub async fn start(config: ShellConfig) -> Result<Self> {
        Self::start_with(config, Arc::new(DiskSnapshotter), Box::new(HeadlessSurface::new())).await
    }

    /// Start with an explicit snapshot source and display surface
    pub async fn start_with(
        config: ShellConfig,
        source: Arc<dyn SnapshotSource>,
        mut surface: Box<dyn DisplaySurface>,
    ) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let (lifecycle, lifecycle_rx) = watch::channel(Lifecycle::Starting);

        let changed = Arc::new(Notify::new());
        let notify = changed.clone();
        let watch = watcher::start(&config.root, config.watch, move || notify.notify_one())
            .with_context(|| format!("Failed to watch {}", config.root.display()))?;

        let (hub_tx, hub_rx) = mpsc::unbounded_channel();
        let transport = TransportServer::bind(
            (config.host, config.port),
            config.transport.clone(),
            hub_tx,
        )
        .await
        .context("Failed to start Socket.IO server")?;
        let hub = BroadcastHub::new(watch.root(), source);

        let (control_tx, control_rx) = control_channel();
        let (surface_tx, surface_rx) = mpsc::unbounded_channel();
        surface
            .open(&config.window, control_tx.clone(), surface_tx.clone())
            .context("Failed to open window")?;
        info!("Running in {} mode", config.mode);

        let (quit_tx, quit_rx) = mpsc::unbounded_channel();
        let handle = ShellHandle {
            quit_tx,
            lifecycle: lifecycle_rx,
            local_addr: transport.local_addr(),
        };
        lifecycle.send_replace(Lifecycle::Running);

        Ok(Self {
            config,
            lifecycle,
            handle,
            quit_rx,
            watch,
            changed,
            hub,
            hub_rx,
            transport,
            surface,
            control_tx,
            control_rx,
            surface_tx,
            surface_rx,
            drag_region_enabled: false,
        })
    }

    pub fn handle(&self) -> ShellHandle {
        self.handle.clone()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.borrow()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Canonical directory being published
    pub fn root(&self) -> &Path {
        self.watch.root()
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Run until quit, then shut down
    ///
    /// Shutdown also runs when the loop fails; the loop's error is returned
    /// once everything is released.
    pub async fn run(mut self) -> Result<()> {
        let result = self.event_loop().await;
        self.shutdown().await;
        result
    }

    async fn event_loop(&mut self) -> Result<()> {
        loop {
            let step = tokio::select! {
                Some(()) = self.quit_rx.recv() => Step::Quit,
                Some(request) = self.control_rx.recv() => Step::Control(request),
                Some(event) = self.surface_rx.recv() => Step::Surface(event),
                Some(event) = self.hub_rx.recv() => Step::Hub(event),
                _ = self.changed.notified() => Step::Changed,
            };

            match step {
                Step::Quit => {
                    info!("Quit requested");
                    return Ok(());
                }
                Step::Control(ControlRequest::CloseWindow) => {
                    debug!("Frontend asked to close the window");
                    self.surface.close();
                }
                Step::Surface(event) => {
                    if self.on_surface_event(event)? {
                        return Ok(());
                    }
                }
                Step::Hub(event) => self.hub.handle(event).await,
                Step::Changed => {
                    self.hub.refresh().await;
                }
            }
        }
    }

    /// Returns true when the event ends the application
    fn on_surface_event(&mut self, event: SurfaceEvent) -> Result<bool> {
        match event {
            SurfaceEvent::FirstLoadFinished => {
                if !self.drag_region_enabled {
                    self.surface.push(HostMessage::EnableDragRegion);
                    self.drag_region_enabled = true;
                }
                if self.config.window.open_dev_tools {
                    self.surface.open_dev_tools();
                }
                Ok(false)
            }
            SurfaceEvent::Closed => {
                self.drag_region_enabled = false;
                match self.config.quit_policy {
                    QuitPolicy::OnLastWindowClosed => {
                        info!("Last window closed");
                        Ok(true)
                    }
                    QuitPolicy::ExplicitOnly => Ok(false),
                }
            }
            SurfaceEvent::Activated => {
                if !self.surface.is_open() {
                    self.surface
                        .open(
                            &self.config.window,
                            self.control_tx.clone(),
                            self.surface_tx.clone(),
                        )
                        .context("Failed to reopen window")?;
                }
                Ok(false)
            }
        }
    }

    /// Stop the watcher, the transport and the window, in that order
    async fn shutdown(&mut self) {
        self.lifecycle.send_replace(Lifecycle::ShuttingDown);

        self.watch.stop();
        self.transport.shutdown().await;
        self.surface.close();

        self.lifecycle.send_replace(Lifecycle::Stopped);
        info!("Shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use crate::window::SurfaceProbe;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_config(root: &Path, policy: QuitPolicy) -> ShellConfig {
        let mut config = ShellConfig::for_mode(Mode::Production, root);
        config.port = 0;
        config.quit_policy = policy;
        config
    }

    async fn start(root: &Path, policy: QuitPolicy) -> (Shell, SurfaceProbe) {
        let surface = HeadlessSurface::new();
        let probe = surface.probe();
        let shell = Shell::start_with(
            test_config(root, policy),
            Arc::new(DiskSnapshotter),
            Box::new(surface),
        )
        .await
        .unwrap();
        (shell, probe)
    }

    async fn wait_stopped(mut handle: ShellHandle) {
        tokio::time::timeout(Duration::from_secs(5), handle.stopped())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_start_enters_running() {
        let temp_dir = TempDir::new().unwrap();
        let (shell, probe) = start(temp_dir.path(), QuitPolicy::OnLastWindowClosed).await;

        assert_eq!(shell.lifecycle(), Lifecycle::Running);
        assert_ne!(shell.local_addr().port(), 0);
        assert_eq!(shell.root(), temp_dir.path().canonicalize().unwrap());
        assert!(probe.is_open());
    }

    #[tokio::test]
    async fn test_start_fails_for_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");

        let result = Shell::start(test_config(&missing, QuitPolicy::OnLastWindowClosed)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_fails_when_port_taken() {
        let temp_dir = TempDir::new().unwrap();
        let (first, _probe) = start(temp_dir.path(), QuitPolicy::OnLastWindowClosed).await;

        let mut config = test_config(temp_dir.path(), QuitPolicy::OnLastWindowClosed);
        config.port = first.local_addr().port();
        let surface = HeadlessSurface::new();
        let probe = surface.probe();

        let result = Shell::start_with(config, Arc::new(DiskSnapshotter), Box::new(surface)).await;
        assert!(result.is_err());
        // Window is opened last, so a failed bind never shows one
        assert_eq!(probe.open_count(), 0);
    }

    #[tokio::test]
    async fn test_quit_stops_everything() {
        let temp_dir = TempDir::new().unwrap();
        let (shell, probe) = start(temp_dir.path(), QuitPolicy::ExplicitOnly).await;
        let handle = shell.handle();
        let addr = shell.local_addr();

        let task = tokio::spawn(shell.run());
        assert!(handle.quit());
        wait_stopped(handle.clone()).await;
        task.await.unwrap().unwrap();

        assert_eq!(handle.lifecycle(), Lifecycle::Stopped);
        assert!(!probe.is_open());
        assert!(!handle.quit());
        assert!(tokio::net::TcpListener::bind(addr).await.is_ok());
    }

    #[tokio::test]
    async fn test_first_load_enables_drag_region_once() {
        let temp_dir = TempDir::new().unwrap();
        let (shell, probe) = start(temp_dir.path(), QuitPolicy::ExplicitOnly).await;
        let handle = shell.handle();
        let task = tokio::spawn(shell.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        probe.emit(SurfaceEvent::FirstLoadFinished);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(probe.pushed(), vec![HostMessage::EnableDragRegion]);
        assert!(!probe.dev_tools_opened());

        handle.quit();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_window_quits_on_last_window_policy() {
        let temp_dir = TempDir::new().unwrap();
        let (shell, probe) = start(temp_dir.path(), QuitPolicy::OnLastWindowClosed).await;
        let handle = shell.handle();
        let task = tokio::spawn(shell.run());

        probe.control().unwrap().close_window().unwrap();
        wait_stopped(handle.clone()).await;
        task.await.unwrap().unwrap();

        assert!(!probe.is_open());
    }

    #[tokio::test]
    async fn test_close_window_keeps_running_on_explicit_policy() {
        let temp_dir = TempDir::new().unwrap();
        let (shell, probe) = start(temp_dir.path(), QuitPolicy::ExplicitOnly).await;
        let handle = shell.handle();
        let task = tokio::spawn(shell.run());

        probe.control().unwrap().close_window().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!probe.is_open());
        assert_eq!(handle.lifecycle(), Lifecycle::Running);

        // Activation brings the window back
        probe.emit(SurfaceEvent::Activated);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(probe.is_open());
        assert_eq!(probe.open_count(), 2);
        assert_eq!(
            probe.pushed(),
            vec![HostMessage::EnableDragRegion, HostMessage::EnableDragRegion]
        );

        handle.quit();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_dev_mode_opens_dev_tools() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = ShellConfig::for_mode(Mode::Development, temp_dir.path());
        config.port = 0;
        let surface = HeadlessSurface::new();
        let probe = surface.probe();

        let shell = Shell::start_with(config, Arc::new(DiskSnapshotter), Box::new(surface))
            .await
            .unwrap();
        let handle = shell.handle();
        let task = tokio::spawn(shell.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(probe.dev_tools_opened());

        handle.quit();
        task.await.unwrap().unwrap();
    }

    /// Opens once; every later open fails
    struct OneShotSurface {
        inner: HeadlessSurface,
        opened: bool,
    }

    impl DisplaySurface for OneShotSurface {
        fn open(
            &mut self,
            options: &crate::config::WindowOptions,
            control: ControlSender,
            events: SurfaceEventSender,
        ) -> Result<()> {
            if self.opened {
                anyhow::bail!("display went away");
            }
            self.opened = true;
            self.inner.open(options, control, events)
        }

        fn push(&mut self, message: HostMessage) {
            self.inner.push(message);
        }

        fn close(&mut self) {
            self.inner.close();
        }

        fn is_open(&self) -> bool {
            self.inner.is_open()
        }
    }

    #[tokio::test]
    async fn test_failed_reopen_still_shuts_down() {
        let temp_dir = TempDir::new().unwrap();
        let inner = HeadlessSurface::new();
        let probe = inner.probe();
        let surface = OneShotSurface {
            inner,
            opened: false,
        };

        let shell = Shell::start_with(
            test_config(temp_dir.path(), QuitPolicy::ExplicitOnly),
            Arc::new(DiskSnapshotter),
            Box::new(surface),
        )
        .await
        .unwrap();
        let handle = shell.handle();
        let addr = shell.local_addr();
        let task = tokio::spawn(shell.run());

        probe.control().unwrap().close_window().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        probe.emit(SurfaceEvent::Activated);

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("display went away"));

        assert_eq!(handle.lifecycle(), Lifecycle::Stopped);
        assert!(tokio::net::TcpListener::bind(addr).await.is_ok());
    }
}
