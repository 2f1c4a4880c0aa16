//! Common utilities for integration tests

#![allow(dead_code)]

#[path = "../../../hub/tests/common/client.rs"]
pub mod client;

pub use client::{entry_names, TestClient};

use hub::{DiskSnapshotter, SnapshotSource};
use shell_lib::{HeadlessSurface, Mode, QuitPolicy, Shell, ShellConfig, ShellHandle, SurfaceProbe};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A shell running on an ephemeral port
pub struct RunningShell {
    pub handle: ShellHandle,
    pub probe: SurfaceProbe,
    pub task: JoinHandle<anyhow::Result<()>>,
}

impl RunningShell {
    pub async fn start(root: &Path, mode: Mode, policy: QuitPolicy) -> anyhow::Result<Self> {
        Self::start_with_source(root, mode, policy, Arc::new(DiskSnapshotter)).await
    }

    pub async fn start_with_source(
        root: &Path,
        mode: Mode,
        policy: QuitPolicy,
        source: Arc<dyn SnapshotSource>,
    ) -> anyhow::Result<Self> {
        let mut config = ShellConfig::for_mode(mode, root);
        config.port = 0;
        config.quit_policy = policy;

        let surface = HeadlessSurface::new();
        let probe = surface.probe();
        let shell = Shell::start_with(config, source, Box::new(surface)).await?;
        let handle = shell.handle();
        let task = tokio::spawn(shell.run());

        Ok(Self { handle, probe, task })
    }

    pub async fn production(root: &Path) -> anyhow::Result<Self> {
        Self::start(root, Mode::Production, QuitPolicy::ExplicitOnly).await
    }

    pub fn addr(&self) -> std::net::SocketAddr {
        self.handle.local_addr()
    }

    /// Quit and wait for the event loop to finish
    pub async fn stop(self) -> anyhow::Result<()> {
        self.handle.quit();
        self.task.await?
    }
}
