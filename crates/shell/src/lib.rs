//! Filecast application shell
//!
//! Ties the pieces together:
//! - `config`: mode, window and timing settings from the environment
//! - `daemon`: startup, the event loop and orderly shutdown
//! - `ipc`: the single control request the frontend may make
//! - `window`: the display surface boundary

pub mod config;
pub mod daemon;
pub mod ipc;
pub mod window;

// Re-exports
pub use config::{LoadSource, Mode, QuitPolicy, ShellConfig, WindowOptions};
pub use daemon::{Lifecycle, Shell, ShellHandle};
pub use ipc::{ControlRequest, ControlSender, IpcError};
pub use window::{DisplaySurface, HeadlessSurface, HostMessage, SurfaceEvent, SurfaceProbe};
