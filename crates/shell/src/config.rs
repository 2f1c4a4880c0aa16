//! Shell configuration
//!
//! Everything is derived from a single environment toggle: `DEV_ENV=true`
//! selects development mode, anything else is production.

use anyhow::{Context, Result};
use hub::{AllowedOrigin, TransportConfig};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use thiserror::Error;
use watcher::WatchConfig;

/// Environment variable that selects development mode
pub const DEV_ENV_VAR: &str = "DEV_ENV";

/// Frontend dev server loaded in development mode
pub const DEV_SERVER_URL: &str = "http://localhost:5173/";

/// Only browser origin accepted in development mode
pub const DEV_ORIGIN: &str = "http://localhost:5173";

/// Bundled frontend, relative to the executable
pub const PROD_ENTRY: &str = "build/index.html";

pub const WINDOW_WIDTH: u32 = 1300;
pub const WINDOW_HEIGHT: u32 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Development,
    Production,
}

impl Mode {
    /// Interpret the value of `DEV_ENV`
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some("true") => Mode::Development,
            _ => Mode::Production,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Mode::Development)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Development => write!(f, "dev"),
            Mode::Production => write!(f, "prod"),
        }
    }
}

/// When closing the last window ends the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitPolicy {
    /// Quit as soon as no window is open
    OnLastWindowClosed,
    /// Stay alive without windows until quit is requested explicitly
    ExplicitOnly,
}

impl QuitPolicy {
    /// macOS apps conventionally outlive their windows
    pub fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            QuitPolicy::ExplicitOnly
        } else {
            QuitPolicy::OnLastWindowClosed
        }
    }
}

/// What the window displays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    Url(String),
    File(PathBuf),
}

impl std::fmt::Display for LoadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadSource::Url(url) => write!(f, "{}", url),
            LoadSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowOptions {
    pub width: u32,
    pub height: u32,
    pub load: LoadSource,
    /// Open developer tools once the first load finishes
    pub open_dev_tools: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {0}: must be greater than zero")]
    Zero(&'static str),

    #[error("ping timeout must not exceed the ping interval")]
    PingTimeout,

    #[error(transparent)]
    Watch(#[from] watcher::WatchError),
}

/// Complete shell configuration
#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub mode: Mode,
    /// Directory whose listing is published
    pub root: PathBuf,
    pub host: IpAddr,
    pub port: u16,
    pub window: WindowOptions,
    pub watch: WatchConfig,
    pub transport: TransportConfig,
    pub quit_policy: QuitPolicy,
}

impl ShellConfig {
    /// Build the configuration for this process
    ///
    /// Watches the current working directory.
    pub fn from_env() -> Result<Self> {
        let mode = Mode::from_env_value(std::env::var(DEV_ENV_VAR).ok().as_deref());
        let root = std::env::current_dir().context("Failed to get current directory")?;

        let mut config = Self::for_mode(mode, root);
        if !mode.is_development() {
            let exe = std::env::current_exe().context("Failed to get current executable path")?;
            let dir = exe
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_default();
            config.window.load = LoadSource::File(dir.join(PROD_ENTRY));
        }

        Ok(config)
    }

    /// Defaults for `mode`, watching `root`
    pub fn for_mode(mode: Mode, root: impl Into<PathBuf>) -> Self {
        let (load, allowed_origin) = match mode {
            Mode::Development => (
                LoadSource::Url(DEV_SERVER_URL.to_string()),
                AllowedOrigin::Exact(DEV_ORIGIN.to_string()),
            ),
            Mode::Production => (LoadSource::File(PathBuf::from(PROD_ENTRY)), AllowedOrigin::Any),
        };

        Self {
            mode,
            root: root.into(),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: hub::server::DEFAULT_PORT,
            window: WindowOptions {
                width: WINDOW_WIDTH,
                height: WINDOW_HEIGHT,
                load,
                open_dev_tools: mode.is_development(),
            },
            watch: WatchConfig::default(),
            transport: TransportConfig {
                allowed_origin,
                ..TransportConfig::default()
            },
            quit_policy: QuitPolicy::platform_default(),
        }
    }

    /// Reject degenerate settings before anything is started
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.watch.validate()?;

        if self.window.width == 0 {
            return Err(ConfigError::Zero("window width"));
        }
        if self.window.height == 0 {
            return Err(ConfigError::Zero("window height"));
        }

        let transport = &self.transport;
        if transport.ping_interval.is_zero() {
            return Err(ConfigError::Zero("ping interval"));
        }
        if transport.ping_timeout.is_zero() {
            return Err(ConfigError::Zero("ping timeout"));
        }
        if transport.ping_timeout > transport.ping_interval {
            return Err(ConfigError::PingTimeout);
        }
        if transport.handshake_timeout.is_zero() {
            return Err(ConfigError::Zero("handshake timeout"));
        }
        if transport.max_payload == 0 {
            return Err(ConfigError::Zero("max payload"));
        }

        Ok(())
    }
}
