//! Control channel between the displayed frontend and the shell
//!
//! The frontend gets exactly one capability: asking for its window to be
//! closed. Nothing else crosses this boundary.

use thiserror::Error;
use tokio::sync::mpsc;

/// Channel name the frontend uses to close its window
pub const CLOSE_WINDOW_CHANNEL: &str = "close-window";

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("unknown control channel: {0}")]
    UnknownChannel(String),

    #[error("shell is no longer running")]
    Closed,
}

/// Requests the frontend may make
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    CloseWindow,
}

impl ControlRequest {
    pub fn channel(&self) -> &'static str {
        match self {
            ControlRequest::CloseWindow => CLOSE_WINDOW_CHANNEL,
        }
    }

    /// Map a raw channel name to a request
    pub fn from_channel(name: &str) -> Result<Self, IpcError> {
        match name {
            CLOSE_WINDOW_CHANNEL => Ok(ControlRequest::CloseWindow),
            other => Err(IpcError::UnknownChannel(other.to_string())),
        }
    }
}

pub type ControlReceiver = mpsc::UnboundedReceiver<ControlRequest>;

/// Capability handed to the display surface
#[derive(Debug, Clone)]
pub struct ControlSender {
    tx: mpsc::UnboundedSender<ControlRequest>,
}

impl ControlSender {
    /// Ask the shell to close the window. No reply is sent.
    pub fn close_window(&self) -> Result<(), IpcError> {
        self.send(ControlRequest::CloseWindow)
    }

    /// Forward a message received on a named channel
    pub fn send_raw(&self, channel: &str) -> Result<(), IpcError> {
        self.send(ControlRequest::from_channel(channel)?)
    }

    fn send(&self, request: ControlRequest) -> Result<(), IpcError> {
        self.tx.send(request).map_err(|_| IpcError::Closed)
    }
}

pub fn control_channel() -> (ControlSender, ControlReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ControlSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_window_round_trip() {
        let (sender, mut receiver) = control_channel();

        sender.close_window().unwrap();
        sender.send_raw("close-window").unwrap();

        assert_eq!(receiver.try_recv().unwrap(), ControlRequest::CloseWindow);
        assert_eq!(receiver.try_recv().unwrap(), ControlRequest::CloseWindow);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_unknown_channel_is_rejected() {
        let (sender, mut receiver) = control_channel();

        let result = sender.send_raw("read-file");
        assert!(matches!(result, Err(IpcError::UnknownChannel(name)) if name == "read-file"));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_send_after_shell_stopped() {
        let (sender, receiver) = control_channel();
        drop(receiver);

        assert!(matches!(sender.close_window(), Err(IpcError::Closed)));
    }

    #[test]
    fn test_channel_name() {
        assert_eq!(ControlRequest::CloseWindow.channel(), "close-window");
    }
}
