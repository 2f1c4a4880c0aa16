//! Display surface boundary
//!
//! The shell never renders anything itself. It drives a `DisplaySurface`
//! and reacts to the `SurfaceEvent`s the surface reports back.

use crate::config::WindowOptions;
use crate::ipc::ControlSender;
use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Channel name of the drag-region message
pub const ENABLE_DRAG_REGION: &str = "enable-drag-region";

/// Messages the shell pushes into the displayed frontend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostMessage {
    EnableDragRegion,
}

impl HostMessage {
    pub fn channel(&self) -> &'static str {
        match self {
            HostMessage::EnableDragRegion => ENABLE_DRAG_REGION,
        }
    }
}

/// What happened to the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The frontend finished its first load
    FirstLoadFinished,
    /// The window is gone
    Closed,
    /// The application was activated, e.g. from the dock
    Activated,
}

pub type SurfaceEventSender = mpsc::UnboundedSender<SurfaceEvent>;
pub type SurfaceEventReceiver = mpsc::UnboundedReceiver<SurfaceEvent>;

/// A window hosting the frontend
pub trait DisplaySurface: Send {
    /// Create the window and start loading
    ///
    /// `control` is the only capability the frontend receives. The surface
    /// reports back through `events`.
    fn open(
        &mut self,
        options: &WindowOptions,
        control: ControlSender,
        events: SurfaceEventSender,
    ) -> Result<()>;

    fn push(&mut self, message: HostMessage);

    fn open_dev_tools(&mut self) {}

    /// Close the window, reporting `SurfaceEvent::Closed` if it was open
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

#[derive(Debug, Default)]
struct HeadlessState {
    open: bool,
    open_count: usize,
    dev_tools: bool,
    pushed: Vec<HostMessage>,
    control: Option<ControlSender>,
    events: Option<SurfaceEventSender>,
}

/// Surface without a window
///
/// Logs what a real window would load and reports the first load as soon as
/// it is opened. A `SurfaceProbe` observes it and can act as the frontend.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> SurfaceProbe {
        SurfaceProbe {
            state: self.state.clone(),
        }
    }
}

impl DisplaySurface for HeadlessSurface {
    fn open(
        &mut self,
        options: &WindowOptions,
        control: ControlSender,
        events: SurfaceEventSender,
    ) -> Result<()> {
        let mut state = self.state.lock();
        info!(
            "Opening {}x{} window for {}",
            options.width, options.height, options.load
        );

        let _ = events.send(SurfaceEvent::FirstLoadFinished);
        state.open = true;
        state.open_count += 1;
        state.control = Some(control);
        state.events = Some(events);
        Ok(())
    }

    fn push(&mut self, message: HostMessage) {
        debug!("Pushing {} to window", message.channel());
        self.state.lock().pushed.push(message);
    }

    fn open_dev_tools(&mut self) {
        debug!("Opening dev tools");
        self.state.lock().dev_tools = true;
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        if state.open {
            state.open = false;
            if let Some(events) = &state.events {
                let _ = events.send(SurfaceEvent::Closed);
            }
            info!("Window closed");
        }
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }
}

/// Observer for a `HeadlessSurface`
#[derive(Debug, Clone)]
pub struct SurfaceProbe {
    state: Arc<Mutex<HeadlessState>>,
}

impl SurfaceProbe {
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// How many times a window was opened
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    pub fn dev_tools_opened(&self) -> bool {
        self.state.lock().dev_tools
    }

    pub fn pushed(&self) -> Vec<HostMessage> {
        self.state.lock().pushed.clone()
    }

    /// Control capability handed to the frontend, once opened
    pub fn control(&self) -> Option<ControlSender> {
        self.state.lock().control.clone()
    }

    /// Report an event as the host window system would
    pub fn emit(&self, event: SurfaceEvent) -> bool {
        let mut state = self.state.lock();
        if event == SurfaceEvent::Closed {
            state.open = false;
        }
        match &state.events {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Mode, ShellConfig};
    use crate::ipc::control_channel;

    #[test]
    fn test_headless_open_reports_first_load() {
        let config = ShellConfig::for_mode(Mode::Production, "/tmp/project");
        let (control, _control_rx) = control_channel();
        let (events, mut events_rx) = mpsc::unbounded_channel();

        let mut surface = HeadlessSurface::new();
        let probe = surface.probe();
        surface.open(&config.window, control, events).unwrap();

        assert!(surface.is_open());
        assert_eq!(probe.open_count(), 1);
        assert!(probe.control().is_some());
        assert_eq!(events_rx.try_recv().unwrap(), SurfaceEvent::FirstLoadFinished);
    }

    #[test]
    fn test_headless_close_reports_once() {
        let config = ShellConfig::for_mode(Mode::Production, "/tmp/project");
        let (control, _control_rx) = control_channel();
        let (events, mut events_rx) = mpsc::unbounded_channel();

        let mut surface = HeadlessSurface::new();
        surface.open(&config.window, control, events).unwrap();
        let _ = events_rx.try_recv();

        surface.close();
        surface.close();

        assert!(!surface.is_open());
        assert_eq!(events_rx.try_recv().unwrap(), SurfaceEvent::Closed);
        assert!(events_rx.try_recv().is_err());
    }

    #[test]
    fn test_headless_records_pushes() {
        let mut surface = HeadlessSurface::new();
        let probe = surface.probe();

        surface.push(HostMessage::EnableDragRegion);
        surface.open_dev_tools();

        assert_eq!(probe.pushed(), vec![HostMessage::EnableDragRegion]);
        assert!(probe.dev_tools_opened());
        assert_eq!(HostMessage::EnableDragRegion.channel(), "enable-drag-region");
    }
}
