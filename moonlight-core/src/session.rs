use crate::{Color, Command, DeviceMessage, DirtyTracker, Mode, decode_frame};

/// Phase of the control session. `Closed` is terminal; reconnection, if a
/// caller wants it, is a policy layered on top with a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Open,
    Closed,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Open => write!(f, "open"),
            ConnectionStatus::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

/// What the session needs from whatever renders it. The client ships a
/// terminal implementation; tests record the calls.
pub trait UiSync {
    fn apply_color(&mut self, color: Color);
    fn apply_mode(&mut self, mode: Mode);
    fn set_save_enabled(&mut self, enabled: bool);
    fn set_color_control_enabled(&mut self, enabled: bool);
    fn notify(&mut self, message: &str, kind: NoticeKind);
}

/// The control session: current color and mode, connection phase, the
/// dirty tracker, and the `(color, mode)` pair captured when a save was
/// requested.
///
/// Owned by a single event loop; every handler runs to completion before
/// the next inbound frame or user action is applied, so there is no
/// interior locking.
#[derive(Debug)]
pub struct Session {
    color: Color,
    mode: Mode,
    status: ConnectionStatus,
    tracker: DirtyTracker,
    pending_save: Option<(Color, Mode)>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            color: Color::rgb(0, 0, 0),
            mode: Mode::Static,
            status: ConnectionStatus::Disconnected,
            tracker: DirtyTracker::new(),
            pending_save: None,
        }
    }

    #[must_use]
    pub fn color(&self) -> Color {
        self.color
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.tracker.evaluate(self.color, self.mode)
    }

    /// Whether the first post-connect report has arrived and seeded the
    /// saved-state baseline.
    #[must_use]
    pub fn baseline_established(&self) -> bool {
        self.tracker.is_initialized()
    }

    pub fn begin_connect(&mut self) {
        self.status = ConnectionStatus::Connecting;
    }

    /// The transport reports an open channel: announce ourselves and ask
    /// for the current color. The answer arrives as a regular
    /// `ColorReport`; callers waiting on it should suspend on that event,
    /// never poll.
    #[must_use]
    pub fn connection_opened(&mut self, now_unix_ms: u64) -> Vec<Command> {
        self.status = ConnectionStatus::Open;
        vec![Command::Connect(now_unix_ms), Command::RequestColor]
    }

    /// Decode one inbound frame and apply it. Returns the decoded message
    /// so the caller can log `Unknown` frames and resolve any
    /// first-report waiter.
    pub fn handle_frame(&mut self, frame: &str, ui: &mut dyn UiSync) -> DeviceMessage {
        let message = decode_frame(frame);
        self.apply_message(&message, ui);
        message
    }

    pub fn apply_message(&mut self, message: &DeviceMessage, ui: &mut dyn UiSync) {
        match message {
            DeviceMessage::ColorReport(color) => {
                self.color = *color;
                self.tracker.initialize(self.color, self.mode);
                ui.apply_color(self.color);
                ui.set_save_enabled(self.is_dirty());
            }
            DeviceMessage::ModeReport(mode) => {
                self.mode = *mode;
                self.tracker.initialize(self.color, self.mode);
                ui.apply_mode(self.mode);
                ui.set_color_control_enabled(self.mode == Mode::Static);
                ui.set_save_enabled(self.is_dirty());
            }
            DeviceMessage::SaveAck(success) => {
                // The ack settles whatever request was in flight. A stray
                // ack with nothing pending is treated as confirming the
                // current state.
                let (color, mode) = self.pending_save.take().unwrap_or((self.color, self.mode));
                self.tracker.confirm_save(color, mode, *success);
                if *success {
                    ui.notify(
                        "color settings saved; the lamp will restore them on next power-up",
                        NoticeKind::Info,
                    );
                } else {
                    ui.notify("the lamp failed to save the settings", NoticeKind::Error);
                }
                ui.set_save_enabled(self.is_dirty());
            }
            DeviceMessage::Unknown(_) => {}
        }
    }

    /// Live color input (e.g. while a picker is dragged): update
    /// optimistically for immediate feedback instead of waiting for the
    /// device's echoed report.
    #[must_use]
    pub fn pick_color(&mut self, color: Color, ui: &mut dyn UiSync) -> Command {
        self.color = color;
        ui.apply_color(self.color);
        ui.set_save_enabled(self.is_dirty());
        Command::SetColor(color)
    }

    /// The picker was released on a final value. Same state change as
    /// [`Session::pick_color`]; adapters may attach confirm-only styling.
    #[must_use]
    pub fn confirm_color(&mut self, color: Color, ui: &mut dyn UiSync) -> Command {
        self.pick_color(color, ui)
    }

    /// Flip the mode and tell the device; the echoed `ModeReport` drives
    /// the UI updates.
    #[must_use]
    pub fn toggle_rainbow(&mut self) -> Command {
        self.mode = self.mode.toggled();
        Command::ToggleMode(self.mode)
    }

    /// Ask the device to persist the current color. The marker is not
    /// updated optimistically; only a `SaveAck` moves it.
    #[must_use]
    pub fn request_save(&mut self) -> Command {
        self.pending_save = Some((self.color, self.mode));
        Command::RequestSave(self.color)
    }

    /// Close the session. Idempotent: only the first transition to
    /// `Closed` notifies, so a user-initiated close followed by the
    /// transport's own close event produces a single notification.
    pub fn close(&mut self, ui: &mut dyn UiSync) {
        if self.status == ConnectionStatus::Closed {
            return;
        }
        self.status = ConnectionStatus::Closed;
        ui.notify("connection to the lamp closed", NoticeKind::Info);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
