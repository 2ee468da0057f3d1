use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub mod session;

pub use session::{ConnectionStatus, NoticeKind, Session, UiSync};

/// WebSocket subprotocol announced by the lamp firmware.
pub const SUBPROTOCOL: &str = "arduino";
/// Fixed port the lamp's WebSocket server listens on.
pub const DEVICE_PORT: u16 = 81;
/// Length of a color frame: `#` plus six hex digits.
pub const COLOR_FRAME_LEN: usize = 7;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("color must be '#' followed by 6 hex digits, got {0:?}")]
    InvalidColor(String),
}

/// An RGB color as reported by and sent to the lamp.
///
/// Canonical text form is `#rrggbb`, lowercase. Parsing accepts either
/// case; equality is on the byte triple so case never leaks into
/// comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let digits = text
            .strip_prefix('#')
            .ok_or_else(|| CoreError::InvalidColor(text.to_owned()))?;
        if digits.len() != COLOR_FRAME_LEN - 1 {
            return Err(CoreError::InvalidColor(text.to_owned()));
        }

        let mut bytes = [0_u8; 3];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|_| CoreError::InvalidColor(text.to_owned()))?;
        Ok(Self {
            r: bytes[0],
            g: bytes[1],
            b: bytes[2],
        })
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Display mode of the lamp. Rainbow cycles colors on-device and is
/// mutually exclusive with a fixed static color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Static,
    Rainbow,
}

impl Mode {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Mode::Static => Mode::Rainbow,
            Mode::Rainbow => Mode::Static,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Static => write!(f, "static"),
            Mode::Rainbow => write!(f, "rainbow"),
        }
    }
}

/// One inbound frame, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMessage {
    ColorReport(Color),
    ModeReport(Mode),
    SaveAck(bool),
    Unknown(String),
}

/// One outbound frame, pre-encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Session handshake announcement; the payload is a unix-ms timestamp
    /// the device logs but never parses.
    Connect(u64),
    RequestColor,
    SetColor(Color),
    ToggleMode(Mode),
    RequestSave(Color),
}

/// Decode an inbound frame by its leading byte(s).
///
/// Total: anything unrecognized becomes `Unknown` for the caller to log,
/// never an error. Keeps the client forward-compatible with frames a newer
/// firmware might emit.
#[must_use]
pub fn decode_frame(frame: &str) -> DeviceMessage {
    if frame.starts_with('#') {
        return match Color::parse(frame) {
            Ok(color) => DeviceMessage::ColorReport(color),
            Err(_) => DeviceMessage::Unknown(frame.to_owned()),
        };
    }

    match frame.as_bytes().first() {
        Some(b'R') => DeviceMessage::ModeReport(Mode::Rainbow),
        Some(b'N') => DeviceMessage::ModeReport(Mode::Static),
        Some(b'S') => DeviceMessage::SaveAck(frame.as_bytes().get(1) == Some(&b'y')),
        _ => DeviceMessage::Unknown(frame.to_owned()),
    }
}

/// Encode an outbound command to its wire frame.
#[must_use]
pub fn encode_frame(command: &Command) -> String {
    match command {
        Command::Connect(timestamp_ms) => format!("Connect {timestamp_ms}"),
        Command::RequestColor => "C".to_owned(),
        Command::SetColor(color) => color.to_string(),
        Command::ToggleMode(Mode::Rainbow) => "R".to_owned(),
        Command::ToggleMode(Mode::Static) => "N".to_owned(),
        Command::RequestSave(color) => format!("S{color}"),
    }
}

/// The last configuration the device confirmed persisted, or `Unset`
/// before the first post-connect report arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMarker {
    #[default]
    Unset,
    Saved { color: Color, mode: Mode },
}

/// Decides whether the Save affordance should be enabled: whether the
/// current state differs from the last device-confirmed saved state.
#[derive(Debug, Default)]
pub struct DirtyTracker {
    marker: SaveMarker,
}

impl DirtyTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn marker(&self) -> SaveMarker {
        self.marker
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.marker != SaveMarker::Unset
    }

    /// Adopt the first post-connect report as the already-saved baseline.
    ///
    /// The device reports its persisted state immediately after connect,
    /// so the first report is assumed saved rather than prompting the user
    /// to re-save it. A second call while initialized is a no-op.
    pub fn initialize(&mut self, color: Color, mode: Mode) {
        if self.marker == SaveMarker::Unset {
            self.marker = SaveMarker::Saved { color, mode };
        }
    }

    /// Dirty iff either field differs from the marker. With no baseline
    /// yet, nothing counts as dirty and Save stays disabled.
    #[must_use]
    pub fn evaluate(&self, color: Color, mode: Mode) -> bool {
        match self.marker {
            SaveMarker::Unset => false,
            SaveMarker::Saved {
                color: saved_color,
                mode: saved_mode,
            } => color != saved_color || mode != saved_mode,
        }
    }

    /// Apply a save acknowledgement for the *requested* `(color, mode)`
    /// pair. The user may have kept changing the color while the save was
    /// in flight; the ack confirms what was requested was stored, so the
    /// marker takes the requested pair, not the current state. On failure
    /// the marker is untouched.
    pub fn confirm_save(&mut self, color: Color, mode: Mode, success: bool) {
        if success {
            self.marker = SaveMarker::Saved { color, mode };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_parse_normalizes_case() {
        let upper = Color::parse("#1A2B3C").expect("parse uppercase");
        let lower = Color::parse("#1a2b3c").expect("parse lowercase");
        assert_eq!(upper, lower);
        assert_eq!(upper.to_string(), "#1a2b3c");
    }

    #[test]
    fn color_parse_rejects_malformed_input() {
        for bad in ["1a2b3c", "#1a2b3", "#1a2b3cd", "#XYZZZZ", "", "#"] {
            assert!(Color::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn decode_color_report_is_case_normalized() {
        assert_eq!(
            decode_frame("#1A2B3C"),
            DeviceMessage::ColorReport(Color::rgb(0x1a, 0x2b, 0x3c))
        );
    }

    #[test]
    fn decode_malformed_color_is_unknown() {
        assert_eq!(
            decode_frame("#XYZZZZ"),
            DeviceMessage::Unknown("#XYZZZZ".to_owned())
        );
        assert_eq!(
            decode_frame("#ff00"),
            DeviceMessage::Unknown("#ff00".to_owned())
        );
    }

    #[test]
    fn decode_mode_reports() {
        assert_eq!(decode_frame("R"), DeviceMessage::ModeReport(Mode::Rainbow));
        assert_eq!(decode_frame("N"), DeviceMessage::ModeReport(Mode::Static));
    }

    #[test]
    fn decode_save_acks() {
        assert_eq!(decode_frame("Sy"), DeviceMessage::SaveAck(true));
        assert_eq!(decode_frame("Sn"), DeviceMessage::SaveAck(false));
        // Bare "S" counts as a failed save, same as any non-'y' suffix.
        assert_eq!(decode_frame("S"), DeviceMessage::SaveAck(false));
    }

    #[test]
    fn decode_unrecognized_is_unknown() {
        assert_eq!(
            decode_frame("hello"),
            DeviceMessage::Unknown("hello".to_owned())
        );
        assert_eq!(decode_frame(""), DeviceMessage::Unknown(String::new()));
    }

    #[test]
    fn encode_all_commands() {
        assert_eq!(encode_frame(&Command::Connect(1_735_000_000_000)), "Connect 1735000000000");
        assert_eq!(encode_frame(&Command::RequestColor), "C");
        assert_eq!(
            encode_frame(&Command::SetColor(Color::rgb(0xff, 0x00, 0xaa))),
            "#ff00aa"
        );
        assert_eq!(encode_frame(&Command::ToggleMode(Mode::Rainbow)), "R");
        assert_eq!(encode_frame(&Command::ToggleMode(Mode::Static)), "N");
        assert_eq!(
            encode_frame(&Command::RequestSave(Color::rgb(0x00, 0xff, 0x00))),
            "S#00ff00"
        );
    }

    #[test]
    fn tracker_baseline_is_clean_then_diverges() {
        let c1 = Color::rgb(0xff, 0x00, 0x00);
        let c2 = Color::rgb(0x00, 0xff, 0x00);

        let mut tracker = DirtyTracker::new();
        tracker.initialize(c1, Mode::Static);
        assert!(!tracker.evaluate(c1, Mode::Static));
        assert!(tracker.evaluate(c2, Mode::Static));
        assert!(tracker.evaluate(c1, Mode::Rainbow));
    }

    #[test]
    fn tracker_without_baseline_is_never_dirty() {
        let tracker = DirtyTracker::new();
        assert!(!tracker.evaluate(Color::rgb(1, 2, 3), Mode::Rainbow));
    }

    #[test]
    fn tracker_initialize_is_first_writer_wins() {
        let c1 = Color::rgb(0x11, 0x11, 0x11);
        let c2 = Color::rgb(0x22, 0x22, 0x22);

        let mut tracker = DirtyTracker::new();
        tracker.initialize(c1, Mode::Static);
        tracker.initialize(c2, Mode::Rainbow);
        assert_eq!(
            tracker.marker(),
            SaveMarker::Saved {
                color: c1,
                mode: Mode::Static
            }
        );
    }

    #[test]
    fn confirm_save_success_moves_marker_to_requested_pair() {
        let requested = Color::rgb(0x00, 0xff, 0x00);
        let current = Color::rgb(0x00, 0x00, 0xff);

        let mut tracker = DirtyTracker::new();
        tracker.initialize(Color::rgb(0xff, 0x00, 0x00), Mode::Static);
        tracker.confirm_save(requested, Mode::Static, true);

        assert!(!tracker.evaluate(requested, Mode::Static));
        // Current state diverged while the save was in flight: dirty again.
        assert!(tracker.evaluate(current, Mode::Static));
    }

    #[test]
    fn confirm_save_failure_leaves_marker_unchanged() {
        let baseline = Color::rgb(0xff, 0x00, 0x00);

        let mut tracker = DirtyTracker::new();
        tracker.initialize(baseline, Mode::Static);
        tracker.confirm_save(Color::rgb(0x00, 0xff, 0x00), Mode::Rainbow, false);

        assert_eq!(
            tracker.marker(),
            SaveMarker::Saved {
                color: baseline,
                mode: Mode::Static
            }
        );
    }
}
