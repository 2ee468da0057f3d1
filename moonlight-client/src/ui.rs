use moonlight_core::{Color, Mode, NoticeKind, UiSync};

/// Terminal rendering of the session state. Affordance toggles only print
/// on a transition so repeated reports stay quiet.
#[derive(Debug)]
pub struct TerminalUi {
    save_enabled: bool,
    color_control_enabled: bool,
}

impl TerminalUi {
    #[must_use]
    pub fn new() -> Self {
        Self {
            save_enabled: false,
            color_control_enabled: true,
        }
    }

    /// Whether the Save affordance is currently enabled.
    #[must_use]
    pub fn save_enabled(&self) -> bool {
        self.save_enabled
    }

    /// Whether color input is currently accepted (disabled while the lamp
    /// cycles in rainbow mode).
    #[must_use]
    pub fn color_control_enabled(&self) -> bool {
        self.color_control_enabled
    }
}

impl Default for TerminalUi {
    fn default() -> Self {
        Self::new()
    }
}

impl UiSync for TerminalUi {
    fn apply_color(&mut self, color: Color) {
        println!("lamp color: {color}");
    }

    fn apply_mode(&mut self, mode: Mode) {
        println!("lamp mode: {mode}");
    }

    fn set_save_enabled(&mut self, enabled: bool) {
        if self.save_enabled != enabled {
            self.save_enabled = enabled;
            if enabled {
                println!("unsaved changes; 'save' will persist them on the lamp");
            } else {
                println!("settings match the lamp's saved configuration");
            }
        }
    }

    fn set_color_control_enabled(&mut self, enabled: bool) {
        if self.color_control_enabled != enabled {
            self.color_control_enabled = enabled;
            if enabled {
                println!("color input enabled");
            } else {
                println!("color input disabled while rainbow mode is active");
            }
        }
    }

    fn notify(&mut self, message: &str, kind: NoticeKind) {
        match kind {
            NoticeKind::Info => println!("* {message}"),
            NoticeKind::Error => eprintln!("! {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affordance_flags_track_the_last_sync() {
        let mut ui = TerminalUi::new();
        assert!(!ui.save_enabled());
        assert!(ui.color_control_enabled());

        ui.set_save_enabled(true);
        ui.set_color_control_enabled(false);
        assert!(ui.save_enabled());
        assert!(!ui.color_control_enabled());

        // Repeated syncs with the same value are harmless.
        ui.set_save_enabled(true);
        assert!(ui.save_enabled());
    }
}
