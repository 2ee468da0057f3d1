use std::fs;
use std::io;
use std::path::Path;

use moonlight_core::{Color, Mode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// The lamp's persisted configuration. The real appliance keeps this in
/// EEPROM; the emulator keeps it in a small JSON file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LampPrefs {
    pub color: Color,
    pub mode: Mode,
}

impl Default for LampPrefs {
    fn default() -> Self {
        Self {
            color: Color::rgb(0xff, 0xff, 0xff),
            mode: Mode::Static,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PrefsFile {
    color: String,
    rainbow: bool,
}

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("serialize failed: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("tmp write failed: {0}")]
    WriteTmp(#[source] io::Error),
    #[error("rename failed: {0}")]
    Rename(#[source] io::Error),
}

/// Load persisted preferences, falling back to defaults when the file is
/// missing or unreadable, the way the firmware falls back when its EEPROM
/// check bytes are absent.
pub fn load_prefs(path: &Path) -> LampPrefs {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                warn!("failed to read prefs file {}: {}", path.display(), err);
            }
            return LampPrefs::default();
        }
    };

    let file: PrefsFile = match serde_json::from_str(&data) {
        Ok(file) => file,
        Err(err) => {
            warn!("invalid prefs file {}: {}", path.display(), err);
            return LampPrefs::default();
        }
    };

    let color = match Color::parse(&file.color) {
        Ok(color) => color,
        Err(err) => {
            warn!("invalid stored color in {}: {}", path.display(), err);
            return LampPrefs::default();
        }
    };

    LampPrefs {
        color,
        mode: if file.rainbow {
            Mode::Rainbow
        } else {
            Mode::Static
        },
    }
}

/// Persist preferences atomically: write a tmp file, then rename over the
/// target.
pub fn save_prefs(path: &Path, prefs: &LampPrefs) -> Result<(), PrefsError> {
    let file = PrefsFile {
        color: prefs.color.to_string(),
        rainbow: prefs.mode == Mode::Rainbow,
    };
    let payload = serde_json::to_string_pretty(&file).map_err(PrefsError::Serialize)?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, payload.as_bytes()).map_err(PrefsError::WriteTmp)?;
    fs::rename(&tmp, path).map_err(PrefsError::Rename)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let prefs = load_prefs(&dir.path().join("absent.json"));
        assert_eq!(prefs, LampPrefs::default());
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let path = dir.path().join("prefs.json");
        fs::write(&path, b"{not json").expect("write corrupt prefs");
        assert_eq!(load_prefs(&path), LampPrefs::default());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let path = dir.path().join("prefs.json");
        let prefs = LampPrefs {
            color: Color::rgb(0x12, 0x34, 0x56),
            mode: Mode::Rainbow,
        };

        save_prefs(&path, &prefs).expect("save prefs");
        assert_eq!(load_prefs(&path), prefs);
    }
}
