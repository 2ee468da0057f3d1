use moonlight_core::Color;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::warn;

/// One parsed line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    SetColor(Color),
    ToggleRainbow,
    Save,
    Status,
    Help,
    Quit,
}

pub const HELP_TEXT: &str = "\
commands:
  color <#rrggbb>   set the lamp color (a bare #rrggbb also works)
  rainbow           toggle color-cycling mode
  save              persist the current color settings on the lamp
  status            show session state
  help              show this help
  quit              close the session and exit";

/// Parse one input line. Blank lines parse to `Ok(None)`.
pub fn parse_action(line: &str) -> Result<Option<UserAction>, String> {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Ok(None);
    };

    let action = match word {
        "color" => {
            let Some(value) = parts.next() else {
                return Err("usage: color <#rrggbb>".to_owned());
            };
            UserAction::SetColor(parse_color_arg(value)?)
        }
        value if value.starts_with('#') => UserAction::SetColor(parse_color_arg(value)?),
        "rainbow" => UserAction::ToggleRainbow,
        "save" => UserAction::Save,
        "status" => UserAction::Status,
        "help" => UserAction::Help,
        "quit" | "exit" => UserAction::Quit,
        other => return Err(format!("unknown command {other:?}; try 'help'")),
    };

    if parts.next().is_some() {
        return Err(format!("too many arguments for {word:?}"));
    }
    Ok(Some(action))
}

/// Read stdin line by line and forward parsed actions to the event loop.
/// Ends on EOF (forwarded as `Quit`), an explicit `quit`, or a closed
/// receiver.
pub async fn read_user_input(action_tx: mpsc::UnboundedSender<UserAction>) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_action(&line) {
                Ok(Some(action)) => {
                    let quit = action == UserAction::Quit;
                    if action_tx.send(action).is_err() || quit {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => eprintln!("! {err}"),
            },
            Ok(None) => {
                let _ = action_tx.send(UserAction::Quit);
                break;
            }
            Err(err) => {
                warn!("stdin read failed: {}", err);
                let _ = action_tx.send(UserAction::Quit);
                break;
            }
        }
    }
}

fn parse_color_arg(value: &str) -> Result<Color, String> {
    // Be forgiving about the leading '#': "ff00aa" means "#ff00aa".
    let canonical;
    let text = if value.starts_with('#') {
        value
    } else {
        canonical = format!("#{value}");
        &canonical
    };
    Color::parse(text).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_parse_to_nothing() {
        assert_eq!(parse_action(""), Ok(None));
        assert_eq!(parse_action("   "), Ok(None));
    }

    #[test]
    fn color_command_accepts_hash_and_bare_forms() {
        let expected = Some(UserAction::SetColor(Color::rgb(0xff, 0x00, 0xaa)));
        assert_eq!(parse_action("color #ff00aa"), Ok(expected.clone()));
        assert_eq!(parse_action("color FF00AA"), Ok(expected.clone()));
        assert_eq!(parse_action("#ff00aa"), Ok(expected));
    }

    #[test]
    fn color_command_rejects_bad_input() {
        assert!(parse_action("color").is_err());
        assert!(parse_action("color #ggxxyy").is_err());
        assert!(parse_action("color #ff00aa extra").is_err());
    }

    #[test]
    fn simple_commands_parse() {
        assert_eq!(parse_action("rainbow"), Ok(Some(UserAction::ToggleRainbow)));
        assert_eq!(parse_action("save"), Ok(Some(UserAction::Save)));
        assert_eq!(parse_action("status"), Ok(Some(UserAction::Status)));
        assert_eq!(parse_action("help"), Ok(Some(UserAction::Help)));
        assert_eq!(parse_action("quit"), Ok(Some(UserAction::Quit)));
        assert_eq!(parse_action("exit"), Ok(Some(UserAction::Quit)));
    }

    #[test]
    fn unknown_commands_are_rejected() {
        assert!(parse_action("sparkle").is_err());
    }
}
