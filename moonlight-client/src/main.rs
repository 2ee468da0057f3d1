use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;
use futures::{SinkExt, StreamExt};
use moonlight_client::{
    config::{
        SavedClientConfig, lamp_url, load_saved_config, save_saved_config, validate_saved_config,
    },
    input::{HELP_TEXT, UserAction, read_user_input},
    ui::TerminalUi,
};
use moonlight_core::{
    Color, Command, DEVICE_PORT, DeviceMessage, NoticeKind, SUBPROTOCOL, Session, UiSync,
    encode_frame,
};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message, client::IntoClientRequest, handshake::client::Request, http::HeaderValue,
    },
};
use tracing::{error, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = futures::stream::SplitSink<WsStream, Message>;

const MAX_CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(12);
const BACKOFF_BASE_MS: u64 = 200;
const FIRST_REPORT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "moonctl")]
struct ClientArgs {
    /// Lamp hostname or IP address. Remembered for later runs.
    host: Option<String>,

    #[arg(long, default_value_t = DEVICE_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = ClientArgs::parse();
    let cfg = match resolve_config(&args) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("config resolution failed: {}", err);
            std::process::exit(2);
        }
    };

    let url = match lamp_url(&cfg) {
        Ok(url) => url,
        Err(err) => {
            error!("{}", err);
            std::process::exit(2);
        }
    };

    if let Err(err) = run_session(url).await {
        error!("session failed: {}", err);
        std::process::exit(1);
    }
}

fn resolve_config(args: &ClientArgs) -> Result<SavedClientConfig, String> {
    if let Some(host) = args.host.as_deref() {
        let cfg = SavedClientConfig {
            host: host.to_owned(),
            port: args.port,
        };
        validate_saved_config(&cfg)?;
        if let Err(err) = save_saved_config(&cfg) {
            warn!("could not remember lamp address: {}", err);
        }
        return Ok(cfg);
    }

    match load_saved_config()? {
        Some(cfg) => Ok(cfg),
        None => Err("no lamp host configured; run 'moonctl <host>' once".to_owned()),
    }
}

async fn run_session(url: Url) -> Result<(), String> {
    let mut session = Session::new();
    let mut ui = TerminalUi::new();

    session.begin_connect();
    println!("connecting to {url} ...");

    let ws_stream = connect_with_retry(&url).await?;
    info!("connected");

    let (write_half, mut ws_read) = ws_stream.split();
    let (command_tx, command_rx) = mpsc::unbounded_channel::<Command>();
    let send_task = tokio::spawn(command_send_task(write_half, command_rx));

    for command in session.connection_opened(now_unix_ms()) {
        command_tx
            .send(command)
            .map_err(|_| "command channel closed".to_owned())?;
    }

    // The initial color request completes when the first ColorReport
    // arrives; the waiter suspends on this channel, it never polls.
    let (first_report_tx, first_report_rx) = oneshot::channel::<Color>();
    let mut first_report_tx = Some(first_report_tx);
    tokio::spawn(async move {
        match timeout(FIRST_REPORT_TIMEOUT, first_report_rx).await {
            Ok(Ok(color)) => info!(color = %color, "lamp reported its saved state"),
            _ => warn!("no color report from the lamp yet"),
        }
    });

    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<UserAction>();
    let stdin_task = tokio::spawn(read_user_input(action_tx));

    println!("{HELP_TEXT}");

    loop {
        tokio::select! {
            next = ws_read.next() => match next {
                Some(Ok(Message::Text(text))) => {
                    match session.handle_frame(text.as_str(), &mut ui) {
                        DeviceMessage::ColorReport(color) => {
                            if let Some(tx) = first_report_tx.take() {
                                let _ = tx.send(color);
                            }
                        }
                        DeviceMessage::Unknown(raw) => {
                            warn!("unrecognized frame from lamp: {:?}", raw);
                        }
                        DeviceMessage::ModeReport(_) | DeviceMessage::SaveAck(_) => {}
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    session.close(&mut ui);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    error!("websocket error: {}", err);
                    session.close(&mut ui);
                    break;
                }
            },
            action = action_rx.recv() => match action {
                Some(UserAction::SetColor(color)) => {
                    if ui.color_control_enabled() {
                        let command = session.confirm_color(color, &mut ui);
                        if command_tx.send(command).is_err() {
                            break;
                        }
                    } else {
                        ui.notify(
                            "color input is disabled while rainbow mode is active",
                            NoticeKind::Error,
                        );
                    }
                }
                Some(UserAction::ToggleRainbow) => {
                    let command = session.toggle_rainbow();
                    if command_tx.send(command).is_err() {
                        break;
                    }
                }
                Some(UserAction::Save) => {
                    if ui.save_enabled() {
                        let command = session.request_save();
                        if command_tx.send(command).is_err() {
                            break;
                        }
                    } else {
                        ui.notify(
                            "nothing to save; settings already match the lamp",
                            NoticeKind::Info,
                        );
                    }
                }
                Some(UserAction::Status) => {
                    println!(
                        "status: {} | color {} | mode {} | {}",
                        session.status(),
                        session.color(),
                        session.mode(),
                        if session.is_dirty() {
                            "unsaved changes"
                        } else {
                            "saved"
                        }
                    );
                }
                Some(UserAction::Help) => println!("{HELP_TEXT}"),
                Some(UserAction::Quit) | None => {
                    // Close the session first so the transport's own close
                    // event cannot notify a second time.
                    session.close(&mut ui);
                    break;
                }
            },
        }
    }

    stdin_task.abort();
    drop(command_tx);
    let _ = send_task.await;
    Ok(())
}

async fn connect_with_retry(url: &Url) -> Result<WsStream, String> {
    let mut attempt: u32 = 1;
    loop {
        info!(
            attempt,
            max_attempts = MAX_CONNECT_ATTEMPTS,
            url = %url,
            "connecting"
        );

        let request = lamp_request(url)?;
        match timeout(CONNECT_TIMEOUT, connect_async(request)).await {
            Ok(Ok((ws_stream, _response))) => return Ok(ws_stream),
            Ok(Err(err)) => {
                let msg = format!("connect failed: {err}");
                error!(attempt, url = %url, "{msg}");
                if attempt >= MAX_CONNECT_ATTEMPTS {
                    return Err(msg);
                }
            }
            Err(_) => {
                let msg = format!("connect timed out after {CONNECT_TIMEOUT:?}");
                error!(attempt, url = %url, "{msg}");
                if attempt >= MAX_CONNECT_ATTEMPTS {
                    return Err(msg);
                }
            }
        }

        let backoff_ms = BACKOFF_BASE_MS.saturating_mul(1_u64 << (attempt - 1));
        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        attempt += 1;
    }
}

fn lamp_request(url: &Url) -> Result<Request, String> {
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|err| format!("invalid websocket url: {err}"))?;
    request.headers_mut().insert(
        "Sec-WebSocket-Protocol",
        HeaderValue::from_static(SUBPROTOCOL),
    );
    Ok(request)
}

async fn command_send_task(mut ws_write: WsWrite, mut command_rx: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = command_rx.recv().await {
        let frame = encode_frame(&command);
        if ws_write.send(Message::Text(frame.into())).await.is_err() {
            break;
        }
    }
    let _ = ws_write.close().await;
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
