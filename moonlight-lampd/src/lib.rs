use std::{collections::HashMap, path::PathBuf, sync::Arc};

use axum::{
    Router,
    extract::{State, WebSocketUpgrade, ws::Message},
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use moonlight_core::{Color, Mode, SUBPROTOCOL};
use tokio::{
    net::TcpListener,
    sync::{RwLock, mpsc},
};
use tracing::{info, warn};

pub mod prefs;

use prefs::{LampPrefs, load_prefs, save_prefs};

type ClientId = u64;

/// In-memory lamp: live color/mode plus the client connections to report
/// state changes to. The persisted configuration lives in the prefs file.
#[derive(Debug)]
struct LampState {
    color: Color,
    mode: Mode,
    clients: HashMap<ClientId, mpsc::UnboundedSender<Message>>,
    next_client_id: ClientId,
}

#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<RwLock<LampState>>,
    prefs_path: PathBuf,
}

impl AppState {
    /// Boot the lamp: restore the persisted configuration (or defaults)
    /// as the live state.
    #[must_use]
    pub fn new(prefs_path: PathBuf) -> Self {
        let restored = load_prefs(&prefs_path);
        info!(
            color = %restored.color,
            mode = %restored.mode,
            "lamp state restored"
        );
        Self {
            inner: Arc::new(RwLock::new(LampState {
                color: restored.color,
                mode: restored.mode,
                clients: HashMap::new(),
                next_client_id: 0,
            })),
            prefs_path,
        }
    }
}

/// One client-to-lamp frame, as the firmware interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ClientFrame {
    Connect,
    RequestColor,
    SetColor(Color),
    SetMode(Mode),
    Save(Option<Color>),
    Unknown,
}

fn parse_client_frame(frame: &str) -> ClientFrame {
    if frame.starts_with("Connect") {
        return ClientFrame::Connect;
    }
    if frame == "C" {
        return ClientFrame::RequestColor;
    }
    if frame.starts_with('#') {
        return match Color::parse(frame) {
            Ok(color) => ClientFrame::SetColor(color),
            Err(_) => ClientFrame::Unknown,
        };
    }
    match frame.as_bytes().first() {
        Some(b'R') => ClientFrame::SetMode(Mode::Rainbow),
        Some(b'N') => ClientFrame::SetMode(Mode::Static),
        Some(b'S') => ClientFrame::Save(Color::parse(&frame[1..]).ok()),
        _ => ClientFrame::Unknown,
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(state)
}

pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), String> {
    info!(
        "lamp emulator listening on {}",
        listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_owned())
    );
    axum::serve(listener, build_router(state))
        .await
        .map_err(|err| err.to_string())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.protocols([SUBPROTOCOL])
        .on_upgrade(move |socket| async move {
            if let Err(err) = handle_socket(state, socket).await {
                warn!("client session ended with error: {}", err);
            }
        })
}

async fn handle_socket(
    state: AppState,
    socket: axum::extract::ws::WebSocket,
) -> Result<(), String> {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let send_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if ws_sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let client_id = register_client(&state, outbound_tx.clone()).await;
    info!("client {} connected", client_id);

    // The lamp announces its current state as soon as a client connects;
    // the control client treats this first report as the saved baseline.
    report_state(&state, &outbound_tx).await;

    while let Some(next_message) = ws_receiver.next().await {
        let message = match next_message {
            Ok(message) => message,
            Err(err) => {
                warn!("websocket receive error: {}", err);
                break;
            }
        };

        match message {
            Message::Text(text) => {
                handle_frame(&state, client_id, &outbound_tx, text.as_str()).await;
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }

    unregister_client(&state, client_id).await;
    send_task.abort();
    info!("client {} disconnected", client_id);
    Ok(())
}

async fn handle_frame(
    state: &AppState,
    client_id: ClientId,
    reply_tx: &mpsc::UnboundedSender<Message>,
    frame: &str,
) {
    match parse_client_frame(frame) {
        ClientFrame::Connect => {
            info!("client {} handshake: {}", client_id, frame);
        }
        ClientFrame::RequestColor => {
            report_state(state, reply_tx).await;
        }
        ClientFrame::SetColor(color) => {
            let frame = {
                let mut lamp = state.inner.write().await;
                lamp.color = color;
                lamp.color.to_string()
            };
            broadcast(state, frame).await;
        }
        ClientFrame::SetMode(mode) => {
            let frame = {
                let mut lamp = state.inner.write().await;
                lamp.mode = mode;
                mode_frame(lamp.mode)
            };
            broadcast(state, frame).await;
        }
        ClientFrame::Save(Some(color)) => {
            let prefs = {
                let lamp = state.inner.read().await;
                LampPrefs {
                    color,
                    mode: lamp.mode,
                }
            };
            let reply = match save_prefs(&state.prefs_path, &prefs) {
                Ok(()) => {
                    info!(color = %prefs.color, mode = %prefs.mode, "preferences saved");
                    "Sy"
                }
                Err(err) => {
                    warn!("failed to save preferences: {}", err);
                    "Sn"
                }
            };
            let _ = reply_tx.send(Message::Text(reply.into()));
        }
        ClientFrame::Save(None) => {
            warn!("client {} sent malformed save payload: {}", client_id, frame);
            let _ = reply_tx.send(Message::Text("Sn".into()));
        }
        ClientFrame::Unknown => {
            warn!("client {} sent unrecognized frame: {}", client_id, frame);
        }
    }
}

fn mode_frame(mode: Mode) -> String {
    match mode {
        Mode::Rainbow => "R".to_owned(),
        Mode::Static => "N".to_owned(),
    }
}

/// Send the current color and mode to one client.
async fn report_state(state: &AppState, tx: &mpsc::UnboundedSender<Message>) {
    let (color_frame, mode_frame) = {
        let lamp = state.inner.read().await;
        (lamp.color.to_string(), mode_frame(lamp.mode))
    };
    let _ = tx.send(Message::Text(color_frame.into()));
    let _ = tx.send(Message::Text(mode_frame.into()));
}

async fn broadcast(state: &AppState, frame: String) {
    let recipients = {
        let lamp = state.inner.read().await;
        lamp.clients.values().cloned().collect::<Vec<_>>()
    };
    for tx in recipients {
        let _ = tx.send(Message::Text(frame.clone().into()));
    }
}

async fn register_client(state: &AppState, tx: mpsc::UnboundedSender<Message>) -> ClientId {
    let mut lamp = state.inner.write().await;
    let client_id = lamp.next_client_id;
    lamp.next_client_id += 1;
    lamp.clients.insert(client_id, tx);
    client_id
}

async fn unregister_client(state: &AppState, client_id: ClientId) {
    let mut lamp = state.inner.write().await;
    lamp.clients.remove(&client_id);
}
