use std::path::PathBuf;

use clap::Parser;
use moonlight_lampd::{AppState, serve};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "moonlight-lampd")]
struct LampArgs {
    /// Address the emulated lamp listens on. The real appliance serves
    /// its WebSocket on port 81.
    #[arg(long, default_value = "0.0.0.0:81")]
    bind_address: String,

    /// Where to persist saved color settings (EEPROM stand-in).
    #[arg(long, default_value = "moonlight-prefs.json")]
    prefs_path: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = LampArgs::parse();
    let listener = match tokio::net::TcpListener::bind(&args.bind_address).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {}: {}", args.bind_address, err);
            std::process::exit(1);
        }
    };

    info!("lamp emulator starting on {}", args.bind_address);
    if let Err(err) = serve(listener, AppState::new(args.prefs_path)).await {
        warn!("lamp emulator exited: {}", err);
    }
}
