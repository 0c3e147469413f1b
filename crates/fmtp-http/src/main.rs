//! FMTP HTTP server crate.
//!
//! This crate runs one FMTP channel from a JSON settings file and provides an
//! HTTP API to observe it and to send data and control commands to it.
//!
//! Usage: `fmtp-http <settings.json> [listen address]`, the HTTP listener
//! defaults to `127.0.0.1:8000`.
//!
//! # HTTP API Routes
//!
//! ## Channel State
//! `GET /`
//!
//! Returns the current channel state record as JSON.
//!
//! ## Send Data
//! `POST /`
//!
//! Sends operational data over the channel. The request body contains the
//! text to be sent, decoded as UTF-8.
//!
//! ## Start Association
//! `POST /associate`
//!
//! Initiates an FMTP association (MT-ASSOC service primitive).
//!
//! ## Stop Association
//! `POST /shutdown`
//!
//! Stops the FMTP association without closing the underlying connection (MT-STOP service primitive).
//!
//! ## Disconnect
//! `POST /disconnect`
//!
//! Stops the FMTP association and closes the underlying connection (MT-DIS service primitive).
//!
//! ## Disable / Enable
//! `POST /disable`, `POST /enable`
//!
//! Takes the channel out of service and back.
//!
//! # Error Responses
//!
//! - `400 Bad Request`: Returned when the data is not valid UTF-8
//! - `500 Internal Server Error`: Returned when a command cannot be sent to the channel

use std::{env, fs};

use anyhow::{Context as _, bail};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use fmtp_core::{ChannelSettings, ChannelStatus, Command};
use fmtp_tokio::{ChannelHandle, Controller};
use tokio::{
    net::TcpListener,
    spawn,
    sync::{mpsc::Sender, watch},
};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(Clone)]
struct AppState {
    commands: Sender<Command>,
    status: watch::Receiver<ChannelStatus>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::ERROR.into())
                .with_env_var("FMTP_LOG")
                .from_env_lossy(),
        )
        .init();

    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: fmtp-http <settings.json> [listen address]");
    };
    let listen = args.next().unwrap_or_else(|| "127.0.0.1:8000".to_string());

    let settings: ChannelSettings = serde_json::from_str(
        &fs::read_to_string(&path).with_context(|| format!("cannot read {path}"))?,
    )
    .with_context(|| format!("cannot parse {path}"))?;
    let (controller, handle) = Controller::new(settings.check()?)?;
    let ChannelHandle {
        commands,
        mut logs,
        mut payloads,
        status,
    } = handle;

    spawn(async move {
        if let Err(e) = controller.run().await {
            error!("FMTP channel error: {e:#}");
        }
        info!("FMTP finished");
    });
    spawn(async move {
        while let Some(msg) = payloads.recv().await {
            info!("msg received, {msg}");
        }
    });
    spawn(async move { while logs.recv().await.is_some() {} });

    let state = AppState { commands, status };
    let app = Router::new()
        .route("/", get(channel_get).post(channel_data))
        .route("/associate", post(channel_associate))
        .route("/shutdown", post(channel_shutdown))
        .route("/disconnect", post(channel_disconnect))
        .route("/disable", post(channel_disable))
        .route("/enable", post(channel_enable))
        .with_state(state);

    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("cannot listen on {listen}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn channel_get(State(state): State<AppState>) -> Json<ChannelStatus> {
    Json(state.status.borrow().clone())
}

async fn command(state: &AppState, command: Command) -> Result<(), (StatusCode, String)> {
    state
        .commands
        .send(command)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn channel_data(
    State(state): State<AppState>,
    data: Bytes,
) -> Result<(), (StatusCode, String)> {
    let text = String::from_utf8(data.to_vec())
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    command(&state, Command::Data(text)).await
}

async fn channel_associate(State(state): State<AppState>) -> Result<(), (StatusCode, String)> {
    command(&state, Command::Startup).await
}

async fn channel_shutdown(State(state): State<AppState>) -> Result<(), (StatusCode, String)> {
    command(&state, Command::Shutdown).await
}

async fn channel_disconnect(State(state): State<AppState>) -> Result<(), (StatusCode, String)> {
    command(&state, Command::Disconnect).await
}

async fn channel_disable(State(state): State<AppState>) -> Result<(), (StatusCode, String)> {
    command(&state, Command::Disable).await
}

async fn channel_enable(State(state): State<AppState>) -> Result<(), (StatusCode, String)> {
    command(&state, Command::Enable).await
}
