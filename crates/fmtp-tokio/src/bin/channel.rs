use std::{env, fs};

use anyhow::{Context as _, bail};
use fmtp_core::ChannelSettings;
use fmtp_tokio::{ChannelHandle, Controller};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

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

    let Some(path) = env::args().nth(1) else {
        bail!("usage: fmtp-channel <settings.json>");
    };
    let settings: ChannelSettings = serde_json::from_str(
        &fs::read_to_string(&path).with_context(|| format!("cannot read {path}"))?,
    )
    .with_context(|| format!("cannot parse {path}"))?;
    let config = settings.check().context("invalid channel settings")?;

    let (controller, handle) = Controller::new(config)?;
    let ChannelHandle {
        commands,
        mut logs,
        mut payloads,
        ..
    } = handle;

    tokio::spawn(async move {
        while let Some(message) = payloads.recv().await {
            info!("received {}: {}", message.typ, message.text);
        }
    });
    // records are already mirrored to tracing
    tokio::spawn(async move { while logs.recv().await.is_some() {} });

    // keeps the command queue open
    let _commands = commands;
    if let Err(e) = controller.run().await {
        error!("channel stopped: {e:#}");
        return Err(e);
    }
    Ok(())
}
