use std::io::BufReader;
use std::io::Read as _;
use std::io::stdin;
use std::thread;

use fmtp_core::ChannelSettings;
use fmtp_core::Command;
use fmtp_tokio::ChannelHandle;
use fmtp_tokio::Controller;

use tracing::debug;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("FMTP_LOG")
                .from_env_lossy(),
        )
        .init();

    let config = ChannelSettings {
        id: 1,
        data_type: "OLDI".to_string(),
        net_role: "client".to_string(),
        local_name: "Client".to_string(),
        local_atc: "CLIENT".to_string(),
        remote_name: "Server".to_string(),
        remote_atc: "SERVER".to_string(),
        interval_ts: 15,
        interval_tr: 40,
        interval_ti: 30,
        reconnect_timeout: 3,
        remote_address: "127.0.0.1".to_string(),
        remote_port: 8500,
        data_encoding: "utf-8".to_string(),
        ..ChannelSettings::default()
    }
    .check()?;

    let (controller, handle) = Controller::new(config)?;
    let ChannelHandle {
        commands,
        mut logs,
        mut payloads,
        mut status,
    } = handle;

    tokio::spawn(async move {
        while let Some(msg) = payloads.recv().await {
            info!("Message received: {msg}");
        }
    });
    tokio::spawn(async move { while logs.recv().await.is_some() {} });
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            debug!("status: {:?}", *status.borrow_and_update());
        }
    });

    debug!("spawning thread");
    thread::spawn(move || {
        let reader = BufReader::new(stdin());
        for byte in reader.bytes() {
            let command = match byte? {
                b'a' => Command::Startup,
                b's' => Command::Shutdown,
                b'd' => Command::Disconnect,
                b'o' => Command::Data("test".to_string()),
                b'x' => Command::Disable,
                b'e' => Command::Enable,
                _ => continue,
            };
            debug!("sending {command:?}");
            commands.blocking_send(command)?;
        }
        debug!("ending thread");

        Ok::<_, anyhow::Error>(())
    });

    controller.run().await?;

    Ok(())
}
