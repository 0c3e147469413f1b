use std::time::Duration;

use fmtp_core::{ChannelSettings, Command, FmtpMessage};
use fmtp_tokio::{ChannelHandle, ClientTransport, Controller, ServerTransport};
use tokio::{
    io::AsyncReadExt as _,
    net::{TcpListener, TcpStream},
    time::timeout,
};

const WAIT: Duration = Duration::from_secs(10);

fn settings(role: &str, local: &str, remote: &str) -> ChannelSettings {
    ChannelSettings {
        id: 9,
        data_type: "OLDI".into(),
        net_role: role.into(),
        local_name: local.to_lowercase(),
        local_atc: local.into(),
        remote_name: remote.to_lowercase(),
        remote_atc: remote.into(),
        interval_ts: 15,
        interval_tr: 40,
        interval_ti: 30,
        reconnect_timeout: 1,
        local_port: 8500,
        remote_address: "127.0.0.1".into(),
        remote_port: 8500,
        data_encoding: "utf-8".into(),
        ..ChannelSettings::default()
    }
}

async fn server() -> (u16, ChannelHandle) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let transport =
        ServerTransport::from_listener(listener, None, Duration::from_secs(1)).unwrap();
    let port = transport.port();
    let config = settings("server", "SERVER", "CLIENT").check().unwrap();
    let (controller, handle) = Controller::with_transport(config, transport).unwrap();
    tokio::spawn(controller.run());
    (port, handle)
}

fn client(port: u16) -> ChannelHandle {
    let config = settings("client", "CLIENT", "SERVER").check().unwrap();
    let transport = ClientTransport::new("127.0.0.1".into(), port);
    let (controller, handle) = Controller::with_transport(config, transport).unwrap();
    tokio::spawn(controller.run());
    handle
}

async fn data_ready(handle: &mut ChannelHandle) {
    timeout(
        WAIT,
        handle.status.wait_for(|s| s.fmtp_state == "DATA_READY"),
    )
    .await
    .unwrap()
    .unwrap();
}

#[tokio::test]
async fn client_and_server_associate_and_exchange_data() {
    let (port, mut server) = server().await;
    let mut client = client(port);

    data_ready(&mut server).await;
    data_ready(&mut client).await;

    client
        .commands
        .send(Command::Data("FPL-ABC123".into()))
        .await
        .unwrap();
    let received = timeout(WAIT, server.payloads.recv()).await.unwrap();
    assert_eq!(received, Some(FmtpMessage::operational("FPL-ABC123")));

    server
        .commands
        .send(Command::Data("ACK".into()))
        .await
        .unwrap();
    let received = timeout(WAIT, client.payloads.recv()).await.unwrap();
    assert_eq!(received, Some(FmtpMessage::operational("ACK")));
}

#[tokio::test]
async fn server_keeps_first_client() {
    let (port, mut server) = server().await;
    let mut client = client(port);
    data_ready(&mut server).await;
    data_ready(&mut client).await;

    let mut intruder = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut buf = [0; 1];
    let read = timeout(WAIT, intruder.read(&mut buf)).await.unwrap();
    assert_eq!(read.unwrap(), 0);

    client
        .commands
        .send(Command::Data("still here".into()))
        .await
        .unwrap();
    let received = timeout(WAIT, server.payloads.recv()).await.unwrap();
    assert_eq!(received, Some(FmtpMessage::operational("still here")));
}

#[tokio::test]
async fn shutdown_then_reassociate() {
    let (port, mut server) = server().await;
    let mut client = client(port);
    data_ready(&mut server).await;
    data_ready(&mut client).await;

    client.commands.send(Command::Shutdown).await.unwrap();
    timeout(WAIT, client.status.wait_for(|s| s.fmtp_state == "READY"))
        .await
        .unwrap()
        .unwrap();
    // the peer's SHUTDOWN moves the server back to ASSOCIATION_PENDING
    timeout(
        WAIT,
        server
            .status
            .wait_for(|s| s.fmtp_state == "ASSOCIATION_PENDING"),
    )
    .await
    .unwrap()
    .unwrap();

    client.commands.send(Command::Startup).await.unwrap();
    data_ready(&mut client).await;
    data_ready(&mut server).await;
}
