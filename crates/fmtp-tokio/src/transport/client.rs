use std::{net::SocketAddr, time::Duration};

use anyhow::{Context as _, anyhow};
use fmtp_core::{Endpoint, Severity};
use tokio::{
    net::{TcpSocket, TcpStream, lookup_host},
    select,
    sync::mpsc::{UnboundedReceiver, UnboundedSender},
    time::timeout,
};
use tracing::debug;

use super::{Transport, TransportCommand, TransportEvent, session::Link};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_BUFFER: usize = 1024;

/// Connects to the server on request, one connection at a time.
#[derive(Debug, Clone)]
pub struct ClientTransport {
    address: String,
    port: u16,
}

impl ClientTransport {
    #[must_use]
    pub fn new(address: String, port: u16) -> Self {
        Self { address, port }
    }

    async fn connect(&self) -> anyhow::Result<(TcpStream, SocketAddr)> {
        let addrs = lookup_host((self.address.as_str(), self.port))
            .await
            .with_context(|| format!("cannot resolve {}:{}", self.address, self.port))?;

        let mut last = anyhow!("no address for {}:{}", self.address, self.port);
        for addr in addrs {
            debug!("connecting to {addr}");
            match Self::connect_addr(addr).await {
                Ok(stream) => return Ok((stream, addr)),
                Err(e) => last = e,
            }
        }
        Err(last)
    }

    async fn connect_addr(addr: SocketAddr) -> anyhow::Result<TcpStream> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        // liveness is checked by FMTP heartbeats
        socket.set_keepalive(false)?;
        timeout(CONNECT_TIMEOUT, socket.connect(addr))
            .await
            .with_context(|| format!("connecting to {addr} timed out"))?
            .with_context(|| format!("cannot connect to {addr}"))
    }
}

impl Transport for ClientTransport {
    async fn run(
        mut self,
        mut commands: UnboundedReceiver<TransportCommand>,
        events: UnboundedSender<TransportEvent>,
    ) {
        let mut link = Link::new(events, READ_BUFFER);
        loop {
            select! {
                biased;

                notice = link.notice() => link.on_notice(notice),

                command = commands.recv() => match command {
                    None => break,
                    Some(TransportCommand::Send(outgoing)) => link.send(outgoing),
                    Some(TransportCommand::Reconnect) => {
                        link.drop_session();
                        match self.connect().await {
                            Ok((stream, peer)) => link.open(stream, peer, None),
                            Err(e) => {
                                link.error(format!("{e:#}"));
                                link.emit(TransportEvent::Connected(false));
                            }
                        }
                    }
                    Some(TransportCommand::Disconnect | TransportCommand::Halt) => link.close(),
                    Some(TransportCommand::Reconfigure(endpoint)) => {
                        if let Endpoint::Connect { address, port } = endpoint {
                            let text = format!("remote changed to {address}:{port}");
                            link.log(Severity::Info, text);
                            self.address = address;
                            self.port = port;
                            link.drop_session();
                        } else {
                            link.error("a client cannot listen".to_string());
                        }
                    }
                },
            }
        }
        debug!("client transport stopped");
    }
}
