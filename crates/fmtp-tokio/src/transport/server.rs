use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use fmtp_core::{Endpoint, FmtpEvent, Severity};
use tokio::{
    net::{TcpListener, TcpSocket, TcpStream},
    select,
    sync::mpsc::{UnboundedReceiver, UnboundedSender},
    time::{Instant, sleep_until},
};
use tracing::debug;

use super::{Transport, TransportCommand, TransportEvent, session::Link};

const READ_BUFFER: usize = 8192;

/// Listens for the single client of a server channel.
///
/// A connection is refused while another client is connected, or if it does
/// not come from the required client address.
#[derive(Debug)]
pub struct ServerTransport {
    port: u16,
    client_ip: Option<IpAddr>,
    retry: Duration,
    listener: Option<TcpListener>,
}

impl ServerTransport {
    #[must_use]
    pub fn new(port: u16, client_ip: Option<IpAddr>, retry: Duration) -> Self {
        Self {
            port,
            client_ip,
            retry,
            listener: None,
        }
    }

    /// Serves on an already bound listener, the port is taken from it.
    ///
    /// # Errors
    ///
    /// Fails if the local address of `listener` cannot be read.
    pub fn from_listener(
        listener: TcpListener,
        client_ip: Option<IpAddr>,
        retry: Duration,
    ) -> io::Result<Self> {
        Ok(Self {
            port: listener.local_addr()?.port(),
            client_ip,
            retry,
            listener: Some(listener),
        })
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    fn bind(&self) -> io::Result<TcpListener> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port));
        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        // accepted sockets inherit it
        socket.set_keepalive(false)?;
        socket.bind(addr)?;
        socket.listen(16)
    }

    fn admits(&self, link: &Link, peer: SocketAddr) -> bool {
        if let Some(ip) = self.client_ip
            && peer.ip() != ip
        {
            link.log(
                Severity::Warning,
                format!("rejecting {peer}, only {ip} may connect"),
            );
            return false;
        }
        if link.is_connected() {
            link.log(
                Severity::Warning,
                format!("rejecting {peer}, a client is already connected"),
            );
            return false;
        }
        true
    }
}

async fn accept(listener: Option<&TcpListener>) -> io::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

impl Transport for ServerTransport {
    async fn run(
        mut self,
        mut commands: UnboundedReceiver<TransportCommand>,
        events: UnboundedSender<TransportEvent>,
    ) {
        let mut link = Link::new(events, READ_BUFFER);
        // listening is requested by the first Reconnect
        let mut wanted = false;
        let mut retry_at: Option<Instant> = None;

        loop {
            select! {
                biased;

                notice = link.notice() => link.on_notice(notice),

                command = commands.recv() => match command {
                    None => break,
                    Some(TransportCommand::Send(outgoing)) => link.send(outgoing),
                    Some(TransportCommand::Reconnect) => {
                        link.drop_session();
                        wanted = true;
                        retry_at = self.listener.is_none().then(Instant::now);
                    }
                    Some(TransportCommand::Disconnect) => link.close(),
                    Some(TransportCommand::Halt) => {
                        link.close();
                        wanted = false;
                        retry_at = None;
                        if self.listener.take().is_some() {
                            let text = format!("stopped listening on port {}", self.port);
                            link.log(Severity::Info, text);
                        }
                    }
                    Some(TransportCommand::Reconfigure(endpoint)) => {
                        if let Endpoint::Listen { port, client_ip } = endpoint {
                            link.drop_session();
                            self.client_ip = client_ip;
                            if port != self.port {
                                self.port = port;
                                self.listener = None;
                                retry_at = wanted.then(Instant::now);
                            }
                        } else {
                            link.error("a server cannot connect".to_string());
                        }
                    }
                },

                () = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    match self.bind() {
                        Ok(listener) => {
                            link.log(Severity::Info, format!("listening on port {}", self.port));
                            self.listener = Some(listener);
                            retry_at = None;
                        }
                        Err(e) => {
                            link.error(format!("cannot listen on port {}: {e}", self.port));
                            retry_at = Some(Instant::now() + self.retry);
                        }
                    }
                }

                accepted = accept(self.listener.as_ref()), if wanted => match accepted {
                    Ok((stream, peer)) => {
                        if self.admits(&link, peer) {
                            link.open(stream, peer, Some(FmtpEvent::RSetup));
                        }
                    }
                    Err(e) => link.error(format!("accept failed: {e}")),
                },
            }
        }
        debug!("server transport stopped");
    }
}

#[cfg(test)]
mod tests {
    use tokio::{io::AsyncReadExt as _, sync::mpsc::unbounded_channel};

    use super::*;

    async fn serve(
        client_ip: Option<IpAddr>,
    ) -> (
        u16,
        UnboundedSender<TransportCommand>,
        UnboundedReceiver<TransportEvent>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let transport =
            ServerTransport::from_listener(listener, client_ip, Duration::from_secs(1)).unwrap();
        let port = transport.port();
        let (cmd_tx, cmd_rx) = unbounded_channel();
        let (ev_tx, ev_rx) = unbounded_channel();
        tokio::spawn(transport.run(cmd_rx, ev_tx));
        cmd_tx.send(TransportCommand::Reconnect).unwrap();
        (port, cmd_tx, ev_rx)
    }

    async fn next_non_info(rx: &mut UnboundedReceiver<TransportEvent>) -> TransportEvent {
        loop {
            match rx.recv().await.unwrap() {
                TransportEvent::Log(Severity::Info, _) => (),
                event => return event,
            }
        }
    }

    #[tokio::test]
    async fn accepts_one_client_and_raises_setup() {
        let (port, _cmd, mut events) = serve(None).await;

        let _first = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let event = next_non_info(&mut events).await;
        assert_eq!(event, TransportEvent::Connected(true));
        assert_eq!(
            next_non_info(&mut events).await,
            TransportEvent::Raised(FmtpEvent::RSetup)
        );

        let mut second = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        assert!(matches!(
            next_non_info(&mut events).await,
            TransportEvent::Log(Severity::Warning, text) if text.contains("already connected")
        ));
        let mut buf = [0; 1];
        assert_eq!(second.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rejects_unexpected_client_address() {
        let (port, _cmd, mut events) = serve(Some("10.9.9.9".parse().unwrap())).await;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        assert!(matches!(
            next_non_info(&mut events).await,
            TransportEvent::Log(Severity::Warning, text) if text.contains("only 10.9.9.9")
        ));
        let mut buf = [0; 1];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn disconnect_closes_session() {
        let (port, cmd, mut events) = serve(None).await;
        let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let event = next_non_info(&mut events).await;
        assert_eq!(event, TransportEvent::Connected(true));
        assert_eq!(
            next_non_info(&mut events).await,
            TransportEvent::Raised(FmtpEvent::RSetup)
        );

        cmd.send(TransportCommand::Disconnect).unwrap();
        let mut buf = [0; 1];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
        loop {
            match next_non_info(&mut events).await {
                TransportEvent::Connected(false) => break,
                TransportEvent::Log(..) => (),
                other => panic!("unexpected {other:?}"),
            }
        }
    }
}
