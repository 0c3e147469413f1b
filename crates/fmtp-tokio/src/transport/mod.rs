//! TCP transports carrying FMTP packets for a [`Controller`](crate::Controller).
//!
//! A transport runs as its own task and talks to the controller only through
//! queues: [`TransportCommand`]s in, [`TransportEvent`]s out. I/O errors are
//! turned into events and log lines before they leave the transport.

mod client;
mod server;
mod session;

use std::time::Duration;

pub use client::ClientTransport;
use fmtp_core::{ChannelConfig, Endpoint, FmtpEvent, Severity};
pub use server::ServerTransport;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Encoded packet plus the event to raise once it is written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outgoing {
    pub bytes: Vec<u8>,
    pub after: Option<FmtpEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportCommand {
    Send(Outgoing),
    /// Drop the current connection, then connect (client) or listen (server).
    Reconnect,
    /// Flush queued packets and close the current connection.
    Disconnect,
    /// Close the connection and stop listening.
    Halt,
    /// Drop the current connection and use a new endpoint from now on.
    Reconfigure(Endpoint),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Connected(bool),
    Received(Vec<u8>),
    Sent(FmtpEvent),
    SendFailed(Option<FmtpEvent>),
    /// Protocol event originating in the transport, `RSetup` of an accepted client.
    Raised(FmtpEvent),
    Log(Severity, String),
}

/// Byte pipe between a controller and its peer.
pub trait Transport: Send + 'static {
    /// Serves `commands` until the sending side is dropped.
    fn run(
        self,
        commands: UnboundedReceiver<TransportCommand>,
        events: UnboundedSender<TransportEvent>,
    ) -> impl Future<Output = ()> + Send;
}

/// The transport matching a channel's role.
#[derive(Debug)]
pub enum RoleTransport {
    Client(ClientTransport),
    Server(ServerTransport),
}

impl RoleTransport {
    #[must_use]
    pub fn new(config: &ChannelConfig) -> Self {
        match &config.endpoint {
            Endpoint::Connect { address, port } => {
                Self::Client(ClientTransport::new(address.clone(), *port))
            }
            Endpoint::Listen { port, client_ip } => Self::Server(ServerTransport::new(
                *port,
                *client_ip,
                config.reconnect_timeout.max(MIN_RETRY),
            )),
        }
    }
}

impl Transport for RoleTransport {
    async fn run(
        self,
        commands: UnboundedReceiver<TransportCommand>,
        events: UnboundedSender<TransportEvent>,
    ) {
        match self {
            Self::Client(client) => client.run(commands, events).await,
            Self::Server(server) => server.run(commands, events).await,
        }
    }
}

const MIN_RETRY: Duration = Duration::from_secs(1);

/// Logs an error only if it differs from the previous one.
#[derive(Debug, Default)]
struct ErrorLog {
    last: Option<String>,
}

impl ErrorLog {
    /// Returns the text if it should be logged.
    fn report(&mut self, text: String) -> Option<String> {
        if self.last.as_deref() == Some(text.as_str()) {
            tracing::debug!("repeated: {text}");
            None
        } else {
            self.last = Some(text.clone());
            Some(text)
        }
    }

    fn clear(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_errors_are_logged_once() {
        let mut errors = ErrorLog::default();
        assert!(errors.report("refused".into()).is_some());
        assert!(errors.report("refused".into()).is_none());
        assert!(errors.report("timed out".into()).is_some());
        assert!(errors.report("refused".into()).is_some());
        errors.clear();
        assert!(errors.report("refused".into()).is_some());
    }
}
