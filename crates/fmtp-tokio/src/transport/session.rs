use std::net::SocketAddr;

use fmtp_core::{FmtpEvent, Severity};
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{ErrorLog, Outgoing, TransportEvent};

enum Write {
    Packet(Outgoing),
    Close,
}

/// Read and write tasks of one TCP connection.
///
/// Dropping the session cancels both tasks, which closes the socket.
struct Session {
    id: u64,
    peer: SocketAddr,
    writes: UnboundedSender<Write>,
    cancel: CancellationToken,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Report of a session task, tagged with the session id.
#[derive(Debug)]
pub(super) enum Notice {
    Received(Vec<u8>),
    Sent(FmtpEvent),
    SendFailed(Option<FmtpEvent>),
    Ended(Option<String>),
}

type Notices = UnboundedSender<(u64, Notice)>;

async fn read_loop(
    mut read: OwnedReadHalf,
    buffer_len: usize,
    id: u64,
    notices: Notices,
    cancel: CancellationToken,
) -> Option<String> {
    let mut buffer = vec![0; buffer_len];
    loop {
        select! {
            () = cancel.cancelled() => return None,
            received = read.read(&mut buffer) => match received {
                Ok(0) => return Some("connection closed by peer".to_string()),
                Ok(n) => {
                    trace!("read {n} bytes");
                    if notices.send((id, Notice::Received(buffer[..n].to_vec()))).is_err() {
                        return None;
                    }
                }
                Err(e) => return Some(format!("read failed: {e}")),
            }
        }
    }
}

async fn write_loop(
    mut write: OwnedWriteHalf,
    mut writes: UnboundedReceiver<Write>,
    id: u64,
    notices: Notices,
    cancel: CancellationToken,
) -> Option<String> {
    loop {
        let next = select! {
            () = cancel.cancelled() => return None,
            next = writes.recv() => next,
        };
        match next {
            Some(Write::Packet(Outgoing { bytes, after })) => {
                let written = select! {
                    () = cancel.cancelled() => Err(None),
                    res = write.write_all(&bytes) => res.map_err(Some),
                };
                let notice = match written {
                    Ok(()) => after.map(Notice::Sent),
                    Err(e) => {
                        if notices.send((id, Notice::SendFailed(after))).is_err() {
                            return None;
                        }
                        return e.map(|e| format!("write failed: {e}"));
                    }
                };
                if let Some(notice) = notice
                    && notices.send((id, notice)).is_err()
                {
                    return None;
                }
            }
            Some(Write::Close) | None => {
                if let Err(e) = write.shutdown().await {
                    debug!("shutdown failed: {e}");
                }
                return Some("connection closed".to_string());
            }
        }
    }
}

/// Owns at most one [`Session`] and reports its life cycle as [`TransportEvent`]s.
pub(super) struct Link {
    events: UnboundedSender<TransportEvent>,
    notices_tx: Notices,
    notices_rx: UnboundedReceiver<(u64, Notice)>,
    session: Option<Session>,
    next_id: u64,
    read_buffer: usize,
    errors: ErrorLog,
}

impl Link {
    pub(super) fn new(events: UnboundedSender<TransportEvent>, read_buffer: usize) -> Self {
        let (notices_tx, notices_rx) = unbounded_channel();
        Self {
            events,
            notices_tx,
            notices_rx,
            session: None,
            next_id: 0,
            read_buffer,
            errors: ErrorLog::default(),
        }
    }

    pub(super) fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub(super) fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            trace!("controller gone");
        }
    }

    pub(super) fn log(&self, severity: Severity, text: String) {
        self.emit(TransportEvent::Log(severity, text));
    }

    /// Logs `text` at error severity unless it repeats the previous error.
    pub(super) fn error(&mut self, text: String) {
        if let Some(text) = self.errors.report(text) {
            self.log(Severity::Error, text);
        }
    }

    /// Starts the read and write tasks for `stream`.
    ///
    /// `Connected(true)` and `raise` are reported before anything read from the
    /// new connection.
    pub(super) fn open(
        &mut self,
        stream: TcpStream,
        peer: SocketAddr,
        raise: Option<FmtpEvent>,
    ) {
        self.drop_session();
        self.errors.clear();
        self.next_id += 1;
        let id = self.next_id;

        self.log(Severity::Info, format!("connected to {peer}"));
        self.emit(TransportEvent::Connected(true));
        if let Some(event) = raise {
            self.emit(TransportEvent::Raised(event));
        }

        let (read, write) = stream.into_split();
        let (writes_tx, writes_rx) = unbounded_channel();
        let cancel = CancellationToken::new();

        let (notices, token, buffer) = (self.notices_tx.clone(), cancel.clone(), self.read_buffer);
        tokio::spawn(async move {
            let reason = read_loop(read, buffer, id, notices.clone(), token.clone()).await;
            token.cancel();
            if notices.send((id, Notice::Ended(reason))).is_err() {
                trace!("session {id}: transport gone");
            }
        });
        let (notices, token) = (self.notices_tx.clone(), cancel.clone());
        tokio::spawn(async move {
            let reason = write_loop(write, writes_rx, id, notices.clone(), token.clone()).await;
            token.cancel();
            if notices.send((id, Notice::Ended(reason))).is_err() {
                trace!("session {id}: transport gone");
            }
        });

        self.session = Some(Session {
            id,
            peer,
            writes: writes_tx,
            cancel,
        });
    }

    pub(super) fn send(&self, outgoing: Outgoing) {
        let outgoing = match &self.session {
            Some(session) => match session.writes.send(Write::Packet(outgoing)) {
                Ok(()) => return,
                Err(e) => match e.0 {
                    Write::Packet(outgoing) => outgoing,
                    Write::Close => return,
                },
            },
            None => outgoing,
        };
        let text = "no connection, packet dropped".to_string();
        self.log(Severity::Warning, text);
        self.emit(TransportEvent::SendFailed(outgoing.after));
    }

    /// Closes the connection once the packets queued so far are written.
    pub(super) fn close(&self) {
        if let Some(session) = &self.session
            && session.writes.send(Write::Close).is_err()
        {
            session.cancel.cancel();
        }
    }

    /// Closes the connection immediately.
    pub(super) fn drop_session(&mut self) {
        if let Some(session) = self.session.take() {
            let text = format!("disconnected from {}", session.peer);
            self.log(Severity::Info, text);
            drop(session);
            self.emit(TransportEvent::Connected(false));
        }
    }

    /// Waits for the next report of a session task.
    ///
    /// Cancel safe.
    pub(super) async fn notice(&mut self) -> (u64, Notice) {
        match self.notices_rx.recv().await {
            Some(notice) => notice,
            // the link holds a sender itself
            None => std::future::pending().await,
        }
    }

    /// Forwards a report of the current session, reports of earlier sessions are dropped.
    pub(super) fn on_notice(&mut self, (id, notice): (u64, Notice)) {
        if self.session.as_ref().is_none_or(|s| s.id != id) {
            trace!("session {id}: dropping {notice:?}");
            return;
        }
        match notice {
            Notice::Received(bytes) => self.emit(TransportEvent::Received(bytes)),
            Notice::Sent(event) => self.emit(TransportEvent::Sent(event)),
            Notice::SendFailed(after) => self.emit(TransportEvent::SendFailed(after)),
            Notice::Ended(reason) => {
                if let Some(reason) = reason {
                    self.log(Severity::Warning, reason);
                }
                self.drop_session();
            }
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("session", &self.session.as_ref().map(|s| (s.id, s.peer)))
            .field("read_buffer", &self.read_buffer)
            .finish_non_exhaustive()
    }
}
