use std::time::Duration;

use anyhow::{Context as _, anyhow};
use fmtp_core::{
    Action, Channel, ChannelConfig, ChannelStatus, Command, FmtpMessage, LogRecord, ReceiveBuffer,
    Severity,
};
use tokio::{
    select,
    sync::{
        mpsc::{
            Receiver, Sender, UnboundedReceiver, UnboundedSender, channel, error::TrySendError,
            unbounded_channel,
        },
        watch,
    },
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::{
    Timers,
    transport::{Outgoing, RoleTransport, Transport, TransportCommand, TransportEvent},
};

const QUEUE_LEN: usize = 1024;
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

/// Application side of a running [`Controller`].
#[derive(Debug)]
pub struct ChannelHandle {
    pub commands: Sender<Command>,
    /// Protocol log, records are dropped with a warning while the queue is full.
    pub logs: Receiver<LogRecord>,
    /// Operational data and other non-protocol payloads received from the peer.
    pub payloads: Receiver<FmtpMessage>,
    /// Channel state, refreshed every second.
    pub status: watch::Receiver<ChannelStatus>,
}

/// Runs one FMTP channel.
///
/// All protocol decisions are made by the [`Channel`] core on a single task,
/// fed in arrival order by the transport, the timers, the application and a
/// one second status tick.
#[derive(Debug)]
pub struct Controller<T: Transport = RoleTransport> {
    transport: T,
    transport_commands: UnboundedReceiver<TransportCommand>,
    transport_events: UnboundedSender<TransportEvent>,
    actor: Actor,
}

impl Controller {
    /// Creates a controller with the transport matching the configured role.
    ///
    /// # Errors
    ///
    /// Fails if the channel core cannot be built for `config`.
    pub fn new(config: ChannelConfig) -> anyhow::Result<(Self, ChannelHandle)> {
        let transport = RoleTransport::new(&config);
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> Controller<T> {
    /// # Errors
    ///
    /// Fails if the channel core cannot be built for `config`.
    pub fn with_transport(
        config: ChannelConfig,
        transport: T,
    ) -> anyhow::Result<(Self, ChannelHandle)> {
        let timers = Timers::new(&config);
        let core = Channel::new(config).context("invalid channel")?;

        let (commands_tx, commands) = channel(QUEUE_LEN);
        let (logs, logs_rx) = channel(QUEUE_LEN);
        let (payloads, payloads_rx) = channel(QUEUE_LEN);
        let (status, status_rx) = watch::channel(core.status());
        let (transport_tx, transport_commands) = unbounded_channel();
        let (transport_events, events) = unbounded_channel();

        Ok((
            Self {
                transport,
                transport_commands,
                transport_events,
                actor: Actor {
                    channel: core,
                    timers,
                    buffer: ReceiveBuffer::default(),
                    transport: transport_tx,
                    events,
                    commands,
                    logs,
                    payloads,
                    status,
                },
            },
            ChannelHandle {
                commands: commands_tx,
                logs: logs_rx,
                payloads: payloads_rx,
                status: status_rx,
            },
        ))
    }

    /// Runs until every [`ChannelHandle::commands`] sender is dropped.
    ///
    /// # Errors
    ///
    /// Fails if the transport task stops on its own.
    pub async fn run(self) -> anyhow::Result<()> {
        let Self {
            transport,
            transport_commands,
            transport_events,
            mut actor,
        } = self;

        let task = tokio::spawn(transport.run(transport_commands, transport_events));
        let result = actor.run().await;
        // closes the transport command queue
        drop(actor);
        if let Err(e) = task.await {
            warn!("transport task failed: {e}");
        }
        result
    }
}

#[derive(Debug)]
struct Actor {
    channel: Channel,
    timers: Timers,
    buffer: ReceiveBuffer,
    transport: UnboundedSender<TransportCommand>,
    events: UnboundedReceiver<TransportEvent>,
    commands: Receiver<Command>,
    logs: Sender<LogRecord>,
    payloads: Sender<FmtpMessage>,
    status: watch::Sender<ChannelStatus>,
}

impl Actor {
    async fn run(&mut self) -> anyhow::Result<()> {
        let mut tick = interval(STATUS_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.channel.start();
        self.execute().await?;

        loop {
            select! {
                // Transport events first so the after-send events of written
                // packets are applied before anything else.
                biased;

                event = self.events.recv() => {
                    let event = event.ok_or_else(|| anyhow!("transport stopped"))?;
                    self.transport_event(event);
                }

                expired = self.timers.expired() => self.channel.timer_expired(expired),

                command = self.commands.recv() => {
                    let Some(command) = command else {
                        info!("channel {}: command queue closed", self.channel.config().id);
                        break;
                    };
                    debug!("channel {}: {command:?}", self.channel.config().id);
                    self.channel.command(command);
                }

                _ = tick.tick() => {
                    self.status.send_replace(self.channel.status());
                }
            }

            self.execute().await?;
        }

        Ok(())
    }

    fn transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected(connected) => {
                self.buffer.clear();
                self.channel.connection_changed(connected);
            }
            TransportEvent::Received(bytes) => {
                self.buffer.extend(&bytes);
                self.reframe();
            }
            TransportEvent::Sent(event) => self.channel.sent(event),
            TransportEvent::SendFailed(after) => self.channel.send_failed(after),
            TransportEvent::Raised(event) => {
                self.channel.handle(event);
            }
            TransportEvent::Log(severity, text) => self.channel.log(severity, text),
        }
    }

    /// Dispatches every complete packet in the receive buffer.
    fn reframe(&mut self) {
        let encoding = self.channel.config().encoding;
        loop {
            match self.buffer.next_frame() {
                Ok(Some(frame)) => {
                    let text = encoding.decode(&frame.body);
                    self.channel.receive(FmtpMessage::new(frame.typ, text));
                }
                Ok(None) => break,
                Err(e) => self.channel.log(Severity::Error, e.to_string()),
            }
        }
    }

    fn command_transport(&self, command: TransportCommand) -> anyhow::Result<()> {
        self.transport
            .send(command)
            .map_err(|_| anyhow!("transport stopped"))
    }

    /// Carries out queued channel actions, including those queued while doing so.
    async fn execute(&mut self) -> anyhow::Result<()> {
        while let Some(action) = self.channel.poll_action() {
            match action {
                Action::Send { message, after } => {
                    match message.to_bytes(self.channel.config().encoding) {
                        Ok(bytes) => {
                            let outgoing = Outgoing { bytes, after };
                            self.command_transport(TransportCommand::Send(outgoing))?;
                        }
                        Err(e) => {
                            self.channel
                                .log(Severity::Error, format!("cannot send {message}: {e}"));
                            self.channel.send_failed(after);
                        }
                    }
                }
                Action::RestartTimer(kind) => self.timers.get_mut(kind).restart(),
                Action::StopTimer(kind) => self.timers.get_mut(kind).stop(),
                Action::Reconnect => self.command_transport(TransportCommand::Reconnect)?,
                Action::Disconnect => self.command_transport(TransportCommand::Disconnect)?,
                Action::Halt => self.command_transport(TransportCommand::Halt)?,
                Action::Reconfigure => {
                    let config = self.channel.config();
                    self.timers.reconfigure(config);
                    self.command_transport(TransportCommand::Reconfigure(config.endpoint.clone()))?;
                    self.status.send_replace(self.channel.status());
                }
                Action::Deliver(message) => {
                    if self.payloads.send(message).await.is_err() {
                        debug!("payload receiver dropped");
                    }
                }
                Action::Log(record) => {
                    record.trace();
                    match self.logs.try_send(record) {
                        Ok(()) | Err(TrySendError::Closed(_)) => (),
                        Err(TrySendError::Full(record)) => {
                            warn!("log queue full, dropping: {}", record.text);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use fmtp_core::{ChannelSettings, DaemonState, FmtpEvent, FmtpType, encode};
    use tokio::sync::oneshot;

    use super::*;

    /// Hands the transport queues to the test.
    struct Loop {
        commands: UnboundedSender<TransportCommand>,
        events: oneshot::Sender<UnboundedSender<TransportEvent>>,
    }

    impl Transport for Loop {
        async fn run(
            self,
            mut commands: UnboundedReceiver<TransportCommand>,
            events: UnboundedSender<TransportEvent>,
        ) {
            self.events.send(events).unwrap();
            while let Some(command) = commands.recv().await {
                if self.commands.send(command).is_err() {
                    break;
                }
            }
        }
    }

    struct Peer {
        commands: UnboundedReceiver<TransportCommand>,
        events: UnboundedSender<TransportEvent>,
    }

    impl Peer {
        async fn next(&mut self) -> TransportCommand {
            self.commands.recv().await.unwrap()
        }

        /// Next packet sent by the controller.
        async fn packet(&mut self) -> (FmtpType, String, Option<FmtpEvent>) {
            loop {
                if let TransportCommand::Send(Outgoing { bytes, after }) = self.next().await {
                    let typ = FmtpType::from_code(bytes[4]);
                    let text = String::from_utf8(bytes[5..].to_vec()).unwrap();
                    return (typ, text, after);
                }
            }
        }

        fn emit(&self, event: TransportEvent) {
            self.events.send(event).unwrap();
        }

        fn receive(&self, typ: FmtpType, text: &str) {
            let bytes = encode(typ, text.as_bytes()).unwrap();
            self.emit(TransportEvent::Received(bytes));
        }
    }

    fn settings(role: &str) -> ChannelSettings {
        ChannelSettings {
            id: 2,
            data_type: "OLDI".into(),
            net_role: role.into(),
            local_name: "Local".into(),
            local_atc: "LOCAL".into(),
            remote_name: "Remote".into(),
            remote_atc: "REMOTE".into(),
            interval_ts: 15,
            interval_tr: 40,
            interval_ti: 30,
            reconnect_timeout: 5,
            local_port: 8500,
            remote_address: "127.0.0.1".into(),
            remote_port: 8500,
            data_encoding: "utf-8".into(),
            ..ChannelSettings::default()
        }
    }

    async fn spawn(settings: ChannelSettings) -> (ChannelHandle, Peer) {
        let (commands_tx, commands) = unbounded_channel();
        let (events_tx, events) = oneshot::channel();
        let (controller, handle) = Controller::with_transport(
            settings.check().unwrap(),
            Loop {
                commands: commands_tx,
                events: events_tx,
            },
        )
        .unwrap();
        tokio::spawn(controller.run());
        let events = events.await.unwrap();
        (handle, Peer { commands, events })
    }

    #[tokio::test(start_paused = true)]
    async fn client_reaches_data_ready_and_heartbeats() {
        let (mut handle, mut peer) = spawn(settings("client")).await;
        assert_eq!(peer.next().await, TransportCommand::Reconnect);

        peer.emit(TransportEvent::Connected(true));
        assert_eq!(
            peer.packet().await,
            (FmtpType::Identification, "LOCAL-REMOTE".into(), Some(FmtpEvent::RSetup))
        );
        peer.emit(TransportEvent::Sent(FmtpEvent::RSetup));

        // identification and STARTUP of the peer in one chunk
        let mut chunk = encode(FmtpType::Identification, b"REMOTE-LOCAL").unwrap();
        chunk.extend(encode(FmtpType::System, b"01").unwrap());
        peer.emit(TransportEvent::Received(chunk));

        assert_eq!(
            peer.packet().await,
            (FmtpType::Identification, "ACCEPT".into(), None)
        );
        assert_eq!(
            peer.packet().await,
            (FmtpType::System, "01".into(), Some(FmtpEvent::LStartup))
        );
        peer.emit(TransportEvent::Sent(FmtpEvent::LStartup));
        assert_eq!(peer.packet().await, (FmtpType::System, "01".into(), None));

        handle
            .status
            .wait_for(|s| s.fmtp_state == "DATA_READY")
            .await
            .unwrap();
        assert_eq!(handle.status.borrow().daemon_state, DaemonState::Ok);

        peer.receive(FmtpType::Operational, "FPL-1");
        assert_eq!(
            handle.payloads.recv().await.unwrap(),
            FmtpMessage::operational("FPL-1")
        );

        // Ts elapses on the paused clock
        assert_eq!(peer.packet().await, (FmtpType::System, "03".into(), None));
    }

    #[tokio::test(start_paused = true)]
    async fn client_drops_to_idle_on_tr_and_reconnects() {
        let (handle, mut peer) = spawn(settings("client")).await;
        assert_eq!(peer.next().await, TransportCommand::Reconnect);
        peer.emit(TransportEvent::Connected(true));
        peer.packet().await;
        peer.emit(TransportEvent::Sent(FmtpEvent::RSetup));
        peer.receive(FmtpType::Identification, "REMOTE-LOCAL");
        peer.packet().await;
        peer.packet().await;
        peer.emit(TransportEvent::Sent(FmtpEvent::LStartup));
        peer.receive(FmtpType::System, "01");
        peer.packet().await;

        // silent peer: heartbeats go out until Tr expires
        loop {
            match peer.next().await {
                TransportCommand::Send(_) => (),
                TransportCommand::Reconnect => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(handle.status.borrow().fmtp_state, "IDLE");
    }

    #[tokio::test(start_paused = true)]
    async fn client_waits_between_connect_attempts() {
        let (_handle, mut peer) = spawn(settings("client")).await;
        assert_eq!(peer.next().await, TransportCommand::Reconnect);

        let failed = tokio::time::Instant::now();
        peer.emit(TransportEvent::Connected(false));
        assert_eq!(peer.next().await, TransportCommand::Reconnect);
        assert!(failed.elapsed() >= std::time::Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn server_rejects_wrong_identification() {
        let (mut handle, mut peer) = spawn(settings("server")).await;
        assert_eq!(peer.next().await, TransportCommand::Reconnect);

        peer.emit(TransportEvent::Connected(true));
        peer.emit(TransportEvent::Raised(FmtpEvent::RSetup));
        peer.receive(FmtpType::Identification, "OTHER-LOCAL");

        assert_eq!(peer.next().await, TransportCommand::Disconnect);
        let mut warned = false;
        while let Ok(record) = handle.logs.try_recv() {
            warned |= record.severity == Severity::Warning
                && record.text.contains("identification mismatch");
        }
        assert!(warned);
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_data_and_disable() {
        let (handle, mut peer) = spawn(settings("server")).await;
        assert_eq!(peer.next().await, TransportCommand::Reconnect);
        peer.emit(TransportEvent::Connected(true));
        peer.emit(TransportEvent::Raised(FmtpEvent::RSetup));
        peer.receive(FmtpType::Identification, "REMOTE-LOCAL");
        assert_eq!(
            peer.packet().await,
            (FmtpType::Identification, "LOCAL-REMOTE".into(), None)
        );
        peer.receive(FmtpType::Identification, "ACCEPT");
        peer.packet().await;
        peer.emit(TransportEvent::Sent(FmtpEvent::LStartup));
        peer.receive(FmtpType::System, "01");
        assert_eq!(peer.packet().await, (FmtpType::System, "01".into(), None));

        handle.commands.send(Command::Data("FPL-2".into())).await.unwrap();
        assert_eq!(
            peer.packet().await,
            (FmtpType::Operational, "FPL-2".into(), Some(FmtpEvent::LData))
        );

        handle.commands.send(Command::Disable).await.unwrap();
        assert_eq!(peer.next().await, TransportCommand::Halt);
    }
}
