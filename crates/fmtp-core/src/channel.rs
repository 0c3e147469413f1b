use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::{
    Action, ChannelConfig, ChannelStatus, Command, DaemonState, Direction, Error, FmtpEvent,
    FmtpMessage, FmtpState, FmtpType, InitialState, LogRecord, Severity, StateMachine, TimerKind,
};

/// How far the channel drives the association on its own.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Ready,
    DataReady,
}

/// Protocol state of one FMTP channel, free of any I/O.
///
/// Inputs are fed through the `&mut self` methods, the resulting side effects
/// queue up as [`Action`]s and are drained with [`Channel::poll_action`].
#[derive(Debug, Clone)]
pub struct Channel {
    pub(crate) config: ChannelConfig,
    machine: StateMachine,
    state: FmtpState,
    pub(crate) target: Target,
    /// Sent packets whose after-send event has not come back yet.
    awaiting: usize,
    /// Received while `awaiting > 0`, replayed in order afterwards.
    held: VecDeque<FmtpMessage>,
    actions: VecDeque<Action>,
}

impl Channel {
    /// # Errors
    ///
    /// Fails if the transition table of the configured role is ambiguous.
    pub fn new(config: ChannelConfig) -> Result<Self, Error> {
        Ok(Self {
            machine: StateMachine::new(config.role)?,
            config,
            state: FmtpState::Idle,
            target: Target::DataReady,
            awaiting: 0,
            held: VecDeque::new(),
            actions: VecDeque::new(),
        })
    }

    #[must_use]
    pub fn state(&self) -> FmtpState {
        self.state
    }

    #[must_use]
    pub fn target(&self) -> Target {
        self.target
    }

    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn poll_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    pub(crate) fn push(&mut self, action: Action) {
        self.actions.push_back(action);
    }

    /// Settles into the configured initial state.
    pub fn start(&mut self) {
        match self.config.initial_state {
            InitialState::DataReady => {
                self.log(
                    Severity::Info,
                    format!(
                        "starting {:?} channel {}",
                        self.config.role,
                        self.config.url()
                    ),
                );
                self.push(Action::Reconnect);
            }
            InitialState::Disabled => self.disable(),
        }
    }

    /// Runs one transition. Returns the new state, or `None` if `event` is
    /// ignored in the current state.
    pub fn handle(&mut self, event: FmtpEvent) -> Option<FmtpState> {
        let prev = self.state;
        let Some(next) = self.machine.next_state(prev, event) else {
            trace!("channel {}: {event} ignored in {prev}", self.config.id);
            return None;
        };

        self.exit(prev, event);
        self.state = next;
        if prev == next {
            debug!("channel {}: {event} in {prev}", self.config.id);
        } else {
            self.log(Severity::Info, format!("{prev} -> {next} on {event}"));
        }
        self.enter(next, Some(event));
        Some(next)
    }

    pub fn command(&mut self, command: Command) {
        match command {
            Command::Data(text) => {
                if self.state == FmtpState::DataReady {
                    self.send(FmtpMessage::operational(text), Some(FmtpEvent::LData));
                } else {
                    self.log(
                        Severity::Warning,
                        format!("dropping outbound data in {}: {text}", self.state),
                    );
                }
            }
            Command::Startup => {
                self.target = Target::DataReady;
                if self.state == FmtpState::Ready {
                    self.send(FmtpMessage::startup(), Some(FmtpEvent::LStartup));
                } else {
                    debug!(
                        "channel {}: STARTUP follows once {} reaches READY",
                        self.config.id, self.state
                    );
                }
            }
            Command::Shutdown => {
                self.target = Target::Ready;
                self.handle(FmtpEvent::LShutdown);
            }
            Command::Disconnect => {
                self.handle(FmtpEvent::LDisconnect);
            }
            Command::Disable => self.disable(),
            Command::Enable => {
                if self.state == FmtpState::Disabled {
                    self.state = FmtpState::Idle;
                    self.log(Severity::Info, "DISABLED -> IDLE on enable");
                    self.push(Action::Reconnect);
                }
            }
            Command::Reconfigure(settings) => match settings.check() {
                Err(e) => self.log(Severity::Error, format!("ignoring new settings: {e}")),
                Ok(config) if config.role != self.config.role => self.log(
                    Severity::Error,
                    format!(
                        "ignoring new settings: role change {:?} -> {:?} needs a restart",
                        self.config.role, config.role
                    ),
                ),
                Ok(config) => {
                    self.config = config;
                    self.log(
                        Severity::Info,
                        format!("reconfigured for {}", self.config.url()),
                    );
                    self.push(Action::Reconfigure);
                }
            },
        }
    }

    fn disable(&mut self) {
        if self.state != FmtpState::Disabled {
            self.log(Severity::Info, format!("{} -> DISABLED", self.state));
            self.state = FmtpState::Disabled;
            self.enter(FmtpState::Disabled, None);
        }
    }

    /// Connection state reported by the transport.
    pub fn connection_changed(&mut self, connected: bool) {
        if connected {
            if self.config.role == crate::Role::Client {
                self.handle(FmtpEvent::LSetup);
            }
        } else {
            self.release_hold();
            self.handle(FmtpEvent::RDisconnect);
        }
    }

    pub fn timer_expired(&mut self, timer: TimerKind) {
        match timer.expiry_event() {
            Some(event) => {
                debug!("channel {}: {timer:?} expired", self.config.id);
                self.handle(event);
            }
            None => {
                self.log(Severity::Info, "reconnecting");
                self.push(Action::Reconnect);
            }
        }
    }

    /// The transport wrote the packet carrying `event` as its after-send event.
    ///
    /// Confirmations for packets of a lost connection are ignored.
    pub fn sent(&mut self, event: FmtpEvent) {
        if self.awaiting == 0 {
            debug!(
                "channel {}: stale confirmation {event} ignored",
                self.config.id
            );
            return;
        }
        self.awaiting -= 1;
        self.handle(event);
        self.replay_held();
    }

    /// The transport could not write a packet.
    pub fn send_failed(&mut self, after: Option<FmtpEvent>) {
        if let Some(event) = after
            && self.awaiting > 0
        {
            self.awaiting -= 1;
            self.log(
                Severity::Warning,
                format!("packet not sent, {event} not raised"),
            );
        }
        self.replay_held();
    }

    /// Decodes a received message into its protocol event.
    ///
    /// Messages arriving while a local after-send event is outstanding are held
    /// back so that local progress is applied first.
    pub fn receive(&mut self, message: FmtpMessage) {
        if self.awaiting > 0 {
            trace!("channel {}: holding {message}", self.config.id);
            self.held.push_back(message);
        } else {
            self.dispatch(message);
        }
    }

    fn replay_held(&mut self) {
        while self.awaiting == 0 {
            let Some(message) = self.held.pop_front() else {
                break;
            };
            self.dispatch(message);
        }
    }

    /// Forgets the outstanding after-send events of a lost connection.
    ///
    /// Held payloads still reach the application, held protocol messages are
    /// discarded with a warning.
    pub(crate) fn release_hold(&mut self) {
        self.awaiting = 0;
        while let Some(message) = self.held.pop_front() {
            let typ = message.typ;
            match typ {
                FmtpType::Identification | FmtpType::System => self.log_packet(
                    Severity::Warning,
                    typ,
                    format!("connection lost, discarding {}", message.text),
                ),
                _ => {
                    self.log_packet(Severity::Info, typ, format!("received {}", message.text));
                    self.push(Action::Deliver(message));
                }
            }
        }
    }

    fn dispatch(&mut self, message: FmtpMessage) {
        let typ = message.typ;
        match typ {
            FmtpType::Identification => {
                let expected =
                    FmtpMessage::identification(&self.config.remote_atc, &self.config.local_atc);
                let event = if message.text == FmtpMessage::REJECT {
                    FmtpEvent::RReject
                } else if message.text == FmtpMessage::ACCEPT {
                    FmtpEvent::RAccept
                } else if message.text == expected.text {
                    FmtpEvent::RIdValid
                } else {
                    self.log_packet(
                        Severity::Warning,
                        typ,
                        format!(
                            "identification mismatch: received `{}`, expected `{}`",
                            message.text, expected.text
                        ),
                    );
                    FmtpEvent::RIdInvalid
                };
                self.log_packet(Severity::Info, typ, format!("received {}", message.text));
                self.handle(event);
            }
            FmtpType::System => {
                let event = match message.text.as_str() {
                    FmtpMessage::STARTUP => FmtpEvent::RStartup,
                    FmtpMessage::SHUTDOWN => FmtpEvent::RShutdown,
                    FmtpMessage::HEARTBEAT => FmtpEvent::RHeartbeat,
                    other => {
                        self.log_packet(
                            Severity::Warning,
                            typ,
                            format!("unknown system message `{other}`"),
                        );
                        return;
                    }
                };
                let severity = if event == FmtpEvent::RHeartbeat && !self.config.debug {
                    Severity::Debug
                } else {
                    Severity::Info
                };
                self.log_packet(severity, typ, format!("received {event}"));
                self.handle(event);
            }
            FmtpType::Operational => {
                self.log_packet(Severity::Info, typ, format!("received {}", message.text));
                self.push(Action::Deliver(message));
                self.handle(FmtpEvent::RData);
            }
            FmtpType::Operator | FmtpType::Status | FmtpType::Unknown => {
                self.log_packet(Severity::Info, typ, format!("received {}", message.text));
                self.push(Action::Deliver(message));
            }
        }
    }

    pub(crate) fn send(&mut self, message: FmtpMessage, after: Option<FmtpEvent>) {
        let severity = if message.is_heartbeat() && !self.config.debug {
            Severity::Debug
        } else {
            Severity::Info
        };
        let text = format!("sending {}", message.text);
        let record = LogRecord::new(self.config.id, severity, text);
        self.push_log(record.packet(message.typ, Direction::Out));
        if after.is_some() {
            self.awaiting += 1;
        }
        self.push(Action::Send { message, after });
    }

    /// Queues a record for the log stream, debug records only with the channel debug flag.
    pub fn log(&mut self, severity: Severity, text: impl Into<String>) {
        self.push_log(LogRecord::new(self.config.id, severity, text));
    }

    fn log_packet(&mut self, severity: Severity, typ: FmtpType, text: String) {
        let record = LogRecord::new(self.config.id, severity, text);
        self.push_log(record.packet(typ, Direction::In));
    }

    fn push_log(&mut self, record: LogRecord) {
        if record.severity == Severity::Debug && !self.config.debug {
            record.trace();
        } else {
            self.push(Action::Log(record));
        }
    }

    #[must_use]
    pub fn status(&self) -> ChannelStatus {
        ChannelStatus {
            channel_id: self.config.id,
            local_name: self.config.local_name.clone(),
            remote_name: self.config.remote_name.clone(),
            daemon_state: match self.state {
                FmtpState::DataReady => DaemonState::Ok,
                FmtpState::Disabled => DaemonState::Stopped,
                _ => DaemonState::Error,
            },
            fmtp_state: self.state.to_string(),
            channel_url: self.config.url(),
        }
    }
}
