//! Side effects of state transitions.
//!
//! The exit action of the old state runs first, then the state changes, then
//! the entry action of the new state runs. Self-transitions run both.

use crate::{Channel, FmtpEvent, FmtpMessage, FmtpState, LogRecord, Role, Target};

/// The three protocol timers plus the client's reconnect delay.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Send supervision, a HEARTBEAT is due on expiry
    Ts,
    /// Receive supervision
    Tr,
    /// Identification supervision
    Ti,
    Reconnect,
}

impl TimerKind {
    pub const ALL: [Self; 4] = [Self::Ts, Self::Tr, Self::Ti, Self::Reconnect];

    /// Protocol event raised on expiry, the reconnect timer raises none.
    #[must_use]
    pub fn expiry_event(self) -> Option<FmtpEvent> {
        match self {
            Self::Ts => Some(FmtpEvent::TsTimeout),
            Self::Tr => Some(FmtpEvent::TrTimeout),
            Self::Ti => Some(FmtpEvent::TiTimeout),
            Self::Reconnect => None,
        }
    }
}

/// Work the runtime has to carry out for the channel, in queue order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Transmit `message`, then feed `after` back through [`Channel::sent`].
    Send {
        message: FmtpMessage,
        after: Option<FmtpEvent>,
    },
    RestartTimer(TimerKind),
    StopTimer(TimerKind),
    /// Drop any connection and connect (client) or listen (server) again.
    Reconnect,
    /// Close the current connection after flushing queued packets.
    Disconnect,
    /// Close the connection and stay offline (no listening) until the next [`Action::Reconnect`].
    Halt,
    /// Apply [`Channel::config`] to timers and transport.
    Reconfigure,
    /// Hand a received payload to the application.
    Deliver(FmtpMessage),
    Log(LogRecord),
}

impl Channel {
    fn own_identification(&self) -> FmtpMessage {
        FmtpMessage::identification(&self.config.local_atc, &self.config.remote_atc)
    }

    fn timer(&mut self, restart: bool, timer: TimerKind) {
        self.push(if restart {
            Action::RestartTimer(timer)
        } else {
            Action::StopTimer(timer)
        });
    }

    pub(crate) fn enter(&mut self, state: FmtpState, event: Option<FmtpEvent>) {
        match state {
            FmtpState::Idle => match self.config.role {
                Role::Client => self.timer(true, TimerKind::Reconnect),
                Role::Server => self.push(Action::Disconnect),
            },
            FmtpState::ConnectionPending => {
                self.send(self.own_identification(), Some(FmtpEvent::RSetup));
            }
            FmtpState::SystemIdPending | FmtpState::IdPending => {
                self.timer(true, TimerKind::Ti);
            }
            FmtpState::Ready => {
                if self.target == Target::DataReady {
                    self.send(FmtpMessage::startup(), Some(FmtpEvent::LStartup));
                }
            }
            FmtpState::AssociationPending | FmtpState::DataReady => (),
            FmtpState::Disabled => {
                for timer in TimerKind::ALL {
                    self.timer(false, timer);
                }
                self.push(Action::Halt);
            }
        }
        tracing::trace!("entered {state} on {event:?}");
    }

    pub(crate) fn exit(&mut self, state: FmtpState, event: FmtpEvent) {
        use FmtpEvent::{
            LData, LDisconnect, LShutdown, LStartup, RData, RDisconnect, RHeartbeat, RIdInvalid,
            RIdValid, RShutdown, RStartup, TrTimeout, TsTimeout,
        };

        match state {
            FmtpState::Idle => self.timer(false, TimerKind::Reconnect),
            FmtpState::SystemIdPending => {
                if event == RIdValid {
                    self.send(self.own_identification(), None);
                    self.timer(true, TimerKind::Ti);
                } else {
                    self.timer(false, TimerKind::Ti);
                }
            }
            FmtpState::IdPending => {
                match event {
                    RIdValid => self.send(FmtpMessage::accept(), None),
                    RIdInvalid => self.send(FmtpMessage::reject(), None),
                    _ => (),
                }
                self.timer(false, TimerKind::Ti);
            }
            FmtpState::Ready => {
                if event == LStartup {
                    self.timer(true, TimerKind::Tr);
                }
            }
            FmtpState::AssociationPending => match event {
                LDisconnect | LShutdown => {
                    self.send(FmtpMessage::shutdown(), None);
                    self.timer(false, TimerKind::Tr);
                }
                TrTimeout => {
                    self.send(FmtpMessage::startup(), Some(LStartup));
                    self.timer(true, TimerKind::Tr);
                }
                RStartup => {
                    self.send(FmtpMessage::startup(), None);
                    self.timer(true, TimerKind::Tr);
                    self.timer(true, TimerKind::Ts);
                }
                _ => self.timer(false, TimerKind::Tr),
            },
            FmtpState::DataReady => match event {
                LDisconnect | LShutdown => {
                    self.send(FmtpMessage::shutdown(), None);
                    self.timer(false, TimerKind::Tr);
                    self.timer(false, TimerKind::Ts);
                }
                RDisconnect | TrTimeout => {
                    self.timer(false, TimerKind::Tr);
                    self.timer(false, TimerKind::Ts);
                }
                LData => self.timer(true, TimerKind::Ts),
                TsTimeout => {
                    self.send(FmtpMessage::heartbeat(), None);
                    self.timer(true, TimerKind::Ts);
                }
                RData | RHeartbeat => self.timer(true, TimerKind::Tr),
                RShutdown => {
                    self.timer(false, TimerKind::Ts);
                    self.timer(true, TimerKind::Tr);
                }
                _ => (),
            },
            FmtpState::ConnectionPending | FmtpState::Disabled => (),
        }
    }
}
