//! Sans-IO core of the Flight Message Transfer Protocol (FMTP).
//!
//! [`Channel`] owns the protocol state of one association. Timer expiries,
//! transport notifications, received messages and application [`Command`]s go
//! in, [`Action`]s come out. Packet framing lives in [`packet`] and
//! [`ReceiveBuffer`].

mod actions;
mod buffer;
mod channel;
mod config;
mod error;
mod event;
mod log;
mod message;
pub mod packet;
mod state;

pub use actions::{Action, TimerKind};
pub use buffer::{Frame, ReceiveBuffer};
pub use channel::{Channel, Target};
pub use config::{ChannelConfig, ChannelSettings, Endpoint, InitialState, Role};
pub use error::Error;
pub use event::{Command, FmtpEvent};
pub use log::{ChannelStatus, DaemonState, Direction, LogRecord, Severity};
pub use message::{DataEncoding, FmtpMessage};
pub use packet::{FmtpPacketHeader, FmtpType, HEADER_LEN, MAX_PACKET_LEN, encode};
pub use state::{FmtpState, StateMachine};
