use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::ChannelSettings;

/// Events that drive the FMTP state machine.
///
/// `L*` events are local service primitives, `R*` events are observed on the
/// connection to the remote system and `T*` events are timer expiries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FmtpEvent {
    /// Request to establish an FMTP connection (MT-CON service primitive)
    LSetup,
    /// Request to stop an existing FMTP Association and release the underlying
    /// connection (MT-DIS service primitive)
    LDisconnect,
    /// Request to stop an existing FMTP Association without releasing the
    /// underlying connection (MT-STOP service primitive)
    LShutdown,
    /// Request to establish an FMTP Association (MT-ASSOC service primitive)
    LStartup,
    /// Data transfer requested by user (MT-DATA service primitive)
    LData,

    /// A TCP transport connection establishment indication has been received
    RSetup,
    /// A TCP transport connection release indication has been received
    RDisconnect,
    /// An Operational or Operator message has been received
    RData,
    /// An ACCEPT identification message has been received
    RAccept,
    /// A REJECT identification message has been received
    RReject,
    /// An identification message with the expected value has been received
    RIdValid,
    /// An identification message which fails validation has been received
    RIdInvalid,
    /// A HEARTBEAT message has been received
    RHeartbeat,
    /// A SHUTDOWN message has been received
    RShutdown,
    /// A STARTUP message has been received
    RStartup,

    /// Timer Ts (send heartbeat) has expired
    TsTimeout,
    /// Timer Tr (receive supervision) has expired
    TrTimeout,
    /// Timer Ti (identification supervision) has expired
    TiTimeout,
}

impl FmtpEvent {
    pub const ALL: [Self; 18] = [
        Self::LSetup,
        Self::LDisconnect,
        Self::LShutdown,
        Self::LStartup,
        Self::LData,
        Self::RSetup,
        Self::RDisconnect,
        Self::RData,
        Self::RAccept,
        Self::RReject,
        Self::RIdValid,
        Self::RIdInvalid,
        Self::RHeartbeat,
        Self::RShutdown,
        Self::RStartup,
        Self::TsTimeout,
        Self::TrTimeout,
        Self::TiTimeout,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LSetup => "L_SETUP",
            Self::LDisconnect => "L_DISCONNECT",
            Self::LShutdown => "L_SHUTDOWN",
            Self::LStartup => "L_STARTUP",
            Self::LData => "L_DATA",
            Self::RSetup => "R_SETUP",
            Self::RDisconnect => "R_DISCONNECT",
            Self::RData => "R_DATA",
            Self::RAccept => "R_ACCEPT",
            Self::RReject => "R_REJECT",
            Self::RIdValid => "R_ID_VALID",
            Self::RIdInvalid => "R_ID_INVALID",
            Self::RHeartbeat => "R_HEARTBEAT",
            Self::RShutdown => "R_SHUTDOWN",
            Self::RStartup => "R_STARTUP",
            Self::TsTimeout => "TS_TIMEOUT",
            Self::TrTimeout => "TR_TIMEOUT",
            Self::TiTimeout => "TI_TIMEOUT",
        }
    }
}

impl Display for FmtpEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands issued by the application above the channel.
#[derive(Debug)]
pub enum Command {
    /// Transmit an Operational message, only honored in DATA_READY.
    Data(String),
    /// Establish the association (MT-ASSOC).
    Startup,
    /// Stop the association, keep the connection (MT-STOP).
    Shutdown,
    /// Stop the association and release the connection (MT-DIS).
    Disconnect,
    /// Force the channel into DISABLED.
    Disable,
    /// Leave DISABLED and reconnect.
    Enable,
    /// Apply new settings to the running channel.
    Reconfigure(Box<ChannelSettings>),
}
