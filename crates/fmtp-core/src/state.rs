use std::{collections::HashMap, fmt::Display};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{Error, FmtpEvent, Role};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FmtpState {
    Idle,
    ConnectionPending,
    SystemIdPending,
    IdPending,
    Ready,
    AssociationPending,
    DataReady,
    Disabled,
}

impl FmtpState {
    pub const ALL: [Self; 8] = [
        Self::Idle,
        Self::ConnectionPending,
        Self::SystemIdPending,
        Self::IdPending,
        Self::Ready,
        Self::AssociationPending,
        Self::DataReady,
        Self::Disabled,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::ConnectionPending => "CONNECTION_PENDING",
            Self::SystemIdPending => "SYSTEM_ID_PENDING",
            Self::IdPending => "ID_PENDING",
            Self::Ready => "READY",
            Self::AssociationPending => "ASSOCIATION_PENDING",
            Self::DataReady => "DATA_READY",
            Self::Disabled => "DISABLED",
        }
    }
}

impl Display for FmtpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(from, to, events)`: each event moves `from` to `to`.
type Row = (FmtpState, FmtpState, &'static [FmtpEvent]);

use FmtpEvent::{
    LData, LDisconnect, LSetup, LShutdown, LStartup, RAccept, RData, RDisconnect, RHeartbeat,
    RIdInvalid, RIdValid, RReject, RSetup, RShutdown, RStartup, TiTimeout, TrTimeout, TsTimeout,
};
use FmtpState::{
    AssociationPending, ConnectionPending, DataReady, IdPending, Idle, Ready, SystemIdPending,
};

const CLIENT_ROWS: &[Row] = &[
    (Idle, ConnectionPending, &[LSetup]),
    (Idle, Idle, &[LDisconnect, RDisconnect]),
    (ConnectionPending, IdPending, &[RSetup]),
    (
        ConnectionPending,
        Idle,
        &[
            LDisconnect,
            RDisconnect,
            LData,
            LShutdown,
            LStartup,
            RData,
            RAccept,
            RReject,
            RHeartbeat,
            RShutdown,
            RStartup,
            TiTimeout,
        ],
    ),
    (IdPending, Ready, &[RIdValid]),
    (
        IdPending,
        Idle,
        &[
            LDisconnect,
            RDisconnect,
            RReject,
            RAccept,
            RIdInvalid,
            RData,
            RHeartbeat,
            RShutdown,
            RStartup,
            TiTimeout,
            LData,
            LShutdown,
            LStartup,
        ],
    ),
];

const SERVER_ROWS: &[Row] = &[
    (Idle, SystemIdPending, &[RSetup]),
    (Idle, Idle, &[LDisconnect, RDisconnect]),
    (SystemIdPending, IdPending, &[RIdValid]),
    (
        SystemIdPending,
        Idle,
        &[
            LDisconnect,
            RDisconnect,
            RAccept,
            RReject,
            TiTimeout,
            RData,
            RIdInvalid,
            RHeartbeat,
            RShutdown,
            RStartup,
        ],
    ),
    (SystemIdPending, SystemIdPending, &[RSetup]),
    (IdPending, Ready, &[RAccept]),
    (
        IdPending,
        Idle,
        &[
            LDisconnect,
            RDisconnect,
            RData,
            RReject,
            RHeartbeat,
            RShutdown,
            RStartup,
            TiTimeout,
        ],
    ),
];

const COMMON_ROWS: &[Row] = &[
    (Ready, AssociationPending, &[LStartup]),
    (Ready, Idle, &[LDisconnect, RDisconnect]),
    (Ready, Ready, &[LShutdown]),
    (AssociationPending, Ready, &[LShutdown]),
    (AssociationPending, DataReady, &[RStartup]),
    (AssociationPending, Idle, &[LDisconnect, RDisconnect]),
    // Tr drives the STARTUP resend while waiting for the peer
    (
        AssociationPending,
        AssociationPending,
        &[TiTimeout, TrTimeout],
    ),
    (DataReady, AssociationPending, &[RShutdown]),
    (DataReady, Ready, &[LShutdown]),
    (DataReady, Idle, &[LDisconnect, RDisconnect, TrTimeout]),
    (DataReady, DataReady, &[LData, RData, RHeartbeat, TsTimeout]),
];

/// Deterministic `(state, event) -> state` lookup for one [`Role`].
#[derive(Clone, Debug)]
pub struct StateMachine {
    role: Role,
    transitions: HashMap<(FmtpState, FmtpEvent), FmtpState>,
}

impl StateMachine {
    /// Builds the role specific table followed by the common suffix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AmbiguousTransition`] if one `(state, event)` pair names two destinations.
    pub fn new(role: Role) -> Result<Self, Error> {
        let prefix = match role {
            Role::Client => CLIENT_ROWS,
            Role::Server => SERVER_ROWS,
        };
        Self::from_rows(role, prefix.iter().chain(COMMON_ROWS))
    }

    fn from_rows<'a>(role: Role, rows: impl IntoIterator<Item = &'a Row>) -> Result<Self, Error> {
        let mut transitions = HashMap::new();
        for &(from, to, events) in rows {
            for &event in events {
                if let Some(&first) = transitions.get(&(from, event))
                    && first != to
                {
                    return Err(Error::AmbiguousTransition {
                        state: from,
                        event,
                        first,
                        second: to,
                    });
                }
                transitions.insert((from, event), to);
            }
        }
        trace!(
            "{role:?} state machine with {} transitions",
            transitions.len()
        );
        Ok(Self { role, transitions })
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// `None` means the event is ignored in `state`, which is not an error.
    #[must_use]
    pub fn next_state(&self, state: FmtpState, event: FmtpEvent) -> Option<FmtpState> {
        self.transitions.get(&(state, event)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_deterministic() {
        for role in [Role::Client, Role::Server] {
            let first = StateMachine::new(role).unwrap();
            let second = StateMachine::new(role).unwrap();
            for state in FmtpState::ALL {
                for event in FmtpEvent::ALL {
                    let next = first.next_state(state, event);
                    assert_eq!(next, first.next_state(state, event));
                    assert_eq!(next, second.next_state(state, event));
                }
            }
        }
    }

    #[test]
    fn unregistered_pairs_are_ignored() {
        let client = StateMachine::new(Role::Client).unwrap();
        assert_eq!(client.next_state(Idle, RHeartbeat), None);
        assert_eq!(client.next_state(Idle, RSetup), None);
        assert_eq!(client.next_state(DataReady, RStartup), None);
        for event in FmtpEvent::ALL {
            assert_eq!(client.next_state(FmtpState::Disabled, event), None);
        }
    }

    #[test]
    fn roles_differ_in_connection_prefix() {
        let client = StateMachine::new(Role::Client).unwrap();
        let server = StateMachine::new(Role::Server).unwrap();

        assert_eq!(client.next_state(Idle, LSetup), Some(ConnectionPending));
        assert_eq!(server.next_state(Idle, LSetup), None);
        assert_eq!(server.next_state(Idle, RSetup), Some(SystemIdPending));
        assert_eq!(client.next_state(IdPending, RIdValid), Some(Ready));
        assert_eq!(server.next_state(IdPending, RIdValid), None);
        assert_eq!(server.next_state(IdPending, RAccept), Some(Ready));
        assert_eq!(client.next_state(IdPending, RAccept), Some(Idle));
        assert_eq!(client.next_state(SystemIdPending, RIdValid), None);
    }

    #[test]
    fn roles_share_association_suffix() {
        let client = StateMachine::new(Role::Client).unwrap();
        let server = StateMachine::new(Role::Server).unwrap();
        for state in [Ready, AssociationPending, DataReady] {
            for event in FmtpEvent::ALL {
                assert_eq!(
                    client.next_state(state, event),
                    server.next_state(state, event),
                    "{state} on {event}"
                );
            }
        }
        assert_eq!(
            client.next_state(AssociationPending, TrTimeout),
            Some(AssociationPending)
        );
        assert_eq!(client.next_state(DataReady, TrTimeout), Some(Idle));
    }

    #[test]
    fn rejects_ambiguous_rows() {
        let rows: &[Row] = &[
            (Idle, ConnectionPending, &[LSetup]),
            (Idle, Idle, &[LDisconnect, LSetup]),
        ];
        let expected = Error::AmbiguousTransition {
            state: Idle,
            event: LSetup,
            first: ConnectionPending,
            second: Idle,
        };
        let error = StateMachine::from_rows(Role::Client, rows).unwrap_err();
        assert_eq!(error, expected);
    }

    #[test]
    fn duplicate_rows_with_same_destination_are_fine() {
        let rows: &[Row] = &[(Idle, Idle, &[LDisconnect]), (Idle, Idle, &[LDisconnect])];
        assert!(StateMachine::from_rows(Role::Server, rows).is_ok());
    }
}
