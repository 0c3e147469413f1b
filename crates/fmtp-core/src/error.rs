/// Errors produced by the FMTP core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("data type must not be empty")]
    EmptyDataType,

    #[error("network role must be `server` or `client`, got `{0}`")]
    InvalidRole(String),

    #[error("{0} must not be empty")]
    EmptyName(&'static str),

    #[error("Ts ({ts}s) must be non-zero and lower than Tr ({tr}s)")]
    InvalidTimers { ts: u64, tr: u64 },

    #[error("{0} must be at least one second")]
    ZeroInterval(&'static str),

    #[error("{field} {port} is outside of 2001..=65534")]
    InvalidPort { field: &'static str, port: u32 },

    #[error("remote address must not be empty for a client channel")]
    EmptyRemoteAddress,

    #[error("required client ip `{0}` is not an ip address")]
    InvalidClientIp(String),

    #[error("data encoding must not be empty")]
    EmptyEncoding,

    #[error("unsupported data encoding `{0}`, expected UTF-8 or Windows-1251")]
    UnsupportedEncoding(String),

    #[error("payload of {0} bytes does not fit into a single FMTP packet")]
    PayloadTooLong(usize),

    #[error("invalid FMTP header {0:02x?}")]
    InvalidHeader([u8; 5]),

    #[error("event {event} from {state} leads to both {first} and {second}")]
    AmbiguousTransition {
        state: crate::FmtpState,
        event: crate::FmtpEvent,
        first: crate::FmtpState,
        second: crate::FmtpState,
    },
}
