use std::{borrow::Cow, fmt::Display};

use encoding_rs::{Encoding, UTF_8, WINDOWS_1251};

use crate::{Error, FmtpType, packet};

/// A packet type plus its text payload, before framing and transcoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FmtpMessage {
    pub typ: FmtpType,
    pub text: String,
}

impl FmtpMessage {
    pub const SHUTDOWN: &str = "00";
    pub const STARTUP: &str = "01";
    pub const HEARTBEAT: &str = "03";
    pub const ACCEPT: &str = "ACCEPT";
    pub const REJECT: &str = "REJECT";

    pub fn new(typ: FmtpType, text: impl Into<String>) -> Self {
        Self {
            typ,
            text: text.into(),
        }
    }

    pub fn operational(text: impl Into<String>) -> Self {
        Self::new(FmtpType::Operational, text)
    }

    #[must_use]
    pub fn startup() -> Self {
        Self::new(FmtpType::System, Self::STARTUP)
    }
    #[must_use]
    pub fn shutdown() -> Self {
        Self::new(FmtpType::System, Self::SHUTDOWN)
    }
    #[must_use]
    pub fn heartbeat() -> Self {
        Self::new(FmtpType::System, Self::HEARTBEAT)
    }
    #[must_use]
    pub fn accept() -> Self {
        Self::new(FmtpType::Identification, Self::ACCEPT)
    }
    #[must_use]
    pub fn reject() -> Self {
        Self::new(FmtpType::Identification, Self::REJECT)
    }

    /// Identification message sent by `local` to `remote`.
    ///
    /// The peer is expected to send `identification(remote, local)`.
    #[must_use]
    pub fn identification(local: &str, remote: &str) -> Self {
        Self::new(FmtpType::Identification, format!("{local}-{remote}"))
    }

    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.typ == FmtpType::System && self.text == Self::HEARTBEAT
    }

    /// Transcodes and frames the message for the wire.
    ///
    /// # Errors
    ///
    /// Fails if the encoded text does not fit into one packet.
    pub fn to_bytes(&self, encoding: DataEncoding) -> Result<Vec<u8>, Error> {
        packet::encode(self.typ, &encoding.encode(&self.text))
    }
}

impl Display for FmtpMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.typ, self.text)
    }
}

/// Text encoding used for payloads on the wire.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataEncoding {
    Utf8,
    Windows1251,
}

impl DataEncoding {
    /// Resolves an encoding label such as `UTF-8`, `utf8`, `windows-1251` or `cp1251`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedEncoding`] for labels of any other encoding.
    pub fn from_label(label: &str) -> Result<Self, Error> {
        match Encoding::for_label(label.trim().as_bytes()) {
            Some(e) if e == UTF_8 => Ok(Self::Utf8),
            Some(e) if e == WINDOWS_1251 => Ok(Self::Windows1251),
            _ => Err(Error::UnsupportedEncoding(label.to_string())),
        }
    }

    fn encoding(self) -> &'static Encoding {
        match self {
            Self::Utf8 => UTF_8,
            Self::Windows1251 => WINDOWS_1251,
        }
    }

    /// Unmappable characters are replaced with numeric character references.
    #[must_use]
    pub fn encode(self, text: &str) -> Cow<'_, [u8]> {
        self.encoding().encode(text).0
    }

    /// Malformed sequences are replaced with U+FFFD.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> String {
        self.encoding()
            .decode_without_bom_handling(bytes)
            .0
            .into_owned()
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        self.encoding().name()
    }
}
