use std::fmt::Display;

use serde::{Deserialize, Serialize};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, big_endian::U16};

use crate::Error;

/// Protocol version carried in the first header byte.
pub const FMTP_VERSION: u8 = 0x02;
/// Value of the reserved header byte.
pub const FMTP_RESERVED: u8 = 0x00;
/// Size of the fixed FMTP header in bytes.
pub const HEADER_LEN: usize = 5;
/// Exclusive upper bound of the header length field.
pub const MAX_PACKET_LEN: usize = 65530;

/// FMTP packet type, wire codes are 1-based in declaration order.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FmtpType {
    Operational = 1,
    Operator,
    Identification,
    System,
    Status,
    Unknown,
}

impl FmtpType {
    /// Maps a wire code to a packet type, unmapped codes become [`FmtpType::Unknown`].
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Operational,
            2 => Self::Operator,
            3 => Self::Identification,
            4 => Self::System,
            5 => Self::Status,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl Display for FmtpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RawHeader {
    version: u8,
    reserved: u8,
    length: U16,
    typ: u8,
}

/// A decoded FMTP header.
///
/// Decoding never fails, a malformed header is reported through [`FmtpPacketHeader::is_valid`]
/// and its body must not be read.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FmtpPacketHeader {
    pub version: u8,
    pub reserved: u8,
    /// Total packet length, header included.
    pub length: u16,
    pub typ: FmtpType,
    valid: bool,
}

impl FmtpPacketHeader {
    #[must_use]
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Self {
        let raw: RawHeader = zerocopy::transmute!(*bytes);
        let length = raw.length.get();
        let typ = FmtpType::from_code(raw.typ);
        let valid = raw.version == FMTP_VERSION
            && raw.reserved == FMTP_RESERVED
            && typ != FmtpType::Unknown
            && usize::from(length) > HEADER_LEN
            && usize::from(length) < MAX_PACKET_LEN;

        Self {
            version: raw.version,
            reserved: raw.reserved,
            length,
            typ,
            valid,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[must_use]
    pub fn body_len(&self) -> usize {
        usize::from(self.length).saturating_sub(HEADER_LEN)
    }
}

/// Frames `body` behind an FMTP header of type `typ`.
///
/// # Errors
///
/// Returns [`Error::PayloadTooLong`] if the packet length would reach [`MAX_PACKET_LEN`].
pub fn encode(typ: FmtpType, body: &[u8]) -> Result<Vec<u8>, Error> {
    let length = HEADER_LEN + body.len();
    let length = u16::try_from(length)
        .ok()
        .filter(|l| usize::from(*l) < MAX_PACKET_LEN)
        .ok_or(Error::PayloadTooLong(body.len()))?;

    let header = RawHeader {
        version: FMTP_VERSION,
        reserved: FMTP_RESERVED,
        length: length.into(),
        typ: typ.code(),
    };
    let mut packet = Vec::with_capacity(usize::from(length));
    packet.extend_from_slice(header.as_bytes());
    packet.extend_from_slice(body);
    Ok(packet)
}
