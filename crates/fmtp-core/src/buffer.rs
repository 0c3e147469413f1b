use crate::{Error, FmtpPacketHeader, FmtpType, HEADER_LEN};

/// A complete packet cut out of the receive stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub typ: FmtpType,
    pub body: Vec<u8>,
}

/// Accumulates TCP reads and cuts them into FMTP packets.
///
/// Partial headers and bodies stay buffered until the next [`ReceiveBuffer::extend`].
/// An invalid header costs exactly one byte, after which framing restarts at the
/// following byte.
#[derive(Clone, Debug, Default)]
pub struct ReceiveBuffer {
    bytes: Vec<u8>,
}

impl ReceiveBuffer {
    pub fn extend(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Returns the next complete frame, `Ok(None)` if more bytes are needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] after discarding the first buffered byte.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        let Some(head) = self.bytes.first_chunk::<HEADER_LEN>() else {
            return Ok(None);
        };
        let header = FmtpPacketHeader::decode(head);
        if !header.is_valid() {
            let raw = *head;
            self.bytes.remove(0);
            return Err(Error::InvalidHeader(raw));
        }

        let end = HEADER_LEN + header.body_len();
        if self.bytes.len() < end {
            return Ok(None);
        }
        let body = self.bytes[HEADER_LEN..end].to_vec();
        self.bytes.drain(..end);
        Ok(Some(Frame {
            typ: header.typ,
            body,
        }))
    }
}
