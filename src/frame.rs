//! CAN frame representation.

use std::fmt;

/// Number of distinct frame identifiers (standard 11-bit CAN, padded to 4096).
pub const MAX_FRAME_IDS: usize = 4096;

/// Maximum CAN payload length in bytes.
pub const MAX_PAYLOAD: usize = 8;

/// One discrete bus frame: declared length plus a fixed 8-byte payload.
///
/// The payload is always zero-padded beyond `len`, so decode paths can
/// index the full 8-byte window without bounds checks. Frames are
/// immutable once built; a new frame for the same identifier replaces the
/// previous one wholesale in the [`FrameStore`](crate::store::FrameStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Declared payload length (0-8).
    pub len: u8,
    /// Payload bytes, zero-padded beyond `len`.
    pub data: [u8; MAX_PAYLOAD],
}

impl Frame {
    /// Build a frame from the first `len` bytes of `payload`.
    ///
    /// `len` is clamped to 8; bytes beyond it are zeroed.
    pub fn new(len: u8, payload: &[u8]) -> Self {
        let len = len.min(MAX_PAYLOAD as u8);
        let mut data = [0u8; MAX_PAYLOAD];
        let n = (len as usize).min(payload.len());
        data[..n].copy_from_slice(&payload[..n]);
        Self { len, data }
    }

    /// The declared payload bytes (first `len` bytes of the buffer).
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self { len: 0, data: [0u8; MAX_PAYLOAD] }
    }
}

/// Uppercase hex dump of the declared payload, e.g. `Len: 2 Data: 2A00`.
///
/// This is the raw fallback rendering callers use when
/// [`Database::decode`](crate::database::Database::decode) reports an
/// unrecognized identifier.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Len: {} Data: ", self.len)?;
        for byte in self.payload() {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_zero_padded() {
        let frame = Frame::new(3, &[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(frame.len, 3);
        assert_eq!(frame.payload(), &[0xAA, 0xBB, 0xCC]);
        assert_eq!(&frame.data[3..], &[0, 0, 0, 0, 0]);
    }

    #[test]
    fn oversized_len_is_clamped() {
        let frame = Frame::new(12, &[0xFF; 12]);
        assert_eq!(frame.len, 8);
        assert_eq!(frame.payload().len(), 8);
    }

    #[test]
    fn short_payload_slice_is_honored() {
        // Declared length longer than the supplied slice: missing bytes stay zero.
        let frame = Frame::new(4, &[0x11, 0x22]);
        assert_eq!(frame.payload(), &[0x11, 0x22, 0x00, 0x00]);
    }

    #[test]
    fn display_is_uppercase_hex() {
        let frame = Frame::new(2, &[0x2A, 0x0F]);
        assert_eq!(frame.to_string(), "Len: 2 Data: 2A0F");
    }
}
