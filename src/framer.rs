//! ASCII line-protocol framer.
//!
//! Reconstructs discrete frames from the wire format `t<III><L><DD...>\r`:
//! `III` is a 3-digit hex identifier (0-0xFFF), `L` a single hex digit
//! payload length, followed by `L` hex byte pairs and a carriage return.
//! There is no checksum. The state machine is intentionally forgiving:
//! the byte stream comes off a live serial or network link subject to
//! noise and partial reads, so malformed input silently resets the
//! machine instead of surfacing an error.
//!
//! Parser state persists across [`Framer::feed`] calls, so a frame split
//! across two read chunks is reassembled transparently.

use std::sync::Arc;

use tracing::trace;

use crate::frame::MAX_PAYLOAD;
use crate::store::FrameStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    WaitStart,
    Id,
    Len,
    DataHigh,
    DataLow,
    End,
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Byte-at-a-time frame reassembler feeding a [`FrameStore`].
pub struct Framer {
    store: Arc<FrameStore>,
    state: ParseState,
    id: u16,
    id_digits: u8,
    len: u8,
    payload: [u8; MAX_PAYLOAD],
    index: u8,
}

impl Framer {
    /// Create a framer dispatching completed frames into `store`.
    pub fn new(store: Arc<FrameStore>) -> Self {
        Self {
            store,
            state: ParseState::WaitStart,
            id: 0,
            id_digits: 0,
            len: 0,
            payload: [0u8; MAX_PAYLOAD],
            index: 0,
        }
    }

    /// Consume a chunk of wire bytes, dispatching every completed frame.
    ///
    /// Returns the number of frames dispatched from this chunk.
    pub fn feed(&mut self, data: &[u8]) -> usize {
        let mut dispatched = 0;
        for &byte in data {
            if self.push_byte(byte) {
                dispatched += 1;
            }
        }
        dispatched
    }

    /// Advance the state machine by one byte. Returns true when the byte
    /// completed a frame that was dispatched to the store.
    fn push_byte(&mut self, byte: u8) -> bool {
        match self.state {
            ParseState::WaitStart => {
                if byte == b't' {
                    self.id = 0;
                    self.id_digits = 0;
                    self.state = ParseState::Id;
                }
            }
            ParseState::Id => match hex_value(byte) {
                Some(digit) => {
                    self.id = (self.id << 4) | u16::from(digit);
                    self.id_digits += 1;
                    if self.id_digits == 3 {
                        self.state = ParseState::Len;
                    }
                }
                None => self.state = ParseState::WaitStart,
            },
            ParseState::Len => match hex_value(byte) {
                // Payloads are capped at 8 bytes; length digits 9-F can
                // only come from a corrupt line, so treat them as
                // malformed instead of overrunning the payload buffer.
                Some(digit) if digit as usize <= MAX_PAYLOAD => {
                    self.len = digit;
                    self.index = 0;
                    self.state = if digit == 0 { ParseState::End } else { ParseState::DataHigh };
                }
                _ => self.state = ParseState::WaitStart,
            },
            ParseState::DataHigh => match hex_value(byte) {
                Some(digit) => {
                    self.payload[self.index as usize] = digit << 4;
                    self.state = ParseState::DataLow;
                }
                None => self.state = ParseState::WaitStart,
            },
            ParseState::DataLow => match hex_value(byte) {
                Some(digit) => {
                    self.payload[self.index as usize] |= digit;
                    self.index += 1;
                    self.state = if self.index == self.len {
                        ParseState::End
                    } else {
                        ParseState::DataHigh
                    };
                }
                None => self.state = ParseState::WaitStart,
            },
            ParseState::End => {
                self.state = ParseState::WaitStart;
                if byte == b'\r' {
                    trace!(id = self.id, len = self.len, "frame dispatched");
                    self.store.store(self.id, self.len, &self.payload[..self.len as usize]);
                    return true;
                }
                // A missing terminator drops the frame silently.
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framer() -> (Framer, Arc<FrameStore>) {
        let store = Arc::new(FrameStore::new());
        (Framer::new(Arc::clone(&store)), store)
    }

    #[test]
    fn well_formed_line_dispatches() {
        let (mut framer, store) = framer();
        assert_eq!(framer.feed(b"t0642" as &[u8]), 0);
        assert_eq!(framer.feed(b"2A00\r"), 1);
        let frame = store.read(0x064).expect("frame stored");
        assert_eq!(frame.len, 2);
        assert_eq!(frame.payload(), &[0x2A, 0x00]);
    }

    #[test]
    fn full_length_line_fills_all_eight_bytes() {
        let (mut framer, store) = framer();
        assert_eq!(framer.feed(b"t10081122AABBCCDDEEFF\r"), 1);
        let frame = store.read(0x100).expect("frame stored");
        assert_eq!(frame.len, 8);
        assert_eq!(frame.data, [0x11, 0x22, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    }

    #[test]
    fn zero_length_line_skips_data_states() {
        let (mut framer, store) = framer();
        assert_eq!(framer.feed(b"t5830\r"), 1);
        let frame = store.read(0x583).expect("frame stored");
        assert_eq!(frame.len, 0);
        assert_eq!(frame.payload(), &[] as &[u8]);
    }

    #[test]
    fn invalid_hex_mid_frame_drops_only_that_frame() {
        let (mut framer, store) = framer();
        // 'G' aborts the first attempt; the following line must still frame.
        assert_eq!(framer.feed(b"t123412G4\rt2401FF\r"), 1);
        assert_eq!(store.read(0x123), None);
        assert_eq!(store.read(0x240).expect("second frame").payload(), &[0xFF]);
    }

    #[test]
    fn missing_terminator_drops_the_frame() {
        let (mut framer, store) = framer();
        assert_eq!(framer.feed(b"t1101AAXt1101BB\r"), 1);
        // Only the terminated line lands.
        assert_eq!(store.read(0x110).expect("frame stored").payload(), &[0xBB]);
    }

    #[test]
    fn length_digits_above_eight_reset_the_machine() {
        let (mut framer, store) = framer();
        // Declared length 9 is unrepresentable in an 8-byte payload.
        assert_eq!(framer.feed(b"t1239112233445566778899\r"), 0);
        assert_eq!(store.read(0x123), None);
        // The machine must have recovered for the next line.
        assert_eq!(framer.feed(b"t12311A\r"), 1);
        assert_eq!(store.read(0x123).expect("frame stored").payload(), &[0x1A]);
    }

    #[test]
    fn extra_data_byte_before_terminator_drops_the_frame() {
        let (mut framer, store) = framer();
        // Declared length 1 but two data bytes supplied: the terminator
        // check sees a hex digit and the whole line is dropped.
        assert_eq!(framer.feed(b"t5801102\r"), 0);
        assert_eq!(store.read(0x580), None);
        assert_eq!(framer.feed(b"t580102\r"), 1);
        assert_eq!(store.read(0x580).expect("frame stored").payload(), &[0x02]);
    }

    #[test]
    fn truncated_payload_never_dispatches() {
        let (mut framer, store) = framer();
        // Declared length 8, only 6 data bytes before the terminator: the
        // '\r' lands mid-payload and aborts the line.
        assert_eq!(framer.feed(b"t10081122AABBCCDD\r"), 0);
        assert_eq!(store.read(0x100), None);
        assert_eq!(framer.feed(b"t1002FFEE\r"), 1);
        assert_eq!(store.read(0x100).expect("frame stored").payload(), &[0xFF, 0xEE]);
    }

    #[test]
    fn frames_split_across_chunks_are_reassembled() {
        let (mut framer, store) = framer();
        let line = b"t2432DEAD\r";
        for &byte in line.iter() {
            framer.feed(&[byte]);
        }
        assert_eq!(store.read(0x243).expect("frame stored").payload(), &[0xDE, 0xAD]);
    }

    #[test]
    fn noise_between_frames_is_ignored() {
        let (mut framer, store) = framer();
        assert_eq!(framer.feed(b"\n\x00garbage t1101CC\rmore"), 1);
        assert_eq!(store.read(0x110).expect("frame stored").payload(), &[0xCC]);
    }

    #[test]
    fn mixed_case_hex_is_accepted() {
        let (mut framer, store) = framer();
        assert_eq!(framer.feed(b"tAbC1fE\r"), 1);
        assert_eq!(store.read(0xABC).expect("frame stored").payload(), &[0xFE]);
    }
}
