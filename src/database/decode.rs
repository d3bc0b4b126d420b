//! Pure payload decoding against a compiled [`Database`].
//!
//! Bit addressing contract: payload bit `p` lives in byte `p / 8` at bit
//! `p % 8`, where bit 0 is the least significant bit of its byte. A
//! little-endian signal's raw bit `i` (LSB first) comes from payload bit
//! `start + i`; a big-endian signal's raw bit `i` comes from payload bit
//! `start - i` and is shifted in MSB first. Signed signals sign-extend
//! the raw value from their declared width; widths of 0 or 64 and above
//! are already native width and extend nothing.

use super::{Database, Signal};
use crate::frame::Frame;

impl Database {
    /// Decode a frame into `"<signal>: <value>"` pairs joined by single
    /// spaces, in signal declaration order.
    ///
    /// Returns `None` when the identifier has no compiled message; the
    /// caller falls back to a raw rendering (see the [`Frame`] `Display`
    /// impl). Pure and side-effect free.
    pub fn decode(&self, id: u32, frame: &Frame) -> Option<String> {
        self.decode_with_separator(id, frame, " ")
    }

    /// [`decode`](Self::decode) with a caller-chosen pair separator,
    /// e.g. `"\n"` for one signal per line.
    pub fn decode_with_separator(&self, id: u32, frame: &Frame, separator: &str) -> Option<String> {
        let message = self.message(id)?;
        let mut out = String::new();
        for (index, signal) in message.signals.iter().enumerate() {
            if index > 0 {
                out.push_str(separator);
            }
            let value = extract_value(frame, signal);
            out.push_str(&signal.name);
            out.push_str(": ");
            match signal.value_map.get(&value) {
                Some(label) => out.push_str(label),
                None => {
                    let physical = value as f64 * signal.factor + signal.offset;
                    out.push_str(&physical.to_string());
                }
            }
        }
        Some(out)
    }

    /// Numeric physical values per signal, for plotting consumers that
    /// want numbers rather than rendered text. Value-table labels are
    /// ignored here.
    pub fn decode_signals(&self, id: u32, frame: &Frame) -> Option<Vec<(String, f64)>> {
        let message = self.message(id)?;
        let values = message
            .signals
            .iter()
            .map(|signal| {
                let value = extract_value(frame, signal);
                (signal.name.clone(), value as f64 * signal.factor + signal.offset)
            })
            .collect();
        Some(values)
    }
}

/// Raw bits of `signal`, sign-extended when the signal is signed.
fn extract_value(frame: &Frame, signal: &Signal) -> i64 {
    let raw = extract_raw(&frame.data, signal);
    if signal.signed { sign_extend(raw, signal.size) } else { raw as i64 }
}

/// Extract the unsigned raw value of `signal` from an 8-byte payload.
///
/// Bit positions outside the 64-bit window contribute nothing.
pub(crate) fn extract_raw(data: &[u8; 8], signal: &Signal) -> u64 {
    let mut value = 0u64;
    if signal.little_endian {
        for i in 0..u16::from(signal.size) {
            let position = signal.start_bit + i;
            if position >= 64 {
                break;
            }
            let bit = (data[usize::from(position / 8)] >> (position % 8)) & 1;
            value |= u64::from(bit) << i;
        }
    } else {
        for i in 0..u16::from(signal.size) {
            let Some(position) = signal.start_bit.checked_sub(i) else {
                break;
            };
            if position >= 64 {
                continue;
            }
            let bit = (data[usize::from(position / 8)] >> (position % 8)) & 1;
            value = (value << 1) | u64::from(bit);
        }
    }
    value
}

/// Two's-complement sign extension from `bits` wide to i64. Widths of 0
/// or 64 and above pass the value through unchanged.
pub(crate) fn sign_extend(value: u64, bits: u8) -> i64 {
    if bits == 0 || bits >= 64 {
        return value as i64;
    }
    let mask = 1u64 << (bits - 1);
    (value ^ mask) as i64 - mask as i64
}
