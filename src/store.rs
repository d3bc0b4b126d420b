//! Latest-value frame store.
//!
//! A fixed 4096-entry table keyed by frame identifier. Each entry holds
//! only the most recently dispatched [`Frame`] behind its own mutex, so
//! the single framer task writing identifier A never contends with a
//! reader polling identifier B. This is the dominant access pattern: many
//! identifiers, one writer, many readers.

use std::sync::Mutex;

use crate::frame::{Frame, MAX_FRAME_IDS, MAX_PAYLOAD};

/// Fixed-size latest-value table indexed by frame identifier.
///
/// Entries start unwritten, become written on the first `store` for their
/// identifier, and are only ever overwritten afterwards. Readers never
/// observe a torn frame: both `store` and `read` copy the whole frame
/// under the entry lock.
pub struct FrameStore {
    entries: Box<[Mutex<Option<Frame>>]>,
}

impl FrameStore {
    /// Create an empty store covering the full identifier space.
    pub fn new() -> Self {
        let entries = (0..MAX_FRAME_IDS).map(|_| Mutex::new(None)).collect();
        Self { entries }
    }

    /// Store the latest payload for `id`, replacing any previous frame.
    ///
    /// Out-of-range identifiers and payload lengths above 8 are silently
    /// ignored.
    pub fn store(&self, id: u16, len: u8, payload: &[u8]) {
        if id as usize >= MAX_FRAME_IDS || len as usize > MAX_PAYLOAD {
            return;
        }
        let mut entry = match self.entries[id as usize].lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *entry = Some(Frame::new(len, payload));
    }

    /// Read the latest frame for `id`, if one was ever stored.
    pub fn read(&self, id: u16) -> Option<Frame> {
        if id as usize >= MAX_FRAME_IDS {
            return None;
        }
        let entry = match self.entries[id as usize].lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *entry
    }
}

impl Default for FrameStore {
    fn default() -> Self {
        Self::new()
    }
}
