//! Bounded byte ring between the I/O reader and the framer.
//!
//! A fixed-capacity circular buffer with full backpressure: `write`
//! suspends while the ring is full and never drops or overwrites bytes,
//! `read` suspends while it is empty. Exactly one producer (the active
//! byte source task) and one consumer (the framer task) share a buffer.
//! Shutdown is external: both tasks are cancelled through their
//! [`CancellationToken`](tokio_util::sync::CancellationToken), the buffer
//! itself has no close state.

use std::sync::Mutex;

use tokio::sync::Notify;

/// Default ring capacity in bytes.
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

/// Default chunk size for source reads feeding the ring.
pub const READ_CHUNK: usize = 4096;

struct Ring {
    buf: Box<[u8]>,
    head: usize,
    tail: usize,
    count: usize,
}

impl Ring {
    /// Copy as much of `data` as fits, in up to two spans across the wrap
    /// point. Returns the number of bytes accepted.
    fn push(&mut self, data: &[u8]) -> usize {
        let capacity = self.buf.len();
        let space = capacity - self.count;
        let to_write = data.len().min(space);

        let first = to_write.min(capacity - self.tail);
        self.buf[self.tail..self.tail + first].copy_from_slice(&data[..first]);
        self.tail = (self.tail + first) % capacity;

        if first < to_write {
            let second = to_write - first;
            self.buf[..second].copy_from_slice(&data[first..to_write]);
            self.tail = second;
        }

        self.count += to_write;
        to_write
    }

    /// Copy up to `out.len()` bytes out, again in up to two spans.
    fn pop(&mut self, out: &mut [u8]) -> usize {
        let capacity = self.buf.len();
        let to_read = out.len().min(self.count);

        let first = to_read.min(capacity - self.head);
        out[..first].copy_from_slice(&self.buf[self.head..self.head + first]);
        self.head = (self.head + first) % capacity;

        if first < to_read {
            let second = to_read - first;
            out[first..to_read].copy_from_slice(&self.buf[..second]);
            self.head = second;
        }

        self.count -= to_read;
        to_read
    }
}

/// Fixed-capacity single-producer single-consumer byte ring.
pub struct TransportBuffer {
    ring: Mutex<Ring>,
    not_full: Notify,
    not_empty: Notify,
}

impl TransportBuffer {
    /// Create a ring with the given capacity in bytes.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "transport buffer capacity must be non-zero");
        Self {
            ring: Mutex::new(Ring {
                buf: vec![0u8; capacity].into_boxed_slice(),
                head: 0,
                tail: 0,
                count: 0,
            }),
            not_full: Notify::new(),
            not_empty: Notify::new(),
        }
    }

    /// Write all of `data`, suspending whenever the ring is full.
    ///
    /// Bytes are appended strictly in order and never dropped; the call
    /// returns once every byte has been accepted.
    pub async fn write(&self, data: &[u8]) {
        let mut written = 0;
        while written < data.len() {
            let not_full = self.not_full.notified();
            {
                let mut ring = match self.ring.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let accepted = ring.push(&data[written..]);
                if accepted > 0 {
                    written += accepted;
                    drop(ring);
                    self.not_empty.notify_one();
                    continue;
                }
            }
            not_full.await;
        }
    }

    /// Read up to `out.len()` bytes, suspending while the ring is empty.
    ///
    /// Returns the number of bytes copied, which may be less than the
    /// output length.
    pub async fn read(&self, out: &mut [u8]) -> usize {
        if out.is_empty() {
            return 0;
        }
        loop {
            let not_empty = self.not_empty.notified();
            {
                let mut ring = match self.ring.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let copied = ring.pop(out);
                if copied > 0 {
                    drop(ring);
                    self.not_full.notify_one();
                    return copied;
                }
            }
            not_empty.await;
        }
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        match self.ring.lock() {
            Ok(guard) => guard.count,
            Err(poisoned) => poisoned.into_inner().count,
        }
    }

    /// Whether the ring currently holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
