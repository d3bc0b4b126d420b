//! Compiled bus-description database.
//!
//! A [`Database`] is the immutable, compiled union of one or more textual
//! DBC sources: a map from frame identifier to [`Message`] layout, with
//! value tables already attached to their signals. Databases are never
//! mutated after compilation; reconfiguration compiles a fresh database
//! from the enabled source set and atomically swaps the `Arc<Database>`
//! readers hold, so a decode in flight always sees a consistent view.
//!
//! Compilation itself lives in [`DatabaseBuilder`]; the pure decode
//! functions are implemented in [`decode`](self).

mod builder;
mod decode;

pub use builder::DatabaseBuilder;

use std::collections::HashMap;

use tracing::debug;

/// A named, bit-addressed, scaled field within a message payload.
///
/// `physical = raw × factor + offset`; when `value_map` contains the
/// exact raw value, the label is rendered instead of the number.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    /// Signal name, unique within its message.
    pub name: String,
    /// Start bit within the 64-bit payload window, in the encoding's own
    /// addressing convention (see [`Database::decode`]).
    pub start_bit: u16,
    /// Bit width.
    pub size: u8,
    /// Little-endian (`@1`) vs big-endian (`@0`) bit layout.
    pub little_endian: bool,
    /// Two's-complement signed (`-`) vs unsigned (`+`).
    pub signed: bool,
    /// Linear scale factor.
    pub factor: f64,
    /// Linear offset.
    pub offset: f64,
    /// Raw value → label, attached from the matching value table.
    pub value_map: HashMap<i64, String>,
}

/// Decode schema for all frames sharing one identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Frame identifier.
    pub id: u32,
    /// Message name from the `BO_` record.
    pub name: String,
    /// Declared payload length.
    pub dlc: u8,
    /// Signals in declaration order.
    pub signals: Vec<Signal>,
}

/// Immutable compiled description database.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Database {
    messages: HashMap<u32, Message>,
}

impl Database {
    /// Look up the message layout for an identifier.
    pub fn message(&self, id: u32) -> Option<&Message> {
        self.messages.get(&id)
    }

    /// The full compiled message map.
    pub fn messages(&self) -> &HashMap<u32, Message> {
        &self.messages
    }

    /// Number of compiled messages.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Whether the database holds no messages at all.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Log the compiled layout at debug level, one line per message and
    /// signal. Emitted after every rebuild.
    pub fn debug_dump(&self) {
        for message in self.messages.values() {
            debug!(
                id = format_args!("{:#x}", message.id),
                name = %message.name,
                dlc = message.dlc,
                signals = message.signals.len(),
                "compiled message"
            );
            for signal in &message.signals {
                debug!(
                    name = %signal.name,
                    start = signal.start_bit,
                    size = signal.size,
                    endian = if signal.little_endian { "LE" } else { "BE" },
                    signed = signal.signed,
                    factor = signal.factor,
                    offset = signal.offset,
                    labels = signal.value_map.len(),
                    "  signal"
                );
            }
        }
    }
}
