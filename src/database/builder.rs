//! DBC text compilation.
//!
//! The builder consumes line-oriented DBC text one source at a time and
//! produces an immutable [`Database`]. Loading is strictly
//! additive-then-overwrite: a later source's `BO_` for an identifier
//! replaces the earlier message wholesale, and value-table attachment is
//! recomputed once over the final merged set when [`build`] runs.
//!
//! Error handling follows the format's forgiving tradition: a record
//! that fails to parse is skipped with a warning, never aborting the
//! rest of its file. Unrecognized record kinds are ignored outright.
//!
//! Known ambiguity, preserved from the format handling this reproduces:
//! `VAL_` records key their table by bare signal name, not by
//! (message id, signal name). Two messages declaring same-named signals
//! with different intended labels will collide on attachment.
//!
//! [`build`]: DatabaseBuilder::build

use std::collections::HashMap;

use tracing::warn;

use super::{Database, Message, Signal};

/// Incremental compiler for one or more DBC sources.
#[derive(Debug, Default)]
pub struct DatabaseBuilder {
    messages: HashMap<u32, Message>,
    value_tables: HashMap<String, HashMap<i64, String>>,
    /// Identifier of the message the next `SG_` records attach to.
    current: Option<u32>,
}

impl DatabaseBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a single source in one step.
    pub fn compile(text: &str) -> Database {
        let mut builder = Self::new();
        builder.add_source(text);
        builder.build()
    }

    /// Parse one source's text into the builder.
    ///
    /// Messages sharing an identifier with an earlier source are
    /// replaced; value tables accumulate across sources.
    pub fn add_source(&mut self, text: &str) {
        // The signal-attachment cursor never crosses a source boundary.
        self.current = None;
        for line in text.lines() {
            self.parse_line(line.trim());
        }
    }

    /// Finish compilation: attach to every signal the value table, if
    /// any, whose key equals the signal's name.
    pub fn build(mut self) -> Database {
        for message in self.messages.values_mut() {
            for signal in &mut message.signals {
                if let Some(table) = self.value_tables.get(&signal.name) {
                    signal.value_map = table.clone();
                }
            }
        }
        Database { messages: self.messages }
    }

    fn parse_line(&mut self, line: &str) {
        let Some(keyword) = line.split_whitespace().next() else {
            return;
        };
        match keyword {
            "BO_" => self.parse_message(line),
            "SG_" => self.parse_signal(line),
            "VAL_TABLE_" => self.parse_value_table(line),
            "VAL_" => self.parse_value_attachment(line),
            _ => {}
        }
    }

    /// `BO_ <id> <name>: <dlc> <transmitter>`; opens a new message.
    fn parse_message(&mut self, line: &str) {
        let mut tokens = line.split_whitespace().skip(1);
        let parsed = (|| {
            let id: u32 = tokens.next()?.parse().ok()?;
            let raw_name = tokens.next()?;
            let (name, dlc_token) = match raw_name.strip_suffix(':') {
                Some(stripped) => (stripped, tokens.next()?),
                // Colon as its own token: `BO_ 100 Speed : 2 ECU`.
                None => {
                    let sep = tokens.next()?;
                    if sep != ":" {
                        return None;
                    }
                    (raw_name, tokens.next()?)
                }
            };
            let dlc: u8 = dlc_token.parse().ok()?;
            Some((id, name.to_string(), dlc))
        })();

        match parsed {
            Some((id, name, dlc)) => {
                self.messages.insert(id, Message { id, name, dlc, signals: Vec::new() });
                self.current = Some(id);
            }
            None => {
                warn!(line, "skipping malformed BO_ record");
                self.current = None;
            }
        }
    }

    /// `SG_ <name> : <start>|<size>@<endian><sign> (<factor>,<offset>) ...`
    /// attaches a signal to the current message.
    fn parse_signal(&mut self, line: &str) {
        let Some(current) = self.current else {
            warn!(line, "SG_ record outside any BO_ message");
            return;
        };

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let parsed = (|| {
            let name = *tokens.get(1)?;
            // Position token sits right after the ':' separator.
            let colon = tokens.iter().position(|t| *t == ":")?;
            let position = *tokens.get(colon + 1)?;

            let (start_part, rest) = position.split_once('|')?;
            let (size_part, layout) = rest.split_once('@')?;
            let start_bit: u16 = start_part.parse().ok()?;
            let size: u8 = size_part.parse().ok()?;
            let mut layout_chars = layout.chars();
            let little_endian = layout_chars.next()? == '1';
            let signed = layout_chars.next()? == '-';

            // The scale group defaults to (1,0) when malformed or short.
            let (factor, offset) = tokens
                .get(colon + 2)
                .and_then(|token| parse_scale(token))
                .unwrap_or((1.0, 0.0));

            Some(Signal {
                name: name.to_string(),
                start_bit,
                size,
                little_endian,
                signed,
                factor,
                offset,
                value_map: HashMap::new(),
            })
        })();

        let Some(signal) = parsed else {
            warn!(line, "skipping malformed SG_ record");
            return;
        };

        if !signal_window_is_valid(&signal) {
            warn!(
                name = %signal.name,
                start = signal.start_bit,
                size = signal.size,
                "signal window exceeds 8-byte payload, skipping"
            );
            return;
        }

        if let Some(message) = self.messages.get_mut(&current) {
            message.signals.push(signal);
        }
    }

    /// `VAL_TABLE_ <name> <int> "<label>" ... ;` defines a named table.
    fn parse_value_table(&mut self, line: &str) {
        let mut tokens = line.split_whitespace().skip(1);
        let Some(table_name) = tokens.next() else {
            warn!(line, "skipping malformed VAL_TABLE_ record");
            return;
        };
        let rest = remainder_after_tokens(line, 2);
        self.insert_value_pairs(table_name, rest);
    }

    /// `VAL_ <id> <signal> <int> "<label>" ... ;` where the id is
    /// accepted but the table is keyed by the signal name.
    fn parse_value_attachment(&mut self, line: &str) {
        let mut tokens = line.split_whitespace().skip(1);
        let parsed = (|| {
            let _id: u32 = tokens.next()?.parse().ok()?;
            tokens.next()
        })();
        let Some(signal_name) = parsed else {
            warn!(line, "skipping malformed VAL_ record");
            return;
        };
        let rest = remainder_after_tokens(line, 3);
        self.insert_value_pairs(signal_name, rest);
    }

    fn insert_value_pairs(&mut self, key: &str, rest: &str) {
        let table = self.value_tables.entry(key.to_string()).or_default();
        for (raw, label) in parse_value_pairs(rest) {
            table.insert(raw, label);
        }
    }
}

/// Parse `(factor,offset)` into a scale pair.
fn parse_scale(token: &str) -> Option<(f64, f64)> {
    let inner = token.strip_prefix('(')?.strip_suffix(')')?;
    let (factor, offset) = inner.split_once(',')?;
    Some((factor.trim().parse().ok()?, offset.trim().parse().ok()?))
}

/// A signal must address only bits inside the 64-bit payload window, in
/// its own endianness convention: little-endian reads upwards from
/// `start`, big-endian reads downwards.
fn signal_window_is_valid(signal: &Signal) -> bool {
    if signal.size == 0 || signal.start_bit >= 64 {
        return false;
    }
    if signal.little_endian {
        u32::from(signal.start_bit) + u32::from(signal.size) <= 64
    } else {
        u32::from(signal.size) <= u32::from(signal.start_bit) + 1
    }
}

/// The tail of `line` after its first `count` whitespace-separated tokens.
fn remainder_after_tokens(line: &str, count: usize) -> &str {
    let mut skipped = 0;
    let mut in_token = false;
    for (index, ch) in line.char_indices() {
        if ch.is_whitespace() {
            if in_token {
                skipped += 1;
                in_token = false;
            }
        } else {
            if skipped == count {
                return &line[index..];
            }
            in_token = true;
        }
    }
    ""
}

/// Scan `<int> "<label>"` pairs up to the terminating `;` or end of line.
/// A pair that fails to scan ends the record; earlier pairs are kept.
fn parse_value_pairs(rest: &str) -> Vec<(i64, String)> {
    let mut pairs = Vec::new();
    let mut chars = rest.char_indices().peekable();

    loop {
        // Skip whitespace up to the next number.
        while chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
        let Some(&(start, first)) = chars.peek() else { break };
        if first == ';' {
            break;
        }

        // Signed integer token.
        let mut end = start;
        while let Some(&(index, c)) = chars.peek() {
            if c == '-' || c.is_ascii_digit() {
                end = index + c.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let Ok(raw) = rest[start..end].parse::<i64>() else { break };

        // Quoted label, which may itself contain whitespace.
        while chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
        let Some((_, quote)) = chars.next() else { break };
        if quote != '"' {
            break;
        }
        let mut label = String::new();
        let mut closed = false;
        for (_, c) in chars.by_ref() {
            if c == '"' {
                closed = true;
                break;
            }
            label.push(c);
        }
        if !closed {
            break;
        }
        pairs.push((raw, label));
    }
    pairs
}
