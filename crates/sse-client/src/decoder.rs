//! Field decoder
//!
//! Folds one `name:value` line of the wire format into an [`EventBuilder`].
//! Field names are matched exactly and case-sensitively against a fixed table.
//! Nothing here can fail: unknown fields and malformed values are dropped.

use tracing::trace;

use crate::event::EventBuilder;

/// Applies a field value to the event under construction
type FieldHandler = fn(&str, &mut EventBuilder);

/// Recognized fields and their handlers
const FIELDS: &[(&str, FieldHandler)] = &[
    ("event", decode_event),
    ("data", decode_data),
    ("id", decode_id),
    ("retry", decode_retry),
];

/// What [`decode_line`] did with a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Line started with `:`
    Comment,
    /// Line named one of the known fields
    Field,
    /// Line named a field nobody knows about
    Unknown,
}

/// Decode a single non-blank line into `builder`
pub fn decode_line(line: &str, builder: &mut EventBuilder) -> LineKind {
    if line.starts_with(':') {
        trace!("SSE comment");
        return LineKind::Comment;
    }

    let (field, value) = split_field(line);

    match FIELDS.iter().find(|(name, _)| *name == field) {
        Some((_, handler)) => {
            handler(value, builder);
            LineKind::Field
        }
        None => {
            trace!(field, "SSE unknown field");
            LineKind::Unknown
        }
    }
}

/// Split on the first colon and drop exactly one leading space from the value
fn split_field(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
        None => (line, ""),
    }
}

fn decode_event(value: &str, builder: &mut EventBuilder) {
    builder.name(value);
}

fn decode_data(value: &str, builder: &mut EventBuilder) {
    builder.append_data(value);
}

fn decode_id(value: &str, builder: &mut EventBuilder) {
    if value.contains('\0') {
        trace!("SSE id containing NUL ignored");
        return;
    }
    builder.id(value);
}

fn decode_retry(value: &str, builder: &mut EventBuilder) {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        trace!(value, "SSE non-numeric retry ignored");
        return;
    }
    // Digits only, so the only failure left is overflow
    match value.parse::<u64>() {
        Ok(millis) => {
            builder.retry(millis);
        }
        Err(_) => trace!(value, "SSE retry out of range ignored"),
    }
}
