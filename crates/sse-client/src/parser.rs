//! Stream parser
//!
//! Splits an incremental byte stream into lines, folds each line into the
//! current event through the field decoder, and emits the event at every
//! blank line.
//!
//! `\n`, `\r\n` and a lone `\r` all terminate a line, including when the
//! terminator is split across chunks. An event still being accumulated when
//! the stream ends is discarded: only a blank line dispatches.

use bytes::{Buf, Bytes, BytesMut};
use futures::stream::{Stream, StreamExt};
use tracing::trace;

use crate::decoder::decode_line;
use crate::dispatcher::Dispatcher;
use crate::error::SseError;
use crate::event::{EventBuilder, ServerEvent};

const LF: u8 = b'\n';
const CR: u8 = b'\r';

/// Receiver of everything the parser produces
pub trait EventSink {
    /// A blank line completed an event
    fn event(&mut self, event: ServerEvent);

    /// Reading the stream failed; no further calls follow
    fn exception(&mut self, err: SseError);

    /// The stream ended normally; no further calls follow
    fn complete(&mut self);
}

impl EventSink for Dispatcher {
    fn event(&mut self, event: ServerEvent) {
        self.on_event(&event);
    }

    fn exception(&mut self, err: SseError) {
        self.on_exception(&err);
    }

    fn complete(&mut self) {
        self.on_complete();
    }
}

/// Incremental line splitter plus the active event accumulator
#[derive(Debug, Default)]
pub struct StreamParser {
    /// Bytes of the line not yet terminated
    buffer: BytesMut,
    /// Prefix of `buffer` already known to hold no terminator
    scanned: usize,
    /// Event currently being read
    builder: EventBuilder,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and emit any events it completes
    pub fn feed<K: EventSink + ?Sized>(&mut self, chunk: &[u8], sink: &mut K) {
        self.buffer.extend_from_slice(chunk);

        while let Some(line) = next_line(&mut self.buffer, &mut self.scanned) {
            self.process_line(&line, sink);
        }
    }

    /// Flush whatever is left once the stream has ended
    ///
    /// A trailing lone `\r` still counts as a terminator. Any unterminated
    /// remainder is decoded but never dispatched.
    pub fn finish<K: EventSink + ?Sized>(&mut self, sink: &mut K) {
        self.scanned = 0;

        if self.buffer.last() == Some(&CR) {
            let line = self.buffer.split_to(self.buffer.len() - 1).freeze();
            self.buffer.clear();
            self.process_line(&line, sink);
        }

        if !self.buffer.is_empty() {
            let rest = self.buffer.split().freeze();
            self.process_line(&rest, sink);
        }

        if !self.builder.is_empty() {
            trace!("SSE stream ended mid-event, partial event dropped");
            self.builder = EventBuilder::new();
        }
    }

    fn process_line<K: EventSink + ?Sized>(&mut self, line: &[u8], sink: &mut K) {
        if line.is_empty() {
            sink.event(self.builder.take());
            return;
        }

        let line = String::from_utf8_lossy(line);
        decode_line(&line, &mut self.builder);
    }
}

/// Pop the next terminated line off `buffer`
///
/// Searching resumes at `scanned`, so a long line arriving over many chunks
/// is only examined once. Returns `None` if no terminator is present yet, or
/// if the buffer ends in a `\r` that may turn out to be the first half of
/// `\r\n`; that `\r` is looked at again on the next call.
fn next_line(buffer: &mut BytesMut, scanned: &mut usize) -> Option<Bytes> {
    let Some(offset) = buffer[*scanned..]
        .iter()
        .position(|&b| b == LF || b == CR)
    else {
        *scanned = buffer.len();
        return None;
    };
    let pos = *scanned + offset;

    let terminator_len = if buffer[pos] == LF {
        1
    } else if pos + 1 >= buffer.len() {
        *scanned = pos;
        return None;
    } else if buffer[pos + 1] == LF {
        2
    } else {
        1
    };

    let line = buffer.split_to(pos).freeze();
    buffer.advance(terminator_len);
    *scanned = 0;
    Some(line)
}

/// Parse a whole response body into `sink`
///
/// A `None` stream returns at once without emitting anything, not even
/// completion. A read error is reported through [`EventSink::exception`] and
/// ends parsing. The stream is owned here and dropped on every return path.
pub async fn parse<S, K>(stream: Option<S>, sink: &mut K)
where
    S: Stream<Item = Result<Bytes, SseError>> + Unpin,
    K: EventSink + ?Sized,
{
    let Some(mut stream) = stream else {
        trace!("SSE parse called without a body");
        return;
    };

    let mut parser = StreamParser::new();

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => parser.feed(&bytes, sink),
            Err(err) => {
                sink.exception(err);
                return;
            }
        }
    }

    parser.finish(sink);
    sink.complete();
}
