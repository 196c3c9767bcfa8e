//! Server-sent event framing over a raw byte stream.

use futures::{Stream, StreamExt};

use super::CompletionError;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental decoder: feed arbitrary byte chunks, get complete events back.
///
/// Chunk boundaries may fall anywhere, including inside a multi-byte UTF-8
/// sequence or between `\r` and `\n`.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    // bytes of `pending` already known to hold no newline
    scanned: usize,
    data: Vec<String>,
    event: Option<String>,
    id: Option<String>,
    has_fields: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        let mut out = Vec::new();
        let mut start = 0;
        let mut search = self.scanned;
        while let Some(offset) = self.pending[search..].iter().position(|b| *b == b'\n') {
            let end = search + offset;
            let raw = &self.pending[start..end];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line = String::from_utf8_lossy(raw).into_owned();
            if let Some(event) = self.process_line(&line) {
                out.push(event);
            }
            start = end + 1;
            search = start;
        }
        self.pending.drain(..start);
        self.scanned = self.pending.len();
        out
    }

    /// Flushes a final event that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.pending.is_empty() {
            self.scanned = 0;
            let mut line = std::mem::take(&mut self.pending);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            if let Some(event) = self.process_line(&line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => {
                self.data.push(value.to_string());
                self.has_fields = true;
            }
            "event" => {
                self.event = Some(value.to_string());
                self.has_fields = true;
            }
            "id" => {
                self.id = Some(value.to_string());
                self.has_fields = true;
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if !self.has_fields {
            return None;
        }
        self.has_fields = false;
        let data = std::mem::take(&mut self.data).join("\n");
        let event = self.event.take();
        let id = self.id.take();
        if data.is_empty() && event.is_none() {
            return None;
        }
        Some(SseEvent { event, data, id })
    }
}

/// Turns a byte stream into an event stream. Transport errors are passed
/// through as items; the stream ends after the first one.
pub fn decode_stream<S, B, E>(bytes: S) -> impl Stream<Item = Result<SseEvent, CompletionError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<CompletionError>,
{
    futures::stream::unfold(
        (bytes, SseDecoder::new(), std::collections::VecDeque::new(), false),
        |(mut bytes, mut decoder, mut queue, mut finished)| async move {
            loop {
                if let Some(event) = queue.pop_front() {
                    return Some((Ok(event), (bytes, decoder, queue, finished)));
                }
                if finished {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => queue.extend(decoder.push(chunk.as_ref())),
                    Some(Err(e)) => {
                        finished = true;
                        return Some((Err(e.into()), (bytes, decoder, queue, finished)));
                    }
                    None => {
                        finished = true;
                        queue.extend(decoder.finish());
                    }
                }
            }
        },
    )
}
