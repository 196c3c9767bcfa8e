//! Consumption of a streamed completion into the report buffer.
//!
//! A [`ReportSession`] owns the accumulating text. Each request calls
//! [`ReportSession::begin`], which clears the buffer, and then
//! [`ReportSession::consume`], which appends fragments in arrival order and
//! hands the whole buffer to a [`RenderSink`] after every append. Both take
//! `&mut self`, so a second request cannot interleave with one in flight.

use std::future::Future;

use futures::{Stream, StreamExt};
use thiserror::Error;

use crate::completion::{ChatChunk, CompletionError, SseEvent, Usage, DONE_SENTINEL};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write rendered output: {source}")]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("render failed: {message}")]
    Other { message: String },
}

impl From<std::io::Error> for RenderError {
    fn from(source: std::io::Error) -> Self {
        RenderError::Io { source }
    }
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream aborted: {source}")]
    Completion {
        #[from]
        source: CompletionError,
    },

    #[error("display update failed: {source}")]
    Render {
        #[from]
        source: RenderError,
    },
}

/// Receives the full buffer after every appended fragment.
pub trait RenderSink {
    fn render(&mut self, buffer: &str) -> Result<(), RenderError>;

    /// Called before the first fragment of each request.
    fn restart(&mut self) {}
}

impl<F> RenderSink for F
where
    F: FnMut(&str) -> Result<(), RenderError>,
{
    fn render(&mut self, buffer: &str) -> Result<(), RenderError> {
        self(buffer)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Requesting,
    Streaming { fragments: usize },
    Done,
    Cancelled,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    Finished,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamOutcome {
    pub completion: Completion,
    pub fragments: usize,
    pub usage: Option<Usage>,
}

#[derive(Debug)]
pub struct ReportSession {
    buffer: String,
    state: ConsumerState,
    generation: u64,
}

impl Default for ReportSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportSession {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            state: ConsumerState::Idle,
            generation: 0,
        }
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Starts a new request: clears the buffer and enters `Requesting`.
    /// Returns the new generation number.
    pub fn begin(&mut self) -> u64 {
        self.buffer.clear();
        self.generation += 1;
        self.state = ConsumerState::Requesting;
        tracing::debug!(generation = self.generation, "report request started");
        self.generation
    }

    /// Marks a request that never produced a stream (connect or status error).
    pub fn fail(&mut self) {
        self.state = ConsumerState::Failed;
    }

    /// Marks a request abandoned before its stream was accepted.
    pub fn cancel(&mut self) {
        self.state = ConsumerState::Cancelled;
    }

    /// Drains `events` into the buffer.
    ///
    /// Stops at the `[DONE]` sentinel or the natural end of the stream. A
    /// transport, parse or render error leaves the partial buffer in place and
    /// moves to `Failed`. If `cancel` resolves first the loop stops with
    /// [`Completion::Cancelled`], again keeping what was received.
    pub async fn consume<S, R, C>(
        &mut self,
        events: S,
        sink: &mut R,
        cancel: C,
    ) -> Result<StreamOutcome, StreamError>
    where
        S: Stream<Item = Result<SseEvent, CompletionError>>,
        R: RenderSink + ?Sized,
        C: Future<Output = ()>,
    {
        futures::pin_mut!(events);
        futures::pin_mut!(cancel);

        let mut fragments = 0usize;
        let mut usage = None;
        self.state = ConsumerState::Streaming { fragments };
        sink.restart();

        loop {
            let next = tokio::select! {
                biased;
                _ = &mut cancel => {
                    self.state = ConsumerState::Cancelled;
                    tracing::info!(fragments, "report stream cancelled");
                    return Ok(StreamOutcome {
                        completion: Completion::Cancelled,
                        fragments,
                        usage,
                    });
                }
                next = events.next() => next,
            };

            let event = match next {
                None => break,
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    self.state = ConsumerState::Failed;
                    return Err(e.into());
                }
            };
            if event.data == DONE_SENTINEL {
                break;
            }

            let chunk = match ChatChunk::parse(&event.data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    self.state = ConsumerState::Failed;
                    return Err(e.into());
                }
            };
            if let Some(u) = chunk.usage {
                usage = Some(u);
            }
            let Some(fragment) = chunk.fragment() else {
                continue;
            };

            self.buffer.push_str(fragment);
            fragments += 1;
            self.state = ConsumerState::Streaming { fragments };
            if let Err(e) = sink.render(&self.buffer) {
                self.state = ConsumerState::Failed;
                return Err(e.into());
            }
        }

        self.state = ConsumerState::Done;
        tracing::info!(fragments, "report stream finished");
        Ok(StreamOutcome {
            completion: Completion::Finished,
            fragments,
            usage,
        })
    }
}
