//! Per-request streaming session
//!
//! A [`StreamSession`] owns everything one streaming reply needs: the byte
//! buffer, the accumulated text, its lifecycle state and a cancellation
//! token. The transport pushes bytes in; the session pushes deltas and a
//! single completion out through the caller's callbacks.
//!
//! ```text
//! Idle -> Active -> Completed | Failed | Cancelled
//! ```

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DuoError, Result};

use super::{
    chunk_buffer::ChunkBuffer,
    event_parser::{EventLineParser, StreamEvent},
    profile::ProviderProfile,
};

/// Called once per extracted delta, in arrival order
pub type DeltaCallback = Box<dyn FnMut(&str) + Send>;

/// Called exactly once when the transport finishes (never after cancel)
pub type CompletionCallback = Box<dyn FnOnce(Result<String>) + Send>;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// State machine for a single streaming request/response cycle
pub struct StreamSession {
    id: Uuid,
    parser: EventLineParser,
    buffer: ChunkBuffer,
    accumulated: String,
    deltas_observed: usize,
    state: SessionState,
    cancel_token: CancellationToken,
    on_delta: DeltaCallback,
    on_complete: Option<CompletionCallback>,
}

impl StreamSession {
    /// Create an idle session for the given wire profile
    pub fn new(
        profile: ProviderProfile,
        on_delta: impl FnMut(&str) + Send + 'static,
        on_complete: impl FnOnce(Result<String>) + Send + 'static,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            parser: EventLineParser::new(profile),
            buffer: ChunkBuffer::new(),
            accumulated: String::new(),
            deltas_observed: 0,
            state: SessionState::Idle,
            cancel_token: CancellationToken::new(),
            on_delta: Box::new(on_delta),
            on_complete: Some(Box::new(on_complete)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Text delivered so far
    pub fn accumulated_text(&self) -> &str {
        &self.accumulated
    }

    /// Number of delta events seen, counting empty ones
    pub fn deltas_observed(&self) -> usize {
        self.deltas_observed
    }

    pub fn has_received_content(&self) -> bool {
        self.deltas_observed > 0
    }

    /// Token shared with the transport; cancelling it cancels the session
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Move from `Idle` to `Active`
    ///
    /// # Errors
    ///
    /// Returns [`DuoError::InvalidState`] if the session was already started.
    pub fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(DuoError::InvalidState(format!(
                "session {} cannot start from {:?}",
                self.id, self.state
            )));
        }
        self.buffer.clear();
        self.accumulated.clear();
        self.deltas_observed = 0;
        self.state = SessionState::Active;
        info!(session = %self.id, "stream session started");
        Ok(())
    }

    /// Feed one transport read into the session
    ///
    /// Late chunks after a terminal state are ignored.
    pub fn on_chunk(&mut self, bytes: &[u8]) {
        if !self.accepting() {
            debug!(session = %self.id, state = ?self.state, "ignoring chunk");
            return;
        }
        debug!(session = %self.id, len = bytes.len(), "chunk received");

        self.buffer.append(bytes);
        let lines = self.buffer.drain_complete_lines(false);
        self.process_lines(lines);
    }

    /// Transport finished, with or without an error
    ///
    /// On success the buffered tail is flushed and the completion callback
    /// receives the full text. On error the callback receives the error; the
    /// deltas already delivered stay delivered.
    pub fn finish(&mut self, outcome: Result<()>) {
        if !self.accepting() {
            return;
        }

        match outcome {
            Ok(()) => {
                let lines = self.buffer.drain_complete_lines(true);
                self.process_lines(lines);
                if !self.accepting() {
                    return;
                }
                self.state = SessionState::Completed;
                info!(
                    session = %self.id,
                    chars = self.accumulated.chars().count(),
                    "stream session completed"
                );
                if let Some(on_complete) = self.on_complete.take() {
                    on_complete(Ok(self.accumulated.clone()));
                }
            }
            Err(e) => {
                self.state = SessionState::Failed;
                self.buffer.clear();
                warn!(session = %self.id, error = %e, "stream session failed");
                if let Some(on_complete) = self.on_complete.take() {
                    on_complete(Err(e));
                }
            }
        }
    }

    /// Cancel the session; no further callbacks fire
    pub fn cancel(&mut self) {
        self.cancel_token.cancel();
        self.mark_cancelled();
    }

    /// Pump a byte stream through the session until it ends or is cancelled
    ///
    /// Starts the session if it is still idle. Returns the final state.
    pub async fn drive<S>(&mut self, mut stream: S) -> SessionState
    where
        S: Stream<Item = Result<Bytes>> + Unpin,
    {
        if self.state == SessionState::Idle {
            if let Err(e) = self.start() {
                warn!(error = %e, "could not start session");
                return self.state;
            }
        }

        let token = self.cancel_token.clone();
        while self.accepting() {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    self.mark_cancelled();
                }
                next = stream.next() => match next {
                    Some(Ok(bytes)) => self.on_chunk(&bytes),
                    Some(Err(e)) => self.finish(Err(e)),
                    None => self.finish(Ok(())),
                },
            }
        }

        self.state
    }

    fn process_lines(&mut self, lines: Vec<String>) {
        for line in lines {
            if !self.accepting() {
                return;
            }
            match self.parser.classify(&line) {
                StreamEvent::Delta(text) => {
                    self.accumulated.push_str(&text);
                    self.deltas_observed += 1;
                    (self.on_delta)(&text);
                }
                StreamEvent::Done => {
                    debug!(session = %self.id, "done sentinel received");
                    break;
                }
                StreamEvent::Malformed(_) | StreamEvent::Ignorable => {}
            }
        }
    }

    /// Whether the session still takes input; observes external cancellation
    fn accepting(&mut self) -> bool {
        if self.state == SessionState::Active && self.cancel_token.is_cancelled() {
            self.mark_cancelled();
        }
        self.state == SessionState::Active
    }

    fn mark_cancelled(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = SessionState::Cancelled;
        self.on_complete = None;
        self.buffer.clear();
        info!(session = %self.id, "stream session cancelled");
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("accumulated", &self.accumulated)
            .field("deltas_observed", &self.deltas_observed)
            .finish_non_exhaustive()
    }
}
