//! Chat service: one prompt in, one streamed reply out
//!
//! Only one request is live at a time. Sending a new prompt cancels the
//! one in flight; the superseded call resolves with
//! [`DuoError::Cancelled`] and never writes to the history.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    error::{DuoError, Result},
    messages::{ChatTurn, Role},
};

use super::{
    history::ConversationHistory, streaming::StreamSession, transport::Transport, ChatBackend,
    CompletionOptions,
};

#[derive(Debug)]
struct ActiveRequest {
    generation: u64,
    token: CancellationToken,
}

/// Streams replies from a chat backend and keeps the rolling history
pub struct ChatService {
    backend: Arc<dyn ChatBackend>,
    transport: Arc<dyn Transport>,
    history: Mutex<ConversationHistory>,
    system_prompt: String,
    options: CompletionOptions,
    active: Mutex<Option<ActiveRequest>>,
    generation: AtomicU64,
}

impl ChatService {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        transport: Arc<dyn Transport>,
        system_prompt: impl Into<String>,
        max_turns: usize,
        options: CompletionOptions,
    ) -> Self {
        Self {
            backend,
            transport,
            history: Mutex::new(ConversationHistory::new(max_turns)),
            system_prompt: system_prompt.into(),
            options,
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn backend(&self) -> &dyn ChatBackend {
        self.backend.as_ref()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Send a prompt and stream the reply
    ///
    /// `on_delta` receives each piece of text in arrival order. On success
    /// the user and assistant turns are both in the history and the full
    /// reply is returned.
    ///
    /// # Errors
    ///
    /// Returns [`DuoError::Cancelled`] if another prompt or [`Self::cancel`]
    /// superseded this one, or the transport/stream error otherwise.
    pub async fn send_prompt(
        &self,
        prompt: &str,
        on_delta: impl FnMut(&str) + Send + 'static,
    ) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        let mut session = StreamSession::new(self.backend.kind().profile(), on_delta, move |result| {
            let _ = tx.send(result);
        });
        let token = session.cancel_token();
        let (generation, turns) = self.begin(prompt, token.clone());

        info!(
            session = %session.id(),
            provider = self.backend.provider(),
            model = self.backend.model(),
            turns = turns.len(),
            "sending prompt"
        );

        let outcome = self.run(&mut session, &token, &turns).await;
        let reply = match outcome {
            Ok(()) => match rx.await {
                Ok(result) => result,
                Err(_) => Err(DuoError::Cancelled),
            },
            Err(e) => Err(e),
        };

        self.finish(generation, reply)
    }

    /// Cancel the request in flight, if any
    pub fn cancel(&self) {
        if let Some(active) = self.active.lock().take() {
            debug!(generation = active.generation, "cancelling active request");
            active.token.cancel();
        }
    }

    /// Cancel the request in flight and forget the conversation
    pub fn reset(&self) {
        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            previous.token.cancel();
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.history.lock().clear();
        info!("conversation reset");
    }

    /// Copy of the history turns, oldest first
    pub fn history_snapshot(&self) -> Vec<ChatTurn> {
        self.history.lock().snapshot()
    }

    /// Register a new request, superseding the previous one
    fn begin(&self, prompt: &str, token: CancellationToken) -> (u64, Vec<ChatTurn>) {
        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            debug!(generation = previous.generation, "superseding active request");
            previous.token.cancel();
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *active = Some(ActiveRequest { generation, token });

        let mut history = self.history.lock();
        history.append(Role::User, prompt);
        (generation, history.snapshot())
    }

    /// Open the transport and pump the reply through the session
    async fn run(
        &self,
        session: &mut StreamSession,
        token: &CancellationToken,
        turns: &[ChatTurn],
    ) -> Result<()> {
        let request = self
            .backend
            .build_request(&self.system_prompt, turns, &self.options)?;

        let stream = tokio::select! {
            biased;
            () = token.cancelled() => return Err(DuoError::Cancelled),
            opened = self.transport.open(request) => opened?,
        };

        let state = session.drive(stream).await;
        debug!(session = %session.id(), ?state, "session finished");
        Ok(())
    }

    /// Retire a request; only the current one may write to the history
    fn finish(&self, generation: u64, reply: Result<String>) -> Result<String> {
        let mut active = self.active.lock();
        let current = active
            .as_ref()
            .is_some_and(|request| request.generation == generation);
        if current {
            *active = None;
        }

        match reply {
            Ok(text) if current => {
                self.history.lock().append(Role::Assistant, &text);
                Ok(text)
            }
            Ok(_) => Err(DuoError::Cancelled),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("provider", &self.backend.provider())
            .field("model", &self.backend.model())
            .field("history", &self.history.lock().len())
            .finish_non_exhaustive()
    }
}
