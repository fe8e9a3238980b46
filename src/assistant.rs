//! Utterance router
//!
//! Each utterance is tried as a star command, then as an app launch, and
//! only then sent to the model. The streamed reply is spoken as it
//! arrives.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    config::Config,
    error::{DuoError, Result},
    services::{
        app_launch::{AppLaunchService, HeadlessLauncher},
        conversation_log::{ConversationLogClient, ConversationUploader},
        speech::SpeechSynthesizer,
        stars::{JsonStarStore, StarCommand, StarStore},
        ChatBackend, ChatBackendFactory, ChatService, HttpTransport,
    },
};

/// What the assistant did with an utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A star command was applied
    Stars(String),
    /// Another app was opened
    AppLaunched(String),
    /// Full model reply
    Chat(String),
    /// The model could not answer; carries the message to show
    Failed(String),
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Self::Stars(text) | Self::AppLaunched(text) | Self::Chat(text) | Self::Failed(text) => {
                text
            }
        }
    }
}

pub struct Assistant {
    chat: ChatService,
    stars: Arc<dyn StarStore>,
    apps: AppLaunchService,
    speaker: Arc<dyn SpeechSynthesizer>,
    log: Option<ConversationUploader>,
}

impl Assistant {
    pub fn new(
        chat: ChatService,
        stars: Arc<dyn StarStore>,
        apps: AppLaunchService,
        speaker: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            chat,
            stars,
            apps,
            speaker,
            log: None,
        }
    }

    /// Wire up the assistant from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the model profile is unknown or unusable, or the
    /// star file cannot be opened
    pub fn from_config(
        config: &Config,
        model: Option<&str>,
        speaker: Arc<dyn SpeechSynthesizer>,
    ) -> Result<Self> {
        let profile = config.select_model(model)?;
        let backend: Arc<dyn ChatBackend> = ChatBackendFactory::create(profile)?.into();
        info!(
            profile = %profile.name,
            provider = backend.provider(),
            model = backend.model(),
            "using model"
        );

        let chat = ChatService::new(
            backend,
            Arc::new(HttpTransport::new()?),
            config.global.system_prompt.clone(),
            config.global.max_history_turns,
            config.completion_options(),
        );
        let stars = JsonStarStore::open(config.stars_path())?;
        let apps = AppLaunchService::new(Arc::new(HeadlessLauncher));

        let mut assistant = Self::new(chat, Arc::new(stars), apps, speaker);
        if let Some(url) = &config.global.conversation_log_url {
            let log = ConversationLogClient::new(url.as_str())?.with_llm_model(&profile.model_name);
            assistant = assistant.with_conversation_log(log);
        }
        Ok(assistant)
    }

    /// Mirror conversations to an upload service
    ///
    /// Uploads run on a background task, so this must be called within a
    /// Tokio runtime.
    #[must_use]
    pub fn with_conversation_log(mut self, log: ConversationLogClient) -> Self {
        self.log = Some(ConversationUploader::spawn(log));
        self
    }

    /// Wait for queued conversation uploads to be attempted
    pub async fn flush_uploads(&self) {
        if let Some(log) = &self.log {
            log.flush().await;
        }
    }

    pub fn chat(&self) -> &ChatService {
        &self.chat
    }

    /// Handle one final transcript
    ///
    /// Deltas go to the speaker and to `on_delta`, in order.
    ///
    /// # Errors
    ///
    /// Returns [`DuoError::Cancelled`] if a newer utterance or a reset
    /// superseded this one. Other chat failures become [`Reply::Failed`].
    pub async fn handle_utterance(
        &self,
        text: &str,
        mut on_delta: impl FnMut(&str) + Send + 'static,
    ) -> Result<Reply> {
        let text = text.trim();
        info!(chars = text.chars().count(), "handling utterance");

        if let Some(log) = &self.log {
            log.upload_user_message(text);
        }

        if let Some(command) = StarCommand::parse(text) {
            info!(?command, "star command");
            return Ok(Reply::Stars(command.execute(self.stars.as_ref())));
        }

        if let Some(result) = self.apps.check_and_launch(text) {
            if result.launched {
                return Ok(Reply::AppLaunched(result.message));
            }
            self.speaker.speak(&result.message);
        }

        let speaker = self.speaker.clone();
        let reply = self
            .chat
            .send_prompt(text, move |delta| {
                speaker.speak_addition(delta);
                on_delta(delta);
            })
            .await;

        match reply {
            Ok(full) => {
                if let Some(log) = &self.log {
                    log.upload_assistant_message(&full);
                }
                Ok(Reply::Chat(full))
            }
            Err(DuoError::Cancelled) => Err(DuoError::Cancelled),
            Err(e) => {
                warn!(error = %e, "chat failed");
                self.speaker.stop();
                Ok(Reply::Failed(e.friendly_message().to_string()))
            }
        }
    }

    /// Stop speaking, cancel any reply and start a fresh conversation
    pub fn reset(&self) {
        self.speaker.stop();
        self.chat.reset();
        if let Some(log) = &self.log {
            log.reset();
        }
    }
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("chat", &self.chat)
            .field("apps", &self.apps)
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}
