//! Client for the conversation upload service
//!
//! Every exchange is mirrored to a small REST service so parents can
//! review conversations later. Uploads are best effort: the
//! [`ConversationUploader`] runs them on a background task in order and
//! logs failures, so a slow service never holds up a reply.

use std::time::Duration;

use parking_lot::Mutex;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{
    error::{DuoError, Result},
    messages::Role,
};

/// Characters of the first message used as a new conversation's title
pub const TITLE_CHARS: usize = 20;

const DEFAULT_LLM_MODEL: &str = "defaultModel";

/// Upper bound on one upload request, connection included
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateConversationRequest<'a> {
    title: &'a str,
    llm_model: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddChatRequest<'a> {
    content: &'a str,
    conversation_id: i64,
    #[serde(rename = "type")]
    kind: &'a str,
    role: &'a str,
}

/// Response envelope shared by every endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    success: bool,
    result_code: String,
    data: Option<T>,
    #[serde(default)]
    values: Vec<serde_json::Value>,
}

impl<T> Envelope<T> {
    fn is_success(&self) -> bool {
        self.success && self.result_code == "SUCCESS"
    }
}

#[derive(Debug, Deserialize)]
struct ConversationData {
    id: i64,
}

/// Uploads conversations and their messages
#[derive(Debug)]
pub struct ConversationLogClient {
    client: Client,
    base_url: String,
    llm_model: String,
    current: Mutex<Option<i64>>,
}

impl ConversationLogClient {
    /// Create a client for the service at `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client(UPLOAD_TIMEOUT)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            current: Mutex::new(None),
        })
    }

    /// Model name recorded on new conversations
    #[must_use]
    pub fn with_llm_model(mut self, model: impl Into<String>) -> Self {
        self.llm_model = model.into();
        self
    }

    /// Replace the per-request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be rebuilt
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    pub fn current_conversation_id(&self) -> Option<i64> {
        *self.current.lock()
    }

    /// Forget the current conversation; the next upload starts a new one
    pub fn reset(&self) {
        *self.current.lock() = None;
        debug!("conversation log reset");
    }

    /// Create a conversation and make it current
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the service rejects it
    pub async fn create_conversation(&self, title: &str) -> Result<i64> {
        let request = CreateConversationRequest {
            title,
            llm_model: &self.llm_model,
        };
        let envelope: Envelope<ConversationData> =
            self.post("/conversations/add.json", &request).await?;

        let id = envelope
            .data
            .map(|data| data.id)
            .ok_or_else(|| DuoError::ConversationLog("response has no conversation".into()))?;

        *self.current.lock() = Some(id);
        info!(conversation = id, "conversation created");
        Ok(id)
    }

    /// Append a message to the current conversation
    ///
    /// # Errors
    ///
    /// Returns an error if there is no current conversation, the request
    /// fails, or the service rejects it
    pub async fn add_chat(&self, content: &str, role: Role) -> Result<()> {
        let conversation_id = self
            .current_conversation_id()
            .ok_or_else(|| DuoError::ConversationLog("no active conversation".into()))?;

        let request = AddChatRequest {
            content,
            conversation_id,
            kind: "TEXT",
            role: role.as_str(),
        };
        let envelope: Envelope<serde_json::Value> =
            self.post("/conversations/addChat.json", &request).await?;

        debug!(
            conversation = conversation_id,
            role = %role,
            records = envelope.values.len(),
            "chat uploaded"
        );
        Ok(())
    }

    /// Upload a user message, opening a conversation on the first one
    ///
    /// # Errors
    ///
    /// Returns an error if either request fails
    pub async fn upload_user_message(&self, message: &str) -> Result<()> {
        if self.current_conversation_id().is_none() {
            let title: String = message.chars().take(TITLE_CHARS).collect();
            self.create_conversation(&title).await?;
        }
        self.add_chat(message, Role::User).await
    }

    /// Upload a complete assistant reply
    ///
    /// # Errors
    ///
    /// Returns an error if there is no conversation or the request fails
    pub async fn upload_assistant_message(&self, message: &str) -> Result<()> {
        self.add_chat(message, Role::Assistant).await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<Envelope<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let response = self.client.post(&url).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DuoError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope<T> = response.json().await?;
        if !envelope.is_success() {
            return Err(DuoError::ConversationLog(format!(
                "{path} returned {}",
                envelope.result_code
            )));
        }
        Ok(envelope)
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .default_headers({
            let mut headers = header::HeaderMap::new();
            headers.insert(header::ACCEPT, header::HeaderValue::from_static("*/*"));
            headers.insert(
                header::ACCEPT_LANGUAGE,
                header::HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8,zh-TW;q=0.7"),
            );
            headers
        })
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

#[derive(Debug)]
enum Upload {
    User(String),
    Assistant(String),
    Reset,
    Flush(oneshot::Sender<()>),
}

/// Queues uploads for a background task that sends them one at a time
///
/// Jobs run in submission order, so a conversation is created before its
/// first chat and a reset only applies after the uploads queued before it.
#[derive(Debug, Clone)]
pub struct ConversationUploader {
    jobs: mpsc::UnboundedSender<Upload>,
}

impl ConversationUploader {
    /// Start the upload task. Must be called within a Tokio runtime.
    pub fn spawn(client: ConversationLogClient) -> Self {
        let (jobs, mut queue) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(job) = queue.recv().await {
                match job {
                    Upload::User(text) => {
                        if let Err(e) = client.upload_user_message(&text).await {
                            warn!(error = %e, "user message upload failed");
                        }
                    }
                    Upload::Assistant(text) => {
                        if let Err(e) = client.upload_assistant_message(&text).await {
                            warn!(error = %e, "assistant message upload failed");
                        }
                    }
                    Upload::Reset => client.reset(),
                    Upload::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("upload queue closed");
        });

        Self { jobs }
    }

    pub fn upload_user_message(&self, message: &str) {
        self.submit(Upload::User(message.to_string()));
    }

    pub fn upload_assistant_message(&self, message: &str) {
        self.submit(Upload::Assistant(message.to_string()));
    }

    /// Start a new conversation once the queued uploads are done
    pub fn reset(&self) {
        self.submit(Upload::Reset);
    }

    /// Wait until every upload queued so far has been attempted
    pub async fn flush(&self) {
        let (done, finished) = oneshot::channel();
        self.submit(Upload::Flush(done));
        let _ = finished.await;
    }

    fn submit(&self, job: Upload) {
        if self.jobs.send(job).is_err() {
            warn!("upload task is gone, dropping upload");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn created(id: i64) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "resultCode": "SUCCESS",
            "data": {"id": id, "title": "t", "llmModel": "defaultModel", "ext": {}, "chatList": []},
            "values": [],
        }))
    }

    fn chat_ok() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "resultCode": "SUCCESS",
            "data": null,
            "values": [{"id": 1, "role": "user"}],
        }))
    }

    #[tokio::test]
    async fn test_first_message_opens_conversation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations/add.json"))
            .and(body_json(json!({
                "title": "今天幼儿园里发生了一件特别好玩的事情我想",
                "llmModel": "defaultModel",
            })))
            .respond_with(created(42))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/conversations/addChat.json"))
            .and(body_json(json!({
                "content": "今天幼儿园里发生了一件特别好玩的事情我想告诉你",
                "conversationId": 42,
                "type": "TEXT",
                "role": "user",
            })))
            .respond_with(chat_ok())
            .expect(1)
            .mount(&server)
            .await;

        let client = ConversationLogClient::new(server.uri()).unwrap();
        client
            .upload_user_message("今天幼儿园里发生了一件特别好玩的事情我想告诉你")
            .await
            .unwrap();
        assert_eq!(client.current_conversation_id(), Some(42));
    }

    #[tokio::test]
    async fn test_assistant_message_needs_conversation() {
        let client = ConversationLogClient::new("http://127.0.0.1:1").unwrap();
        assert!(matches!(
            client.upload_assistant_message("hi").await,
            Err(DuoError::ConversationLog(_))
        ));
    }

    #[tokio::test]
    async fn test_rejected_envelope_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations/add.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "resultCode": "PARAM_ERROR",
                "data": null,
                "values": [],
            })))
            .mount(&server)
            .await;

        let client = ConversationLogClient::new(server.uri()).unwrap();
        let err = client.create_conversation("t").await.unwrap_err();
        assert!(err.to_string().contains("PARAM_ERROR"));
        assert_eq!(client.current_conversation_id(), None);
    }

    #[tokio::test]
    async fn test_reset_starts_new_conversation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations/add.json"))
            .respond_with(created(7))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/conversations/addChat.json"))
            .respond_with(chat_ok())
            .mount(&server)
            .await;

        let client = ConversationLogClient::new(format!("{}/", server.uri())).unwrap();
        client.upload_user_message("一").await.unwrap();
        client.upload_assistant_message("二").await.unwrap();
        client.upload_user_message("三").await.unwrap();
        client.reset();
        assert_eq!(client.current_conversation_id(), None);
        client.upload_user_message("四").await.unwrap();
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(created(1).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let client = ConversationLogClient::new(server.uri())
            .unwrap()
            .with_timeout(Duration::from_millis(200))
            .unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), client.create_conversation("t"))
            .await
            .expect("request should give up on its own");
        assert!(matches!(result, Err(DuoError::Http(_))));
        assert_eq!(client.current_conversation_id(), None);
    }

    #[tokio::test]
    async fn test_uploader_keeps_order_across_reset() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations/add.json"))
            .respond_with(created(5))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/conversations/addChat.json"))
            .respond_with(chat_ok())
            .expect(3)
            .mount(&server)
            .await;

        let client = ConversationLogClient::new(server.uri()).unwrap();
        let uploader = ConversationUploader::spawn(client);
        uploader.upload_user_message("一");
        uploader.upload_assistant_message("二");
        uploader.reset();
        uploader.upload_user_message("三");
        uploader.flush().await;

        let paths: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|request| request.url.path().to_string())
            .collect();
        assert_eq!(
            paths,
            vec![
                "/conversations/add.json",
                "/conversations/addChat.json",
                "/conversations/addChat.json",
                "/conversations/add.json",
                "/conversations/addChat.json",
            ]
        );
    }
}
