//! HTTP transport for streaming requests
//!
//! The transport only opens the request and hands back the raw body as a
//! byte stream; all parsing happens in [`crate::services::streaming`].

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{header, Client};
use tracing::debug;

use crate::error::{DuoError, Result};

/// Raw response body, one item per network read
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A fully built streaming request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub url: String,
    pub bearer_token: Option<String>,
    pub body: serde_json::Value,
}

/// Opens streaming requests
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and return the response body as it arrives
    async fn open(&self, request: ChatRequest) -> Result<ByteStream>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a new transport
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .default_headers({
                let mut headers = header::HeaderMap::new();
                headers.insert(
                    header::CONTENT_TYPE,
                    header::HeaderValue::from_static("application/json"),
                );
                headers
            })
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: ChatRequest) -> Result<ByteStream> {
        debug!(url = %request.url, "opening streaming request");

        let mut builder = self.client.post(&request.url).json(&request.body);
        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DuoError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DuoError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| DuoError::Transport(e.to_string())));

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{body_partial_json, header as header_matcher, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    async fn collect(mut stream: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_streams_body_with_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header_matcher("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_string("data: [DONE]\n\n"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let stream = transport
            .open(ChatRequest {
                url: format!("{}/chat/completions", server.uri()),
                bearer_token: Some("sk-test".into()),
                body: serde_json::json!({"model": "qwen-max", "stream": true}),
            })
            .await
            .unwrap();

        assert_eq!(collect(stream).await, b"data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let result = transport
            .open(ChatRequest {
                url: format!("{}/api/generate", server.uri()),
                bearer_token: None,
                body: serde_json::json!({}),
            })
            .await;

        match result {
            Err(DuoError::HttpStatus { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad key");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected an HTTP status error"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let transport = HttpTransport::new().unwrap();
        let result = transport
            .open(ChatRequest {
                url: "http://127.0.0.1:1/api/generate".into(),
                bearer_token: None,
                body: serde_json::json!({}),
            })
            .await;
        assert!(matches!(result, Err(DuoError::Transport(_))));
    }
}
