use core::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{config::CompletionConfig, context::ConversationTurn, truncate};

/// Produces the reply for a transcript. Implementations never fail: any
/// problem turns into a displayable fallback string.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, transcript: &[ConversationTurn]) -> String;
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("completion response carried no reply text")]
    MissingReply,
}

#[derive(Deserialize)]
struct CompletionResponse {
    result: Option<CompletionResult>,
}

#[derive(Deserialize)]
struct CompletionResult {
    prompt: Option<String>,
}

/// Flattens persona and transcript into the single text the endpoint expects.
#[must_use]
pub fn compose_prompt(persona: &str, transcript: &[ConversationTurn]) -> String {
    let lines = transcript
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{persona}\n\n{lines}")
}

/// Completion endpoint reached with a single `GET` carrying the whole prompt.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    persona: String,
    config: CompletionConfig,
}

impl CompletionClient {
    /// # Errors
    ///
    /// Fails only if the HTTP client cannot be built.
    pub fn new(persona: impl Into<String>, config: CompletionConfig) -> Result<Self, CompletionError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            http: builder.build()?,
            persona: persona.into(),
            config,
        })
    }

    /// The raw request, without the fallback.
    ///
    /// # Errors
    ///
    /// Transport failures, non-success statuses, undecodable bodies and a
    /// missing or blank `result.prompt` are all errors.
    pub async fn request(&self, transcript: &[ConversationTurn]) -> Result<String, CompletionError> {
        let prompt = compose_prompt(&self.persona, transcript);
        debug!(endpoint = %self.config.endpoint, prompt_chars = prompt.chars().count(), "Requesting completion");

        let response: CompletionResponse = self
            .http
            .get(&self.config.endpoint)
            .query(&[(self.config.query_param.as_str(), prompt.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .result
            .and_then(|result| result.prompt)
            .filter(|reply| !reply.trim().is_empty())
            .ok_or(CompletionError::MissingReply)
    }
}

#[async_trait]
impl Completer for CompletionClient {
    async fn complete(&self, transcript: &[ConversationTurn]) -> String {
        match self.request(transcript).await {
            Ok(reply) => {
                debug!(reply = %truncate(&reply, 200), "Completion received");
                reply
            }
            Err(e) => {
                warn!(error = %e, endpoint = %self.config.endpoint, "Completion failed; using fallback reply");
                self.config.fallback_reply.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn transcript() -> Vec<ConversationTurn> {
        vec![
            ConversationTurn::user("hi"),
            ConversationTurn::assistant("yo"),
            ConversationTurn::user("hello"),
        ]
    }

    fn client_for(endpoint: String) -> CompletionClient {
        let config = CompletionConfig {
            endpoint,
            ..CompletionConfig::default()
        };
        CompletionClient::new("Be me.", config).unwrap()
    }

    #[test]
    fn prompt_lists_turns_after_persona() {
        let prompt = compose_prompt("Be me.", &transcript());
        assert_eq!(prompt, "Be me.\n\nUser: hi\nAssistant: yo\nUser: hello");
    }

    #[tokio::test]
    async fn reply_is_read_from_nested_field() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/chatgpt")
                    .query_param("text", "Be me.\n\nUser: hi\nAssistant: yo\nUser: hello");
                then.status(200)
                    .json_body(json!({ "result": { "prompt": "haha wassup" } }));
            })
            .await;

        let client = client_for(server.url("/api/chatgpt"));
        assert_eq!(client.complete(&transcript()).await, "haha wassup");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_field_falls_back() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/chatgpt");
                then.status(200).json_body(json!({ "status": "ok" }));
            })
            .await;

        let client = client_for(server.url("/api/chatgpt"));
        assert!(matches!(
            client.request(&transcript()).await,
            Err(CompletionError::MissingReply)
        ));
        assert_eq!(
            client.complete(&transcript()).await,
            CompletionConfig::default().fallback_reply
        );
    }

    #[tokio::test]
    async fn server_error_and_bad_json_fall_back() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/broken");
                then.status(500).body("boom");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/garbage");
                then.status(200).body("<html>not json</html>");
            })
            .await;

        for path in ["/broken", "/garbage"] {
            let reply = client_for(server.url(path)).complete(&transcript()).await;
            assert_eq!(reply, CompletionConfig::default().fallback_reply);
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_falls_back_to_non_empty_reply() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client = client_for(format!("http://127.0.0.1:{port}/api/chatgpt"));

        let reply = client.complete(&transcript()).await;
        assert!(!reply.is_empty());
        assert_eq!(reply, CompletionConfig::default().fallback_reply);
    }
}
