//! AI client for call summaries and speech transcription
//!
//! Talks to an OpenAI-compatible API: chat completions for summaries and
//! `audio/transcriptions` for speech. Transient failures (timeouts, 429, 5xx)
//! are retried with exponential backoff.

use std::time::Duration;

use reqwest::{multipart, Client};
use serde_json::json;
use supportly_shared::{SessionMessage, TranscriptEntry};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use uuid::Uuid;

/// Total tries per request, the first one included
const MAX_ATTEMPTS: usize = 3;
const RETRY_MAX_DELAY: Duration = Duration::from_secs(4);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest conversation (in characters) sent for summarization; older lines
/// are dropped first
const MAX_CONVERSATION_CHARS: usize = 48_000;

const SUMMARY_PROMPT: &str = "You summarize customer support video calls. \
Write a short summary for both the customer and the agent: the problem, \
what was tried, the outcome, and any follow-up actions. Use plain text, \
at most 8 sentences.";

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: String,
    pub base_url: String,
    pub summary_model: String,
    pub transcription_model: String,
}

impl AiConfig {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            api_key: config.ai_api_key.clone(),
            base_url: config.ai_base_url.trim_end_matches('/').to_string(),
            summary_model: config.ai_summary_model.clone(),
            transcription_model: config.ai_transcription_model.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("AI provider is not configured")]
    NotConfigured,
    #[error("AI request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("AI provider returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("AI provider returned an empty response")]
    EmptyResponse,
}

impl AiError {
    fn is_transient(&self) -> bool {
        match self {
            AiError::Http(e) => e.is_timeout() || e.is_connect(),
            AiError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// OpenAI-compatible client
#[derive(Clone)]
pub struct AiClient {
    config: AiConfig,
    client: Client,
}

impl AiClient {
    pub fn new(config: AiConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { config, client }
    }

    pub fn is_enabled(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    fn retry_strategy() -> impl Iterator<Item = Duration> {
        // 200ms, 400ms between attempts
        ExponentialBackoff::from_millis(2)
            .factor(100)
            .max_delay(RETRY_MAX_DELAY)
            .map(jitter)
            .take(MAX_ATTEMPTS - 1)
    }

    /// Summarize a call. Returns `Ok(None)` when there is nothing to summarize.
    pub async fn summarize(&self, conversation: &str) -> Result<Option<String>, AiError> {
        if !self.is_enabled() {
            return Err(AiError::NotConfigured);
        }
        if conversation.trim().is_empty() {
            return Ok(None);
        }

        let url = format!("{}/chat/completions", self.config.base_url);
        let body = json!({
            "model": self.config.summary_model,
            "messages": [
                {"role": "system", "content": SUMMARY_PROMPT},
                {"role": "user", "content": conversation},
            ],
            "temperature": 0.2
        });

        let resp_json: serde_json::Value = RetryIf::start(
            Self::retry_strategy(),
            || async {
                let resp = self
                    .client
                    .post(&url)
                    .bearer_auth(&self.config.api_key)
                    .json(&body)
                    .send()
                    .await?;
                read_json(resp).await
            },
            |e: &AiError| {
                let transient = e.is_transient();
                if transient {
                    tracing::debug!(error = %e, "Transient summary error - will retry");
                }
                transient
            },
        )
        .await?;

        let summary = resp_json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(AiError::EmptyResponse)?;

        Ok(Some(summary.to_string()))
    }

    /// Transcribe one chunk of recorded audio
    pub async fn transcribe(&self, audio: Vec<u8>, mime_type: &str) -> Result<String, AiError> {
        if !self.is_enabled() {
            return Err(AiError::NotConfigured);
        }

        let url = format!("{}/audio/transcriptions", self.config.base_url);
        let file_name = format!("chunk.{}", audio_extension(mime_type));

        let resp_json: serde_json::Value = RetryIf::start(
            Self::retry_strategy(),
            || async {
                let part = multipart::Part::bytes(audio.clone())
                    .file_name(file_name.clone())
                    .mime_str(mime_type)?;
                let form = multipart::Form::new()
                    .text("model", self.config.transcription_model.clone())
                    .part("file", part);

                let resp = self
                    .client
                    .post(&url)
                    .bearer_auth(&self.config.api_key)
                    .multipart(form)
                    .send()
                    .await?;
                read_json(resp).await
            },
            |e: &AiError| e.is_transient(),
        )
        .await?;

        Ok(resp_json["text"].as_str().unwrap_or_default().trim().to_string())
    }
}

async fn read_json(resp: reqwest::Response) -> Result<serde_json::Value, AiError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(AiError::Api {
            status: status.as_u16(),
            body: resp.text().await.unwrap_or_default(),
        });
    }
    Ok(resp.json().await?)
}

fn audio_extension(mime_type: &str) -> &'static str {
    match mime_type.split(';').next().unwrap_or_default().trim() {
        "audio/ogg" => "ogg",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/mpeg" => "mp3",
        "audio/mp4" => "m4a",
        _ => "webm",
    }
}

/// Interleave transcript and chat into one labelled conversation, oldest
/// first, keeping the most recent lines when the result is too long.
pub fn build_conversation(
    customer_id: Uuid,
    transcript: &[TranscriptEntry],
    messages: &[SessionMessage],
) -> String {
    let label = |id: Uuid| if id == customer_id { "Customer" } else { "Agent" };

    let mut lines: Vec<(time::OffsetDateTime, String)> = transcript
        .iter()
        .map(|t| (t.created_at, format!("{}: {}", label(t.speaker_id), t.text)))
        .chain(
            messages
                .iter()
                .map(|m| (m.created_at, format!("{} (chat): {}", label(m.sender_id), m.content))),
        )
        .collect();
    lines.sort_by_key(|(at, _)| *at);

    let mut total = 0;
    let mut kept: Vec<&str> = Vec::new();
    for (_, line) in lines.iter().rev() {
        total += line.len() + 1;
        if total > MAX_CONVERSATION_CHARS {
            break;
        }
        kept.push(line);
    }
    kept.reverse();
    kept.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn config(base_url: &str) -> AiConfig {
        AiConfig {
            api_key: "sk-test".to_string(),
            base_url: base_url.to_string(),
            summary_model: "test-model".to_string(),
            transcription_model: "whisper-1".to_string(),
        }
    }

    #[test]
    fn test_build_conversation_interleaves() {
        let customer = Uuid::new_v4();
        let agent = Uuid::new_v4();
        let session_id = Uuid::new_v4();

        let transcript = vec![
            TranscriptEntry {
                id: Uuid::new_v4(),
                session_id,
                speaker_id: customer,
                text: "My printer is offline".to_string(),
                created_at: datetime!(2025-03-03 10:00 UTC),
            },
            TranscriptEntry {
                id: Uuid::new_v4(),
                session_id,
                speaker_id: agent,
                text: "Let's restart the spooler".to_string(),
                created_at: datetime!(2025-03-03 10:02 UTC),
            },
        ];
        let messages = vec![SessionMessage {
            id: Uuid::new_v4(),
            session_id,
            sender_id: agent,
            content: "Here is the driver link".to_string(),
            created_at: datetime!(2025-03-03 10:01 UTC),
        }];

        let conversation = build_conversation(customer, &transcript, &messages);
        assert_eq!(
            conversation,
            "Customer: My printer is offline\n\
             Agent (chat): Here is the driver link\n\
             Agent: Let's restart the spooler"
        );
    }

    #[test]
    fn test_build_conversation_empty() {
        assert_eq!(build_conversation(Uuid::new_v4(), &[], &[]), "");
    }

    #[test]
    fn test_audio_extension() {
        assert_eq!(audio_extension("audio/webm;codecs=opus"), "webm");
        assert_eq!(audio_extension("audio/ogg"), "ogg");
        assert_eq!(audio_extension("application/octet-stream"), "webm");
    }

    #[tokio::test]
    async fn test_summarize_not_configured() {
        let mut cfg = config("http://127.0.0.1:9");
        cfg.api_key.clear();
        let client = AiClient::new(cfg);
        assert!(matches!(
            client.summarize("Customer: hi").await,
            Err(AiError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_summarize_empty_conversation_skips_request() {
        let client = AiClient::new(config("http://127.0.0.1:9"));
        assert!(client.summarize("   ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_summarize_parses_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"  Spooler restarted.  "}}]}"#)
            .create_async()
            .await;

        let client = AiClient::new(config(&server.url()));
        let summary = client.summarize("Customer: printer offline").await.unwrap();

        assert_eq!(summary.as_deref(), Some("Spooler restarted."));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_summarize_client_error_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(400)
            .with_body("bad request")
            .expect(1)
            .create_async()
            .await;

        let client = AiClient::new(config(&server.url()));
        let result = client.summarize("Customer: hi").await;

        assert!(matches!(result, Err(AiError::Api { status: 400, .. })));
        mock.assert_async().await;
    }

    #[test]
    fn test_retry_strategy_allows_three_attempts() {
        // One delay between each pair of attempts
        assert_eq!(AiClient::retry_strategy().count(), 2);
    }

    #[tokio::test]
    async fn test_summarize_server_error_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .expect(MAX_ATTEMPTS)
            .create_async()
            .await;

        let client = AiClient::new(config(&server.url()));
        let result = client.summarize("Customer: hi").await;

        assert!(matches!(result, Err(AiError::Api { status: 503, .. })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_transcribe_returns_text() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/audio/transcriptions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"text":" hello there "}"#)
            .create_async()
            .await;

        let client = AiClient::new(config(&server.url()));
        let text = client.transcribe(vec![0u8; 32], "audio/webm").await.unwrap();
        assert_eq!(text, "hello there");
    }
}
