//! OpenAI-compatible HTTP client for the reasoning and transcription capabilities.
//!
//! - Chat: `POST {base}/chat/completions`, images inlined as base64 data URLs
//! - Transcription: `POST {base}/audio/transcriptions`, multipart `file` + `model`

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use mediaqa_shared::{LlmSettings, MediaQaError, Result};

use crate::capability::{
    AudioPayload, ReasoningCapability, ReasoningRequest, TranscriptionCapability,
};

/// Longest slice of an error body echoed into error messages.
const ERROR_BODY_PREVIEW: usize = 200;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Shared HTTP state for an OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl OpenAiClient {
    /// Create a client for `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(mut base_url: Url, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .user_agent(concat!("mediaqa/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| MediaQaError::Capability(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
        })
    }

    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        Self::new(
            settings.base_url.clone(),
            settings.api_key.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    /// A reasoning capability bound to `model`.
    pub fn chat(&self, model: impl Into<String>) -> OpenAiChat {
        OpenAiChat {
            client: self.clone(),
            model: model.into(),
        }
    }

    /// A transcription capability bound to `model`.
    pub fn transcriber(&self, model: impl Into<String>) -> OpenAiTranscriber {
        OpenAiTranscriber {
            client: self.clone(),
            model: model.into(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| MediaQaError::Capability(format!("invalid endpoint '{path}': {e}")))
    }

    /// Check the status and decode a JSON body, mapping failures to capability errors.
    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
            return Err(MediaQaError::Capability(format!("HTTP {status}: {preview}")));
        }

        response
            .json()
            .await
            .map_err(|e| MediaQaError::Capability(format!("invalid response body: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Chat completions
// ---------------------------------------------------------------------------

/// Chat-completions model implementing [`ReasoningCapability`].
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: OpenAiClient,
    model: String,
}

impl OpenAiChat {
    fn build_request<'a>(&'a self, request: &ReasoningRequest) -> ChatRequest<'a> {
        let mut messages = Vec::new();

        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: MessageContent::Text(system.clone()),
            });
        }

        let content = match &request.image {
            None => MessageContent::Text(request.instruction.clone()),
            Some(image) => MessageContent::Parts(vec![
                ContentPart::Text {
                    text: request.instruction.clone(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!(
                            "data:{};base64,{}",
                            image.mime_type,
                            BASE64.encode(&image.bytes)
                        ),
                    },
                },
            ]),
        };
        messages.push(ChatMessage {
            role: "user",
            content,
        });

        ChatRequest {
            model: &self.model,
            messages,
            max_tokens: request.max_tokens,
        }
    }
}

#[async_trait]
impl ReasoningCapability for OpenAiChat {
    #[instrument(skip_all, fields(model = %self.model, image = request.image.is_some()))]
    async fn complete(&self, request: ReasoningRequest) -> Result<String> {
        let url = self.client.endpoint("chat/completions")?;
        let body = self.build_request(&request);

        let response = self
            .client
            .http
            .post(url)
            .bearer_auth(&self.client.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MediaQaError::Capability(format!("chat request failed: {e}")))?;

        let parsed: ChatResponse = OpenAiClient::decode(response).await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| MediaQaError::Capability("response contained no message".into()))?;

        debug!(len = text.len(), "completion received");
        Ok(text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Transcriptions
// ---------------------------------------------------------------------------

/// Speech-to-text model implementing [`TranscriptionCapability`].
#[derive(Debug, Clone)]
pub struct OpenAiTranscriber {
    client: OpenAiClient,
    model: String,
}

#[async_trait]
impl TranscriptionCapability for OpenAiTranscriber {
    #[instrument(skip_all, fields(model = %self.model, file = %audio.file_name))]
    async fn transcribe(&self, audio: AudioPayload) -> Result<String> {
        let url = self.client.endpoint("audio/transcriptions")?;

        let mut part = Part::bytes(audio.bytes).file_name(audio.file_name);
        if let Some(mime) = &audio.mime_type {
            part = part
                .mime_str(mime)
                .map_err(|e| MediaQaError::Capability(format!("invalid audio type '{mime}': {e}")))?;
        }
        let form = Form::new().part("file", part).text("model", self.model.clone());

        let response = self
            .client
            .http
            .post(url)
            .bearer_auth(&self.client.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| MediaQaError::Capability(format!("transcription request failed: {e}")))?;

        let parsed: TranscriptionResponse = OpenAiClient::decode(response).await?;
        debug!(len = parsed.text.len(), "transcript received");
        Ok(parsed.text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ImagePayload;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenAiClient {
        let base = Url::parse(&format!("{}/v1", server.uri())).unwrap();
        OpenAiClient::new(base, "sk-test", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn request_inlines_image_as_data_url() {
        let base = Url::parse("https://api.example.com/v1/").unwrap();
        let client = OpenAiClient::new(base, "k", Duration::from_secs(1)).unwrap();
        let chat = client.chat("gpt-4o");

        let request = ReasoningRequest::new("Describe this image.")
            .with_system("Be brief.")
            .with_image(ImagePayload {
                bytes: b"abc".to_vec(),
                mime_type: "image/png".into(),
            })
            .with_max_tokens(Some(300));

        let json = serde_json::to_value(chat.build_request(&request)).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["max_tokens"], 300);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"][0]["type"], "text");
        assert_eq!(json["messages"][1]["content"][1]["type"], "image_url");
        assert_eq!(
            json["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/png;base64,YWJj"
        );
    }

    #[test]
    fn text_only_request_uses_plain_content() {
        let base = Url::parse("https://api.example.com/v1").unwrap();
        let client = OpenAiClient::new(base, "k", Duration::from_secs(1)).unwrap();
        let json =
            serde_json::to_value(client.chat("m").build_request(&ReasoningRequest::new("Hi")))
                .unwrap();

        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["content"], "Hi");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let base = Url::parse("https://api.example.com/v1").unwrap();
        let client = OpenAiClient::new(base, "k", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.endpoint("chat/completions").unwrap().as_str(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn chat_completion_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "A red apple."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let chat = client_for(&server).chat("gpt-4o");
        let text = chat.complete(ReasoningRequest::new("What fruit?")).await.unwrap();
        assert_eq!(text, "A red apple.");
    }

    #[tokio::test]
    async fn chat_error_status_is_capability_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .chat("gpt-4o")
            .complete(ReasoningRequest::new("Hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaQaError::Capability(_)));
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn chat_without_content_is_capability_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": null}}]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .chat("gpt-4o")
            .complete(ReasoningRequest::new("Hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaQaError::Capability(_)));
    }

    #[tokio::test]
    async fn transcription_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"text": "Raz, dwa, trzy."})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transcriber = client_for(&server).transcriber("whisper-1");
        let text = transcriber
            .transcribe(AudioPayload {
                bytes: vec![0xFF, 0xFB, 0x90],
                file_name: "rafal.mp3".into(),
                mime_type: Some("audio/mpeg".into()),
            })
            .await
            .unwrap();
        assert_eq!(text, "Raz, dwa, trzy.");

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"model\""));
        assert!(body.contains("whisper-1"));
        assert!(body.contains("filename=\"rafal.mp3\""));
    }
}
