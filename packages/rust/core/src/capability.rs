//! Generative capabilities consumed by the pipeline.
//!
//! Implementations:
//! - [`OpenAiChat`](crate::openai::OpenAiChat): chat completions with optional inline image
//! - [`OpenAiTranscriber`](crate::openai::OpenAiTranscriber): speech-to-text

use async_trait::async_trait;

use mediaqa_shared::Result;

/// Image bytes attached to a reasoning request.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    /// Declared media type, e.g. `image/png`.
    pub mime_type: String,
}

/// A single-turn request to a reasoning service.
#[derive(Debug, Clone, Default)]
pub struct ReasoningRequest {
    /// Optional system prompt.
    pub system: Option<String>,
    /// User instruction.
    pub instruction: String,
    /// Optional image for vision-capable models.
    pub image: Option<ImagePayload>,
    /// Optional cap on generated tokens.
    pub max_tokens: Option<u32>,
}

impl ReasoningRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_image(mut self, image: ImagePayload) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Audio bytes sent for transcription.
#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub bytes: Vec<u8>,
    /// File name reported to the service; its extension hints the format.
    pub file_name: String,
    pub mime_type: Option<String>,
}

/// Text (and vision) completion service.
#[async_trait]
pub trait ReasoningCapability: Send + Sync {
    /// Run one completion and return the generated text.
    async fn complete(&self, request: ReasoningRequest) -> Result<String>;

    /// Provider/model label for logging.
    fn name(&self) -> &str;
}

/// Speech-to-text service.
#[async_trait]
pub trait TranscriptionCapability: Send + Sync {
    /// Return the verbatim transcript of `audio`.
    async fn transcribe(&self, audio: AudioPayload) -> Result<String>;

    /// Provider/model label for logging.
    fn name(&self) -> &str;
}
