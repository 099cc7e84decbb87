//! Question answering over the document text and media descriptions.
//!
//! One reasoning call per question, in ordinal order. The first failure
//! aborts the whole stage; a partially answered set is never returned.

use std::collections::BTreeMap;

use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use mediaqa_shared::{
    Answer, AnswerSet, MediaDescription, MediaKind, MediaQaError, Question, Result, ordinal_key,
};

use crate::capability::{ReasoningCapability, ReasoningRequest};
use crate::pipeline::ProgressReporter;

/// System prompt for every answering call.
pub const SYSTEM_PROMPT: &str = "You are a precise assistant that provides concise but complete \
sentence answers. Focus on essential information while maintaining proper sentence structure. \
Never exceed 15 words in your answer.";

/// Word limit requested from the model.
pub const DEFAULT_MAX_WORDS: usize = 15;

/// Characters stripped from both ends of a raw answer.
const QUOTE_CHARS: &[char] = &['"', '\'', '“', '”', '„', '‘', '’', '«', '»', '`'];

const TERMINAL_PUNCTUATION: &[char] = &['.', '!', '?'];

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Everything the model gets to see besides the question itself.
#[derive(Debug, Clone, Copy)]
pub struct AnswerContext<'a> {
    pub document_text: &'a str,
    pub media: &'a [MediaDescription],
}

#[derive(Debug, Clone)]
pub struct AnswerEngineConfig {
    /// Extra disambiguation text keyed by question ordinal.
    pub hints: BTreeMap<usize, String>,
    pub system_prompt: String,
    pub max_words: usize,
}

impl Default for AnswerEngineConfig {
    fn default() -> Self {
        Self {
            hints: BTreeMap::new(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            max_words: DEFAULT_MAX_WORDS,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct AnswerEngine<'a> {
    reasoning: &'a dyn ReasoningCapability,
    config: AnswerEngineConfig,
}

impl<'a> AnswerEngine<'a> {
    pub fn new(reasoning: &'a dyn ReasoningCapability, config: AnswerEngineConfig) -> Self {
        Self { reasoning, config }
    }

    /// Answer a single question.
    #[instrument(skip_all, fields(question = question.ordinal))]
    pub async fn answer_one(&self, question: &Question, context: AnswerContext<'_>) -> Result<Answer> {
        let prompt = self.build_prompt(question, context);
        let request =
            ReasoningRequest::new(prompt).with_system(self.config.system_prompt.clone());

        let raw = self.reasoning.complete(request).await?;
        let text = format_answer(&raw).ok_or_else(|| {
            MediaQaError::Capability(format!(
                "empty answer for question {}",
                ordinal_key(question.ordinal)
            ))
        })?;

        let words = text.split_whitespace().count();
        if words > self.config.max_words {
            warn!(words, limit = self.config.max_words, "answer exceeds word limit");
        }

        debug!(answer = %text, "question answered");
        Ok(Answer {
            ordinal: question.ordinal,
            text,
        })
    }

    /// Answer every question in order, stopping at the first failure.
    #[instrument(skip_all, fields(count = questions.len(), model = self.reasoning.name()))]
    pub async fn answer(
        &self,
        questions: &[Question],
        context: AnswerContext<'_>,
        progress: &dyn ProgressReporter,
    ) -> Result<AnswerSet> {
        let mut answers = AnswerSet::new();
        let total = questions.len();

        for (i, question) in questions.iter().enumerate() {
            let answer = self.answer_one(question, context).await?;
            progress.question_answered(&ordinal_key(answer.ordinal), i + 1, total);
            answers.insert(answer);
        }

        info!(answered = answers.len(), "questions answered");
        Ok(answers)
    }

    /// Full user prompt for `question`.
    pub fn build_prompt(&self, question: &Question, context: AnswerContext<'_>) -> String {
        let images = media_json(context.media, MediaKind::Image);
        let audio = media_json(context.media, MediaKind::Audio);

        let mut prompt = String::new();
        prompt.push_str("Article Content:\n");
        prompt.push_str(context.document_text);
        prompt.push_str("\n\nImage Descriptions:\n");
        prompt.push_str(&images);
        prompt.push_str("\n\nAudio Transcriptions:\n");
        prompt.push_str(&audio);
        prompt.push_str(&format!(
            "\n\nQuestion {}:\n{}",
            ordinal_key(question.ordinal),
            question.text
        ));
        if let Some(hint) = self.config.hints.get(&question.ordinal) {
            prompt.push_str("\nNote: ");
            prompt.push_str(hint);
        }
        prompt.push_str(&format!(
            "\n\nAnswer in a single complete sentence of at most {} words.",
            self.config.max_words
        ));
        prompt
    }
}

/// Pretty JSON listing of the descriptions of one kind.
fn media_json(media: &[MediaDescription], kind: MediaKind) -> String {
    let text_field = match kind {
        MediaKind::Image => "description",
        MediaKind::Audio => "transcription",
    };

    let entries: Vec<Value> = media
        .iter()
        .filter(|m| m.reference.kind == kind)
        .map(|m| {
            json!({
                "url": m.reference.url,
                text_field: m.text,
                "caption": m.reference.caption.as_deref().unwrap_or_default(),
            })
        })
        .collect();

    serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
}

/// Strip wrapping quotes and make sure the answer ends with punctuation.
/// Returns `None` if nothing is left.
pub fn format_answer(raw: &str) -> Option<String> {
    let text = raw.trim().trim_matches(QUOTE_CHARS).trim();
    if text.is_empty() {
        return None;
    }

    let mut text = text.to_string();
    if !text.ends_with(TERMINAL_PUNCTUATION) {
        text.push('.');
    }
    Some(text)
}
