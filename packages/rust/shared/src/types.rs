//! Core domain types for the enrichment and answering pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Media references
// ---------------------------------------------------------------------------

/// Kind of embedded media asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "audio" => Ok(Self::Audio),
            other => Err(format!("unknown media kind '{other}': expected image or audio")),
        }
    }
}

/// An image or audio asset link discovered while parsing a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    /// Source URL. Image sources are absolute; audio sources are kept as written.
    pub url: String,
    /// Asset kind.
    pub kind: MediaKind,
    /// Alt text or figure caption, when the markup provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// Text derived from a media asset: an image description or audio transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub reference: MediaReference,
    pub text: String,
}

// ---------------------------------------------------------------------------
// CacheKey / CacheEntry
// ---------------------------------------------------------------------------

/// Fingerprint of a source URL string: lowercase hex SHA-256, 64 characters.
///
/// Derived from the URL only, never from fetched bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Length of every key in characters.
    pub const LEN: usize = 64;

    pub fn for_url(url: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted description. Immutable once written; no expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Questions and answers
// ---------------------------------------------------------------------------

/// A question from the feed, numbered from 1 in feed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub ordinal: usize,
    pub text: String,
}

/// Split a newline-delimited feed into questions, discarding blank lines.
pub fn parse_questions(raw: &str) -> Vec<Question> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, text)| Question {
            ordinal: i + 1,
            text: text.to_string(),
        })
        .collect()
}

/// Zero-padded ordinal key used on the wire (`1` → `"01"`).
pub fn ordinal_key(ordinal: usize) -> String {
    format!("{ordinal:02}")
}

/// A formatted answer to one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub ordinal: usize,
    pub text: String,
}

/// Ordinal-keyed answers, serialized as `{"01": "...", "02": "..."}` in
/// ordinal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerSet {
    answers: BTreeMap<usize, String>,
}

impl AnswerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an answer, replacing any previous answer for the same ordinal.
    pub fn insert(&mut self, answer: Answer) {
        self.answers.insert(answer.ordinal, answer.text);
    }

    pub fn get(&self, ordinal: usize) -> Option<&str> {
        self.answers.get(&ordinal).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Iterate `(wire key, answer text)` pairs in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = (String, &str)> {
        self.answers
            .iter()
            .map(|(ordinal, text)| (ordinal_key(*ordinal), text.as_str()))
    }

    /// Ordinals of `questions` that have no answer yet.
    pub fn missing(&self, questions: &[Question]) -> Vec<usize> {
        questions
            .iter()
            .map(|q| q.ordinal)
            .filter(|ordinal| !self.answers.contains_key(ordinal))
            .collect()
    }

    /// True when every question has an answer and nothing else is present.
    pub fn is_complete(&self, questions: &[Question]) -> bool {
        self.answers.len() == questions.len() && self.missing(questions).is_empty()
    }
}

impl Serialize for AnswerSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.answers.len()))?;
        for (key, text) in self.iter() {
            map.serialize_entry(&key, text)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_and_fixed_length() {
        let a = CacheKey::for_url("https://example.com/dane/i/rynek.png");
        let b = CacheKey::for_url("https://example.com/dane/i/rynek.png");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), CacheKey::LEN);
        assert_eq!(
            CacheKey::for_url("hello world").as_str(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn cache_key_differs_by_url() {
        let a = CacheKey::for_url("https://example.com/a.png");
        let b = CacheKey::for_url("https://example.com/a.png?v=2");
        assert_ne!(a, b);
    }

    #[test]
    fn questions_skip_blank_lines() {
        let raw = "01=Jakiego owocu użyto?\n\n  \n02=Gdzie?\r\n";
        let questions = parse_questions(raw);
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].ordinal, 1);
        assert_eq!(questions[1].ordinal, 2);
        assert_eq!(questions[1].text, "02=Gdzie?");
    }

    #[test]
    fn ordinal_keys_are_zero_padded() {
        assert_eq!(ordinal_key(1), "01");
        assert_eq!(ordinal_key(9), "09");
        assert_eq!(ordinal_key(12), "12");
    }

    #[test]
    fn answer_set_completeness() {
        let questions = parse_questions("a\nb\nc");
        let mut set = AnswerSet::new();
        set.insert(Answer {
            ordinal: 1,
            text: "One.".into(),
        });
        set.insert(Answer {
            ordinal: 3,
            text: "Three.".into(),
        });
        assert!(!set.is_complete(&questions));
        assert_eq!(set.missing(&questions), vec![2]);

        set.insert(Answer {
            ordinal: 2,
            text: "Two.".into(),
        });
        assert!(set.is_complete(&questions));
    }

    #[test]
    fn answer_set_serializes_in_ordinal_order() {
        let mut set = AnswerSet::new();
        for ordinal in [10, 2, 1] {
            set.insert(Answer {
                ordinal,
                text: format!("Answer {ordinal}."),
            });
        }
        let json = serde_json::to_string(&set).expect("serialize");
        assert_eq!(
            json,
            r#"{"01":"Answer 1.","02":"Answer 2.","10":"Answer 10."}"#
        );
    }

    #[test]
    fn media_kind_parses() {
        assert_eq!("Image".parse::<MediaKind>(), Ok(MediaKind::Image));
        assert_eq!("audio".parse::<MediaKind>(), Ok(MediaKind::Audio));
        assert!("video".parse::<MediaKind>().is_err());
    }

    #[test]
    fn media_reference_serialization_omits_missing_caption() {
        let reference = MediaReference {
            url: "https://example.com/a.mp3".into(),
            kind: MediaKind::Audio,
            caption: None,
        };
        let json = serde_json::to_string(&reference).expect("serialize");
        assert_eq!(json, r#"{"url":"https://example.com/a.mp3","kind":"audio"}"#);
    }
}
