//! Media describer: turns image and audio references into text.
//!
//! Every reference is checked against the [`FileCache`] first. On a miss the
//! asset is fetched, validated and handed to the matching capability; the
//! result is written through to the cache. Failures on one reference never
//! stop the others.

use tracing::{debug, error, info, instrument, warn};
use url::Url;

use mediaqa_cache::FileCache;
use mediaqa_fetch::{FetchedResource, Fetcher};
use mediaqa_shared::{CacheKey, MediaDescription, MediaKind, MediaQaError, MediaReference, Result};

use crate::capability::{
    AudioPayload, ImagePayload, ReasoningCapability, ReasoningRequest, TranscriptionCapability,
};
use crate::pipeline::ProgressReporter;

/// Instruction sent with every image.
pub const IMAGE_INSTRUCTION: &str = "Describe this image in detail, focusing on any text, \
diagrams, or important visual elements.";

/// Token cap for image descriptions.
pub const DEFAULT_DESCRIPTION_MAX_TOKENS: u32 = 300;

const IMAGE_TYPE_PREFIX: &str = "image/";
const AUDIO_TYPE_PREFIX: &str = "audio/";

/// File name used when an audio URL has no usable last segment.
const FALLBACK_AUDIO_NAME: &str = "audio.mp3";

// ---------------------------------------------------------------------------
// Configuration & results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DescriberConfig {
    pub instruction: String,
    pub max_tokens: Option<u32>,
}

impl Default for DescriberConfig {
    fn default() -> Self {
        Self {
            instruction: IMAGE_INSTRUCTION.to_string(),
            max_tokens: Some(DEFAULT_DESCRIPTION_MAX_TOKENS),
        }
    }
}

/// Outcome of describing a single reference.
#[derive(Debug, Clone)]
pub struct DescribeOutcome {
    pub description: MediaDescription,
    /// True when the text came from the cache and no compute was spent.
    pub cached: bool,
}

/// A reference that was dropped, with the reason.
#[derive(Debug, Clone)]
pub struct SkippedMedia {
    pub reference: MediaReference,
    pub reason: String,
}

/// Aggregate result of [`MediaDescriber::describe_all`].
#[derive(Debug, Clone, Default)]
pub struct DescribeReport {
    /// Successful descriptions, in input order.
    pub descriptions: Vec<MediaDescription>,
    pub skipped: Vec<SkippedMedia>,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

// ---------------------------------------------------------------------------
// Describer
// ---------------------------------------------------------------------------

/// Cache-checked describer borrowing its collaborators for one run.
pub struct MediaDescriber<'a> {
    fetcher: &'a Fetcher,
    cache: &'a FileCache,
    vision: &'a dyn ReasoningCapability,
    transcriber: &'a dyn TranscriptionCapability,
    config: DescriberConfig,
}

impl<'a> MediaDescriber<'a> {
    pub fn new(
        fetcher: &'a Fetcher,
        cache: &'a FileCache,
        vision: &'a dyn ReasoningCapability,
        transcriber: &'a dyn TranscriptionCapability,
        config: DescriberConfig,
    ) -> Self {
        Self {
            fetcher,
            cache,
            vision,
            transcriber,
            config,
        }
    }

    /// Describe one reference, consulting the cache first.
    #[instrument(skip_all, fields(url = %reference.url, kind = %reference.kind))]
    pub async fn describe(&self, reference: &MediaReference) -> Result<DescribeOutcome> {
        let key = CacheKey::for_url(&reference.url);

        match self.cache.get(&key).await {
            Ok(Some(entry)) => {
                debug!(%key, "cache hit");
                return Ok(DescribeOutcome {
                    description: MediaDescription {
                        reference: reference.clone(),
                        text: entry.text,
                    },
                    cached: true,
                });
            }
            Ok(None) => debug!(%key, "cache miss"),
            Err(e) => warn!(%key, error = %e, "cache read failed, treating as miss"),
        }

        let resource = self.fetcher.fetch(&reference.url).await?;
        let text = match reference.kind {
            MediaKind::Image => self.describe_image(reference, resource).await?,
            MediaKind::Audio => self.transcribe_audio(reference, resource).await?,
        };

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(MediaQaError::Capability(format!(
                "empty {} description for {}",
                reference.kind, reference.url
            )));
        }

        if let Err(e) = self.cache.put(&key, &text).await {
            warn!(%key, error = %e, "cache write failed, continuing");
        }

        Ok(DescribeOutcome {
            description: MediaDescription {
                reference: reference.clone(),
                text,
            },
            cached: false,
        })
    }

    /// Describe every reference in order, skipping the ones that fail.
    #[instrument(skip_all, fields(count = references.len()))]
    pub async fn describe_all(
        &self,
        references: &[MediaReference],
        progress: &dyn ProgressReporter,
    ) -> DescribeReport {
        let mut report = DescribeReport::default();
        let total = references.len();

        for (i, reference) in references.iter().enumerate() {
            match self.describe(reference).await {
                Ok(outcome) => {
                    if outcome.cached {
                        report.cache_hits += 1;
                    } else {
                        report.cache_misses += 1;
                    }
                    report.descriptions.push(outcome.description);
                }
                Err(e) => {
                    if e.is_skippable() {
                        warn!(url = %reference.url, error = %e, "skipping media reference");
                    } else {
                        error!(url = %reference.url, error = %e, "media reference failed");
                    }
                    report.skipped.push(SkippedMedia {
                        reference: reference.clone(),
                        reason: e.to_string(),
                    });
                }
            }
            progress.media_described(&reference.url, i + 1, total);
        }

        info!(
            described = report.descriptions.len(),
            skipped = report.skipped.len(),
            cache_hits = report.cache_hits,
            "media description complete"
        );
        report
    }

    async fn describe_image(
        &self,
        reference: &MediaReference,
        resource: FetchedResource,
    ) -> Result<String> {
        if !resource.has_type_prefix(IMAGE_TYPE_PREFIX) {
            return Err(MediaQaError::UnsupportedContent {
                url: reference.url.clone(),
                content_type: resource.mime_type().unwrap_or_else(|| "none".to_string()),
            });
        }
        let mime_type = resource.mime_type().unwrap_or_default();

        let request = ReasoningRequest::new(self.config.instruction.clone())
            .with_image(ImagePayload {
                bytes: resource.bytes,
                mime_type,
            })
            .with_max_tokens(self.config.max_tokens);

        debug!(capability = self.vision.name(), "describing image");
        self.vision.complete(request).await
    }

    async fn transcribe_audio(
        &self,
        reference: &MediaReference,
        resource: FetchedResource,
    ) -> Result<String> {
        let mime_type = resource
            .has_type_prefix(AUDIO_TYPE_PREFIX)
            .then(|| resource.mime_type())
            .flatten();
        let audio = AudioPayload {
            file_name: audio_file_name(&reference.url),
            bytes: resource.bytes,
            mime_type,
        };

        debug!(capability = self.transcriber.name(), "transcribing audio");
        self.transcriber.transcribe(audio).await
    }
}

/// Last path segment of `url`, used as the upload file name.
fn audio_file_name(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_AUDIO_NAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::testing::{FixedTranscriber, ScriptedReasoning};
    use crate::pipeline::SilentProgress;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_cache() -> FileCache {
        let dir = std::env::temp_dir().join(format!("mediaqa_describer_test_{}", Uuid::now_v7()));
        FileCache::open(&dir).await.unwrap()
    }

    fn image(url: String) -> MediaReference {
        MediaReference {
            url,
            kind: MediaKind::Image,
            caption: None,
        }
    }

    fn audio(url: String) -> MediaReference {
        MediaReference {
            url,
            kind: MediaKind::Audio,
            caption: Some("Nagranie".into()),
        }
    }

    async fn mount_asset(server: &MockServer, at: &str, content_type: &str, expect: u64) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", content_type)
                    .set_body_bytes(vec![1u8, 2, 3, 4]),
            )
            .expect(expect)
            .mount(server)
            .await;
    }

    #[test]
    fn audio_file_name_uses_last_segment() {
        assert_eq!(
            audio_file_name("https://hub.example.com/dane/i/rafal_dyktafon.mp3"),
            "rafal_dyktafon.mp3"
        );
        assert_eq!(audio_file_name("https://hub.example.com/"), FALLBACK_AUDIO_NAME);
        assert_eq!(audio_file_name("not a url"), FALLBACK_AUDIO_NAME);
    }

    #[tokio::test]
    async fn second_describe_is_served_from_cache() {
        let server = MockServer::start().await;
        mount_asset(&server, "/dane/i/rynek.png", "image/png", 1).await;

        let fetcher = Fetcher::new().unwrap();
        let cache = test_cache().await;
        let vision = ScriptedReasoning::fixed("A market square with a clock tower.");
        let transcriber = FixedTranscriber::new("unused");
        let describer = MediaDescriber::new(
            &fetcher,
            &cache,
            &vision,
            &transcriber,
            DescriberConfig::default(),
        );

        let reference = image(format!("{}/dane/i/rynek.png", server.uri()));
        let first = describer.describe(&reference).await.unwrap();
        let second = describer.describe(&reference).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.description.text, second.description.text);
        assert_eq!(vision.calls(), 1);

        let _ = std::fs::remove_dir_all(cache.dir());
    }

    #[tokio::test]
    async fn image_request_carries_instruction_and_bytes() {
        let server = MockServer::start().await;
        mount_asset(&server, "/a.jpg", "image/jpeg; charset=binary", 1).await;

        let fetcher = Fetcher::new().unwrap();
        let cache = test_cache().await;
        let vision = ScriptedReasoning::fixed("Text on a sign.");
        let transcriber = FixedTranscriber::new("unused");
        let describer = MediaDescriber::new(
            &fetcher,
            &cache,
            &vision,
            &transcriber,
            DescriberConfig::default(),
        );

        describer
            .describe(&image(format!("{}/a.jpg", server.uri())))
            .await
            .unwrap();

        let requests = vision.requests.lock().unwrap();
        assert_eq!(requests[0].instruction, IMAGE_INSTRUCTION);
        assert_eq!(requests[0].max_tokens, Some(300));
        let payload = requests[0].image.as_ref().unwrap();
        assert_eq!(payload.mime_type, "image/jpeg");
        assert_eq!(payload.bytes, vec![1u8, 2, 3, 4]);

        let _ = std::fs::remove_dir_all(cache.dir());
    }

    #[tokio::test]
    async fn html_image_is_rejected_without_capability_call() {
        let server = MockServer::start().await;
        mount_asset(&server, "/fake.png", "text/html", 1).await;

        let fetcher = Fetcher::new().unwrap();
        let cache = test_cache().await;
        let vision = ScriptedReasoning::fixed("should not be used");
        let transcriber = FixedTranscriber::new("unused");
        let describer = MediaDescriber::new(
            &fetcher,
            &cache,
            &vision,
            &transcriber,
            DescriberConfig::default(),
        );

        let err = describer
            .describe(&image(format!("{}/fake.png", server.uri())))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaQaError::UnsupportedContent { .. }));
        assert_eq!(vision.calls(), 0);
        assert!(cache.is_empty().await.unwrap());

        let _ = std::fs::remove_dir_all(cache.dir());
    }

    #[tokio::test]
    async fn image_without_content_type_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/untyped.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new().unwrap();
        let cache = test_cache().await;
        let vision = ScriptedReasoning::fixed("should not be used");
        let transcriber = FixedTranscriber::new("unused");
        let describer = MediaDescriber::new(
            &fetcher,
            &cache,
            &vision,
            &transcriber,
            DescriberConfig::default(),
        );

        let err = describer
            .describe(&image(format!("{}/untyped.png", server.uri())))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaQaError::UnsupportedContent { .. }));
        assert_eq!(vision.calls(), 0);

        let _ = std::fs::remove_dir_all(cache.dir());
    }

    #[tokio::test]
    async fn audio_goes_to_transcriber() {
        let server = MockServer::start().await;
        mount_asset(&server, "/r.mp3", "audio/mpeg", 1).await;

        let fetcher = Fetcher::new().unwrap();
        let cache = test_cache().await;
        let vision = ScriptedReasoning::fixed("unused");
        let transcriber = FixedTranscriber::new("  Spotkajmy się na rynku.  ");
        let describer = MediaDescriber::new(
            &fetcher,
            &cache,
            &vision,
            &transcriber,
            DescriberConfig::default(),
        );

        let outcome = describer
            .describe(&audio(format!("{}/r.mp3", server.uri())))
            .await
            .unwrap();
        assert_eq!(outcome.description.text, "Spotkajmy się na rynku.");
        assert_eq!(transcriber.calls(), 1);
        assert_eq!(vision.calls(), 0);

        let _ = std::fs::remove_dir_all(cache.dir());
    }

    #[tokio::test]
    async fn describe_all_isolates_failures() {
        let server = MockServer::start().await;
        mount_asset(&server, "/ok1.png", "image/png", 1).await;
        mount_asset(&server, "/ok2.mp3", "audio/mpeg", 1).await;
        mount_asset(&server, "/page.png", "text/html", 1).await;
        Mock::given(method("GET"))
            .and(path("/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new().unwrap();
        let cache = test_cache().await;
        let vision = ScriptedReasoning::fixed("An image.");
        let transcriber = FixedTranscriber::new("A recording.");
        let describer = MediaDescriber::new(
            &fetcher,
            &cache,
            &vision,
            &transcriber,
            DescriberConfig::default(),
        );

        let references = vec![
            image(format!("{}/ok1.png", server.uri())),
            image(format!("{}/missing.png", server.uri())),
            audio(format!("{}/ok2.mp3", server.uri())),
            image(format!("{}/page.png", server.uri())),
            // Relative audio sources are not resolved and cannot be fetched
            audio("i/relative.mp3".into()),
        ];

        let report = describer.describe_all(&references, &SilentProgress).await;

        assert_eq!(report.descriptions.len(), 2);
        assert_eq!(report.skipped.len(), 3);
        assert_eq!(report.cache_misses, 2);
        assert_eq!(report.cache_hits, 0);
        assert!(report.descriptions[0].reference.url.ends_with("/ok1.png"));
        assert!(report.descriptions[1].reference.url.ends_with("/ok2.mp3"));

        let _ = std::fs::remove_dir_all(cache.dir());
    }

    #[tokio::test]
    async fn capability_failure_is_not_cached() {
        let server = MockServer::start().await;
        mount_asset(&server, "/a.png", "image/png", 2).await;

        let fetcher = Fetcher::new().unwrap();
        let cache = test_cache().await;
        let vision = ScriptedReasoning::failing("model overloaded");
        let transcriber = FixedTranscriber::new("unused");
        let describer = MediaDescriber::new(
            &fetcher,
            &cache,
            &vision,
            &transcriber,
            DescriberConfig::default(),
        );

        let reference = image(format!("{}/a.png", server.uri()));
        assert!(describer.describe(&reference).await.is_err());
        assert!(describer.describe(&reference).await.is_err());
        assert_eq!(vision.calls(), 2);
        assert!(cache.is_empty().await.unwrap());

        let _ = std::fs::remove_dir_all(cache.dir());
    }
}
