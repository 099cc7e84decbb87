//! End-to-end run: document → media descriptions → answers → submission.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};
use uuid::Uuid;

use mediaqa_cache::FileCache;
use mediaqa_document::{ParseOptions, ParsedDocument};
use mediaqa_fetch::Fetcher;
use mediaqa_shared::{
    AnswerSet, LlmSettings, MediaQaError, PipelineConfig, Question, Result, parse_questions,
};

use crate::answering::{AnswerContext, AnswerEngine, AnswerEngineConfig};
use crate::capability::{ReasoningCapability, TranscriptionCapability};
use crate::describer::{DescribeReport, DescriberConfig, MediaDescriber};
use crate::openai::OpenAiClient;
use crate::submission::{SubmissionClient, Verdict};

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each media reference, whether it succeeded or was skipped.
    fn media_described(&self, url: &str, current: usize, total: usize);
    /// Called after each answered question.
    fn question_answered(&self, key: &str, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn media_described(&self, _url: &str, _current: usize, _total: usize) {}
    fn question_answered(&self, _key: &str, _current: usize, _total: usize) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Capabilities & report
// ---------------------------------------------------------------------------

/// The generative services a run depends on.
#[derive(Clone)]
pub struct Capabilities {
    /// Vision model used for image descriptions.
    pub vision: Arc<dyn ReasoningCapability>,
    /// Text model used for answering questions.
    pub answering: Arc<dyn ReasoningCapability>,
    pub transcription: Arc<dyn TranscriptionCapability>,
}

impl Capabilities {
    /// OpenAI-backed capabilities with the models named in `settings`.
    pub fn openai(settings: &LlmSettings) -> Result<Self> {
        let client = OpenAiClient::from_settings(settings)?;
        Ok(Self {
            vision: Arc::new(client.chat(&settings.vision_model)),
            answering: Arc::new(client.chat(&settings.answer_model)),
            transcription: Arc::new(client.transcriber(&settings.transcription_model)),
        })
    }
}

/// Result of one pipeline run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub questions: Vec<Question>,
    pub answers: AnswerSet,
    /// Media references found in the document.
    pub media_found: usize,
    pub media: DescribeReport,
    /// `None` when the run was a dry run.
    pub submission: Option<Result<Verdict>>,
    pub elapsed: Duration,
}

impl RunReport {
    /// True when the submission went through and was accepted.
    pub fn accepted(&self) -> bool {
        matches!(&self.submission, Some(Ok(verdict)) if verdict.is_accepted())
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// One configured run of the enrichment and answering pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Fetcher,
    cache: FileCache,
    capabilities: Capabilities,
    describer_config: DescriberConfig,
}

impl Pipeline {
    /// Build a pipeline, opening the cache directory.
    pub async fn new(
        config: PipelineConfig,
        capabilities: Capabilities,
        describer_config: DescriberConfig,
    ) -> Result<Self> {
        let fetcher = Fetcher::with_timeout(Duration::from_secs(config.fetch_timeout_secs))?;
        let cache = FileCache::open(&config.cache_dir).await?;

        Ok(Self {
            config,
            fetcher,
            cache,
            capabilities,
            describer_config,
        })
    }

    /// Build a pipeline backed by the OpenAI capabilities in `llm`.
    pub async fn from_settings(config: PipelineConfig, llm: &LlmSettings) -> Result<Self> {
        let capabilities = Capabilities::openai(llm)?;
        let describer_config = DescriberConfig {
            max_tokens: Some(llm.description_max_tokens),
            ..Default::default()
        };
        Self::new(config, capabilities, describer_config).await
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Cache-checked describer over this pipeline's collaborators.
    pub fn describer(&self) -> MediaDescriber<'_> {
        MediaDescriber::new(
            &self.fetcher,
            &self.cache,
            self.capabilities.vision.as_ref(),
            self.capabilities.transcription.as_ref(),
            self.describer_config.clone(),
        )
    }

    /// Fetch and parse the source document.
    pub async fn fetch_document(&self) -> Result<ParsedDocument> {
        let raw = self.fetcher.fetch_text(self.config.document_url.as_str()).await?;
        let opts = ParseOptions {
            media_base: self.config.media_base.clone(),
            resolve_audio_relative: self.config.resolve_audio_relative,
        };
        Ok(mediaqa_document::parse(&raw, &opts))
    }

    /// Fetch the question feed. An empty feed is an error.
    pub async fn fetch_questions(&self) -> Result<Vec<Question>> {
        let raw = self.fetcher.fetch_text(self.config.questions_url.as_str()).await?;
        let questions = parse_questions(&raw);
        if questions.is_empty() {
            return Err(MediaQaError::validation("question feed is empty"));
        }
        Ok(questions)
    }

    /// Run every stage.
    ///
    /// 1. Fetch and parse the document
    /// 2. Describe images and audio (cache-checked, failures skipped)
    /// 3. Fetch questions
    /// 4. Answer each question
    /// 5. Submit the answers (unless `dry_run`)
    #[instrument(skip_all, fields(task = %self.config.task_name, dry_run = self.config.dry_run))]
    pub async fn run(&self, progress: &dyn ProgressReporter) -> Result<RunReport> {
        let start = Instant::now();
        let run_id = Uuid::now_v7();
        info!(%run_id, document = %self.config.document_url, "starting run");

        // --- Phase 1: Document ---
        progress.phase("Fetching document");
        let document = self.fetch_document().await?;
        let media_found = document.media.len();

        // --- Phase 2: Media ---
        progress.phase("Describing media");
        let media = self.describer().describe_all(&document.media, progress).await;

        // --- Phase 3: Questions ---
        progress.phase("Fetching questions");
        let questions = self.fetch_questions().await?;

        // --- Phase 4: Answers ---
        progress.phase("Answering questions");
        let engine = AnswerEngine::new(
            self.capabilities.answering.as_ref(),
            AnswerEngineConfig {
                hints: self.config.hints.clone(),
                ..Default::default()
            },
        );
        let context = AnswerContext {
            document_text: &document.text,
            media: &media.descriptions,
        };
        let answers = engine.answer(&questions, context, progress).await?;

        if !answers.is_complete(&questions) {
            return Err(MediaQaError::validation(format!(
                "answers missing for questions {:?}",
                answers.missing(&questions)
            )));
        }

        // --- Phase 5: Submission ---
        let submission = if self.config.dry_run {
            info!("dry run, not submitting");
            None
        } else {
            progress.phase("Submitting answers");
            let client = SubmissionClient::new(self.fetcher.client().clone(), &self.config);
            let outcome = client.submit(&answers).await;
            if let Err(e) = &outcome {
                warn!(error = %e, "submission failed");
            }
            Some(outcome)
        };

        let report = RunReport {
            run_id,
            questions,
            answers,
            media_found,
            media,
            submission,
            elapsed: start.elapsed(),
        };

        info!(
            %run_id,
            answers = report.answers.len(),
            described = report.media.descriptions.len(),
            skipped = report.media.skipped.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run complete"
        );
        progress.done(&report);

        Ok(report)
    }
}
