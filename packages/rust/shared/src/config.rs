//! Application configuration for mediaqa.
//!
//! User config lives at `~/.mediaqa/mediaqa.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets never live in the file: only the names of the env vars holding them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{MediaQaError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "mediaqa.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".mediaqa";

/// Placeholder substituted with the task credential in `questions_path`.
const API_KEY_PLACEHOLDER: &str = "{apikey}";

// ---------------------------------------------------------------------------
// Config structs (matching mediaqa.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Task endpoints and credential.
    #[serde(default)]
    pub task: TaskConfig,

    /// Reasoning and transcription service settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Description cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Per-question disambiguation hints.
    #[serde(default = "default_hints")]
    pub hints: Vec<QuestionHint>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            task: TaskConfig::default(),
            llm: LlmConfig::default(),
            cache: CacheConfig::default(),
            hints: default_hints(),
        }
    }
}

/// `[task]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task identifier sent with the submission.
    #[serde(default = "default_task_name")]
    pub name: String,

    /// Origin of the task hub.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the source document, relative to `base_url`.
    #[serde(default = "default_document_path")]
    pub document_path: String,

    /// Base path for relative image sources, relative to `base_url`.
    #[serde(default = "default_media_base_path")]
    pub media_base_path: String,

    /// Path of the questions feed, relative to `base_url`. `{apikey}` is substituted.
    #[serde(default = "default_questions_path")]
    pub questions_path: String,

    /// Path of the grading endpoint, relative to `base_url`.
    #[serde(default = "default_report_path")]
    pub report_path: String,

    /// Name of the env var holding the task credential.
    #[serde(default = "default_task_api_key_env")]
    pub api_key_env: String,

    /// Resolve relative audio sources against the media base like images.
    #[serde(default)]
    pub resolve_audio_relative: bool,

    /// Timeout for document, media, feed and submission requests.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            name: default_task_name(),
            base_url: default_base_url(),
            document_path: default_document_path(),
            media_base_path: default_media_base_path(),
            questions_path: default_questions_path(),
            report_path: default_report_path(),
            api_key_env: default_task_api_key_env(),
            resolve_audio_relative: false,
            timeout_secs: default_fetch_timeout(),
        }
    }
}

fn default_task_name() -> String {
    "arxiv".into()
}
fn default_base_url() -> String {
    "https://c3ntrala.ag3nts.org".into()
}
fn default_document_path() -> String {
    "dane/arxiv-draft.html".into()
}
fn default_media_base_path() -> String {
    "dane/".into()
}
fn default_questions_path() -> String {
    "data/{apikey}/arxiv.txt".into()
}
fn default_report_path() -> String {
    "report".into()
}
fn default_task_api_key_env() -> String {
    "DV_API_KEY".into()
}
fn default_fetch_timeout() -> u64 {
    30
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,

    /// Vision-capable model used for image descriptions.
    #[serde(default = "default_chat_model")]
    pub vision_model: String,

    /// Model used to answer questions.
    #[serde(default = "default_chat_model")]
    pub answer_model: String,

    /// Speech-to-text model.
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,

    /// Token cap for image descriptions.
    #[serde(default = "default_description_max_tokens")]
    pub description_max_tokens: u32,

    /// Request timeout for capability calls.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key_env: default_llm_api_key_env(),
            vision_model: default_chat_model(),
            answer_model: default_chat_model(),
            transcription_model: default_transcription_model(),
            description_max_tokens: default_description_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_llm_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_chat_model() -> String {
    "gpt-4o".into()
}
fn default_transcription_model() -> String {
    "whisper-1".into()
}
fn default_description_max_tokens() -> u32 {
    300
}
fn default_llm_timeout() -> u64 {
    120
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding one text file per cache key.
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> String {
    "cache".into()
}

/// `[[hints]]` entry: extra guidance appended to one question's prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionHint {
    /// 1-based question ordinal.
    pub ordinal: usize,
    /// Hint text.
    pub text: String,
}

fn default_hints() -> Vec<QuestionHint> {
    vec![QuestionHint {
        ordinal: 3,
        text: "The answer is NOT Batman and samego siebie sprzed dwóch lat. \
               Please look carefully at the context for the correct answer."
            .into(),
    }]
}

// ---------------------------------------------------------------------------
// Runtime config (resolved from config file + env + CLI flags)
// ---------------------------------------------------------------------------

/// Resolved settings for the reasoning and transcription client.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: Url,
    pub api_key: String,
    pub vision_model: String,
    pub answer_model: String,
    pub transcription_model: String,
    pub description_max_tokens: u32,
    pub timeout_secs: u64,
}

/// Runtime pipeline configuration, passed to each component at construction.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Task identifier sent with the submission.
    pub task_name: String,
    /// Task credential (sent as `apikey`).
    pub api_key: String,
    /// Source document URL.
    pub document_url: Url,
    /// Base URL for relative image sources.
    pub media_base: Url,
    /// Questions feed URL (credential already substituted).
    pub questions_url: Url,
    /// Grading endpoint URL.
    pub report_url: Url,
    /// Resolve relative audio sources against `media_base`.
    pub resolve_audio_relative: bool,
    /// Timeout for plain HTTP fetches.
    pub fetch_timeout_secs: u64,
    /// Cache directory.
    pub cache_dir: PathBuf,
    /// Ordinal → hint text.
    pub hints: BTreeMap<usize, String>,
    /// Skip the submission step.
    pub dry_run: bool,
}

impl PipelineConfig {
    /// Resolve the runtime config: join URLs and read the task credential.
    pub fn resolve(config: &AppConfig) -> Result<Self> {
        let api_key = resolve_credential(&config.task.api_key_env)?;
        Self::resolve_with_key(config, &api_key)
    }

    /// Resolve the runtime config with an explicit task credential.
    pub fn resolve_with_key(config: &AppConfig, api_key: &str) -> Result<Self> {
        let task = &config.task;

        let base = parse_base_url(&task.base_url)?;
        let join = |path: &str| {
            base.join(path).map_err(|e| {
                MediaQaError::config(format!("invalid path '{path}' under {base}: {e}"))
            })
        };

        Ok(Self {
            task_name: task.name.clone(),
            document_url: join(&task.document_path)?,
            media_base: join(&task.media_base_path)?,
            questions_url: join_template(&base, &task.questions_path, api_key)?,
            report_url: join(&task.report_path)?,
            api_key: api_key.to_string(),
            resolve_audio_relative: task.resolve_audio_relative,
            fetch_timeout_secs: task.timeout_secs,
            cache_dir: PathBuf::from(&config.cache.dir),
            hints: hint_map(&config.hints)?,
            dry_run: false,
        })
    }
}

impl LlmSettings {
    /// Resolve the capability client settings, reading the API key from the env.
    pub fn resolve(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            base_url: parse_base_url(&config.base_url)?,
            api_key: resolve_credential(&config.api_key_env)?,
            vision_model: config.vision_model.clone(),
            answer_model: config.answer_model.clone(),
            transcription_model: config.transcription_model.clone(),
            description_max_tokens: config.description_max_tokens,
            timeout_secs: config.timeout_secs,
        })
    }
}

/// Parse a base URL, forcing a trailing slash so relative joins append.
fn parse_base_url(raw: &str) -> Result<Url> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash).map_err(|e| MediaQaError::config(format!("invalid URL '{raw}': {e}")))
}

/// Append the segments of `template` to `base`, substituting the credential.
/// Each segment is percent-encoded, so a key containing `/`, `?` or `#` stays
/// inside its own segment.
fn join_template(base: &Url, template: &str, api_key: &str) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| MediaQaError::config(format!("{base} cannot be a base URL")))?;
        segments.pop_if_empty();
        for segment in template.split('/').filter(|s| !s.is_empty()) {
            segments.push(&segment.replace(API_KEY_PLACEHOLDER, api_key));
        }
    }
    Ok(url)
}

/// Build the ordinal → hint map, rejecting zero and duplicate ordinals.
pub(crate) fn hint_map(hints: &[QuestionHint]) -> Result<BTreeMap<usize, String>> {
    let mut map = BTreeMap::new();
    for hint in hints {
        if hint.ordinal == 0 {
            return Err(MediaQaError::config("hint ordinals are 1-based; got 0"));
        }
        if map.insert(hint.ordinal, hint.text.clone()).is_some() {
            return Err(MediaQaError::config(format!(
                "duplicate hint for question {}",
                hint.ordinal
            )));
        }
    }
    Ok(map)
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.mediaqa/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| MediaQaError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.mediaqa/mediaqa.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MediaQaError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| MediaQaError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MediaQaError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MediaQaError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MediaQaError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a credential from the named env var; it must be set and non-empty.
pub fn resolve_credential(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(MediaQaError::config(format!(
            "credential not found. Set the {var_name} environment variable."
        ))),
    }
}
