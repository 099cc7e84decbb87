//! Report submission to the task endpoint.

use std::collections::BTreeMap;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};
use url::Url;

use mediaqa_shared::{AnswerSet, MediaQaError, PipelineConfig, Result};

/// JSON body posted to the report endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionPayload {
    pub task: String,
    pub apikey: String,
    pub answer: BTreeMap<String, String>,
}

/// Parsed response of the report endpoint.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub code: Option<i64>,
    pub message: Option<String>,
    /// Full response body.
    pub raw: Value,
}

impl Verdict {
    fn from_value(raw: Value) -> Self {
        Self {
            code: raw.get("code").and_then(Value::as_i64),
            message: raw.get("message").and_then(Value::as_str).map(str::to_string),
            raw,
        }
    }

    /// A zero code is how the endpoint signals acceptance.
    pub fn is_accepted(&self) -> bool {
        self.code == Some(0)
    }
}

/// Normalize quotes before sending: drop double quotes, then turn single
/// quotes into double quotes.
pub fn sanitize_answer(text: &str) -> String {
    text.replace('"', "").replace('\'', "\"")
}

pub struct SubmissionClient {
    http: Client,
    report_url: Url,
    task: String,
    api_key: String,
}

impl SubmissionClient {
    pub fn new(http: Client, config: &PipelineConfig) -> Self {
        Self {
            http,
            report_url: config.report_url.clone(),
            task: config.task_name.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Build the sanitized payload for `answers`.
    pub fn payload(&self, answers: &AnswerSet) -> SubmissionPayload {
        SubmissionPayload {
            task: self.task.clone(),
            apikey: self.api_key.clone(),
            answer: answers
                .iter()
                .map(|(key, text)| (key, sanitize_answer(text)))
                .collect(),
        }
    }

    #[instrument(skip_all, fields(url = %self.report_url, answers = answers.len()))]
    pub async fn submit(&self, answers: &AnswerSet) -> Result<Verdict> {
        let payload = self.payload(answers);

        let response = self
            .http
            .post(self.report_url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| MediaQaError::Submission(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MediaQaError::Submission(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(MediaQaError::Submission(format!("HTTP {status}: {body}")));
        }
        if body.trim().is_empty() {
            return Err(MediaQaError::Submission("empty response body".into()));
        }

        let raw: Value = serde_json::from_str(&body)
            .map_err(|e| MediaQaError::Submission(format!("response is not JSON: {e}")))?;
        let verdict = Verdict::from_value(raw);

        info!(code = ?verdict.code, message = ?verdict.message, "report submitted");
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaqa_shared::{AppConfig, Answer};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> PipelineConfig {
        let mut app = AppConfig::default();
        app.task.base_url = server.uri();
        let mut config = PipelineConfig::resolve_with_key(&app, "test-key").unwrap();
        config.dry_run = false;
        config
    }

    fn answers() -> AnswerSet {
        let mut set = AnswerSet::new();
        set.insert(Answer {
            ordinal: 2,
            text: "He said 'hello' there.".into(),
        });
        set.insert(Answer {
            ordinal: 1,
            text: "\"Kraków\".".into(),
        });
        set
    }

    #[test]
    fn sanitize_replaces_quotes() {
        assert_eq!(sanitize_answer("\"Kraków\"."), "Kraków.");
        assert_eq!(sanitize_answer("It's 'fine'."), "It\"s \"fine\".");
        assert_eq!(sanitize_answer("plain."), "plain.");
    }

    #[tokio::test]
    async fn posts_sanitized_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/report"))
            .and(body_json(serde_json::json!({
                "task": "arxiv",
                "apikey": "test-key",
                "answer": {"01": "Kraków.", "02": "He said \"hello\" there."}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"code": 0, "message": "OK"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = SubmissionClient::new(Client::new(), &config_for(&server));
        let verdict = client.submit(&answers()).await.unwrap();
        assert!(verdict.is_accepted());
        assert_eq!(verdict.message.as_deref(), Some("OK"));
    }

    #[tokio::test]
    async fn rejection_is_still_a_verdict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/report"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"code": -340, "message": "wrong answer"})),
            )
            .mount(&server)
            .await;

        let client = SubmissionClient::new(Client::new(), &config_for(&server));
        let verdict = client.submit(&answers()).await.unwrap();
        assert!(!verdict.is_accepted());
        assert_eq!(verdict.code, Some(-340));
    }

    #[tokio::test]
    async fn error_status_is_submission_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/report"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let client = SubmissionClient::new(Client::new(), &config_for(&server));
        let err = client.submit(&answers()).await.unwrap_err();
        assert!(matches!(err, MediaQaError::Submission(_)));
        assert!(err.to_string().contains("400"));
    }

    #[tokio::test]
    async fn empty_or_garbled_body_is_submission_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/report"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = SubmissionClient::new(Client::new(), &config_for(&server));
        let err = client.submit(&answers()).await.unwrap_err();
        assert!(err.to_string().contains("empty"));

        server.reset().await;
        Mock::given(method("POST"))
            .and(path("/report"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;
        let err = client.submit(&answers()).await.unwrap_err();
        assert!(matches!(err, MediaQaError::Submission(_)));
    }
}
