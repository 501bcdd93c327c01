// crates/kashi-core/src/generation.rs
//! Adapter for the external generation API.
//!
//! The worker calls this twice per job: once with the translation template,
//! once with the annotation template. Transient failures (rate limits, 5xx,
//! timeouts) are retried here with backoff; everything else propagates so the
//! job fails fast.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::GenError;
use crate::retry::RetryPolicy;

/// Prompt for the translation pass. Expects `{{title}}`, `{{artist}}` and
/// `{{lines}}` (a JSON object of line-index → line text). The model must
/// answer with a JSON object of line-index → translated text.
pub const TRANSLATION_PROMPT: &str = "\
Translate the following Japanese song lyrics into natural English.\n\
Song: {{title}} by {{artist}}.\n\
The lyrics are given as a JSON object mapping line index to line text:\n\
{{lines}}\n\
Respond with a JSON object mapping each line index to its English translation. \
Respond with JSON only, no commentary.";

/// Prompt for the linguistic-annotation pass. Expects `{{lines}}`. The model
/// answers per line with either the structured `words` object or the compact
/// `Surface|Reading|PitchBits[|KanjiReadings]` encoding.
pub const ANNOTATION_PROMPT: &str = "\
For each line of the Japanese lyrics below, segment it into words and annotate \
each word with its reading and pitch accent.\n\
The lyrics are given as a JSON object mapping line index to line text:\n\
{{lines}}\n\
Respond with a JSON object mapping each line index to an object with a \"words\" \
array. Each word has \"kanji\" (omit for kana-only words), \"reading\", \"mora\" \
(objects with \"text\" and boolean \"isHigh\"), and \"kanjiReadings\" \
(objects with \"kanji\" and \"reading\"). Respond with JSON only.";

/// Substitute `{{key}}` placeholders in a prompt template.
pub fn render_template(template: &str, substitutions: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in substitutions {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

/// Seam between the worker and the generation provider. Tests substitute a
/// scripted implementation; production uses [`HttpGenerator`].
#[async_trait]
pub trait Generator: Send + Sync {
    /// Render `template` with `substitutions` and run one generation,
    /// returning the raw completion text.
    async fn call(&self, template: &str, substitutions: &[(&str, &str)])
        -> Result<String, GenError>;
}

#[derive(Debug, Deserialize)]
struct GenResponse {
    #[serde(default)]
    text: String,
}

/// HTTP generation client: POST `{model, prompt}` with bearer auth, expect
/// `{text}` back. Generation can be slow, so the per-call timeout defaults to
/// minutes, not seconds.
pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    policy: RetryPolicy,
}

impl HttpGenerator {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(240);

    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self, GenError> {
        Self::with_timeout(endpoint, api_key, Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenError::Network(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: "lyric-translate-1".to_string(),
            policy: RetryPolicy::default(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn attempt(&self, prompt: &str) -> Result<String, GenError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": self.model, "prompt": prompt }))
            .send()
            .await
            .map_err(|e| GenError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(GenError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenResponse = response.json().await.map_err(|e| GenError::Api {
            status: status.as_u16(),
            message: format!("unreadable response body: {e}"),
        })?;

        if body.text.trim().is_empty() {
            return Err(GenError::EmptyResponse);
        }
        Ok(body.text)
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn call(
        &self,
        template: &str,
        substitutions: &[(&str, &str)],
    ) -> Result<String, GenError> {
        let prompt = render_template(template, substitutions);
        let mut attempt = 0;
        loop {
            match self.attempt(&prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt + 1 < self.policy.max_attempts => {
                    let delay = self.policy.delay_for_attempt(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "generation call failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
