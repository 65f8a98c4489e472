//! Content-safety classification and URL provenance validation.
//!
//! Both checks fail closed: a classifier that cannot be reached, a non-success
//! response, or a URL probe error all count as rejection. There are no retries;
//! one failed probe is a definitive rejection for that ingestion attempt.

use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Character ceiling submitted to the classifier per request.
const SAFETY_TEXT_CEILING: usize = 8192;
/// Category severity at or above which content is unsafe.
const UNSAFE_SEVERITY: u8 = 2;
/// Timeout applied to the URL reachability probe.
const URL_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while talking to the content-safety service.
#[derive(Debug, Error)]
pub enum SafetyError {
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Classifier responded with a non-success status.
    #[error("Unexpected classifier response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the classifier.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    #[serde(default, rename = "categoriesAnalysis")]
    categories_analysis: Vec<CategorySeverity>,
}

#[derive(Deserialize)]
struct CategorySeverity {
    #[serde(default)]
    category: String,
    #[serde(default)]
    severity: u8,
}

/// HTTP client for the content-safety classification service.
pub struct SafetyClient {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl SafetyClient {
    /// Construct a client for the given classifier endpoint.
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, SafetyError> {
        let client = Client::builder().user_agent("cividex/0.1").build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Classify text and return `true` only when every category severity is
    /// below the unsafe threshold.
    ///
    /// Classifier unavailability or any non-success response yields `false`:
    /// ambiguity between "unreachable" and "unsafe" always resolves to rejection.
    pub async fn validate_text(&self, text: &str) -> bool {
        let truncated: String = text.chars().take(SAFETY_TEXT_CEILING).collect();
        match self.analyze(&truncated).await {
            Ok(categories) => {
                for category in &categories {
                    if category.severity >= UNSAFE_SEVERITY {
                        tracing::info!(
                            category = %category.category,
                            severity = category.severity,
                            "Content classified unsafe"
                        );
                        return false;
                    }
                }
                true
            }
            Err(error) => {
                tracing::warn!(error = %error, "Safety classifier unavailable; rejecting");
                false
            }
        }
    }

    async fn analyze(&self, text: &str) -> Result<Vec<CategorySeverity>, SafetyError> {
        let mut request = self
            .client
            .post(format!("{}/analyze", self.base_url))
            .json(&json!({ "text": text }));
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            request = request.header("api-key", api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SafetyError::UnexpectedStatus { status, body });
        }

        let payload: AnalyzeResponse = response.json().await?;
        Ok(payload.categories_analysis)
    }
}

/// Validates that a URL belongs to an allow-listed government domain and responds.
pub struct UrlValidator {
    client: Client,
    patterns: Vec<Regex>,
}

impl UrlValidator {
    /// Build a validator with the standard government domain allow-list.
    pub fn new() -> Self {
        let patterns = [r"\.gov$", r"\.gob$", r"\.gov\.co$"]
            .iter()
            .map(|pattern| Regex::new(pattern).expect("static allow-list pattern"))
            .collect();
        Self::with_patterns(patterns)
    }

    /// Build a validator with a custom host allow-list.
    pub fn with_patterns(patterns: Vec<Regex>) -> Self {
        let client = Client::builder()
            .user_agent("cividex/0.1")
            .timeout(URL_PROBE_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self { client, patterns }
    }

    /// Return `true` only when the URL host matches the allow-list and a bounded
    /// reachability probe returns HTTP 200.
    pub async fn validate(&self, url: &str) -> bool {
        let Ok(parsed) = reqwest::Url::parse(url) else {
            tracing::debug!(url, "URL failed to parse");
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        if !self.patterns.iter().any(|pattern| pattern.is_match(host)) {
            tracing::debug!(url, host, "Host not in government allow-list");
            return false;
        }

        match self.client.get(parsed).send().await {
            Ok(response) if response.status() == reqwest::StatusCode::OK => true,
            Ok(response) => {
                tracing::debug!(url, status = %response.status(), "URL probe returned non-200");
                false
            }
            Err(error) => {
                tracing::debug!(url, error = %error, "URL probe failed");
                false
            }
        }
    }
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}
