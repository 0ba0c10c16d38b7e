//! LLM client for OpenAI-compatible endpoints.
//!
//! Works against the OpenAI API, aggregators (OpenRouter, Together, Groq) and
//! local servers (vLLM, Ollama, llama.cpp) that expose `/chat/completions`.

use super::{CompletionRequest, CompletionResponse, Message, TextGenerator, UsageTotals};
use crate::models::{Config, HalluvalError, ServiceError};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Upper bound for a server-provided `retry-after` wait.
const MAX_RETRY_AFTER_SECS: f64 = 60.0;

/// Upper bound for exponential backoff between attempts.
const MAX_BACKOFF_SECS: u64 = 30;

/// Chat completion request payload.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f64,
}

/// Chat completion response.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// API error response (OpenAI-compatible).
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Generic LLM client for any OpenAI-compatible endpoint.
///
/// Features:
/// - Bearer auth and custom headers
/// - Optional retry with exponential backoff (off by default)
/// - Token and cost tracking
pub struct LLMClient {
    client: reqwest::Client,
    /// Name of this endpoint (for logging)
    name: String,
    /// Base URL for the API
    base_url: String,
    /// Headers sent with every request
    headers: HeaderMap,
    /// Request timeout
    timeout: Duration,
    /// Attempts per request
    max_retries: u32,
    // Usage tracking
    total_input_tokens: AtomicU64,
    total_output_tokens: AtomicU64,
    total_cost_micros: AtomicU64, // Store as microdollars for atomic ops
}

impl LLMClient {
    /// Create a new LLM client.
    ///
    /// # Arguments
    /// - `name`: Endpoint name for logging
    /// - `api_key`: Optional API key (None for local endpoints)
    /// - `base_url`: Base URL for the API
    /// - `custom_headers`: Additional headers to include in requests
    /// - `timeout_secs`: Request timeout in seconds
    /// - `max_retries`: Attempts per request (at least 1)
    pub fn new(
        name: impl Into<String>,
        api_key: Option<String>,
        base_url: impl Into<String>,
        custom_headers: &HashMap<String, String>,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self, ServiceError> {
        let timeout = Duration::from_secs(timeout_secs);

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers: build_headers(api_key.as_deref(), custom_headers)?,
            timeout,
            max_retries: max_retries.max(1),
            total_input_tokens: AtomicU64::new(0),
            total_output_tokens: AtomicU64::new(0),
            total_cost_micros: AtomicU64::new(0),
        })
    }

    /// Build a client from the `[endpoint]` section.
    ///
    /// The API key is optional so that local servers work without one.
    pub fn from_config(config: &Config) -> Result<Self, HalluvalError> {
        let api_key = config.resolve_api_key(false)?;
        let endpoint = &config.endpoint;
        Self::new(
            "default",
            api_key,
            endpoint.base_url.clone(),
            &config.resolved_headers(),
            endpoint.timeout_secs,
            endpoint.max_retries,
        )
        .map_err(|e| HalluvalError::InvalidInput(format!("Failed to create client: {e}")))
    }

    /// Get the endpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Complete a chat request.
    ///
    /// Retries network errors, 429s and 5xx responses up to `max_retries`
    /// attempts in total. Authentication and not-found errors fail at once.
    pub async fn send(&self, request: &CompletionRequest) -> Result<CompletionResponse, ServiceError> {
        let start = Instant::now();
        let payload = ChatCompletionRequest {
            model: &request.model.id,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error: Option<ServiceError> = None;

        for attempt in 0..self.max_retries {
            let is_last = attempt + 1 == self.max_retries;

            let response = self
                .client
                .post(&url)
                .headers(self.headers.clone())
                .json(&payload)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(if e.is_timeout() {
                        ServiceError::Timeout(self.timeout)
                    } else {
                        ServiceError::Network(e)
                    });
                    if !is_last {
                        let backoff = backoff_delay(attempt);
                        debug!(
                            endpoint = %self.name,
                            attempt = attempt,
                            backoff_secs = backoff.as_secs(),
                            "Retrying after network error"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    continue;
                }
            };

            let status = response.status().as_u16();

            // Handle rate limiting
            if status == 429 {
                let hinted = parse_retry_after(
                    response
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok()),
                );
                let wait = hinted.map_or_else(|| backoff_delay(attempt), Duration::from_secs_f64);

                last_error = Some(ServiceError::RateLimited {
                    retry_after_secs: wait.as_secs_f64(),
                });

                if !is_last {
                    debug!(
                        endpoint = %self.name,
                        attempt = attempt,
                        retry_after_secs = wait.as_secs_f64(),
                        server_hint = hinted.is_some(),
                        "Rate limited, waiting"
                    );
                    tokio::time::sleep(wait).await;
                }
                continue;
            }

            // Handle other errors
            if !response.status().is_success() {
                let error_body = response.text().await.unwrap_or_default();
                let error = classify_error(status, &error_body, &request.model.id);

                // Don't retry auth errors or not found
                let permanent = matches!(
                    error,
                    ServiceError::AuthenticationFailed | ServiceError::ModelNotFound(_)
                ) || (400..500).contains(&status);
                last_error = Some(error);
                if permanent {
                    break;
                }

                if !is_last {
                    let backoff = backoff_delay(attempt);
                    tokio::time::sleep(backoff).await;
                }
                continue;
            }

            // Parse successful response
            let body: ChatCompletionResponse = response
                .json()
                .await
                .map_err(|e| ServiceError::InvalidResponse(format!("Failed to parse response: {e}")))?;

            let content = body
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content.unwrap_or_default())
                .ok_or_else(|| ServiceError::InvalidResponse("No choices in response".to_string()))?;

            let usage = body.usage.unwrap_or_default();
            let cost = request
                .model
                .cost(usage.prompt_tokens, usage.completion_tokens);

            self.total_input_tokens
                .fetch_add(usage.prompt_tokens as u64, Ordering::Relaxed);
            self.total_output_tokens
                .fetch_add(usage.completion_tokens as u64, Ordering::Relaxed);
            self.total_cost_micros
                .fetch_add((cost * 1_000_000.0) as u64, Ordering::Relaxed);

            debug!(
                endpoint = %self.name,
                model = %request.model.id,
                input_tokens = usage.prompt_tokens,
                output_tokens = usage.completion_tokens,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Completion received"
            );

            return Ok(CompletionResponse {
                content,
                model: body.model.unwrap_or_else(|| request.model.id.clone()),
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                cost_usd: cost,
                duration: start.elapsed(),
            });
        }

        // All attempts exhausted
        Err(match last_error {
            Some(error) if self.max_retries == 1 => error,
            Some(error) => ServiceError::MaxRetriesExceeded {
                attempts: self.max_retries,
                last_error: error.to_string(),
            },
            None => ServiceError::MaxRetriesExceeded {
                attempts: self.max_retries,
                last_error: "Unknown error".to_string(),
            },
        })
    }

    /// Get total cost tracked.
    pub fn total_cost_usd(&self) -> f64 {
        self.total_cost_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    /// Get total tokens tracked.
    pub fn total_tokens(&self) -> (u64, u64) {
        (
            self.total_input_tokens.load(Ordering::Relaxed),
            self.total_output_tokens.load(Ordering::Relaxed),
        )
    }

    /// Health check: ping the /models endpoint.
    pub async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let url = format!("{}/models", self.base_url);

        match self
            .client
            .get(&url)
            .headers(self.headers.clone())
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(response) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                if response.status().is_success() {
                    HealthCheckResult {
                        endpoint: self.name.clone(),
                        status: HealthStatus::Healthy,
                        latency_ms: Some(latency_ms),
                        error: None,
                    }
                } else {
                    HealthCheckResult {
                        endpoint: self.name.clone(),
                        status: HealthStatus::Unhealthy,
                        latency_ms: Some(latency_ms),
                        error: Some(format!("HTTP {}", response.status().as_u16())),
                    }
                }
            }
            Err(e) => HealthCheckResult {
                endpoint: self.name.clone(),
                status: HealthStatus::Unreachable,
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[async_trait]
impl TextGenerator for LLMClient {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ServiceError> {
        self.send(&request).await
    }

    fn usage(&self) -> UsageTotals {
        let (input_tokens, output_tokens) = self.total_tokens();
        UsageTotals {
            input_tokens,
            output_tokens,
            cost_usd: self.total_cost_usd(),
        }
    }
}

/// Build the static request headers.
fn build_headers(
    api_key: Option<&str>,
    custom_headers: &HashMap<String, String>,
) -> Result<HeaderMap, ServiceError> {
    let mut headers = HeaderMap::new();

    if let Some(api_key) = api_key {
        let value = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
            ServiceError::InvalidRequest("API key contains invalid header characters".to_string())
        })?;
        headers.insert(AUTHORIZATION, value);
    }

    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for (key, value) in custom_headers {
        let name = HeaderName::try_from(key.as_str())
            .map_err(|_| ServiceError::InvalidRequest(format!("invalid header name '{key}'")))?;
        let val = HeaderValue::from_str(value)
            .map_err(|_| ServiceError::InvalidRequest(format!("invalid value for header '{key}'")))?;
        headers.insert(name, val);
    }

    Ok(headers)
}

/// Delay before retry number `attempt + 1`: 1s, 2s, 4s, ... capped.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt).min(MAX_BACKOFF_SECS))
}

/// Seconds from a `retry-after` header given in delta-seconds form.
///
/// Negative, non-finite and HTTP-date values yield `None`; large values are
/// clamped to `MAX_RETRY_AFTER_SECS`.
fn parse_retry_after(value: Option<&str>) -> Option<f64> {
    value?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| secs.min(MAX_RETRY_AFTER_SECS))
}

/// Map a non-success HTTP status and body to a service error.
fn classify_error(status: u16, body: &str, model_id: &str) -> ServiceError {
    match status {
        401 | 403 => ServiceError::AuthenticationFailed,
        404 => ServiceError::ModelNotFound(model_id.to_string()),
        _ => {
            let message = serde_json::from_str::<ApiErrorResponse>(body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.to_string());
            ServiceError::ApiError { status, message }
        }
    }
}

/// Health check result.
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    /// Endpoint name
    pub endpoint: String,
    /// Health status
    pub status: HealthStatus,
    /// Latency in milliseconds (if reachable)
    pub latency_ms: Option<u64>,
    /// Error message (if unhealthy or unreachable)
    pub error: Option<String>,
}

/// Health status of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Endpoint is responding normally
    Healthy,
    /// Endpoint is responding but with errors
    Unhealthy,
    /// Endpoint is not reachable
    Unreachable,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unreachable => write!(f, "unreachable"),
        }
    }
}
