//! HTTP client for the remote validator.
//!
//! Every call goes through [`BackendClient::request`]: a bounded loop of
//! attempts, each raced against a timeout, with a fixed pause between
//! failures. A non-2xx response whose JSON body carries a `valid` field is a
//! verdict, not a failure; the validator reports "ticket invalid" that way.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{BackendConfig, Endpoints, RequestConfig, ScannerConfig};
use crate::error::TransportError;
use crate::normalize::{transform_history, transform_stats};
use crate::scanner::TicketValidator;
use crate::time::TimeNormalizer;
use crate::types::{ConnectionStatus, TicketHistoryItem, ValidateRequest, ValidationStats};

/// Attempt budget and pacing for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Per-attempt timeout; the in-flight call is dropped when it fires.
    pub timeout: Duration,
    /// Fixed pause between failed attempts.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RequestConfig::default())
    }
}

impl From<&RequestConfig> for RetryPolicy {
    fn from(config: &RequestConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            timeout: config.timeout(),
            retry_delay: config.retry_delay(),
        }
    }
}

/// Method, body and extra headers for one request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// HTTP verb.
    pub method: Method,
    /// JSON body, sent with `Content-Type: application/json`.
    pub body: Option<Value>,
    /// Merged over the standard headers.
    pub headers: HeaderMap,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::get()
    }
}

impl RequestOptions {
    /// A bodiless `GET`.
    #[must_use]
    pub fn get() -> Self {
        Self {
            method: Method::GET,
            body: None,
            headers: HeaderMap::new(),
        }
    }

    /// A `POST` with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Encode`] if `body` cannot be serialized.
    pub fn post<B: Serialize>(body: &B) -> Result<Self, TransportError> {
        let body = serde_json::to_value(body).map_err(|e| TransportError::Encode(e.to_string()))?;
        Ok(Self {
            method: Method::POST,
            body: Some(body),
            headers: HeaderMap::new(),
        })
    }
}

/// Why a single attempt failed.
#[derive(Debug)]
enum AttemptError {
    Timeout(Duration),
    Status { status: u16, message: Option<String> },
    Network(String),
    Decode(String),
}

impl AttemptError {
    const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout(limit) => write!(f, "request timed out after {} ms", limit.as_millis()),
            Self::Status {
                status,
                message: Some(message),
            } => write!(f, "HTTP error! status: {status}, message: {message}"),
            Self::Status {
                status,
                message: None,
            } => write!(f, "HTTP error! status: {status}"),
            Self::Network(message) => f.write_str(message),
            Self::Decode(message) => write!(f, "invalid response body: {message}"),
        }
    }
}

/// Client for the remote validation service.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    user_agent: HeaderValue,
    validated_by: String,
    endpoints: Endpoints,
    policy: RetryPolicy,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.base_url)
            .field("validated_by", &self.validated_by)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    /// Creates a client for `backend` using `policy` for every request.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientBuild`] if the client identifier is not
    /// a valid header value or the HTTP client cannot be constructed.
    pub fn new(backend: &BackendConfig, policy: RetryPolicy) -> Result<Self, TransportError> {
        let user_agent = HeaderValue::from_str(&backend.client_id).map_err(|e| {
            TransportError::ClientBuild(format!("invalid client id '{}': {e}", backend.client_id))
        })?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::ClientBuild(e.to_string()))?;

        Ok(Self {
            http,
            base_url: backend.base_url.clone(),
            user_agent,
            validated_by: backend.validated_by.clone(),
            endpoints: backend.endpoints.clone(),
            policy,
        })
    }

    /// Creates a client from the full scanner configuration.
    ///
    /// # Errors
    ///
    /// See [`BackendClient::new`].
    pub fn from_config(config: &ScannerConfig) -> Result<Self, TransportError> {
        Self::new(&config.backend, RetryPolicy::from(&config.request))
    }

    /// The policy applied to every request.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Resolves an endpoint against the base address.
    ///
    /// Absolute `http(s)` URLs are passed through unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] if the result does not parse.
    pub fn build_url(&self, endpoint: &str) -> Result<Url, TransportError> {
        let full = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            let base = self.base_url.trim_end_matches('/');
            if endpoint.starts_with('/') {
                format!("{base}{endpoint}")
            } else {
                format!("{base}/{endpoint}")
            }
        };
        Url::parse(&full).map_err(|e| TransportError::InvalidUrl {
            url: full.clone(),
            reason: e.to_string(),
        })
    }

    fn standard_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, self.user_agent.clone());
        headers
    }

    /// Issues a request with timeout and bounded retry, decoding the body as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] if the final attempt timed out,
    /// [`TransportError::Exhausted`] if every attempt failed otherwise, and
    /// [`TransportError::InvalidUrl`] without attempting if the URL is bad.
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, TransportError> {
        let url = self.build_url(endpoint)?;
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = AttemptError::Network("no attempt made".to_string());

        for attempt in 1..=max_attempts {
            debug!(attempt, max_attempts, method = %options.method, %url, "sending request");

            match timeout(self.policy.timeout, self.attempt(&url, &options)).await {
                Ok(Ok(payload)) => return Ok(payload),
                Ok(Err(err)) => last_error = err,
                Err(_) => last_error = AttemptError::Timeout(self.policy.timeout),
            }

            warn!(attempt, max_attempts, %url, error = %last_error, "request attempt failed");

            if attempt < max_attempts {
                sleep(self.policy.retry_delay).await;
            }
        }

        Err(match last_error {
            AttemptError::Timeout(_) => TransportError::Timeout {
                attempts: max_attempts,
            },
            other => TransportError::Exhausted {
                attempts: max_attempts,
                status: other.status(),
                message: other.to_string(),
            },
        })
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        url: &Url,
        options: &RequestOptions,
    ) -> Result<T, AttemptError> {
        let mut request = self
            .http
            .request(options.method.clone(), url.clone())
            .headers(self.standard_headers())
            .headers(options.headers.clone());
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_slice(&body).map_err(|e| AttemptError::Decode(e.to_string()));
        }

        match serde_json::from_slice::<Value>(&body) {
            Ok(payload) if payload.get("valid").is_some() => {
                debug!(status = status.as_u16(), "error status carries a verdict");
                serde_json::from_value(payload).map_err(|e| AttemptError::Decode(e.to_string()))
            }
            Ok(payload) => Err(AttemptError::Status {
                status: status.as_u16(),
                message: server_message(&payload),
            }),
            Err(_) => Err(AttemptError::Status {
                status: status.as_u16(),
                message: None,
            }),
        }
    }

    /// Submits a scanned code; returns the raw verdict payload.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no verdict could be obtained.
    pub async fn validate_ticket(&self, code: &str) -> Result<Value, TransportError> {
        let options = RequestOptions::post(&ValidateRequest {
            code: code.to_string(),
            validated_by: self.validated_by.clone(),
        })?;
        self.request(&self.endpoints.validate, options).await
    }

    /// Fetches the raw `GET /history` payload.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the history could not be fetched.
    pub async fn fetch_history(&self, limit: u32) -> Result<Value, TransportError> {
        let endpoint = format!("{}?limit={limit}", self.endpoints.history);
        self.request(&endpoint, RequestOptions::get()).await
    }

    /// Fetches the most recent validations, ready for display.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the history could not be fetched.
    pub async fn history(
        &self,
        limit: u32,
        times: &TimeNormalizer,
    ) -> Result<Vec<TicketHistoryItem>, TransportError> {
        let raw = self.fetch_history(limit).await?;
        Ok(transform_history(&raw, times))
    }

    /// Fetches aggregate validation counters.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the stats could not be fetched.
    pub async fn stats(&self) -> Result<ValidationStats, TransportError> {
        let raw: Value = self
            .request(&self.endpoints.stats, RequestOptions::get())
            .await?;
        Ok(transform_stats(&raw))
    }

    /// Liveness probe: one attempt, any 2xx counts as connected.
    pub async fn health(&self) -> ConnectionStatus {
        let url = match self.build_url(&self.endpoints.health) {
            Ok(url) => url,
            Err(err) => {
                warn!(error = %err, "health probe skipped");
                return ConnectionStatus::Disconnected;
            }
        };

        let probe = self
            .http
            .get(url.clone())
            .headers(self.standard_headers())
            .send();

        let status = match timeout(self.policy.timeout, probe).await {
            Ok(Ok(response)) if response.status().is_success() => ConnectionStatus::Connected,
            Ok(Ok(response)) => {
                warn!(%url, status = response.status().as_u16(), "health probe rejected");
                ConnectionStatus::Disconnected
            }
            Ok(Err(err)) => {
                warn!(%url, error = %err, "health probe failed");
                ConnectionStatus::Disconnected
            }
            Err(_) => {
                warn!(%url, "health probe timed out");
                ConnectionStatus::Disconnected
            }
        };
        info!(%url, status = status.label(), "backend health checked");
        status
    }
}

impl TicketValidator for BackendClient {
    async fn validate(&self, code: &str) -> Result<Value, TransportError> {
        self.validate_ticket(code).await
    }
}

/// Server-supplied explanation from an error body, if any.
fn server_message(payload: &Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .filter_map(|key| payload.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Null | Value::String(_) => None,
            other => Some(other.to_string()),
        })
}
