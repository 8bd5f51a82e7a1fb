//! HTTP push client for forwarding reaction results to a remote endpoint.
//!
//! Every call returns a uniform [`PushResult`]. Success means exactly
//! HTTP 200 with a JSON body; anything else is captured as the error.

use std::fmt;
use std::time::{Duration, Instant};

use reqwest::header::{CONNECTION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::Value;

use super::ReactionError;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Snapshot of a non-successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CapturedResponse {
    /// Body decoded as JSON, when it is JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Why a push did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFailure {
    /// The server answered with something other than 200.
    Status(CapturedResponse),
    /// 200, but the body is not JSON.
    Decode(String),
    /// No usable response (connect error, timeout, bad URL).
    Transport(String),
}

impl fmt::Display for PushFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushFailure::Status(response) => match response.json() {
                Some(json) => write!(f, "HTTP {}: {json}", response.status),
                None => write!(f, "HTTP {}: {}", response.status, response.body),
            },
            PushFailure::Decode(reason) => write!(f, "invalid JSON body: {reason}"),
            PushFailure::Transport(reason) => write!(f, "transport error: {reason}"),
        }
    }
}

/// Decoded body on success, the raw response otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Response(CapturedResponse),
    Empty,
}

/// Uniform result of one HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct PushResult {
    pub success: bool,
    pub payload: Payload,
    pub error: Option<PushFailure>,
    pub elapsed: Duration,
}

impl PushResult {
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    fn failure(payload: Payload, error: PushFailure, started: Instant) -> Self {
        Self {
            success: false,
            payload,
            error: Some(error),
            elapsed: started.elapsed(),
        }
    }
}

impl fmt::Display for PushResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PushResult(success={}", self.success)?;
        if let Payload::Json(json) = &self.payload {
            write!(f, ", data={json}")?;
        }
        match &self.error {
            Some(error) => write!(f, ", error={error})"),
            None => write!(f, ", error=None)"),
        }
    }
}

/// Optional parts of a request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub json: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn json(body: Value) -> Self {
        Self {
            json: Some(body),
            ..Default::default()
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Client for one remote base address.
#[derive(Debug, Clone)]
pub struct HttpPusher {
    base: Url,
    client: Client,
    timeout: Duration,
}

impl HttpPusher {
    /// Create a pusher for `address`.
    ///
    /// A bare `host:port` is treated as plain HTTP.
    pub fn new(address: &str) -> Result<Self, ReactionError> {
        let invalid = |reason: String| ReactionError::InvalidRemote {
            address: address.to_string(),
            reason,
        };

        let with_scheme = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };
        let base = Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", base.scheme())));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            base,
            client,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub async fn get(&self, path: &str, options: RequestOptions) -> PushResult {
        self.send(Method::GET, path, options).await
    }

    pub async fn post(&self, path: &str, options: RequestOptions) -> PushResult {
        self.send(Method::POST, path, options).await
    }

    pub async fn put(&self, path: &str, options: RequestOptions) -> PushResult {
        self.send(Method::PUT, path, options).await
    }

    pub async fn patch(&self, path: &str, options: RequestOptions) -> PushResult {
        self.send(Method::PATCH, path, options).await
    }

    pub async fn delete(&self, path: &str, options: RequestOptions) -> PushResult {
        self.send(Method::DELETE, path, options).await
    }

    async fn send(&self, method: Method, path: &str, options: RequestOptions) -> PushResult {
        let started = Instant::now();

        let url = match self.base.join(path) {
            Ok(url) => url,
            Err(e) => {
                return PushResult::failure(
                    Payload::Empty,
                    PushFailure::Transport(format!("invalid path '{path}': {e}")),
                    started,
                );
            }
        };

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .timeout(options.timeout.unwrap_or(self.timeout));

        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(body) = &options.json {
            request = request.json(body);
        }
        for (name, value) in &options.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => request = request.header(name, value),
                _ => tracing::warn!("[push] skipping invalid header {name}"),
            }
        }

        let result = match request.send().await {
            Ok(response) => Self::adapt(response, started).await,
            Err(e) => PushResult::failure(Payload::Empty, PushFailure::Transport(e.to_string()), started),
        };

        crate::debug_event!(
            "push",
            method.as_str(),
            "{url} -> {} in {:.3}s",
            result.success,
            result.elapsed_secs()
        );
        result
    }

    async fn adapt(response: reqwest::Response, started: Instant) -> PushResult {
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return PushResult::failure(
                    Payload::Empty,
                    PushFailure::Transport(e.to_string()),
                    started,
                );
            }
        };

        if status != StatusCode::OK {
            let captured = CapturedResponse {
                status: status.as_u16(),
                headers,
                body,
            };
            return PushResult::failure(
                Payload::Response(captured.clone()),
                PushFailure::Status(captured),
                started,
            );
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(json) => PushResult {
                success: true,
                payload: Payload::Json(json),
                error: None,
                elapsed: started.elapsed(),
            },
            Err(e) => PushResult::failure(Payload::Empty, PushFailure::Decode(e.to_string()), started),
        }
    }
}
