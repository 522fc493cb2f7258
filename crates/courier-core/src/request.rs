//! Outbound request record.
//!
//! A [`Request`] is immutable from the point of view of the pipeline: layers
//! derive new values through the consuming `with_*` methods instead of
//! mutating a shared one.

use crate::{ApiError, CancelToken, Headers, Priority};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Default delay unit between retries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Returns true for methods with create/update/replace/delete semantics.
    #[must_use]
    pub const fn is_payload(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch | Self::Delete)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(ApiError::Configuration(format!("Unsupported method: {other}"))),
        }
    }
}

/// Per-request retry override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryBudget {
    /// Method-sensitive default budget.
    #[default]
    Default,
    /// Never retry.
    Disabled,
    /// Retry at most this many times.
    Max(u32),
}

impl From<bool> for RetryBudget {
    fn from(enabled: bool) -> Self {
        if enabled {
            Self::Default
        } else {
            Self::Disabled
        }
    }
}

impl From<u32> for RetryBudget {
    fn from(max: u32) -> Self {
        Self::Max(max)
    }
}

/// Caller-supplied retry eligibility predicate.
#[derive(Clone)]
pub struct RetryOn(Arc<dyn Fn(&ApiError) -> bool + Send + Sync>);

impl RetryOn {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&ApiError) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    #[must_use]
    pub fn check(&self, error: &ApiError) -> bool {
        (self.0)(error)
    }
}

impl fmt::Debug for RetryOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RetryOn(<fn>)")
    }
}

/// Outbound request as seen by every pipeline layer.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: String,
    headers: Headers,
    body: Option<Vec<u8>>,
    priority: i32,
    dedupe_key: Option<String>,
    request_id: Option<String>,
    retry: RetryBudget,
    retry_status: Option<Vec<u16>>,
    retry_on: Option<RetryOn>,
    retry_delay: Duration,
    retry_count: u32,
    signal: CancelToken,
}

impl Request {
    /// Creates a request with default scheduling and retry settings.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: None,
            priority: Priority::Normal.into(),
            dedupe_key: None,
            request_id: None,
            retry: RetryBudget::Default,
            retry_status: None,
            retry_on: None,
            retry_delay: DEFAULT_RETRY_DELAY,
            retry_count: 0,
            signal: CancelToken::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Identity key used for single-flight deduplication.
    ///
    /// Falls back to the legacy `request_id` when no dedupe key is set.
    #[must_use]
    pub fn dedupe_key(&self) -> Option<&str> {
        self.dedupe_key.as_deref().or(self.request_id.as_deref())
    }

    #[must_use]
    pub fn retry(&self) -> RetryBudget {
        self.retry
    }

    #[must_use]
    pub fn retry_status(&self) -> Option<&[u16]> {
        self.retry_status.as_deref()
    }

    #[must_use]
    pub fn retry_on(&self) -> Option<&RetryOn> {
        self.retry_on.as_ref()
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Cancellation token of this request.
    #[must_use]
    pub fn signal(&self) -> &CancelToken {
        &self.signal
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: impl Into<i32>) -> Self {
        self.priority = priority.into();
        self
    }

    #[must_use]
    pub fn with_dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }

    /// Sets the legacy request identifier.
    #[deprecated(note = "use `with_dedupe_key`; the name clashes with `X-Request-ID`")]
    #[must_use]
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: impl Into<RetryBudget>) -> Self {
        self.retry = retry.into();
        self
    }

    #[must_use]
    pub fn with_retry_status(mut self, statuses: impl Into<Vec<u16>>) -> Self {
        self.retry_status = Some(statuses.into());
        self
    }

    #[must_use]
    pub fn with_retry_on(mut self, predicate: RetryOn) -> Self {
        self.retry_on = Some(predicate);
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[must_use]
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    #[must_use]
    pub fn with_signal(mut self, signal: CancelToken) -> Self {
        self.signal = signal;
        self
    }

    /// Derives the next attempt of this request, sharing its identity.
    #[must_use]
    pub fn next_attempt(&self) -> Self {
        self.clone().with_retry_count(self.retry_count.saturating_add(1))
    }
}
