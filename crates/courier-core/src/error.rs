//! Unified error types for the request pipeline.

use crate::{Headers, Request};
use std::fmt;
use thiserror::Error;

/// Classified error code of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// 4xx response.
    BadRequest,
    /// 5xx response.
    BadResponse,
    /// No response at all (connection, DNS, protocol).
    Network,
}

impl ErrorCode {
    /// Classifies a response status.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            400..=499 => Self::BadRequest,
            500..=599 => Self::BadResponse,
            _ => Self::Network,
        }
    }

    /// Returns a machine-readable code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "ERR_BAD_REQUEST",
            Self::BadResponse => "ERR_BAD_RESPONSE",
            Self::Network => "ERR_NETWORK",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A network or status failure reported by the transport.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportFailure {
    status: Option<u16>,
    code: ErrorCode,
    message: String,
    headers: Headers,
    body: Vec<u8>,
    request: Option<Box<Request>>,
    retry_count: u32,
}

impl TransportFailure {
    /// Creates a failure for a non-success response status.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        Self {
            status: Some(status),
            code: ErrorCode::from_status(status),
            message: format!("Request failed with status code {status}"),
            headers: Headers::new(),
            body: Vec::new(),
            request: None,
            retry_count: 0,
        }
    }

    /// Creates a failure for a call that produced no response.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: ErrorCode::Network,
            message: message.into(),
            headers: Headers::new(),
            body: Vec::new(),
            request: None,
            retry_count: 0,
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The request that produced this failure, when the transport attached it.
    #[must_use]
    pub fn request(&self) -> Option<&Request> {
        self.request.as_deref()
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
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
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_request(mut self, request: Request) -> Self {
        self.request = Some(Box::new(request));
        self
    }

    #[must_use]
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}

/// Unified error type surfaced by every pipeline layer.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The caller, a dedupe collision, or an explicit cancel aborted the call.
    #[error("Request cancelled")]
    Cancelled,

    /// The transport failed, with or without a response.
    #[error(transparent)]
    Transport(Box<TransportFailure>),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// Shorthand for a status failure without headers or body.
    #[must_use]
    pub fn status_failure(status: u16) -> Self {
        TransportFailure::from_status(status).into()
    }

    /// Returns the response status, if the failure carried one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(failure) => failure.status(),
            _ => None,
        }
    }

    /// Returns the status code, or 500 for errors without a response.
    #[must_use]
    pub fn code(&self) -> u16 {
        self.status().unwrap_or(500)
    }

    /// Returns true if this error is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Number of retries performed before this error surfaced.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        match self {
            Self::Transport(failure) => failure.retry_count(),
            _ => 0,
        }
    }

    /// Looks up a response header carried by the failure.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        match self {
            Self::Transport(failure) => failure.headers().get(name),
            _ => None,
        }
    }

    /// Returns the transport failure, if this is one.
    #[must_use]
    pub fn as_transport(&self) -> Option<&TransportFailure> {
        match self {
            Self::Transport(failure) => Some(failure),
            _ => None,
        }
    }

    /// Stamps the retry count onto a transport failure; other kinds pass through.
    #[must_use]
    pub fn with_retry_count(self, retry_count: u32) -> Self {
        match self {
            Self::Transport(failure) => Self::Transport(Box::new(failure.with_retry_count(retry_count))),
            other => other,
        }
    }

    /// Attaches `request` to a transport failure that does not carry one yet.
    #[must_use]
    pub fn with_request_if_missing(self, request: &Request) -> Self {
        match self {
            Self::Transport(failure) if failure.request().is_none() => {
                Self::Transport(Box::new(failure.with_request(request.clone())))
            }
            other => other,
        }
    }
}

impl From<TransportFailure> for ApiError {
    fn from(failure: TransportFailure) -> Self {
        Self::Transport(Box::new(failure))
    }
}
