//! Canonical error shapes.
//!
//! # Design
//! `RequestError` is the library-wide error object: a message, an optional
//! kind code, the originating descriptor, and the response when one exists.
//! `AdapterError` adds the cancellation passthrough. A cancelled request
//! rejects with the caller's own `Cancel` reason rather than a
//! `RequestError`, so callers match on both shapes.
//!
//! Host failures are classified by substring match on the host's free-text
//! message, in priority order: abort, then timeout, then everything else.

use std::fmt;

use thiserror::Error;

use crate::cancel::Cancel;
use crate::config::RequestConfig;
use crate::response::{NoRequest, Response};

/// Kind codes a `RequestError` may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// `ECONNABORTED`: the host aborted the request or reported a timeout.
    ConnAborted,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConnAborted => "ECONNABORTED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RequestError {
    pub message: String,
    pub code: Option<ErrorCode>,
    /// How the host failure behind this error was classified. `None` for
    /// errors not built from a host failure.
    pub failure: Option<FailureKind>,
    pub config: Box<RequestConfig>,
    pub request: NoRequest,
    pub response: Option<Box<Response>>,
}

impl RequestError {
    pub fn with_response(mut self, response: Response) -> Self {
        self.response = Some(Box::new(response));
        self
    }
}

/// Build a `RequestError` with no response attached.
pub fn create_error(
    message: impl Into<String>,
    config: RequestConfig,
    code: Option<ErrorCode>,
    request: NoRequest,
) -> RequestError {
    RequestError {
        message: message.into(),
        code,
        failure: None,
        config: Box::new(config),
        request,
        response: None,
    }
}

/// Everything a dispatched request can reject with.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("{0}")]
    Cancelled(Cancel),
}

impl AdapterError {
    pub fn is_cancel(&self) -> bool {
        matches!(self, AdapterError::Cancelled(_))
    }

    pub fn as_request_error(&self) -> Option<&RequestError> {
        match self {
            AdapterError::Request(err) => Some(err),
            AdapterError::Cancelled(_) => None,
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        self.as_request_error().and_then(|err| err.code)
    }
}

/// How a host failure message was understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Aborted,
    TimedOut,
    Network,
}

const ABORT_MARKER: &str = "request:fail abort";
const TIMEOUT_MARKER: &str = "timeout";

impl FailureKind {
    pub fn classify(err_msg: &str) -> Self {
        if err_msg.contains(ABORT_MARKER) {
            FailureKind::Aborted
        } else if err_msg.contains(TIMEOUT_MARKER) {
            FailureKind::TimedOut
        } else {
            FailureKind::Network
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            FailureKind::Aborted | FailureKind::TimedOut => Some(ErrorCode::ConnAborted),
            FailureKind::Network => None,
        }
    }

    /// The timeout message quotes the requested value even though the
    /// adapter never enforced it.
    pub fn message(&self, requested_timeout_ms: u64) -> String {
        match self {
            FailureKind::Aborted => "Request aborted".to_string(),
            FailureKind::TimedOut => format!("timeout of {requested_timeout_ms}ms exceeded"),
            FailureKind::Network => "Network Error".to_string(),
        }
    }
}

/// Turn a host failure message into the canonical error for `config`.
pub fn classify_failure(err_msg: &str, config: RequestConfig) -> RequestError {
    let kind = FailureKind::classify(err_msg);
    let message = kind.message(config.timeout_ms());
    RequestError {
        failure: Some(kind),
        ..create_error(message, config, kind.code(), NoRequest)
    }
}
