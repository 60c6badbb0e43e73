//! The host request primitive, as a capability the adapter is given.
//!
//! # Design
//! A constrained runtime exposes exactly one way to make an HTTP request: a
//! function that takes `{method, url, header, data, responseType, success,
//! fail}` and returns an abortable task. `RequestHost` is that function;
//! `RequestTask` is the task. Production code plugs in the real runtime,
//! tests plug in fakes.
//!
//! The host promises to call at most one of `success` / `fail` per task.
//! `HostInvocation::split` turns the two callbacks into a `HostCallbacks`
//! value whose methods consume it, so a Rust host cannot break that promise.

use std::fmt;
use std::sync::Arc;

use crate::http::{Headers, RequestBody, ResponseData, ResponseType};

/// What the host hands to `success`.
#[derive(Debug, Clone, PartialEq)]
pub struct HostSuccess {
    pub status_code: u16,
    pub data: ResponseData,
    pub header: Headers,
    pub err_msg: String,
}

/// What the host hands to `fail`. `err_msg` is free text such as
/// `"request:fail abort"` or `"request:fail timeout"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFailure {
    pub err_msg: String,
}

impl HostFailure {
    pub fn new(err_msg: impl Into<String>) -> Self {
        Self {
            err_msg: err_msg.into(),
        }
    }
}

pub type SuccessCallback = Box<dyn FnOnce(HostSuccess) + Send>;
pub type FailCallback = Box<dyn FnOnce(HostFailure) + Send>;

/// The plain-data part of an invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct HostRequest {
    pub method: String,
    pub url: String,
    pub header: Headers,
    pub data: Option<RequestBody>,
    pub response_type: Option<ResponseType>,
}

/// One call into the host primitive.
pub struct HostInvocation {
    pub method: String,
    pub url: String,
    pub header: Headers,
    pub data: Option<RequestBody>,
    pub response_type: Option<ResponseType>,
    pub success: SuccessCallback,
    pub fail: FailCallback,
}

impl HostInvocation {
    pub(crate) fn new(request: HostRequest, success: SuccessCallback, fail: FailCallback) -> Self {
        Self {
            method: request.method,
            url: request.url,
            header: request.header,
            data: request.data,
            response_type: request.response_type,
            success,
            fail,
        }
    }

    pub fn split(self) -> (HostRequest, HostCallbacks) {
        (
            HostRequest {
                method: self.method,
                url: self.url,
                header: self.header,
                data: self.data,
                response_type: self.response_type,
            },
            HostCallbacks {
                success: self.success,
                fail: self.fail,
            },
        )
    }
}

impl fmt::Debug for HostInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostInvocation")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("header", &self.header)
            .field("data", &self.data)
            .field("response_type", &self.response_type)
            .finish_non_exhaustive()
    }
}

/// The two completion callbacks. Exactly one can be used.
pub struct HostCallbacks {
    success: SuccessCallback,
    fail: FailCallback,
}

impl HostCallbacks {
    pub fn succeed(self, response: HostSuccess) {
        (self.success)(response)
    }

    pub fn fail(self, failure: HostFailure) {
        (self.fail)(failure)
    }
}

impl fmt::Debug for HostCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostCallbacks(..)")
    }
}

/// An in-flight host request.
pub trait RequestTask {
    /// No return value and no idempotence guarantee from the host.
    fn abort(&self);
}

/// The host's single request primitive.
pub trait RequestHost {
    type Task: RequestTask + Send + 'static;

    fn request(&self, invocation: HostInvocation) -> Self::Task;
}

impl<H: RequestHost + ?Sized> RequestHost for Arc<H> {
    type Task = H::Task;

    fn request(&self, invocation: HostInvocation) -> Self::Task {
        (**self).request(invocation)
    }
}

impl<H: RequestHost + ?Sized> RequestHost for &H {
    type Task = H::Task;

    fn request(&self, invocation: HostInvocation) -> Self::Task {
        (**self).request(invocation)
    }
}
