//! HTTP transport adapter for mini-program style host runtimes.
//!
//! # Overview
//! Some runtimes expose a single callback-based request primitive instead of
//! a socket API. `MpAdapter` accepts a platform-agnostic `RequestConfig`,
//! translates it into one call of that primitive, and normalizes whatever
//! comes back (success, failure, or caller cancellation) into a `Response`
//! or an `AdapterError`.
//!
//! # Design
//! - The host primitive is injected as a `RequestHost` so the adapter runs
//!   against fakes in tests and against any real runtime in production.
//! - Exactly one outcome is delivered per request. Host callbacks and the
//!   cancellation listener race through claim-once cells.
//! - Options the host cannot honour (timeouts, progress hooks) go to a
//!   `DiagnosticSink` and are otherwise ignored.
//! - URL building, status settlement and error construction are small free
//!   functions with fixed contracts, usable on their own.

pub mod adapter;
pub mod cancel;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod host;
pub mod http;
pub mod response;
pub mod settle;
mod state;
pub mod url;

pub use adapter::MpAdapter;
pub use cancel::{Cancel, CancelToken, Canceler, ListenerKey};
pub use config::{BasicAuth, Params, ProgressEvent, RequestConfig};
pub use diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
pub use error::{create_error, AdapterError, ErrorCode, FailureKind, RequestError};
pub use host::{HostCallbacks, HostFailure, HostInvocation, HostRequest, HostSuccess, RequestHost, RequestTask};
pub use http::{FormData, Headers, RequestBody, ResponseData, ResponseType};
pub use response::{NoRequest, Response};
pub use settle::settle;
pub use state::Outcome;
