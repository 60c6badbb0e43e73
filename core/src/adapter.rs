//! The transport adapter: descriptor in, host invocation out, one canonical
//! outcome back.
//!
//! # Design
//! `MpAdapter` holds the host capability and a diagnostic sink and nothing
//! else. `prepare` turns a `RequestConfig` into the plain `HostRequest`,
//! editing the caller's headers in place. `dispatch_with` wires the host's
//! success and failure callbacks plus the optional cancel token to a
//! completion closure that runs exactly once. `dispatch` wraps that in a
//! future.
//!
//! Timeouts and progress hooks are reported as diagnostics and otherwise
//! ignored. The adapter never starts a timer and never retries.

use std::future::Future;
use std::sync::Arc;

use base64::prelude::*;
use futures::channel::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::config::RequestConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::error::{classify_failure, create_error, AdapterError};
use crate::host::{HostFailure, HostInvocation, HostRequest, HostSuccess, RequestHost, RequestTask};
use crate::http::RequestBody;
use crate::response::{status_text, NoRequest, Response};
use crate::settle::settle;
use crate::state::{CancelWatch, Completion, Outcome, TaskSlot};
use crate::url::{build_full_path, build_url};

const CONTENT_TYPE: &str = "Content-Type";
const AUTHORIZATION: &str = "Authorization";
/// The host rejects requests that try to set this header.
const REFERER: &str = "Referer";

/// Adapter over a mini-program style request primitive.
#[derive(Debug, Clone)]
pub struct MpAdapter<H, D = TracingSink> {
    host: H,
    diagnostics: D,
}

impl<H: RequestHost> MpAdapter<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            diagnostics: TracingSink,
        }
    }
}

impl<H: RequestHost, D: DiagnosticSink> MpAdapter<H, D> {
    pub fn with_diagnostics<S: DiagnosticSink>(self, diagnostics: S) -> MpAdapter<H, S> {
        MpAdapter {
            host: self.host,
            diagnostics,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Build the host request for `config`, rewriting `config.headers` the
    /// way the host needs them.
    pub fn prepare(&self, config: &mut RequestConfig) -> HostRequest {
        let method = config.method.to_uppercase();
        let full_path = build_full_path(config.base_url.as_deref(), &config.url);
        let url = build_url(
            &full_path,
            config.params.as_ref(),
            config.params_serializer.as_ref(),
        );

        // Multipart bodies need the host to pick the boundary.
        if config.data.as_ref().is_some_and(RequestBody::is_form) {
            config.headers.remove(CONTENT_TYPE);
        }

        if let Some(auth) = &config.auth {
            let username = auth.username.as_deref().unwrap_or("");
            let password = auth.password.as_deref().unwrap_or("");
            let encoded = BASE64_STANDARD.encode(format!("{username}:{password}"));
            config.headers.insert(AUTHORIZATION, format!("Basic {encoded}"));
        }

        let has_body = config.data.is_some();
        config.headers.retain(|name, _| {
            let drop_content_type = !has_body && name.eq_ignore_ascii_case(CONTENT_TYPE);
            !(drop_content_type || name.eq_ignore_ascii_case(REFERER))
        });

        self.report_unsupported(config);

        HostRequest {
            method,
            url,
            header: config.headers.clone(),
            data: config.data.clone(),
            response_type: config.response_type,
        }
    }

    fn report_unsupported(&self, config: &RequestConfig) {
        let requested_ms = config.timeout_ms();
        if requested_ms != 0 {
            self.diagnostics
                .warn(&Diagnostic::UnsupportedTimeout { requested_ms });
        }
        if config.on_download_progress.is_some() {
            self.diagnostics.warn(&Diagnostic::UnsupportedDownloadProgress);
        }
        if config.on_upload_progress.is_some() {
            self.diagnostics.warn(&Diagnostic::UnsupportedUploadProgress);
        }
    }

    /// Issue the request and call `on_complete` exactly once with its
    /// outcome, unless the host drops both callbacks without using either.
    pub fn dispatch_with(
        &self,
        mut config: RequestConfig,
        on_complete: impl FnOnce(Outcome) + Send + 'static,
    ) {
        let request_id = Uuid::new_v4();
        let request = self.prepare(&mut config);
        debug!(%request_id, method = %request.method, url = %request.url, "dispatching to host");

        let completion = Completion::new(on_complete);
        let slot = TaskSlot::<H::Task>::new();
        let watch = CancelWatch::new();

        let success = {
            let completion = Arc::clone(&completion);
            let slot = Arc::clone(&slot);
            let watch = Arc::clone(&watch);
            let config = config.clone();
            Box::new(move |reply: HostSuccess| {
                if !slot.finish() {
                    debug!(%request_id, "host success after completion ignored");
                    return;
                }
                watch.release();
                debug!(%request_id, status = reply.status_code, "host reported success");
                let response = Response {
                    data: reply.data,
                    status: reply.status_code,
                    status_text: status_text(reply.status_code).to_string(),
                    headers: reply.header,
                    config,
                    request: NoRequest,
                };
                completion.complete(settle(response));
            })
        };

        let fail = {
            let completion = Arc::clone(&completion);
            let slot = Arc::clone(&slot);
            let watch = Arc::clone(&watch);
            let config = config.clone();
            Box::new(move |failure: HostFailure| {
                if !slot.finish() {
                    debug!(%request_id, err_msg = %failure.err_msg, "host failure after completion ignored");
                    return;
                }
                watch.release();
                let err = classify_failure(&failure.err_msg, config);
                debug!(%request_id, err_msg = %failure.err_msg, code = ?err.code, "host reported failure");
                completion.complete(Err(err.into()));
            })
        };

        let task = self
            .host
            .request(HostInvocation::new(request, success, fail));
        slot.install(task);

        // Attached after dispatch so an already-cancelled token aborts the
        // task just started.
        if let Some(token) = &config.cancel_token {
            let completion = Arc::downgrade(&completion);
            let key = token.subscribe(move |reason| {
                let completion = completion.upgrade();
                let Some(task) = slot.claim() else {
                    return;
                };
                debug!(%request_id, %reason, "aborting host task");
                task.abort();
                if let Some(completion) = completion {
                    completion.complete(Err(AdapterError::Cancelled(reason)));
                }
            });
            watch.register(token.clone(), key);
        }
    }

    /// Issue the request now and return a future of its outcome.
    ///
    /// If the host drops both callbacks unused, the future resolves with the
    /// `"Network Error"` rejection.
    pub fn dispatch(&self, config: RequestConfig) -> impl Future<Output = Outcome> + Send + 'static {
        let fallback = config.clone();
        let (tx, rx) = oneshot::channel();
        self.dispatch_with(config, move |outcome| {
            let _ = tx.send(outcome);
        });
        async move {
            match rx.await {
                Ok(outcome) => outcome,
                Err(oneshot::Canceled) => {
                    tracing::warn!(url = %fallback.url, "host dropped its callbacks without completing");
                    Err(create_error("Network Error", fallback, None, NoRequest).into())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::{Cancel, CancelToken};
    use crate::error::ErrorCode;
    use crate::host::HostCallbacks;
    use crate::http::{FormData, Headers, ResponseData, ResponseType};
    use futures::executor::block_on;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct FakeHost {
        calls: Mutex<Vec<HostInvocation>>,
        aborts: Arc<AtomicUsize>,
    }

    struct FakeTask {
        aborts: Arc<AtomicUsize>,
    }

    impl RequestTask for FakeTask {
        fn abort(&self) {
            self.aborts.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl RequestHost for FakeHost {
        type Task = FakeTask;

        fn request(&self, invocation: HostInvocation) -> FakeTask {
            self.calls.lock().unwrap().push(invocation);
            FakeTask {
                aborts: Arc::clone(&self.aborts),
            }
        }
    }

    impl FakeHost {
        fn take(&self) -> (HostRequest, HostCallbacks) {
            self.calls
                .lock()
                .unwrap()
                .pop()
                .expect("host was not called")
                .split()
        }

        fn aborts(&self) -> usize {
            self.aborts.load(Ordering::SeqCst)
        }
    }

    /// Answers inside `request`, before the task is handed back.
    struct ImmediateHost {
        aborts: Arc<AtomicUsize>,
    }

    impl RequestHost for ImmediateHost {
        type Task = FakeTask;

        fn request(&self, invocation: HostInvocation) -> FakeTask {
            let (_, callbacks) = invocation.split();
            callbacks.succeed(success(200));
            FakeTask {
                aborts: Arc::clone(&self.aborts),
            }
        }
    }

    /// Drops the callbacks without calling either.
    struct ForgetfulHost;

    impl RequestHost for ForgetfulHost {
        type Task = FakeTask;

        fn request(&self, _invocation: HostInvocation) -> FakeTask {
            FakeTask {
                aborts: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    fn adapter() -> MpAdapter<FakeHost> {
        MpAdapter::new(FakeHost::default())
    }

    fn success(status_code: u16) -> HostSuccess {
        HostSuccess {
            status_code,
            data: ResponseData::Json(serde_json::json!({"ok": true})),
            header: [("Content-Type", "application/json")].into_iter().collect(),
            err_msg: "request:ok".to_string(),
        }
    }

    #[test]
    fn method_is_uppercased_and_url_built() {
        let mut config = RequestConfig::new("pAtCh", "/items")
            .base_url("https://api.example.com/")
            .param("id", 7)
            .data("x");
        let request = adapter().prepare(&mut config);
        assert_eq!(request.method, "PATCH");
        assert_eq!(request.url, "https://api.example.com/items?id=7");
    }

    #[test]
    fn form_body_drops_content_type_in_any_casing() {
        let mut config = RequestConfig::post("/upload", FormData::new().text("a", "b"))
            .header("content-TYPE", "multipart/form-data");
        let request = adapter().prepare(&mut config);
        assert!(!request.header.contains(CONTENT_TYPE));
        assert!(request.data.as_ref().is_some_and(RequestBody::is_form));
    }

    #[test]
    fn basic_auth_overwrites_authorization() {
        let mut config = RequestConfig::get("/")
            .header("authorization", "Bearer old")
            .auth(Some("Aladdin"), Some("open sesame"));
        let request = adapter().prepare(&mut config);
        assert_eq!(
            request.header.get(AUTHORIZATION),
            Some("Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==")
        );
        assert_eq!(request.header.len(), 1);
    }

    #[test]
    fn empty_auth_encodes_a_lone_colon() {
        let mut config = RequestConfig::get("/").auth(None, None);
        let request = adapter().prepare(&mut config);
        assert_eq!(request.header.get(AUTHORIZATION), Some("Basic Og=="));
    }

    #[test]
    fn referer_is_always_removed() {
        let mut config = RequestConfig::post("/", "body")
            .header("REFERER", "https://a.example")
            .header("referer", "https://b.example")
            .header("X-Trace", "1");
        let request = adapter().prepare(&mut config);
        assert!(!request.header.contains(REFERER));
        assert_eq!(request.header.get("x-trace"), Some("1"));
    }

    #[test]
    fn content_type_follows_body_presence() {
        let mut without_body = RequestConfig::get("/").header("content-type", "application/json");
        assert!(!adapter().prepare(&mut without_body).header.contains(CONTENT_TYPE));

        let mut with_body = RequestConfig::post("/", "{}").header("Content-Type", "application/json");
        let request = adapter().prepare(&mut with_body);
        assert_eq!(request.header.get(CONTENT_TYPE), Some("application/json"));
    }

    #[test]
    fn headers_are_edited_in_place() {
        let mut config = RequestConfig::get("/").header("Referer", "x").header("Accept", "*/*");
        adapter().prepare(&mut config);
        assert_eq!(config.headers, Headers::from(vec![("Accept".to_string(), "*/*".to_string())]));
    }

    #[test]
    fn optional_fields_pass_through() {
        let mut config = RequestConfig::post("/", "payload").response_type(ResponseType::ArrayBuffer);
        let request = adapter().prepare(&mut config);
        assert_eq!(request.response_type, Some(ResponseType::ArrayBuffer));
        assert_eq!(request.data, Some(RequestBody::Text("payload".to_string())));

        let mut config = RequestConfig::get("/");
        let request = adapter().prepare(&mut config);
        assert_eq!(request.response_type, None);
        assert_eq!(request.data, None);
    }

    #[test]
    fn unsupported_options_are_reported_not_used() {
        let warnings = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&warnings);
        let adapter = adapter().with_diagnostics(move |d: &Diagnostic| seen.lock().unwrap().push(d.clone()));
        let config = RequestConfig::get("/")
            .timeout(3000)
            .on_download_progress(|_| panic!("download progress must never fire"))
            .on_upload_progress(|_| panic!("upload progress must never fire"));

        let pending = adapter.dispatch(config);
        let (_, callbacks) = adapter.host().take();
        callbacks.succeed(success(200));
        assert!(block_on(pending).is_ok());

        assert_eq!(
            *warnings.lock().unwrap(),
            vec![
                Diagnostic::UnsupportedTimeout { requested_ms: 3000 },
                Diagnostic::UnsupportedDownloadProgress,
                Diagnostic::UnsupportedUploadProgress,
            ]
        );
    }

    #[test]
    fn zero_timeout_is_silent() {
        let warnings = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&warnings);
        let adapter = adapter().with_diagnostics(move |d: &Diagnostic| seen.lock().unwrap().push(d.clone()));
        let mut config = RequestConfig::get("/").timeout(0);
        adapter.prepare(&mut config);
        assert!(warnings.lock().unwrap().is_empty());
    }

    #[traced_test]
    #[test]
    fn default_sink_logs_timeout_warning() {
        let mut config = RequestConfig::get("/").timeout(10);
        adapter().prepare(&mut config);
        assert!(logs_contain("will be ignored"));
    }

    #[test]
    fn success_200_resolves_with_ok() {
        let adapter = adapter();
        let pending = adapter.dispatch(RequestConfig::get("/").header("X-Seen", "1"));
        let (_, callbacks) = adapter.host().take();
        callbacks.succeed(success(200));

        let response = block_on(pending).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.status_text, "OK");
        assert_eq!(response.data.as_json().unwrap()["ok"], true);
        assert_eq!(response.headers.get("content-type"), Some("application/json"));
        assert_eq!(response.config.headers.get("x-seen"), Some("1"));
        assert_eq!(response.request, NoRequest);
    }

    #[test]
    fn success_400_settles_as_rejection() {
        let adapter = adapter();
        let pending = adapter.dispatch(RequestConfig::get("/"));
        let (_, callbacks) = adapter.host().take();
        callbacks.succeed(success(400));

        let err = block_on(pending).unwrap_err();
        let err = err.as_request_error().unwrap();
        assert_eq!(err.message, "Request failed with status code 400");
        let response = err.response.as_ref().unwrap();
        assert_eq!(response.status_text, "Bad Request");
    }

    #[test]
    fn other_status_codes_have_empty_status_text() {
        let adapter = adapter();
        let pending = adapter.dispatch(RequestConfig::get("/").accept_any_status());
        let (_, callbacks) = adapter.host().take();
        callbacks.succeed(success(500));

        let response = block_on(pending).unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(response.status_text, "");
    }

    fn fail_with(err_msg: &str) -> AdapterError {
        let adapter = adapter();
        let pending = adapter.dispatch(RequestConfig::get("/").timeout(1234));
        let (_, callbacks) = adapter.host().take();
        callbacks.fail(HostFailure::new(err_msg));
        block_on(pending).unwrap_err()
    }

    #[test]
    fn host_abort_message_rejects_as_aborted() {
        let err = fail_with("request:fail abort");
        assert_eq!(err.code(), Some(ErrorCode::ConnAborted));
        assert_eq!(err.to_string(), "Request aborted");
    }

    #[test]
    fn host_timeout_message_rejects_with_requested_value() {
        let err = fail_with("request:fail timeout");
        assert_eq!(err.code(), Some(ErrorCode::ConnAborted));
        assert_eq!(err.to_string(), "timeout of 1234ms exceeded");
    }

    #[test]
    fn other_host_failures_are_network_errors() {
        let err = fail_with("request:fail something else");
        assert_eq!(err.code(), None);
        assert_eq!(err.to_string(), "Network Error");
        assert_eq!(err.as_request_error().unwrap().request, NoRequest);
    }

    #[test]
    fn cancel_before_host_reply_aborts_once() {
        let adapter = adapter();
        let (token, canceler) = CancelToken::source();
        let pending = adapter.dispatch(RequestConfig::get("/").cancel_token(token));
        let (_, callbacks) = adapter.host().take();

        canceler.cancel(Some("user left".to_string()));
        assert_eq!(adapter.host().aborts(), 1);

        // The host reports its own abort afterwards; it must be ignored.
        callbacks.fail(HostFailure::new("request:fail abort"));
        match block_on(pending).unwrap_err() {
            AdapterError::Cancelled(reason) => {
                assert_eq!(reason, Cancel::new(Some("user left".to_string())))
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert_eq!(adapter.host().aborts(), 1);
    }

    #[test]
    fn cancel_after_host_reply_is_a_no_op() {
        let adapter = adapter();
        let (token, canceler) = CancelToken::source();
        let pending = adapter.dispatch(RequestConfig::get("/").cancel_token(token));
        let (_, callbacks) = adapter.host().take();
        callbacks.succeed(success(200));
        canceler.cancel(None);

        assert!(block_on(pending).is_ok());
        assert_eq!(adapter.host().aborts(), 0);
    }

    #[test]
    fn already_cancelled_token_aborts_right_after_dispatch() {
        let adapter = adapter();
        let (token, canceler) = CancelToken::source();
        canceler.cancel(Some("too late".to_string()));
        let pending = adapter.dispatch(RequestConfig::get("/").cancel_token(token));

        assert_eq!(adapter.host().aborts(), 1);
        assert!(block_on(pending).unwrap_err().is_cancel());
    }

    #[test]
    fn settled_requests_release_their_cancel_listener() {
        let adapter = adapter();
        let (token, canceler) = CancelToken::source();

        for i in 0..1000u32 {
            let pending = adapter.dispatch(RequestConfig::get("/").cancel_token(token.clone()));
            let (_, callbacks) = adapter.host().take();
            if i % 2 == 0 {
                callbacks.succeed(success(200));
            } else {
                callbacks.fail(HostFailure::new("request:fail"));
            }
            let _ = block_on(pending);
        }
        assert_eq!(token.listener_count(), 0);

        let in_flight = adapter.dispatch(RequestConfig::get("/").cancel_token(token.clone()));
        assert_eq!(token.listener_count(), 1);
        assert!(canceler.cancel(None));
        assert!(block_on(in_flight).unwrap_err().is_cancel());
        assert_eq!(adapter.host().aborts(), 1);
    }

    #[test]
    fn synchronous_host_reply_releases_cancel_listener() {
        let adapter = MpAdapter::new(ImmediateHost {
            aborts: Arc::new(AtomicUsize::new(0)),
        });
        let (token, _canceler) = CancelToken::source();
        for _ in 0..10 {
            block_on(adapter.dispatch(RequestConfig::get("/").cancel_token(token.clone()))).unwrap();
        }
        assert_eq!(token.listener_count(), 0);
    }

    #[test]
    fn synchronous_host_reply_leaves_nothing_to_abort() {
        let aborts = Arc::new(AtomicUsize::new(0));
        let adapter = MpAdapter::new(ImmediateHost {
            aborts: Arc::clone(&aborts),
        });
        let (token, canceler) = CancelToken::source();
        let pending = adapter.dispatch(RequestConfig::get("/").cancel_token(token));
        canceler.cancel(None);

        assert!(block_on(pending).is_ok());
        assert_eq!(aborts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn requested_timeout_never_fires_on_its_own() {
        let adapter = adapter();
        let mut pending = Box::pin(adapter.dispatch(RequestConfig::get("/").timeout(1)));
        std::thread::sleep(Duration::from_millis(20));
        assert!(pending.as_mut().now_or_never().is_none());

        let (_, callbacks) = adapter.host().take();
        callbacks.succeed(success(200));
        assert!(block_on(pending).is_ok());
    }

    #[test]
    fn dropped_callbacks_surface_as_network_error() {
        let adapter = MpAdapter::new(ForgetfulHost);
        let err = block_on(adapter.dispatch(RequestConfig::get("/"))).unwrap_err();
        assert_eq!(err.to_string(), "Network Error");
        assert_eq!(err.code(), None);
    }

    #[test]
    fn dispatch_with_reports_through_the_closure() {
        let adapter = adapter();
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outcomes);
        adapter.dispatch_with(RequestConfig::get("/"), move |outcome| {
            sink.lock().unwrap().push(outcome.map(|r| r.status));
        });
        assert!(outcomes.lock().unwrap().is_empty());

        let (_, callbacks) = adapter.host().take();
        callbacks.succeed(success(200));
        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(*outcomes[0].as_ref().unwrap(), 200);
    }
}
