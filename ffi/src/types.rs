//! `#[repr(C)]` types for the FFI boundary, and the bridge that lets a C
//! host runtime act as the adapter's `RequestHost`.
//!
//! # Design
//! Each type mirrors a core type with C-compatible fields: `*mut c_char`
//! instead of `String`, pointer + length instead of `Vec`, and tagged enums
//! with explicit discriminants. Values the library allocates carry an owning
//! free function; values the C side passes in are only borrowed.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;

use mp_adapter::{
    AdapterError, CancelToken, Canceler, FailureKind, Headers, HostCallbacks, HostInvocation, HostRequest,
    MpAdapter, Outcome, RequestBody, RequestHost, RequestTask, Response, ResponseData,
};

// ---------------------------------------------------------------------------
// Host vtable
// ---------------------------------------------------------------------------

/// Issue `request` and return a task id. The request is only valid for the
/// duration of the call. `callbacks` must later be passed to exactly one of
/// `mp_host_succeed` / `mp_host_fail`.
pub type FfiRequestFn =
    extern "C" fn(ctx: *mut c_void, request: *const FfiHostRequest, callbacks: *mut FfiHostCallbacks) -> u64;

/// Abort the task with `task_id`.
pub type FfiAbortFn = extern "C" fn(ctx: *mut c_void, task_id: u64);

/// Called once per dispatch with the outcome. The callee owns `result` and
/// must release it with `mp_free_result`.
pub type FfiCompleteFn = extern "C" fn(user_data: *mut c_void, result: *mut FfiResult);

/// The host request primitive as supplied by C.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FfiHost {
    pub ctx: *mut c_void,
    pub request: Option<FfiRequestFn>,
    pub abort: Option<FfiAbortFn>,
}

/// Opaque handle to an adapter bound to one C host.
pub struct FfiAdapter {
    pub(crate) inner: MpAdapter<CHost>,
}

/// Opaque handle to the pending callbacks of one host request.
pub struct FfiHostCallbacks {
    pub(crate) inner: HostCallbacks,
}

/// Opaque cancellation pair. Attach it to any number of requests.
pub struct FfiCancelSource {
    pub(crate) token: CancelToken,
    pub(crate) canceler: Canceler,
}

pub(crate) struct CHost {
    ctx: *mut c_void,
    request: FfiRequestFn,
    abort: FfiAbortFn,
}

impl CHost {
    pub(crate) fn from_ffi(host: FfiHost) -> Option<Self> {
        Some(Self {
            ctx: host.ctx,
            request: host.request?,
            abort: host.abort?,
        })
    }
}

pub(crate) struct CTask {
    ctx: *mut c_void,
    abort: FfiAbortFn,
    task_id: u64,
}

// SAFETY: the C host owns `ctx` and is responsible for calling back on
// whatever thread it accepts aborts on.
unsafe impl Send for CTask {}

impl RequestTask for CTask {
    fn abort(&self) {
        (self.abort)(self.ctx, self.task_id);
    }
}

impl RequestHost for CHost {
    type Task = CTask;

    fn request(&self, invocation: HostInvocation) -> CTask {
        let (request, callbacks) = invocation.split();
        let ffi_request = FfiHostRequest::from_core(request);
        let callbacks = Box::into_raw(Box::new(FfiHostCallbacks { inner: callbacks }));
        let task_id = (self.request)(self.ctx, &ffi_request, callbacks);
        tracing::trace!(task_id, "C host accepted request");
        CTask {
            ctx: self.ctx,
            abort: self.abort,
            task_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Strings and headers
// ---------------------------------------------------------------------------

/// A header owned by this library.
#[repr(C)]
pub struct FfiHeader {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

/// A header borrowed from the C caller.
#[repr(C)]
pub struct FfiHeaderRef {
    pub key: *const c_char,
    pub value: *const c_char,
}

pub(crate) fn to_c_string(s: &str) -> *mut c_char {
    CString::new(s.replace('\0', ""))
        .unwrap_or_default()
        .into_raw()
}

/// # Safety
/// `ptr` must be null or a valid NUL-terminated string.
pub(crate) unsafe fn from_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

/// # Safety
/// `ptr` must be null or point to `len` valid `FfiHeaderRef`s.
pub(crate) unsafe fn headers_from_ffi(ptr: *const FfiHeaderRef, len: u32) -> Headers {
    if ptr.is_null() || len == 0 {
        return Headers::new();
    }
    let refs = unsafe { std::slice::from_raw_parts(ptr, len as usize) };
    refs.iter()
        .filter_map(|h| {
            let key = unsafe { from_c_string(h.key) }?;
            let value = unsafe { from_c_string(h.value) }.unwrap_or_default();
            Some((key, value))
        })
        .collect()
}

fn headers_to_ffi(headers: Headers) -> (*mut FfiHeader, u32) {
    if headers.is_empty() {
        return (std::ptr::null_mut(), 0);
    }
    let owned: Box<[FfiHeader]> = headers
        .iter()
        .map(|(key, value)| FfiHeader {
            key: to_c_string(key),
            value: to_c_string(value),
        })
        .collect();
    let len = owned.len() as u32;
    (Box::into_raw(owned) as *mut FfiHeader, len)
}

/// # Safety
/// `ptr` / `len` must come from `headers_to_ffi`.
pub(crate) unsafe fn free_headers(ptr: *mut FfiHeader, len: u32) {
    if ptr.is_null() || len == 0 {
        return;
    }
    let headers = unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len as usize)) };
    for h in headers.iter() {
        if !h.key.is_null() {
            drop(unsafe { CString::from_raw(h.key) });
        }
        if !h.value.is_null() {
            drop(unsafe { CString::from_raw(h.value) });
        }
    }
}

fn bytes_to_ffi(bytes: Vec<u8>) -> (*mut u8, usize) {
    if bytes.is_empty() {
        return (std::ptr::null_mut(), 0);
    }
    let len = bytes.len();
    (Box::into_raw(bytes.into_boxed_slice()) as *mut u8, len)
}

/// # Safety
/// `ptr` / `len` must come from `bytes_to_ffi`.
unsafe fn free_bytes(ptr: *mut u8, len: usize) {
    if !ptr.is_null() && len > 0 {
        drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len)) });
    }
}

fn free_c_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// The invocation handed to the C host. Borrowed for the duration of
/// `FfiRequestFn` only; copy anything needed later.
#[repr(C)]
pub struct FfiHostRequest {
    pub method: *mut c_char,
    pub url: *mut c_char,
    pub headers: *mut FfiHeader,
    pub headers_len: u32,
    pub has_body: bool,
    pub body: *mut u8,
    pub body_len: usize,
    /// Null when no hint was given.
    pub response_type: *mut c_char,
}

impl FfiHostRequest {
    pub(crate) fn from_core(request: HostRequest) -> Self {
        let (headers, headers_len) = headers_to_ffi(request.header);
        let has_body = request.data.is_some();
        let (body, body_len) = bytes_to_ffi(request.data.map(body_bytes).unwrap_or_default());
        FfiHostRequest {
            method: to_c_string(&request.method),
            url: to_c_string(&request.url),
            headers,
            headers_len,
            has_body,
            body,
            body_len,
            response_type: request
                .response_type
                .map_or(std::ptr::null_mut(), |rt| to_c_string(rt.as_str())),
        }
    }
}

impl Drop for FfiHostRequest {
    fn drop(&mut self) {
        free_c_string(self.method);
        free_c_string(self.url);
        free_c_string(self.response_type);
        unsafe {
            free_headers(self.headers, self.headers_len);
            free_bytes(self.body, self.body_len);
        }
    }
}

/// Bodies built from C are always text; forms cannot cross this boundary.
fn body_bytes(body: RequestBody) -> Vec<u8> {
    match body {
        RequestBody::Text(text) => text.into_bytes(),
        RequestBody::Json(value) => value.to_string().into_bytes(),
        RequestBody::Bytes(bytes) => bytes,
        RequestBody::Form(_) => Vec::new(),
    }
}

/// A request descriptor supplied by the C caller. Every pointer may be null
/// except `url`.
#[repr(C)]
pub struct FfiRequestConfig {
    /// Defaults to `"get"` when null.
    pub method: *const c_char,
    pub url: *const c_char,
    pub base_url: *const c_char,
    pub headers: *const FfiHeaderRef,
    pub headers_len: u32,
    pub body: *const c_char,
    pub use_auth: bool,
    pub auth_username: *const c_char,
    pub auth_password: *const c_char,
    /// `"json"`, `"text"` or `"arraybuffer"`; anything else is ignored.
    pub response_type: *const c_char,
    pub timeout_ms: u64,
    pub cancel: *const FfiCancelSource,
}

/// Response the C host delivers through `mp_host_succeed`.
#[repr(C)]
pub struct FfiHostResponse {
    pub status_code: u16,
    pub data: *const u8,
    pub data_len: usize,
    pub headers: *const FfiHeaderRef,
    pub headers_len: u32,
    pub err_msg: *const c_char,
}

/// # Safety
/// `data` must be null or point to `len` readable bytes.
pub(crate) unsafe fn response_data_from_ffi(data: *const u8, len: usize) -> ResponseData {
    if data.is_null() || len == 0 {
        return ResponseData::default();
    }
    let bytes = unsafe { std::slice::from_raw_parts(data, len) }.to_vec();
    match String::from_utf8(bytes) {
        Ok(text) => ResponseData::Text(text),
        Err(err) => ResponseData::Bytes(err.into_bytes()),
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome categories reported to C.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorKind {
    Ok = 0,
    /// Host aborted the request (`ECONNABORTED`).
    Aborted = 1,
    /// Host reported a timeout (`ECONNABORTED`).
    TimedOut = 2,
    Network = 3,
    /// The response status failed settlement; response fields are set.
    Status = 4,
    /// The caller cancelled; `message` holds the cancel message, if any.
    Cancelled = 5,
    NullArg = 6,
    Panic = 7,
}

/// Result envelope delivered to `FfiCompleteFn`.
///
/// On success `error_kind` is `Ok` and the response fields are set. On
/// failure `message` is set, `error_code` is `"ECONNABORTED"` or null, and
/// the response fields are set only for `Status`.
#[repr(C)]
pub struct FfiResult {
    pub error_kind: FfiErrorKind,
    pub error_code: *mut c_char,
    pub message: *mut c_char,
    pub status: u16,
    pub status_text: *mut c_char,
    pub data: *mut u8,
    pub data_len: usize,
    pub headers: *mut FfiHeader,
    pub headers_len: u32,
}

impl FfiResult {
    fn empty(error_kind: FfiErrorKind) -> Self {
        FfiResult {
            error_kind,
            error_code: std::ptr::null_mut(),
            message: std::ptr::null_mut(),
            status: 0,
            status_text: std::ptr::null_mut(),
            data: std::ptr::null_mut(),
            data_len: 0,
            headers: std::ptr::null_mut(),
            headers_len: 0,
        }
    }

    fn with_response(mut self, response: Response) -> Self {
        let data = match response.data {
            ResponseData::Text(text) => text.into_bytes(),
            ResponseData::Json(value) => value.to_string().into_bytes(),
            ResponseData::Bytes(bytes) => bytes,
        };
        let (data, data_len) = bytes_to_ffi(data);
        let (headers, headers_len) = headers_to_ffi(response.headers);
        self.status = response.status;
        self.status_text = to_c_string(&response.status_text);
        self.data = data;
        self.data_len = data_len;
        self.headers = headers;
        self.headers_len = headers_len;
        self
    }

    pub(crate) fn from_outcome(outcome: Outcome) -> *mut Self {
        let result = match outcome {
            Ok(response) => FfiResult::empty(FfiErrorKind::Ok).with_response(response),
            Err(AdapterError::Cancelled(reason)) => {
                let mut result = FfiResult::empty(FfiErrorKind::Cancelled);
                if let Some(message) = reason.message {
                    result.message = to_c_string(&message);
                }
                result
            }
            Err(AdapterError::Request(err)) => {
                let kind = match (&err.response, err.failure) {
                    (Some(_), _) => FfiErrorKind::Status,
                    (None, Some(FailureKind::Aborted)) => FfiErrorKind::Aborted,
                    (None, Some(FailureKind::TimedOut)) => FfiErrorKind::TimedOut,
                    (None, Some(FailureKind::Network) | None) => FfiErrorKind::Network,
                };
                let mut result = FfiResult::empty(kind);
                result.message = to_c_string(&err.message);
                if let Some(code) = err.code {
                    result.error_code = to_c_string(code.as_str());
                }
                match err.response {
                    Some(response) => result.with_response(*response),
                    None => result,
                }
            }
        };
        Box::into_raw(Box::new(result))
    }
}

impl Drop for FfiResult {
    fn drop(&mut self) {
        free_c_string(self.error_code);
        free_c_string(self.message);
        free_c_string(self.status_text);
        unsafe {
            free_bytes(self.data, self.data_len);
            free_headers(self.headers, self.headers_len);
        }
    }
}
