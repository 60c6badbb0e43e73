//! C-ABI wrapper around `mp-adapter-core`.
//!
//! # Overview
//! Lets a C host runtime plug its request primitive into the adapter. The
//! host supplies two function pointers (`request` and `abort`) plus an opaque
//! context; callers then dispatch descriptors and receive one normalized
//! `FfiResult` per request.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - The host completes a request by passing its `FfiHostCallbacks` handle to
//!   exactly one of `mp_host_succeed` / `mp_host_fail`. Either call consumes
//!   the handle, and late completions after a cancel are ignored.
//! - The C caller owns every returned pointer and releases it with the
//!   matching `mp_*_free` function.

pub mod types;

use std::ffi::c_void;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use mp_adapter::{HostFailure, HostSuccess, MpAdapter, RequestBody, RequestConfig, ResponseType};

use types::*;

// ---------------------------------------------------------------------------
// Adapter lifecycle
// ---------------------------------------------------------------------------

/// Create an adapter bound to `host`.
///
/// Returns null if either host function pointer is null or if an internal
/// panic occurs. Free the result with `mp_adapter_free`.
#[unsafe(no_mangle)]
pub extern "C" fn mp_adapter_new(host: FfiHost) -> *mut FfiAdapter {
    catch_unwind(|| match CHost::from_ffi(host) {
        Some(host) => Box::into_raw(Box::new(FfiAdapter {
            inner: MpAdapter::new(host),
        })),
        None => std::ptr::null_mut(),
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free an adapter created by `mp_adapter_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn mp_adapter_free(adapter: *mut FfiAdapter) {
    if !adapter.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(adapter) });
        });
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

struct UserData(*mut c_void);

// SAFETY: the pointer is handed back to the caller's own callback untouched.
unsafe impl Send for UserData {}

impl UserData {
    fn get(&self) -> *mut c_void {
        self.0
    }
}

/// # Safety
/// Every non-null pointer in `config` must be valid for reads.
unsafe fn config_from_ffi(config: &FfiRequestConfig) -> Option<RequestConfig> {
    let url = unsafe { from_c_string(config.url) }?;
    let method = unsafe { from_c_string(config.method) }.unwrap_or_else(|| "get".to_string());
    let mut out = RequestConfig::new(method, url);
    out.base_url = unsafe { from_c_string(config.base_url) };
    out.headers = unsafe { headers_from_ffi(config.headers, config.headers_len) };
    out.data = unsafe { from_c_string(config.body) }.map(RequestBody::Text);
    if config.use_auth {
        let username = unsafe { from_c_string(config.auth_username) };
        let password = unsafe { from_c_string(config.auth_password) };
        out = out.auth(username.as_deref(), password.as_deref());
    }
    if let Some(response_type) = unsafe { from_c_string(config.response_type) } {
        out.response_type = serde_json::from_value::<ResponseType>(serde_json::Value::String(response_type)).ok();
    }
    if config.timeout_ms > 0 {
        out = out.timeout(config.timeout_ms);
    }
    if !config.cancel.is_null() {
        let source = unsafe { &*config.cancel };
        out = out.cancel_token(source.token.clone());
    }
    Some(out)
}

/// Dispatch `config` through the adapter's host.
///
/// `on_complete` is called exactly once with the outcome, possibly before
/// this function returns. Returns `NullArg` without calling `on_complete` if
/// `adapter`, `config`, `config->url` or `on_complete` is null.
#[unsafe(no_mangle)]
pub extern "C" fn mp_adapter_dispatch(
    adapter: *const FfiAdapter,
    config: *const FfiRequestConfig,
    on_complete: Option<FfiCompleteFn>,
    user_data: *mut c_void,
) -> FfiErrorKind {
    catch_unwind(AssertUnwindSafe(|| {
        if adapter.is_null() || config.is_null() {
            return FfiErrorKind::NullArg;
        }
        let Some(on_complete) = on_complete else {
            return FfiErrorKind::NullArg;
        };
        let Some(config) = (unsafe { config_from_ffi(&*config) }) else {
            return FfiErrorKind::NullArg;
        };
        let adapter = unsafe { &*adapter };
        let user_data = UserData(user_data);
        adapter.inner.dispatch_with(config, move |outcome| {
            on_complete(user_data.get(), FfiResult::from_outcome(outcome));
        });
        FfiErrorKind::Ok
    }))
    .unwrap_or(FfiErrorKind::Panic)
}

// ---------------------------------------------------------------------------
// Host completion
// ---------------------------------------------------------------------------

/// Report a host success. Consumes `callbacks` and returns true, or returns
/// false without consuming anything if either pointer is null.
#[unsafe(no_mangle)]
pub extern "C" fn mp_host_succeed(callbacks: *mut FfiHostCallbacks, response: *const FfiHostResponse) -> bool {
    if callbacks.is_null() || response.is_null() {
        return false;
    }
    catch_unwind(AssertUnwindSafe(|| {
        let callbacks = unsafe { Box::from_raw(callbacks) };
        let response = unsafe { &*response };
        let success = HostSuccess {
            status_code: response.status_code,
            data: unsafe { response_data_from_ffi(response.data, response.data_len) },
            header: unsafe { headers_from_ffi(response.headers, response.headers_len) },
            err_msg: unsafe { from_c_string(response.err_msg) }.unwrap_or_else(|| "request:ok".to_string()),
        };
        callbacks.inner.succeed(success);
        true
    }))
    .unwrap_or(false)
}

/// Report a host failure with its `errMsg` (null reads as empty). Consumes
/// `callbacks` and returns true, or returns false if `callbacks` is null.
#[unsafe(no_mangle)]
pub extern "C" fn mp_host_fail(callbacks: *mut FfiHostCallbacks, err_msg: *const c_char) -> bool {
    if callbacks.is_null() {
        return false;
    }
    catch_unwind(AssertUnwindSafe(|| {
        let callbacks = unsafe { Box::from_raw(callbacks) };
        let err_msg = unsafe { from_c_string(err_msg) }.unwrap_or_default();
        callbacks.inner.fail(HostFailure::new(err_msg));
        true
    }))
    .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Create a cancellation source. Free it with `mp_cancel_source_free`.
#[unsafe(no_mangle)]
pub extern "C" fn mp_cancel_source_new() -> *mut FfiCancelSource {
    catch_unwind(|| {
        let (token, canceler) = mp_adapter::CancelToken::source();
        Box::into_raw(Box::new(FfiCancelSource { token, canceler }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Cancel every request attached to `source`. `message` may be null.
/// Returns true only for the first effective cancel.
#[unsafe(no_mangle)]
pub extern "C" fn mp_cancel_source_cancel(source: *const FfiCancelSource, message: *const c_char) -> bool {
    if source.is_null() {
        return false;
    }
    catch_unwind(AssertUnwindSafe(|| {
        let source = unsafe { &*source };
        let message = unsafe { from_c_string(message) };
        source.canceler.cancel(message)
    }))
    .unwrap_or(false)
}

/// Free a cancellation source. Requests already dispatched keep their token.
#[unsafe(no_mangle)]
pub extern "C" fn mp_cancel_source_free(source: *mut FfiCancelSource) {
    if !source.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(source) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free a result delivered to `FfiCompleteFn`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn mp_free_result(result: *mut FfiResult) {
    if !result.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(result) });
        });
    }
}
