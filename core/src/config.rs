//! The request descriptor handed to the adapter.
//!
//! # Design
//! `RequestConfig` is the platform-agnostic description of one request as the
//! calling library builds it. Plain-data fields deserialize with serde so
//! descriptors can live in JSON fixtures; callable fields (serializer,
//! progress hooks, status validator) and the cancel token are code-only.
//! Callables are wrapped in `Arc` so the whole descriptor stays `Clone` and
//! can travel inside responses and errors.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};

use crate::cancel::CancelToken;
use crate::http::{Headers, RequestBody, ResponseType};

/// Query parameters, serialized by `url::build_url`.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Basic-auth credentials. A missing field counts as an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BasicAuth {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Progress report shape. The mini-program host never produces these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub loaded: u64,
    pub total: Option<u64>,
}

/// Custom query-string serializer.
#[derive(Clone)]
pub struct ParamsSerializer(Arc<dyn Fn(&Params) -> String + Send + Sync>);

impl ParamsSerializer {
    pub fn new(f: impl Fn(&Params) -> String + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn serialize(&self, params: &Params) -> String {
        (self.0)(params)
    }
}

#[derive(Clone)]
pub struct ProgressCallback(Arc<dyn Fn(ProgressEvent) + Send + Sync>);

impl ProgressCallback {
    pub fn new(f: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

/// Decides whether a status code settles as success.
#[derive(Clone)]
pub struct StatusValidator(Arc<dyn Fn(u16) -> bool + Send + Sync>);

impl StatusValidator {
    pub fn new(f: impl Fn(u16) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn accepts(&self, status: u16) -> bool {
        (self.0)(status)
    }
}

impl Default for StatusValidator {
    fn default() -> Self {
        Self::new(|status| (200..300).contains(&status))
    }
}

macro_rules! opaque_debug {
    ($($name:ident),*) => {
        $(impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "(..)"))
            }
        })*
    };
}

opaque_debug!(ParamsSerializer, ProgressCallback, StatusValidator);

/// One request as described by the calling library.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestConfig {
    /// Any casing; the adapter uppercases it.
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default, rename = "baseURL")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub params: Option<Params>,
    #[serde(skip)]
    pub params_serializer: Option<ParamsSerializer>,
    /// An explicit JSON `null` is a body (`Json(Null)`); only an absent
    /// field means "no body".
    #[serde(default, deserialize_with = "present_body")]
    pub data: Option<RequestBody>,
    /// Mutated in place by the adapter before dispatch.
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub auth: Option<BasicAuth>,
    #[serde(default)]
    pub response_type: Option<ResponseType>,
    /// Milliseconds. Never enforced; a non-zero value only produces a warning.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(skip)]
    pub on_download_progress: Option<ProgressCallback>,
    #[serde(skip)]
    pub on_upload_progress: Option<ProgressCallback>,
    #[serde(skip)]
    pub cancel_token: Option<CancelToken>,
    /// `None` falls back to accepting `200..=299`.
    #[serde(skip)]
    pub validate_status: Option<StatusValidator>,
}

fn present_body<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<RequestBody>, D::Error> {
    RequestBody::deserialize(deserializer).map(Some)
}

fn default_method() -> String {
    "get".to_string()
}

impl RequestConfig {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            base_url: None,
            params: None,
            params_serializer: None,
            data: None,
            headers: Headers::new(),
            auth: None,
            response_type: None,
            timeout: None,
            on_download_progress: None,
            on_upload_progress: None,
            cancel_token: None,
            validate_status: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("get", url)
    }

    pub fn post(url: impl Into<String>, data: impl Into<RequestBody>) -> Self {
        Self::new("post", url).data(data)
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params
            .get_or_insert_with(Params::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn params_serializer(mut self, f: impl Fn(&Params) -> String + Send + Sync + 'static) -> Self {
        self.params_serializer = Some(ParamsSerializer::new(f));
        self
    }

    pub fn data(mut self, data: impl Into<RequestBody>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn auth(mut self, username: Option<&str>, password: Option<&str>) -> Self {
        self.auth = Some(BasicAuth {
            username: username.map(str::to_string),
            password: password.map(str::to_string),
        });
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    pub fn timeout(mut self, millis: u64) -> Self {
        self.timeout = Some(millis);
        self
    }

    pub fn on_download_progress(mut self, f: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        self.on_download_progress = Some(ProgressCallback::new(f));
        self
    }

    pub fn on_upload_progress(mut self, f: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        self.on_upload_progress = Some(ProgressCallback::new(f));
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn validate_status(mut self, f: impl Fn(u16) -> bool + Send + Sync + 'static) -> Self {
        self.validate_status = Some(StatusValidator::new(f));
        self
    }

    /// Settle every status as success.
    pub fn accept_any_status(self) -> Self {
        self.validate_status(|_| true)
    }

    /// Requested timeout in milliseconds, zero when unset.
    pub fn timeout_ms(&self) -> u64 {
        self.timeout.unwrap_or(0)
    }
}
