//! Canonical response shape.

use crate::config::RequestConfig;
use crate::http::{Headers, ResponseData};

/// Stands in for the host-level request object, which callers never see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoRequest;

#[derive(Debug, Clone)]
pub struct Response {
    pub data: ResponseData,
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub config: RequestConfig,
    pub request: NoRequest,
}

/// Reason phrase for the host's status code. The host reports none, and
/// only these two are known.
pub fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_table() {
        assert_eq!(status_text(200), "OK");
        assert_eq!(status_text(400), "Bad Request");
        assert_eq!(status_text(500), "");
        assert_eq!(status_text(201), "");
    }
}
