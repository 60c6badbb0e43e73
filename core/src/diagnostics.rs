//! Warnings for options the host cannot honour.
//!
//! These are documented limitations, not errors: the adapter reports them
//! to a `DiagnosticSink` and carries on. `TracingSink` is the default; tests
//! and embedders can pass any `Fn(&Diagnostic)`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    UnsupportedTimeout { requested_ms: u64 },
    UnsupportedDownloadProgress,
    UnsupportedUploadProgress,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnsupportedTimeout { requested_ms } => write!(
                f,
                "the \"timeout\" option ({requested_ms}ms) is not supported by the mini-program host and will be ignored"
            ),
            Diagnostic::UnsupportedDownloadProgress => {
                write!(f, "the \"onDownloadProgress\" option is not supported by the mini-program host")
            }
            Diagnostic::UnsupportedUploadProgress => {
                write!(f, "the \"onUploadProgress\" option is not supported by the mini-program host")
            }
        }
    }
}

pub trait DiagnosticSink {
    fn warn(&self, diagnostic: &Diagnostic);
}

impl<F: Fn(&Diagnostic)> DiagnosticSink for F {
    fn warn(&self, diagnostic: &Diagnostic) {
        self(diagnostic)
    }
}

/// Forwards diagnostics to `tracing::warn!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn warn(&self, diagnostic: &Diagnostic) {
        tracing::warn!(diagnostic = ?diagnostic, "{diagnostic}");
    }
}
