//! Error codes shared by every error type in the crate.
//!
//! Each module owns its own `thiserror` enum; this trait gives them a common
//! grepable code and a retryable flag so callers (UIs, the CLI) can decide
//! whether to offer a retry prompt without matching on concrete variants.

/// Grepable error code and retryable flag for structured error reporting.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
