//! Shared primitives used across Hopscotch crates.

use core::fmt;

/// Result alias used across the workspace.
pub type HopResult<T> = Result<T, HopError>;

/// Error carried through every layer of the navigation pipeline.
///
/// `code` is a stable dotted identifier (`net.http.status`,
/// `js.script_failed`, ...) that callers can match on; `message`
/// is free-form context for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopError {
    pub code: &'static str,
    pub message: String,
}

impl HopError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns true when the code sits under the given dotted prefix.
    pub fn is_in(&self, prefix: &str) -> bool {
        self.code == prefix
            || self
                .code
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

impl fmt::Display for HopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for HopError {}
