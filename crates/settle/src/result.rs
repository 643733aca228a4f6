//! Result and error types for Settle.

use thiserror::Error;

/// Result type for Settle operations
pub type SettleResult<T> = Result<T, SettleError>;

/// Errors that can occur while observing a page
#[derive(Debug, Error)]
pub enum SettleError {
    /// The page handle is gone (closed tab, detached target, dropped channel)
    #[error("Page closed: {message}")]
    PageClosed {
        /// Error message
        message: String,
    },

    /// Script evaluation in the page context failed
    #[error("Evaluation failed: {message}")]
    Evaluation {
        /// Error message
        message: String,
    },

    /// Operation timed out
    #[error("Operation timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Element interaction error
    #[error("Interaction with '{selector}' failed: {message}")]
    Interaction {
        /// Target selector
        selector: String,
        /// Error message
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl SettleError {
    /// Create a page-closed error
    #[must_use]
    pub fn page_closed(message: impl Into<String>) -> Self {
        Self::PageClosed {
            message: message.into(),
        }
    }

    /// Create an evaluation error
    #[must_use]
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether no further interaction with the page is meaningful.
    ///
    /// Only a closed page is fatal; everything else is recovered by the
    /// waits in this crate.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::PageClosed { .. })
    }
}
