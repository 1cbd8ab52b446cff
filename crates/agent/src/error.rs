//! Error types for catalog acquisition.
//!
//! Errors are categorized so the client can decide between falling back to
//! the cached catalog, giving up on this run, or aborting the process.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of agent errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Empty fact set, malformed compiler response, decode failure.
    Protocol,
    /// A remote operation exceeded its time bound.
    Timeout,
    /// Transport-level failure talking to the compiler.
    Network,
    /// The catalog could not be instantiated.
    Catalog,
    /// The persisted run state is unreadable.
    StateCorruption,
    /// Filesystem failure.
    Io,
    /// Invalid configuration.
    Config,
    /// Cannot continue at all.
    Fatal,
}

impl ErrorCategory {
    /// Whether the cached catalog may be used instead.
    #[must_use]
    pub fn allows_cache_fallback(&self) -> bool {
        matches!(
            self,
            Self::Protocol | Self::Timeout | Self::Network | Self::Catalog | Self::Io
        )
    }

    /// Whether the error must abort the process.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Protocol => "Invalid exchange with the compiler",
            Self::Timeout => "Operation timed out",
            Self::Network => "Network connectivity issue",
            Self::Catalog => "Catalog could not be instantiated",
            Self::StateCorruption => "Corrupt state file",
            Self::Io => "Filesystem error",
            Self::Config => "Invalid configuration",
            Self::Fatal => "Unrecoverable error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Protocol => "Check the compiler logs for this node",
            Self::Timeout => "Raise config_timeout or check the compiler's load",
            Self::Network => "Check connectivity to the configured server",
            Self::Catalog => "Check the catalog for unknown types or attributes",
            Self::StateCorruption => "The state file will be recreated on the next run",
            Self::Io => "Check directory permissions",
            Self::Config => "Check steward.toml",
            Self::Fatal => "Remove the offending file by hand and run again",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while acquiring or caching a catalog.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Fact gathering produced nothing.
    #[error("could not retrieve any facts")]
    NoFacts,

    /// The compiler exchange was malformed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A remote operation exceeded its bound.
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        /// What was being attempted.
        operation: String,
        /// Configured bound.
        seconds: u64,
    },

    /// HTTP request failed.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// The catalog document could not be decoded.
    #[error("catalog could not be decoded: {0}")]
    Decode(String),

    /// The catalog could not be instantiated or applied.
    #[error(transparent)]
    Catalog(#[from] declarative::Error),

    /// IO error during file operations.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The state file could not be parsed.
    #[error("corrupt state file {path}: {message}")]
    StateCorruption {
        /// State file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A corrupt state file could not be removed.
    #[error("cannot remove {path}: {source}")]
    StateUnrecoverable {
        /// State file.
        path: PathBuf,
        /// Why removal failed.
        #[source]
        source: io::Error,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Http {
            message: message.into(),
            status,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            seconds,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NoFacts | Error::Protocol(_) | Error::Decode(_) => ErrorCategory::Protocol,
            Error::Timeout { .. } => ErrorCategory::Timeout,
            Error::Http { .. } => ErrorCategory::Network,
            Error::Catalog(_) => ErrorCategory::Catalog,
            Error::Io { .. } => ErrorCategory::Io,
            Error::StateCorruption { .. } => ErrorCategory::StateCorruption,
            Error::StateUnrecoverable { .. } => ErrorCategory::Fatal,
            Error::Config(_) => ErrorCategory::Config,
        }
    }

    /// Whether the cached catalog may be used instead.
    #[must_use]
    pub fn allows_cache_fallback(&self) -> bool {
        self.category().allows_cache_fallback()
    }

    /// Whether the error must abort the process.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.category().is_fatal()
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            ureq::Error::Timeout(which) => Self::Timeout {
                operation: format!("compiler request ({which:?})"),
                seconds: 0,
            },
            other => Self::Http {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
