//! Unified error types for pagewalk

use thiserror::Error;

/// Unified Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for pagewalk
#[derive(Error, Debug)]
pub enum Error {
    /// The site rejected the supplied credentials
    #[error("Incorrect credentials: {0}")]
    IncorrectCredentials(String),

    /// The site is unavailable, or retries were exhausted
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// HTTP 404 or a missing resource
    #[error("Not found: {0}")]
    NotFound(String),

    /// HTTP 4xx other than 404
    #[error("{status} Client Error: {message}")]
    ClientRequest { status: u16, message: String },

    /// HTTP 5xx
    #[error("{status} Server Error: {message}")]
    Server { status: u16, message: String },

    /// No URL template accepts the given parameters
    #[error("Unable to resolve URL: {0}")]
    UrlNotResolvable(String),

    /// The URL is outside the browser's allowed prefixes
    #[error("URL not allowed: {0}")]
    UrlNotAllowed(String),

    /// The session is no longer authenticated
    #[error("Logged out: {0}")]
    LoggedOut(String),

    /// A replayed sequence disagreed with already delivered items
    #[error("Site replied inconsistently between retries: {0}")]
    InconsistentReplay(String),

    /// A replayed sequence ended before reaching the delivered items
    #[error("Site replied fewer elements ({replayed}) than last iteration ({expected})")]
    ShortReplay { replayed: usize, expected: usize },

    /// Timeout
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Transport-level failure of the injected HTTP client
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid URL template
    #[error("Invalid URL pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of [`Error`], used to declare transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    IncorrectCredentials,
    ServiceUnavailable,
    NotFound,
    ClientRequest,
    Server,
    UrlNotResolvable,
    UrlNotAllowed,
    LoggedOut,
    Inconsistency,
    Timeout,
    Transport,
    Io,
    Serialization,
    InvalidPattern,
    Configuration,
    Internal,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::IncorrectCredentials(_) => ErrorKind::IncorrectCredentials,
            Error::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::ClientRequest { .. } => ErrorKind::ClientRequest,
            Error::Server { .. } => ErrorKind::Server,
            Error::UrlNotResolvable(_) => ErrorKind::UrlNotResolvable,
            Error::UrlNotAllowed(_) => ErrorKind::UrlNotAllowed,
            Error::LoggedOut(_) => ErrorKind::LoggedOut,
            Error::InconsistentReplay(_) | Error::ShortReplay { .. } => ErrorKind::Inconsistency,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Io(_) => ErrorKind::Io,
            Error::Serialization(_) => ErrorKind::Serialization,
            Error::InvalidPattern(_) => ErrorKind::InvalidPattern,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Create a new incorrect credentials error
    pub fn incorrect_credentials<S: Into<String>>(msg: S) -> Self {
        Error::IncorrectCredentials(msg.into())
    }

    /// Create a new service unavailable error
    pub fn service_unavailable<S: Into<String>>(msg: S) -> Self {
        Error::ServiceUnavailable(msg.into())
    }

    /// The terminal error raised once a retry budget is spent
    pub fn retries_exhausted(attempts: u32) -> Self {
        Error::ServiceUnavailable(format!(
            "site did not reply successfully after {} attempts",
            attempts
        ))
    }

    /// Create a new not found error
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Error::NotFound(what.into())
    }

    /// Create a new URL resolution error
    pub fn url_not_resolvable<S: Into<String>>(msg: S) -> Self {
        Error::UrlNotResolvable(msg.into())
    }

    /// Create a new logged out error
    pub fn logged_out<S: Into<String>>(msg: S) -> Self {
        Error::LoggedOut(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Error::Timeout(msg.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Error::Transport(msg.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else {
            Error::Transport(err.to_string())
        }
    }
}
