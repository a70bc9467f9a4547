//! Error taxonomy for the generation client.
//!
//! DESIGN
//! ======
//! Every failure that leaves the client is a [`GenerationError`]. Transport,
//! decode, and validation failures are classified at the point they occur, so
//! callers never see a raw `reqwest` or `serde_json` error. Retry decisions read
//! [`GenerationError::retryable`] and nothing else.

/// Stable machine-readable code plus retry hint for an error.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by generation requests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// The request broke an input contract. Never sent upstream.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The credential is missing or the upstream rejected it.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The upstream throttled the request.
    #[error("upstream rate limit: {0}")]
    RateLimit(String),

    /// An attempt exceeded its deadline.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The connection could not be established or was dropped.
    #[error("network error: {0}")]
    Network(String),

    /// The upstream reported a server-side failure.
    #[error("service unavailable: {0}")]
    Service(String),

    /// The completion could not be turned into the requested shape.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// Any other non-success status from the upstream.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// Fieldless view of [`GenerationError`] for matching and telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Auth,
    RateLimit,
    Timeout,
    Network,
    Service,
    Parse,
    Api(u16),
}

impl GenerationError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Auth(_) => ErrorKind::Auth,
            Self::RateLimit(_) => ErrorKind::RateLimit,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Network(_) => ErrorKind::Network,
            Self::Service(_) => ErrorKind::Service,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Api { status, .. } => ErrorKind::Api(*status),
        }
    }

    /// Whether another attempt could succeed.
    #[must_use]
    pub fn retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Auth(_) | Self::Parse(_) => false,
            Self::RateLimit(_) | Self::Timeout(_) | Self::Network(_) | Self::Service(_) => true,
            Self::Api { status, .. } => *status >= 500,
        }
    }
}

impl ErrorCode for GenerationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "E_VALIDATION",
            Self::Auth(_) => "E_AUTH",
            Self::RateLimit(_) => "E_RATE_LIMIT",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::Network(_) => "E_NETWORK",
            Self::Service(_) => "E_SERVICE",
            Self::Parse(_) => "E_PARSE",
            Self::Api { .. } => "E_API",
        }
    }

    fn retryable(&self) -> bool {
        GenerationError::retryable(self)
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
