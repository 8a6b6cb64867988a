use std::fmt;
use std::time::Duration;

/// Structured error type for Atlas admin API calls.
///
/// Wrapped by [`crate::Error::RemoteAdmin`], which adds the operation and
/// resource id. Kept separate so the retry loop can decide on transience
/// without string matching.
#[derive(Debug)]
pub enum RemoteAdminError {
    /// Request did not complete within the configured timeout.
    Timeout { url: String, timeout: Duration },

    /// The gateway was shut down while the request was in flight.
    Cancelled,

    /// The API answered with a non-success status.
    Status { status: u16, body: String },

    /// The request could not be sent or the response could not be read.
    Transport {
        url: String,
        source: reqwest::Error,
    },

    /// The digest challenge was missing or could not be answered.
    Auth(String),

    /// The configured API base cannot produce a request URL.
    InvalidUrl(String),

    /// The request body could not be encoded.
    Encode(serde_json::Error),
}

impl RemoteAdminError {
    /// Create a timeout error.
    pub fn timeout(url: impl Into<String>, timeout: Duration) -> Self {
        RemoteAdminError::Timeout {
            url: url.into(),
            timeout,
        }
    }

    /// Create a transport error.
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        RemoteAdminError::Transport {
            url: url.into(),
            source,
        }
    }

    /// HTTP status of the failed call, if the API answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteAdminError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the request may have been applied even though no answer came
    /// back.
    pub fn outcome_unknown(&self) -> bool {
        match self {
            RemoteAdminError::Timeout { .. } => true,
            RemoteAdminError::Transport { source, .. } => !source.is_connect(),
            _ => false,
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Client errors (4xx other than 429) are never transient: retrying a
    /// rejected payload or a conflict cannot change the outcome.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteAdminError::Timeout { .. } => true,
            RemoteAdminError::Transport { source, .. } => {
                source.is_connect() || source.is_timeout() || source.is_request()
            }
            RemoteAdminError::Status { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            RemoteAdminError::Cancelled
            | RemoteAdminError::Auth(_)
            | RemoteAdminError::InvalidUrl(_)
            | RemoteAdminError::Encode(_) => false,
        }
    }
}

impl fmt::Display for RemoteAdminError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteAdminError::Timeout { url, timeout } => {
                write!(f, "request to {} timed out after {:?}", url, timeout)
            }
            RemoteAdminError::Cancelled => write!(f, "request cancelled"),
            RemoteAdminError::Status { status, body } => {
                if body.is_empty() {
                    write!(f, "HTTP {}", status)
                } else {
                    write!(f, "HTTP {}: {}", status, body)
                }
            }
            RemoteAdminError::Transport { url, source } => {
                write!(f, "request to {} failed: {}", url, source)
            }
            RemoteAdminError::Auth(reason) => write!(f, "digest authentication failed: {}", reason),
            RemoteAdminError::InvalidUrl(reason) => write!(f, "invalid admin API URL {}", reason),
            RemoteAdminError::Encode(e) => write!(f, "could not encode request body: {}", e),
        }
    }
}

impl std::error::Error for RemoteAdminError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RemoteAdminError::Transport { source, .. } => Some(source),
            RemoteAdminError::Encode(e) => Some(e),
            _ => None,
        }
    }
}

/// Structured error type for database engine operations.
#[derive(Debug)]
pub enum EngineError {
    /// Operation did not complete within the configured timeout.
    Timeout(Duration),

    /// The gateway was shut down while the operation was in flight.
    Cancelled,

    /// The MongoDB driver reported an error.
    Driver(mongodb::error::Error),

    /// The engine is unreachable or refused the operation.
    Unavailable(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Timeout(timeout) => {
                write!(f, "timed out after {:?}", timeout)
            }
            EngineError::Cancelled => write!(f, "operation cancelled"),
            EngineError::Driver(e) => write!(f, "{}", e),
            EngineError::Unavailable(reason) => write!(f, "engine unavailable: {}", reason),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Driver(e) => Some(e),
            _ => None,
        }
    }
}

impl From<mongodb::error::Error> for EngineError {
    fn from(e: mongodb::error::Error) -> Self {
        EngineError::Driver(e)
    }
}
