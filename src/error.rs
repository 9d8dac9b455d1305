use std::fmt;

/// Error type for the refinement loop and its collaborators, with variants
/// designed around what the caller can do about them.
#[derive(Debug)]
pub enum RefineError {
    /// Bad input, bad configuration, or a request the remote side rejected.
    /// Don't retry, fix the call.
    Invalid(String),
    /// Transient failure (network, rate limit, server error). Retrying might help.
    Transient(String),
    /// Everything else. Inspect the message for details.
    Other(String),
}

impl From<ureq::Error> for RefineError {
    fn from(e: ureq::Error) -> Self {
        match e {
            // 429 is a rate limit, the rest of 4xx won't change on retry
            ureq::Error::StatusCode(code) if (400..500).contains(&code) && code != 429 => {
                RefineError::Invalid(format!("http status {code}"))
            }
            other => RefineError::Transient(other.to_string()),
        }
    }
}

impl From<std::io::Error> for RefineError {
    fn from(e: std::io::Error) -> Self {
        RefineError::Other(e.to_string())
    }
}

impl From<serde_json::Error> for RefineError {
    fn from(e: serde_json::Error) -> Self {
        RefineError::Other(format!("malformed json: {e}"))
    }
}

impl RefineError {
    /// Create an [`Invalid`](RefineError::Invalid) error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        RefineError::Invalid(msg.into())
    }

    /// Create an [`Other`](RefineError::Other) error.
    pub fn other(msg: impl Into<String>) -> Self {
        RefineError::Other(msg.into())
    }

    /// Create a [`Transient`](RefineError::Transient) error.
    pub fn transient(msg: impl Into<String>) -> Self {
        RefineError::Transient(msg.into())
    }

    /// Whether a caller-side retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, RefineError::Transient(_))
    }
}

impl fmt::Display for RefineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "invalid: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
            Self::Transient(msg) => write!(f, "transient: {msg}"),
        }
    }
}

impl std::error::Error for RefineError {}
