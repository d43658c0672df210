//! Reasons a candidate gets discarded

use std::fmt;
use thiserror::Error;

/// Why a probe produced no result
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Proxy address rejected: {0}")]
    InvalidProxy(#[source] reqwest::Error),

    #[error("Request through proxy failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Oracle answered with HTTP status {0}")]
    Status(reqwest::StatusCode),

    #[error("Response is not a header list: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Header payload has {names} distinct names for {values} values")]
    Shape { names: usize, values: usize },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Probe panicked: {0}")]
    Panicked(String),
}

/// Closed set of discard categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeErrorKind {
    /// Proxy unreachable, slow, or not speaking HTTP
    Transport,
    /// Body is not a decodable header list
    Decode,
    /// Header list decoded but names and values don't line up
    Shape,
    /// Anything else; reported to the operator
    Unexpected,
}

impl ProbeError {
    pub fn kind(&self) -> ProbeErrorKind {
        match self {
            ProbeError::InvalidProxy(_)
            | ProbeError::Request(_)
            | ProbeError::Timeout
            | ProbeError::Status(_) => ProbeErrorKind::Transport,
            ProbeError::Decode(_) => ProbeErrorKind::Decode,
            ProbeError::Shape { .. } => ProbeErrorKind::Shape,
            ProbeError::Client(_) | ProbeError::Panicked(_) => ProbeErrorKind::Unexpected,
        }
    }
}

impl fmt::Display for ProbeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeErrorKind::Transport => write!(f, "transport"),
            ProbeErrorKind::Decode => write!(f, "decode"),
            ProbeErrorKind::Shape => write!(f, "shape"),
            ProbeErrorKind::Unexpected => write!(f, "unexpected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(ProbeError::Timeout.kind(), ProbeErrorKind::Transport);
        assert_eq!(
            ProbeError::Status(reqwest::StatusCode::BAD_GATEWAY).kind(),
            ProbeErrorKind::Transport
        );
        assert_eq!(
            ProbeError::Shape { names: 1, values: 2 }.kind(),
            ProbeErrorKind::Shape
        );
        assert_eq!(
            ProbeError::Panicked("boom".to_string()).kind(),
            ProbeErrorKind::Unexpected
        );

        let decode = serde_json::from_str::<Vec<(String, String)>>("nope").unwrap_err();
        assert_eq!(ProbeError::from(decode).kind(), ProbeErrorKind::Decode);
    }

    #[test]
    fn test_error_messages() {
        let err = ProbeError::Shape { names: 2, values: 3 };
        assert_eq!(err.to_string(), "Header payload has 2 distinct names for 3 values");
        assert_eq!(ProbeErrorKind::Unexpected.to_string(), "unexpected");
    }
}
