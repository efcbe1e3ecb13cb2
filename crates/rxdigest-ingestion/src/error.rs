//! Error type shared by all source adapters.

use rxdigest_common::RxDigestError;
use thiserror::Error;

use crate::retry::Transient;

#[derive(Debug, Error)]
pub enum SourceError {
    /// Timeouts, dropped connections and the like. Retried.
    #[error("Transient network error: {0}")]
    Transient(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// The response arrived but could not be understood. Never retried.
    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Sandbox denied request: {0}")]
    Sandbox(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SourceError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, SourceError::Malformed(_))
    }
}

impl Transient for SourceError {
    fn is_transient(&self) -> bool {
        match self {
            SourceError::Transient(_) => true,
            // Rate limiting and server-side hiccups clear up on their own
            SourceError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return SourceError::Malformed(err.to_string());
        }
        if let Some(status) = err.status() {
            return SourceError::Http {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            };
        }
        if err.is_builder() {
            return SourceError::Config(err.to_string());
        }
        SourceError::Transient(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Malformed(format!("JSON: {}", err))
    }
}

impl From<quick_xml::Error> for SourceError {
    fn from(err: quick_xml::Error) -> Self {
        SourceError::Malformed(format!("XML: {}", err))
    }
}

impl From<RxDigestError> for SourceError {
    fn from(err: RxDigestError) -> Self {
        match err {
            RxDigestError::Sandbox(msg) => SourceError::Sandbox(msg),
            RxDigestError::Http(e) => e.into(),
            RxDigestError::Serialization(e) => e.into(),
            other => SourceError::Config(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let e = |status| SourceError::Http { status, url: String::new() };
        assert!(e(503).is_transient());
        assert!(e(429).is_transient());
        assert!(!e(404).is_transient());
        assert!(!e(400).is_transient());
    }

    #[test]
    fn test_malformed_is_never_transient() {
        let err: SourceError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert!(err.is_malformed());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_sandbox_error_maps_through() {
        let err: SourceError = RxDigestError::Sandbox("nope".into()).into();
        assert!(matches!(err, SourceError::Sandbox(_)));
        assert!(!err.is_transient());
    }
}
