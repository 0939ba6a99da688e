//! Error types for conformance runs

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Synchronization timeout for {case_id}: no output after {} ms", .elapsed.as_millis())]
    SynchronizationTimeout { case_id: String, elapsed: Duration },

    #[error("Assertion failed for {case_id}: {reason}")]
    AssertionMismatch { case_id: String, reason: String },

    #[error("Invalid corpus: {0}")]
    InvalidCorpus(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Browser bridge unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("Browser bridge error: {0}")]
    Bridge(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl HarnessError {
    /// Infrastructure failures that make every remaining case meaningless.
    ///
    /// Synchronization timeouts and assertion mismatches belong to a single
    /// case; everything else means the page or the browser is unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            HarnessError::SynchronizationTimeout { .. } | HarnessError::AssertionMismatch { .. }
        )
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_case_errors_are_not_fatal() {
        let timeout = HarnessError::SynchronizationTimeout {
            case_id: "Pos_Fun_001".into(),
            elapsed: Duration::from_secs(10),
        };
        let mismatch = HarnessError::AssertionMismatch {
            case_id: "Pos_Fun_001".into(),
            reason: "differs".into(),
        };
        assert!(!timeout.is_fatal());
        assert!(!mismatch.is_fatal());
    }

    #[test]
    fn test_infrastructure_errors_are_fatal() {
        assert!(HarnessError::Navigation("unreachable".into()).is_fatal());
        assert!(HarnessError::ElementNotFound("input".into()).is_fatal());
        assert!(HarnessError::Bridge("closed".into()).is_fatal());
    }

    #[test]
    fn test_timeout_message_reports_millis() {
        let err = HarnessError::SynchronizationTimeout {
            case_id: "Neg_Fun_004".into(),
            elapsed: Duration::from_millis(10_050),
        };
        assert_eq!(
            err.to_string(),
            "Synchronization timeout for Neg_Fun_004: no output after 10050 ms"
        );
    }
}
