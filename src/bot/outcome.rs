//! Result taxonomy shared by every external lookup.

use std::time::Duration;

use thiserror::Error;

/// Tagged result of a call to a provider.
///
/// `NotFound` carries the query echo so the reply can quote what the user asked
/// for. Failures are kept apart from "no data" so they get different messages.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome<T> {
    Success(T),
    NotFound(String),
    ProviderError(ProviderError),
}

impl<T> LookupOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, LookupOutcome::Success(_))
    }
}

/// Why a provider call failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("timed out after {0}s")]
    Timeout(u64),
    #[error("malformed response: {0}")]
    Malformed(String),
    /// The speech backend could not find speech in the audio.
    #[error("speech could not be recognized")]
    Unrecognizable,
    #[error("speech recognition request failed: {0}")]
    Recognition(String),
    #[error("audio transcoding failed: {0}")]
    Transcode(String),
    #[error("attachment download failed: {0}")]
    Attachment(String),
}

impl ProviderError {
    /// Short machine-readable reason, used as a structured log field.
    pub fn reason(&self) -> &'static str {
        match self {
            ProviderError::Http(_) => "http",
            ProviderError::Status(_) => "status",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::Malformed(_) => "malformed",
            ProviderError::Unrecognizable => "unrecognizable",
            ProviderError::Recognition(_) => "request_failed",
            ProviderError::Transcode(_) => "transcode",
            ProviderError::Attachment(_) => "attachment",
        }
    }

    /// Map a transport-level reqwest failure, reporting timeouts with the bound
    /// that was exceeded.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(timeout.as_secs())
        } else {
            ProviderError::Http(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasons_distinguish_speech_failures() {
        assert_eq!(ProviderError::Unrecognizable.reason(), "unrecognizable");
        assert_eq!(ProviderError::Recognition("503".into()).reason(), "request_failed");
        assert_ne!(
            ProviderError::Unrecognizable.reason(),
            ProviderError::Transcode("x".into()).reason()
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ProviderError::Status(502).to_string(), "unexpected status 502");
        assert_eq!(ProviderError::Timeout(15).to_string(), "timed out after 15s");
    }
}
