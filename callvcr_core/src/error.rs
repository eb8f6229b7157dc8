//! # Error Module
//!
//! Every fallible operation in this crate returns [`Result`], whose error
//! side is a [`VcrError`]. Nothing is retried internally and nothing is
//! downgraded to a warning: the embedding application decides what to do.

use crate::track::Key;

/// Result type for record/playback operations.
pub type Result<T> = std::result::Result<T, VcrError>;

/// Errors produced while recording, replaying or persisting calls.
#[derive(Debug, thiserror::Error)]
pub enum VcrError {
    /// The track has no invocable target bound.
    #[error("track has no callable bound")]
    NotCallable,

    /// Arity or per-position type mismatch between the callable and the
    /// bound arguments or output sinks.
    #[error("signature mismatch: {0}")]
    SignatureMismatch(String),

    /// A second recording attempt on a track that already captured output.
    #[error("track is already recorded, rewriting is prohibited")]
    AlreadyRecorded,

    /// A previous `record` entered the callable and then failed. The call
    /// already happened, so it is never run a second time.
    #[error("track's callable already ran in a failed recording")]
    Spent,

    /// A produced output has no faithful persisted form (a non-finite
    /// float, an integer outside the JSON range, a non-string map key).
    #[error("output can't be stored: {0}")]
    OutputEncoding(String),

    /// Playback attempted on a track that was never recorded.
    #[error("can't play back a track that wasn't recorded")]
    NotRecorded,

    /// A track handed to a cassette without being recorded first.
    #[error("only recorded tracks can be stored in a cassette")]
    NotRecordedYet,

    /// A replaying cassette has no (remaining) recording for the key.
    ///
    /// The fixture is stale relative to the calling code and should be
    /// re-recorded.
    #[error("no recording left to play back for key `{0}`")]
    PlaybackMiss(Key),

    /// No cassette is installed for the current thread.
    #[error("no active cassette on this thread")]
    NoActiveCassette,

    /// Persisted state that can't be turned back into a cassette.
    #[error("invalid fixture: {0}")]
    InvalidFixture(String),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML encoding or decoding failed.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error while reading or writing a fixture.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl VcrError {
    pub(crate) fn mismatch(detail: impl Into<String>) -> Self {
        VcrError::SignatureMismatch(detail.into())
    }

    /// True for the error kinds that mean "re-record the fixture".
    pub fn is_stale_fixture(&self) -> bool {
        matches!(self, VcrError::PlaybackMiss(_) | VcrError::InvalidFixture(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_key() {
        let err = VcrError::PlaybackMiss(Key::from("fn()[]"));
        assert_eq!(
            err.to_string(),
            "no recording left to play back for key `fn()[]`"
        );
        assert!(err.is_stale_fixture());
        assert!(!VcrError::NotRecorded.is_stale_fixture());
    }

    #[test]
    fn test_output_encoding_message() {
        let err = VcrError::OutputEncoding("result 0 is NaN".to_string());
        assert_eq!(err.to_string(), "output can't be stored: result 0 is NaN");
        assert!(!err.is_stale_fixture());
    }

    #[test]
    fn test_from_serde_json() {
        let parse_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: VcrError = parse_err.into();
        assert!(matches!(err, VcrError::Serialization(_)));
    }
}
