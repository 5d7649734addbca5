//! Error types shared across readscope.
//!
//! `ProviderError` lives here rather than in `readscope-providers` so the
//! assessment engine can downcast narrative failures and skip the retry for
//! permanent ones without string matching.

use thiserror::Error;

/// Errors that can occur when talking to a narrative provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// Hard failures of the assessment flow.
///
/// Everything else (scarce questions, missing answers, malformed responses,
/// narrative outages) degrades the result instead of producing one of these.
#[derive(Debug, Error)]
pub enum AssessmentError {
    /// Every repository query for a composition failed.
    #[error("question repository unavailable: {0}")]
    RepositoryUnavailable(String),

    /// The test structure asked for no questions at all.
    #[error("test structure is empty")]
    EmptyStructure,

    /// A code store is configured but the test-taker supplied no code.
    #[error("an access code is required")]
    AccessCodeRequired,

    /// The supplied access code does not exist.
    #[error("unknown access code: {0}")]
    UnknownAccessCode(String),

    /// The supplied access code has already been redeemed.
    #[error("access code already used: {0}")]
    AccessCodeUsed(String),

    /// No unused code could be reserved within the attempt budget.
    #[error("could not reserve a unique access code after {0} attempts")]
    CodeSpaceExhausted(u32),

    /// The access-code store itself failed.
    #[error("access code store error: {0}")]
    CodeStore(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_provider_errors() {
        assert!(ProviderError::AuthenticationFailed("bad key".into()).is_permanent());
        assert!(ProviderError::ModelNotFound("x".into()).is_permanent());
        assert!(!ProviderError::Timeout(30).is_permanent());
        assert!(!ProviderError::RateLimited {
            retry_after_ms: 100
        }
        .is_permanent());
    }

    #[test]
    fn retry_after_only_for_rate_limits() {
        let err = ProviderError::RateLimited {
            retry_after_ms: 5000,
        };
        assert_eq!(err.retry_after_ms(), Some(5000));
        assert_eq!(ProviderError::NetworkError("x".into()).retry_after_ms(), None);
    }
}
