//! AWS error classification and handling
//!
//! Provides typed errors for AWS SDK operations using the `.code()` and
//! `.message()` metadata instead of string matching on Debug format.

use aws_sdk_ssm::error::ProvideErrorMetadata;
use thiserror::Error;

/// AWS error categories the lifecycle reacts to
#[derive(Debug, Error)]
pub enum AwsError {
    /// Resource was not found (a stack that does not exist yet)
    #[error("Resource not found: {message}")]
    NotFound { message: String },

    /// Stack update would not change anything
    #[error("No updates are to be performed")]
    NoChanges,

    /// Instance is not registered with the remote-execution channel yet
    #[error("Instance not ready for remote commands: {message}")]
    InstanceNotReady { message: String },

    /// Command invocation is not visible yet right after sending it
    #[error("Command invocation not available yet")]
    InvocationPending,

    /// Rate limit exceeded (retryable with backoff)
    #[error("Rate limit exceeded")]
    Throttled,

    /// Generic AWS SDK error with code and message
    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl AwsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AwsError::Throttled | AwsError::InstanceNotReady { .. } | AwsError::InvocationPending
        )
    }
}

/// Message CloudFormation returns for an update without changes
const NO_UPDATES_MESSAGE: &str = "No updates are to be performed";

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "TooManyRequestsException"];

/// Classify an AWS SDK error using the error code.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some("ValidationError") if message.starts_with(NO_UPDATES_MESSAGE) => AwsError::NoChanges,
        Some("ValidationError") if message.contains("does not exist") => {
            AwsError::NotFound { message }
        }
        Some("ResourceNotFoundException") => AwsError::NotFound { message },
        Some("InvalidInstanceId") => AwsError::InstanceNotReady { message },
        Some("InvocationDoesNotExist") => AwsError::InvocationPending,
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled,
        _ => AwsError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

/// Classify any SDK error that carries error metadata.
///
/// Every service's `SdkError<E, R>` implements [`ProvideErrorMetadata`], so
/// one function covers all operations.
pub fn classify_sdk_error<E: ProvideErrorMetadata>(error: &E) -> AwsError {
    classify_aws_error(error.code(), error.message())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_updates_is_its_own_category() {
        let err = classify_aws_error(
            Some("ValidationError"),
            Some("No updates are to be performed."),
        );
        assert!(matches!(err, AwsError::NoChanges));
    }

    #[test]
    fn test_missing_stack_is_not_found() {
        let err = classify_aws_error(
            Some("ValidationError"),
            Some("Stack with id rdscli-0abc-0def does not exist"),
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_other_validation_errors_stay_generic() {
        let err = classify_aws_error(
            Some("ValidationError"),
            Some("Template format error: unsupported structure."),
        );
        match err {
            AwsError::Sdk { code, message } => {
                assert_eq!(code.as_deref(), Some("ValidationError"));
                assert!(message.contains("Template format error"));
            }
            other => panic!("expected generic error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_instance_is_retryable() {
        let err = classify_aws_error(Some("InvalidInstanceId"), None);
        assert!(matches!(err, AwsError::InstanceNotReady { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_throttling_codes() {
        for code in THROTTLING_CODES {
            assert!(classify_aws_error(Some(code), Some("slow down")).is_retryable());
        }
        assert!(!classify_aws_error(None, None).is_retryable());
    }

    #[test]
    fn test_invocation_lookup_retries_on_pending_and_throttling() {
        assert!(classify_aws_error(Some("InvocationDoesNotExist"), None).is_retryable());
        assert!(classify_aws_error(Some("ThrottlingException"), Some("Rate exceeded")).is_retryable());
        assert!(!classify_aws_error(Some("AccessDeniedException"), Some("denied")).is_retryable());
        assert!(!classify_aws_error(Some("ResourceNotFoundException"), None).is_retryable());
    }
}
