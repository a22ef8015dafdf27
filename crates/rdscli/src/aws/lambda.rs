//! Control function invocation

use crate::aws::context::AwsContext;
use anyhow::{Context, Result};
use aws_sdk_lambda::Client;
use aws_sdk_lambda::primitives::Blob;
use rdscli_common::ControlEvent;
use serde_json::Value;
use tracing::debug;

/// Synchronous invoker for the control function
#[derive(Debug, Clone)]
pub struct ControlInvoker {
    client: Client,
    function: String,
}

impl ControlInvoker {
    pub fn from_context(ctx: &AwsContext, function: impl Into<String>) -> Self {
        Self {
            client: ctx.lambda_client(),
            function: function.into(),
        }
    }

    /// Invoke with `event` and wait for the function's JSON response
    pub async fn invoke(&self, event: &ControlEvent) -> Result<Value> {
        let payload = serde_json::to_vec(event).context("Failed to serialize control event")?;

        let response = self
            .client
            .invoke()
            .function_name(&self.function)
            .payload(Blob::new(payload))
            .send()
            .await
            .with_context(|| format!("Failed to invoke {}", self.function))?;

        debug!(
            function = %self.function,
            status_code = response.status_code(),
            function_error = ?response.function_error(),
            "Control function returned"
        );

        check_response(
            response.status_code(),
            response.function_error(),
            response.payload().map(|p| p.as_ref()),
        )
        .with_context(|| format!("Unsuccessful invocation of {}", self.function))
    }
}

/// Validate an invocation response and parse its payload.
///
/// A function that raised still returns HTTP 200; the failure shows up in
/// `FunctionError` and the payload's `errorMessage`.
pub fn check_response(
    status_code: i32,
    function_error: Option<&str>,
    payload: Option<&[u8]>,
) -> Result<Value> {
    let parsed = payload.map(serde_json::from_slice::<Value>);
    let error_message = parsed
        .as_ref()
        .and_then(|p| p.as_ref().ok())
        .and_then(|v| v.get("errorMessage"))
        .and_then(Value::as_str);

    let empty = payload.is_none_or(<[u8]>::is_empty);
    if status_code != 200 || function_error.is_some() || empty {
        anyhow::bail!(
            "StatusCode={status_code}, FunctionError={}, errorMessage={}",
            function_error.unwrap_or("None"),
            error_message.unwrap_or("None")
        );
    }

    match parsed {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(e).context("Invalid control function response"),
        None => anyhow::bail!("Control function returned no payload"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_returns_payload() {
        let value = check_response(200, None, Some(br#"{"outcome":"activated"}"#)).unwrap();
        assert_eq!(value["outcome"], "activated");

        // A handler without a return value serializes to null
        assert_eq!(check_response(200, None, Some(b"null")).unwrap(), Value::Null);
    }

    #[test]
    fn test_function_error_includes_message() {
        let payload = br#"{"errorType":"Exception","errorMessage":"Invalid action: explode"}"#;
        let err = check_response(200, Some("Unhandled"), Some(payload)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("FunctionError=Unhandled"));
        assert!(message.contains("Invalid action: explode"));
    }

    #[test]
    fn test_bad_status_is_error() {
        let err = check_response(500, None, Some(b"{}")).unwrap_err();
        assert!(err.to_string().contains("StatusCode=500"));
    }

    #[test]
    fn test_missing_or_garbled_payload_is_error() {
        assert!(check_response(200, None, None).is_err());
        assert!(check_response(200, None, Some(b"")).is_err());
        let err = check_response(200, None, Some(b"not json")).unwrap_err();
        assert!(err.to_string().contains("Invalid control function response"));
    }
}
