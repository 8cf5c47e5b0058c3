//! LLM error types.

use thiserror::Error;

/// Turn a non-success response into an `LLMError`, consuming the body.
///
/// 429 becomes `RateLimit` with the `retry-after` seconds when present.
pub(crate) async fn error_for_response(response: reqwest::Response) -> LLMError {
    let status = response.status().as_u16();
    if status == 429 {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        return LLMError::RateLimit { retry_after };
    }
    let message = response.text().await.unwrap_or_default();
    LLMError::Api { status, message }
}

/// Errors that can occur when making LLM API calls.
#[derive(Debug, Error)]
pub enum LLMError {
    /// HTTP request failed
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// API returned an error response
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limited (429)
    #[error("rate limited (retry after {retry_after:?}s)")]
    RateLimit { retry_after: Option<u64> },

    /// Response body did not have the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Endpoint sent an error frame in the middle of a stream
    #[error("stream error: {0}")]
    Stream(String),

    /// Completion contained no choices
    #[error("response contained no choices")]
    EmptyResponse,
}

impl From<serde_json::Error> for LLMError {
    fn from(err: serde_json::Error) -> Self {
        LLMError::Malformed(err.to_string())
    }
}
