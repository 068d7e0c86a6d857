use thiserror::Error;

/// Failure of a single round trip against the assistant service.
///
/// None of these are retried. The controller turns every one of them into a
/// generic failure turn so the transcript never ends on a stuck placeholder.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("server returned an empty session id")]
    MissingSession,
}
