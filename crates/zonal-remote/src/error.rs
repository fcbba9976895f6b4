//! Error types for the remote statistics client.

use thiserror::Error;

/// Errors raised while submitting a job to the remote statistics engine.
///
/// None of these is fatal on its own: the retry driver treats every one of
/// them as a transient failure and decides from the presence of the output
/// artifact whether the attempt succeeded.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// I/O error writing the artifact.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error (connect, timeout, body read).
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// Request could not be encoded.
    #[error("Request encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Endpoint URL is not usable.
    #[error("Invalid endpoint '{0}' (expected an http:// or https:// URL)")]
    InvalidEndpoint(String),

    /// The service answered with a non-success status.
    #[error("Job rejected by service (HTTP {status}): {body}")]
    JobRejected {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The external program could not be started.
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external program exited unsuccessfully.
    #[error("'{program}' exited with status {code:?}")]
    CommandFailed {
        program: String,
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Captured stdout and stderr.
        output: String,
    },
}
