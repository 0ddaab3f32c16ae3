//! Errors returned by the API client.

use super::request::OutputFormat;
use super::response::RawResponse;

/// Failure reported by the HTTP collaborator itself (connection refused, TLS, ...).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Every failure of [`ClickyClient::get`](super::ClickyClient::get).
///
/// Errors are returned as values and carry the raw response when there was one.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  /// The body did not decode in the declared output format.
  #[error("Failed to decode {format} response: {message}")]
  OutputDecode {
    format: OutputFormat,
    message: String,
    response: RawResponse,
  },

  /// The `output` argument names a format the client can't handle.
  #[error("Can't handle output type '{output}'")]
  UnsupportedOutput {
    output: String,
    response: RawResponse,
  },

  /// The API answered with a status other than 200.
  #[error("Request failed ({}): {message}", .response.status)]
  RequestFailed {
    message: String,
    response: RawResponse,
  },

  /// The request never produced a response.
  #[error("Transport error: {0}")]
  Transport(#[from] TransportError),
}

impl ApiError {
  /// Stable machine-readable error code.
  pub fn code(&self) -> &'static str {
    match self {
      Self::OutputDecode { .. } => "clicky-api-decode-error",
      Self::UnsupportedOutput { .. } => "clicky-api-output-error",
      Self::RequestFailed { .. } => "clicky-api-request-failed",
      Self::Transport(_) => "clicky-api-transport-error",
    }
  }

  /// The raw response, if the request got that far.
  pub fn response(&self) -> Option<&RawResponse> {
    match self {
      Self::OutputDecode { response, .. }
      | Self::UnsupportedOutput { response, .. }
      | Self::RequestFailed { response, .. } => Some(response),
      Self::Transport(_) => None,
    }
  }
}
