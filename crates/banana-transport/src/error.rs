/// Errors that can occur while talking to the auth endpoint.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint URL could not be parsed or joined.
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),

    /// The request never produced a response (DNS, TLS, connect, timeout).
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The endpoint answered with a non-success status.
    #[error("endpoint returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body wasn't the documented JSON shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}
