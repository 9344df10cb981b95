//! Crate-level error types.
//!
//! [`TradewireError`] unifies every error source (configuration, WebSocket,
//! STOMP framing, JSON, REST) behind a single enum so callers can match on
//! the variant they care about while still using the `?` operator for easy
//! propagation.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TradewireError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum TradewireError {
    /// A configuration value was missing or could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An HTTP request to the REST API failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A STOMP frame could not be parsed.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The server did not answer the STOMP CONNECT in time.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(std::time::Duration),

    /// The server refused the bearer credential.
    #[error("credential rejected: {0}")]
    CredentialRejected(String),

    /// The server sent a STOMP ERROR frame.
    #[error("server error: {0}")]
    ServerError(String),

    /// The transport closed underneath an open session.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// A MESSAGE frame arrived for a subscription nobody registered.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// The REST API answered with a non-success status.
    #[error("api error: {0}")]
    Api(String),

    /// The transport endpoint could not be resolved.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),
}
