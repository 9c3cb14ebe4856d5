//! Error types for wirecall.

use thiserror::Error;

/// Main error type for all wirecall operations.
///
/// Each variant is a stable error kind; the message text is diagnostic
/// only and not part of the wire contract. The exception is the server
/// dispatch variants ([`RpcError::ServiceNotFound`] and friends), whose
/// rendered form is what the server copies into `Response.err`.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the connection before a frame started.
    #[error("connection closed")]
    ConnectionClosed,

    /// Peer closed the connection in the middle of a frame.
    #[error("truncated frame")]
    Truncated,

    /// Frame length fields announce more than the configured maximum.
    #[error("frame of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    /// Frame bytes violate the header layout.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// No compressor registered under the given code.
    #[error("unsupported compressor {0}")]
    UnknownCompressor(u8),

    /// No serializer assigned to the given code.
    #[error("unsupported serializer {0}")]
    UnknownSerializer(u8),

    /// The payload type does not fit the selected serializer's data
    /// model, e.g. a serde value offered to the protobuf serializer.
    #[error("payload type not supported by serializer {0}")]
    UnsupportedPayload(u8),

    /// Compress/decompress failure in a registered compressor.
    #[error("compression error: {0}")]
    Compression(#[source] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MessagePack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Protobuf deserialization error.
    #[error("protobuf decode error: {0}")]
    ProtoDecode(#[from] prost::DecodeError),

    /// No service registered under the requested name.
    #[error("service {0} not found")]
    ServiceNotFound(String),

    /// The service exists but has no such method.
    #[error("method {0} not found")]
    MethodNotFound(String),

    /// Error raised inside a user handler; rendered verbatim into
    /// `Response.err`.
    #[error("{0}")]
    Handler(String),

    /// Server-side error string surfaced through `Response.err`.
    #[error("remote error: {0}")]
    Remote(String),

    /// The call's context was cancelled.
    #[error("call cancelled")]
    Cancelled,

    /// The call's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Eager pool construction failed.
    #[error("pool init failed: {0}")]
    PoolInit(#[source] std::io::Error),

    /// The pool was shut down while a lease was requested or held.
    #[error("connection pool closed")]
    PoolClosed,

    /// Operation on a discovery registry that was already closed.
    #[error("registry closed")]
    RegistryClosed,

    /// The background call task died without producing a result.
    #[error("call task failed: {0}")]
    CallTask(#[from] tokio::task::JoinError),
}

impl RpcError {
    /// Build a handler error from any displayable message.
    ///
    /// Convenience for service implementations that want to surface an
    /// application-level failure to the remote caller.
    pub fn handler(msg: impl Into<String>) -> Self {
        RpcError::Handler(msg.into())
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;
