//! Session error types.

use thiserror::Error;

use crate::codec::CodecError;

/// Errors surfaced by session operations.
///
/// The session itself never panics across its public API: failures are
/// delivered through request futures, the [`on_error`](crate::Session::on_error)
/// sink, or as negative responses to the peer.
#[derive(Debug, Error)]
pub enum DapError {
    /// The underlying byte stream failed or closed unexpectedly.
    #[error("transport error: {0}")]
    Transport(String),

    /// A message could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The peer answered a request with a negative response.
    #[error("request failed: {message}")]
    Rejected {
        /// The `message` field of the error response.
        message: String,
    },

    /// The request could not be written to the stream.
    #[error("failed to send request")]
    SendFailed,

    /// The session has shut down; pending and future requests cannot
    /// complete.
    #[error("session closed")]
    SessionClosed,

    /// `bind` was called on a session that already has a stream attached.
    /// The original binding persists.
    #[error("session is already bound")]
    AlreadyBound,

    /// A send was attempted before any stream was bound.
    #[error("session is not bound")]
    NotBound,
}
