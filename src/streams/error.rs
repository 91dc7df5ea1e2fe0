use quinn::ConnectionError;
use thiserror::Error;

use crate::protocol::StreamId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamsError {
    /// The peer referenced a stream past the limit we advertised. This is a protocol violation
    /// and the connection should be closed.
    #[error("peer tried to open stream {id} (current limit: {limit})")]
    FlowControlViolation { id: StreamId, limit: StreamId },

    /// The peer referenced a stream whose ID doesn't belong to this namespace.
    #[error("stream {id} is not of class {expected_class}")]
    InvalidStreamClass { id: StreamId, expected_class: u64 },

    /// Attempted to delete a stream that isn't being tracked. This indicates a bookkeeping bug
    /// in the caller, such as deleting the same stream twice.
    #[error("tried to delete unknown stream {0}")]
    UnknownStream(StreamId),

    /// The connection was closed. This is the exact error it was closed with.
    #[error(transparent)]
    Closed(#[from] ConnectionError),
}

impl StreamsError {
    /// Returns whether this error was caused by the peer misbehaving.
    pub fn is_peer_violation(&self) -> bool {
        matches!(self, Self::FlowControlViolation { .. } | Self::InvalidStreamClass { .. })
    }
}
