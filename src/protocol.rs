//! Stream identifiers and the control frames this crate asks the transport to send.
//!
//! QUIC stream IDs carry their class in the two lowest bits: bit 0 tells who initiated the
//! stream (0 for the client, 1 for the server) and bit 1 tells whether it's unidirectional.
//! Consecutive streams of the same class are thus spaced by [`StreamId::STRIDE`].

use std::fmt;

/// The spacing between two consecutive stream IDs of the same class.
pub const STREAM_ID_STRIDE: u64 = 4;

/// A QUIC stream identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl StreamId {
    pub const STRIDE: u64 = STREAM_ID_STRIDE;

    /// The largest stream ID that can be encoded as a QUIC variable-length integer.
    pub const MAX: StreamId = StreamId((1 << 62) - 1);

    /// Gets the two class bits of this ID. Two IDs belong to the same namespace if and only if
    /// their classes are equal.
    pub const fn class(self) -> u64 {
        self.0 % Self::STRIDE
    }

    pub const fn is_unidirectional(self) -> bool {
        self.0 & 0b10 != 0
    }

    /// Gets which side of the connection opened the stream with this ID.
    pub const fn initiator(self) -> Perspective {
        match self.0 & 0b01 {
            0 => Perspective::Client,
            _ => Perspective::Server,
        }
    }

    /// Gets the next ID of the same class, or [`None`] if that would go past [`StreamId::MAX`].
    pub fn checked_next(self) -> Option<StreamId> {
        self.checked_add_streams(1)
    }

    /// Gets the ID `count` streams after this one in the same class, or [`None`] if that would
    /// go past [`StreamId::MAX`].
    pub fn checked_add_streams(self, count: u64) -> Option<StreamId> {
        count
            .checked_mul(Self::STRIDE)
            .and_then(|offset| self.0.checked_add(offset))
            .filter(|id| *id <= Self::MAX.0)
            .map(StreamId)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents the possible sides of a QUIC connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perspective {
    Client,
    Server,
}

impl Perspective {
    /// Gets the other side of the connection.
    pub const fn peer(self) -> Self {
        match self {
            Self::Client => Self::Server,
            Self::Server => Self::Client,
        }
    }

    /// Gets the ID of the first unidirectional stream the peer may open towards us.
    pub const fn first_incoming_uni_stream(self) -> StreamId {
        match self.peer() {
            Self::Client => StreamId(0b10),
            Self::Server => StreamId(0b11),
        }
    }
}

impl fmt::Display for Perspective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Server => write!(f, "server"),
        }
    }
}

/// Tells the peer the highest stream ID it's currently allowed to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxStreamIdFrame {
    pub stream_id: StreamId,
}

/// A control frame queued for the transport to send to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFrame {
    MaxStreamId(MaxStreamIdFrame),
}

impl From<MaxStreamIdFrame> for ControlFrame {
    fn from(frame: MaxStreamIdFrame) -> Self {
        Self::MaxStreamId(frame)
    }
}
