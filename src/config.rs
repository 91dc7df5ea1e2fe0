use std::num::NonZeroU32;

use quinn::{TransportConfig, VarInt};

use crate::protocol::{Perspective, StreamId};

/// The default amount of unidirectional streams the peer may have open at the same time.
pub const DEFAULT_MAX_INCOMING_UNI_STREAMS: NonZeroU32 = unsafe { NonZeroU32::new_unchecked(100) };

/// Configures the stream limits of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamsConfig {
    /// Which side of the connection we are. This decides the class of the stream IDs the peer
    /// opens towards us.
    pub perspective: Perspective,

    /// The maximum amount of unidirectional streams the peer may have open concurrently.
    pub max_incoming_uni_streams: NonZeroU32,
}

impl StreamsConfig {
    pub const fn new(perspective: Perspective, max_incoming_uni_streams: NonZeroU32) -> Self {
        Self {
            perspective,
            max_incoming_uni_streams,
        }
    }

    /// Gets the ID of the first unidirectional stream the peer will open.
    pub const fn first_incoming_stream(&self) -> StreamId {
        self.perspective.first_incoming_uni_stream()
    }

    /// Gets the highest stream ID the peer may open before receiving any credit updates.
    pub fn initial_max_stream(&self) -> StreamId {
        let extra_streams = self.max_incoming_uni_streams.get() as u64 - 1;
        self.first_incoming_stream()
            .checked_add_streams(extra_streams)
            .unwrap_or(StreamId::MAX)
    }

    /// Writes the incoming stream budget into a quinn [`TransportConfig`], so the limit
    /// advertised during the handshake matches the one enforced by the streams map.
    pub fn apply_to<'a>(&self, transport_config: &'a mut TransportConfig) -> &'a mut TransportConfig {
        transport_config.max_concurrent_uni_streams(VarInt::from_u32(self.max_incoming_uni_streams.get()))
    }
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            perspective: Perspective::Client,
            max_incoming_uni_streams: DEFAULT_MAX_INCOMING_UNI_STREAMS,
        }
    }
}
