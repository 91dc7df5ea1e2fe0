//! Connection-scoped building blocks for tunnelling over QUIC.
//!
//! The central piece of this crate is [`IncomingUniStreamsMap`], which owns the namespace of
//! unidirectional streams opened by the remote peer. The transport's frame dispatcher feeds it
//! every stream ID it sees through [`get_or_open_stream`](IncomingUniStreamsMap::get_or_open_stream),
//! the application takes new streams out of it in order through
//! [`accept_stream`](IncomingUniStreamsMap::accept_stream), and finished streams are handed back
//! through [`delete_stream`](IncomingUniStreamsMap::delete_stream), which returns credit to the
//! peer by queueing a [`MaxStreamIdFrame`].
//!
//! ```
//! use std::sync::Arc;
//! use quinn::ConnectionError;
//! use tunnel_streams::{IncomingStream, IncomingUniStreamsMap, StreamId};
//!
//! struct Stream(StreamId);
//!
//! impl IncomingStream for Stream {
//!     fn close_for_shutdown(&self, _error: &ConnectionError) {}
//! }
//!
//! let map = IncomingUniStreamsMap::new(StreamId(3), StreamId(11), 3, |_frame| {}, Stream);
//!
//! // The peer opened stream 7 first, so stream 3 gets created too.
//! map.get_or_open_stream(StreamId(7)).unwrap();
//! assert_eq!(map.accept_stream_blocking().unwrap().0, StreamId(3));
//! assert_eq!(map.accept_stream_blocking().unwrap().0, StreamId(7));
//! ```
//!
//! The [`stats`] module contains the traffic statistics collector, which sniffs the hostname of
//! outgoing tunnelled connections and aggregates how many bytes went to each.

#[cfg(test)]
mod test_utils;

pub mod config;
pub mod protocol;
pub mod stats;
pub mod streams;

pub use config::StreamsConfig;
pub use protocol::{ControlFrame, MaxStreamIdFrame, Perspective, StreamId};
pub use streams::{IncomingStream, IncomingUniStreamsMap, StreamsError};
