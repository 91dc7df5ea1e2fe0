//! Bookkeeping for the streams the peer opens on a connection.
//!
//! The peer controls which stream IDs get used, so everything in here treats incoming IDs as
//! untrusted input: IDs past the advertised limit are rejected, IDs of the wrong class are
//! rejected, and IDs that were skipped over are filled in so the application always sees
//! streams in order.

mod error;
mod incoming_uni;

use quinn::ConnectionError;

pub use error::*;
pub use incoming_uni::*;

/// A stream object that can be tracked by a streams map.
pub trait IncomingStream {
    /// Shuts the stream down because the whole connection failed. Any pending or future reads
    /// on the stream should fail with the given error.
    ///
    /// This is called without holding the map's lock, so implementations may call back into
    /// the map. The map is already closed by then, so mutating calls fail with the close error.
    fn close_for_shutdown(&self, error: &ConnectionError);
}
