use std::{collections::HashMap, sync::Arc};

use parking_lot::{Condvar, Mutex};
use quinn::ConnectionError;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::{
    config::StreamsConfig,
    protocol::{ControlFrame, MaxStreamIdFrame, StreamId},
};

use super::{IncomingStream, StreamsError};

/// Tracks the unidirectional streams opened by the peer on a single connection.
///
/// The peer may open any stream ID up to the current limit, in any order. Whenever an ID is
/// seen for the first time, that stream and all the same-class streams before it that weren't
/// seen yet are created, so the set of known IDs never has gaps. The application then accepts
/// the streams strictly in ID order.
///
/// The limit works on credit: the peer starts off with a fixed budget of concurrent streams,
/// and each time a stream is deleted a [`MaxStreamIdFrame`] is queued with the new limit.
///
/// All the state lives behind a single lock. The control frame callback and the stream
/// constructor are both invoked while holding it, so they must not call back into the map.
pub struct IncomingUniStreamsMap<S> {
    state: Mutex<StreamsState<S>>,

    /// Wakes up threads blocked on [`accept_stream_blocking`](Self::accept_stream_blocking).
    stream_available: Condvar,

    /// Wakes up tasks waiting on [`accept_stream`](Self::accept_stream).
    stream_notify: Notify,

    max_num_streams: usize,
    queue_control_frame: Box<dyn Fn(ControlFrame) + Send + Sync>,
    new_stream: Box<dyn Fn(StreamId) -> S + Send + Sync>,
}

struct StreamsState<S> {
    streams: HashMap<StreamId, Arc<S>>,

    /// The first ID of the namespace. Anything below this was never valid.
    first_stream: StreamId,

    /// The next stream that will be returned when accepting.
    next_stream: StreamId,

    /// The highest stream the peer has opened, if any.
    highest_stream: Option<StreamId>,

    /// The highest stream the peer is allowed to open.
    max_stream: StreamId,

    close_error: Option<ConnectionError>,
}

impl<S> StreamsState<S> {
    fn check_open(&self) -> Result<(), StreamsError> {
        match &self.close_error {
            Some(error) => Err(StreamsError::Closed(error.clone())),
            None => Ok(()),
        }
    }

    /// Attempts to take the stream at the accept cursor. Returns [`None`] if the caller has to
    /// wait for the peer to open it.
    fn poll_accept(&mut self) -> Option<Result<Arc<S>, StreamsError>> {
        if let Err(error) = self.check_open() {
            return Some(Err(error));
        }

        loop {
            if let Some(stream) = self.streams.get(&self.next_stream) {
                let stream = Arc::clone(stream);
                self.next_stream = StreamId(self.next_stream.0 + StreamId::STRIDE);
                return Some(Ok(stream));
            }

            // If the cursor is at or below the highest opened stream, then that stream was
            // deleted before it got accepted and there's nothing to wait for.
            match self.highest_stream {
                Some(highest) if self.next_stream <= highest => {
                    trace!(id = %self.next_stream, "Skipping stream deleted before being accepted");
                    self.next_stream = StreamId(self.next_stream.0 + StreamId::STRIDE);
                }
                _ => return None,
            }
        }
    }
}

impl<S: IncomingStream> IncomingUniStreamsMap<S> {
    /// Constructs a new [`IncomingUniStreamsMap`].
    ///
    /// `next_stream` is the first ID of the namespace, `initial_max_stream` the highest ID the
    /// peer may open before receiving any updates, and `max_num_streams` how many streams the
    /// peer may have open at the same time. Frames passed to `queue_control_frame` must be sent
    /// to the peer, and `new_stream` constructs the stream object for a newly opened ID.
    pub fn new<F, N>(
        next_stream: StreamId,
        initial_max_stream: StreamId,
        max_num_streams: usize,
        queue_control_frame: F,
        new_stream: N,
    ) -> Self
    where
        F: Fn(ControlFrame) + Send + Sync + 'static,
        N: Fn(StreamId) -> S + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(StreamsState {
                streams: HashMap::new(),
                first_stream: next_stream,
                next_stream,
                highest_stream: None,
                max_stream: initial_max_stream,
                close_error: None,
            }),
            stream_available: Condvar::new(),
            stream_notify: Notify::new(),
            max_num_streams,
            queue_control_frame: Box::new(queue_control_frame),
            new_stream: Box::new(new_stream),
        }
    }

    /// Constructs a new [`IncomingUniStreamsMap`] with the limits from a [`StreamsConfig`].
    pub fn from_config<F, N>(config: &StreamsConfig, queue_control_frame: F, new_stream: N) -> Self
    where
        F: Fn(ControlFrame) + Send + Sync + 'static,
        N: Fn(StreamId) -> S + Send + Sync + 'static,
    {
        Self::new(
            config.first_incoming_stream(),
            config.initial_max_stream(),
            config.max_incoming_uni_streams.get() as usize,
            queue_control_frame,
            new_stream,
        )
    }

    /// Waits for the next stream in order to be opened by the peer and returns it.
    ///
    /// This is cancel-safe: dropping the future before it completes doesn't consume a stream,
    /// so it may be wrapped with a timeout without affecting other callers.
    ///
    /// Once the map is closed this always fails with the error it was closed with.
    pub async fn accept_stream(&self) -> Result<Arc<S>, StreamsError> {
        loop {
            // The waiter has to be registered before checking the state, otherwise a stream
            // opened between the check and the await would go unnoticed.
            let notified = self.stream_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let polled = self.state.lock().poll_accept();
            if let Some(result) = polled {
                return result;
            }

            notified.await;
        }
    }

    /// Same as [`accept_stream`](Self::accept_stream), but blocks the current thread.
    pub fn accept_stream_blocking(&self) -> Result<Arc<S>, StreamsError> {
        let mut state = self.state.lock();
        loop {
            if let Some(result) = state.poll_accept() {
                return result;
            }

            self.stream_available.wait(&mut state);
        }
    }

    /// Gets the stream with the given ID, opening it and any skipped streams before it if this
    /// is the first time the ID is seen.
    ///
    /// Returns `Ok(None)` if the stream was already deleted.
    pub fn get_or_open_stream(&self, id: StreamId) -> Result<Option<Arc<S>>, StreamsError> {
        let mut state = self.state.lock();
        state.check_open()?;

        if id > state.max_stream {
            debug!(%id, limit = %state.max_stream, "Peer exceeded the incoming stream limit");
            return Err(StreamsError::FlowControlViolation {
                id,
                limit: state.max_stream,
            });
        }

        let expected_class = state.first_stream.class();
        if id.class() != expected_class {
            debug!(%id, expected_class, "Peer referenced a stream of the wrong class");
            return Err(StreamsError::InvalidStreamClass { id, expected_class });
        }

        // If the ID isn't higher than the highest we've seen, then the stream either exists in
        // the map or was already deleted.
        let start = match state.highest_stream {
            Some(highest) if id <= highest => return Ok(state.streams.get(&id).cloned()),
            Some(highest) => match highest.checked_next() {
                Some(start) => start,
                None => return Ok(None),
            },
            None => state.first_stream,
        };

        if id < start {
            return Ok(None);
        }

        let mut new_id = start;
        loop {
            let stream = Arc::new((self.new_stream)(new_id));
            state.streams.insert(new_id, stream);
            trace!(id = %new_id, "Opened incoming stream");
            self.stream_available.notify_one();

            match new_id.checked_next() {
                Some(next_id) if next_id <= id => new_id = next_id,
                _ => break,
            }
        }

        state.highest_stream = Some(id);
        self.stream_notify.notify_waiters();
        Ok(state.streams.get(&id).cloned())
    }

    /// Stops tracking a stream. The caller takes over the responsibility of tearing it down.
    ///
    /// If this frees up room for the peer to open more streams, a [`MaxStreamIdFrame`] with
    /// the new limit is queued.
    pub fn delete_stream(&self, id: StreamId) -> Result<(), StreamsError> {
        let mut state = self.state.lock();
        state.check_open()?;

        if state.streams.remove(&id).is_none() {
            return Err(StreamsError::UnknownStream(id));
        }

        let num_new_streams = self.max_num_streams.saturating_sub(state.streams.len());
        if num_new_streams == 0 {
            return Ok(());
        }

        // A stream was just removed, so at least one was opened and highest_stream is set.
        if let Some(highest) = state.highest_stream {
            let advertised = highest.checked_add_streams(num_new_streams as u64).unwrap_or(StreamId::MAX);
            state.max_stream = state.max_stream.max(advertised);

            debug!(%id, max_stream = %state.max_stream, "Queueing MAX_STREAM_ID frame");
            (self.queue_control_frame)(MaxStreamIdFrame { stream_id: state.max_stream }.into());
        }

        Ok(())
    }

    /// Closes the map with an error. All tracked streams are shut down with that error, and all
    /// the pending and future accepts fail with it.
    ///
    /// Only the first call has any effect, so the original cause of the failure is preserved.
    pub fn close_with_error(&self, error: ConnectionError) {
        let streams: Vec<Arc<S>> = {
            let mut state = self.state.lock();
            if let Some(close_error) = &state.close_error {
                debug!(%error, %close_error, "Ignoring close, streams map is already closed");
                return;
            }

            state.close_error = Some(error.clone());
            state.streams.values().cloned().collect()
        };

        debug!(%error, open_streams = streams.len(), "Closing incoming streams");
        for stream in &streams {
            stream.close_for_shutdown(&error);
        }

        self.stream_available.notify_all();
        self.stream_notify.notify_waiters();
    }
}

impl<S> IncomingUniStreamsMap<S> {
    /// Gets the ID of the next stream that will be accepted.
    pub fn next_stream(&self) -> StreamId {
        self.state.lock().next_stream
    }

    /// Gets the highest stream ID the peer has opened, or [`None`] if it hasn't opened any yet.
    pub fn highest_stream(&self) -> Option<StreamId> {
        self.state.lock().highest_stream
    }

    /// Gets the highest stream ID the peer is currently allowed to open.
    pub fn max_stream(&self) -> StreamId {
        self.state.lock().max_stream
    }

    /// Gets the amount of streams currently being tracked.
    pub fn open_streams(&self) -> usize {
        self.state.lock().streams.len()
    }

    /// Gets the error the map was closed with, or [`None`] if it's still open.
    pub fn close_error(&self) -> Option<ConnectionError> {
        self.state.lock().close_error.clone()
    }

    /// Returns whether [`close_with_error`](Self::close_with_error) was called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().close_error.is_some()
    }
}
