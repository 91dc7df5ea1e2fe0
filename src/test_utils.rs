use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;
use quinn::ConnectionError;

use crate::{
    protocol::{ControlFrame, StreamId},
    streams::IncomingStream,
};

/// A stream that remembers how it was shut down.
#[derive(Debug)]
pub struct MockStream {
    pub id: StreamId,
    shutdown_error: Mutex<Option<ConnectionError>>,
    shutdown_count: AtomicUsize,
}

impl MockStream {
    pub fn new(id: StreamId) -> Self {
        Self {
            id,
            shutdown_error: Mutex::new(None),
            shutdown_count: AtomicUsize::new(0),
        }
    }

    pub fn shutdown_error(&self) -> Option<ConnectionError> {
        self.shutdown_error.lock().clone()
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdown_count.load(Ordering::Relaxed)
    }
}

impl IncomingStream for MockStream {
    fn close_for_shutdown(&self, error: &ConnectionError) {
        if self.shutdown_count.fetch_add(1, Ordering::Relaxed) != 0 {
            panic!("Stream {} was shut down twice", self.id);
        }

        *self.shutdown_error.lock() = Some(error.clone());
    }
}

/// Produces the first flight of a real TLS client connecting to `server_name`, which is a
/// single record holding the ClientHello.
pub fn client_hello(server_name: &str) -> Vec<u8> {
    let config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(rustls::RootCertStore::empty())
        .with_no_client_auth();

    let server_name = rustls::ServerName::try_from(server_name).unwrap();
    let mut connection = rustls::ClientConnection::new(Arc::new(config), server_name).unwrap();

    let mut buf = Vec::new();
    connection.write_tls(&mut buf).unwrap();
    buf
}

/// Collects the control frames a streams map queues.
#[derive(Clone, Default)]
pub struct FrameRecorder {
    frames: Arc<Mutex<Vec<ControlFrame>>>,
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> impl Fn(ControlFrame) + Send + Sync + 'static {
        let frames = Arc::clone(&self.frames);
        move |frame| frames.lock().push(frame)
    }

    pub fn take(&self) -> Vec<ControlFrame> {
        std::mem::take(&mut *self.frames.lock())
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }
}
