use std::{
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::trace;

use super::{sniff_http_hostname, sniff_tls_hostname, HostnameRegexps, StatsCollector};

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostnameState {
    /// Nothing was written yet.
    Pending,

    /// The hostname was found on the first write.
    Known(String),

    /// The first write didn't look like TLS or HTTP. Nothing gets recorded.
    Unknown,
}

/// Wraps a tunnelled connection, recording the traffic that goes through it into a
/// [`StatsCollector`].
///
/// The hostname is sniffed from the first write, which is expected to be either a TLS
/// ClientHello or an HTTP request. Bytes read before that write are held back and recorded
/// once the hostname is known.
pub struct StatsConn<T> {
    inner: T,
    server_id: String,
    collector: Arc<StatsCollector>,
    regexps: Option<Arc<HostnameRegexps>>,
    hostname: HostnameState,
    pending_received: u64,
}

impl<T> StatsConn<T> {
    /// Wraps a connection. If `regexps` is [`Some`], hostnames are rewritten with them before
    /// being recorded.
    pub fn new(inner: T, server_id: String, collector: Arc<StatsCollector>, regexps: Option<Arc<HostnameRegexps>>) -> Self {
        Self {
            inner,
            server_id,
            collector,
            regexps,
            hostname: HostnameState::Pending,
            pending_received: 0,
        }
    }

    /// Gets the hostname this connection's traffic is being recorded under, if it's known.
    pub fn hostname(&self) -> Option<&str> {
        match &self.hostname {
            HostnameState::Known(hostname) => Some(hostname),
            HostnameState::Pending | HostnameState::Unknown => None,
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn sniff_hostname(&mut self, buf: &[u8]) {
        let hostname = sniff_tls_hostname(buf).or_else(|| sniff_http_hostname(buf));

        self.hostname = match hostname {
            Some(hostname) => {
                let hostname = match &self.regexps {
                    Some(regexps) => regexps.map_hostname(&hostname),
                    None => hostname,
                };

                trace!(server_id = %self.server_id, %hostname, "Sniffed connection hostname");
                HostnameState::Known(hostname)
            }
            None => {
                trace!(server_id = %self.server_id, "Could not sniff connection hostname");
                HostnameState::Unknown
            }
        };

        let pending_received = std::mem::take(&mut self.pending_received);
        if pending_received != 0 {
            self.record(0, pending_received);
        }
    }

    fn record(&mut self, bytes_sent: u64, bytes_received: u64) {
        match &self.hostname {
            HostnameState::Known(hostname) => self.collector.record(&self.server_id, hostname, bytes_sent, bytes_received),
            HostnameState::Pending => self.pending_received += bytes_received,
            HostnameState::Unknown => {}
        }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for StatsConn<T> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let filled_before = buf.filled().len();

        let result = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &result {
            let bytes_read = buf.filled().len() - filled_before;
            if bytes_read != 0 {
                this.record(0, bytes_read as u64);
            }
        }

        result
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for StatsConn<T> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.hostname == HostnameState::Pending && !buf.is_empty() {
            this.sniff_hostname(buf);
        }

        let result = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(bytes_written)) = &result {
            this.record(*bytes_written as u64, 0);
        }

        result
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
