use std::{collections::HashMap, ops::Range, time::Duration};

use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use tracing::trace;

/// The range from which the period between two stats uploads is randomly chosen.
pub const SEND_PERIOD_RANGE: Range<Duration> = Duration::from_secs(5 * 60)..Duration::from_secs(10 * 60);

/// Gets a random period to wait before sending the next stats upload. The randomness keeps the
/// uploads of many clients from lining up.
pub fn next_send_period() -> Duration {
    rand::thread_rng().gen_range(SEND_PERIOD_RANGE)
}

/// Traffic counters for a single hostname.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HostStats {
    pub num_bytes_sent: u64,
    pub num_bytes_received: u64,
}

impl HostStats {
    fn add(&mut self, other: HostStats) {
        self.num_bytes_sent = self.num_bytes_sent.saturating_add(other.num_bytes_sent);
        self.num_bytes_received = self.num_bytes_received.saturating_add(other.num_bytes_received);
    }
}

/// The traffic that went through a server, organized by hostname. This is the payload that
/// gets reported to the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerStats {
    pub hostname_to_stats: HashMap<String, HostStats>,
}

impl ServerStats {
    /// Adds all the counters from another [`ServerStats`] into this one.
    pub fn merge(&mut self, other: ServerStats) {
        for (hostname, stats) in other.hostname_to_stats {
            self.hostname_to_stats.entry(hostname).or_default().add(stats);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hostname_to_stats.is_empty()
    }
}

/// Aggregates traffic statistics per server and hostname.
///
/// Each tunnel owns its own collector, there is no process-wide state.
#[derive(Debug, Default)]
pub struct StatsCollector {
    servers: Mutex<HashMap<String, ServerStats>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds traffic to the counters of a hostname on a server.
    pub fn record(&self, server_id: &str, hostname: &str, bytes_sent: u64, bytes_received: u64) {
        trace!(server_id, hostname, bytes_sent, bytes_received, "Recording traffic");

        let mut servers = self.servers.lock();
        let server = servers.entry(server_id.to_owned()).or_default();
        server.hostname_to_stats.entry(hostname.to_owned()).or_default().add(HostStats {
            num_bytes_sent: bytes_sent,
            num_bytes_received: bytes_received,
        });
    }

    /// Takes the accumulated stats for a server, resetting its counters. Returns [`None`] if
    /// there's nothing to report.
    pub fn take_for_server(&self, server_id: &str) -> Option<ServerStats> {
        self.servers.lock().remove(server_id).filter(|stats| !stats.is_empty())
    }

    /// Returns stats taken with [`take_for_server`](Self::take_for_server) to the collector,
    /// for example because uploading them failed. They're merged with whatever was recorded
    /// in the meantime.
    pub fn put_back(&self, server_id: &str, stats: ServerStats) {
        if stats.is_empty() {
            return;
        }

        self.servers.lock().entry(server_id.to_owned()).or_default().merge(stats);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{next_send_period, HostStats, StatsCollector, SEND_PERIOD_RANGE};

    const SERVER_ID: &str = "myserverid";

    #[test]
    fn test_next_send_period() {
        let periods: Vec<Duration> = (0..16).map(|_| next_send_period()).collect();

        for period in &periods {
            assert!(SEND_PERIOD_RANGE.contains(period));
        }

        assert!(periods.iter().any(|p| *p != periods[0]));
    }

    #[test]
    fn test_take_for_server() {
        let collector = StatsCollector::new();
        assert_eq!(collector.take_for_server(SERVER_ID), None);

        collector.record(SERVER_ID, "example.com", 100, 2000);
        collector.record(SERVER_ID, "example.com", 50, 0);
        collector.record(SERVER_ID, "example.org", 1, 2);

        assert_eq!(collector.take_for_server("INVALID"), None);

        let stats = collector.take_for_server(SERVER_ID).unwrap();
        assert_eq!(stats.hostname_to_stats.len(), 2);
        assert_eq!(
            stats.hostname_to_stats["example.com"],
            HostStats {
                num_bytes_sent: 150,
                num_bytes_received: 2000
            }
        );

        // Taking the stats clears them.
        assert_eq!(collector.take_for_server(SERVER_ID), None);
    }

    #[test]
    fn test_put_back() {
        let collector = StatsCollector::new();
        collector.record(SERVER_ID, "example.com", 10, 20);

        let taken = collector.take_for_server(SERVER_ID).unwrap();
        assert_eq!(collector.take_for_server(SERVER_ID), None);

        collector.put_back(SERVER_ID, taken.clone());
        assert_eq!(collector.take_for_server(SERVER_ID), Some(taken.clone()));

        collector.record(SERVER_ID, "example.com", 1, 1);
        collector.put_back(SERVER_ID, taken);
        let merged = collector.take_for_server(SERVER_ID).unwrap();
        assert_eq!(
            merged.hostname_to_stats["example.com"],
            HostStats {
                num_bytes_sent: 11,
                num_bytes_received: 21
            }
        );
    }

    #[test]
    fn test_payload_json() {
        let collector = StatsCollector::new();
        collector.record(SERVER_ID, "example.com", 3, 4);

        let payload = collector.take_for_server(SERVER_ID).unwrap();
        let json = serde_json::to_string(&payload).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["hostname_to_stats"]["example.com"]["num_bytes_sent"], 3);
        assert_eq!(parsed["hostname_to_stats"]["example.com"]["num_bytes_received"], 4);
    }
}
