//! Traffic statistics for tunnelled connections.
//!
//! Outgoing connections are wrapped in a [`StatsConn`], which looks at the first bytes the
//! client sends to find out which hostname the connection is for. TLS connections are
//! identified by the server name in their ClientHello, and plaintext HTTP connections by their
//! `Host` header. Hostnames can optionally be rewritten through a set of [`HostnameRegexps`],
//! so for example all subdomains of a site are grouped together and any site not of interest
//! gets reported as [`OTHER_HOSTNAME`].
//!
//! The traffic is aggregated per server and hostname in a [`StatsCollector`], from which it's
//! periodically taken (see [`next_send_period`]) and reported.

mod collector;
mod conn;
mod hostname;

pub use collector::*;
pub use conn::*;
pub use hostname::*;
