use regex::Regex;
use rustls::server::Acceptor;
use serde::Deserialize;
use tracing::warn;

/// The hostname that traffic is attributed to when no regexp matches the real hostname.
pub const OTHER_HOSTNAME: &str = "(OTHER)";

/// The content type byte that starts a TLS handshake record.
const TLS_HANDSHAKE_CONTENT_TYPE: u8 = 22;

/// Extracts the server name (SNI) from a buffer holding the start of a TLS connection.
///
/// Returns [`None`] if the buffer doesn't contain a complete ClientHello, if the ClientHello is
/// malformed, or if it doesn't specify a server name.
pub fn sniff_tls_hostname(buf: &[u8]) -> Option<String> {
    if buf.first() != Some(&TLS_HANDSHAKE_CONTENT_TYPE) {
        return None;
    }

    let mut acceptor = Acceptor::default();
    let mut reader = buf;
    while !reader.is_empty() {
        match acceptor.read_tls(&mut reader) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }

    match acceptor.accept() {
        Ok(Some(accepted)) => accepted.client_hello().server_name().map(|name| name.to_ascii_lowercase()),
        Ok(None) | Err(_) => None,
    }
}

/// Extracts the value of the `Host` header from a buffer holding the start of an HTTP request.
/// The port, if any, is stripped.
pub fn sniff_http_hostname(buf: &[u8]) -> Option<String> {
    let head_len = buf.windows(4).position(|w| w == b"\r\n\r\n").unwrap_or(buf.len());
    let head = std::str::from_utf8(&buf[..head_len]).ok()?;

    let mut lines = head.split("\r\n");
    let request_line = lines.next()?;
    if !request_line.split(' ').nth(2).is_some_and(|version| version.starts_with("HTTP/")) {
        return None;
    }

    let host = lines.find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim().eq_ignore_ascii_case("host").then(|| value.trim())
    })?;

    let host = strip_port(host);
    match host.is_empty() {
        true => None,
        false => Some(host.to_ascii_lowercase()),
    }
}

fn strip_port(host: &str) -> &str {
    if let Some(bracketed) = host.strip_prefix('[') {
        return bracketed.split_once(']').map(|(address, _)| address).unwrap_or(host);
    }

    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

/// A rule for rewriting hostnames before they're recorded, as found in the server's
/// configuration. The `replace` string may reference capture groups with `$1`, `$name`, etc.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegexpRule {
    pub regex: String,
    pub replace: String,
}

impl RegexpRule {
    pub fn new<R: Into<String>, P: Into<String>>(regex: R, replace: P) -> Self {
        Self {
            regex: regex.into(),
            replace: replace.into(),
        }
    }
}

/// A compiled list of hostname rewriting rules.
#[derive(Debug, Clone)]
pub struct HostnameRegexps {
    rules: Vec<(Regex, String)>,
}

impl HostnameRegexps {
    /// Compiles the given rules. Rules with an empty regex, an empty replacement, or a regex
    /// that fails to compile are discarded.
    pub fn from_rules(rules: &[RegexpRule]) -> Self {
        let mut compiled = Vec::with_capacity(rules.len());

        for rule in rules {
            if rule.regex.is_empty() || rule.replace.is_empty() {
                warn!(regex = %rule.regex, replace = %rule.replace, "Discarding incomplete hostname regexp");
                continue;
            }

            match Regex::new(&rule.regex) {
                Ok(regex) => compiled.push((regex, rule.replace.clone())),
                Err(error) => warn!(regex = %rule.regex, %error, "Discarding invalid hostname regexp"),
            }
        }

        Self { rules: compiled }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rewrites a hostname with the first rule that matches it, or returns [`OTHER_HOSTNAME`]
    /// if none do.
    pub fn map_hostname(&self, hostname: &str) -> String {
        self.rules
            .iter()
            .find(|(regex, _)| regex.is_match(hostname))
            .map(|(regex, replace)| regex.replace_all(hostname, replace.as_str()).into_owned())
            .unwrap_or_else(|| OTHER_HOSTNAME.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::client_hello;

    use super::{sniff_http_hostname, sniff_tls_hostname, HostnameRegexps, RegexpRule, OTHER_HOSTNAME};

    #[test]
    fn test_tls_hostname() {
        let hello = client_hello("www.example.com");
        assert_eq!(sniff_tls_hostname(&hello).as_deref(), Some("www.example.com"));

        let hello = client_hello("example.org");
        assert_eq!(sniff_tls_hostname(&hello).as_deref(), Some("example.org"));
    }

    #[test]
    fn test_tls_hostname_bad_input() {
        let plaintext_len = 70u8;
        let garbage: Vec<u8> = (0..70).map(|i| (i % 10) as u8).collect();

        let prefixes: [&[u8]; 7] = [
            &[],
            &[0],
            &[22],
            &[22, 3, 1, 0, plaintext_len],
            &[22, 3, 1, 0, plaintext_len, 1],
            &[22, 3, 1, 0, plaintext_len, 1, 0, 0, plaintext_len - 4],
            &[22, 3, 1, 0, plaintext_len, 1, 0, 0, plaintext_len - 4, 3, 3],
        ];

        assert_eq!(sniff_tls_hostname(b"my bytes"), None);
        for prefix in prefixes {
            let mut buf = prefix.to_vec();
            buf.extend_from_slice(&garbage);
            assert_eq!(sniff_tls_hostname(&buf), None);
        }

        let hello = client_hello("www.example.com");
        assert_eq!(sniff_tls_hostname(&hello[..hello.len() / 2]), None);
    }

    #[test]
    fn test_http_hostname() {
        let request = b"GET /index.html HTTP/1.1\r\nUser-Agent: test\r\nHOST: WWW.example.com:8080\r\n\r\n";
        assert_eq!(sniff_http_hostname(request).as_deref(), Some("www.example.com"));

        let request = b"POST / HTTP/1.0\r\nHost: [::1]:80\r\nContent-Length: 0\r\n\r\n";
        assert_eq!(sniff_http_hostname(request).as_deref(), Some("::1"));

        let request = b"GET / HTTP/1.1\r\nhost:example.org\r\n";
        assert_eq!(sniff_http_hostname(request).as_deref(), Some("example.org"));

        assert_eq!(sniff_http_hostname(b"GET / HTTP/1.1\r\nAccept: */*\r\n\r\n"), None);
        assert_eq!(sniff_http_hostname(b"GET / HTTP/1.1\r\nHost: \r\n\r\n"), None);
        assert_eq!(sniff_http_hostname(b"Host: example.com\r\n\r\n"), None);
        assert_eq!(sniff_http_hostname(b"my bytes"), None);
    }

    fn example_rules() -> Vec<RegexpRule> {
        vec![
            RegexpRule::new(r"^[a-z0-9\.]*\.(example\.com)$", "$1"),
            RegexpRule::new(r"^.*example\.org$", "replacement"),
        ]
    }

    #[test]
    fn test_from_rules_discards_bad_rules() {
        assert_eq!(HostnameRegexps::from_rules(&example_rules()).len(), 2);

        let mut rules = example_rules();
        rules[0].regex = String::new();
        assert_eq!(HostnameRegexps::from_rules(&rules).len(), 1);

        let mut rules = example_rules();
        rules[0].replace = String::new();
        assert_eq!(HostnameRegexps::from_rules(&rules).len(), 1);

        let mut rules = example_rules();
        rules[0].regex = r"^[a-z0-9\.]*\.(example\.com$".to_owned();
        assert_eq!(HostnameRegexps::from_rules(&rules).len(), 1);

        assert!(HostnameRegexps::from_rules(&[]).is_empty());
    }

    #[test]
    fn test_map_hostname() {
        let regexps = HostnameRegexps::from_rules(&example_rules());

        assert_eq!(regexps.map_hostname("example.com"), OTHER_HOSTNAME);
        assert_eq!(regexps.map_hostname("www.example.com"), "example.com");
        assert_eq!(regexps.map_hostname("a.b.example.com"), "example.com");
        assert_eq!(regexps.map_hostname("example.org"), "replacement");
        assert_eq!(regexps.map_hostname("unrelated.net"), OTHER_HOSTNAME);
    }

    #[test]
    fn test_rules_deserialize() {
        let rules: Vec<RegexpRule> = serde_json::from_str(r#"[{"regex": "^.*example\\.org$", "replace": "org"}]"#).unwrap();
        assert_eq!(rules, vec![RegexpRule::new(r"^.*example\.org$", "org")]);
    }
}
