use std::net::{SocketAddr, ToSocketAddrs};

use anyhow::{bail, Context};
use log::debug;

pub const TIMELINE_METRICS_PATH: &str = "/ws/v1/timeline/metrics";

/// A configured collector address that has not been resolved yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorCandidate {
    pub host: String,
    pub port: u16,
}

/// Parses a comma or whitespace separated host list.
///
/// Entries may carry their own port (`host:port`, `[v6]:port`); the rest use
/// `default_port`.
pub fn parse_candidates(
    hosts: &str,
    default_port: u16,
) -> anyhow::Result<Vec<CollectorCandidate>> {
    let mut candidates = vec![];
    for entry in hosts.split(|c: char| c == ',' || c.is_whitespace()) {
        if entry.is_empty() {
            continue;
        }
        let (host, port) = split_host_port(entry)
            .with_context(|| format!("invalid collector address `{entry}`"))?;
        candidates.push(CollectorCandidate {
            host: host.to_owned(),
            port: port.unwrap_or(default_port),
        });
    }
    Ok(candidates)
}

fn split_host_port(entry: &str) -> anyhow::Result<(&str, Option<u16>)> {
    if let Some(rest) = entry.strip_prefix('[') {
        let Some((host, rest)) = rest.split_once(']') else {
            bail!("unterminated `[`");
        };
        return match rest {
            "" => Ok((host, None)),
            _ => match rest.strip_prefix(':') {
                Some(port) => Ok((host, Some(port.parse()?))),
                None => bail!("unexpected `{rest}` after address"),
            },
        };
    }
    match entry.split_once(':') {
        // A bare IPv6 address
        Some((_, port)) if port.contains(':') => Ok((entry, None)),
        Some((host, port)) => {
            if host.is_empty() {
                bail!("missing host");
            }
            Ok((host, Some(port.parse()?)))
        }
        None => Ok((entry, None)),
    }
}

/// The collector the sink talks to for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorEndpoint {
    host: String,
    port: u16,
    addr: SocketAddr,
}
impl CollectorEndpoint {
    /// Picks the first candidate that resolves. Later candidates are never
    /// used as a fallback once one has resolved.
    pub fn resolve(candidates: &[CollectorCandidate]) -> anyhow::Result<Self> {
        for candidate in candidates {
            let resolved = (candidate.host.as_str(), candidate.port).to_socket_addrs();
            match resolved.map(|mut addrs| addrs.next()) {
                Ok(Some(addr)) => {
                    return Ok(Self {
                        host: candidate.host.clone(),
                        port: candidate.port,
                        addr,
                    })
                }
                Ok(None) => debug!(
                    "collector {}:{} has no address",
                    candidate.host, candidate.port
                ),
                Err(e) => debug!(
                    "could not resolve collector {}:{}: {e}",
                    candidate.host, candidate.port
                ),
            }
        }
        if candidates.is_empty() {
            bail!("no collector address configured");
        }
        bail!("none of {} collector address(es) could be resolved", candidates.len())
    }

    pub fn host(&self) -> &str {
        &self.host
    }
    pub fn port(&self) -> u16 {
        self.port
    }
    pub fn socket_addr(&self) -> SocketAddr {
        self.addr
    }
    pub fn url(&self) -> String {
        if self.host.contains(':') {
            format!("http://[{}]:{}{}", self.host, self.port, TIMELINE_METRICS_PATH)
        } else {
            format!("http://{}:{}{}", self.host, self.port, TIMELINE_METRICS_PATH)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_candidates() {
        let candidates = parse_candidates("c1.example, c2.example:7000  10.0.0.3", 6188).unwrap();
        let pairs: Vec<_> = candidates
            .iter()
            .map(|c| (c.host.as_str(), c.port))
            .collect();
        assert_eq!(
            pairs,
            vec![("c1.example", 6188), ("c2.example", 7000), ("10.0.0.3", 6188)]
        );
    }

    #[test]
    fn test_parse_ipv6_candidates() {
        let candidates = parse_candidates("[::1]:7000,::1", 6188).unwrap();
        assert_eq!(candidates[0], CollectorCandidate { host: "::1".into(), port: 7000 });
        assert_eq!(candidates[1], CollectorCandidate { host: "::1".into(), port: 6188 });
    }

    #[test]
    fn test_parse_bad_port() {
        assert!(parse_candidates("collector:http", 6188).is_err());
        assert!(parse_candidates(":80", 6188).is_err());
        assert!(parse_candidates("[::1", 6188).is_err());
    }

    #[test]
    fn test_resolve_uses_first_candidate() {
        let candidates = parse_candidates("127.0.0.1:6188,127.0.0.2:6189", 1).unwrap();
        let endpoint = CollectorEndpoint::resolve(&candidates).unwrap();
        assert_eq!(endpoint.host(), "127.0.0.1");
        assert_eq!(endpoint.port(), 6188);
        assert_eq!(endpoint.socket_addr(), "127.0.0.1:6188".parse::<SocketAddr>().unwrap());
        assert_eq!(
            endpoint.url(),
            "http://127.0.0.1:6188/ws/v1/timeline/metrics"
        );
    }

    #[test]
    fn test_resolve_ipv6_url() {
        let candidates = parse_candidates("[::1]:6188", 1).unwrap();
        let endpoint = CollectorEndpoint::resolve(&candidates).unwrap();
        assert_eq!(endpoint.url(), "http://[::1]:6188/ws/v1/timeline/metrics");
    }

    #[test]
    fn test_resolve_nothing() {
        assert!(CollectorEndpoint::resolve(&[]).is_err());
    }
}
