//! Stateless selection rules.
//!
//! Each function returns an index into the candidate slice it was given.
//! Ties always go to the earliest candidate.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Index of the smallest connection count.
pub fn least_connections(counts: &[u64]) -> Option<usize> {
    counts
        .iter()
        .enumerate()
        .min_by_key(|(idx, count)| (**count, *idx))
        .map(|(idx, _)| idx)
}

/// Index of the smallest measured response time; unmeasured ranks last.
///
/// When nothing has been measured yet the first candidate wins.
pub fn least_response_time(times: &[Option<Duration>]) -> Option<usize> {
    times
        .iter()
        .enumerate()
        .min_by_key(|(idx, time)| (time.unwrap_or(Duration::MAX), *idx))
        .map(|(idx, _)| idx)
}

/// Sum of the client address octets.
///
/// Accepts a bare IPv4/IPv6 address or a socket address with a port.
/// A missing or unparsable address hashes to 0. The sum clusters for
/// addresses in the same subnet, so spread across instances is uneven.
pub fn ip_hash(client_ip: Option<&str>) -> u64 {
    let Some(raw) = client_ip.map(str::trim) else {
        return 0;
    };
    let ip = raw
        .parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|sa| sa.ip()));

    match ip {
        Some(IpAddr::V4(v4)) => v4.octets().iter().map(|o| u64::from(*o)).sum(),
        Some(IpAddr::V6(v6)) => v6.octets().iter().map(|o| u64::from(*o)).sum(),
        None => 0,
    }
}

/// `ip_hash` mapped onto `count` candidates.
pub fn ip_hash_index(client_ip: Option<&str>, count: usize) -> Option<usize> {
    if count == 0 {
        return None;
    }
    Some((ip_hash(client_ip) % count as u64) as usize)
}
