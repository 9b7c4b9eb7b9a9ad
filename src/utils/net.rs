use std::collections::BTreeSet;
use std::net::IpAddr;
use std::net::SocketAddr;

use crate::Error;
use crate::Result;

/// Parses a comma separated IP allowlist such as `"10.0.0.1, 10.0.0.2"`.
pub(crate) fn parse_ip_list(raw: &str) -> Result<BTreeSet<IpAddr>> {
    let mut ips = BTreeSet::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let ip = item
            .parse::<IpAddr>()
            .map_err(|_| Error::Validation(format!("invalid ip in allowlist: {item}")))?;
        ips.insert(ip);
    }
    if ips.is_empty() {
        return Err(Error::Validation("ip allowlist is empty".into()));
    }
    Ok(ips)
}

/// Resolves the caller address: `X-Real-IP`, then the first `X-Forwarded-For`
/// hop, then the socket peer.
pub(crate) fn remote_ip(
    real_ip: Option<&str>,
    forwarded_for: Option<&str>,
    peer: Option<SocketAddr>,
) -> Option<IpAddr> {
    if let Some(ip) = real_ip.and_then(|v| v.trim().parse().ok()) {
        return Some(ip);
    }
    if let Some(ip) = forwarded_for
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
    {
        return Some(ip);
    }
    peer.map(|addr| addr.ip())
}
