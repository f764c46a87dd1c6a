use ipnet::IpNet;
use std::net::IpAddr;

/// Returns true for addresses in 169.254.0.0/16 or fe80::/10.
///
/// Link-local destinations (cloud metadata endpoints, node-local agents) are
/// not reachable through pod networking and never contribute to a policy.
pub fn is_link_local(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

/// The single-address network for `addr` (a /32 or a /128).
pub fn host_net(addr: IpAddr) -> IpNet {
    IpNet::from(addr)
}
