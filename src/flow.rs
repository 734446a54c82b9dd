use std::fmt;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Endpoint { ip, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, self.port),
            IpAddr::V6(ip) => write!(f, "[{}]:{}", ip, self.port),
        }
    }
}

/// Direction independent identifier of one TCP connection.
/// `a` is always the lower endpoint, so both directions map to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub a: Endpoint,
    pub b: Endpoint,
}

impl FlowKey {
    pub fn new(src: Endpoint, dst: Endpoint) -> Self {
        if endpoint_key(&src) <= endpoint_key(&dst) {
            FlowKey { a: src, b: dst }
        } else {
            FlowKey { a: dst, b: src }
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.a, self.b)
    }
}

fn endpoint_key(endpoint: &Endpoint) -> (u8, [u8; 16], u16) {
    let (version, addr) = ip_key(endpoint.ip);
    (version, addr, endpoint.port)
}

fn ip_key(ip: IpAddr) -> (u8, [u8; 16]) {
    match ip {
        IpAddr::V4(addr) => {
            let mut bytes = [0u8; 16];
            bytes[12..].copy_from_slice(&addr.octets());
            (4, bytes)
        }
        IpAddr::V6(addr) => (6, addr.octets()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn ep(a: u8, port: u16) -> Endpoint {
        Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, a)), port)
    }

    #[test]
    fn flow_key_is_directionless() {
        let client = ep(1, 49152);
        let server = ep(2, 80);
        let key_ab = FlowKey::new(client, server);
        let key_ba = FlowKey::new(server, client);
        assert_eq!(key_ab, key_ba);
        assert_eq!(key_ab.a, client);
        assert_eq!(key_ab.to_string(), "10.0.0.1:49152-10.0.0.2:80");
    }

    #[test]
    fn same_host_orders_by_port() {
        let key = FlowKey::new(ep(1, 8080), ep(1, 80));
        assert_eq!(key.a.port, 80);
        assert_eq!(key.b.port, 8080);
    }

    #[test]
    fn flow_key_orders_ipv4_before_ipv6() {
        let v4 = ep(1, 443);
        let v6 = Endpoint::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 443);
        let key = FlowKey::new(v6, v4);
        assert_eq!(key.a, v4);
        assert_eq!(key.b, v6);
        assert_eq!(v6.to_string(), "[::1]:443");
    }
}
