use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use tracing::debug;

/// Resolves which local address a remote host can reach us on.
pub trait NetworkLocator: Send + Sync {
    fn reachable_address_for(&self, remote: IpAddr) -> Option<IpAddr>;
}

/// Asks the OS routing table by "connecting" a UDP socket to the remote.
///
/// No packet is sent; `connect` on UDP only selects the route and source
/// address.
#[derive(Debug, Default, Clone, Copy)]
pub struct RouteLocator;

impl NetworkLocator for RouteLocator {
    fn reachable_address_for(&self, remote: IpAddr) -> Option<IpAddr> {
        let bind_addr: SocketAddr = match remote {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };

        let socket = UdpSocket::bind(bind_addr).ok()?;
        if let Err(e) = socket.connect((remote, 9)) {
            debug!("No route to {}: {}", remote, e);
            return None;
        }

        let local = socket.local_addr().ok()?.ip();
        if local.is_unspecified() {
            return None;
        }
        debug!("Reachable address for {} is {}", remote, local);
        Some(local)
    }
}
