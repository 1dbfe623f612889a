//! Address discovery and startup announcement

use crate::settings::Settings;
use cuewire_osc::{OscSender, OscValue, SendError};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use tracing::info;

/// Local IP the OS would use to reach `peer`.
///
/// Connecting a UDP socket sends nothing; it only picks a route.
pub fn local_ip_toward(peer: SocketAddr) -> io::Result<IpAddr> {
    let local = if peer.is_ipv4() {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    } else {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
    };
    let socket = UdpSocket::bind(local)?;
    socket.connect(peer)?;
    Ok(socket.local_addr()?.ip())
}

/// Best guess at this machine's LAN address, loopback if there is no route
pub fn local_ip() -> IpAddr {
    local_ip_toward(SocketAddr::from(([192, 168, 255, 255], 9)))
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Broadcast the announce message from `settings` to the send port.
///
/// The payload is this machine's IP as a string so the peer can retarget.
pub fn announce(settings: &Settings) -> Result<String, SendError> {
    let announce = settings.announce();
    let address = announce.message_address();
    let ip = local_ip().to_string();
    let port = settings.send().port;

    OscSender::broadcast(port, &address, Some(&OscValue::String(ip.clone())))?;
    info!("Announced {} as {} on port {}", address, ip, port);
    Ok(address)
}
