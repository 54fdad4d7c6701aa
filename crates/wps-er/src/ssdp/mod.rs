// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SSDP discovery plumbing.
//!
//! Two UDP sockets carry all discovery traffic: a multicast-sender socket
//! bound to the local interface (M-SEARCH out, unicast replies in) and a
//! listener on the well-known SSDP port for unsolicited NOTIFY
//! advertisements. Both are nonblocking and polled by the event loop.

mod parser;

pub use parser::{parse_packet, SsdpMessage, SsdpOrigin};

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

/// UPnP multicast group.
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// UPnP discovery port.
pub const SSDP_PORT: u16 = 1900;

/// WFA device URN advertised by WPS-capable APs.
pub const WFA_DEVICE_URN: &str = "urn:schemas-wifialliance-org:device:WFADevice:1";

/// WFA WLAN configuration service URN.
pub const WFA_SERVICE_URN: &str = "urn:schemas-wifialliance-org:service:WFAWLANConfig:1";

/// Largest SSDP datagram we accept.
pub const SSDP_MAX_READ: usize = 2048;

/// The discovery probe sent on startup and on the periodic re-search.
pub const MSEARCH: &str = "M-SEARCH * HTTP/1.1\r\n\
                           HOST: 239.255.255.250:1900\r\n\
                           MAN: \"ssdp:discover\"\r\n\
                           MX: 3\r\n\
                           ST: urn:schemas-wifialliance-org:device:WFADevice:1\r\n\
                           \r\n";

/// Open the multicast-sender socket bound to the local interface.
///
/// M-SEARCH probes leave through this socket and the unicast 200 OK
/// replies come back on it. The multicast egress interface is pinned to
/// `local_ip` so multi-homed hosts probe the configured network only.
pub fn open_multicast_sock(local_ip: Ipv4Addr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.bind(&SocketAddrV4::new(local_ip, 0).into())?;
    socket.set_multicast_if_v4(&local_ip)?;
    socket.set_multicast_ttl_v4(2)?;
    socket.set_nonblocking(true)?;

    let socket: UdpSocket = socket.into();
    log::debug!(
        "[ssdp] multicast sender bound to {}",
        socket.local_addr()?
    );
    Ok(socket)
}

/// Open the SSDP listener: port 1900 with group membership on `local_ip`.
///
/// Bound with address reuse so the registrar coexists with other SSDP
/// stacks on the host.
pub fn open_listener_sock(local_ip: Ipv4Addr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, SSDP_PORT).into())?;
    socket.set_nonblocking(true)?;

    let socket: UdpSocket = socket.into();
    socket.join_multicast_v4(&SSDP_MULTICAST_ADDR, &local_ip)?;
    log::debug!(
        "[ssdp] listener on {}:{} joined {} via {}",
        Ipv4Addr::UNSPECIFIED,
        SSDP_PORT,
        SSDP_MULTICAST_ADDR,
        local_ip
    );
    Ok(socket)
}
