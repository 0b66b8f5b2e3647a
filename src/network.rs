//! Ephemeral listen endpoints for daemons.
//!
//! Hosts are drawn from 127.0.0.0/8 so concurrently running tests rarely
//! share an address, and ports are confirmed free by binding them once.

use nix::ifaddrs::getifaddrs;
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};
use tracing::debug;

use crate::error::Result;

/// Lowest port handed out when no base is given
pub const PORT_RANGE_START: u16 = 1024;
/// Start of the kernel's dynamic port range (exclusive upper bound here)
pub const PORT_RANGE_END: u16 = 32768;

const MAX_BIND_ATTEMPTS: usize = 1000;

/// Random loopback address `127.a.b.c` with `a, b` in [1, 255) and `c` in [2, 255).
pub fn ephemeral_host() -> Ipv4Addr {
    let mut rng = rand::thread_rng();
    Ipv4Addr::new(
        127,
        rng.gen_range(1..255),
        rng.gen_range(1..255),
        rng.gen_range(2..255),
    )
}

fn random_port() -> u16 {
    rand::thread_rng().gen_range(PORT_RANGE_START..PORT_RANGE_END)
}

/// Find a free TCP port on `host` (a random loopback host when `None`).
///
/// `base` is tried first; 0 means pick a random port. On bind failure a new
/// random port is tried. The port is released before returning.
pub fn ephemeral_port(host: Option<Ipv4Addr>, base: u16) -> Result<u16> {
    let host = host.unwrap_or_else(ephemeral_host);
    let mut port = if base == 0 { random_port() } else { base };

    let mut last_err = None;
    for _ in 0..MAX_BIND_ATTEMPTS {
        match TcpListener::bind(SocketAddrV4::new(host, port)) {
            Ok(listener) => {
                let confirmed = listener.local_addr()?.port();
                debug!(target: "network", %host, port = confirmed, "ephemeral port");
                return Ok(confirmed);
            }
            Err(e) => {
                debug!(target: "network", %host, port, error = %e, "port busy, retrying");
                last_err = Some(e);
                port = random_port();
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::AddrInUse, "no free port"))
        .into())
}

/// First IPv4 address configured on `iface`.
pub fn interface_ipv4(iface: &str) -> Result<Ipv4Addr> {
    let addrs = getifaddrs().map_err(io::Error::from)?;
    for ifaddr in addrs {
        if ifaddr.interface_name != iface {
            continue;
        }
        if let Some(sin) = ifaddr.address.as_ref().and_then(|a| a.as_sockaddr_in()) {
            return Ok(Ipv4Addr::from(sin.ip()));
        }
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("interface '{}' has no IPv4 address", iface),
    )
    .into())
}

/// Listen endpoint passed to a daemon with `-l`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Endpoint {
    pub interface: String,
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.interface, self.port)
    }
}

/// Ephemeral endpoint on `iface`: the port is confirmed free on the
/// interface's IPv4 address and rendered as `<iface>:<port>`.
pub fn ephemeral_address(iface: &str) -> Result<Endpoint> {
    let ip = interface_ipv4(iface)?;
    let port = ephemeral_port(Some(ip), 0)?;
    Ok(Endpoint {
        interface: iface.to_string(),
        ip,
        port,
    })
}
