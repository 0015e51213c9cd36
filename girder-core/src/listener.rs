// Listener binding with port fallback

use crate::error::{Error, Result};
use crate::logging::{debug, warn};
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, TcpListener, ToSocketAddrs};

/// Bind `host:port`, returning the listener and the port actually bound.
///
/// Without `auto_port` an occupied port fails at once with
/// [`Error::AddressInUse`]. With it, `port, port + 1, …` are tried for
/// `max_attempts` attempts in total before [`Error::BindExhausted`].
/// Port 0 asks the OS for any free port.
pub fn bind_with_fallback(
    host: &str,
    port: u16,
    auto_port: bool,
    max_attempts: u32,
) -> Result<(TcpListener, u16)> {
    let ip = resolve_host(host)?;
    let attempts = if auto_port { max_attempts.max(1) } else { 1 };

    for attempt in 0..attempts {
        let candidate = u32::from(port) + attempt;
        let Ok(candidate) = u16::try_from(candidate) else {
            break;
        };
        let addr = SocketAddr::new(ip, candidate);

        match TcpListener::bind(addr) {
            Ok(listener) => {
                let bound = listener.local_addr()?.port();
                debug!(address = %addr, port = bound, attempt, "Listener bound");
                return Ok((listener, bound));
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                if !auto_port {
                    return Err(Error::AddressInUse(addr.to_string()));
                }
                warn!(address = %addr, next_port = u32::from(candidate) + 1, "Port in use, trying next");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::BindExhausted {
        start: port,
        end: u32::from(port) + attempts,
        attempts,
    })
}

fn resolve_host(host: &str) -> Result<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    (host, 0)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .map(|addr| addr.ip())
        .ok_or_else(|| Error::InvalidAddress(host.to_string()))
}
