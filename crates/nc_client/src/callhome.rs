//! Call-home listener (§6 public API): accepts a single inbound TCP
//! connection initiated by the NETCONF server itself (RFC 8071 call home)
//! and wraps it the same way an outbound `connect_inout` would.

use crate::error::{NcError, NcResult};
use crate::transport::TcpTransport;
use std::net::TcpListener;
use std::time::Duration;

/// Binds `addr`, accepts exactly one connection within `timeout`, and
/// returns the transport ready to hand to `Client::connect_inout`-style
/// session construction. A real deployment calls this once per expected
/// peer; repeated call-home requires rebinding.
pub fn accept_callhome(addr: &str, timeout: Duration) -> NcResult<TcpTransport> {
    let listener = TcpListener::bind(addr).map_err(|err| NcError::Transport(err.to_string()))?;
    listener
        .set_nonblocking(false)
        .map_err(|err| NcError::Transport(err.to_string()))?;

    let deadline = std::time::Instant::now() + timeout;
    loop {
        match listener.accept() {
            Ok((stream, _peer)) => {
                stream
                    .set_read_timeout(Some(Duration::from_millis(1)))
                    .map_err(|err| NcError::Transport(err.to_string()))?;
                return Ok(TcpTransport::new(stream));
            }
            Err(err) => {
                if std::time::Instant::now() >= deadline {
                    return Err(NcError::WouldBlock(format!("no call-home connection on {addr}: {err}")));
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }
}
