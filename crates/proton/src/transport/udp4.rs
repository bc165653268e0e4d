// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP4 transport: a receive socket bound to the local endpoint and a send
//! socket connected to the peer endpoint.
//!
//! One datagram carries one bundle; no framing. The receive socket carries
//! a short read timeout so the spin loop can observe shutdown, and sets
//! reuse-address/reuse-port so several peer transports of one node may
//! share the local port.

use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportState};

/// How long a read blocks before reporting [`Error::WouldBlock`].
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Datagram transport between one local and one remote endpoint.
pub struct Udp4Transport {
    local: SocketAddr,
    remote: SocketAddr,
    recv_socket: Mutex<Option<UdpSocket>>,
    send_socket: Mutex<Option<UdpSocket>>,
    state: AtomicCell<TransportState>,
}

impl Udp4Transport {
    /// Create a disconnected transport between two endpoints.
    #[must_use]
    pub fn new(local: SocketAddr, remote: SocketAddr) -> Self {
        Self {
            local,
            remote,
            recv_socket: Mutex::new(None),
            send_socket: Mutex::new(None),
            state: AtomicCell::new(TransportState::Disconnected),
        }
    }

    /// Create a transport from schema ip/port endpoints.
    pub fn from_endpoints(
        local_ip: &str,
        local_port: u16,
        remote_ip: &str,
        remote_port: u16,
    ) -> Result<Self> {
        let local = parse_endpoint(local_ip, local_port)?;
        let remote = parse_endpoint(remote_ip, remote_port)?;
        Ok(Self::new(local, remote))
    }

    /// Local (receive) endpoint.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Remote (send) endpoint.
    #[must_use]
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    fn bind_recv_socket(&self) -> std::io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        set_reuseport(&socket)?;
        socket.bind(&self.local.into())?;
        let socket: UdpSocket = socket.into();
        socket.set_read_timeout(Some(READ_TIMEOUT))?;
        Ok(socket)
    }
}

impl Transport for Udp4Transport {
    fn state(&self) -> TransportState {
        self.state.load()
    }

    fn set_state(&self, state: TransportState) {
        self.state.store(state);
    }

    fn connect(&self) -> Result<()> {
        let mut recv = self.recv_socket.lock();
        let mut send = self.send_socket.lock();
        if recv.is_some() && send.is_some() {
            return Ok(());
        }

        let recv_socket = self
            .bind_recv_socket()
            .map_err(|e| Error::ConnectError(format!("bind {}: {}", self.local, e)))?;
        let send_socket = UdpSocket::bind(("0.0.0.0", 0))
            .and_then(|s| s.connect(self.remote).map(|()| s))
            .map_err(|e| Error::ConnectError(format!("connect {}: {}", self.remote, e)))?;

        log::debug!(
            "[UDP4] connected local={} remote={}",
            self.local,
            self.remote
        );
        *recv = Some(recv_socket);
        *send = Some(send_socket);
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.recv_socket.lock().take();
        self.send_socket.lock().take();
        log::debug!("[UDP4] disconnected local={}", self.local);
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let guard = self.recv_socket.lock();
        let socket = guard
            .as_ref()
            .ok_or_else(|| Error::InvalidState("udp4 socket not connected".into()))?;
        match socket.recv(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Err(Error::WouldBlock)
            }
            Err(e) => Err(Error::ReadError(e.to_string())),
        }
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        let guard = self.send_socket.lock();
        let socket = guard
            .as_ref()
            .ok_or_else(|| Error::InvalidState("udp4 socket not connected".into()))?;
        let sent = socket
            .send(buf)
            .map_err(|e| Error::WriteError(e.to_string()))?;
        if sent != buf.len() {
            return Err(Error::WriteError(format!(
                "short write: {} of {} bytes",
                sent,
                buf.len()
            )));
        }
        Ok(sent)
    }
}

/// Set SO_REUSEPORT so several peer transports of one node can share the
/// local receive port.
#[cfg(unix)]
fn set_reuseport(socket: &Socket) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let fd = socket.as_raw_fd();
    let optval: libc::c_int = 1;
    // SAFETY: setsockopt FFI with valid fd, standard socket option, and correctly sized optval pointer
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEPORT,
            std::ptr::addr_of!(optval).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn parse_endpoint(ip: &str, port: u16) -> Result<SocketAddr> {
    format!("{}:{}", ip, port)
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("invalid IPv4 endpoint {}:{}", ip, port)))
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(port_a: u16, port_b: u16) -> (Udp4Transport, Udp4Transport) {
        let a = Udp4Transport::from_endpoints("127.0.0.1", port_a, "127.0.0.1", port_b)
            .expect("endpoints");
        let b = Udp4Transport::from_endpoints("127.0.0.1", port_b, "127.0.0.1", port_a)
            .expect("endpoints");
        (a, b)
    }

    #[test]
    fn test_starts_disconnected() {
        let (a, _) = pair(18511, 18512);
        assert_eq!(a.state(), TransportState::Disconnected);
        assert_eq!(a.frame_overhead(), 0);
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        assert!(matches!(
            Udp4Transport::from_endpoints("not-an-ip", 1, "127.0.0.1", 2),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_read_before_connect() {
        let (a, _) = pair(18513, 18514);
        let mut buf = [0u8; 16];
        assert!(matches!(a.read(&mut buf), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_datagram_roundtrip() {
        let (a, b) = pair(18515, 18516);
        a.connect().expect("connect a");
        b.connect().expect("connect b");

        let payload = b"proton datagram";
        let sent = a.write(payload).expect("write");
        assert_eq!(sent, payload.len());

        let mut buf = [0u8; 64];
        let n = b.read(&mut buf).expect("read");
        assert_eq!(&buf[..n], payload);
    }

    #[test]
    fn test_read_times_out_with_would_block() {
        let (a, _) = pair(18517, 18518);
        a.connect().expect("connect");
        let mut buf = [0u8; 16];
        assert!(matches!(a.read(&mut buf), Err(Error::WouldBlock)));
    }

    #[test]
    fn test_reconnect_after_disconnect() {
        let (a, _) = pair(18519, 18520);
        a.connect().expect("first connect");
        a.disconnect().expect("disconnect");
        a.connect().expect("second connect");
    }
}
