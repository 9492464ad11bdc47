//! UDP datagram adapter over `std::net::UdpSocket`.
//!
//! ESP-IDF's lwIP socket layer backs `std::net` on device, so the same
//! code serves both targets.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use crate::app::ports::{DatagramBinder, DatagramSocket};

/// Binds broadcast-capable UDP sockets on all interfaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpBinder;

impl DatagramBinder for UdpBinder {
    type Socket = UdpDatagram;

    fn bind(&mut self, port: u16) -> io::Result<UdpDatagram> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))?;
        socket.set_broadcast(true)?;
        Ok(UdpDatagram { socket })
    }
}

pub struct UdpDatagram {
    socket: UdpSocket,
}

impl UdpDatagram {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl DatagramSocket for UdpDatagram {
    fn send_to(&mut self, payload: &[u8], dest: SocketAddrV4) -> io::Result<()> {
        let sent = self.socket.send_to(payload, dest)?;
        if sent != payload.len() {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "short datagram write"));
        }
        Ok(())
    }

    fn recv_from(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        // A zero read timeout means "block forever" to the socket layer.
        self.socket
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        match self.socket.recv_from(buf) {
            Ok(got) => Ok(Some(got)),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
