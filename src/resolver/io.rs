// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! The socket abstraction underneath the transport.
//!
//! The retry engine never touches operating system sockets directly.
//! It works through a [`Network`], which opens [`DatagramSocket`]s and
//! [`StreamSocket`]s. [`StdNetwork`] implements these with the Rust
//! standard library; tests substitute a scripted network.
//!
//! UDP sockets have two states, tracked by the engine as a
//! [`ConnectionMode`]. A connected socket receives only from its peer
//! and reports ICMP errors (such as port unreachable) as
//! `ConnectionRefused`, so the engine connects when it knows only one
//! server can answer. The standard library cannot dissolve a UDP
//! association, so "disconnecting" means opening a fresh socket.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{self, IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream};
use std::time::Duration;

/// The transport used for an exchange.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Transport {
    Udp,
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Udp => f.write_str("UDP"),
            Self::Tcp => f.write_str("TCP"),
        }
    }
}

/// The association state of the engine's UDP socket.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionMode {
    /// The socket may send to and receive from any address.
    Disconnected,

    /// The socket is associated with this server.
    ConnectedTo(SocketAddr),
}

/// A provider of sockets.
pub trait Network {
    type Datagram: DatagramSocket;
    type Stream: StreamSocket;

    /// Opens an unconnected datagram socket able to reach `server`.
    fn open_datagram(&mut self, server: SocketAddr) -> io::Result<Self::Datagram>;

    /// Opens a stream connection to `server`, giving up after
    /// `timeout`.
    fn connect_stream(&mut self, server: SocketAddr, timeout: Duration)
        -> io::Result<Self::Stream>;
}

/// The operations the engine needs from a UDP socket.
pub trait DatagramSocket {
    /// Associates the socket with `server`.
    fn connect(&mut self, server: SocketAddr) -> io::Result<()>;

    /// Sends a datagram to `server`. On a connected socket, `server`
    /// is the peer.
    fn send_to(&mut self, buf: &[u8], server: SocketAddr) -> io::Result<usize>;

    /// Receives a datagram, waiting at most `timeout`. Expiry is
    /// reported as an error of kind `TimedOut` or `WouldBlock`.
    fn recv_from(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<(usize, SocketAddr)>;
}

/// The operations the engine needs from a TCP connection.
pub trait StreamSocket: Read + Write {
    /// Sets the time a read or write may block.
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

////////////////////////////////////////////////////////////////////////
// STANDARD LIBRARY IMPLEMENTATION                                    //
////////////////////////////////////////////////////////////////////////

/// A [`Network`] of standard library sockets.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdNetwork;

impl Network for StdNetwork {
    type Datagram = StdDatagramSocket;
    type Stream = StdStreamSocket;

    fn open_datagram(&mut self, server: SocketAddr) -> io::Result<Self::Datagram> {
        let unspecified = match server.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        net::UdpSocket::bind(SocketAddr::new(unspecified, 0)).map(|socket| StdDatagramSocket {
            socket,
            connected: false,
        })
    }

    fn connect_stream(
        &mut self,
        server: SocketAddr,
        timeout: Duration,
    ) -> io::Result<Self::Stream> {
        let stream = TcpStream::connect_timeout(&server, timeout)?;
        stream.set_nodelay(true)?;
        Ok(StdStreamSocket(stream))
    }
}

/// A UDP socket implementation using the Rust standard library.
#[derive(Debug)]
pub struct StdDatagramSocket {
    socket: net::UdpSocket,
    connected: bool,
}

impl DatagramSocket for StdDatagramSocket {
    fn connect(&mut self, server: SocketAddr) -> io::Result<()> {
        self.socket.connect(server)?;
        self.connected = true;
        Ok(())
    }

    fn send_to(&mut self, buf: &[u8], server: SocketAddr) -> io::Result<usize> {
        if self.connected {
            self.socket.send(buf)
        } else {
            self.socket.send_to(buf, server)
        }
    }

    fn recv_from(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<(usize, SocketAddr)> {
        // A zero timeout would mean "block forever."
        self.socket
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        self.socket.recv_from(buf)
    }
}

/// A TCP connection implementation using the Rust standard library.
#[derive(Debug)]
pub struct StdStreamSocket(TcpStream);

impl Read for StdStreamSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for StdStreamSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl StreamSocket for StdStreamSocket {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        let timeout = Some(timeout.max(Duration::from_millis(1)));
        self.0.set_read_timeout(timeout)?;
        self.0.set_write_timeout(timeout)
    }
}
