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

//! The resolver: server list, sockets, and the exchange of messages.
//!
//! A [`Resolver`] holds everything one logical resolver needs between
//! calls: its [`ResolverConfig`], the sockets it keeps open, its source
//! of query IDs, and its clock. It is used by one caller at a time;
//! every operation runs to completion on the calling thread. Callers
//! needing concurrency create one `Resolver` per thread.

mod config;
mod error;
mod io;
#[cfg(test)]
pub(crate) mod mock;
mod query;
mod send;

use std::mem;
use std::net::SocketAddr;

pub use self::io::{
    ConnectionMode, DatagramSocket, Network, StdDatagramSocket, StdNetwork, StdStreamSocket,
    StreamSocket, Transport,
};
pub use config::{ResolverConfig, DEFAULT_PORT, DEFAULT_RETRIES, DEFAULT_TIMEOUT};
pub use error::{Error, Result};
pub use send::queries_match;

pub use crate::message::tsig::{Clock, FixedClock, SystemClock};

////////////////////////////////////////////////////////////////////////
// QUERY IDS                                                          //
////////////////////////////////////////////////////////////////////////

/// A source of message IDs.
pub trait QueryIdSource {
    fn next_id(&mut self) -> u16;
}

/// A [`QueryIdSource`] that counts up from its starting point.
#[derive(Clone, Debug)]
pub struct CountingIds(u16);

impl CountingIds {
    pub fn starting_at(id: u16) -> Self {
        Self(id)
    }

    /// Starts counting at a random ID.
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl QueryIdSource for CountingIds {
    fn next_id(&mut self) -> u16 {
        let id = self.0;
        self.0 = self.0.wrapping_add(1);
        id
    }
}

impl<F> QueryIdSource for F
where
    F: FnMut() -> u16,
{
    fn next_id(&mut self) -> u16 {
        self()
    }
}

////////////////////////////////////////////////////////////////////////
// RESOLVER STATE                                                     //
////////////////////////////////////////////////////////////////////////

/// A stub resolver.
///
/// The resolver is generic over the [`Network`] providing its sockets;
/// [`Resolver::new`] uses the standard library.
pub struct Resolver<N: Network = StdNetwork> {
    config: ResolverConfig,
    network: N,
    ids: Box<dyn QueryIdSource>,
    clock: Box<dyn Clock>,
    udp: Option<UdpState<N::Datagram>>,
    tcp: Option<TcpState<N::Stream>>,
    bad_servers: Vec<SocketAddr>,
}

/// The UDP socket and its association.
struct UdpState<S> {
    socket: S,
    mode: ConnectionMode,
    ipv6: bool,
}

/// An open TCP connection and its peer.
struct TcpState<S> {
    stream: S,
    peer: SocketAddr,
}

impl Resolver<StdNetwork> {
    /// Creates a resolver that uses standard library sockets.
    pub fn new(config: ResolverConfig) -> Self {
        Self::with_network(config, StdNetwork)
    }
}

impl<N: Network> Resolver<N> {
    /// Creates a resolver that gets its sockets from `network`. Query
    /// IDs count up from a random starting point, and time is read from
    /// the system clock.
    pub fn with_network(config: ResolverConfig, network: N) -> Self {
        Self {
            config,
            network,
            ids: Box::new(CountingIds::random()),
            clock: Box::new(SystemClock),
            udp: None,
            tcp: None,
            bad_servers: Vec::new(),
        }
    }

    /// Replaces the source of query IDs.
    pub fn set_id_source(&mut self, ids: impl QueryIdSource + 'static) {
        self.ids = Box::new(ids);
    }

    /// Replaces the clock used for TSIG.
    pub fn set_clock(&mut self, clock: impl Clock + 'static) {
        self.clock = Box::new(clock);
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Replaces the configuration, closing any open sockets.
    pub fn set_config(&mut self, config: ResolverConfig) {
        self.close();
        self.config = config;
    }

    pub fn servers(&self) -> &[SocketAddr] {
        &self.config.servers
    }

    /// Replaces the server list, returning the old one. Open sockets
    /// are closed, since they may be associated with old servers.
    pub fn set_servers(&mut self, servers: Vec<SocketAddr>) -> Vec<SocketAddr> {
        self.close();
        mem::replace(&mut self.config.servers, servers)
    }

    /// Returns the servers that failed during the last send, in the
    /// order they failed.
    pub fn bad_servers(&self) -> &[SocketAddr] {
        &self.bad_servers
    }

    /// Returns the association of the UDP socket, if one is open.
    pub fn connection_mode(&self) -> Option<ConnectionMode> {
        self.udp.as_ref().map(|udp| udp.mode)
    }

    /// Closes any open sockets.
    pub fn close(&mut self) {
        self.udp = None;
        self.tcp = None;
    }

    /// Returns the next query ID.
    pub fn next_id(&mut self) -> u16 {
        self.ids.next_id()
    }

    /// Returns the current time, in seconds since the UNIX epoch.
    pub fn now(&self) -> u64 {
        self.clock.now()
    }
}
