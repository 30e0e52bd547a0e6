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

//! Resolver configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::message::MAX_UDP_SIZE;

/// The standard DNS port.
pub const DEFAULT_PORT: u16 = 53;

/// The default base timeout for one attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// The default number of passes over the server list.
pub const DEFAULT_RETRIES: u32 = 2;

/// Options controlling how a [`Resolver`](super::Resolver) sends
/// messages.
///
/// The [`Default`] implementation gives the classic stub-resolver
/// behavior: one server on the loopback address, a five-second base
/// timeout, two passes over the server list, recursion desired, UDP
/// with fallback to TCP on truncation, and all reply checks enabled.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolverConfig {
    /// The servers to query, in order.
    pub servers: Vec<SocketAddr>,

    /// The port used by [`ResolverConfig::add_server`].
    pub port: u16,

    /// The base timeout of an attempt. The first pass over the server
    /// list waits this long for each server; each later pass doubles
    /// it and divides the result among the servers.
    pub timeout: Duration,

    /// The number of passes made over the server list before giving
    /// up. Values below 1 are treated as 1.
    pub retries: u32,

    /// Whether to set the RD (recursion desired) bit in queries.
    pub recurse: bool,

    /// Whether to always use TCP.
    pub use_tcp: bool,

    /// Whether to keep a TCP connection open between sends.
    pub persistent_tcp: bool,

    /// Whether to rotate the server list by one on every send, to
    /// spread load among the servers.
    pub rotate: bool,

    /// Whether to accept UDP replies from addresses that are not in
    /// the server list.
    pub insecure_source: bool,

    /// Whether to accept replies whose question section does not match
    /// the query's.
    pub insecure_questions: bool,

    /// Whether to accept truncated UDP replies instead of retrying
    /// over TCP.
    pub ignore_truncation: bool,

    /// Whether to hand SERVFAIL, NOTIMP, and REFUSED replies to the
    /// caller instead of trying the next server.
    pub accept_rejections: bool,

    /// The largest message sent over UDP. Longer messages are sent
    /// over TCP.
    pub udp_limit: usize,
}

impl ResolverConfig {
    /// Appends a server at `ip` on the configured port.
    pub fn add_server(&mut self, ip: IpAddr) {
        self.servers.push(SocketAddr::new(ip, self.port));
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            servers: vec![SocketAddr::new(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                DEFAULT_PORT,
            )],
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            recurse: true,
            use_tcp: false,
            persistent_tcp: false,
            rotate: false,
            insecure_source: false,
            insecure_questions: false,
            ignore_truncation: false,
            accept_rejections: false,
            udp_limit: MAX_UDP_SIZE,
        }
    }
}
