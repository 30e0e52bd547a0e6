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

//! The transport and retry engine.
//!
//! [`Resolver::send`] makes up to `retries` passes over the server
//! list. Each server gets one exchange per pass, over UDP unless TCP is
//! configured or the message is too long for a datagram. The timeout
//! for an exchange is the base timeout doubled for every earlier pass,
//! divided among the servers after the first pass, and never less than
//! one second.
//!
//! A UDP exchange waits for a reply that carries the query's ID, comes
//! from a configured server, and answers the same questions; anything
//! else is discarded. A truncated UDP reply moves the exchange, and
//! the rest of the call, to TCP without using up a pass. TCP gets a
//! single pass over the servers.
//!
//! A SERVFAIL, NOTIMP, or REFUSED reply marks its server bad for the
//! rest of the call. Every server that fails in any way is listed in
//! the report returned by [`Resolver::bad_servers`].

use std::io::{self, Read};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use super::io::{ConnectionMode, DatagramSocket, Network, StreamSocket, Transport};
use super::{Error, Resolver, Result, TcpState, UdpState};
use crate::message::constants::{ID_END, ID_START, TC_BYTE, TC_MASK};
use crate::message::{Opcode, Rcode, Reader, HEADER_SIZE, MAX_MESSAGE_SIZE};

/// The shortest time an exchange may wait for a reply.
const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// How an exchange with one server ended.
#[derive(Debug)]
enum Outcome {
    Reply(usize),
    Truncated,
    Rejected(Rcode),
    TimedOut,
    Failed(Error),
}

/// The reply checks in force for a call.
#[derive(Clone, Copy)]
struct Checks {
    insecure_source: bool,
    insecure_questions: bool,
    ignore_truncation: bool,
    accept_rejections: bool,
}

impl<N: Network> Resolver<N> {
    /// Sends the message `query` and receives the reply into `answer`,
    /// returning the reply's length.
    ///
    /// If a TCP reply is longer than `answer`, the part that fits is
    /// returned with the TC bit set.
    pub fn send(&mut self, query: &[u8], answer: &mut [u8]) -> Result<usize> {
        if self.config.servers.is_empty() {
            return Err(Error::NoServers);
        } else if query.len() < HEADER_SIZE || query.len() > MAX_MESSAGE_SIZE {
            return Err(Error::Format);
        } else if answer.len() < HEADER_SIZE {
            return Err(Error::NoSpace);
        }

        self.bad_servers.clear();
        if self.config.rotate {
            self.config.servers.rotate_left(1);
        }
        let servers = self.config.servers.clone();
        let result = self.send_to_servers(query, answer, &servers);
        if !self.config.persistent_tcp {
            self.tcp = None;
        }
        result
    }

    fn send_to_servers(
        &mut self,
        query: &[u8],
        answer: &mut [u8],
        servers: &[SocketAddr],
    ) -> Result<usize> {
        let mut use_tcp = self.config.use_tcp || query.len() > self.config.udp_limit;
        let mut rejected = Vec::new();
        let mut last_rejection = None;
        let mut last_error = None;
        let mut got_somewhere = false;

        for attempt in 0..self.config.retries.max(1) {
            for (index, &server) in servers.iter().enumerate() {
                if rejected.contains(&server) {
                    trace!("skipping {}, which rejected the query", server);
                    continue;
                }

                let mut outcome = if use_tcp {
                    self.send_vc(query, answer, server)
                } else {
                    self.send_dg(query, answer, servers, server, attempt, index)
                };
                if let Outcome::Truncated = outcome {
                    debug!("reply from {} was truncated; retrying over TCP", server);
                    use_tcp = true;
                    self.udp = None;
                    outcome = self.send_vc(query, answer, server);
                }

                match outcome {
                    Outcome::Reply(len) => return Ok(len),
                    Outcome::Truncated => (),
                    Outcome::Rejected(rcode) => {
                        debug!("{} replied {}; marking it bad", server, rcode);
                        rejected.push(server);
                        last_rejection = Some(rcode);
                    }
                    Outcome::TimedOut => {
                        debug!("no reply from {} (attempt {})", server, attempt + 1);
                        got_somewhere = true;
                    }
                    Outcome::Failed(e) => {
                        debug!("exchange with {} failed: {}", server, e);
                        last_error = Some(e);
                    }
                }
                if !self.bad_servers.contains(&server) {
                    self.bad_servers.push(server);
                }
            }
            if use_tcp {
                break;
            }
        }

        if let Some(rcode) = last_rejection {
            Err(Error::from_rcode(rcode).unwrap_or(Error::ServerFailure))
        } else if use_tcp {
            Err(last_error.unwrap_or(Error::Timeout))
        } else if got_somewhere {
            Err(Error::Timeout)
        } else {
            Err(Error::ConnectionRefused)
        }
    }

    fn checks(&self) -> Checks {
        Checks {
            insecure_source: self.config.insecure_source,
            insecure_questions: self.config.insecure_questions,
            ignore_truncation: self.config.ignore_truncation,
            accept_rejections: self.config.accept_rejections,
        }
    }

    ////////////////////////////////////////////////////////////////////
    // UDP                                                            //
    ////////////////////////////////////////////////////////////////////

    /// Performs one UDP exchange with `server`, the `index`th entry of
    /// `servers`.
    fn send_dg(
        &mut self,
        query: &[u8],
        answer: &mut [u8],
        servers: &[SocketAddr],
        server: SocketAddr,
        attempt: u32,
        index: usize,
    ) -> Outcome {
        let checks = self.checks();
        let timeout = attempt_timeout(self.config.timeout, attempt, servers.len());

        // Connecting only makes sense when no other server could be
        // sending us a late reply.
        let connect = servers.len() == 1 || (attempt == 0 && index == 0);
        let udp = match self.prepare_udp(server, connect) {
            Ok(udp) => udp,
            Err(e) => {
                warn!("failed to set up a UDP socket for {}: {}", server, e);
                return io_outcome(e);
            }
        };

        let deadline = Instant::now() + timeout;
        if let Err(e) = udp.socket.send_to(query, server) {
            return io_outcome(e);
        }
        trace!("sent {} octets to {} over UDP", query.len(), server);

        loop {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => return Outcome::TimedOut,
            };
            let (len, source) = match udp.socket.recv_from(answer, remaining) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return io_outcome(e),
            };

            if len < HEADER_SIZE {
                debug!("undersized reply ({} octets) from {}", len, source);
                return Outcome::Failed(Error::Format);
            } else if answer[ID_START..ID_END] != query[ID_START..ID_END] {
                trace!("discarding reply with the wrong ID from {}", source);
            } else if !checks.insecure_source && !servers.contains(&source) {
                trace!("discarding reply from unknown source {}", source);
            } else if !checks.insecure_questions && !queries_match(query, &answer[..len]) {
                trace!("discarding reply for other questions from {}", source);
            } else {
                return classify(checks, &answer[..len], Transport::Udp);
            }
        }
    }

    /// Readies the UDP socket for an exchange with `server`, connected
    /// to it or not. A socket connected elsewhere (or of the wrong
    /// address family) is replaced with a fresh one.
    fn prepare_udp(
        &mut self,
        server: SocketAddr,
        connect: bool,
    ) -> io::Result<&mut UdpState<N::Datagram>> {
        let wanted = if connect {
            ConnectionMode::ConnectedTo(server)
        } else {
            ConnectionMode::Disconnected
        };
        let ipv6 = server.is_ipv6();

        let udp = match self.udp.take() {
            Some(udp)
                if udp.ipv6 == ipv6
                    && (udp.mode == wanted || udp.mode == ConnectionMode::Disconnected) =>
            {
                self.udp.insert(udp)
            }
            _ => {
                let socket = self.network.open_datagram(server)?;
                self.udp.insert(UdpState {
                    socket,
                    mode: ConnectionMode::Disconnected,
                    ipv6,
                })
            }
        };

        if udp.mode != wanted {
            trace!("connecting the UDP socket to {}", server);
            udp.socket.connect(server)?;
            udp.mode = wanted;
        }
        Ok(udp)
    }

    ////////////////////////////////////////////////////////////////////
    // TCP                                                            //
    ////////////////////////////////////////////////////////////////////

    /// Performs one TCP exchange with `server`. If a reused connection
    /// turns out to have been closed by the server, the exchange is
    /// tried once more on a new connection.
    fn send_vc(&mut self, query: &[u8], answer: &mut [u8], server: SocketAddr) -> Outcome {
        let checks = self.checks();
        let timeout = self.config.timeout;
        let mut reconnected = false;
        loop {
            let (tcp, reused) = match self.tcp_connection(server, timeout) {
                Ok(connection) => connection,
                Err(e) => return io_outcome(e),
            };
            match tcp_round_trip(&mut tcp.stream, query, answer, timeout) {
                Ok(len) => return classify(checks, &answer[..len], Transport::Tcp),
                Err(e) => {
                    self.tcp = None;
                    if reused && !reconnected && is_reset(&e) {
                        debug!("connection to {} was closed; reconnecting", server);
                        reconnected = true;
                    } else {
                        return io_outcome(e);
                    }
                }
            }
        }
    }

    /// Returns a TCP connection to `server` and whether it was reused.
    fn tcp_connection(
        &mut self,
        server: SocketAddr,
        timeout: Duration,
    ) -> io::Result<(&mut TcpState<N::Stream>, bool)> {
        match self.tcp.take() {
            Some(tcp) if tcp.peer == server => Ok((self.tcp.insert(tcp), true)),
            _ => {
                trace!("connecting to {} over TCP", server);
                let stream = self.network.connect_stream(server, timeout)?;
                Ok((self.tcp.insert(TcpState { stream, peer: server }), false))
            }
        }
    }
}

/// Writes the length-prefixed `query` to `stream` and reads the reply
/// with the same ID into `answer`. A reply too long for `answer` is
/// truncated, with the TC bit set, and the rest is read and discarded
/// so that the connection stays in step.
fn tcp_round_trip<S: StreamSocket>(
    stream: &mut S,
    query: &[u8],
    answer: &mut [u8],
    timeout: Duration,
) -> io::Result<usize> {
    stream.set_timeout(timeout)?;
    let mut framed = Vec::with_capacity(query.len() + 2);
    framed.extend_from_slice(&(query.len() as u16).to_be_bytes());
    framed.extend_from_slice(query);
    stream.write_all(&framed)?;
    stream.flush()?;

    loop {
        let mut prefix = [0; 2];
        stream.read_exact(&mut prefix)?;
        let reply_len = u16::from_be_bytes(prefix) as usize;
        if reply_len < HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "undersized reply",
            ));
        }

        let len = reply_len.min(answer.len());
        stream.read_exact(&mut answer[..len])?;
        if reply_len > len {
            let excess = (reply_len - len) as u64;
            let drained = io::copy(&mut Read::by_ref(stream).take(excess), &mut io::sink())?;
            if drained < excess {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
            answer[TC_BYTE] |= TC_MASK;
        }

        if answer[ID_START..ID_END] == query[ID_START..ID_END] {
            return Ok(len);
        }
        trace!("discarding TCP reply with the wrong ID");
    }
}

/// Decides what a reply that passed the checks means.
fn classify(checks: Checks, reply: &[u8], transport: Transport) -> Outcome {
    let reader = match Reader::try_from(reply) {
        Ok(reader) => reader,
        Err(_) => return Outcome::Failed(Error::Format),
    };
    let rcode = reader.rcode();
    if matches!(rcode, Rcode::ServFail | Rcode::NotImp | Rcode::Refused)
        && !checks.accept_rejections
    {
        Outcome::Rejected(rcode)
    } else if transport == Transport::Udp && reader.tc() && !checks.ignore_truncation {
        Outcome::Truncated
    } else {
        Outcome::Reply(reply.len())
    }
}

fn io_outcome(e: io::Error) -> Outcome {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Outcome::TimedOut,
        io::ErrorKind::InvalidData => Outcome::Failed(Error::Format),
        _ => Outcome::Failed(e.into()),
    }
}

fn is_reset(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

/// Computes the timeout of an exchange on pass `attempt`.
pub(super) fn attempt_timeout(base: Duration, attempt: u32, n_servers: usize) -> Duration {
    let mut timeout = base.saturating_mul(1 << attempt.min(16));
    if attempt > 0 {
        timeout /= n_servers.clamp(1, u32::MAX as usize) as u32;
    }
    timeout.max(MIN_ATTEMPT_TIMEOUT)
}

/// Returns whether `reply` answers exactly the questions of `query`,
/// in any order. Replies to UPDATE messages need not echo the zone
/// section. Malformed messages never match.
pub fn queries_match(query: &[u8], reply: &[u8]) -> bool {
    let (mut query, mut reply) = match (Reader::try_from(query), Reader::try_from(reply)) {
        (Ok(query), Ok(reply)) => (query, reply),
        _ => return false,
    };
    if query.opcode() == Opcode::Update && reply.opcode() == Opcode::Update {
        return true;
    } else if query.qdcount() != reply.qdcount() {
        return false;
    }

    let mut reply_questions = Vec::with_capacity(reply.qdcount() as usize);
    for _ in 0..reply.qdcount() {
        match reply.read_question() {
            Ok(question) => reply_questions.push(question),
            Err(_) => return false,
        }
    }
    (0..query.qdcount()).all(|_| {
        let question = match query.read_question() {
            Ok(question) => question,
            Err(_) => return false,
        };
        match reply_questions.iter().position(|q| *q == question) {
            Some(i) => {
                reply_questions.swap_remove(i);
                true
            }
            None => false,
        }
    })
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use lazy_static::lazy_static;

    use super::super::mock::{build_reply, MockNetwork, Reaction, ReplyRecord, Sent};
    use super::super::{CountingIds, ResolverConfig};
    use super::*;
    use crate::message::{compose_query, Message, Question, Section, Writer};
    use crate::rr::{Class, Type};

    lazy_static! {
        static ref S1: SocketAddr = "192.0.2.1:53".parse().unwrap();
        static ref S2: SocketAddr = "192.0.2.2:53".parse().unwrap();
        static ref S3: SocketAddr = "[2001:db8::3]:53".parse().unwrap();
        static ref STRANGER: SocketAddr = "198.51.100.7:53".parse().unwrap();
    }

    fn resolver(servers: &[SocketAddr], network: MockNetwork) -> Resolver<MockNetwork> {
        let config = ResolverConfig {
            servers: servers.to_vec(),
            ..Default::default()
        };
        let mut resolver = Resolver::with_network(config, network);
        resolver.set_id_source(CountingIds::starting_at(1));
        resolver
    }

    fn query_for(name: &str, id: u16) -> Vec<u8> {
        let question = Question::new(name.parse().unwrap(), Type::A, Class::IN);
        let mut buf = [0; 512];
        let len = compose_query(&mut buf, id, Opcode::Query, &question, true, None).unwrap();
        buf[..len].to_vec()
    }

    fn a_reply(query: &[u8]) -> Vec<u8> {
        let record = ReplyRecord::new(Section::Answer, "www.example.test.", Type::A, b"\xc0\x00\x02\x01");
        build_reply(query, Rcode::NoError, &[record])
    }

    fn servers_of(sent: &[Sent]) -> Vec<SocketAddr> {
        sent.iter().map(|s| s.server).collect()
    }

    #[test]
    fn every_server_is_tried_on_every_pass() {
        let network = MockNetwork::new(|_, _, _| Reaction::Drop);
        let mut resolver = resolver(&[*S1, *S2, *S3], network.clone());
        let mut answer = [0; 512];
        let result = resolver.send(&query_for("www.example.test.", 1), &mut answer);
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(
            servers_of(&network.sent()),
            vec![*S1, *S2, *S3, *S1, *S2, *S3]
        );
        assert_eq!(resolver.bad_servers(), &[*S1, *S2, *S3]);
    }

    #[test]
    fn second_server_answers_when_first_drops() {
        let network = MockNetwork::new(|server, _, query| {
            if server == *S1 {
                Reaction::Drop
            } else {
                Reaction::reply(server, a_reply(query))
            }
        });
        let mut resolver = resolver(&[*S1, *S2], network.clone());
        let mut answer = [0; 512];
        let len = resolver
            .send(&query_for("www.example.test.", 1), &mut answer)
            .unwrap();
        let message = Message::decode(&answer[..len]).unwrap();
        assert_eq!(message.answers.len(), 1);
        assert_eq!(message.answers[0].rdata, b"\xc0\x00\x02\x01");
        assert_eq!(resolver.bad_servers(), &[*S1]);

        // Only the first exchange of the first pass is connected.
        let sent = network.sent();
        assert_eq!(servers_of(&sent), vec![*S1, *S2]);
        assert!(sent[0].connected);
        assert!(!sent[1].connected);
        assert_eq!(resolver.connection_mode(), Some(ConnectionMode::Disconnected));
    }

    #[test]
    fn single_server_socket_is_connected() {
        let network = MockNetwork::new(|server, _, query| Reaction::reply(server, a_reply(query)));
        let mut resolver = resolver(&[*S1], network);
        let mut answer = [0; 512];
        resolver
            .send(&query_for("www.example.test.", 1), &mut answer)
            .unwrap();
        assert_eq!(resolver.connection_mode(), Some(ConnectionMode::ConnectedTo(*S1)));
    }

    #[test]
    fn unreachable_servers_are_refused() {
        let network = MockNetwork::new(|_, _, _| Reaction::Refuse);
        let mut resolver = resolver(&[*S1], network.clone());
        let mut answer = [0; 512];
        let result = resolver.send(&query_for("www.example.test.", 1), &mut answer);
        assert!(matches!(result, Err(Error::ConnectionRefused)));
        assert_eq!(network.sent().len(), 2);
    }

    #[test]
    fn rejecting_servers_are_skipped() {
        let network = MockNetwork::new(|server, _, query| {
            if server == *S1 {
                Reaction::reply(server, build_reply(query, Rcode::Refused, &[]))
            } else {
                Reaction::Drop
            }
        });
        let mut resolver = resolver(&[*S1, *S2], network.clone());
        let mut answer = [0; 512];
        let result = resolver.send(&query_for("www.example.test.", 1), &mut answer);
        assert!(matches!(result, Err(Error::Refused)));
        assert_eq!(servers_of(&network.sent()), vec![*S1, *S2, *S2]);
        assert_eq!(resolver.bad_servers(), &[*S1, *S2]);
    }

    #[test]
    fn rejections_can_be_accepted() {
        let network = MockNetwork::new(|server, _, query| {
            Reaction::reply(server, build_reply(query, Rcode::ServFail, &[]))
        });
        let mut resolver = resolver(&[*S1, *S2], network.clone());
        resolver.config.accept_rejections = true;
        let mut answer = [0; 512];
        let len = resolver
            .send(&query_for("www.example.test.", 1), &mut answer)
            .unwrap();
        assert_eq!(Reader::try_from(&answer[..len]).unwrap().rcode(), Rcode::ServFail);
        assert_eq!(network.sent().len(), 1);
    }

    #[test]
    fn truncated_reply_moves_to_tcp() {
        let network = MockNetwork::new(|server, transport, query| {
            let mut reply = a_reply(query);
            if transport == Transport::Udp {
                reply[TC_BYTE] |= TC_MASK;
            }
            Reaction::reply(server, reply)
        });
        let mut resolver = resolver(&[*S1, *S2], network.clone());
        let mut answer = [0; 512];
        let query = query_for("www.example.test.", 1);
        let len = resolver.send(&query, &mut answer).unwrap();
        assert_eq!(&answer[..len], &a_reply(&query)[..]);

        let sent = network.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!((sent[0].transport, sent[0].server), (Transport::Udp, *S1));
        assert_eq!((sent[1].transport, sent[1].server), (Transport::Tcp, *S1));
        assert_eq!(resolver.connection_mode(), None);
    }

    #[test]
    fn truncation_can_be_ignored() {
        let network = MockNetwork::new(|server, _, query| {
            let mut reply = a_reply(query);
            reply[TC_BYTE] |= TC_MASK;
            Reaction::reply(server, reply)
        });
        let mut resolver = resolver(&[*S1], network.clone());
        resolver.config.ignore_truncation = true;
        let mut answer = [0; 512];
        let len = resolver
            .send(&query_for("www.example.test.", 1), &mut answer)
            .unwrap();
        assert!(Reader::try_from(&answer[..len]).unwrap().tc());
        assert_eq!(network.sent().len(), 1);
    }

    #[test]
    fn unmatched_replies_are_discarded() {
        let network = MockNetwork::new(|server, _, query| {
            if server == *S1 {
                return Reaction::Drop;
            }
            let mut wrong_id = a_reply(query);
            wrong_id[1] ^= 0xff;
            let id = u16::from_be_bytes([query[0], query[1]]);
            let wrong_question = a_reply(&query_for("other.example.test.", id));
            Reaction::Deliver(vec![
                (server, wrong_id),
                (*STRANGER, a_reply(query)),
                (server, wrong_question),
                (server, b"\x00\x01".to_vec()),
            ])
        });
        let mut resolver = resolver(&[*S1, *S2], network);
        let mut answer = [0; 512];
        let result = resolver.send(&query_for("www.example.test.", 1), &mut answer);
        // The undersized datagram ends the exchange after the others
        // are discarded.
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[test]
    fn matching_reply_follows_discarded_ones() {
        let network = MockNetwork::new(|server, _, query| {
            if server == *S1 {
                return Reaction::Drop;
            }
            let mut wrong_id = a_reply(query);
            wrong_id[1] ^= 0xff;
            Reaction::Deliver(vec![
                (server, wrong_id),
                (*STRANGER, a_reply(query)),
                (server, a_reply(query)),
            ])
        });
        let mut resolver = resolver(&[*S1, *S2], network);
        let mut answer = [0; 512];
        let query = query_for("www.example.test.", 1);
        let len = resolver.send(&query, &mut answer).unwrap();
        assert_eq!(&answer[..len], &a_reply(&query)[..]);
    }

    #[test]
    fn insecure_source_accepts_strangers() {
        let network = MockNetwork::new(|server, _, query| {
            if server == *S1 {
                Reaction::Drop
            } else {
                Reaction::reply(*STRANGER, a_reply(query))
            }
        });
        let mut resolver = resolver(&[*S1, *S2], network);
        resolver.config.insecure_source = true;
        let mut answer = [0; 512];
        assert!(resolver
            .send(&query_for("www.example.test.", 1), &mut answer)
            .is_ok());
    }

    #[test]
    fn long_tcp_reply_is_truncated_and_drained() {
        let network = MockNetwork::new(|server, _, query| Reaction::reply(server, a_reply(query)));
        let mut resolver = resolver(&[*S1], network.clone());
        resolver.config.use_tcp = true;
        resolver.config.persistent_tcp = true;

        let mut small = [0; 40];
        let query = query_for("www.example.test.", 1);
        let len = resolver.send(&query, &mut small).unwrap();
        assert_eq!(len, 40);
        assert!(Reader::try_from(&small[..]).unwrap().tc());

        // The connection is still in step for the next exchange.
        let mut answer = [0; 512];
        let query = query_for("www.example.test.", 2);
        let len = resolver.send(&query, &mut answer).unwrap();
        assert_eq!(&answer[..len], &a_reply(&query)[..]);
        assert_eq!(network.streams_opened(), 1);
    }

    #[test]
    fn reset_persistent_connection_is_reopened_once() {
        let network = MockNetwork::new(|server, _, query| Reaction::reply(server, a_reply(query)));
        let mut resolver = resolver(&[*S1], network.clone());
        resolver.config.use_tcp = true;
        resolver.config.persistent_tcp = true;
        let mut answer = [0; 512];
        resolver
            .send(&query_for("www.example.test.", 1), &mut answer)
            .unwrap();
        network.reset_streams();
        resolver
            .send(&query_for("www.example.test.", 2), &mut answer)
            .unwrap();
        assert_eq!(network.streams_opened(), 2);
        assert!(resolver.bad_servers().is_empty());
    }

    #[test]
    fn tcp_connections_close_without_persistence() {
        let network = MockNetwork::new(|server, _, query| Reaction::reply(server, a_reply(query)));
        let mut resolver = resolver(&[*S1], network.clone());
        resolver.config.use_tcp = true;
        let mut answer = [0; 512];
        for id in 1..=2 {
            resolver
                .send(&query_for("www.example.test.", id), &mut answer)
                .unwrap();
        }
        assert_eq!(network.streams_opened(), 2);
    }

    #[test]
    fn tcp_makes_a_single_pass() {
        let network = MockNetwork::new(|_, _, _| Reaction::Drop);
        let mut resolver = resolver(&[*S1, *S2], network.clone());
        resolver.config.use_tcp = true;
        let mut answer = [0; 512];
        let result = resolver.send(&query_for("www.example.test.", 1), &mut answer);
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(servers_of(&network.sent()), vec![*S1, *S2]);
    }

    #[test]
    fn rotation_changes_the_first_server() {
        let network = MockNetwork::new(|server, _, query| Reaction::reply(server, a_reply(query)));
        let mut resolver = resolver(&[*S1, *S2], network.clone());
        resolver.config.rotate = true;
        let mut answer = [0; 512];
        for id in 1..=2 {
            resolver
                .send(&query_for("www.example.test.", id), &mut answer)
                .unwrap();
        }
        assert_eq!(servers_of(&network.sent()), vec![*S2, *S1]);
    }

    #[test]
    fn empty_server_list_is_an_error() {
        let network = MockNetwork::new(|_, _, _| Reaction::Drop);
        let mut resolver = resolver(&[], network);
        let mut answer = [0; 512];
        assert!(matches!(
            resolver.send(&query_for("www.example.test.", 1), &mut answer),
            Err(Error::NoServers)
        ));
    }

    #[test]
    fn attempt_timeouts_back_off() {
        let base = Duration::from_secs(5);
        assert_eq!(attempt_timeout(base, 0, 3), Duration::from_secs(5));
        assert_eq!(attempt_timeout(base, 1, 2), Duration::from_secs(5));
        assert_eq!(attempt_timeout(base, 2, 4), Duration::from_secs(5));
        assert_eq!(attempt_timeout(base, 3, 1), Duration::from_secs(40));
        assert_eq!(
            attempt_timeout(Duration::from_secs(1), 1, 4),
            MIN_ATTEMPT_TIMEOUT
        );
    }

    fn message_with(qr: bool, questions: &[(&str, Type, Class)]) -> Vec<u8> {
        let mut buf = [0; 512];
        let mut writer = Writer::new(&mut buf, 512).unwrap();
        writer.set_id(1);
        writer.set_qr(qr);
        for &(name, qtype, qclass) in questions {
            let question = Question::new(name.parse().unwrap(), qtype, qclass);
            writer.add_question(&question).unwrap();
        }
        let len = writer.finish();
        buf[..len].to_vec()
    }

    #[test]
    fn questions_match_in_any_order() {
        let one = query_for("a.example.test.", 1);
        let other = query_for("b.example.test.", 1);
        assert!(queries_match(&one, &build_reply(&one, Rcode::NoError, &[])));
        assert!(!queries_match(&one, &build_reply(&other, Rcode::NoError, &[])));
        assert!(!queries_match(&one, &one[..HEADER_SIZE]));
        assert!(!queries_match(&one, b"\x00\x01"));

        let a = ("a.example.test.", Type::A, Class::IN);
        let b = ("b.example.test.", Type::AAAA, Class::IN);
        let query = message_with(false, &[a, b]);
        assert!(queries_match(&query, &message_with(true, &[b, a])));
        assert!(queries_match(&query, &message_with(true, &[a, b])));
        assert!(!queries_match(&query, &message_with(true, &[a, a])));
        assert!(!queries_match(&query, &message_with(true, &[a])));
        assert!(!queries_match(
            &query,
            &message_with(true, &[b, ("a.example.test.", Type::AAAA, Class::IN)])
        ));
        assert!(!queries_match(
            &query,
            &message_with(true, &[b, ("a.example.test.", Type::A, Class::CH)])
        ));
    }
}
