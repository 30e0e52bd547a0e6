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

//! A scripted in-memory [`Network`] for tests.
//!
//! Every message sent through a [`MockNetwork`] is logged and handed
//! to a handler, which decides how the "server" reacts.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use super::io::{DatagramSocket, Network, StreamSocket, Transport};
use crate::message::{Rcode, Reader, Section, Writer, MAX_MESSAGE_SIZE};
use crate::name::Name;
use crate::rr::{Class, Ttl, Type};

/// How a scripted server reacts to a message.
pub enum Reaction {
    /// Nothing comes back.
    Drop,

    /// The server's port is closed (UDP) or the connection is reset
    /// (TCP).
    Refuse,

    /// These messages come back, in order, each from the given
    /// address.
    Deliver(Vec<(SocketAddr, Vec<u8>)>),
}

impl Reaction {
    pub fn reply(from: SocketAddr, message: Vec<u8>) -> Self {
        Self::Deliver(vec![(from, message)])
    }
}

/// A message that reached a scripted server.
#[derive(Clone, Debug)]
pub struct Sent {
    pub server: SocketAddr,
    pub transport: Transport,
    pub message: Vec<u8>,
    pub connected: bool,
}

type Handler = Box<dyn FnMut(SocketAddr, Transport, &[u8]) -> Reaction>;

struct State {
    handler: Handler,
    sent: Vec<Sent>,
    generation: u64,
    streams_opened: usize,
}

#[derive(Clone)]
pub struct MockNetwork(Rc<RefCell<State>>);

impl MockNetwork {
    pub fn new<F>(handler: F) -> Self
    where
        F: FnMut(SocketAddr, Transport, &[u8]) -> Reaction + 'static,
    {
        Self(Rc::new(RefCell::new(State {
            handler: Box::new(handler),
            sent: Vec::new(),
            generation: 0,
            streams_opened: 0,
        })))
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.0.borrow().sent.clone()
    }

    pub fn streams_opened(&self) -> usize {
        self.0.borrow().streams_opened
    }

    /// Makes every open stream fail with `ConnectionReset`.
    pub fn reset_streams(&self) {
        self.0.borrow_mut().generation += 1;
    }

    fn exchange(&self, server: SocketAddr, transport: Transport, message: &[u8], connected: bool) -> Reaction {
        let mut state = self.0.borrow_mut();
        state.sent.push(Sent {
            server,
            transport,
            message: message.to_vec(),
            connected,
        });
        (state.handler)(server, transport, message)
    }
}

impl Network for MockNetwork {
    type Datagram = MockDatagram;
    type Stream = MockStream;

    fn open_datagram(&mut self, _server: SocketAddr) -> io::Result<MockDatagram> {
        Ok(MockDatagram {
            network: self.clone(),
            peer: None,
            inbox: VecDeque::new(),
            refused: false,
        })
    }

    fn connect_stream(&mut self, server: SocketAddr, _timeout: Duration) -> io::Result<MockStream> {
        let generation = {
            let mut state = self.0.borrow_mut();
            state.streams_opened += 1;
            state.generation
        };
        Ok(MockStream {
            network: self.clone(),
            server,
            generation,
            outbox: Vec::new(),
            inbox: VecDeque::new(),
            failed: false,
        })
    }
}

pub struct MockDatagram {
    network: MockNetwork,
    peer: Option<SocketAddr>,
    inbox: VecDeque<(SocketAddr, Vec<u8>)>,
    refused: bool,
}

impl DatagramSocket for MockDatagram {
    fn connect(&mut self, server: SocketAddr) -> io::Result<()> {
        self.peer = Some(server);
        Ok(())
    }

    fn send_to(&mut self, buf: &[u8], server: SocketAddr) -> io::Result<usize> {
        let server = self.peer.unwrap_or(server);
        match self.network.exchange(server, Transport::Udp, buf, self.peer.is_some()) {
            Reaction::Drop => (),
            // Only connected sockets learn of ICMP errors.
            Reaction::Refuse => self.refused = self.peer.is_some(),
            Reaction::Deliver(messages) => {
                for (from, message) in messages {
                    if self.peer.map_or(true, |peer| peer == from) {
                        self.inbox.push_back((from, message));
                    }
                }
            }
        }
        Ok(buf.len())
    }

    fn recv_from(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<(usize, SocketAddr)> {
        if std::mem::take(&mut self.refused) {
            return Err(io::ErrorKind::ConnectionRefused.into());
        }
        match self.inbox.pop_front() {
            Some((from, message)) => {
                let len = message.len().min(buf.len());
                buf[..len].copy_from_slice(&message[..len]);
                Ok((len, from))
            }
            None => Err(io::ErrorKind::TimedOut.into()),
        }
    }
}

pub struct MockStream {
    network: MockNetwork,
    server: SocketAddr,
    generation: u64,
    outbox: Vec<u8>,
    inbox: VecDeque<u8>,
    failed: bool,
}

impl MockStream {
    fn check_reset(&self) -> io::Result<()> {
        if self.network.0.borrow().generation != self.generation {
            Err(io::ErrorKind::ConnectionReset.into())
        } else {
            Ok(())
        }
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_reset()?;
        self.outbox.extend_from_slice(buf);
        while self.outbox.len() >= 2 {
            let len = u16::from_be_bytes([self.outbox[0], self.outbox[1]]) as usize;
            if self.outbox.len() < len + 2 {
                break;
            }
            let message: Vec<u8> = self.outbox.drain(..len + 2).skip(2).collect();
            match self.network.exchange(self.server, Transport::Tcp, &message, true) {
                Reaction::Drop => (),
                Reaction::Refuse => self.failed = true,
                Reaction::Deliver(messages) => {
                    for (_, message) in messages {
                        self.inbox.extend((message.len() as u16).to_be_bytes());
                        self.inbox.extend(message);
                    }
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_reset()?;
        if self.inbox.is_empty() {
            return if self.failed {
                Err(io::ErrorKind::ConnectionReset.into())
            } else {
                Err(io::ErrorKind::TimedOut.into())
            };
        }
        let len = buf.len().min(self.inbox.len());
        for (slot, octet) in buf.iter_mut().zip(self.inbox.drain(..len)) {
            *slot = octet;
        }
        Ok(len)
    }
}

impl StreamSocket for MockStream {
    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// REPLY BUILDING                                                     //
////////////////////////////////////////////////////////////////////////

/// A record to put in a scripted reply. Records are class IN with a
/// TTL of one hour.
pub struct ReplyRecord {
    pub section: Section,
    pub owner: Name,
    pub rr_type: Type,
    pub rdata: Vec<u8>,
}

impl ReplyRecord {
    pub fn new(section: Section, owner: &str, rr_type: Type, rdata: &[u8]) -> Self {
        Self {
            section,
            owner: owner.parse().unwrap(),
            rr_type,
            rdata: rdata.to_vec(),
        }
    }
}

/// Builds a reply to `query` echoing its ID, opcode, RD bit, and
/// questions. Records must be given in section order.
pub fn build_reply(query: &[u8], rcode: Rcode, records: &[ReplyRecord]) -> Vec<u8> {
    let mut reader = Reader::try_from(query).unwrap();
    let mut buf = vec![0; MAX_MESSAGE_SIZE];
    let mut writer = Writer::try_from(&mut buf[..]).unwrap();
    writer.set_id(reader.id());
    writer.set_qr(true);
    writer.set_opcode(reader.opcode());
    writer.set_rd(reader.rd());
    writer.set_ra(true);
    writer.set_rcode(rcode);
    for _ in 0..reader.qdcount() {
        writer.add_question(&reader.read_question().unwrap()).unwrap();
    }
    for record in records {
        writer
            .add_rr(
                record.section,
                &record.owner,
                record.rr_type,
                Class::IN,
                Ttl::from(3600),
                &record.rdata,
            )
            .unwrap();
    }
    let len = writer.finish();
    buf.truncate(len);
    buf
}

/// Returns the first question of `message`.
pub fn question_of(message: &[u8]) -> (Name, Type) {
    let question = Reader::try_from(message).unwrap().read_question().unwrap();
    (question.qname, question.qtype)
}
