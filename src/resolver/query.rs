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

//! Queries and signed exchanges built on [`Resolver::send`].

use log::debug;

use super::{Error, Network, Resolver, Result};
use crate::message::tsig::{self, SigningKey, DEFAULT_FUDGE};
use crate::message::{compose_query, Opcode, Question, Reader, MAX_UDP_SIZE};

impl<N: Network> Resolver<N> {
    /// Sends a query for `question` and receives the reply into
    /// `answer`, returning its length. The reply code is not examined.
    pub fn query_raw(&mut self, question: &Question, answer: &mut [u8]) -> Result<usize> {
        let mut buf = [0; MAX_UDP_SIZE];
        let id = self.next_id();
        let len = compose_query(
            &mut buf,
            id,
            Opcode::Query,
            question,
            self.config.recurse,
            None,
        )?;
        debug!("querying {} (ID {:#06x})", question, id);
        self.send(&buf[..len], answer)
    }

    /// Like [`Resolver::query_raw`], but a reply code other than
    /// NOERROR is returned as its [`Error`].
    pub fn query(&mut self, question: &Question, answer: &mut [u8]) -> Result<usize> {
        let len = self.query_raw(question, answer)?;
        let rcode = Reader::try_from(&answer[..len])?.rcode();
        match Error::from_rcode(rcode) {
            Some(e) => Err(e),
            None => Ok(len),
        }
    }

    /// Signs the message in `query[..len]` with `key`, sends it, and
    /// verifies the reply received into `answer`. The TSIG record is
    /// appended in place, so `query` needs room for it. If `strip` is
    /// set, the reply's TSIG record is removed after verification.
    /// Returns the length of the reply.
    pub fn send_signed(
        &mut self,
        query: &mut [u8],
        len: usize,
        key: &dyn SigningKey,
        answer: &mut [u8],
        strip: bool,
    ) -> Result<usize> {
        let (signed_len, mac) = tsig::sign(query, len, key, self.now(), DEFAULT_FUDGE, None)?;
        let answer_len = self.send(&query[..signed_len], answer)?;
        let verified = tsig::verify(&answer[..answer_len], key, Some(&mac), self.now())
            .map_err(|e| {
                debug!("reply failed TSIG verification: {}", e);
                Error::from(e)
            })?;
        debug!(
            "reply verified with key {} (signed at {})",
            key.key_name(),
            verified.time_signed
        );
        if strip {
            Ok(verified.strip(answer))
        } else {
            Ok(answer_len)
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use lazy_static::lazy_static;

    use super::super::mock::{build_reply, MockNetwork, Reaction, ReplyRecord};
    use super::super::{CountingIds, FixedClock, ResolverConfig};
    use super::*;
    use crate::message::tsig::{Algorithm, HmacKey};
    use crate::message::{Message, Rcode, Section};
    use crate::rr::{Class, Type};

    const NOW: u64 = 1_700_000_000;

    lazy_static! {
        static ref SERVER: SocketAddr = "192.0.2.53:53".parse().unwrap();
        static ref KEY: HmacKey = HmacKey::new(
            "update.key.".parse().unwrap(),
            Algorithm::HmacSha256,
            b"a shared secret"
        )
        .unwrap();
        static ref WRONG_KEY: HmacKey = HmacKey::new(
            "update.key.".parse().unwrap(),
            Algorithm::HmacSha256,
            b"another secret"
        )
        .unwrap();
    }

    fn resolver(network: MockNetwork) -> Resolver<MockNetwork> {
        let config = ResolverConfig {
            servers: vec![*SERVER],
            ..Default::default()
        };
        let mut resolver = Resolver::with_network(config, network);
        resolver.set_id_source(CountingIds::starting_at(0x4000));
        resolver.set_clock(FixedClock(NOW));
        resolver
    }

    fn question() -> Question {
        Question::new("www.example.test.".parse().unwrap(), Type::A, Class::IN)
    }

    #[test]
    fn query_returns_the_answer() {
        let network = MockNetwork::new(|server, _, query| {
            let answer = ReplyRecord::new(Section::Answer, "www.example.test.", Type::A, b"\xc0\x00\x02\x01");
            Reaction::reply(server, build_reply(query, Rcode::NoError, &[answer]))
        });
        let mut resolver = resolver(network.clone());
        let mut answer = [0; 512];
        let len = resolver.query(&question(), &mut answer).unwrap();
        let message = Message::decode(&answer[..len]).unwrap();
        assert_eq!(message.header.id, 0x4000);
        assert!(message.header.rd);
        assert_eq!(message.answers[0].rdata_ipv4(), Some("192.0.2.1".parse().unwrap()));
        assert_eq!(network.sent().len(), 1);
    }

    #[test]
    fn query_maps_rcodes_to_errors() {
        let network = MockNetwork::new(|server, _, query| {
            Reaction::reply(server, build_reply(query, Rcode::NxDomain, &[]))
        });
        let mut resolver = resolver(network);
        let mut answer = [0; 512];
        assert!(matches!(
            resolver.query(&question(), &mut answer),
            Err(Error::NameError)
        ));
        let len = resolver.query_raw(&question(), &mut answer).unwrap();
        assert_eq!(Reader::try_from(&answer[..len]).unwrap().rcode(), Rcode::NxDomain);
    }

    /// A server that verifies signed requests and signs its replies
    /// with `server_key`.
    fn signing_server(server_key: &'static HmacKey) -> MockNetwork {
        MockNetwork::new(move |server, _, query| {
            let request_mac = tsig::verify(query, &*KEY, None, NOW).unwrap().mac;
            let mut reply = build_reply(query, Rcode::NoError, &[]);
            let len = reply.len();
            reply.resize(512, 0);
            let (len, _) =
                tsig::sign(&mut reply, len, server_key, NOW, DEFAULT_FUDGE, Some(&request_mac))
                    .unwrap();
            reply.truncate(len);
            Reaction::reply(server, reply)
        })
    }

    fn signed_query() -> ([u8; 512], usize) {
        let mut buf = [0; 512];
        let len = compose_query(&mut buf, 0x1234, Opcode::Update, &question(), false, None).unwrap();
        (buf, len)
    }

    #[test]
    fn signed_exchange_verifies_and_strips() {
        let mut resolver = resolver(signing_server(&*KEY));
        let (mut query, len) = signed_query();
        let mut answer = [0; 512];
        let answer_len = resolver
            .send_signed(&mut query, len, &*KEY, &mut answer, false)
            .unwrap();
        assert!(tsig::is_signed(&answer[..answer_len]));

        let (mut query, len) = signed_query();
        let stripped_len = resolver
            .send_signed(&mut query, len, &*KEY, &mut answer, true)
            .unwrap();
        assert!(stripped_len < answer_len);
        let message = Message::decode(&answer[..stripped_len]).unwrap();
        assert_eq!(message.header.arcount, 0);
    }

    #[test]
    fn badly_signed_reply_is_rejected() {
        let mut resolver = resolver(signing_server(&*WRONG_KEY));
        let (mut query, len) = signed_query();
        let mut answer = [0; 512];
        assert!(matches!(
            resolver.send_signed(&mut query, len, &*KEY, &mut answer, true),
            Err(Error::BadSignature)
        ));
    }

    #[test]
    fn unsigned_reply_to_signed_query_is_rejected() {
        let network = MockNetwork::new(|server, _, query| {
            Reaction::reply(server, build_reply(query, Rcode::NoError, &[]))
        });
        let mut resolver = resolver(network);
        let (mut query, len) = signed_query();
        let mut answer = [0; 512];
        assert!(matches!(
            resolver.send_signed(&mut query, len, &*KEY, &mut answer, false),
            Err(Error::BadSignature)
        ));
    }
}
