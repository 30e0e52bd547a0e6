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

//! Implementation of [`Message`], a fully decoded DNS message.

use super::reader::{Reader, Record, Result, Section};
use super::{Opcode, Question, Rcode};

/// The header of a DNS message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
    pub id: u16,
    pub qr: bool,
    pub opcode: Opcode,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub rcode: Rcode,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

/// A decoded DNS message.
///
/// Decoding is all-or-nothing: [`Message::decode`] either reads exactly
/// as many entries as the header declares for each section or fails,
/// so the lengths of the section vectors always agree with the header
/// counts. RDATA is borrowed from the decoded buffer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message<'a> {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<Record<'a>>,
    pub authority: Vec<Record<'a>>,
    pub additional: Vec<Record<'a>>,
}

impl<'a> Message<'a> {
    /// Decodes the message in `octets`. Octets after the last record
    /// are ignored.
    pub fn decode(octets: &'a [u8]) -> Result<Self> {
        let mut reader = Reader::try_from(octets)?;
        let header = Header {
            id: reader.id(),
            qr: reader.qr(),
            opcode: reader.opcode(),
            aa: reader.aa(),
            tc: reader.tc(),
            rd: reader.rd(),
            ra: reader.ra(),
            rcode: reader.rcode(),
            qdcount: reader.qdcount(),
            ancount: reader.ancount(),
            nscount: reader.nscount(),
            arcount: reader.arcount(),
        };

        // The counts come from the wire, so we don't trust them for
        // preallocation beyond what the buffer could possibly hold.
        let plausible = |count: u16| (count as usize).min(octets.len() / 5);

        let mut questions = Vec::with_capacity(plausible(header.qdcount));
        for _ in 0..header.qdcount {
            questions.push(reader.read_question()?);
        }
        let mut read_section = |count: u16| -> Result<Vec<Record<'a>>> {
            let mut records = Vec::with_capacity(plausible(count));
            for _ in 0..count {
                records.push(reader.read_rr()?);
            }
            Ok(records)
        };
        let answers = read_section(header.ancount)?;
        let authority = read_section(header.nscount)?;
        let additional = read_section(header.arcount)?;

        Ok(Self {
            header,
            questions,
            answers,
            authority,
            additional,
        })
    }

    /// Returns the records of a section. The question section holds no
    /// records, so its slice is always empty.
    pub fn records(&self, section: Section) -> &[Record<'a>] {
        match section {
            Section::Question => &[],
            Section::Answer => &self.answers,
            Section::Authority => &self.authority,
            Section::Additional => &self.additional,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
