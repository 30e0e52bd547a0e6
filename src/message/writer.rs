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

//! Implementation of the [`Writer`] type to write on-the-wire DNS
//! messages.

use std::fmt;

use arrayvec::ArrayVec;

use super::constants::*;
use super::reader::Section;
use super::{Opcode, Question, Rcode};
use crate::name::Name;
use crate::rr::{Class, Ttl, Type};

/// The number of earlier name positions the compression table
/// remembers. Names whose suffixes fall outside the table are written
/// uncompressed.
pub const COMPRESSION_TABLE_SIZE: usize = 20;

////////////////////////////////////////////////////////////////////////
// WRITER                                                             //
////////////////////////////////////////////////////////////////////////

/// A "frame" around a buffer that serializes a DNS message into it.
///
/// A `Writer` is constructed using [`Writer::new`] (to set a message
/// size limit different from the underlying buffer size) or with its
/// [`TryFrom`] implementation. The message header is initially zeroed
/// and can be written at any time through the setters.
///
/// Questions and resource records are written sequentially at a
/// cursor, so they must be added in section order; an attempt to go
/// back to an earlier section fails with [`Error::OutOfOrder`]. Each
/// addition is atomic: on failure the message is left as it was.
///
/// Owner names are compressed against the positions recorded in a
/// bounded compression table. Compression only ever produces pointers
/// to earlier names in the same buffer, so the output is always a
/// valid message. RDATA is written verbatim.
pub struct Writer<'a> {
    octets: &'a mut [u8],
    cursor: usize,
    limit: usize,
    section: Section,
    counts: [u16; 4],
    compression_table: ArrayVec<u16, COMPRESSION_TABLE_SIZE>,
}

impl<'a> Writer<'a> {
    /// Creates a new `Writer` from the underlying buffer `octets`. The
    /// message size is limited to `limit` or `octets.len()`, whichever
    /// is smaller. If that is too small to hold a header, this fails.
    pub fn new(octets: &'a mut [u8], limit: usize) -> Result<Self> {
        let limit = limit.min(octets.len()).min(MAX_MESSAGE_SIZE);
        if limit < HEADER_SIZE {
            Err(Error::NoSpace)
        } else {
            octets[0..HEADER_SIZE].fill(0);
            Ok(Self {
                octets,
                cursor: HEADER_SIZE,
                limit,
                section: Section::Question,
                counts: [0; 4],
                compression_table: ArrayVec::new(),
            })
        }
    }

    /// Sets the message ID.
    pub fn set_id(&mut self, id: u16) {
        self.octets[ID_START..ID_END].copy_from_slice(&id.to_be_bytes());
    }

    /// Sets the QR (query response) bit.
    pub fn set_qr(&mut self, qr: bool) {
        self.set_flag(QR_BYTE, QR_MASK, qr);
    }

    /// Sets the opcode.
    pub fn set_opcode(&mut self, opcode: Opcode) {
        self.octets[OPCODE_BYTE] &= !OPCODE_MASK;
        self.octets[OPCODE_BYTE] |= (u8::from(opcode) << OPCODE_SHIFT) & OPCODE_MASK;
    }

    /// Sets the AA (authoritative answer) bit.
    pub fn set_aa(&mut self, aa: bool) {
        self.set_flag(AA_BYTE, AA_MASK, aa);
    }

    /// Sets the TC (truncation) bit.
    pub fn set_tc(&mut self, tc: bool) {
        self.set_flag(TC_BYTE, TC_MASK, tc);
    }

    /// Sets the RD (recursion desired) bit.
    pub fn set_rd(&mut self, rd: bool) {
        self.set_flag(RD_BYTE, RD_MASK, rd);
    }

    /// Sets the RA (recursion available) bit.
    pub fn set_ra(&mut self, ra: bool) {
        self.set_flag(RA_BYTE, RA_MASK, ra);
    }

    /// Sets the RCODE.
    pub fn set_rcode(&mut self, rcode: Rcode) {
        self.octets[RCODE_BYTE] &= !RCODE_MASK;
        self.octets[RCODE_BYTE] |= u8::from(rcode) & RCODE_MASK;
    }

    fn set_flag(&mut self, byte: usize, mask: u8, value: bool) {
        if value {
            self.octets[byte] |= mask;
        } else {
            self.octets[byte] &= !mask;
        }
    }

    /// Adds a question. This must be used before any records are
    /// added.
    pub fn add_question(&mut self, question: &Question) -> Result<()> {
        self.with_rollback(|this| {
            this.enter_section(Section::Question)?;
            this.write_name(&question.qname)?;
            this.try_push_u16(question.qtype.into())?;
            this.try_push_u16(question.qclass.into())?;
            this.bump_count(Section::Question)
        })
    }

    /// Adds a resource record to `section`, which must not be
    /// [`Section::Question`] and must not precede a section already
    /// written to.
    pub fn add_rr(
        &mut self,
        section: Section,
        owner: &Name,
        rr_type: Type,
        class: Class,
        ttl: Ttl,
        rdata: &[u8],
    ) -> Result<()> {
        if section == Section::Question {
            return Err(Error::OutOfOrder);
        }
        let rdlength = u16::try_from(rdata.len()).or(Err(Error::RdataTooLong))?;
        self.with_rollback(|this| {
            this.enter_section(section)?;
            this.write_name(owner)?;
            this.try_push_u16(rr_type.into())?;
            this.try_push_u16(class.into())?;
            this.try_push_u32(ttl.into())?;
            this.try_push_u16(rdlength)?;
            this.try_push(rdata)?;
            this.bump_count(section)
        })
    }

    /// Returns the number of octets written so far.
    pub fn len(&self) -> usize {
        self.cursor
    }

    /// Returns whether nothing beyond the header has been written.
    pub fn is_empty(&self) -> bool {
        self.cursor == HEADER_SIZE
    }

    /// Writes the section counts into the header and returns the length
    /// of the finished message.
    pub fn finish(self) -> usize {
        for (i, count) in self.counts.iter().enumerate() {
            let start = QDCOUNT_START + 2 * i;
            self.octets[start..start + 2].copy_from_slice(&count.to_be_bytes());
        }
        self.cursor
    }

    fn enter_section(&mut self, section: Section) -> Result<()> {
        if section_index(section) < section_index(self.section) {
            Err(Error::OutOfOrder)
        } else {
            self.section = section;
            Ok(())
        }
    }

    fn bump_count(&mut self, section: Section) -> Result<()> {
        let count = &mut self.counts[section_index(section)];
        *count = count.checked_add(1).ok_or(Error::CountOverflow)?;
        Ok(())
    }

    /// Executes `f(self)`, returning the result and rolling back the
    /// section, cursor, counts, and compression table first if the
    /// result is an error.
    fn with_rollback<F, T>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let saved_section = self.section;
        let saved_cursor = self.cursor;
        let saved_counts = self.counts;
        let saved_table_len = self.compression_table.len();
        let result = f(self);
        if result.is_err() {
            self.section = saved_section;
            self.cursor = saved_cursor;
            self.counts = saved_counts;
            self.compression_table.truncate(saved_table_len);
        }
        result
    }

    ////////////////////////////////////////////////////////////////////
    // NAME COMPRESSION                                               //
    ////////////////////////////////////////////////////////////////////

    /// Writes `name` at the cursor. The longest suffix of `name` found
    /// in the compression table is replaced by a pointer; the labels
    /// written in full are then recorded in the table while it has
    /// room.
    fn write_name(&mut self, name: &Name) -> Result<()> {
        let n_labels = name.len() - 1;
        let mut pointer = None;
        let mut n_literal = n_labels;
        for i in 0..n_labels {
            if let Some(target) = self.find_suffix(name.wire_repr_from(i)) {
                pointer = Some(target);
                n_literal = i;
                break;
            }
        }

        let name_start = self.cursor;
        let mut label_starts = ArrayVec::<usize, 128>::new();
        for i in 0..n_literal {
            let label = name.label(i);
            label_starts.push(self.cursor);
            self.try_push(&[label.len() as u8])?;
            self.try_push(label)?;
        }
        match pointer {
            Some(target) => self.try_push_u16(0xc000 | target)?,
            None => self.try_push(&[0])?,
        }
        debug_assert!(self.cursor > name_start);

        for start in label_starts {
            if start > POINTER_MAX || self.compression_table.is_full() {
                break;
            }
            self.compression_table.push(start as u16);
        }
        Ok(())
    }

    /// Looks for a previously written name equal to `suffix` (an
    /// uncompressed name) among the compression table entries.
    fn find_suffix(&self, suffix: &[u8]) -> Option<u16> {
        let written = &self.octets[..self.cursor];
        self.compression_table.iter().copied().find(|&offset| {
            Name::try_from_compressed(written, offset as usize)
                .map_or(false, |(prior, _)| prior.wire_repr().eq_ignore_ascii_case(suffix))
        })
    }

    ////////////////////////////////////////////////////////////////////
    // RAW OUTPUT                                                     //
    ////////////////////////////////////////////////////////////////////

    /// Tries to write `data` to the underlying buffer at the current
    /// cursor, failing if there is not sufficient space.
    fn try_push(&mut self, data: &[u8]) -> Result<()> {
        if self.limit - self.cursor >= data.len() {
            self.octets[self.cursor..self.cursor + data.len()].copy_from_slice(data);
            self.cursor += data.len();
            Ok(())
        } else {
            Err(Error::NoSpace)
        }
    }

    fn try_push_u16(&mut self, data: u16) -> Result<()> {
        self.try_push(&data.to_be_bytes())
    }

    fn try_push_u32(&mut self, data: u32) -> Result<()> {
        self.try_push(&data.to_be_bytes())
    }
}

impl<'a> TryFrom<&'a mut [u8]> for Writer<'a> {
    type Error = Error;

    fn try_from(octets: &'a mut [u8]) -> Result<Self> {
        let limit = octets.len();
        Self::new(octets, limit)
    }
}

fn section_index(section: Section) -> usize {
    match section {
        Section::Question => 0,
        Section::Answer => 1,
        Section::Authority => 2,
        Section::Additional => 3,
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a [`Writer`] operation failed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// Adding the question or resource record would overflow the
    /// corresponding 16-bit counter in the DNS header.
    CountOverflow,

    /// There is not enough room left in the buffer.
    NoSpace,

    /// An attempt was made to serialize a question or resource record
    /// in the wrong place in the message.
    OutOfOrder,

    /// The RDATA is longer than 65,535 octets.
    RdataTooLong,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::CountOverflow => f.write_str("section count overflow"),
            Self::NoSpace => f.write_str("not enough room in the message buffer"),
            Self::OutOfOrder => f.write_str("section written out of order"),
            Self::RdataTooLong => f.write_str("RDATA is too long"),
        }
    }
}

impl std::error::Error for Error {}

/// The type returned by fallible [`Writer`] methods.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::super::Message;
    use super::*;

    fn name(text: &str) -> Name {
        text.parse().unwrap()
    }

    #[test]
    fn header_setters_work() {
        let mut buf = [0xff; 12];
        let mut writer = Writer::try_from(&mut buf[..]).unwrap();
        writer.set_id(0xbeef);
        writer.set_opcode(Opcode::Update);
        writer.set_rd(true);
        writer.set_rcode(Rcode::Refused);
        assert_eq!(writer.finish(), 12);
        assert_eq!(buf, *b"\xbe\xef\x29\x05\x00\x00\x00\x00\x00\x00\x00\x00");
    }

    #[test]
    fn owners_are_compressed_against_earlier_names() {
        let mut buf = [0; 512];
        let mut writer = Writer::try_from(&mut buf[..]).unwrap();
        let question = Question::new(name("example.test."), Type::SOA, Class::IN);
        writer.add_question(&question).unwrap();
        writer
            .add_rr(Section::Authority, &name("www.example.test."), Type::A, Class::IN, Ttl::from(60), b"\x7f\x00\x00\x01")
            .unwrap();
        writer
            .add_rr(Section::Authority, &name("WWW.example.test."), Type::A, Class::IN, Ttl::from(60), b"\x7f\x00\x00\x02")
            .unwrap();
        let len = writer.finish();

        // Question: 14-octet name at offset 12. First record: "www"
        // plus a pointer to offset 12. Second record: a pointer to
        // offset 30, where "www" was written.
        assert_eq!(&buf[30..36], b"\x03www\xc0\x0c");
        assert_eq!(&buf[50..52], b"\xc0\x1e");
        assert_eq!(len, 66);

        let message = Message::decode(&buf[..len]).unwrap();
        assert_eq!(message.authority.len(), 2);
        assert_eq!(message.authority[1].owner, name("www.example.test."));
        assert_eq!(message.authority[1].rdata, b"\x7f\x00\x00\x02");
    }

    #[test]
    fn compression_table_is_bounded() {
        let mut buf = [0; 4096];
        let mut writer = Writer::try_from(&mut buf[..]).unwrap();
        // Each distinct single-label name takes one table entry.
        for i in 0..COMPRESSION_TABLE_SIZE + 5 {
            let owner = name(&format!("n{}.", i));
            writer
                .add_rr(Section::Answer, &owner, Type::NULL, Class::IN, Ttl::ZERO, b"")
                .unwrap();
        }
        let before = writer.len();
        let late = name(&format!("n{}.", COMPRESSION_TABLE_SIZE + 2));
        writer
            .add_rr(Section::Answer, &late, Type::NULL, Class::IN, Ttl::ZERO, b"")
            .unwrap();
        // Written in full: 1 + 3 + 1 octets of name plus 10 fixed.
        assert_eq!(writer.len() - before, 15);
        let len = writer.finish();
        let message = Message::decode(&buf[..len]).unwrap();
        assert_eq!(message.answers.len(), COMPRESSION_TABLE_SIZE + 6);
        assert_eq!(message.answers.last().unwrap().owner, late);
    }

    #[test]
    fn failed_writes_roll_back() {
        let mut buf = [0; 48];
        let mut writer = Writer::try_from(&mut buf[..]).unwrap();
        let question = Question::new(name("example.test."), Type::A, Class::IN);
        writer.add_question(&question).unwrap();
        let before = writer.len();
        assert_eq!(
            writer.add_rr(Section::Answer, &name("example.test."), Type::TXT, Class::IN, Ttl::ZERO, &[0; 32]),
            Err(Error::NoSpace)
        );
        assert_eq!(writer.len(), before);

        // The failed record did not move us out of the question
        // section.
        writer.add_question(&question).unwrap();
        writer
            .add_rr(Section::Additional, &Name::root(), Type::NULL, Class::IN, Ttl::ZERO, b"")
            .unwrap();
        assert_eq!(writer.add_question(&question), Err(Error::OutOfOrder));
        let len = writer.finish();
        assert_eq!(len, 47);
        let message = Message::decode(&buf[..len]).unwrap();
        assert_eq!(message.header.qdcount, 2);
        assert_eq!(message.header.ancount, 0);
        assert_eq!(message.header.arcount, 1);
    }
}
