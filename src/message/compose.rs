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

//! Composition of the two kinds of messages a resolver sends: queries
//! and dynamic updates.

use super::reader::Section;
use super::writer::{Result, Writer};
use super::{Opcode, Question};
use crate::name::Name;
use crate::rr::{Class, Ttl, Type};
use crate::update::UpdateRecord;

/// Composes a query for `question` into `buf` and returns its length.
///
/// When composing a standard query (`opcode` is [`Opcode::Query`]), a
/// `completion_domain` may be given; it is appended as an additional
/// record of type NULL with no RDATA, in the question's class.
pub fn compose_query(
    buf: &mut [u8],
    id: u16,
    opcode: Opcode,
    question: &Question,
    recursion_desired: bool,
    completion_domain: Option<&Name>,
) -> Result<usize> {
    let mut writer = Writer::try_from(buf)?;
    writer.set_id(id);
    writer.set_opcode(opcode);
    writer.set_rd(recursion_desired);
    writer.add_question(question)?;
    if let (Opcode::Query, Some(domain)) = (opcode, completion_domain) {
        writer.add_rr(
            Section::Additional,
            domain,
            Type::NULL,
            question.qclass,
            Ttl::ZERO,
            &[],
        )?;
    }
    Ok(writer.finish())
}

/// Composes an UPDATE message for the zone `zone` of class `class`
/// into `buf` and returns its length.
///
/// The zone section holds the single `zone SOA class` entry required
/// by [RFC 2136 § 2.3]. Prerequisites go in the prerequisite section
/// and updates in the update section, each in the order given.
///
/// [RFC 2136 § 2.3]: https://datatracker.ietf.org/doc/html/rfc2136#section-2.3
pub fn compose_update(
    buf: &mut [u8],
    id: u16,
    zone: &Name,
    class: Class,
    records: &[UpdateRecord],
) -> Result<usize> {
    let mut writer = Writer::try_from(buf)?;
    writer.set_id(id);
    writer.set_opcode(Opcode::Update);
    writer.add_question(&Question::new(zone.clone(), Type::SOA, class))?;
    for record in records.iter().filter(|r| r.op.is_prerequisite()) {
        record.write_to(&mut writer, class)?;
    }
    for record in records.iter().filter(|r| !r.op.is_prerequisite()) {
        record.write_to(&mut writer, class)?;
    }
    Ok(writer.finish())
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
