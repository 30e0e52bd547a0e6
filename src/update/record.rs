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

//! Update records: the entries of an [RFC 2136] UPDATE message, as the
//! caller describes them.
//!
//! [RFC 2136]: https://datatracker.ietf.org/doc/html/rfc2136

use std::fmt;

use crate::message::writer::{self, Writer};
use crate::message::Section;
use crate::name::Name;
use crate::rr::{Class, Ttl, Type};

/// What an [`UpdateRecord`] asks of the server.
///
/// The first five are updates ([RFC 2136 § 2.5]); the rest are
/// prerequisites ([RFC 2136 § 2.4]) that must hold for the server to
/// apply any of the updates.
///
/// [RFC 2136 § 2.4]: https://datatracker.ietf.org/doc/html/rfc2136#section-2.4
/// [RFC 2136 § 2.5]: https://datatracker.ietf.org/doc/html/rfc2136#section-2.5
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum UpdateOp {
    /// Add the record to its RRset.
    Add,

    /// Delete the specific record (matched by RDATA).
    Delete,

    /// Delete the whole RRset of the record's type.
    DeleteRrset,

    /// Delete every RRset at the owner name.
    DeleteAll,

    /// Replace the RRset of the record's type with this record.
    Modify,

    /// The owner name must have at least one record.
    NameInUse,

    /// The owner name must have no records.
    NameNotInUse,

    /// An RRset of the record's type must exist. With RDATA, it must
    /// also contain a record with that RDATA.
    RrsetExists,

    /// No RRset of the record's type may exist.
    RrsetDoesNotExist,
}

impl UpdateOp {
    /// Returns whether this is a prerequisite rather than an update.
    pub fn is_prerequisite(self) -> bool {
        matches!(
            self,
            Self::NameInUse | Self::NameNotInUse | Self::RrsetExists | Self::RrsetDoesNotExist
        )
    }
}

impl fmt::Display for UpdateOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Delete => "delete",
            Self::DeleteRrset => "delete-rrset",
            Self::DeleteAll => "delete-all",
            Self::Modify => "modify",
            Self::NameInUse => "name-in-use",
            Self::NameNotInUse => "name-not-in-use",
            Self::RrsetExists => "rrset-exists",
            Self::RrsetDoesNotExist => "rrset-does-not-exist",
        })
    }
}

/// One caller-supplied entry of an update batch. The RDATA is opaque
/// wire-format octets.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpdateRecord {
    pub owner: Name,
    pub class: Class,
    pub rr_type: Type,
    pub ttl: Ttl,
    pub op: UpdateOp,
    pub rdata: Vec<u8>,
}

impl UpdateRecord {
    pub fn new(
        owner: Name,
        class: Class,
        rr_type: Type,
        ttl: Ttl,
        op: UpdateOp,
        rdata: Vec<u8>,
    ) -> Self {
        Self {
            owner,
            class,
            rr_type,
            ttl,
            op,
            rdata,
        }
    }

    /// Writes the record into an UPDATE message for a zone of class
    /// `zone_class`, using the class, type, TTL, and RDATA conventions
    /// of [RFC 2136 §§ 2.4–2.5]. [`UpdateOp::Modify`] produces two
    /// records: an RRset deletion followed by an addition.
    ///
    /// [RFC 2136 §§ 2.4–2.5]: https://datatracker.ietf.org/doc/html/rfc2136#section-2.4
    pub fn write_to(&self, writer: &mut Writer, zone_class: Class) -> writer::Result<()> {
        const PREREQUISITE: Section = Section::Answer;
        const UPDATE: Section = Section::Authority;
        let owner = &self.owner;
        let rr_type = self.rr_type;
        match self.op {
            UpdateOp::Add => {
                writer.add_rr(UPDATE, owner, rr_type, zone_class, self.ttl, &self.rdata)
            }
            UpdateOp::Delete => {
                writer.add_rr(UPDATE, owner, rr_type, Class::NONE, Ttl::ZERO, &self.rdata)
            }
            UpdateOp::DeleteRrset => {
                writer.add_rr(UPDATE, owner, rr_type, Class::ANY, Ttl::ZERO, &[])
            }
            UpdateOp::DeleteAll => {
                writer.add_rr(UPDATE, owner, Type::ANY, Class::ANY, Ttl::ZERO, &[])
            }
            UpdateOp::Modify => {
                writer.add_rr(UPDATE, owner, rr_type, Class::ANY, Ttl::ZERO, &[])?;
                writer.add_rr(UPDATE, owner, rr_type, zone_class, self.ttl, &self.rdata)
            }
            UpdateOp::NameInUse => {
                writer.add_rr(PREREQUISITE, owner, Type::ANY, Class::ANY, Ttl::ZERO, &[])
            }
            UpdateOp::NameNotInUse => {
                writer.add_rr(PREREQUISITE, owner, Type::ANY, Class::NONE, Ttl::ZERO, &[])
            }
            UpdateOp::RrsetExists if self.rdata.is_empty() => {
                writer.add_rr(PREREQUISITE, owner, rr_type, Class::ANY, Ttl::ZERO, &[])
            }
            UpdateOp::RrsetExists => {
                writer.add_rr(PREREQUISITE, owner, rr_type, zone_class, Ttl::ZERO, &self.rdata)
            }
            UpdateOp::RrsetDoesNotExist => {
                writer.add_rr(PREREQUISITE, owner, rr_type, Class::NONE, Ttl::ZERO, &[])
            }
        }
    }
}

impl fmt::Display for UpdateRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} ({} octets of RDATA)",
            self.op,
            self.owner,
            self.ttl,
            self.class,
            self.rr_type,
            self.rdata.len()
        )
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
