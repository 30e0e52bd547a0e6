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

//! Implementation of the [`Name`] type for domain names.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FusedIterator;

use arrayvec::ArrayVec;

mod builder;
mod error;
mod wire;
pub use builder::NameBuilder;
pub use error::Error;

/// The maximum number of labels in a domain name.
const MAX_N_LABELS: usize = 128;

/// The maximum length of the uncompressed on-the-wire representation of
/// a domain name.
const MAX_WIRE_LEN: usize = 255;

/// The maximum length of a label in a domain name (not including the
/// octet that provides the length).
const MAX_LABEL_LEN: usize = 63;

////////////////////////////////////////////////////////////////////////
// NAME STRUCTURE                                                     //
////////////////////////////////////////////////////////////////////////

/// A domain name.
///
/// A `Name` stores the uncompressed on-the-wire representation of a
/// fully qualified domain name ([RFC 1035 § 3.1]) together with the
/// offset of each label in it. Both live in fixed-size inline buffers,
/// so a `Name` never allocates. The last label is always the null
/// label, and it is counted by [`Name::len`]; the root therefore has
/// length 1.
///
/// `Name`s can be constructed:
///
/// * through the [`FromStr`](std::str::FromStr) implementation (a
///   missing trailing `.` is implied);
/// * through a [`NameBuilder`];
/// * from uncompressed on-the-wire names through
///   [`Name::try_from_uncompressed`]; and
/// * from compressed on-the-wire names through
///   [`Name::try_from_compressed`].
///
/// Equality and hashing are ASCII-case-insensitive, per [RFC 4343].
///
/// [RFC 1035 § 3.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.1
/// [RFC 4343]: https://datatracker.ietf.org/doc/html/rfc4343
#[derive(Clone)]
pub struct Name {
    wire: ArrayVec<u8, MAX_WIRE_LEN>,
    label_offsets: ArrayVec<u8, MAX_N_LABELS>,
}

#[allow(clippy::len_without_is_empty)] // A domain name is never empty!
impl Name {
    /// Returns the name of the DNS root, `.`.
    pub fn root() -> Self {
        let mut wire = ArrayVec::new();
        wire.push(0);
        let mut label_offsets = ArrayVec::new();
        label_offsets.push(0);
        Self {
            wire,
            label_offsets,
        }
    }

    /// Returns whether this `Name` is equal to or a subdomain of
    /// `other`.
    pub fn eq_or_subdomain_of(&self, other: &Name) -> bool {
        self.len() >= other.len()
            && self
                .labels()
                .rev()
                .zip(other.labels().rev())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// Returns whether this `Name` is a subdomain of `other` but not
    /// equal to it.
    pub fn is_strict_subdomain_of(&self, other: &Name) -> bool {
        self.len() > other.len() && self.eq_or_subdomain_of(other)
    }

    /// Returns whether the `Name` is the DNS root `.`.
    pub fn is_root(&self) -> bool {
        self.len() == 1
    }

    /// Returns label `n` of the name, without its length octet.
    ///
    /// # Panics
    ///
    /// Panics if `n` is not less than [`Name::len`].
    pub fn label(&self, n: usize) -> &[u8] {
        let start = self.label_offsets[n] as usize;
        let len = self.wire[start] as usize;
        &self.wire[start + 1..start + 1 + len]
    }

    /// Returns an iterator over the labels of this `Name`, including
    /// the terminal null label.
    pub fn labels(&self) -> Labels {
        Labels {
            name: self,
            front: 0,
            back: self.len(),
        }
    }

    /// Returns the number of labels in this `Name`, including the null
    /// label.
    pub fn len(&self) -> usize {
        self.label_offsets.len()
    }

    /// Makes all ASCII letters in this `Name` lowercase. Length octets
    /// are never affected, since they are at most 63.
    pub fn make_ascii_lowercase(&mut self) {
        self.wire.make_ascii_lowercase();
    }

    /// Returns a copy of this `Name` with all ASCII letters lowercase.
    /// This is the canonical form used in TSIG digests.
    pub fn to_lowercase(&self) -> Self {
        let mut lower = self.clone();
        lower.make_ascii_lowercase();
        lower
    }

    /// Returns the name obtained by removing the first label, or `None`
    /// for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            self.superdomain(1)
        }
    }

    /// Tries to skip a compressed name starting at index `start` of
    /// `octets`, returning the number of octets occupied by the name at
    /// `start`. Skipping stops at the null label or the first pointer,
    /// whichever comes first; pointer targets are not examined.
    pub fn skip_compressed(octets: &[u8], start: usize) -> Result<usize, Error> {
        wire::skip_compressed_name(octets, start)
    }

    /// Returns the superdomain obtained by skipping the first `skip`
    /// labels of the `Name`, or `None` if there aren't enough labels.
    pub fn superdomain(&self, skip: usize) -> Option<Self> {
        if skip < self.len() {
            let base = self.label_offsets[skip];
            let wire = self.wire[base as usize..].iter().copied().collect();
            let label_offsets = self.label_offsets[skip..]
                .iter()
                .map(|offset| offset - base)
                .collect();
            Some(Self {
                wire,
                label_offsets,
            })
        } else {
            None
        }
    }

    /// Tries to parse a compressed name present at index `start` of
    /// `octets`. Pointers are followed; indices given in pointers are
    /// treated as indices of `octets`, so generally one passes an
    /// entire DNS message. Each pointer must refer to an index strictly
    /// before the start of the run of labels that contains it, which
    /// also guarantees termination.
    ///
    /// On success, this returns the `Name` and the number of contiguous
    /// octets it occupies at `start` (2 if `start` holds a pointer).
    pub fn try_from_compressed(octets: &[u8], start: usize) -> Result<(Self, usize), Error> {
        wire::parse_compressed_name(octets, start)
    }

    /// Tries to parse an uncompressed name at the beginning of
    /// `octets`, returning it together with its on-the-wire length.
    pub fn try_from_uncompressed(octets: &[u8]) -> Result<(Self, usize), Error> {
        wire::parse_uncompressed_name(octets)
    }

    /// Returns the uncompressed on-the-wire representation of the name.
    pub fn wire_repr(&self) -> &[u8] {
        &self.wire
    }

    /// Returns the on-the-wire representation of the superdomain
    /// starting at label `n`.
    ///
    /// # Panics
    ///
    /// Panics if `n` is not less than [`Name::len`].
    pub fn wire_repr_from(&self, n: usize) -> &[u8] {
        &self.wire[self.label_offsets[n] as usize..]
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in self.labels().filter(|label| !label.is_empty()) {
            for octet in label {
                if *octet == b'.' {
                    f.write_str("\\.")?;
                } else if *octet == b'\\' {
                    f.write_str("\\\\")?;
                } else if octet.is_ascii_graphic() {
                    write!(f, "{}", *octet as char)?;
                } else {
                    write!(f, "\\{:03}", *octet)?;
                }
            }
            f.write_str(".")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.wire.eq_ignore_ascii_case(&other.wire)
    }
}

impl Eq for Name {}

// For use in HashMaps, this must agree with the case-insensitive Eq.
impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for octet in &self.wire {
            state.write_u8(octet.to_ascii_lowercase());
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ITERATION OVER A NAME'S LABELS                                     //
////////////////////////////////////////////////////////////////////////

/// An iterator over the labels of a [`Name`], as octet slices.
pub struct Labels<'a> {
    name: &'a Name,
    front: usize,
    back: usize,
}

impl<'a> Iterator for Labels<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.front < self.back {
            let this_one = self.front;
            self.front += 1;
            Some(self.name.label(this_one))
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.back - self.front;
        (len, Some(len))
    }
}

impl DoubleEndedIterator for Labels<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.back > self.front {
            self.back -= 1;
            Some(self.name.label(self.back))
        } else {
            None
        }
    }
}

impl ExactSizeIterator for Labels<'_> {}

impl FusedIterator for Labels<'_> {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
