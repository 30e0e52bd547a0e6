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

//! Implementation of the [`NameBuilder`] structure and text parsing of
//! [`Name`]s.

use std::str::FromStr;

use arrayvec::ArrayVec;

use super::{Error, Name, MAX_LABEL_LEN, MAX_N_LABELS, MAX_WIRE_LEN};

////////////////////////////////////////////////////////////////////////
// NAME BUILDER                                                       //
////////////////////////////////////////////////////////////////////////

/// A facility to build [`Name`]s label by label.
///
/// A new `NameBuilder` starts with an empty current label. Octets are
/// added to it with [`NameBuilder::try_push`] or
/// [`NameBuilder::try_push_slice`], and [`NameBuilder::next_label`]
/// closes it and starts a new one. [`NameBuilder::finish`] closes the
/// name with the null label; a still-empty current label is taken to
/// be that null label.
///
/// ```
/// use quandary_resolv::name::{Name, NameBuilder};
/// let mut builder = NameBuilder::new();
/// builder.try_push_slice(b"example").unwrap();
/// builder.next_label().unwrap();
/// builder.try_push_slice(b"test").unwrap();
/// builder.next_label().unwrap();
/// assert_eq!(builder.finish().unwrap(), "example.test.".parse::<Name>().unwrap());
/// ```
pub struct NameBuilder {
    wire: ArrayVec<u8, MAX_WIRE_LEN>,
    label_offsets: ArrayVec<u8, MAX_N_LABELS>,
    label_start: usize,
}

impl NameBuilder {
    /// Constructs a new `NameBuilder` with an empty current label.
    pub fn new() -> Self {
        let mut wire = ArrayVec::new();
        wire.push(0);
        let mut label_offsets = ArrayVec::new();
        label_offsets.push(0);
        Self {
            wire,
            label_offsets,
            label_start: 0,
        }
    }

    fn label_len(&self) -> usize {
        self.wire.len() - self.label_start - 1
    }

    /// Tries to add the given octet to the current label. In the error
    /// case, the `NameBuilder`'s state remains unchanged.
    pub fn try_push(&mut self, octet: u8) -> Result<(), Error> {
        self.try_push_slice(&[octet])
    }

    /// Tries to add the given octets to the current label. In the error
    /// case, the `NameBuilder`'s state remains unchanged.
    pub fn try_push_slice(&mut self, octets: &[u8]) -> Result<(), Error> {
        if self.label_len() + octets.len() > MAX_LABEL_LEN {
            Err(Error::LabelTooLong)
        } else {
            self.wire
                .try_extend_from_slice(octets)
                .or(Err(Error::NameTooLong))
        }
    }

    /// Finishes the current label and starts a new one. Only the last
    /// label of a name may be null, so this fails if the current label
    /// is empty.
    pub fn next_label(&mut self) -> Result<(), Error> {
        let len = self.label_len();
        if len == 0 {
            Err(Error::NullNonTerminal)
        } else if self.wire.is_full() {
            Err(Error::NameTooLong)
        } else {
            self.wire[self.label_start] = len as u8;
            self.label_start = self.wire.len();
            self.wire.push(0);
            // A label takes at least two octets, so the wire length
            // check above keeps us within MAX_N_LABELS.
            self.label_offsets.push(self.label_start as u8);
            Ok(())
        }
    }

    /// Finishes the name. If the current label is not empty, it is
    /// closed first, so the result is always fully qualified.
    pub fn finish(mut self) -> Result<Name, Error> {
        if self.label_len() > 0 {
            self.next_label()?;
        }
        Ok(Name {
            wire: self.wire,
            label_offsets: self.label_offsets,
        })
    }
}

impl Default for NameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////////////////////////////////
// PARSING OF NAMES FROM RUST STRINGS                                 //
////////////////////////////////////////////////////////////////////////

/// Allows for conversion of a Rust [`str`] into a [`Name`]. The passed
/// string must be strictly ASCII. Escape sequences as defined by
/// [RFC 4343 § 2.1] are supported. Names are always taken to be fully
/// qualified, so `example.test` and `example.test.` are the same name.
///
/// [RFC 4343 § 2.1]: https://datatracker.ietf.org/doc/html/rfc4343#section-2.1
impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::StrEmpty);
        } else if s == "." {
            return Ok(Name::root());
        }

        let mut remaining_octets: &[u8] = s.as_ref();
        let mut builder = NameBuilder::new();

        // NOTE: to check that the string is ASCII, it suffices to check
        // that each octet is ASCII as we go. This is because all
        // multi-byte characters start with an octet that is not ASCII.
        while let Some(&octet) = remaining_octets.first() {
            if octet == b'\\' {
                let (value, consumed) = parse_escape(&remaining_octets[1..])?;
                builder.try_push(value)?;
                remaining_octets = &remaining_octets[consumed + 1..];
            } else if octet == b'.' {
                builder.next_label()?;
                remaining_octets = &remaining_octets[1..];
            } else if !octet.is_ascii() {
                return Err(Error::StrNotAscii);
            } else {
                builder.try_push(octet)?;
                remaining_octets = &remaining_octets[1..];
            }
        }
        builder.finish()
    }
}

/// Parses an escape sequence. We expect `remaining_octets` to start
/// with the octet immediately *after* the backslash that introduces the
/// escape sequence.
fn parse_escape(remaining_octets: &[u8]) -> Result<(u8, usize), Error> {
    match remaining_octets {
        [] => Err(Error::InvalidEscape),
        [h, t, o, ..] if h.is_ascii_digit() && t.is_ascii_digit() && o.is_ascii_digit() => {
            let value = 100 * (h - b'0') as usize + 10 * (t - b'0') as usize + (o - b'0') as usize;
            u8::try_from(value)
                .map(|value| (value, 3))
                .or(Err(Error::InvalidEscape))
        }
        [d, ..] if d.is_ascii_digit() => Err(Error::InvalidEscape),
        [other, ..] => Ok((*other, 1)),
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
