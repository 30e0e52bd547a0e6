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

//! Implementation of parsing of on-the-wire names.

use arrayvec::ArrayVec;

use super::{Error, Name, MAX_LABEL_LEN, MAX_N_LABELS, MAX_WIRE_LEN};

/// The maximum number of pointers followed while parsing one name.
/// Backward-only pointers already guarantee termination; this bounds
/// the work done on hostile input.
const MAX_POINTER_HOPS: usize = 64;

////////////////////////////////////////////////////////////////////////
// PARSING OF UNCOMPRESSED ON-THE-WIRE NAMES                          //
////////////////////////////////////////////////////////////////////////

/// Parses an uncompressed name present at the beginning of `octets`.
/// This is the implementation of [`Name::try_from_uncompressed`].
pub fn parse_uncompressed_name(octets: &[u8]) -> Result<(Name, usize), Error> {
    let mut name = Name {
        wire: ArrayVec::new(),
        label_offsets: ArrayVec::new(),
    };
    let mut offset = 0;
    loop {
        let len = *octets.get(offset).ok_or(Error::UnexpectedEom)?;
        if len & 0xc0 == 0xc0 {
            return Err(Error::InvalidPointer);
        }
        let end_of_label = append_label(&mut name, octets, offset, len)?;
        offset = end_of_label;
        if len == 0 {
            return Ok((name, offset));
        }
    }
}

////////////////////////////////////////////////////////////////////////
// PARSING OF COMPRESSED ON-THE-WIRE NAMES                            //
////////////////////////////////////////////////////////////////////////

/// Parses a compressed name starting at index `start` of `octets`.
/// Pointers are followed. Indices given in pointers are treated as
/// indices of `octets`, so the intention is for an entire DNS message
/// to be passed in `octets`. This is the implementation of
/// [`Name::try_from_compressed`].
pub fn parse_compressed_name(octets: &[u8], start: usize) -> Result<(Name, usize), Error> {
    let mut name = Name {
        wire: ArrayVec::new(),
        label_offsets: ArrayVec::new(),
    };
    let mut chunk_start = start;
    let mut index = start;
    let mut wire_len_of_first_chunk = None;
    let mut hops = 0;

    loop {
        let len = *octets.get(index).ok_or(Error::UnexpectedEom)?;
        if len & 0xc0 == 0xc0 {
            let pointer = parse_pointer(octets, chunk_start, index)?;
            wire_len_of_first_chunk.get_or_insert_with(|| index + 2 - start);
            hops += 1;
            if hops > MAX_POINTER_HOPS {
                return Err(Error::InvalidPointer);
            }
            chunk_start = pointer;
            index = pointer;
        } else {
            index = append_label(&mut name, octets, index, len)?;
            if len == 0 {
                let consumed = *wire_len_of_first_chunk.get_or_insert_with(|| index - start);
                return Ok((name, consumed));
            }
        }
    }
}

/// Appends the label whose length octet `len` is at `index` to `name`,
/// returning the index just past the label.
fn append_label(name: &mut Name, octets: &[u8], index: usize, len: u8) -> Result<usize, Error> {
    if len & 0xc0 != 0 {
        return Err(Error::UnsupportedLabelType);
    } else if len as usize > MAX_LABEL_LEN {
        return Err(Error::LabelTooLong);
    }
    let end_of_label = index + len as usize + 1;
    let label = octets.get(index..end_of_label).ok_or(Error::UnexpectedEom)?;
    // Checking the wire length before recording the offset ensures that
    // label_offsets never overflows.
    if name.wire.len() + label.len() > MAX_WIRE_LEN {
        return Err(Error::NameTooLong);
    }
    debug_assert!(name.label_offsets.len() < MAX_N_LABELS);
    name.label_offsets.push(name.wire.len() as u8);
    name.wire.extend(label.iter().copied());
    Ok(end_of_label)
}

/// Parses a pointer at `index` in `octets`. This also checks that the
/// pointer refers to an index *earlier* than the start of the chunk it
/// is in (`chunk_start`).
fn parse_pointer(octets: &[u8], chunk_start: usize, index: usize) -> Result<usize, Error> {
    let pointer_bytes = octets.get(index..index + 2).ok_or(Error::UnexpectedEom)?;
    let pointer = (u16::from_be_bytes([pointer_bytes[0], pointer_bytes[1]]) & 0x3fff) as usize;
    if pointer >= chunk_start {
        // According to RFC 1035 § 4.1.4, pointers point to a *prior*
        // occurrence of the name. (Importantly, this prevents loops!)
        Err(Error::InvalidPointer)
    } else {
        Ok(pointer)
    }
}

////////////////////////////////////////////////////////////////////////
// SKIPPING OF COMPRESSED ON-THE-WIRE NAMES                           //
////////////////////////////////////////////////////////////////////////

/// Skips a compressed name starting at index `start` of `octets`; this
/// is the implementation of [`Name::skip_compressed`].
pub fn skip_compressed_name(octets: &[u8], start: usize) -> Result<usize, Error> {
    let mut index = start;
    loop {
        let len = *octets.get(index).ok_or(Error::UnexpectedEom)?;
        if len & 0xc0 == 0xc0 {
            if index + 2 > octets.len() {
                return Err(Error::UnexpectedEom);
            }
            return Ok(index + 2 - start);
        } else if len & 0xc0 != 0 {
            return Err(Error::UnsupportedLabelType);
        }
        index += len as usize + 1;
        if index - start > MAX_WIRE_LEN {
            return Err(Error::NameTooLong);
        } else if len == 0 {
            return Ok(index - start);
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
