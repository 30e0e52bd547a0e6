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

//! Presentation-format RDATA for the handful of types a resolver
//! front end needs to read and print.
//!
//! Any type may use the generic form of [RFC 3597 § 5],
//! `\# <length> <hex>`. A, AAAA, NS, CNAME, PTR, and TXT also accept
//! their usual text forms.
//!
//! [RFC 3597 § 5]: https://datatracker.ietf.org/doc/html/rfc3597#section-5

use std::fmt::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr};

use super::Type;
use crate::name::{self, Name};
use crate::util::{hex_decode, hex_encode};

/// An error signaling invalid presentation-format RDATA.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// The `\#` form had a bad length or bad hex digits.
    InvalidGeneric,
    InvalidIpv4,
    InvalidIpv6,
    InvalidName(name::Error),
    /// A TXT string was longer than 255 octets, was missing its closing
    /// quote, or had a bad escape.
    InvalidCharacterString,
    /// The type has no text form here, so `\#` is required.
    GenericRequired,
    Empty,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidGeneric => f.write_str("invalid \\# RDATA"),
            Self::InvalidIpv4 => f.write_str("invalid IPv4 address"),
            Self::InvalidIpv6 => f.write_str("invalid IPv6 address"),
            Self::InvalidName(e) => write!(f, "invalid domain name: {}", e),
            Self::InvalidCharacterString => f.write_str("invalid <character-string>"),
            Self::GenericRequired => f.write_str("RDATA of this type must use the \\# form"),
            Self::Empty => f.write_str("RDATA is missing"),
        }
    }
}

impl std::error::Error for Error {}

/// Parses the presentation-format RDATA `text` for a record of type
/// `rr_type` into wire format.
pub fn parse_rdata(rr_type: Type, text: &str) -> Result<Vec<u8>, Error> {
    let text = text.trim();
    if let Some(generic) = text.strip_prefix("\\#") {
        return parse_generic(generic);
    } else if text.is_empty() {
        return Err(Error::Empty);
    }
    match rr_type {
        Type::A => text
            .parse::<Ipv4Addr>()
            .map(|ip| ip.octets().to_vec())
            .map_err(|_| Error::InvalidIpv4),
        Type::AAAA => text
            .parse::<Ipv6Addr>()
            .map(|ip| ip.octets().to_vec())
            .map_err(|_| Error::InvalidIpv6),
        Type::NS | Type::CNAME | Type::PTR => text
            .parse::<Name>()
            .map(|name| name.wire_repr().to_vec())
            .map_err(Error::InvalidName),
        Type::TXT => parse_txt(text),
        _ => Err(Error::GenericRequired),
    }
}

fn parse_generic(text: &str) -> Result<Vec<u8>, Error> {
    let text = text.trim_start();
    let (len, hex) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    let len: usize = len.parse().map_err(|_| Error::InvalidGeneric)?;
    let octets = hex_decode(hex).ok_or(Error::InvalidGeneric)?;
    if octets.len() == len && len <= u16::MAX as usize {
        Ok(octets)
    } else {
        Err(Error::InvalidGeneric)
    }
}

/// Parses one or more `<character-string>`s, quoted or not, into TXT
/// RDATA.
fn parse_txt(text: &str) -> Result<Vec<u8>, Error> {
    let mut rdata = Vec::new();
    let mut octets = text.bytes().peekable();
    loop {
        while octets.next_if(u8::is_ascii_whitespace).is_some() {}
        let quoted = match octets.peek() {
            None => break,
            Some(b'"') => {
                octets.next();
                true
            }
            Some(_) => false,
        };

        let mut string = Vec::new();
        let mut closed = !quoted;
        while let Some(octet) = octets.next() {
            match octet {
                b'"' if quoted => {
                    closed = true;
                    break;
                }
                b'\\' => string.push(parse_escape(&mut octets)?),
                o if !quoted && o.is_ascii_whitespace() => break,
                o => string.push(o),
            }
        }
        if !closed || string.len() > 255 {
            return Err(Error::InvalidCharacterString);
        }
        rdata.push(string.len() as u8);
        rdata.extend_from_slice(&string);
    }
    Ok(rdata)
}

/// Parses the rest of an escape sequence (`\X` or `\DDD`) after the
/// backslash.
fn parse_escape(octets: &mut impl Iterator<Item = u8>) -> Result<u8, Error> {
    let first = octets.next().ok_or(Error::InvalidCharacterString)?;
    if !first.is_ascii_digit() {
        return Ok(first);
    }
    let mut value = (first - b'0') as u16;
    for _ in 0..2 {
        match octets.next() {
            Some(digit) if digit.is_ascii_digit() => value = value * 10 + (digit - b'0') as u16,
            _ => return Err(Error::InvalidCharacterString),
        }
    }
    u8::try_from(value).map_err(|_| Error::InvalidCharacterString)
}

/// Displays uncompressed wire-format RDATA of type `rr_type` in
/// presentation format. RDATA that is malformed for its type, or of a
/// type without a text form here, is shown in the `\#` form.
pub struct DisplayRdata<'a> {
    pub rr_type: Type,
    pub rdata: &'a [u8],
}

impl fmt::Display for DisplayRdata<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let rdata = self.rdata;
        match self.rr_type {
            Type::A => {
                if let Ok(octets) = <[u8; 4]>::try_from(rdata) {
                    return write!(f, "{}", Ipv4Addr::from(octets));
                }
            }
            Type::AAAA => {
                if let Ok(octets) = <[u8; 16]>::try_from(rdata) {
                    return write!(f, "{}", Ipv6Addr::from(octets));
                }
            }
            Type::NS | Type::CNAME | Type::PTR => {
                if let Ok((name, len)) = Name::try_from_uncompressed(rdata) {
                    if len == rdata.len() {
                        return write!(f, "{}", name);
                    }
                }
            }
            Type::TXT => {
                if let Some(strings) = split_character_strings(rdata) {
                    return write_txt(f, &strings);
                }
            }
            _ => (),
        }
        write!(f, "\\# {}", rdata.len())?;
        if !rdata.is_empty() {
            write!(f, " {}", hex_encode(rdata))?;
        }
        Ok(())
    }
}

fn split_character_strings(mut rdata: &[u8]) -> Option<Vec<&[u8]>> {
    let mut strings = Vec::new();
    while let Some((&len, rest)) = rdata.split_first() {
        let len = len as usize;
        strings.push(rest.get(..len)?);
        rdata = &rest[len..];
    }
    Some(strings)
}

fn write_txt(f: &mut fmt::Formatter, strings: &[&[u8]]) -> fmt::Result {
    for (i, string) in strings.iter().enumerate() {
        if i > 0 {
            f.write_char(' ')?;
        }
        f.write_char('"')?;
        for &octet in string.iter() {
            if octet == b'"' || octet == b'\\' {
                write!(f, "\\{}", octet as char)?;
            } else if octet == b' ' || octet.is_ascii_graphic() {
                f.write_char(octet as char)?;
            } else {
                write!(f, "\\{:03}", octet)?;
            }
        }
        f.write_char('"')?;
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
