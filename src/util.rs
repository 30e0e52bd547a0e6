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

//! Small text helpers shared by the code-point types and the
//! presentation of opaque RDATA.

/// A wrapper around [`str`] references whose [`PartialEq`] and [`Eq`]
/// implementations are ASCII-case-insensitive. This makes it possible
/// to `match` mnemonics without allocating.
pub struct Caseless<'a>(pub &'a str);

impl PartialEq for Caseless<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(other.0)
    }
}

impl Eq for Caseless<'_> {}

/// Parses `text` as `<prefix><u16>`, with the prefix matched
/// case-insensitively. This is the generic RFC 3597 § 5 form for types
/// (`TYPE65280`) and classes (`CLASS65280`).
pub fn parse_generic_code(text: &str, prefix: &str) -> Option<u16> {
    let split = prefix.len();
    let head = text.get(..split)?;
    if head.eq_ignore_ascii_case(prefix) {
        text[split..].parse().ok()
    } else {
        None
    }
}

/// Converts a nibble into an ASCII hex character. Lower-case hex digits
/// are used. The passed value must be less than 16.
fn nibble_to_ascii_hex_digit(nibble: u8) -> char {
    debug_assert!(nibble < 16);
    if nibble < 10 {
        (b'0' + nibble) as char
    } else {
        (b'a' + nibble - 10) as char
    }
}

/// Converts an ASCII hexadecimal digit to its numeric value.
fn ascii_hex_digit_to_nibble(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        _ => None,
    }
}

/// Encodes `octets` as lower-case hexadecimal.
pub fn hex_encode(octets: &[u8]) -> String {
    let mut text = String::with_capacity(octets.len() * 2);
    for octet in octets {
        text.push(nibble_to_ascii_hex_digit(octet >> 4));
        text.push(nibble_to_ascii_hex_digit(octet & 0xf));
    }
    text
}

/// Decodes hexadecimal text, ignoring ASCII whitespace between digits.
/// This returns [`None`] if a non-hex character appears or the number
/// of digits is odd.
pub fn hex_decode(text: &str) -> Option<Vec<u8>> {
    let mut octets = Vec::with_capacity(text.len() / 2);
    let mut high = None;
    for digit in text.bytes().filter(|b| !b.is_ascii_whitespace()) {
        let nibble = ascii_hex_digit_to_nibble(digit)?;
        match high.take() {
            Some(h) => octets.push((h << 4) | nibble),
            None => high = Some(nibble),
        }
    }
    if high.is_some() {
        None
    } else {
        Some(octets)
    }
}
