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

//! Code points that appear in resource records: [`Type`], [`Class`],
//! and [`Ttl`].
//!
//! The resolver treats RDATA as opaque octets, so this module has no
//! RDATA types of its own; [`text`] converts RDATA to and from its
//! presentation format. Types and classes are thin wrappers around
//! [`u16`] with mnemonic [`Display`](fmt::Display) and [`FromStr`]
//! implementations that fall back to the generic forms of
//! [RFC 3597 § 5].
//!
//! [RFC 3597 § 5]: https://datatracker.ietf.org/doc/html/rfc3597#section-5

pub mod text;

use std::fmt;
use std::str::FromStr;

use crate::util::{parse_generic_code, Caseless};

/// Defines a `u16` code-point wrapper with named constants, conversions,
/// and mnemonic text forms.
macro_rules! code_point {
    (
        $(#[$attr:meta])*
        $name:ident, $generic:literal, $what:literal,
        { $($mnemonic:ident = $value:literal),* $(,)? }
    ) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
        pub struct $name(u16);

        impl $name {
            $(pub const $mnemonic: Self = Self($value);)*
        }

        impl From<u16> for $name {
            fn from(value: u16) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u16 {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = &'static str;

            fn from_str(text: &str) -> Result<Self, Self::Err> {
                $(
                    if Caseless(text) == Caseless(stringify!($mnemonic)) {
                        return Ok(Self::$mnemonic);
                    }
                )*
                parse_generic_code(text, $generic)
                    .map(Self)
                    .ok_or(concat!("unknown ", $what))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                match *self {
                    $(Self::$mnemonic => f.write_str(stringify!($mnemonic)),)*
                    Self(value) => write!(f, "{}{}", $generic, value),
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self)
            }
        }
    };
}

////////////////////////////////////////////////////////////////////////
// RR TYPES                                                           //
////////////////////////////////////////////////////////////////////////

code_point! {
    /// The RR type of a DNS record or question.
    ///
    /// Only the types the resolver itself needs, plus a few common
    /// ones for the command-line tool, have named constants. `ANY` is
    /// the QTYPE of [RFC 1035 § 3.2.3], which [RFC 2136] also uses in
    /// the update section to delete all RRsets at a name.
    ///
    /// [RFC 1035 § 3.2.3]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.2.3
    /// [RFC 2136]: https://datatracker.ietf.org/doc/html/rfc2136
    Type, "TYPE", "type",
    {
        A = 1,
        NS = 2,
        CNAME = 5,
        SOA = 6,
        NULL = 10,
        PTR = 12,
        MX = 15,
        TXT = 16,
        AAAA = 28,
        SRV = 33,
        OPT = 41,
        TSIG = 250,
        ANY = 255,
    }
}

////////////////////////////////////////////////////////////////////////
// CLASSES                                                            //
////////////////////////////////////////////////////////////////////////

code_point! {
    /// The class of a DNS record or question.
    ///
    /// `NONE` and `ANY` are meta-classes; dynamic update gives them
    /// special meaning in the prerequisite and update sections, and
    /// TSIG records always carry `ANY`.
    Class, "CLASS", "class",
    {
        IN = 1,
        CH = 3,
        HS = 4,
        NONE = 254,
        ANY = 255,
    }
}

////////////////////////////////////////////////////////////////////////
// TTLS                                                               //
////////////////////////////////////////////////////////////////////////

/// The time to live (TTL) of a DNS record.
///
/// [RFC 2181 § 8] clarified that TTL values are unsigned integers
/// between 0 and 2³¹ - 1, inclusive. A TTL value received with the most
/// significant bit set is interpreted as zero.
///
/// [RFC 2181 § 8]: https://datatracker.ietf.org/doc/html/rfc2181#section-8
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Ttl(u32);

impl Ttl {
    pub const ZERO: Self = Self(0);
}

impl From<u32> for Ttl {
    fn from(raw: u32) -> Self {
        if raw > i32::MAX as u32 {
            Self(0)
        } else {
            Self(raw)
        }
    }
}

impl From<Ttl> for u32 {
    fn from(ttl: Ttl) -> Self {
        ttl.0
    }
}

impl fmt::Debug for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
