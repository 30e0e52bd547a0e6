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

//! Implementation of Secret Key Transaction Authentication for DNS
//! (TSIG), as specified by [RFC 8945] (originally [RFC 2845]).
//!
//! This module implements the two client-side actions: signing an
//! outgoing message with [`sign`] and verifying a reply with
//! [`verify`]. Both compute a MAC over the same data, in this order:
//!
//! 1. for a reply to a signed message (or a continuation), the prior
//!    MAC, prefixed with its 16-bit length;
//! 2. the message up to the TSIG record, with the original ID restored
//!    and the ARCOUNT not counting the TSIG record;
//! 3. the key name and algorithm name in canonical (lowercase) wire
//!    form, separated by the TSIG record's class and TTL;
//! 4. the time signed and fudge; and
//! 5. the error and the length-prefixed other data.
//!
//! Keys are consumed through the [`SigningKey`] trait, so the MAC
//! implementation stays behind a trait object. [`HmacKey`] provides
//! the two algorithms required by [RFC 8945 § 6], HMAC-SHA1 and
//! HMAC-SHA256.
//!
//! [RFC 2845]: https://datatracker.ietf.org/doc/html/rfc2845
//! [RFC 8945]: https://datatracker.ietf.org/doc/html/rfc8945
//! [RFC 8945 § 6]: https://datatracker.ietf.org/doc/html/rfc8945#section-6

use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use hmac::digest::{MacError, OutputSizeUser};
use hmac::{Hmac, Mac};
use lazy_static::lazy_static;
use sha1::Sha1;
use sha2::Sha256;

use super::constants::*;
use super::reader::{self, read_u16, Reader, Section};
use super::ExtendedRcode;
use crate::name::Name;
use crate::rr::{Class, Ttl, Type};

/// The fudge (allowed clock skew, in seconds) used when signing.
pub const DEFAULT_FUDGE: u16 = 300;

////////////////////////////////////////////////////////////////////////
// CLOCKS                                                             //
////////////////////////////////////////////////////////////////////////

/// A source of the current time, in seconds since the UNIX epoch, for
/// signing and for checking the time of signed replies.
pub trait Clock {
    fn now(&self) -> u64;
}

/// A [`Clock`] that reads the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |since| since.as_secs())
    }
}

/// A [`Clock`] stuck at a fixed time.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

////////////////////////////////////////////////////////////////////////
// TSIG ALGORITHMS                                                    //
////////////////////////////////////////////////////////////////////////

lazy_static! {
    static ref HMAC_SHA1_NAME: Name = "hmac-sha1.".parse().unwrap();
    static ref HMAC_SHA256_NAME: Name = "hmac-sha256.".parse().unwrap();
    static ref ALGORITHMS_BY_NAME: HashMap<&'static Name, Algorithm> = HashMap::from([
        (&*HMAC_SHA1_NAME, Algorithm::HmacSha1),
        (&*HMAC_SHA256_NAME, Algorithm::HmacSha256),
    ]);
}

/// A supported TSIG algorithm.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Algorithm {
    HmacSha1,
    HmacSha256,
}

impl Algorithm {
    /// Returns the name assigned (by [RFC 8945 § 6]) to identify this
    /// algorithm.
    ///
    /// [RFC 8945 § 6]: https://datatracker.ietf.org/doc/html/rfc8945#section-6
    pub fn name(&self) -> &'static Name {
        match self {
            Self::HmacSha1 => &HMAC_SHA1_NAME,
            Self::HmacSha256 => &HMAC_SHA256_NAME,
        }
    }

    /// Returns the size of the MAC produced by this algorithm.
    pub fn output_size(&self) -> usize {
        match self {
            Self::HmacSha1 => Hmac::<Sha1>::output_size(),
            Self::HmacSha256 => Hmac::<Sha256>::output_size(),
        }
    }

    /// Finds an algorithm by its name. This returns `None` if the
    /// algorithm is not supported by this implementation.
    pub fn from_name(name: &Name) -> Option<Self> {
        ALGORITHMS_BY_NAME.get(name).copied()
    }
}

impl std::str::FromStr for Algorithm {
    type Err = &'static str;

    fn from_str(text: &str) -> std::result::Result<Self, Self::Err> {
        text.parse::<Name>()
            .ok()
            .and_then(|name| Self::from_name(&name))
            .ok_or("unsupported TSIG algorithm")
    }
}

////////////////////////////////////////////////////////////////////////
// KEYS                                                               //
////////////////////////////////////////////////////////////////////////

/// An abstraction over different MAC implementations. Basically, this
/// wraps the `digest` crate's [`Mac`] trait to give us an object-safe
/// trait (so that we can use `Box<dyn Authenticator>`).
pub trait Authenticator {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> Box<[u8]>;
    fn verify_truncated_left(self: Box<Self>, tag: &[u8]) -> std::result::Result<(), MacError>;
}

impl<M> Authenticator for M
where
    M: Mac,
{
    fn update(&mut self, data: &[u8]) {
        <Self as Mac>::update(self, data);
    }

    fn finalize(self: Box<Self>) -> Box<[u8]> {
        <Self as Mac>::finalize(*self)
            .into_bytes()
            .to_vec()
            .into_boxed_slice()
    }

    fn verify_truncated_left(self: Box<Self>, tag: &[u8]) -> std::result::Result<(), MacError> {
        <Self as Mac>::verify_truncated_left(*self, tag)
    }
}

/// A key that can sign and verify messages. The key material itself
/// stays hidden; callers only obtain fresh [`Authenticator`]s.
pub trait SigningKey {
    /// The key's name. Names are compared case-insensitively.
    fn key_name(&self) -> &Name;

    /// The name of the MAC algorithm the key is used with.
    fn algorithm_name(&self) -> &Name;

    /// The length of an untruncated MAC.
    fn output_size(&self) -> usize;

    /// Starts a new MAC computation with this key.
    fn authenticator(&self) -> Box<dyn Authenticator>;
}

/// A keyed MAC, ready to be cloned for each computation.
#[derive(Clone)]
enum KeyedMac {
    HmacSha1(Hmac<Sha1>),
    HmacSha256(Hmac<Sha256>),
}

/// A shared-secret HMAC key.
#[derive(Clone)]
pub struct HmacKey {
    name: Name,
    algorithm: Algorithm,
    mac: KeyedMac,
}

impl HmacKey {
    /// Creates a key named `name` for `algorithm` from the shared
    /// `secret`.
    pub fn new(name: Name, algorithm: Algorithm, secret: &[u8]) -> Result<Self> {
        let mac = match algorithm {
            Algorithm::HmacSha1 => {
                KeyedMac::HmacSha1(Hmac::new_from_slice(secret).or(Err(Error::InvalidKey))?)
            }
            Algorithm::HmacSha256 => {
                KeyedMac::HmacSha256(Hmac::new_from_slice(secret).or(Err(Error::InvalidKey))?)
            }
        };
        Ok(Self {
            name: name.to_lowercase(),
            algorithm,
            mac,
        })
    }

    /// Returns the key's algorithm.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

impl SigningKey for HmacKey {
    fn key_name(&self) -> &Name {
        &self.name
    }

    fn algorithm_name(&self) -> &Name {
        self.algorithm.name()
    }

    fn output_size(&self) -> usize {
        self.algorithm.output_size()
    }

    fn authenticator(&self) -> Box<dyn Authenticator> {
        match &self.mac {
            KeyedMac::HmacSha1(mac) => Box::new(mac.clone()),
            KeyedMac::HmacSha256(mac) => Box::new(mac.clone()),
        }
    }
}

impl fmt::Debug for HmacKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HmacKey")
            .field("name", &self.name)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

////////////////////////////////////////////////////////////////////////
// TSIG RECORD FIELDS                                                 //
////////////////////////////////////////////////////////////////////////

/// The fields of a TSIG record's RDATA.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TsigFields {
    pub algorithm: Name,
    pub time_signed: u64,
    pub fudge: u16,
    pub mac: Vec<u8>,
    pub original_id: u16,
    pub error: ExtendedRcode,
    pub other: Vec<u8>,
}

impl TsigFields {
    /// Parses TSIG RDATA from a record read out of a message.
    fn parse(record: &reader::Record) -> Result<Self> {
        let (algorithm, mut offset) = record.rdata_name(0)?;
        let rdata = record.rdata;
        let time_signed = read_u48(rdata, offset)?;
        let fudge = read_u16(rdata, offset + 6)?;
        let mac_size = read_u16(rdata, offset + 8)? as usize;
        offset += 10;
        let mac = rdata
            .get(offset..offset + mac_size)
            .ok_or(Error::Format)?
            .to_vec();
        offset += mac_size;
        let original_id = read_u16(rdata, offset)?;
        let error = read_u16(rdata, offset + 2)?.into();
        let other_len = read_u16(rdata, offset + 4)? as usize;
        offset += 6;
        if rdata.len() != offset + other_len {
            return Err(Error::Format);
        }
        Ok(Self {
            algorithm,
            time_signed,
            fudge,
            mac,
            original_id,
            error,
            other: rdata[offset..].to_vec(),
        })
    }

    /// Serializes the RDATA.
    fn serialize(&self) -> Vec<u8> {
        let mut rdata = Vec::with_capacity(self.algorithm.wire_repr().len() + 16 + self.mac.len());
        rdata.extend_from_slice(self.algorithm.wire_repr());
        rdata.extend_from_slice(&u48_bytes(self.time_signed));
        rdata.extend_from_slice(&self.fudge.to_be_bytes());
        rdata.extend_from_slice(&(self.mac.len() as u16).to_be_bytes());
        rdata.extend_from_slice(&self.mac);
        rdata.extend_from_slice(&self.original_id.to_be_bytes());
        rdata.extend_from_slice(&u16::from(self.error).to_be_bytes());
        rdata.extend_from_slice(&(self.other.len() as u16).to_be_bytes());
        rdata.extend_from_slice(&self.other);
        rdata
    }
}

fn read_u48(octets: &[u8], start: usize) -> Result<u64> {
    let field = octets.get(start..start + 6).ok_or(Error::Format)?;
    Ok(field.iter().fold(0, |acc, octet| (acc << 8) | *octet as u64))
}

fn u48_bytes(value: u64) -> [u8; 6] {
    let bytes = value.to_be_bytes();
    [bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]]
}

/// A TSIG record found at the end of a message.
struct LocatedTsig {
    /// The offset of the record's first octet.
    start: usize,
    key_name: Name,
    class: Class,
    ttl: Ttl,
    fields: TsigFields,
}

/// Finds the TSIG record, which must be the last record of the
/// additional section. Returns `None` if the last record is not a TSIG
/// record or the additional section is empty.
fn locate_tsig(message: &[u8]) -> Result<Option<LocatedTsig>> {
    let mut reader = Reader::try_from(message)?;
    let arcount = reader.arcount();
    if arcount == 0 {
        return Ok(None);
    }
    reader.skip_section(Section::Question)?;
    reader.skip_section(Section::Answer)?;
    reader.skip_section(Section::Authority)?;
    for _ in 1..arcount {
        reader.skip_record(Section::Additional)?;
    }
    let start = reader.cursor();
    let record = reader.read_rr()?;
    if record.rr_type != Type::TSIG {
        return Ok(None);
    }
    let fields = TsigFields::parse(&record)?;
    Ok(Some(LocatedTsig {
        start,
        key_name: record.owner,
        class: record.class,
        ttl: record.ttl,
        fields,
    }))
}

////////////////////////////////////////////////////////////////////////
// DIGEST                                                             //
////////////////////////////////////////////////////////////////////////

/// Feeds the TSIG digest inputs to `authenticator`. `message` runs up
/// to the TSIG record; `tsig_counted` tells whether its ARCOUNT already
/// includes the TSIG record (and so must be decremented).
fn add_digest_inputs(
    authenticator: &mut dyn Authenticator,
    prior_mac: Option<&[u8]>,
    message: &[u8],
    tsig_counted: bool,
    key_name: &Name,
    class: Class,
    ttl: Ttl,
    fields: &TsigFields,
) {
    if let Some(prior_mac) = prior_mac {
        authenticator.update(&(prior_mac.len() as u16).to_be_bytes());
        authenticator.update(prior_mac);
    }

    authenticator.update(&fields.original_id.to_be_bytes());
    authenticator.update(&message[ID_END..ARCOUNT_START]);
    let arcount = u16::from_be_bytes([message[ARCOUNT_START], message[ARCOUNT_START + 1]]);
    let arcount = if tsig_counted {
        arcount.wrapping_sub(1)
    } else {
        arcount
    };
    authenticator.update(&arcount.to_be_bytes());
    authenticator.update(&message[ARCOUNT_END..]);

    authenticator.update(key_name.to_lowercase().wire_repr());
    authenticator.update(&u16::from(class).to_be_bytes());
    authenticator.update(&u32::from(ttl).to_be_bytes());
    authenticator.update(fields.algorithm.to_lowercase().wire_repr());
    authenticator.update(&u48_bytes(fields.time_signed));
    authenticator.update(&fields.fudge.to_be_bytes());
    authenticator.update(&u16::from(fields.error).to_be_bytes());
    authenticator.update(&(fields.other.len() as u16).to_be_bytes());
    authenticator.update(&fields.other);
}

////////////////////////////////////////////////////////////////////////
// SIGNING                                                            //
////////////////////////////////////////////////////////////////////////

/// Signs the message occupying `buf[..len]` by appending a TSIG record
/// and incrementing the ARCOUNT. On success, returns the new length of
/// the message and the MAC, which is needed to verify the reply.
///
/// `prior_mac` is for signing a message that continues an exchange
/// (such as a TCP continuation); ordinary requests pass `None`. If the
/// TSIG record does not fit in `buf`, this fails with
/// [`Error::NoSpace`] and `buf` is left as it was.
pub fn sign(
    buf: &mut [u8],
    len: usize,
    key: &dyn SigningKey,
    time_signed: u64,
    fudge: u16,
    prior_mac: Option<&[u8]>,
) -> Result<(usize, Box<[u8]>)> {
    if len < HEADER_SIZE || len > buf.len() {
        return Err(Error::Format);
    }
    let message = &buf[..len];
    let arcount = u16::from_be_bytes([message[ARCOUNT_START], message[ARCOUNT_START + 1]]);
    let new_arcount = arcount.checked_add(1).ok_or(Error::NoSpace)?;

    let mut fields = TsigFields {
        algorithm: key.algorithm_name().to_lowercase(),
        time_signed,
        fudge,
        mac: Vec::new(),
        original_id: u16::from_be_bytes([message[ID_START], message[ID_START + 1]]),
        error: ExtendedRcode::NOERROR,
        other: Vec::new(),
    };
    let mut authenticator = key.authenticator();
    add_digest_inputs(
        authenticator.as_mut(),
        prior_mac,
        message,
        false,
        key.key_name(),
        Class::ANY,
        Ttl::ZERO,
        &fields,
    );
    let mac = authenticator.finalize();
    fields.mac = mac.to_vec();

    let rdata = fields.serialize();
    let owner = key.key_name().wire_repr();
    let rr_len = owner.len() + RR_FIXED_SIZE + rdata.len();
    if buf.len() - len < rr_len || len + rr_len > MAX_MESSAGE_SIZE {
        return Err(Error::NoSpace);
    }
    let mut record = Vec::with_capacity(rr_len);
    record.extend_from_slice(owner);
    record.extend_from_slice(&u16::from(Type::TSIG).to_be_bytes());
    record.extend_from_slice(&u16::from(Class::ANY).to_be_bytes());
    record.extend_from_slice(&0u32.to_be_bytes());
    record.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
    record.extend_from_slice(&rdata);
    buf[len..len + rr_len].copy_from_slice(&record);
    buf[ARCOUNT_START..ARCOUNT_END].copy_from_slice(&new_arcount.to_be_bytes());
    Ok((len + rr_len, mac))
}

////////////////////////////////////////////////////////////////////////
// VERIFICATION                                                       //
////////////////////////////////////////////////////////////////////////

/// The result of a successful verification.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Verified {
    /// The time the message was signed.
    pub time_signed: u64,

    /// The MAC of the message, for verifying later messages of the
    /// same exchange.
    pub mac: Vec<u8>,

    /// The offset at which the TSIG record starts.
    tsig_start: usize,
}

impl Verified {
    /// Removes the verified TSIG record from `buf`, the buffer that was
    /// verified, by decrementing its ARCOUNT. Returns the length of the
    /// message without the record.
    pub fn strip(&self, buf: &mut [u8]) -> usize {
        let arcount = u16::from_be_bytes([buf[ARCOUNT_START], buf[ARCOUNT_START + 1]]);
        buf[ARCOUNT_START..ARCOUNT_END].copy_from_slice(&arcount.saturating_sub(1).to_be_bytes());
        self.tsig_start
    }
}

/// Verifies the TSIG record at the end of `message` against `key`.
///
/// `prior_mac` is the MAC of the signed request when verifying its
/// reply. `now` is the current time in seconds since the UNIX epoch.
/// Checks are made in this order: the key name and algorithm must
/// match `key` (else [`Error::BadKey`]); the MAC must have an
/// acceptable length (else [`Error::Format`]) and be correct (else
/// [`Error::BadSig`]); and `now` must be within the fudge of the time
/// signed (else [`Error::BadTime`]). A correctly signed message that
/// reports a TSIG error fails with [`Error::Reported`]. If the message
/// reports BADSIG or BADKEY, the server could not have signed it, so
/// that error is reported without checking the MAC.
///
/// `message` is never modified; use [`Verified::strip`] to remove the
/// TSIG record afterward.
pub fn verify(
    message: &[u8],
    key: &dyn SigningKey,
    prior_mac: Option<&[u8]>,
    now: u64,
) -> Result<Verified> {
    let tsig = locate_tsig(message)?.ok_or(Error::NoTsig)?;
    let fields = &tsig.fields;

    if fields.error == ExtendedRcode::BADSIG || fields.error == ExtendedRcode::BADKEY {
        return Err(Error::Reported(fields.error));
    } else if tsig.key_name != *key.key_name() || fields.algorithm != *key.algorithm_name() {
        return Err(Error::BadKey);
    }

    check_mac_size(key.output_size(), fields.mac.len())?;
    let mut authenticator = key.authenticator();
    add_digest_inputs(
        authenticator.as_mut(),
        prior_mac,
        &message[..tsig.start],
        true,
        &tsig.key_name,
        tsig.class,
        tsig.ttl,
        fields,
    );
    authenticator
        .verify_truncated_left(&fields.mac)
        .or(Err(Error::BadSig))?;

    check_time(fields.time_signed, fields.fudge, now)?;
    if fields.error != ExtendedRcode::NOERROR {
        return Err(Error::Reported(fields.error));
    }

    Ok(Verified {
        time_signed: fields.time_signed,
        mac: fields.mac.clone(),
        tsig_start: tsig.start,
    })
}

/// Returns whether `message` ends with a TSIG record. Malformed
/// messages are reported as unsigned.
pub fn is_signed(message: &[u8]) -> bool {
    matches!(locate_tsig(message), Ok(Some(_)))
}

/// Ensures that the MAC size is acceptable, per [RFC 8945 § 5.2.2.1].
///
/// [RFC 8945 § 5.2.2.1]: https://datatracker.ietf.org/doc/html/rfc8945#section-5.2.2.1
fn check_mac_size(output_size: usize, mac_size: usize) -> Result<()> {
    let half_output_size = (output_size + 1) / 2;
    if mac_size > output_size || mac_size < 10.max(half_output_size) {
        Err(Error::Format)
    } else {
        Ok(())
    }
}

/// Checks that `time_signed` does not deviate more than `fudge` seconds
/// from `now`.
fn check_time(time_signed: u64, fudge: u16, now: u64) -> Result<()> {
    let time_window_start = time_signed.saturating_sub(fudge as u64);
    let time_window_end = time_signed.saturating_add(fudge as u64);
    if now >= time_window_start && now <= time_window_end {
        Ok(())
    } else {
        Err(Error::BadTime)
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// Errors that arise while signing or verifying.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// The key name or algorithm does not match the key.
    BadKey,

    /// MAC verification failed.
    BadSig,

    /// The time signed is outside the fudge window.
    BadTime,

    /// The message or its TSIG record is malformed, or the MAC length
    /// is unacceptable.
    Format,

    /// The key material was rejected by the MAC implementation.
    InvalidKey,

    /// There is no room for the TSIG record.
    NoSpace,

    /// The message has no TSIG record.
    NoTsig,

    /// The signer reported this TSIG error.
    Reported(ExtendedRcode),
}

impl From<reader::Error> for Error {
    fn from(_: reader::Error) -> Self {
        Self::Format
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::BadKey => f.write_str("BADKEY"),
            Self::BadSig => f.write_str("BADSIG"),
            Self::BadTime => f.write_str("BADTIME"),
            Self::Format => f.write_str("malformed TSIG record"),
            Self::InvalidKey => f.write_str("invalid key"),
            Self::NoSpace => f.write_str("no room for the TSIG record"),
            Self::NoTsig => f.write_str("message is not signed"),
            Self::Reported(err) => write!(f, "signer reported {}", err),
        }
    }
}

impl std::error::Error for Error {}

/// The type returned by fallible TSIG functions.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
