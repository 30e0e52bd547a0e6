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

//! The error type of resolver operations.

use std::fmt;
use std::io;

use crate::message::{reader, tsig, writer, ExtendedRcode, Rcode};
use crate::name;

/// An error that ends a resolver operation.
#[derive(Debug)]
pub enum Error {
    /// A message was malformed or too short.
    Format,

    /// A buffer was too small for a message.
    NoSpace,

    /// No server replied in time.
    Timeout,

    /// No server could be reached.
    ConnectionRefused,

    /// The server list is empty.
    NoServers,

    /// An unexpected I/O error occurred.
    Io(io::Error),

    /// A signed reply failed verification, or a reply to a signed
    /// message was not signed.
    BadSignature,

    /// The key named in a signed reply is not the expected key, or the
    /// server did not recognize ours.
    BadKey,

    /// A signed reply was signed too far from the current time, or the
    /// server found our time too far from its own.
    BadTime,

    /// No zone could be found for a name, or the server is not
    /// authoritative for the zone.
    NotZone,

    /// An update batch spans more than one zone.
    CrossZone,

    /// The server replied SERVFAIL.
    ServerFailure,

    /// The server replied REFUSED.
    Refused,

    /// The server replied NOTIMP.
    NotImplemented,

    /// The server replied NXDOMAIN.
    NameError,

    /// The server replied with another error code.
    Rcode(Rcode),
}

impl Error {
    /// Maps a reply code to its error. Returns `None` for
    /// [`Rcode::NoError`].
    pub fn from_rcode(rcode: Rcode) -> Option<Self> {
        match rcode {
            Rcode::NoError => None,
            Rcode::FormErr => Some(Self::Format),
            Rcode::ServFail => Some(Self::ServerFailure),
            Rcode::NxDomain => Some(Self::NameError),
            Rcode::NotImp => Some(Self::NotImplemented),
            Rcode::Refused => Some(Self::Refused),
            Rcode::NotZone => Some(Self::NotZone),
            other => Some(Self::Rcode(other)),
        }
    }

    /// Returns whether this is a signature failure, as opposed to a key
    /// or time problem.
    pub fn is_bad_signature(&self) -> bool {
        matches!(self, Self::BadSignature)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Format => f.write_str("malformed message"),
            Self::NoSpace => f.write_str("message does not fit in the buffer"),
            Self::Timeout => f.write_str("timed out waiting for a reply"),
            Self::ConnectionRefused => f.write_str("no server could be reached"),
            Self::NoServers => f.write_str("no servers are configured"),
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::BadSignature => f.write_str("TSIG signature verification failed"),
            Self::BadKey => f.write_str("TSIG key not recognized"),
            Self::BadTime => f.write_str("TSIG time outside the allowed window"),
            Self::NotZone => f.write_str("no enclosing zone found"),
            Self::CrossZone => f.write_str("update spans more than one zone"),
            Self::ServerFailure => f.write_str("server failure (SERVFAIL)"),
            Self::Refused => f.write_str("query refused (REFUSED)"),
            Self::NotImplemented => f.write_str("not implemented (NOTIMP)"),
            Self::NameError => f.write_str("name does not exist (NXDOMAIN)"),
            Self::Rcode(rcode) => write!(f, "server replied {}", rcode),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout,
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused,
            _ => Self::Io(e),
        }
    }
}

impl From<name::Error> for Error {
    fn from(_: name::Error) -> Self {
        Self::Format
    }
}

impl From<reader::Error> for Error {
    fn from(_: reader::Error) -> Self {
        Self::Format
    }
}

impl From<writer::Error> for Error {
    fn from(e: writer::Error) -> Self {
        match e {
            writer::Error::OutOfOrder => Self::Format,
            _ => Self::NoSpace,
        }
    }
}

impl From<tsig::Error> for Error {
    fn from(e: tsig::Error) -> Self {
        match e {
            tsig::Error::BadKey | tsig::Error::InvalidKey => Self::BadKey,
            tsig::Error::BadTime => Self::BadTime,
            tsig::Error::Format => Self::Format,
            tsig::Error::NoSpace => Self::NoSpace,
            tsig::Error::BadSig | tsig::Error::NoTsig => Self::BadSignature,
            tsig::Error::Reported(ExtendedRcode::BADKEY) => Self::BadKey,
            tsig::Error::Reported(ExtendedRcode::BADTIME) => Self::BadTime,
            tsig::Error::Reported(_) => Self::BadSignature,
        }
    }
}

/// The type returned by fallible resolver operations.
pub type Result<T> = std::result::Result<T, Error>;
