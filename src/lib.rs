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

//! A DNS stub resolver library.
//!
//! [`resolver::Resolver`] sends queries to a configured list of
//! recursive or authoritative servers over UDP and TCP, retrying and
//! failing over between them. On top of it, [`zonecut`] finds the zone
//! enclosing a name along with its name servers, and [`update`] sends
//! [RFC 2136] dynamic updates to those servers, optionally signed with
//! TSIG ([RFC 8945]).
//!
//! [RFC 2136]: https://datatracker.ietf.org/doc/html/rfc2136
//! [RFC 8945]: https://datatracker.ietf.org/doc/html/rfc8945

pub mod message;
pub mod name;
pub mod resolver;
pub mod rr;
pub mod update;
pub mod zonecut;

mod util;
