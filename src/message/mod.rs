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

//! Implementation of reading and writing of DNS messages, and of
//! signing them with TSIG.

mod codes;
mod compose;
pub(crate) mod constants;
mod parsed;
mod question;
pub mod reader;
pub mod tsig;
pub mod writer;

pub use codes::{ExtendedRcode, Opcode, Rcode};
pub use compose::{compose_query, compose_update};
pub use constants::{HEADER_SIZE, MAX_MESSAGE_SIZE, MAX_UDP_SIZE};
pub use parsed::{Header, Message};
pub use question::Question;
pub use reader::{Reader, Record, Section};
pub use writer::Writer;
