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

//! Implements command-line argument parsing.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::anyhow;
use clap::{Parser, Subcommand};

use quandary_resolv::name::Name;
use quandary_resolv::rr::{Class, Type};

/// Parses the command line arguments.
pub fn parse() -> Args {
    Args::parse()
}

/// Queries, zone discovery, and dynamic updates against DNS servers
#[derive(Debug, Parser)]
#[command(author, version)]
pub struct Args {
    /// Set the configuration file to use
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Set the servers to use, replacing those in the configuration
    #[arg(
        long = "server",
        short = 's',
        global = true,
        value_delimiter = ',',
        value_name = "IP[:PORT]"
    )]
    pub servers: Vec<ServerAddr>,

    /// Always use TCP
    #[arg(long, global = true)]
    pub tcp: bool,

    /// Set the base timeout of an attempt
    #[arg(long, global = true, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Set the number of passes over the server list
    #[arg(long, global = true, value_name = "N")]
    pub retries: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a query and print the reply
    Query(QueryArgs),

    /// Find the zone enclosing a name and its name servers
    Zone(ZoneArgs),

    /// Send a dynamic update
    Update(UpdateArgs),
}

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// The name to look up
    pub name: Name,

    /// The record type
    #[arg(default_value = "A")]
    pub rr_type: Type,

    /// The record class
    #[arg(default_value = "IN")]
    pub class: Class,

    /// Clear the RD (recursion desired) bit
    #[arg(long)]
    pub norecurse: bool,
}

#[derive(Debug, Parser)]
pub struct ZoneArgs {
    /// The name whose zone to find
    pub name: Name,

    /// The zone class
    #[arg(long, default_value = "IN")]
    pub class: Class,

    /// Resolve every name server instead of stopping early
    #[arg(long)]
    pub exhaustive: bool,

    /// Only look up IPv4 addresses
    #[arg(long, short = '4', conflicts_with = "ipv6")]
    pub ipv4: bool,

    /// Only look up IPv6 addresses
    #[arg(long, short = '6')]
    pub ipv6: bool,
}

#[derive(Debug, Parser)]
pub struct UpdateArgs {
    /// Add a record
    #[arg(long, value_name = "OWNER [TTL] TYPE RDATA")]
    pub add: Vec<RecordSpec>,

    /// Delete a record, an RRset (no RDATA), or a name (no type)
    #[arg(long, value_name = "OWNER [TYPE [RDATA]]")]
    pub delete: Vec<RecordSpec>,

    /// Replace an RRset with a single record
    #[arg(long, value_name = "OWNER [TTL] TYPE RDATA")]
    pub replace: Vec<RecordSpec>,

    /// Require that a name, an RRset, or a record exists
    #[arg(long, value_name = "OWNER [TYPE [RDATA]]")]
    pub require: Vec<RecordSpec>,

    /// Require that a name or an RRset does not exist
    #[arg(long, value_name = "OWNER [TYPE]")]
    pub prohibit: Vec<RecordSpec>,

    /// The class of the records
    #[arg(long, default_value = "IN")]
    pub class: Class,

    /// Allow the update to span several zones
    #[arg(long)]
    pub multi_zone: bool,
}

/// A server given as an IP address, with an optional port.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ServerAddr {
    pub ip: IpAddr,
    pub port: Option<u16>,
}

impl ServerAddr {
    /// Returns the socket address, using `default_port` if no port was
    /// given.
    pub fn socket_addr(&self, default_port: u16) -> SocketAddr {
        SocketAddr::new(self.ip, self.port.unwrap_or(default_port))
    }
}

impl FromStr for ServerAddr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(ip) = s.parse() {
            Ok(Self { ip, port: None })
        } else if let Ok(addr) = s.parse::<SocketAddr>() {
            Ok(Self {
                ip: addr.ip(),
                port: Some(addr.port()),
            })
        } else {
            Err(anyhow!("expected an IP address, optionally with a port"))
        }
    }
}

/// A record given on the command line: an owner name, then an optional
/// TTL, an optional type, and RDATA in presentation format. The RDATA
/// is kept as text until the type is known to be present.
#[derive(Clone, Debug)]
pub struct RecordSpec {
    pub owner: Name,
    pub ttl: Option<u32>,
    pub rr_type: Option<Type>,
    pub rdata: Option<String>,
}

impl FromStr for RecordSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, mut rest) = split_field(s);
        let owner = owner
            .parse()
            .map_err(|e| anyhow!("invalid owner name: {}", e))?;

        let mut ttl = None;
        let (field, after) = split_field(rest);
        if !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit()) {
            ttl = Some(field.parse().map_err(|_| anyhow!("TTL out of range"))?);
            rest = after;
        }

        let mut rr_type = None;
        let (field, after) = split_field(rest);
        if !field.is_empty() {
            rr_type = Some(
                field
                    .parse()
                    .map_err(|e| anyhow!("invalid type {}: {}", field, e))?,
            );
            rest = after;
        }

        let rdata = Some(rest.to_owned()).filter(|r| !r.is_empty());
        Ok(Self {
            owner,
            ttl,
            rr_type,
            rdata,
        })
    }
}

/// Splits off the first whitespace-separated field of `s`, returning
/// the field and the rest (with leading whitespace removed).
fn split_field(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.split_once(char::is_whitespace) {
        Some((field, rest)) => (field, rest.trim_start()),
        None => (s, ""),
    }
}
