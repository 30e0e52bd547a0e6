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

//! Discovery of the zone enclosing a name and of its name servers.
//!
//! [`find_zone_cut`] works in three steps, any of which may end the
//! discovery early once enough server addresses are known:
//!
//! 1. Starting at the name, query for its SOA record, removing a label
//!    after every query that does not reveal the zone. An SOA in the
//!    answer section owned by the name or one of its superdomains, or
//!    an SOA in the authority section owned by a strict superdomain,
//!    names the zone. Reaching the root without finding one makes the
//!    root the zone. CNAME answers are followed.
//! 2. Query the zone's origin for its NS records, keeping any glue
//!    addresses from the additional section.
//! 3. Query for the addresses of name servers still without any, and
//!    drop those that end up with none.

mod cache;

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use log::debug;

use crate::message::{Message, Question, Rcode, Record, Section, MAX_MESSAGE_SIZE};
use crate::name::Name;
use crate::resolver::{Error, Network, Resolver, Result};
use crate::rr::{Class, Type};

pub use cache::{MemoryZoneCache, ZoneCache};

/// The longest chain of CNAME records followed while looking for the
/// zone of a name.
const MAX_CNAME_HOPS: usize = 8;

////////////////////////////////////////////////////////////////////////
// ZONE CUTS                                                          //
////////////////////////////////////////////////////////////////////////

/// A zone and the name servers found for it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ZoneCut {
    pub origin: Name,
    pub class: Class,
    pub nameservers: Vec<Nameserver>,
}

/// A name server and its known addresses.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Nameserver {
    pub name: Name,
    pub addresses: Vec<IpAddr>,
}

impl ZoneCut {
    fn new(origin: Name, class: Class) -> Self {
        Self {
            origin,
            class,
            nameservers: Vec::new(),
        }
    }

    /// Returns every known server address, in discovery order and
    /// without duplicates.
    pub fn addresses(&self) -> Vec<IpAddr> {
        let mut addresses = Vec::new();
        for address in self.nameservers.iter().flat_map(|ns| &ns.addresses) {
            if !addresses.contains(address) {
                addresses.push(*address);
            }
        }
        addresses
    }

    /// Returns the server addresses paired with `port`.
    pub fn socket_addrs(&self, port: u16) -> Vec<SocketAddr> {
        self.addresses()
            .into_iter()
            .map(|ip| SocketAddr::new(ip, port))
            .collect()
    }

    fn nameserver_mut(&mut self, name: &Name) -> Option<&mut Nameserver> {
        self.nameservers.iter_mut().find(|ns| ns.name == *name)
    }

    fn add_nameserver(&mut self, name: Name) {
        if self.nameserver_mut(&name).is_none() {
            self.nameservers.push(Nameserver {
                name,
                addresses: Vec::new(),
            });
        }
    }
}

impl fmt::Display for ZoneCut {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.origin, self.class)?;
        for ns in &self.nameservers {
            write!(f, "\n  {}", ns.name)?;
            for address in &ns.addresses {
                write!(f, " {}", address)?;
            }
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// OPTIONS                                                            //
////////////////////////////////////////////////////////////////////////

/// The address families of interest.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddressFamily {
    Both,
    V4Only,
    V6Only,
}

impl AddressFamily {
    fn wants(self, rr_type: Type) -> bool {
        match self {
            Self::Both => rr_type == Type::A || rr_type == Type::AAAA,
            Self::V4Only => rr_type == Type::A,
            Self::V6Only => rr_type == Type::AAAA,
        }
    }

    fn address_types(self) -> &'static [Type] {
        match self {
            Self::Both => &[Type::A, Type::AAAA],
            Self::V4Only => &[Type::A],
            Self::V6Only => &[Type::AAAA],
        }
    }
}

/// Options for [`find_zone_cut`].
#[derive(Clone, Debug)]
pub struct ZoneCutOptions {
    /// Discovery stops as soon as this many server addresses are
    /// known.
    pub wanted_addresses: usize,

    /// Disables stopping early.
    pub exhaustive: bool,

    pub family: AddressFamily,

    /// Whether the zone cache is consulted.
    pub use_cache: bool,
}

impl Default for ZoneCutOptions {
    fn default() -> Self {
        Self {
            wanted_addresses: 8,
            exhaustive: false,
            family: AddressFamily::Both,
            use_cache: true,
        }
    }
}

impl ZoneCutOptions {
    fn satisfied_by(&self, cut: &ZoneCut) -> bool {
        !self.exhaustive && cut.addresses().len() >= self.wanted_addresses
    }
}

/// The result of [`find_zone_cut`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FoundZoneCut {
    pub cut: ZoneCut,

    /// Whether the cut came from the zone cache.
    pub from_cache: bool,
}

////////////////////////////////////////////////////////////////////////
// DISCOVERY                                                          //
////////////////////////////////////////////////////////////////////////

/// Finds the zone of class `class` enclosing `name`, and its name
/// servers, by querying through `resolver`.
///
/// A name with no SOA record anywhere above it is in the root zone.
/// Transport errors and error reply codes (other than NXDOMAIN, which
/// is expected while walking up the tree) end the discovery.
pub fn find_zone_cut<N: Network>(
    resolver: &mut Resolver<N>,
    name: &Name,
    class: Class,
    options: &ZoneCutOptions,
    mut cache: Option<&mut dyn ZoneCache>,
) -> Result<FoundZoneCut> {
    let name = name.to_lowercase();
    if options.use_cache {
        if let Some(cut) = cache.as_ref().and_then(|c| c.lookup(&name, class)) {
            debug!("zone of {} is {} (cached)", name, cut.origin);
            return Ok(FoundZoneCut {
                cut,
                from_cache: true,
            });
        }
    }

    let mut discovery = Discovery {
        resolver,
        options,
        buf: vec![0; MAX_MESSAGE_SIZE],
    };
    let cut = discovery.run(name, class)?;
    // A root cut encloses every name and would shadow all later lookups.
    if !cut.origin.is_root() && !cut.addresses().is_empty() {
        if let Some(cache) = cache.as_mut() {
            cache.store(&cut);
        }
    }
    Ok(FoundZoneCut {
        cut,
        from_cache: false,
    })
}

struct Discovery<'r, 'o, N: Network> {
    resolver: &'r mut Resolver<N>,
    options: &'o ZoneCutOptions,
    buf: Vec<u8>,
}

impl<N: Network> Discovery<'_, '_, N> {
    fn run(&mut self, name: Name, class: Class) -> Result<ZoneCut> {
        let mut cut = self.find_origin(name, class)?;
        debug!("found zone {} {}", cut.origin, class);
        if self.options.satisfied_by(&cut) {
            return Ok(cut);
        }

        if cut.nameservers.is_empty() {
            self.find_nameservers(&mut cut)?;
            if self.options.satisfied_by(&cut) {
                return Ok(cut);
            }
        }

        self.find_addresses(&mut cut)?;
        cut.nameservers.retain(|ns| {
            if ns.addresses.is_empty() {
                debug!("dropping name server {}, which has no addresses", ns.name);
            }
            !ns.addresses.is_empty()
        });
        Ok(cut)
    }

    /// Sends a query and returns the length of the reply, failing on
    /// error reply codes other than NXDOMAIN.
    fn query(&mut self, qname: &Name, qtype: Type, class: Class) -> Result<usize> {
        let question = Question::new(qname.clone(), qtype, class);
        let len = self.resolver.query_raw(&question, &mut self.buf)?;
        let rcode = Message::decode(&self.buf[..len])?.header.rcode;
        match rcode {
            Rcode::NoError | Rcode::NxDomain => Ok(len),
            _ => Err(Error::from_rcode(rcode).unwrap_or(Error::Format)),
        }
    }

    /// Walks up from `name` to find the origin of its zone.
    fn find_origin(&mut self, mut name: Name, class: Class) -> Result<ZoneCut> {
        let mut cname_hops = 0;
        loop {
            let len = self.query(&name, Type::SOA, class)?;
            let message = Message::decode(&self.buf[..len])?;

            let mut alias = None;
            for record in &message.answers {
                if record.rr_type == Type::CNAME && record.class == class && record.owner == name {
                    alias = Some(record.rdata_name(0)?.0.to_lowercase());
                }
            }
            for record in &message.answers {
                if record.rr_type == Type::SOA
                    && record.class == class
                    && name.eq_or_subdomain_of(&record.owner)
                {
                    let mut cut = ZoneCut::new(record.owner.to_lowercase(), class);
                    save_nameservers(&message, Section::Authority, &mut cut, self.options.family)?;
                    return Ok(cut);
                }
            }
            for record in &message.authority {
                if record.rr_type == Type::SOA
                    && record.class == class
                    && name.is_strict_subdomain_of(&record.owner)
                {
                    return Ok(ZoneCut::new(record.owner.to_lowercase(), class));
                }
            }

            if let Some(target) = alias {
                if cname_hops < MAX_CNAME_HOPS {
                    debug!("following CNAME from {} to {}", name, target);
                    cname_hops += 1;
                    name = target;
                    continue;
                }
                debug!("too many CNAMEs; continuing above {}", name);
            }
            name = match name.parent() {
                Some(parent) => parent,
                None => {
                    debug!("no SOA found up to the root");
                    return Ok(ZoneCut::new(Name::root(), class));
                }
            };
        }
    }

    /// Queries the origin for its name servers.
    fn find_nameservers(&mut self, cut: &mut ZoneCut) -> Result<()> {
        let len = self.query(&cut.origin, Type::NS, cut.class)?;
        let message = Message::decode(&self.buf[..len])?;
        save_nameservers(&message, Section::Answer, cut, self.options.family)?;
        debug!(
            "{} has {} name servers ({} addresses from glue)",
            cut.origin,
            cut.nameservers.len(),
            cut.addresses().len()
        );
        Ok(())
    }

    /// Queries for the addresses of name servers that have none.
    fn find_addresses(&mut self, cut: &mut ZoneCut) -> Result<()> {
        let class = cut.class;
        for i in 0..cut.nameservers.len() {
            if !cut.nameservers[i].addresses.is_empty() {
                continue;
            }
            let ns_name = cut.nameservers[i].name.clone();
            for &rr_type in self.options.family.address_types() {
                let len = match self.query(&ns_name, rr_type, class) {
                    Ok(len) => len,
                    Err(e @ (Error::ServerFailure | Error::Refused | Error::NotImplemented)) => {
                        debug!("no {} records for {}: {}", rr_type, ns_name, e);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                let message = Message::decode(&self.buf[..len])?;
                let found = addresses_of(&ns_name, class, &message.answers, self.options.family);
                debug!("found {} {} records for {}", found.len(), rr_type, ns_name);
                cut.nameservers[i].addresses.extend(found);
            }
            if self.options.satisfied_by(cut) {
                break;
            }
        }
        Ok(())
    }
}

/// Records the NS records for `cut.origin` in `section` of `message`,
/// along with their glue from the additional section.
fn save_nameservers(
    message: &Message,
    section: Section,
    cut: &mut ZoneCut,
    family: AddressFamily,
) -> Result<()> {
    for record in message.records(section) {
        if record.rr_type != Type::NS || record.class != cut.class || record.owner != cut.origin {
            continue;
        }
        let ns_name = record.rdata_name(0)?.0.to_lowercase();
        let glue = addresses_of(&ns_name, cut.class, &message.additional, family);
        cut.add_nameserver(ns_name.clone());
        if let Some(ns) = cut.nameserver_mut(&ns_name) {
            for address in glue {
                if !ns.addresses.contains(&address) {
                    ns.addresses.push(address);
                }
            }
        }
    }
    Ok(())
}

/// Collects the addresses of `owner` from A and AAAA records.
fn addresses_of(owner: &Name, class: Class, records: &[Record], family: AddressFamily) -> Vec<IpAddr> {
    records
        .iter()
        .filter(|r| r.owner == *owner && r.class == class && family.wants(r.rr_type))
        .filter_map(|r| match r.rr_type {
            Type::A => r.rdata_ipv4().map(IpAddr::V4),
            _ => r.rdata_ipv6().map(IpAddr::V6),
        })
        .collect()
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use lazy_static::lazy_static;

    use super::*;
    use crate::resolver::mock::{build_reply, question_of, MockNetwork, Reaction, ReplyRecord};
    use crate::resolver::{CountingIds, ResolverConfig};

    lazy_static! {
        static ref SERVER: SocketAddr = "192.0.2.53:53".parse().unwrap();
        static ref EXAMPLE: Name = "example.test.".parse().unwrap();
        static ref OTHER: Name = "other.test.".parse().unwrap();
    }

    const SOA_RDATA: &[u8] = &[0; 22];

    fn wire(name: &str) -> Vec<u8> {
        name.parse::<Name>().unwrap().wire_repr().to_vec()
    }

    /// Answers queries from two small zones, example.test. and
    /// other.test.; nothing else has an SOA record.
    fn fake_zones(query: &[u8]) -> Vec<u8> {
        use Section::*;
        let (qname, qtype) = question_of(query);
        let ns1 = || ReplyRecord::new(Answer, "example.test.", Type::NS, &wire("ns1.example.test."));
        let ns2 = || ReplyRecord::new(Answer, "example.test.", Type::NS, &wire("ns2.other.test."));
        let glue = ReplyRecord::new(Additional, "ns1.example.test.", Type::A, b"\xc0\x00\x02\x01");
        let in_section = |mut record: ReplyRecord, section| {
            record.section = section;
            record
        };

        let qname_text = qname.to_string();
        let (rcode, records) = match (qname_text.as_str(), qtype) {
            ("example.test.", Type::SOA) => (
                Rcode::NoError,
                vec![
                    ReplyRecord::new(Answer, "example.test.", Type::SOA, SOA_RDATA),
                    in_section(ns1(), Authority),
                    in_section(ns2(), Authority),
                    glue,
                ],
            ),
            ("example.test.", Type::NS) => (Rcode::NoError, vec![ns1(), ns2(), glue]),
            ("ns2.other.test.", Type::A) => (
                Rcode::NoError,
                vec![ReplyRecord::new(Answer, "ns2.other.test.", Type::A, b"\xc6\x33\x64\x02")],
            ),
            ("ns2.other.test.", Type::AAAA) => (
                Rcode::NoError,
                vec![ReplyRecord::new(
                    Answer,
                    "ns2.other.test.",
                    Type::AAAA,
                    b"\x20\x01\x0d\xb8\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x02",
                )],
            ),
            ("other.test.", Type::NS) => (
                Rcode::NoError,
                vec![ReplyRecord::new(Answer, "other.test.", Type::NS, &wire("ns2.other.test."))],
            ),
            ("alias.example.test.", _) => (
                Rcode::NoError,
                vec![ReplyRecord::new(Answer, "alias.example.test.", Type::CNAME, &wire("www.other.test."))],
            ),
            _ if qname.is_strict_subdomain_of(&EXAMPLE) => (
                Rcode::NxDomain,
                vec![ReplyRecord::new(Authority, "example.test.", Type::SOA, SOA_RDATA)],
            ),
            _ if qname.is_strict_subdomain_of(&OTHER) => (
                Rcode::NxDomain,
                vec![ReplyRecord::new(Authority, "other.test.", Type::SOA, SOA_RDATA)],
            ),
            _ => (Rcode::NoError, Vec::new()),
        };
        build_reply(query, rcode, &records)
    }

    fn resolver(network: MockNetwork) -> Resolver<MockNetwork> {
        let config = ResolverConfig {
            servers: vec![*SERVER],
            ..Default::default()
        };
        let mut resolver = Resolver::with_network(config, network);
        resolver.set_id_source(CountingIds::starting_at(1));
        resolver
    }

    fn zone_network() -> MockNetwork {
        MockNetwork::new(|server, _, query| Reaction::reply(server, fake_zones(query)))
    }

    fn asked(network: &MockNetwork) -> Vec<(String, Type)> {
        network
            .sent()
            .iter()
            .map(|sent| {
                let (qname, qtype) = question_of(&sent.message);
                (qname.to_string(), qtype)
            })
            .collect()
    }

    fn find(
        resolver: &mut Resolver<MockNetwork>,
        name: &str,
        options: &ZoneCutOptions,
    ) -> Result<FoundZoneCut> {
        find_zone_cut(resolver, &name.parse().unwrap(), Class::IN, options, None)
    }

    fn wanting(wanted_addresses: usize) -> ZoneCutOptions {
        ZoneCutOptions {
            wanted_addresses,
            ..Default::default()
        }
    }

    #[test]
    fn authority_soa_names_the_zone() {
        let network = zone_network();
        let mut resolver = resolver(network.clone());
        let found = find(&mut resolver, "www.EXAMPLE.test.", &wanting(1)).unwrap();
        assert!(!found.from_cache);
        assert_eq!(found.cut.origin, *EXAMPLE);
        assert_eq!(found.cut.addresses(), vec!["192.0.2.1".parse::<IpAddr>().unwrap()]);
        assert_eq!(
            asked(&network),
            vec![
                ("www.example.test.".to_owned(), Type::SOA),
                ("example.test.".to_owned(), Type::NS),
            ]
        );
    }

    #[test]
    fn answer_soa_with_glue_stops_early() {
        let network = zone_network();
        let mut resolver = resolver(network.clone());
        let found = find(&mut resolver, "example.test.", &wanting(1)).unwrap();
        assert_eq!(found.cut.origin, *EXAMPLE);
        assert_eq!(found.cut.nameservers.len(), 2);
        assert_eq!(network.sent().len(), 1);
    }

    #[test]
    fn exhaustive_discovery_resolves_every_server() {
        let network = zone_network();
        let mut resolver = resolver(network.clone());
        let options = ZoneCutOptions {
            exhaustive: true,
            ..Default::default()
        };
        let found = find(&mut resolver, "www.example.test.", &options).unwrap();
        assert_eq!(
            found.cut.addresses(),
            vec![
                "192.0.2.1".parse::<IpAddr>().unwrap(),
                "198.51.100.2".parse().unwrap(),
                "2001:db8::2".parse().unwrap(),
            ]
        );
        assert_eq!(network.sent().len(), 4);
    }

    #[test]
    fn address_family_filter_applies() {
        let network = zone_network();
        let mut resolver = resolver(network.clone());
        let options = ZoneCutOptions {
            exhaustive: true,
            family: AddressFamily::V4Only,
            ..Default::default()
        };
        let found = find(&mut resolver, "www.example.test.", &options).unwrap();
        assert_eq!(found.cut.addresses().len(), 2);
        assert!(!asked(&network).iter().any(|(_, qtype)| *qtype == Type::AAAA));
    }

    #[test]
    fn name_without_soa_is_in_the_root_zone() {
        let network = zone_network();
        let mut resolver = resolver(network.clone());
        let found = find(&mut resolver, "host.nowhere.test.", &wanting(1)).unwrap();
        assert!(found.cut.origin.is_root());
        assert!(found.cut.nameservers.is_empty());
        assert_eq!(
            asked(&network),
            vec![
                ("host.nowhere.test.".to_owned(), Type::SOA),
                ("nowhere.test.".to_owned(), Type::SOA),
                ("test.".to_owned(), Type::SOA),
                (".".to_owned(), Type::SOA),
                (".".to_owned(), Type::NS),
            ]
        );
    }

    #[test]
    fn cnames_are_followed() {
        let network = zone_network();
        let mut resolver = resolver(network);
        let found = find(&mut resolver, "alias.example.test.", &wanting(1)).unwrap();
        assert_eq!(found.cut.origin, *OTHER);
        assert_eq!(found.cut.nameservers.len(), 1);
        assert_eq!(found.cut.nameservers[0].name, "ns2.other.test.".parse().unwrap());
        assert!(found
            .cut
            .addresses()
            .contains(&"198.51.100.2".parse::<IpAddr>().unwrap()));
    }

    #[test]
    fn addressless_servers_are_dropped() {
        let network = MockNetwork::new(|server, _, query| {
            let (qname, qtype) = question_of(query);
            let records = if qname == *EXAMPLE && qtype == Type::NS {
                vec![ReplyRecord::new(
                    Section::Answer,
                    "example.test.",
                    Type::NS,
                    &wire("ghost.example.test."),
                )]
            } else if qname == *EXAMPLE && qtype == Type::SOA {
                vec![ReplyRecord::new(Section::Answer, "example.test.", Type::SOA, SOA_RDATA)]
            } else {
                Vec::new()
            };
            Reaction::reply(server, build_reply(query, Rcode::NoError, &records))
        });
        let mut resolver = resolver(network);
        let found = find(&mut resolver, "example.test.", &wanting(1)).unwrap();
        assert_eq!(found.cut.origin, *EXAMPLE);
        assert!(found.cut.nameservers.is_empty());
    }

    #[test]
    fn server_failure_ends_discovery() {
        let network = MockNetwork::new(|server, _, query| {
            Reaction::reply(server, build_reply(query, Rcode::ServFail, &[]))
        });
        let mut resolver = resolver(network);
        assert!(matches!(
            find(&mut resolver, "www.example.test.", &wanting(1)),
            Err(Error::ServerFailure)
        ));
    }

    #[test]
    fn cache_is_consulted_and_filled() {
        let network = zone_network();
        let mut resolver = resolver(network.clone());
        let mut cache = MemoryZoneCache::new();
        let name = "www.example.test.".parse().unwrap();
        let first = find_zone_cut(&mut resolver, &name, Class::IN, &wanting(1), Some(&mut cache))
            .unwrap();
        assert!(!first.from_cache);
        assert_eq!(cache.len(), 1);
        let queries = network.sent().len();

        let name = "mail.example.test.".parse().unwrap();
        let second = find_zone_cut(&mut resolver, &name, Class::IN, &wanting(1), Some(&mut cache))
            .unwrap();
        assert!(second.from_cache);
        assert_eq!(second.cut, first.cut);
        assert_eq!(network.sent().len(), queries);

        let options = ZoneCutOptions {
            use_cache: false,
            ..wanting(1)
        };
        let third =
            find_zone_cut(&mut resolver, &name, Class::IN, &options, Some(&mut cache)).unwrap();
        assert!(!third.from_cache);
    }

    #[test]
    fn root_results_are_not_cached() {
        let network = zone_network();
        let mut resolver = resolver(network);
        let mut cache = MemoryZoneCache::new();
        let name = "host.nowhere.test.".parse().unwrap();
        let first = find_zone_cut(&mut resolver, &name, Class::IN, &wanting(1), Some(&mut cache))
            .unwrap();
        assert!(first.cut.origin.is_root());
        assert!(cache.is_empty());

        let name = "www.example.test.".parse().unwrap();
        let second = find_zone_cut(&mut resolver, &name, Class::IN, &wanting(1), Some(&mut cache))
            .unwrap();
        assert!(!second.from_cache);
        assert_eq!(second.cut.origin, *EXAMPLE);
        assert_eq!(cache.len(), 1);
    }
}
