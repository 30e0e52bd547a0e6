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

//! Dynamic updates ([RFC 2136]).
//!
//! An [`Updater`] takes a batch of [`UpdateRecord`]s, finds the zone
//! each record belongs to, and sends one UPDATE message per zone to
//! that zone's name servers, signing it when a key for the zone is
//! known. Processing stops at the first zone that fails; updates
//! already sent to other zones are not rolled back.
//!
//! [RFC 2136]: https://datatracker.ietf.org/doc/html/rfc2136

mod record;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::ops::{Deref, DerefMut};

use log::{debug, info};

use crate::message::tsig::{HmacKey, SigningKey};
use crate::message::{compose_update, Reader, MAX_MESSAGE_SIZE};
use crate::name::Name;
use crate::resolver::{Error, Network, Resolver, Result};
use crate::rr::Class;
use crate::zonecut::{find_zone_cut, ZoneCache, ZoneCut, ZoneCutOptions};

pub use record::{UpdateOp, UpdateRecord};

////////////////////////////////////////////////////////////////////////
// KEY STORES                                                         //
////////////////////////////////////////////////////////////////////////

/// A source of the keys used to sign updates.
pub trait KeyStore {
    /// Returns the key for updates to the zone `origin`, if any.
    fn find_key(&self, origin: &Name) -> Option<&dyn SigningKey>;
}

/// A [`KeyStore`] of [`HmacKey`]s held in memory, keyed by zone.
#[derive(Clone, Debug, Default)]
pub struct MemoryKeyStore {
    keys: HashMap<Name, HmacKey>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key for the zone `origin`, returning the key it
    /// replaces.
    pub fn insert(&mut self, origin: Name, key: HmacKey) -> Option<HmacKey> {
        self.keys.insert(origin.to_lowercase(), key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyStore for MemoryKeyStore {
    fn find_key(&self, origin: &Name) -> Option<&dyn SigningKey> {
        self.keys.get(origin).map(|key| key as &dyn SigningKey)
    }
}

////////////////////////////////////////////////////////////////////////
// UPDATER                                                            //
////////////////////////////////////////////////////////////////////////

/// Sends batches of update records to the servers of their zones.
pub struct Updater<'a> {
    keys: Option<&'a dyn KeyStore>,
    cache: Option<&'a mut dyn ZoneCache>,
    allow_multiple_zones: bool,
    zone_cut_options: ZoneCutOptions,
}

/// The outcome of the update of one zone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ZoneUpdate {
    pub origin: Name,
    pub class: Class,
    pub servers: Vec<SocketAddr>,
    pub signed: bool,
}

/// The records of a batch that belong to one zone.
struct ZoneGroup {
    cut: ZoneCut,
    records: Vec<UpdateRecord>,
}

impl<'a> Updater<'a> {
    pub fn new() -> Self {
        Self {
            keys: None,
            cache: None,
            allow_multiple_zones: false,
            zone_cut_options: ZoneCutOptions::default(),
        }
    }

    /// Sets the store consulted for signing keys. Without one, updates
    /// are sent unsigned.
    pub fn with_keys(mut self, keys: &'a dyn KeyStore) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Sets the cache of zone cuts used when finding zones.
    pub fn with_cache(mut self, cache: &'a mut dyn ZoneCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets whether a batch may span more than one zone. When it may
    /// not (the default), such a batch fails with
    /// [`Error::CrossZone`].
    pub fn allow_multiple_zones(mut self, allow: bool) -> Self {
        self.allow_multiple_zones = allow;
        self
    }

    pub fn with_zone_cut_options(mut self, options: ZoneCutOptions) -> Self {
        self.zone_cut_options = options;
        self
    }

    /// Sends `records` as one UPDATE per zone through `resolver`,
    /// returning what was sent where.
    ///
    /// The resolver's server list is replaced by each zone's name
    /// servers while its update is sent, and restored afterward. If a
    /// signed update fails signature verification and a cached zone cut
    /// was used, the cached cuts are invalidated and the whole batch is
    /// retried once without the cache.
    pub fn update<N: Network>(
        &mut self,
        resolver: &mut Resolver<N>,
        records: &[UpdateRecord],
    ) -> Result<Vec<ZoneUpdate>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        if !self.allow_multiple_zones {
            check_containment(records)?;
        }

        let mut cached = Vec::new();
        match self.try_update(resolver, records, true, &mut cached) {
            Err(e) if e.is_bad_signature() && !cached.is_empty() => {
                if let Some(cache) = self.cache.as_mut() {
                    for (origin, class) in &cached {
                        debug!("invalidating cached zone {} {}", origin, class);
                        cache.invalidate(origin, *class);
                    }
                }
                info!("retrying update without cached zones after: {}", e);
                self.try_update(resolver, records, false, &mut Vec::new())
            }
            result => result,
        }
    }

    fn try_update<N: Network>(
        &mut self,
        resolver: &mut Resolver<N>,
        records: &[UpdateRecord],
        use_cache: bool,
        cached: &mut Vec<(Name, Class)>,
    ) -> Result<Vec<ZoneUpdate>> {
        let groups = self.group(resolver, records, use_cache, cached)?;
        let mut updates = Vec::with_capacity(groups.len());
        for group in &groups {
            updates.push(self.send_group(resolver, group)?);
        }
        Ok(updates)
    }

    /// Sorts the records into groups by zone, in order of first
    /// appearance.
    fn group<N: Network>(
        &mut self,
        resolver: &mut Resolver<N>,
        records: &[UpdateRecord],
        use_cache: bool,
        cached: &mut Vec<(Name, Class)>,
    ) -> Result<Vec<ZoneGroup>> {
        let options = ZoneCutOptions {
            use_cache: use_cache && self.zone_cut_options.use_cache,
            ..self.zone_cut_options.clone()
        };
        let mut groups: Vec<ZoneGroup> = Vec::new();
        let mut owners: HashMap<(Name, Class), usize> = HashMap::new();

        for record in records {
            let key = (record.owner.clone(), record.class);
            let index = match owners.get(&key) {
                Some(&index) => index,
                None => {
                    let cache = match self.cache {
                        Some(ref mut cache) => Some(&mut **cache as &mut dyn ZoneCache),
                        None => None,
                    };
                    let found =
                        find_zone_cut(resolver, &record.owner, record.class, &options, cache)?;
                    if found.from_cache {
                        cached.push((found.cut.origin.clone(), found.cut.class));
                    }
                    let existing = groups.iter().position(|g| {
                        g.cut.origin == found.cut.origin && g.cut.class == found.cut.class
                    });
                    let index = match existing {
                        Some(index) => index,
                        None if groups.is_empty() || self.allow_multiple_zones => {
                            debug!("{} is in zone {}", record.owner, found.cut.origin);
                            groups.push(ZoneGroup {
                                cut: found.cut,
                                records: Vec::new(),
                            });
                            groups.len() - 1
                        }
                        None => {
                            debug!(
                                "{} is in zone {}, not {}",
                                record.owner, found.cut.origin, groups[0].cut.origin
                            );
                            return Err(Error::CrossZone);
                        }
                    };
                    owners.insert(key, index);
                    index
                }
            };
            groups[index].records.push(record.clone());
        }
        Ok(groups)
    }

    /// Sends the UPDATE for one zone to its name servers.
    fn send_group<N: Network>(
        &self,
        resolver: &mut Resolver<N>,
        group: &ZoneGroup,
    ) -> Result<ZoneUpdate> {
        let origin = &group.cut.origin;
        let class = group.cut.class;
        let servers = group.cut.socket_addrs(resolver.config().port);
        if servers.is_empty() {
            debug!("no name server addresses for {} {}", origin, class);
            return Err(Error::NotZone);
        }

        let mut query = vec![0; MAX_MESSAGE_SIZE];
        let id = resolver.next_id();
        let len = compose_update(&mut query, id, origin, class, &group.records)?;
        let key = self.keys.and_then(|keys| keys.find_key(origin));
        debug!(
            "sending {} update records for {} {} to {} servers ({})",
            group.records.len(),
            origin,
            class,
            servers.len(),
            if key.is_some() { "signed" } else { "unsigned" },
        );

        let mut answer = vec![0; MAX_MESSAGE_SIZE];
        let answer_len = {
            let mut resolver = SubstitutedServers::new(resolver, servers.clone());
            match key {
                Some(key) => resolver.send_signed(&mut query, len, key, &mut answer, true)?,
                None => resolver.send(&query[..len], &mut answer)?,
            }
        };

        let rcode = Reader::try_from(&answer[..answer_len])?.rcode();
        if let Some(e) = Error::from_rcode(rcode) {
            debug!("update of {} {} failed: {}", origin, class, rcode);
            return Err(e);
        }
        Ok(ZoneUpdate {
            origin: origin.clone(),
            class,
            servers,
            signed: key.is_some(),
        })
    }
}

impl Default for Updater<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks, without any lookups, that the records of a single-zone
/// batch could be in one zone: they must share a class and an ancestor
/// below the root. Owners that are all the root or its direct children
/// may share the root zone.
fn check_containment(records: &[UpdateRecord]) -> Result<()> {
    let first = &records[0];
    let mut common = first.owner.clone();
    for record in &records[1..] {
        if record.class != first.class {
            return Err(Error::CrossZone);
        }
        while !record.owner.eq_or_subdomain_of(&common) {
            match common.parent() {
                Some(parent) => common = parent,
                None => break,
            }
        }
    }
    let all_at_top = records.iter().all(|record| record.owner.len() <= 2);
    if records.len() > 1 && common.is_root() && !all_at_top {
        debug!("update records have no common zone");
        Err(Error::CrossZone)
    } else {
        Ok(())
    }
}

/// A resolver whose server list is temporarily replaced. The original
/// list is restored on drop.
struct SubstitutedServers<'r, N: Network> {
    resolver: &'r mut Resolver<N>,
    saved: Option<Vec<SocketAddr>>,
}

impl<'r, N: Network> SubstitutedServers<'r, N> {
    fn new(resolver: &'r mut Resolver<N>, servers: Vec<SocketAddr>) -> Self {
        let saved = resolver.set_servers(servers);
        Self {
            resolver,
            saved: Some(saved),
        }
    }
}

impl<N: Network> Deref for SubstitutedServers<'_, N> {
    type Target = Resolver<N>;

    fn deref(&self) -> &Self::Target {
        self.resolver
    }
}

impl<N: Network> DerefMut for SubstitutedServers<'_, N> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.resolver
    }
}

impl<N: Network> Drop for SubstitutedServers<'_, N> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.resolver.set_servers(saved);
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
