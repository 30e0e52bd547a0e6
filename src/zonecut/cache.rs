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

//! Caching of discovered zone cuts.

use std::collections::HashMap;

use super::ZoneCut;
use crate::name::Name;
use crate::rr::Class;

/// A store of previously discovered zone cuts.
///
/// [`find_zone_cut`](super::find_zone_cut) consults the cache before
/// discovering a zone and stores what it discovers, except for the root
/// zone and cuts without server addresses. A caller that finds
/// a cached cut to be stale (for instance, because a signed update sent
/// to its servers failed) invalidates it.
pub trait ZoneCache {
    /// Returns the cached cut of the closest zone enclosing `name`.
    fn lookup(&self, name: &Name, class: Class) -> Option<ZoneCut>;

    /// Stores a discovered cut, replacing any cut with the same origin
    /// and class.
    fn store(&mut self, cut: &ZoneCut);

    /// Forgets the cut of the zone `origin`.
    fn invalidate(&mut self, origin: &Name, class: Class);
}

/// A [`ZoneCache`] held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryZoneCache {
    cuts: HashMap<(Name, Class), ZoneCut>,
}

impl MemoryZoneCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }
}

impl ZoneCache for MemoryZoneCache {
    fn lookup(&self, name: &Name, class: Class) -> Option<ZoneCut> {
        let mut candidate = Some(name.clone());
        while let Some(name) = candidate {
            if let Some(cut) = self.cuts.get(&(name.clone(), class)) {
                return Some(cut.clone());
            }
            candidate = name.parent();
        }
        None
    }

    fn store(&mut self, cut: &ZoneCut) {
        self.cuts
            .insert((cut.origin.clone(), cut.class), cut.clone());
    }

    fn invalidate(&mut self, origin: &Name, class: Class) {
        self.cuts.remove(&(origin.clone(), class));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cut(origin: &str) -> ZoneCut {
        ZoneCut {
            origin: origin.parse().unwrap(),
            class: Class::IN,
            nameservers: Vec::new(),
        }
    }

    #[test]
    fn lookup_finds_closest_enclosing_zone() {
        let mut cache = MemoryZoneCache::new();
        cache.store(&cut("example.test."));
        cache.store(&cut("sub.example.test."));
        let name = "host.SUB.example.test.".parse().unwrap();
        assert_eq!(cache.lookup(&name, Class::IN), Some(cut("sub.example.test.")));
        let name = "host.example.test.".parse().unwrap();
        assert_eq!(cache.lookup(&name, Class::IN), Some(cut("example.test.")));
        assert_eq!(cache.lookup(&name, Class::CH), None);
        let name = "host.other.test.".parse().unwrap();
        assert_eq!(cache.lookup(&name, Class::IN), None);
    }

    #[test]
    fn invalidated_zones_are_forgotten() {
        let mut cache = MemoryZoneCache::new();
        cache.store(&cut("example.test."));
        cache.invalidate(&"EXAMPLE.test.".parse().unwrap(), Class::IN);
        assert!(cache.is_empty());
    }
}
