//! DashMap Site Cache
//!
//! Implements SiteCache using DashMap for concurrent access.

use crate::domain::entities::CountrySite;
use crate::domain::ports::SiteCache;
use crate::domain::value_objects::CountryCode;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// DashMap-backed resolution cache.
///
/// Reads go straight to the map. Population and eviction additionally
/// take the epoch lock: inserts share it, evictions hold it exclusively
/// while bumping the epoch, so a population that started before an
/// eviction can never land after it.
pub struct DashMapSiteCache {
    sites: DashMap<CountryCode, Arc<CountrySite>>,
    epoch: RwLock<u64>,
}

impl DashMapSiteCache {
    pub fn new() -> Self {
        Self {
            sites: DashMap::new(),
            epoch: RwLock::new(0),
        }
    }
}

impl Default for DashMapSiteCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteCache for DashMapSiteCache {
    fn get(&self, code: &CountryCode) -> Option<Arc<CountrySite>> {
        self.sites.get(code).map(|e| e.value().clone())
    }

    fn epoch(&self) -> u64 {
        *self.epoch.read()
    }

    fn insert_if_current(&self, epoch: u64, site: Arc<CountrySite>) -> bool {
        let current = self.epoch.read();
        if *current != epoch {
            return false;
        }
        self.sites.insert(site.country_code.clone(), site);
        true
    }

    fn invalidate(&self, code: &CountryCode) {
        let mut epoch = self.epoch.write();
        *epoch += 1;
        if self.sites.remove(code).is_some() {
            tracing::debug!("site cache evicted {}", code);
        }
    }

    fn clear(&self) {
        let mut epoch = self.epoch.write();
        *epoch += 1;
        let count = self.sites.len();
        self.sites.clear();
        tracing::debug!("site cache cleared ({} entries)", count);
    }

    fn len(&self) -> usize {
        self.sites.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn site(code: &str) -> Arc<CountrySite> {
        Arc::new(CountrySite {
            id: 1,
            domain: "example.com".to_string(),
            name: code.to_string(),
            country_code: CountryCode::new(code).unwrap(),
            active: true,
            default_language: "en".to_string(),
        })
    }

    fn code(raw: &str) -> CountryCode {
        CountryCode::new(raw).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let cache = DashMapSiteCache::new();
        assert!(cache.is_empty());

        assert!(cache.insert_if_current(cache.epoch(), site("DE")));
        assert_eq!(cache.get(&code("DE")).unwrap().name, "DE");
        assert!(cache.contains(&code("de")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_removes_entry_and_bumps_epoch() {
        let cache = DashMapSiteCache::new();
        cache.insert_if_current(cache.epoch(), site("DE"));
        cache.insert_if_current(cache.epoch(), site("NL"));

        let before = cache.epoch();
        cache.invalidate(&code("DE"));

        assert!(cache.epoch() > before);
        assert!(cache.get(&code("DE")).is_none());
        assert!(cache.get(&code("NL")).is_some());
    }

    #[test]
    fn test_invalidate_missing_entry_is_noop() {
        let cache = DashMapSiteCache::new();
        cache.invalidate(&code("XX"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stale_population_is_rejected() {
        let cache = DashMapSiteCache::new();

        // Reader captures the epoch, then an eviction happens before it
        // gets to store what it read.
        let epoch = cache.epoch();
        cache.invalidate(&code("DE"));

        assert!(!cache.insert_if_current(epoch, site("DE")));
        assert!(cache.get(&code("DE")).is_none());
    }

    #[test]
    fn test_clear() {
        let cache = DashMapSiteCache::new();
        cache.insert_if_current(cache.epoch(), site("DE"));
        cache.insert_if_current(cache.epoch(), site("UK"));
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&code("DE")) && cache.contains(&code("UK")));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_readers_and_invalidations() {
        let cache = Arc::new(DashMapSiteCache::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        if i % 2 == 0 {
                            let epoch = cache.epoch();
                            cache.insert_if_current(epoch, site("DE"));
                            let _ = cache.get(&code("DE"));
                        } else {
                            cache.invalidate(&code("DE"));
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        cache.invalidate(&code("DE"));
        assert!(cache.get(&code("DE")).is_none());
    }
}
