//! Site Cache Port
//!
//! Defines the interface of the process-wide resolution cache.

use crate::domain::entities::CountrySite;
use crate::domain::value_objects::CountryCode;
use std::sync::Arc;

/// Process-local mapping from country code to resolved site.
///
/// Lazily populated by the resolution engine and evicted on every site
/// write. Population is guarded by an epoch: a reader captures
/// [`epoch`](SiteCache::epoch) before reading storage and hands it to
/// [`insert_if_current`](SiteCache::insert_if_current), which refuses to
/// store the entry if any invalidation happened in between.
pub trait SiteCache: Send + Sync {
    fn get(&self, code: &CountryCode) -> Option<Arc<CountrySite>>;

    /// Current invalidation epoch.
    fn epoch(&self) -> u64;

    /// Store `site` unless an invalidation happened since `epoch`.
    /// Returns whether the entry was stored.
    fn insert_if_current(&self, epoch: u64, site: Arc<CountrySite>) -> bool;

    /// Evict one entry.
    fn invalidate(&self, code: &CountryCode);

    /// Evict everything.
    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, code: &CountryCode) -> bool {
        self.get(code).is_some()
    }
}
