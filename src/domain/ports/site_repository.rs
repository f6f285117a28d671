//! Site Repository Port
//!
//! Defines the interface for the persistent store of country sites.

use crate::domain::entities::{CountrySite, SiteDraft};
use crate::domain::errors::RepositoryError;
use crate::domain::value_objects::CountryCode;

/// Persistent store of country sites.
///
/// Implementations normalise the country code of drafts before writing and
/// enforce its uniqueness. Cache invalidation is not their concern; the
/// registry performs it on the write path.
pub trait SiteRepository: Send + Sync {
    /// Look up a site by its (normalised) country code.
    fn get_by_code(&self, code: &CountryCode) -> Result<Option<CountrySite>, RepositoryError>;

    /// Look up a site by storage id.
    fn get_by_id(&self, id: i64) -> Result<Option<CountrySite>, RepositoryError>;

    /// All sites, ordered by domain.
    fn all(&self) -> Result<Vec<CountrySite>, RepositoryError>;

    /// Active sites only, ordered by domain.
    fn active(&self) -> Result<Vec<CountrySite>, RepositoryError>;

    fn insert(&self, draft: &SiteDraft) -> Result<CountrySite, RepositoryError>;

    fn update(&self, id: i64, draft: &SiteDraft) -> Result<CountrySite, RepositoryError>;

    /// Returns whether a row was removed.
    fn delete(&self, id: i64) -> Result<bool, RepositoryError>;
}
