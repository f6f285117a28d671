//! Domain Errors
//!
//! Failures surfaced by the resolution engine, the site store and the
//! dataset updater.

use thiserror::Error;

/// Storage failures of a [`SiteRepository`](crate::domain::ports::SiteRepository).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("site storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("a country site with code {0} already exists")]
    DuplicateCode(String),

    #[error("country code must not be empty")]
    InvalidCode,

    #[error("country site {0} not found")]
    NotFound(i64),
}

/// Failures of site resolution. These are operator-facing configuration
/// errors, never end-user errors.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(
        "no country site could be resolved and no default is configured; \
         create a country site and set INTL_DEFAULT_COUNTRY_CODE"
    )]
    NotConfigured,

    #[error("no country site matches code {0}")]
    NoMatchingSite(String),

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

/// Failures of the geolocation dataset refresh job.
///
/// None of these leave the installed dataset in a partial state.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("dataset updater misconfigured: {0}")]
    Misconfigured(String),

    #[error("update check failed: {0}")]
    UpdateCheck(String),

    #[error("dataset download failed: {0}")]
    Download(String),

    #[error("dataset extraction failed: {0}")]
    Extract(String),

    #[error("dataset io error: {0}")]
    Io(#[from] std::io::Error),
}
