//! Country Sites Library
//!
//! This module exposes the country-site resolution components for use in
//! integration tests and as a library.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;

// Re-export commonly used types
pub use application::{ContentScope, DatasetUpdater, SiteRegistry};
pub use config::load_config;
pub use domain::entities::{CountrySite, Localized, Resolution, ResolutionSource, SiteDraft, SiteRequest};
pub use domain::errors::{RepositoryError, ResolveError, UpdateError};
pub use domain::ports::{GeoResolver, SiteCache, SiteRepository};
pub use domain::services::ClientSignals;
pub use domain::value_objects::CountryCode;
