//! Application Layer
//!
//! Use cases orchestrating the domain: site resolution, content scoping
//! and the dataset refresh job.

mod content_scope;
mod dataset_updater;
mod site_registry;

pub use content_scope::ContentScope;
pub use dataset_updater::{
    DatasetUpdater, UpdateOutcome, UpdateResult, UpdaterSettings, DEFAULT_DOWNLOAD_URL,
};
pub use site_registry::{ResolutionSettings, SiteRegistry};
