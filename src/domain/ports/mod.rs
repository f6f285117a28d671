mod geo_resolver;
mod site_cache;
mod site_repository;

pub use geo_resolver::GeoResolver;
pub use site_cache::SiteCache;
pub use site_repository::SiteRepository;
