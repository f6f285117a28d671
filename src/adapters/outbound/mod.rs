mod dashmap_site_cache;
mod maxmind_geo_resolver;
mod sqlite_site_repo;

pub use dashmap_site_cache::DashMapSiteCache;
pub use maxmind_geo_resolver::MaxMindGeoResolver;
pub use sqlite_site_repo::SqliteSiteRepository;
