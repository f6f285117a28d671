//! country-sites - per-country site resolution service
//!
//! This is the composition root that wires together all the components.

use country_sites::adapters::inbound::{ApiServer, ApiState, SiteOptions};
use country_sites::adapters::outbound::{DashMapSiteCache, MaxMindGeoResolver, SqliteSiteRepository};
use country_sites::config::load_config;
use country_sites::domain::ports::GeoResolver;
use country_sites::SiteRegistry;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!(
        "starting country-sites listen={} default={:?} geoip_redirect={}",
        cfg.listen_addr,
        cfg.default_country_code.as_ref().map(|c| c.to_string()),
        cfg.geoip_redirect
    );

    // ===== COMPOSITION ROOT =====
    // Wire up all adapters and services

    // 1. Create outbound adapters

    // Site repository (SQLite)
    let site_repo = Arc::new(SqliteSiteRepository::open(&cfg.db_path)?);

    // Resolution cache (DashMap)
    let site_cache = Arc::new(DashMapSiteCache::new());

    // GeoIP resolver (MaxMind), reloaded when the refresh job installs a new dataset
    let maxmind = Arc::new(MaxMindGeoResolver::new(cfg.geoip_path.as_deref().map(Path::new)));
    if maxmind.is_installed() {
        tracing::info!("GeoIP dataset loaded from {:?}", maxmind.dataset_path());
    } else {
        tracing::warn!("GeoIP dataset not installed; geolocation disabled until it is");
    }
    if maxmind.dataset_path().is_some() {
        maxmind.start_reload(Duration::from_secs(cfg.geoip_reload_secs));
    }
    let geo_resolver: Arc<dyn GeoResolver> = maxmind;

    // 2. Create application service
    let registry = Arc::new(SiteRegistry::new(
        site_repo,
        site_cache,
        geo_resolver.clone(),
        cfg.resolution_settings(),
    ));

    match registry.current_default() {
        Ok(site) => tracing::info!("default country site: {} ({})", site.country_code, site.domain),
        Err(e) => tracing::warn!("{}", e),
    }

    // 3. Create inbound adapter and run
    let state = ApiState::new(registry, geo_resolver, SiteOptions::from(&cfg));
    let server = ApiServer::new(cfg.listen_addr.clone(), state);

    server.run().await
}
