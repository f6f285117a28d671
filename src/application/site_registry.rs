//! Site Registry - the resolution engine
//!
//! Maps a request to exactly one country site, memoizes resolutions per
//! country code, and owns the site write path so every mutation evicts the
//! affected cache entries before it becomes visible.

use crate::domain::entities::{CountrySite, Resolution, ResolutionSource, SiteDraft, SiteRequest};
use crate::domain::errors::{RepositoryError, ResolveError};
use crate::domain::ports::{GeoResolver, SiteCache, SiteRepository};
use crate::domain::services::ClientSignals;
use crate::domain::value_objects::CountryCode;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Settings consulted by the resolution chain.
#[derive(Debug, Clone, Default)]
pub struct ResolutionSettings {
    /// Fallback code when no signal resolves
    pub default_country_code: Option<CountryCode>,
    /// Exact host -> code table, highest precedence
    pub unique_domains: HashMap<String, CountryCode>,
    /// Port -> code table, consulted only in debug mode
    pub debug_unique_domains: HashMap<String, CountryCode>,
    /// Whether IP geolocation takes part in the primary chain
    pub geoip_redirect: bool,
    pub debug: bool,
}

/// Country site registry.
///
/// Resolution walks this chain, first match wins:
/// 1. unique-domain table (exact host match)
/// 2. `c` query parameter on GET/HEAD
/// 3. `local` cookie
/// 4. IP geolocation, when redirect-by-geolocation is enabled
/// 5. configured default code
///
/// If the chain yields nothing usable, or the chosen code has no stored
/// site, the debug port table and then the default code are tried before
/// giving up.
pub struct SiteRegistry {
    repo: Arc<dyn SiteRepository>,
    cache: Arc<dyn SiteCache>,
    geo: Arc<dyn GeoResolver>,
    settings: ResolutionSettings,
    write_lock: Mutex<()>,
}

impl SiteRegistry {
    pub fn new(
        repo: Arc<dyn SiteRepository>,
        cache: Arc<dyn SiteCache>,
        geo: Arc<dyn GeoResolver>,
        settings: ResolutionSettings,
    ) -> Self {
        Self {
            repo,
            cache,
            geo,
            settings,
            write_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &ResolutionSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<dyn SiteCache> {
        &self.cache
    }

    /// Resolve the site for a request.
    pub fn resolve(&self, request: &SiteRequest) -> Result<Resolution, ResolveError> {
        let (candidate, source, geo_attempted) = self.pick_code(request);

        if let Some(code) = &candidate {
            if let Some((site, cache_hit)) = self.lookup(code)? {
                tracing::debug!(
                    "resolved host={} -> {} via {:?} (cache_hit={})",
                    request.host,
                    code,
                    source,
                    cache_hit
                );
                return Ok(Resolution {
                    site,
                    source,
                    cache_hit,
                    geo_attempted,
                    client_ip: request.client_ip,
                });
            }
            tracing::debug!("no country site for code {} (via {:?})", code, source);
        }

        self.fallback(request, geo_attempted)
    }

    /// Site for an explicit code, or the configured default when `code` is
    /// `None`.
    pub fn get_current(&self, code: Option<&CountryCode>) -> Result<Arc<CountrySite>, ResolveError> {
        let code = match code.or(self.settings.default_country_code.as_ref()) {
            Some(code) => code,
            None => return Err(ResolveError::NotConfigured),
        };
        match self.lookup(code)? {
            Some((site, _)) => Ok(site),
            None => Err(ResolveError::NoMatchingSite(code.to_string())),
        }
    }

    pub fn current_default(&self) -> Result<Arc<CountrySite>, ResolveError> {
        self.get_current(None)
    }

    /// Active sites, ordered by domain.
    pub fn active_sites(&self) -> Result<Vec<CountrySite>, RepositoryError> {
        self.repo.active()
    }

    pub fn all_sites(&self) -> Result<Vec<CountrySite>, RepositoryError> {
        self.repo.all()
    }

    pub fn site(&self, id: i64) -> Result<Option<CountrySite>, RepositoryError> {
        self.repo.get_by_id(id)
    }

    /// Create a site. Any entry cached under its code is evicted first.
    pub fn create_site(&self, draft: &SiteDraft) -> Result<CountrySite, RepositoryError> {
        let _guard = self.write_lock.lock();
        let code = draft.normalized_code().ok_or(RepositoryError::InvalidCode)?;
        self.evict(&[Some(&code)]);
        let result = self.repo.insert(draft);
        self.evict(&[Some(&code)]);
        let site = result?;
        tracing::info!("created country site {} ({})", site.country_code, site.domain);
        Ok(site)
    }

    /// Update a site. Evicts the code currently persisted for `id`, which
    /// may differ from both the draft's code and any in-memory copy the
    /// caller holds, and the new code.
    pub fn update_site(&self, id: i64, draft: &SiteDraft) -> Result<CountrySite, RepositoryError> {
        let _guard = self.write_lock.lock();
        let code = draft.normalized_code().ok_or(RepositoryError::InvalidCode)?;
        let persisted = self.persisted_code(id)?;
        self.evict(&[persisted.as_ref(), Some(&code)]);
        let result = self.repo.update(id, draft);
        self.evict(&[persisted.as_ref(), Some(&code)]);
        let site = result?;
        tracing::info!("updated country site {} ({})", site.country_code, site.domain);
        Ok(site)
    }

    /// Delete a site, evicting its persisted code first.
    pub fn delete_site(&self, id: i64) -> Result<bool, RepositoryError> {
        let _guard = self.write_lock.lock();
        let persisted = self.persisted_code(id)?;
        self.evict(&[persisted.as_ref()]);
        let result = self.repo.delete(id);
        self.evict(&[persisted.as_ref()]);
        let removed = result?;
        if removed {
            tracing::info!("deleted country site id={}", id);
        }
        Ok(removed)
    }

    /// Evict every cached resolution.
    pub fn clear_cache(&self) {
        self.cache.clear();
        tracing::info!("country site cache cleared");
    }

    /// Code stored for `id`, read fresh from storage.
    fn persisted_code(&self, id: i64) -> Result<Option<CountryCode>, RepositoryError> {
        Ok(self.repo.get_by_id(id)?.map(|site| site.country_code))
    }

    /// Evicts before the write so no resolve can observe the old entry once
    /// the write is visible, and again after it so a lookup that read the
    /// old row mid-write cannot repopulate it.
    fn evict(&self, codes: &[Option<&CountryCode>]) {
        for code in codes.iter().flatten() {
            self.cache.invalidate(code);
        }
    }

    /// Walk the signal chain. Returns the candidate code, the signal that
    /// produced it, and whether geolocation was consulted.
    fn pick_code(&self, request: &SiteRequest) -> (Option<CountryCode>, ResolutionSource, bool) {
        if let Some(code) = self.settings.unique_domains.get(&request.host) {
            return (Some(code.clone()), ResolutionSource::UniqueDomain, false);
        }

        if request.safe_method {
            if let Some(code) = request.country_param.as_deref().and_then(CountryCode::new) {
                return (Some(code), ResolutionSource::QueryParam, false);
            }
        }

        if let Some(code) = request.local_cookie.as_deref().and_then(CountryCode::new) {
            return (Some(code), ResolutionSource::Cookie, false);
        }

        let mut geo_attempted = false;
        if self.settings.geoip_redirect {
            geo_attempted = true;
            if let Some(code) = request.client_ip.and_then(|ip| self.geo.country(ip)) {
                tracing::debug!("detected country code from IP: {}", code);
                return (Some(code), ResolutionSource::GeoIp, true);
            }
        }

        (
            self.settings.default_country_code.clone(),
            ResolutionSource::Default,
            geo_attempted,
        )
    }

    fn fallback(&self, request: &SiteRequest, geo_attempted: bool) -> Result<Resolution, ResolveError> {
        if self.settings.debug {
            let (domain, port) = ClientSignals::split_domain_port(&request.host);
            if let Some(code) = self.settings.debug_unique_domains.get(&port) {
                tracing::debug!("debug port fallback domain={} port={} -> {}", domain, port, code);
                if let Some((site, cache_hit)) = self.lookup(code)? {
                    return Ok(Resolution {
                        site,
                        source: ResolutionSource::DebugPort,
                        cache_hit,
                        geo_attempted,
                        client_ip: request.client_ip,
                    });
                }
            }
        }

        let code = self
            .settings
            .default_country_code
            .as_ref()
            .ok_or(ResolveError::NotConfigured)?;

        match self.lookup(code)? {
            Some((site, cache_hit)) => Ok(Resolution {
                site,
                source: ResolutionSource::Default,
                cache_hit,
                geo_attempted,
                client_ip: request.client_ip,
            }),
            None => {
                tracing::error!("default country site {} does not exist", code);
                Err(ResolveError::NoMatchingSite(code.to_string()))
            }
        }
    }

    /// Cache-first lookup by code. The boolean is true on a cache hit.
    fn lookup(&self, code: &CountryCode) -> Result<Option<(Arc<CountrySite>, bool)>, ResolveError> {
        if let Some(site) = self.cache.get(code) {
            return Ok(Some((site, true)));
        }

        let epoch = self.cache.epoch();
        let Some(site) = self.repo.get_by_code(code)? else {
            return Ok(None);
        };
        let site = Arc::new(site);
        if !self.cache.insert_if_current(epoch, site.clone()) {
            tracing::debug!("skipped caching {}: invalidated during lookup", code);
        }
        Ok(Some((site, false)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::outbound::{DashMapSiteCache, SqliteSiteRepository};
    use std::net::IpAddr;

    /// Geo resolver answering from a fixed table.
    struct StaticGeo(HashMap<IpAddr, CountryCode>);

    impl GeoResolver for StaticGeo {
        fn country(&self, ip: IpAddr) -> Option<CountryCode> {
            self.0.get(&ip).cloned()
        }
    }

    fn code(raw: &str) -> CountryCode {
        CountryCode::new(raw).unwrap()
    }

    fn fixture(settings: ResolutionSettings) -> (SiteRegistry, Arc<SqliteSiteRepository>) {
        let repo = Arc::new(SqliteSiteRepository::in_memory().unwrap());
        for (domain, name, cc, lang) in [
            ("example.com", "International", "COM", "en"),
            ("shop.example.uk", "United Kingdom", "UK", "en"),
            ("example.com", "Germany", "DE", "de"),
            ("example.nl", "Netherlands", "NL", "nl"),
        ] {
            repo.insert(&SiteDraft::new(domain, name, cc, lang)).unwrap();
        }

        let mut geo = HashMap::new();
        geo.insert("203.0.113.9".parse().unwrap(), code("NL"));
        geo.insert("198.51.100.1".parse().unwrap(), code("FR"));

        let registry = SiteRegistry::new(
            repo.clone(),
            Arc::new(DashMapSiteCache::new()),
            Arc::new(StaticGeo(geo)),
            settings,
        );
        (registry, repo)
    }

    fn settings() -> ResolutionSettings {
        let mut unique_domains = HashMap::new();
        unique_domains.insert("shop.example.uk".to_string(), code("UK"));
        ResolutionSettings {
            default_country_code: Some(code("COM")),
            unique_domains,
            ..Default::default()
        }
    }

    fn get(host: &str) -> SiteRequest {
        SiteRequest {
            host: host.to_string(),
            safe_method: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_unique_domain_wins_over_everything() {
        let mut s = settings();
        s.geoip_redirect = true;
        let (registry, _) = fixture(s);

        let mut req = get("shop.example.uk");
        req.country_param = Some("de".to_string());
        req.local_cookie = Some("NL".to_string());
        req.client_ip = Some("203.0.113.9".parse().unwrap());

        let res = registry.resolve(&req).unwrap();
        assert_eq!(res.country_code().as_str(), "UK");
        assert_eq!(res.source, ResolutionSource::UniqueDomain);
        assert!(!res.geo_attempted);
        assert!(registry.cache().contains(&code("UK")));
    }

    #[test]
    fn test_query_param_uppercased() {
        let (registry, _) = fixture(settings());

        let mut req = get("example.com");
        req.country_param = Some("de".to_string());

        let res = registry.resolve(&req).unwrap();
        assert_eq!(res.country_code().as_str(), "DE");
        assert_eq!(res.source, ResolutionSource::QueryParam);
    }

    #[test]
    fn test_query_param_ignored_on_unsafe_method() {
        let (registry, _) = fixture(settings());

        let mut req = get("example.com");
        req.safe_method = false;
        req.country_param = Some("de".to_string());
        req.local_cookie = Some("NL".to_string());

        let res = registry.resolve(&req).unwrap();
        assert_eq!(res.country_code().as_str(), "NL");
        assert_eq!(res.source, ResolutionSource::Cookie);
    }

    #[test]
    fn test_cookie_used_without_geolocation() {
        let mut s = settings();
        s.geoip_redirect = true;
        let (registry, _) = fixture(s);

        let mut req = get("example.com");
        req.local_cookie = Some("NL".to_string());
        req.client_ip = Some("198.51.100.1".parse().unwrap());

        let res = registry.resolve(&req).unwrap();
        assert_eq!(res.country_code().as_str(), "NL");
        assert!(!res.geo_attempted);
    }

    #[test]
    fn test_geoip_used_when_redirect_enabled() {
        let mut s = settings();
        s.geoip_redirect = true;
        let (registry, _) = fixture(s);

        let mut req = get("example.com");
        req.client_ip = Some("203.0.113.9".parse().unwrap());

        let res = registry.resolve(&req).unwrap();
        assert_eq!(res.country_code().as_str(), "NL");
        assert_eq!(res.source, ResolutionSource::GeoIp);
        assert!(res.geo_attempted);
    }

    #[test]
    fn test_geoip_ignored_when_redirect_disabled() {
        let (registry, _) = fixture(settings());

        let mut req = get("example.com");
        req.client_ip = Some("203.0.113.9".parse().unwrap());

        let res = registry.resolve(&req).unwrap();
        assert_eq!(res.country_code().as_str(), "COM");
        assert_eq!(res.source, ResolutionSource::Default);
        assert!(!res.geo_attempted);
    }

    #[test]
    fn test_geoip_country_without_site_falls_back_to_default() {
        let mut s = settings();
        s.geoip_redirect = true;
        let (registry, _) = fixture(s);

        let mut req = get("example.com");
        req.client_ip = Some("198.51.100.1".parse().unwrap());

        let res = registry.resolve(&req).unwrap();
        assert_eq!(res.country_code().as_str(), "COM");
        assert_eq!(res.source, ResolutionSource::Default);
        assert!(res.geo_attempted);
    }

    #[test]
    fn test_unknown_cookie_falls_back_to_default() {
        let (registry, _) = fixture(settings());

        let mut req = get("example.com");
        req.local_cookie = Some("XX".to_string());

        let res = registry.resolve(&req).unwrap();
        assert_eq!(res.country_code().as_str(), "COM");
    }

    #[test]
    fn test_debug_port_fallback() {
        let mut s = settings();
        s.debug = true;
        s.default_country_code = None;
        s.debug_unique_domains.insert("8001".to_string(), code("NL"));
        let (registry, _) = fixture(s);

        let res = registry.resolve(&get("localhost:8001")).unwrap();
        assert_eq!(res.country_code().as_str(), "NL");
        assert_eq!(res.source, ResolutionSource::DebugPort);
    }

    #[test]
    fn test_debug_port_table_ignored_outside_debug() {
        let mut s = settings();
        s.debug_unique_domains.insert("8001".to_string(), code("NL"));
        let (registry, _) = fixture(s);

        let res = registry.resolve(&get("localhost:8001")).unwrap();
        assert_eq!(res.country_code().as_str(), "COM");
    }

    #[test]
    fn test_not_configured_without_default() {
        let mut s = settings();
        s.default_country_code = None;
        let (registry, _) = fixture(s);

        let err = registry.resolve(&get("example.com")).unwrap_err();
        assert!(matches!(err, ResolveError::NotConfigured));
    }

    #[test]
    fn test_no_matching_site_for_missing_default() {
        let mut s = settings();
        s.default_country_code = Some(code("ZZ"));
        let (registry, _) = fixture(s);

        let err = registry.resolve(&get("example.com")).unwrap_err();
        assert!(matches!(err, ResolveError::NoMatchingSite(c) if c == "ZZ"));
    }

    #[test]
    fn test_second_resolution_is_cache_hit() {
        let (registry, repo) = fixture(settings());

        let first = registry.resolve(&get("shop.example.uk")).unwrap();
        assert!(!first.cache_hit);

        // Storage is not re-validated on a hit.
        let uk = repo.get_by_code(&code("UK")).unwrap().unwrap();
        repo.delete(uk.id).unwrap();

        let second = registry.resolve(&get("shop.example.uk")).unwrap();
        assert!(second.cache_hit);
        assert!(Arc::ptr_eq(&first.site, &second.site));
    }

    #[test]
    fn test_update_invalidates_cached_entry() {
        let (registry, _) = fixture(settings());

        let mut req = get("example.com");
        req.country_param = Some("DE".to_string());
        let before = registry.resolve(&req).unwrap();
        assert_eq!(before.site.name, "Germany");

        let draft = SiteDraft::new("example.de", "Deutschland", "DE", "de");
        registry.update_site(before.site.id, &draft).unwrap();
        assert!(!registry.cache().contains(&code("DE")));

        let after = registry.resolve(&req).unwrap();
        assert!(!after.cache_hit);
        assert_eq!(after.site.name, "Deutschland");
        assert_eq!(after.site.domain, "example.de");
    }

    #[test]
    fn test_code_rename_evicts_persisted_code() {
        let (registry, _) = fixture(settings());

        let mut req = get("example.com");
        req.country_param = Some("de".to_string());
        let de = registry.resolve(&req).unwrap();

        registry
            .update_site(de.site.id, &SiteDraft::new("example.at", "Austria", "at", "de"))
            .unwrap();

        assert!(!registry.cache().contains(&code("DE")));
        // DE no longer exists; the chain falls through to the default.
        let res = registry.resolve(&req).unwrap();
        assert_eq!(res.country_code().as_str(), "COM");

        req.country_param = Some("AT".to_string());
        assert_eq!(registry.resolve(&req).unwrap().site.name, "Austria");
    }

    #[test]
    fn test_delete_invalidates() {
        let (registry, _) = fixture(settings());

        let nl = registry.get_current(Some(&code("NL"))).unwrap();
        assert!(registry.cache().contains(&code("NL")));

        assert!(registry.delete_site(nl.id).unwrap());
        assert!(!registry.cache().contains(&code("NL")));
        assert!(matches!(
            registry.get_current(Some(&code("NL"))),
            Err(ResolveError::NoMatchingSite(_))
        ));
    }

    #[test]
    fn test_create_stores_uppercase() {
        let (registry, _) = fixture(settings());
        let site = registry
            .create_site(&SiteDraft::new("example.be", "Belgium", "nl-ok", "nl"))
            .unwrap();
        assert_eq!(site.country_code.as_str(), "NL-OK");
        assert_eq!(registry.get_current(Some(&code("nl-ok"))).unwrap().id, site.id);
    }

    #[test]
    fn test_get_current_uses_default() {
        let (registry, _) = fixture(settings());
        assert_eq!(registry.get_current(None).unwrap().country_code.as_str(), "COM");
        assert_eq!(registry.current_default().unwrap().country_code.as_str(), "COM");

        let mut s = settings();
        s.default_country_code = None;
        let (registry, _) = fixture(s);
        assert!(matches!(registry.get_current(None), Err(ResolveError::NotConfigured)));
    }

    #[test]
    fn test_clear_cache() {
        let (registry, _) = fixture(settings());
        registry.get_current(Some(&code("NL"))).unwrap();
        registry.get_current(Some(&code("UK"))).unwrap();
        assert_eq!(registry.cache().len(), 2);

        registry.clear_cache();
        assert!(registry.cache().is_empty());
    }

    #[test]
    fn test_active_sites_excludes_inactive_but_resolvable() {
        let (registry, _) = fixture(settings());
        let hidden = registry
            .create_site(&SiteDraft::new("example.se", "Sweden", "SE", "sv").inactive())
            .unwrap();

        let active: Vec<_> = registry
            .active_sites()
            .unwrap()
            .into_iter()
            .map(|s| s.country_code.to_string())
            .collect();
        assert!(!active.contains(&"SE".to_string()));
        assert_eq!(active.len(), 4);

        assert_eq!(registry.get_current(Some(&code("SE"))).unwrap().id, hidden.id);
    }
}
