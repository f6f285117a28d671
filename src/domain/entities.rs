//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of the country-site domain.
//! They have no external dependencies and contain only business logic.

use crate::domain::value_objects::CountryCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

/// A configured site variant bound to one country code.
///
/// Sites are ordered by domain when listed. Inactive sites are hidden from
/// `active` listings but can still be resolved by their code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountrySite {
    /// Storage identity, stable across code renames
    pub id: i64,
    /// Host this site variant is served on
    pub domain: String,
    /// Display name
    pub name: String,
    /// Unique country code, always uppercase
    pub country_code: CountryCode,
    pub active: bool,
    /// Language activated when this site is current
    pub default_language: String,
}

impl CountrySite {
    /// URL a visitor follows to switch to this site.
    ///
    /// Domains that are unique-domain keys resolve on their own, so they get
    /// the bare domain. Shared domains need the `c` override parameter.
    pub fn switch_url(&self, unique_domains: &HashMap<String, CountryCode>) -> String {
        if unique_domains.contains_key(&self.domain) {
            return self.domain.clone();
        }
        format!("//{}?c={}", self.domain, self.country_code)
    }

    /// Path of the flag icon for this site, or an empty string when no icon
    /// directory is configured.
    pub fn icon_path(&self, icon_dir: Option<&str>, icon_ext: &str) -> String {
        match icon_dir {
            Some(dir) if !dir.is_empty() => format!("{}{}{}", dir, self.country_code, icon_ext),
            _ => String::new(),
        }
    }

    /// Human-readable name of the default language, looked up in the
    /// configured `(code, name)` language list.
    pub fn default_language_display<'a>(&self, languages: &'a [(String, String)]) -> Option<&'a str> {
        languages
            .iter()
            .find(|(code, _)| *code == self.default_language)
            .map(|(_, name)| name.as_str())
    }
}

/// Unsaved form of a [`CountrySite`], as submitted by an administrator.
///
/// The country code is kept raw here; the repository normalises it on write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteDraft {
    pub domain: String,
    pub name: String,
    pub country_code: String,
    #[serde(default = "default_active")]
    pub active: bool,
    pub default_language: String,
}

fn default_active() -> bool {
    true
}

impl SiteDraft {
    pub fn new(
        domain: impl Into<String>,
        name: impl Into<String>,
        country_code: impl Into<String>,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            name: name.into(),
            country_code: country_code.into(),
            active: true,
            default_language: default_language.into(),
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// The normalised code this draft will be stored under.
    pub fn normalized_code(&self) -> Option<CountryCode> {
        CountryCode::new(&self.country_code)
    }
}

/// The inputs of a request that take part in site resolution.
///
/// Inbound adapters build this from whatever HTTP representation they use,
/// which keeps the resolution engine free of framework types.
#[derive(Debug, Clone, Default)]
pub struct SiteRequest {
    /// Value of the Host header, possibly with a port
    pub host: String,
    /// GET or HEAD
    pub safe_method: bool,
    /// Value of the `c` query parameter
    pub country_param: Option<String>,
    /// Value of the `local` cookie
    pub local_cookie: Option<String>,
    /// Client address after applying the forwarded-for rule
    pub client_ip: Option<IpAddr>,
}

/// Which signal decided a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    UniqueDomain,
    QueryParam,
    Cookie,
    GeoIp,
    Default,
    /// Port-based fallback for local development hosts
    DebugPort,
}

/// Outcome of resolving one request, kept for the response side.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub site: Arc<CountrySite>,
    pub source: ResolutionSource,
    pub cache_hit: bool,
    pub geo_attempted: bool,
    pub client_ip: Option<IpAddr>,
}

impl Resolution {
    pub fn country_code(&self) -> &CountryCode {
        &self.site.country_code
    }
}

/// A content record that can be attached to country sites and tagged with
/// a language.
pub trait Localized {
    /// Codes of the sites this record is linked to.
    fn country_codes(&self) -> &[CountryCode];

    /// Language the record is written in, if tagged.
    fn object_language(&self) -> Option<&str>;
}

impl Localized for CountrySite {
    fn country_codes(&self) -> &[CountryCode] {
        std::slice::from_ref(&self.country_code)
    }

    fn object_language(&self) -> Option<&str> {
        Some(&self.default_language)
    }
}
