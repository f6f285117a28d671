use crate::application::{ContentScope, ResolutionSettings, UpdaterSettings, DEFAULT_DOWNLOAD_URL};
use crate::domain::value_objects::CountryCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Server settings
    pub listen_addr: String,
    pub db_path: String,
    pub debug: bool,

    // Resolution settings
    pub default_country_code: Option<CountryCode>,
    pub unique_domains: HashMap<String, CountryCode>,
    pub debug_unique_domains: HashMap<String, CountryCode>,
    pub force_country_language: bool,
    pub geoip_redirect: bool,
    pub international_app: bool,
    pub languages: Vec<(String, String)>,

    // GeoIP dataset settings
    pub geoip_path: Option<String>,
    pub geoip_license: Option<String>,
    pub geoip_download_url: String,
    pub geoip_timeout_secs: u64,
    pub geoip_reload_secs: u64,

    // Presentation helpers
    pub site_icon_dir: Option<String>,
    pub site_icon_ext: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            db_path: "sites.db".to_string(),
            debug: false,
            default_country_code: None,
            unique_domains: HashMap::new(),
            debug_unique_domains: HashMap::new(),
            force_country_language: false,
            geoip_redirect: false,
            international_app: true,
            languages: Vec::new(),
            geoip_path: None,
            geoip_license: None,
            geoip_download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            geoip_timeout_secs: 60,
            geoip_reload_secs: 300,
            site_icon_dir: None,
            site_icon_ext: ".png".to_string(),
        }
    }
}

impl Config {
    /// Build the configuration from a variable lookup.
    ///
    /// Unparsable numbers fall back to their defaults; booleans accept `1`
    /// or `true` in any case.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let flag = |name: &str, default: bool| {
            var(name)
                .map(|v| v == "1" || v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(default)
        };
        let number = |name: &str, default: u64| {
            var(name)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        let listen_addr = var("INTL_LISTEN_ADDR").unwrap_or(defaults.listen_addr);
        let db_path = var("INTL_DB_PATH").unwrap_or(defaults.db_path);
        let debug = flag("INTL_DEBUG", false) || flag("DEBUG", false);

        let default_country_code = var("INTL_DEFAULT_COUNTRY_CODE").and_then(CountryCode::new);
        let unique_domains = parse_code_map(var("INTL_UNIQUE_DOMAINS").as_deref(), "INTL_UNIQUE_DOMAINS")?;
        let debug_unique_domains = parse_code_map(
            var("INTL_DEBUG_UNIQUE_DOMAINS").as_deref(),
            "INTL_DEBUG_UNIQUE_DOMAINS",
        )?;
        let languages = parse_languages(var("INTL_LANGUAGES").as_deref());

        Ok(Config {
            listen_addr,
            db_path,
            debug,
            default_country_code,
            unique_domains,
            debug_unique_domains,
            force_country_language: flag("INTL_FORCE_COUNTRY_LANGUAGE", false),
            geoip_redirect: flag("INTL_GEOIP_REDIRECT", false),
            international_app: flag("INTL_INTERNATIONAL_APP", true),
            languages,
            geoip_path: var("INTL_GEOIP_PATH"),
            geoip_license: var("INTL_GEOIP_LICENSE"),
            geoip_download_url: var("INTL_GEOIP_DOWNLOAD_URL").unwrap_or(defaults.geoip_download_url),
            geoip_timeout_secs: number("INTL_GEOIP_TIMEOUT_SECS", defaults.geoip_timeout_secs),
            geoip_reload_secs: number("INTL_GEOIP_RELOAD_SECS", defaults.geoip_reload_secs),
            site_icon_dir: var("INTL_SITE_ICON_DIR"),
            site_icon_ext: var("INTL_SITE_ICON_EXT").unwrap_or(defaults.site_icon_ext),
        })
    }

    pub fn resolution_settings(&self) -> ResolutionSettings {
        ResolutionSettings {
            default_country_code: self.default_country_code.clone(),
            unique_domains: self.unique_domains.clone(),
            debug_unique_domains: self.debug_unique_domains.clone(),
            geoip_redirect: self.geoip_redirect,
            debug: self.debug,
        }
    }

    /// Scope applied to country and language filtered content.
    pub fn content_scope(&self) -> ContentScope {
        ContentScope::new(self.international_app)
    }

    pub fn updater_settings(&self) -> UpdaterSettings {
        UpdaterSettings {
            license: self.geoip_license.clone(),
            dataset_dir: self.geoip_path.as_ref().map(PathBuf::from),
            download_url: self.geoip_download_url.clone(),
            timeout: Duration::from_secs(self.geoip_timeout_secs),
        }
    }
}

pub fn load_config() -> anyhow::Result<Config> {
    Config::from_lookup(|name| std::env::var(name).ok())
}

/// Parse `key=CODE,key=CODE`. Codes are normalised to uppercase.
fn parse_code_map(raw: Option<&str>, name: &str) -> anyhow::Result<HashMap<String, CountryCode>> {
    let mut map = HashMap::new();
    let Some(raw) = raw else {
        return Ok(map);
    };

    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, code) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("{}: expected key=CODE, got {:?}", name, pair))?;
        let code = CountryCode::new(code)
            .ok_or_else(|| anyhow::anyhow!("{}: empty country code for {:?}", name, key))?;
        map.insert(key.trim().to_string(), code);
    }
    Ok(map)
}

/// Parse `code:Name,code:Name`. Entries without a name use the code.
fn parse_languages(raw: Option<&str>) -> Vec<(String, String)> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|pair| match pair.split_once(':') {
                Some((code, name)) => (code.trim().to_string(), name.trim().to_string()),
                None => (pair.to_string(), pair.to_string()),
            })
            .collect()
    })
    .unwrap_or_default()
}
