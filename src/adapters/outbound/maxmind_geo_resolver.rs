//! MaxMind GeoIP Resolver
//!
//! Implements GeoResolver using the installed MaxMind GeoLite2-Country
//! dataset. Lookups are best-effort and never fail.

use crate::domain::ports::GeoResolver;
use crate::domain::value_objects::{CountryCode, DATASET_FILE_NAME};
use maxminddb::Reader;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// MaxMind GeoIP resolver.
///
/// Reads `GeoLite2-Country.mmdb` from the dataset directory. When no
/// directory is configured or no dataset is installed yet, every lookup
/// returns `None`. The reader is swapped as a whole on reload, so a lookup
/// sees either the old dataset or the new one.
pub struct MaxMindGeoResolver {
    dataset_path: Option<PathBuf>,
    reader: RwLock<Option<Arc<Reader<Vec<u8>>>>>,
    loaded_mtime: Mutex<Option<SystemTime>>,
}

impl MaxMindGeoResolver {
    /// Resolver over the canonical dataset inside `dataset_dir`.
    ///
    /// Never fails: a missing or unreadable dataset is logged and leaves
    /// the resolver empty until the next successful reload.
    pub fn new(dataset_dir: Option<&Path>) -> Self {
        let resolver = Self {
            dataset_path: dataset_dir.map(|d| d.join(DATASET_FILE_NAME)),
            reader: RwLock::new(None),
            loaded_mtime: Mutex::new(None),
        };
        resolver.reload_if_changed();
        resolver
    }

    pub fn dataset_path(&self) -> Option<&Path> {
        self.dataset_path.as_deref()
    }

    /// Whether a dataset is currently loaded.
    pub fn is_installed(&self) -> bool {
        self.reader.read().is_some()
    }

    /// Reopen the dataset if the file changed since it was last loaded.
    ///
    /// Returns whether a new reader was installed.
    pub fn reload_if_changed(&self) -> bool {
        let Some(path) = self.dataset_path.as_deref() else {
            return false;
        };

        let Some(mtime) = Self::mtime(path) else {
            if self.reader.write().take().is_some() {
                tracing::warn!("GeoIP dataset {} disappeared", path.display());
            }
            *self.loaded_mtime.lock() = None;
            return false;
        };

        let mut loaded = self.loaded_mtime.lock();
        if *loaded == Some(mtime) {
            return false;
        }

        match Reader::open_readfile(path) {
            Ok(reader) => {
                *self.reader.write() = Some(Arc::new(reader));
                *loaded = Some(mtime);
                tracing::info!("GeoIP dataset loaded from {}", path.display());
                true
            }
            Err(e) => {
                // Keep serving the previous reader if there is one.
                *loaded = Some(mtime);
                tracing::error!("failed to load GeoIP dataset from {}: {:?}", path.display(), e);
                false
            }
        }
    }

    /// Start the background reload task.
    ///
    /// Polls the dataset file so that updates installed by the refresh job
    /// reach a running server.
    pub fn start_reload(self: &Arc<Self>, interval: Duration) {
        let resolver = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let resolver = resolver.clone();
                match tokio::task::spawn_blocking(move || resolver.reload_if_changed()).await {
                    Ok(true) => tracing::info!("GeoIP dataset reloaded"),
                    Ok(false) => {}
                    Err(e) => tracing::error!("spawn_blocking error: {:?}", e),
                }
            }
        });
    }

    fn mtime(path: &Path) -> Option<SystemTime> {
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    }

    /// Addresses that can never carry a country: private, loopback,
    /// link-local, multicast, documentation and the like.
    fn is_routable(ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => Self::is_routable_v4(v4),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => Self::is_routable_v4(v4),
                None => Self::is_routable_v6(v6),
            },
        }
    }

    fn is_routable_v4(ip: Ipv4Addr) -> bool {
        !(ip.is_private()
            || ip.is_loopback()
            || ip.is_link_local()
            || ip.is_broadcast()
            || ip.is_documentation()
            || ip.is_unspecified()
            || ip.is_multicast()
            // 100.64.0.0/10 shared address space
            || (ip.octets()[0] == 100 && (ip.octets()[1] & 0xc0) == 64))
    }

    fn is_routable_v6(ip: Ipv6Addr) -> bool {
        let first = ip.segments()[0];
        !(ip.is_loopback()
            || ip.is_unspecified()
            || ip.is_multicast()
            || (first & 0xfe00) == 0xfc00 // unique local
            || (first & 0xffc0) == 0xfe80 // link local
            || first == 0x2001 && ip.segments()[1] == 0x0db8) // documentation
    }
}

impl GeoResolver for MaxMindGeoResolver {
    fn country(&self, ip: IpAddr) -> Option<CountryCode> {
        #[derive(Debug, Deserialize)]
        struct Country {
            iso_code: Option<String>,
        }

        #[derive(Debug, Deserialize)]
        struct CountryResp {
            country: Option<Country>,
        }

        if !Self::is_routable(ip) {
            return None;
        }

        let reader = self.reader.read().clone()?;
        let resp: CountryResp = match reader.lookup(ip) {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!("GeoIP lookup for {} failed: {}", ip, e);
                return None;
            }
        };
        let iso = resp.country?.iso_code?;
        CountryCode::new(iso)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_dataset_configured_returns_none() {
        let resolver = MaxMindGeoResolver::new(None);
        assert!(!resolver.is_installed());
        assert!(resolver.dataset_path().is_none());
        assert!(resolver.country("8.8.8.8".parse().unwrap()).is_none());
        assert!(!resolver.reload_if_changed());
    }

    #[test]
    fn test_empty_dataset_dir_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = MaxMindGeoResolver::new(Some(dir.path()));

        assert!(!resolver.is_installed());
        assert_eq!(
            resolver.dataset_path().unwrap(),
            dir.path().join("GeoLite2-Country.mmdb")
        );
        assert!(resolver.country("8.8.8.8".parse().unwrap()).is_none());
    }

    #[test]
    fn test_corrupt_dataset_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DATASET_FILE_NAME), b"not a maxmind database").unwrap();

        let resolver = MaxMindGeoResolver::new(Some(dir.path()));
        assert!(!resolver.is_installed());
        assert!(resolver.country("8.8.8.8".parse().unwrap()).is_none());
    }

    #[test]
    fn test_private_and_reserved_addresses_not_routable() {
        for ip in [
            "10.0.0.1",
            "172.16.0.1",
            "192.168.1.1",
            "127.0.0.1",
            "169.254.1.1",
            "255.255.255.255",
            "0.0.0.0",
            "100.64.0.1",
            "192.0.2.10",
            "::1",
            "::",
            "fe80::1",
            "fd00::1",
            "2001:db8::1",
            "::ffff:192.168.1.1",
        ] {
            let ip: IpAddr = ip.parse().unwrap();
            assert!(!MaxMindGeoResolver::is_routable(ip), "{} should not be routable", ip);
        }
    }

    #[test]
    fn test_public_addresses_routable() {
        for ip in ["8.8.8.8", "1.1.1.1", "143.177.174.48", "2a00:1450:4001::1"] {
            let ip: IpAddr = ip.parse().unwrap();
            assert!(MaxMindGeoResolver::is_routable(ip), "{} should be routable", ip);
        }
    }

    #[test]
    fn test_dataset_removed_after_load_clears_reader() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = MaxMindGeoResolver::new(Some(dir.path()));

        std::fs::write(dir.path().join(DATASET_FILE_NAME), b"garbage").unwrap();
        assert!(!resolver.reload_if_changed());
        std::fs::remove_file(dir.path().join(DATASET_FILE_NAME)).unwrap();
        assert!(!resolver.reload_if_changed());
        assert!(!resolver.is_installed());
    }

    #[test]
    fn test_resolver_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MaxMindGeoResolver>();
    }
}
