//! Dataset Updater - GeoLite2 refresh pipeline
//!
//! Checks the publisher for the latest GeoLite2-Country archive, and when
//! it is newer than what is installed downloads it, extracts the dataset
//! and swaps it into place under the canonical file name. Meant to run
//! from a single scheduled slot; two concurrent runs would race on the
//! staging paths.

use crate::domain::errors::UpdateError;
use crate::domain::value_objects::{DatasetArchive, ARCHIVE_SUFFIX, DATASET_FILE_NAME};
use flate2::read::GzDecoder;
use reqwest::header::CONTENT_DISPOSITION;
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// MaxMind permalink for the GeoLite2-Country archive.
pub const DEFAULT_DOWNLOAD_URL: &str = "https://download.maxmind.com/app/geoip_download?edition_id=GeoLite2-Country&license_key={license}&suffix=tar.gz";

/// Records which archive the installed dataset came from.
const VERSION_STAMP: &str = "GeoLite2-Country.version";

const PARTIAL_SUFFIX: &str = ".part";
const STAGING_SUFFIX: &str = ".staging";

#[derive(Debug, Clone)]
pub struct UpdaterSettings {
    /// Publisher access key
    pub license: Option<String>,
    /// Directory holding the installed dataset
    pub dataset_dir: Option<PathBuf>,
    /// Download URL with a `{license}` placeholder
    pub download_url: String,
    /// Bound on each network request
    pub timeout: Duration,
}

impl Default for UpdaterSettings {
    fn default() -> Self {
        Self {
            license: None,
            dataset_dir: None,
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// The installed dataset already matches the latest archive
    NoOp,
    /// A new dataset was installed
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateResult {
    pub outcome: UpdateOutcome,
    /// Version stamp of the dataset now installed
    pub version: String,
    pub archive: String,
}

pub struct DatasetUpdater {
    settings: UpdaterSettings,
    client: reqwest::Client,
}

impl DatasetUpdater {
    pub fn new(settings: UpdaterSettings) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| UpdateError::Misconfigured(format!("http client: {e}")))?;
        Ok(Self { settings, client })
    }

    /// Run one update cycle.
    ///
    /// Idempotent: with no new archive published, a second run is a no-op
    /// and leaves the installed file untouched. On any failure the
    /// previously installed dataset stays in place.
    pub async fn check_and_update(&self) -> Result<UpdateResult, UpdateError> {
        let (license, dir) = self.require_settings()?;
        let url = self.settings.download_url.replace("{license}", license);

        tracing::info!("checking for GeoIP2 dataset updates");
        let latest = self.latest_archive(&url).await?;
        tracing::info!("latest dataset available for download is {}", latest.file_name());

        let current = {
            let dir = dir.to_path_buf();
            let latest = latest.clone();
            tokio::task::spawn_blocking(move || is_current(&dir, &latest))
                .await
                .map_err(|e| UpdateError::Io(std::io::Error::other(e)))??
        };
        if current {
            tracing::info!(
                "installed GeoIP2 dataset is the latest version available ({})",
                latest.file_name()
            );
            return Ok(UpdateResult {
                outcome: UpdateOutcome::NoOp,
                version: latest.version().to_string(),
                archive: latest.file_name().to_string(),
            });
        }

        let archive_path = self.download(&url, dir, &latest).await?;
        tracing::info!("downloaded {} to {}", latest.file_name(), archive_path.display());

        {
            let dir = dir.to_path_buf();
            let latest = latest.clone();
            tokio::task::spawn_blocking(move || install(&dir, &archive_path, &latest))
                .await
                .map_err(|e| UpdateError::Io(std::io::Error::other(e)))??;
        }

        tracing::info!("installed GeoIP2 dataset version {}", latest.version());
        Ok(UpdateResult {
            outcome: UpdateOutcome::Updated,
            version: latest.version().to_string(),
            archive: latest.file_name().to_string(),
        })
    }

    fn require_settings(&self) -> Result<(&str, &Path), UpdateError> {
        let license = self
            .settings
            .license
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| {
                UpdateError::Misconfigured("add a MaxMind license key: INTL_GEOIP_LICENSE".into())
            })?;
        let dir = self
            .settings
            .dataset_dir
            .as_deref()
            .ok_or_else(|| {
                UpdateError::Misconfigured("set the dataset directory: INTL_GEOIP_PATH".into())
            })?;
        Ok((license, dir))
    }

    /// Ask the publisher for the latest archive name without fetching it.
    async fn latest_archive(&self, url: &str) -> Result<DatasetArchive, UpdateError> {
        let resp = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| UpdateError::UpdateCheck(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(UpdateError::UpdateCheck(format!(
                "publisher returned status {}",
                status
            )));
        }

        let disposition = resp
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| UpdateError::UpdateCheck("missing Content-Disposition header".into()))?;

        attachment_file_name(disposition)
            .and_then(DatasetArchive::parse)
            .ok_or_else(|| {
                UpdateError::UpdateCheck(format!("unrecognised archive name in {:?}", disposition))
            })
    }

    /// Download the archive into the dataset directory, via a partial file.
    async fn download(
        &self,
        url: &str,
        dir: &Path,
        archive: &DatasetArchive,
    ) -> Result<PathBuf, UpdateError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| UpdateError::Download(e.without_url().to_string()))?;
        let body = resp
            .bytes()
            .await
            .map_err(|e| UpdateError::Download(e.without_url().to_string()))?;

        let final_path = dir.join(archive.file_name());
        let partial = dir.join(format!("{}{}", archive.file_name(), PARTIAL_SUFFIX));
        if let Err(e) = tokio::fs::write(&partial, &body).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        tokio::fs::rename(&partial, &final_path).await?;
        Ok(final_path)
    }
}

/// Extract the file name from a Content-Disposition value such as
/// `attachment; filename=GeoLite2-Country_20210824.tar.gz`.
fn attachment_file_name(disposition: &str) -> Option<&str> {
    let (_, rest) = disposition.rsplit_once("filename=")?;
    let name = rest.split(';').next()?.trim().trim_matches('"');
    (!name.is_empty()).then_some(name)
}

/// Whether the installed dataset already comes from `latest`.
///
/// An empty directory always needs a download, whatever archives lie
/// around.
fn is_current(dir: &Path, latest: &DatasetArchive) -> Result<bool, UpdateError> {
    if !dir.is_dir() {
        return Err(UpdateError::Misconfigured(format!(
            "dataset directory {} does not exist",
            dir.display()
        )));
    }
    if !dir.join(DATASET_FILE_NAME).is_file() {
        return Ok(false);
    }
    let stamped = fs::read_to_string(dir.join(VERSION_STAMP))
        .map(|s| s.trim() == latest.file_name())
        .unwrap_or(false);
    Ok(stamped || dir.join(latest.file_name()).is_file())
}

/// Extract the dataset from `archive_path` and swap it into place.
///
/// The new file is fully written in a staging directory first; the rename
/// onto the canonical name is the only step a reader can observe.
fn install(dir: &Path, archive_path: &Path, archive: &DatasetArchive) -> Result<(), UpdateError> {
    let staging = dir.join(format!("{}{}", archive.stem(), STAGING_SUFFIX));
    let result = extract_dataset(archive_path, &staging).and_then(|extracted| {
        fs::rename(&extracted, dir.join(DATASET_FILE_NAME))?;
        write_stamp(dir, archive)?;
        Ok(())
    });

    if staging.exists() {
        if let Err(e) = fs::remove_dir_all(&staging) {
            tracing::warn!("could not remove {}: {}", staging.display(), e);
        }
    }

    match result {
        Ok(()) => {
            purge_artifacts(dir)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(archive_path);
            Err(e)
        }
    }
}

/// Unpack the single `.mmdb` entry of the archive into `staging`.
fn extract_dataset(archive_path: &Path, staging: &Path) -> Result<PathBuf, UpdateError> {
    if staging.exists() {
        fs::remove_dir_all(staging)?;
    }
    fs::create_dir_all(staging)?;

    let file = File::open(archive_path)?;
    let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    // Readers reload on mtime change; stamp the install time, not the header's.
    tar.set_preserve_mtime(false);
    let entries = tar
        .entries()
        .map_err(|e| UpdateError::Extract(e.to_string()))?;

    let target = staging.join(DATASET_FILE_NAME);
    for entry in entries {
        let mut entry = entry.map_err(|e| UpdateError::Extract(e.to_string()))?;
        let is_dataset = entry
            .path()
            .map(|p| p.extension().is_some_and(|ext| ext == "mmdb"))
            .unwrap_or(false);
        if !is_dataset || !entry.header().entry_type().is_file() {
            continue;
        }

        entry
            .unpack(&target)
            .map_err(|e| UpdateError::Extract(e.to_string()))?;
        let size = fs::metadata(&target)?.len();
        if size == 0 {
            return Err(UpdateError::Extract("dataset file in archive is empty".into()));
        }
        File::open(&target)?.sync_all()?;
        return Ok(target);
    }

    Err(UpdateError::Extract(format!(
        "no {} file found in {}",
        DATASET_FILE_NAME,
        archive_path.display()
    )))
}

fn write_stamp(dir: &Path, archive: &DatasetArchive) -> Result<(), UpdateError> {
    let tmp = dir.join(format!("{}{}", VERSION_STAMP, PARTIAL_SUFFIX));
    fs::write(&tmp, archive.file_name())?;
    fs::rename(&tmp, dir.join(VERSION_STAMP))?;
    Ok(())
}

/// Remove downloaded archives, partial files and leftover staging
/// directories. The canonical dataset and its stamp stay.
fn purge_artifacts(dir: &Path) -> Result<(), UpdateError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let path = entry.path();

        let stale = name.ends_with(ARCHIVE_SUFFIX)
            || name.ends_with(PARTIAL_SUFFIX)
            || (name.ends_with(STAGING_SUFFIX) && path.is_dir());
        if !stale {
            continue;
        }

        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match removed {
            Ok(()) => tracing::debug!("removed stale dataset artifact {}", name),
            Err(e) => tracing::warn!("could not remove {}: {}", path.display(), e),
        }
    }
    Ok(())
}
