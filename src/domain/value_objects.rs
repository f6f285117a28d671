//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Country code identifying a country site (e.g. `NL`, `UK`, `NL-OK`).
///
/// Always stored uppercase and trimmed, whatever case the input used.
/// This is the primary resolution and cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    /// Normalise a raw code. Returns `None` for blank input.
    ///
    /// # Examples
    /// ```
    /// use country_sites::domain::value_objects::CountryCode;
    ///
    /// assert_eq!(CountryCode::new("nl-ok").unwrap().as_str(), "NL-OK");
    /// assert!(CountryCode::new("  ").is_none());
    /// ```
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CountryCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value).ok_or_else(|| "country code must not be empty".to_string())
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.0
    }
}

impl AsRef<str> for CountryCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonical name of the installed geolocation dataset inside the dataset
/// directory.
pub const DATASET_FILE_NAME: &str = "GeoLite2-Country.mmdb";

/// Suffix of the archives published by the dataset vendor.
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// A version-stamped dataset archive name, e.g.
/// `GeoLite2-Country_20240101.tar.gz`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DatasetArchive {
    file_name: String,
    version: String,
}

impl DatasetArchive {
    /// Parse an archive file name. The version is the all-digit stamp after
    /// the last underscore. Names containing path separators are rejected.
    pub fn parse(file_name: &str) -> Option<Self> {
        let file_name = file_name.trim().trim_matches('"');
        if file_name.contains('/') || file_name.contains('\\') {
            return None;
        }
        let stem = file_name.strip_suffix(ARCHIVE_SUFFIX)?;
        let (_, version) = stem.rsplit_once('_')?;
        if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            file_name: file_name.to_string(),
            version: version.to_string(),
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Directory name the archive unpacks into (the name without suffix).
    pub fn stem(&self) -> &str {
        self.file_name
            .strip_suffix(ARCHIVE_SUFFIX)
            .unwrap_or(&self.file_name)
    }
}
