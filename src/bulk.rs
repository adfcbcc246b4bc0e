//! Bulk corpus sources: thin URL catalogues, the download manifest, and the
//! shared retry contract.
//!
//! Transport scheduling beyond per-call retry/backoff belongs to the external
//! downloader; this module owns the closed source set, manifest bookkeeping,
//! resumability, and feeding downloaded sources into the library.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BulkError;
use crate::library::{AddOptions, Library, now_epoch};
use crate::patterns::PatternRegistry;

/// The closed set of bulk sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    USCode,
    Cfr,
    California,
    Archive,
    Parliamentary,
}

impl Source {
    pub const ALL: [Source; 5] = [
        Source::USCode,
        Source::Cfr,
        Source::California,
        Source::Archive,
        Source::Parliamentary,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::USCode => "uscode",
            Self::Cfr => "cfr",
            Self::California => "california",
            Self::Archive => "archive",
            Self::Parliamentary => "parliamentary",
        }
    }

    pub fn from_flag(s: &str) -> Result<Self, BulkError> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "uscode" => Self::USCode,
            "cfr" => Self::Cfr,
            "california" => Self::California,
            "archive" => Self::Archive,
            "parliamentary" => Self::Parliamentary,
            other => {
                return Err(BulkError::UnknownSource {
                    name: other.to_string(),
                });
            }
        })
    }

    /// The source's URL catalogue. Deliberately small; the bulk transport
    /// collaborator owns discovery beyond these seeds.
    pub fn catalog(&self) -> Vec<BulkRecord> {
        let record = |identifier: &str, title: &str, url: &str| BulkRecord {
            identifier: identifier.to_string(),
            title: title.to_string(),
            url: url.to_string(),
        };
        match self {
            Self::USCode => vec![
                record(
                    "usc-title-15",
                    "U.S. Code Title 15 - Commerce and Trade",
                    "https://uscode.house.gov/download/releasepoints/us/pl/118/xml_usc15.zip",
                ),
                record(
                    "usc-title-44",
                    "U.S. Code Title 44 - Public Printing and Documents",
                    "https://uscode.house.gov/download/releasepoints/us/pl/118/xml_usc44.zip",
                ),
            ],
            Self::Cfr => vec![
                record(
                    "cfr-title-16",
                    "CFR Title 16 - Commercial Practices",
                    "https://www.govinfo.gov/bulkdata/CFR/2024/title-16/CFR-2024-title16-vol1.xml",
                ),
                record(
                    "cfr-title-45",
                    "CFR Title 45 - Public Welfare",
                    "https://www.govinfo.gov/bulkdata/CFR/2024/title-45/CFR-2024-title45-vol1.xml",
                ),
            ],
            Self::California => vec![record(
                "ccpa",
                "California Consumer Privacy Act",
                "https://leginfo.legislature.ca.gov/faces/codes_displayText.xhtml?division=3.&part=4.&lawCode=CIV&title=1.81.5",
            )],
            Self::Archive => vec![record(
                "ia-gdpr",
                "GDPR full text (Internet Archive mirror)",
                "https://archive.org/download/gdpr-text/gdpr-text.txt",
            )],
            Self::Parliamentary => vec![record(
                "eu-2016-679",
                "Regulation (EU) 2016/679 (GDPR)",
                "https://eur-lex.europa.eu/legal-content/EN/TXT/?uri=CELEX:32016R0679",
            )],
        }
    }
}

/// One downloadable item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkRecord {
    pub identifier: String,
    pub title: String,
    pub url: String,
}

/// One completed download as recorded in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub identifier: String,
    pub source_name: String,
    pub url: String,
    pub local_path: String,
    pub size_bytes: u64,
    pub downloaded_at: u64,
}

/// `downloads/manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadManifest {
    pub version: u32,
    pub updated_at: u64,
    pub downloads: BTreeMap<String, ManifestEntry>,
}

impl Default for DownloadManifest {
    fn default() -> Self {
        Self {
            version: 1,
            updated_at: 0,
            downloads: BTreeMap::new(),
        }
    }
}

impl DownloadManifest {
    /// Load a manifest; a missing file is an empty manifest.
    pub fn load(path: &Path) -> Result<Self, BulkError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| BulkError::Manifest {
            message: format!("read {}: {e}", path.display()),
        })?;
        serde_json::from_str(&text).map_err(|e| BulkError::Manifest {
            message: format!("parse {}: {e}", path.display()),
        })
    }

    pub fn save(&mut self, path: &Path) -> Result<(), BulkError> {
        self.updated_at = now_epoch();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BulkError::Io { source: e })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| BulkError::Manifest {
            message: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| BulkError::Io { source: e })
    }
}

/// Transport seam for the download contract.
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchFailure>;
}

/// One failed attempt, classified for the retry loop.
#[derive(Debug, Clone)]
pub enum FetchFailure {
    /// HTTP 4xx: not retryable.
    Client(u16),
    /// HTTP 5xx or transport error: retryable.
    Retryable(String),
}

/// Retry policy shared with the external bulk downloader.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// ureq-backed fetcher with a 5-minute timeout.
pub struct HttpFetcher {
    agent: ureq::Agent,
    user_agent: String,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(300))
                .build(),
            user_agent: concat!("regula-bulk/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        let response = self
            .agent
            .get(url)
            .set("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) if (400..500).contains(&code) => {
                    FetchFailure::Client(code)
                }
                other => FetchFailure::Retryable(other.to_string()),
            })?;
        let mut data = Vec::new();
        use std::io::Read;
        response
            .into_reader()
            .read_to_end(&mut data)
            .map_err(|e| FetchFailure::Retryable(e.to_string()))?;
        Ok(data)
    }
}

/// Fetch with the shared retry contract: exponential backoff, 5xx and
/// transport errors retryable, 4xx not.
pub fn fetch_with_retry(
    fetcher: &dyn Fetch,
    url: &str,
    policy: &RetryPolicy,
) -> Result<Vec<u8>, BulkError> {
    let mut attempt = 0;
    loop {
        match fetcher.fetch(url) {
            Ok(data) => return Ok(data),
            Err(FetchFailure::Client(code)) => {
                return Err(BulkError::Download {
                    url: url.to_string(),
                    message: format!("HTTP {code}"),
                });
            }
            Err(FetchFailure::Retryable(message)) => {
                attempt += 1;
                if attempt > policy.max_retries {
                    return Err(BulkError::Download {
                        url: url.to_string(),
                        message,
                    });
                }
                let delay = policy.base_delay * 2u32.pow(attempt - 1);
                tracing::warn!(url, attempt, ?delay, "retrying download");
                std::thread::sleep(delay);
            }
        }
    }
}

/// Download outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub downloaded: usize,
    pub resumed: usize,
    pub failed: usize,
}

/// Download a source's catalogue into `downloads/`, maintaining the
/// manifest. A record with a non-empty local file and a manifest entry is
/// resumed (skipped).
pub fn download(
    source: Source,
    dest_dir: &Path,
    fetcher: &dyn Fetch,
    policy: &RetryPolicy,
) -> Result<DownloadStats, BulkError> {
    let manifest_path = dest_dir.join("manifest.json");
    let mut manifest = DownloadManifest::load(&manifest_path)?;
    std::fs::create_dir_all(dest_dir).map_err(|e| BulkError::Io { source: e })?;

    let mut stats = DownloadStats::default();
    for record in source.catalog() {
        let local_path = dest_dir.join(format!("{}.dat", record.identifier));
        let already = manifest.downloads.contains_key(&record.identifier)
            && local_path
                .metadata()
                .map(|m| m.len() > 0)
                .unwrap_or(false);
        if already {
            stats.resumed += 1;
            continue;
        }

        match fetch_with_retry(fetcher, &record.url, policy) {
            Ok(data) => {
                std::fs::write(&local_path, &data).map_err(|e| BulkError::Io { source: e })?;
                manifest.downloads.insert(
                    record.identifier.clone(),
                    ManifestEntry {
                        identifier: record.identifier.clone(),
                        source_name: source.name().to_string(),
                        url: record.url.clone(),
                        local_path: local_path.display().to_string(),
                        size_bytes: data.len() as u64,
                        downloaded_at: now_epoch(),
                    },
                );
                stats.downloaded += 1;
            }
            Err(e) => {
                tracing::warn!(identifier = %record.identifier, error = %e, "download failed");
                stats.failed += 1;
            }
        }
    }

    manifest.save(&manifest_path)?;
    Ok(stats)
}

/// Ingest counts for `bulk ingest`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkIngestStats {
    pub ingested: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Feed downloaded sources into the library. Existing documents are skipped;
/// pipeline failures are recorded as Failed entries.
pub fn ingest_downloads(
    library: &Library,
    downloads_dir: &Path,
    registry: &PatternRegistry,
) -> Result<BulkIngestStats, BulkError> {
    let manifest = DownloadManifest::load(&downloads_dir.join("manifest.json"))?;
    let mut stats = BulkIngestStats::default();

    for entry in manifest.downloads.values() {
        let text = match std::fs::read_to_string(&entry.local_path) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(id = %entry.identifier, error = %e, "unreadable download");
                stats.failed += 1;
                continue;
            }
        };
        let options = AddOptions {
            origin: Some(entry.url.clone()),
            tags: vec![entry.source_name.clone()],
            ..Default::default()
        };
        match library.add_document(&entry.identifier, &text, &options, registry) {
            Ok(_) => stats.ingested += 1,
            Err(crate::error::LibraryError::Duplicate { .. }) => stats.skipped += 1,
            Err(e) => {
                tracing::warn!(id = %entry.identifier, error = %e, "bulk ingest failed");
                let _ = library.record_failure(&entry.identifier, Some(entry.url.clone()));
                stats.failed += 1;
            }
        }
    }

    Ok(stats)
}
