//! Resource loading for the UTC model directory.
//!
//! This module makes sure a local directory holds the three files needed to
//! rebuild the eager UTC model:
//! - Model weights (`model_state.pdparams`)
//! - Architecture configuration (`config.json`)
//! - WordPiece vocabulary (`vocab.txt`)
//!
//! ## Main Types
//!
//! - [`ResourceLocator`] - Resolves a resource filename to its remote URL
//! - [`Transport`] - Opens a remote resource for reading
//! - [`HttpTransport`] - Blocking HTTP(S) transport backed by `reqwest`
//! - [`Fetcher`] - Downloads every missing resource into a directory
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use utc::loaders::{Fetcher, HttpTransport, ResourceLocator};
//!
//! let fetcher = Fetcher::new(HttpTransport::new()?, ResourceLocator::utc());
//! let report = fetcher.fetch("./utc-large")?;
//! println!("downloaded {:?}", report.downloaded);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Files that already exist are never downloaded again, whatever their
//! contents. There is no retry and no checksum validation.

use crate::core::error::FetchError;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

pub const MODEL_STATE_FILENAME: &str = "model_state.pdparams";
pub const CONFIG_FILENAME: &str = "config.json";
pub const VOCAB_FILENAME: &str = "vocab.txt";

/// Remote prefix shared by the weights and the configuration.
pub const URL_PREFIX: &str =
    "https://bj.bcebos.com/paddlenlp/taskflow/zero_shot_text_classification/utc-large/";

/// The vocabulary is published under a different prefix than the other files.
pub const VOCAB_FILE_URL: &str =
    "https://bj.bcebos.com/paddlenlp/taskflow/zero_text_classification/utc-large/vocab.txt";

/// A resource required before the model can be exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceFile {
    /// Logical name of the resource.
    pub name: &'static str,
    /// File name on disk and on the remote server.
    pub filename: &'static str,
}

/// The complete resource set, in download order.
pub const RESOURCE_FILES: [ResourceFile; 3] = [
    ResourceFile {
        name: "model_state",
        filename: MODEL_STATE_FILENAME,
    },
    ResourceFile {
        name: "config",
        filename: CONFIG_FILENAME,
    },
    ResourceFile {
        name: "vocab_file",
        filename: VOCAB_FILENAME,
    },
];

/// Look up a resource by its logical name.
pub fn resource(name: &str) -> Option<&'static ResourceFile> {
    RESOURCE_FILES.iter().find(|r| r.name == name)
}

/// Maps a filename to the URL it is downloaded from.
///
/// The override table is consulted first; any other file resolves to
/// `prefix + filename`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLocator {
    prefix: String,
    overrides: Vec<(String, String)>,
}

impl ResourceLocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            overrides: Vec::new(),
        }
    }

    /// Pin `filename` to an explicit URL instead of the prefix-based one.
    pub fn with_override(mut self, filename: impl Into<String>, url: impl Into<String>) -> Self {
        self.overrides.push((filename.into(), url.into()));
        self
    }

    /// Locator for the published `utc-large` resources.
    pub fn utc() -> Self {
        Self::new(URL_PREFIX).with_override(VOCAB_FILENAME, VOCAB_FILE_URL)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn resolve(&self, filename: &str) -> String {
        if let Some((_, url)) = self.overrides.iter().find(|(name, _)| name == filename) {
            return url.clone();
        }
        format!("{}{}", self.prefix, filename)
    }
}

impl Default for ResourceLocator {
    fn default() -> Self {
        Self::utc()
    }
}

/// Opens a remote resource for reading.
pub trait Transport {
    /// Issue the request and return the response body.
    ///
    /// Implementations must fail before returning a reader when the server
    /// does not answer with a success status, so that no local file is created
    /// for a failed download.
    fn open(&self, url: &str) -> Result<Box<dyn Read>, FetchError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn open(&self, url: &str) -> Result<Box<dyn Read>, FetchError> {
        (**self).open(url)
    }
}

/// Plain HTTP(S) GET with default headers and no authentication.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(None::<std::time::Duration>)
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn open(&self, url: &str) -> Result<Box<dyn Read>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                source: Box::new(e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(Box::new(response))
    }
}

/// What a [`Fetcher::fetch`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// The target directory did not exist and was created.
    pub created_dir: bool,
    pub downloaded: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Ensures a directory contains every file of [`RESOURCE_FILES`].
#[derive(Debug, Clone)]
pub struct Fetcher<T: Transport> {
    transport: T,
    locator: ResourceLocator,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, locator: ResourceLocator) -> Self {
        Self { transport, locator }
    }

    pub fn locator(&self) -> &ResourceLocator {
        &self.locator
    }

    /// Download every resource missing from `dir`, creating `dir` first if needed.
    pub fn fetch(&self, dir: impl AsRef<Path>) -> Result<FetchReport, FetchError> {
        let dir = dir.as_ref();
        let mut report = FetchReport::default();

        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|source| FetchError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
            report.created_dir = true;
        }

        for resource in RESOURCE_FILES.iter() {
            let local_path = dir.join(resource.filename);
            if local_path.exists() {
                tracing::debug!("{} already present at {:?}", resource.filename, local_path);
                report.skipped.push(local_path);
                continue;
            }

            let remote_url = self.locator.resolve(resource.filename);
            tracing::info!("Downloading {} from {}", resource.filename, remote_url);
            if let Err(e) = self.download(&remote_url, &local_path) {
                // A truncated file would be skipped as present on the next run.
                let _ = std::fs::remove_file(&local_path);
                return Err(e);
            }
            report.downloaded.push(local_path);
        }

        Ok(report)
    }

    fn download(&self, url: &str, local_path: &Path) -> Result<u64, FetchError> {
        let mut body = self.transport.open(url)?;

        let write_error = |source| FetchError::Write {
            path: local_path.to_path_buf(),
            source,
        };
        let mut file = File::create(local_path).map_err(write_error)?;

        // Read failures mid-body belong to the transport, write failures to the filesystem.
        let mut buf = vec![0u8; 64 * 1024];
        let mut written = 0u64;
        loop {
            let n = match body.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(FetchError::Transport {
                        url: url.to_string(),
                        source: Box::new(e),
                    })
                }
            };
            std::io::Write::write_all(&mut file, &buf[..n]).map_err(write_error)?;
            written += n as u64;
        }

        tracing::debug!("wrote {} bytes to {:?}", written, local_path);
        Ok(written)
    }
}
