use std::path::PathBuf;
use thiserror::Error;

/// Boxed error produced by a transport implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while provisioning the resource directory.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The target directory could not be created.
    #[error("failed to create resource directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The remote server answered with a non-success status.
    #[error("failed to download {url}: server responded with status {status}")]
    Status { url: String, status: u16 },

    /// The request itself failed (connection, TLS, truncated body, ...).
    #[error("failed to download {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: BoxError,
    },

    /// The downloaded body could not be written to disk.
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while loading and compiling the model.
#[derive(Debug, Error)]
pub enum ExportError {
    /// A required resource file is absent from the directory.
    #[error("required resource {path:?} is missing; run the fetcher first")]
    MissingResource { path: PathBuf },

    /// The model configuration is not valid JSON for the loader.
    #[error("failed to parse model config {path:?}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The configuration or weights are incompatible with the loader.
    #[error("failed to load model from {path:?}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The graph compiler rejected the model or the signature.
    #[error("static graph compilation failed: {0}")]
    Compilation(String),
}

/// Error returned by the `download` workflow.
#[derive(Debug, Error)]
pub enum UtcError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Export(#[from] ExportError),
}
