pub mod commands;
pub mod core;
pub mod export;
pub mod loaders;
pub mod models;
pub mod pipelines;

// Re-export core types
pub use core::{ExportError, FetchError, PythonRuntime, UtcConfig, UtcError};

pub use export::{ExportOutcome, ExportPolicy, Exporter, InputSignature};
pub use loaders::{Fetcher, HttpTransport, ResourceLocator, RESOURCE_FILES};
pub use models::UtcModel;
