pub mod config;
pub mod error;

pub use config::{PythonRuntime, UtcConfig};
pub use error::{ExportError, FetchError, UtcError};
