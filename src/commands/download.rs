//! `utc download`: fetch the UTC resources, then export the static graph.

use crate::core::UtcError;
use crate::export::{ExportOutcome, Exporter, GraphCompiler, ModelLoader, PaddleCompiler, PaddleLoader};
use crate::loaders::{Fetcher, HttpTransport, ResourceLocator, Transport};
use std::path::Path;

/// Directory used when `--path` is not given.
pub const DEFAULT_PATH: &str = "./utc-large";

/// Download into `path` over HTTP and export with the local Paddle runtime.
pub fn run(path: impl AsRef<Path>) -> anyhow::Result<ExportOutcome> {
    let fetcher = Fetcher::new(HttpTransport::new()?, ResourceLocator::utc());
    let exporter = Exporter::new(PaddleLoader, PaddleCompiler::from_env());
    Ok(run_with(path, &fetcher, &exporter)?)
}

/// The download workflow over any transport, loader and compiler.
///
/// Export only starts once every resource is on disk; a failed fetch leaves
/// `static/` untouched.
pub fn run_with<T, L, C>(
    path: impl AsRef<Path>,
    fetcher: &Fetcher<T>,
    exporter: &Exporter<L, C>,
) -> Result<ExportOutcome, UtcError>
where
    T: Transport,
    L: ModelLoader,
    C: GraphCompiler<L::Model>,
{
    let path = path.as_ref();
    let report = fetcher.fetch(path)?;
    tracing::debug!(
        "fetched {} resources into {:?} ({} already present)",
        report.downloaded.len(),
        path,
        report.skipped.len()
    );
    Ok(exporter.export(path)?)
}
