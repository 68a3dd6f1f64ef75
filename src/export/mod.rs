//! Conversion of the eager UTC model into a static inference artifact.
//!
//! The exporter only orchestrates. Building the model from its config and
//! weights is delegated to a [`ModelLoader`], and tracing the graph against the
//! fixed [`InputSignature`] is delegated to a [`GraphCompiler`]. The production
//! pair lives in [`paddle`]; tests plug in stubs.
//!
//! The artifact is compiled into a staging directory and only moved to
//! `static/` once the compiler succeeded, so a failed export never leaves a
//! half-written `static/` behind.

pub mod paddle;
pub mod signature;

pub use paddle::{Mode, PaddleCompiler, PaddleLoader, PaddleModel};
pub use signature::{Dim, ElementType, InputSignature, SignatureError, TensorSpec};

use crate::core::error::ExportError;
use crate::loaders::RESOURCE_FILES;
use std::path::{Path, PathBuf};

/// Subdirectory holding the compiled artifact.
pub const STATIC_DIR: &str = "static";
/// Base name shared by every artifact file.
pub const ARTIFACT_NAME: &str = "inference";
pub const PROGRAM_EXTENSION: &str = "pdmodel";
pub const PARAMS_EXTENSION: &str = "pdiparams";

const STAGING_DIR: &str = ".static.partial";
/// The previous artifact, held aside while the new one is moved in.
const BACKUP_DIR: &str = ".static.old";

/// Path prefix of the artifact, `<dir>/static/inference`.
pub fn artifact_prefix(dir: &Path) -> PathBuf {
    dir.join(STATIC_DIR).join(ARTIFACT_NAME)
}

/// Whether both the program and the parameters exist under `prefix`.
pub fn artifact_exists(prefix: &Path) -> bool {
    prefix.with_extension(PROGRAM_EXTENSION).is_file()
        && prefix.with_extension(PARAMS_EXTENSION).is_file()
}

/// Builds a loaded, evaluation-mode model instance from a resource directory.
pub trait ModelLoader {
    type Model;

    fn load(&self, dir: &Path) -> Result<Self::Model, ExportError>;
}

/// Compiles a model against a signature and persists it under `prefix`.
pub trait GraphCompiler<M> {
    fn compile(
        &self,
        model: &M,
        signature: &InputSignature,
        prefix: &Path,
    ) -> Result<(), ExportError>;
}

impl<L: ModelLoader + ?Sized> ModelLoader for &L {
    type Model = L::Model;

    fn load(&self, dir: &Path) -> Result<Self::Model, ExportError> {
        (**self).load(dir)
    }
}

impl<M, C: GraphCompiler<M> + ?Sized> GraphCompiler<M> for &C {
    fn compile(
        &self,
        model: &M,
        signature: &InputSignature,
        prefix: &Path,
    ) -> Result<(), ExportError> {
        (**self).compile(model, signature, prefix)
    }
}

/// What to do when `static/` already holds an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportPolicy {
    /// Keep the existing artifact, like downloads keep existing files.
    #[default]
    SkipExisting,
    /// Recompile on every run.
    Always,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Exported(PathBuf),
    Skipped(PathBuf),
}

impl ExportOutcome {
    pub fn prefix(&self) -> &Path {
        match self {
            ExportOutcome::Exported(p) | ExportOutcome::Skipped(p) => p,
        }
    }
}

pub struct Exporter<L, C> {
    loader: L,
    compiler: C,
    signature: InputSignature,
    policy: ExportPolicy,
}

impl<L, C> Exporter<L, C>
where
    L: ModelLoader,
    C: GraphCompiler<L::Model>,
{
    pub fn new(loader: L, compiler: C) -> Self {
        Self {
            loader,
            compiler,
            signature: InputSignature::UTC,
            policy: ExportPolicy::default(),
        }
    }

    pub fn policy(mut self, policy: ExportPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn signature(&self) -> &InputSignature {
        &self.signature
    }

    /// Load the model from `dir` and write `dir/static/inference.*`.
    pub fn export(&self, dir: impl AsRef<Path>) -> Result<ExportOutcome, ExportError> {
        let dir = dir.as_ref();

        for resource in RESOURCE_FILES.iter() {
            let path = dir.join(resource.filename);
            if !path.is_file() {
                return Err(ExportError::MissingResource { path });
            }
        }

        let prefix = artifact_prefix(dir);
        if self.policy == ExportPolicy::SkipExisting && artifact_exists(&prefix) {
            tracing::info!("The inference model already exists in {:?}", prefix);
            return Ok(ExportOutcome::Skipped(prefix));
        }

        let model = self.loader.load(dir)?;

        tracing::info!("Converting to the inference model costs a little time.");
        let staging = dir.join(STAGING_DIR);
        reset_dir(&staging)?;
        let staged_prefix = staging.join(ARTIFACT_NAME);

        if let Err(e) = self.compiler.compile(&model, &self.signature, &staged_prefix) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }

        replace_dir(&staging, &dir.join(STATIC_DIR), &dir.join(BACKUP_DIR))?;

        tracing::info!("The inference model is saved in {:?}", prefix);
        Ok(ExportOutcome::Exported(prefix))
    }
}

/// Move `staged` to `target`. An existing `target` is moved to `backup`
/// first and restored if the swap fails.
fn replace_dir(staged: &Path, target: &Path, backup: &Path) -> Result<(), ExportError> {
    if backup.exists() {
        remove_dir(backup)?;
    }

    let had_previous = target.exists();
    if had_previous {
        std::fs::rename(target, backup).map_err(|source| ExportError::Io {
            path: target.to_path_buf(),
            source,
        })?;
    }

    if let Err(source) = std::fs::rename(staged, target) {
        if had_previous {
            let _ = std::fs::rename(backup, target);
        }
        let _ = std::fs::remove_dir_all(staged);
        return Err(ExportError::Io {
            path: target.to_path_buf(),
            source,
        });
    }

    if had_previous {
        remove_dir(backup)?;
    }
    Ok(())
}

fn remove_dir(path: &Path) -> Result<(), ExportError> {
    std::fs::remove_dir_all(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn reset_dir(path: &Path) -> Result<(), ExportError> {
    let io_error = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(io_error)?;
    }
    std::fs::create_dir_all(path).map_err(io_error)
}
