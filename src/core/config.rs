use std::path::{Path, PathBuf};

/// Environment variable naming the Python interpreter that hosts the Paddle runtime.
pub const PYTHON_ENV: &str = "UTC_PYTHON";

const VENV_PYTHON: &str = "venv/bin/python3";
const DEFAULT_PYTHON: &str = "python3";

/// Default sequence budget of the prompt tokenizer.
pub const DEFAULT_MAX_SEQ_LENGTH: usize = 512;

/// Python interpreter used for the Paddle-backed exporter and inference engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonRuntime {
    pub interpreter: PathBuf,
}

impl PythonRuntime {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    /// Resolve the interpreter from `UTC_PYTHON`, then a local `venv`, then `python3`.
    pub fn from_env() -> Self {
        if let Some(python) = std::env::var_os(PYTHON_ENV).filter(|v| !v.is_empty()) {
            return Self::new(python);
        }
        if Path::new(VENV_PYTHON).exists() {
            return Self::new(VENV_PYTHON);
        }
        Self::new(DEFAULT_PYTHON)
    }

    /// Command running `script` inline; extra arguments land in `sys.argv[1:]`.
    pub fn command(&self, script: &str) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.interpreter);
        cmd.arg("-c").arg(script);
        cmd
    }
}

impl Default for PythonRuntime {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Configuration of a UTC inference model.
#[derive(Debug, Clone)]
pub struct UtcConfig {
    /// Path of the compiled program (`inference.pdmodel`).
    pub model_path: PathBuf,
    /// Path of the compiled parameters (`inference.pdiparams`).
    pub params_path: PathBuf,
    pub vocab_file: PathBuf,
    pub lower_case: bool,
    /// Longest token sequence fed to the model, special tokens included.
    pub max_seq_length: usize,
    pub python: PythonRuntime,
}

impl UtcConfig {
    /// Build a config from a directory laid out by `utc download`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let artifact = crate::export::artifact_prefix(dir);
        Self {
            model_path: artifact.with_extension(crate::export::PROGRAM_EXTENSION),
            params_path: artifact.with_extension(crate::export::PARAMS_EXTENSION),
            vocab_file: dir.join(crate::loaders::VOCAB_FILENAME),
            lower_case: true,
            max_seq_length: DEFAULT_MAX_SEQ_LENGTH,
            python: PythonRuntime::default(),
        }
    }
}
