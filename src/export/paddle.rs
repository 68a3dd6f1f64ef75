//! Paddle-backed model loader and graph compiler.
//!
//! The UTC architecture and `paddle.jit` only exist in the Paddle Python
//! runtime. The loader validates the resource directory on the Rust side; the
//! compiler renders an export script and runs it in the configured interpreter.

use super::signature::InputSignature;
use super::{artifact_exists, GraphCompiler, ModelLoader, PARAMS_EXTENSION, PROGRAM_EXTENSION};
use crate::core::config::PythonRuntime;
use crate::core::error::ExportError;
use crate::loaders::{CONFIG_FILENAME, MODEL_STATE_FILENAME};
use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Architecture name the loader accepts in `config.json`.
pub const ARCHITECTURE: &str = "UTC";

const EXPORT_TEMPLATE: &str = r#"import paddle
from paddlenlp.transformers import UTC

paddle.disable_static()
model = UTC.from_pretrained({{ model_dir | tojson }})
state_dict = paddle.load({{ weights | tojson }})
model.set_dict(state_dict)
model.eval()

input_spec = [
{%- for spec in specs %}
    paddle.static.InputSpec(shape={{ spec.shape }}, dtype={{ spec.dtype | tojson }}, name={{ spec.name | tojson }}),
{%- endfor %}
]

static_model = paddle.jit.to_static(model, input_spec=input_spec)
paddle.jit.save(static_model, {{ output | tojson }})
"#;

/// Fields of the UTC `config.json` the loader looks at.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UtcModelConfig {
    #[serde(default)]
    pub architectures: Option<Vec<String>>,
    #[serde(default)]
    pub vocab_size: Option<usize>,
    #[serde(default)]
    pub hidden_size: Option<usize>,
    #[serde(default)]
    pub num_hidden_layers: Option<usize>,
    #[serde(default)]
    pub max_position_embeddings: Option<usize>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// An eager UTC model ready to be traced.
#[derive(Debug, Clone)]
pub struct PaddleModel {
    pub dir: PathBuf,
    pub config: UtcModelConfig,
    pub weights: PathBuf,
    mode: Mode,
}

impl PaddleModel {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switch to inference mode (dropout off).
    pub fn eval(mut self) -> Self {
        self.mode = Mode::Eval;
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PaddleLoader;

impl ModelLoader for PaddleLoader {
    type Model = PaddleModel;

    fn load(&self, dir: &Path) -> Result<PaddleModel, ExportError> {
        let config_path = dir.join(CONFIG_FILENAME);
        let content = std::fs::read_to_string(&config_path).map_err(|source| ExportError::Io {
            path: config_path.clone(),
            source,
        })?;
        let config: UtcModelConfig =
            serde_json::from_str(&content).map_err(|source| ExportError::Config {
                path: config_path.clone(),
                source,
            })?;

        if let Some(architectures) = &config.architectures {
            if !architectures.iter().any(|a| a == ARCHITECTURE) {
                return Err(ExportError::Load {
                    path: config_path,
                    reason: format!(
                        "config declares architectures {architectures:?}, expected {ARCHITECTURE}"
                    ),
                });
            }
        }

        let weights = dir.join(MODEL_STATE_FILENAME);
        let size = std::fs::metadata(&weights)
            .map_err(|source| ExportError::Io {
                path: weights.clone(),
                source,
            })?
            .len();
        if size == 0 {
            return Err(ExportError::Load {
                path: weights,
                reason: "weight file is empty".to_string(),
            });
        }

        let model = PaddleModel {
            dir: dir.to_path_buf(),
            config,
            weights,
            mode: Mode::Train,
        };
        Ok(model.eval())
    }
}

#[derive(Serialize)]
struct ScriptSpec {
    name: &'static str,
    shape: String,
    dtype: &'static str,
}

/// Traces the model with `paddle.jit.to_static` and saves it with `paddle.jit.save`.
#[derive(Debug, Clone)]
pub struct PaddleCompiler {
    python: PythonRuntime,
}

impl PaddleCompiler {
    pub fn new(python: PythonRuntime) -> Self {
        Self { python }
    }

    pub fn from_env() -> Self {
        Self::new(PythonRuntime::from_env())
    }

    /// Render the export script for `model`.
    pub fn render_script(
        &self,
        model: &PaddleModel,
        signature: &InputSignature,
        prefix: &Path,
    ) -> Result<String, ExportError> {
        let specs: Vec<ScriptSpec> = signature
            .specs()
            .iter()
            .map(|s| ScriptSpec {
                name: s.name,
                shape: s.python_shape(),
                dtype: s.dtype.as_str(),
            })
            .collect();

        let mut env = Environment::new();
        env.add_template("export", EXPORT_TEMPLATE)
            .map_err(|e| ExportError::Compilation(format!("invalid export template: {e}")))?;
        let template = env
            .get_template("export")
            .map_err(|e| ExportError::Compilation(e.to_string()))?;
        template
            .render(context! {
                model_dir => model.dir.to_string_lossy(),
                weights => model.weights.to_string_lossy(),
                output => prefix.to_string_lossy(),
                specs => specs,
            })
            .map_err(|e| ExportError::Compilation(format!("failed to render export script: {e}")))
    }
}

impl Default for PaddleCompiler {
    fn default() -> Self {
        Self::from_env()
    }
}

impl GraphCompiler<PaddleModel> for PaddleCompiler {
    fn compile(
        &self,
        model: &PaddleModel,
        signature: &InputSignature,
        prefix: &Path,
    ) -> Result<(), ExportError> {
        if model.mode() != Mode::Eval {
            return Err(ExportError::Compilation(
                "model must be in eval mode before tracing".to_string(),
            ));
        }

        let script = self.render_script(model, signature, prefix)?;
        tracing::debug!("running export script with {:?}", self.python.interpreter);

        let output = self
            .python
            .command(&script)
            .output()
            .map_err(|source| ExportError::Io {
                path: self.python.interpreter.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExportError::Compilation(format!(
                "{} exited with {}: {}",
                self.python.interpreter.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        if !artifact_exists(prefix) {
            return Err(ExportError::Compilation(format!(
                "export finished but {:?} or {:?} is missing",
                prefix.with_extension(PROGRAM_EXTENSION),
                prefix.with_extension(PARAMS_EXTENSION)
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::VOCAB_FILENAME;

    fn seed(dir: &Path, config: &str, weights: &[u8]) -> anyhow::Result<()> {
        std::fs::write(dir.join(CONFIG_FILENAME), config)?;
        std::fs::write(dir.join(MODEL_STATE_FILENAME), weights)?;
        std::fs::write(dir.join(VOCAB_FILENAME), "[PAD]\n")?;
        Ok(())
    }

    #[test]
    fn test_loader_returns_eval_model() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        seed(
            dir.path(),
            r#"{"architectures": ["UTC"], "vocab_size": 40000, "hidden_size": 1024, "use_task_id": true}"#,
            b"weights",
        )?;

        let model = PaddleLoader.load(dir.path())?;
        assert_eq!(model.mode(), Mode::Eval);
        assert_eq!(model.config.vocab_size, Some(40000));
        assert_eq!(model.config.extra.get("use_task_id"), Some(&serde_json::Value::Bool(true)));
        assert_eq!(model.weights, dir.path().join(MODEL_STATE_FILENAME));
        Ok(())
    }

    #[test]
    fn test_loader_rejects_malformed_config() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        seed(dir.path(), "<html>not json</html>", b"weights")?;
        assert!(matches!(
            PaddleLoader.load(dir.path()),
            Err(ExportError::Config { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_loader_rejects_foreign_architecture() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        seed(dir.path(), r#"{"architectures": ["BertModel"]}"#, b"weights")?;
        assert!(matches!(
            PaddleLoader.load(dir.path()),
            Err(ExportError::Load { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_loader_rejects_empty_weights() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        seed(dir.path(), "{}", b"")?;
        assert!(matches!(
            PaddleLoader.load(dir.path()),
            Err(ExportError::Load { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_script_lists_signature_in_order() -> anyhow::Result<()> {
        let model = PaddleModel {
            dir: PathBuf::from("utc-large"),
            config: serde_json::from_str("{}")?,
            weights: PathBuf::from("utc-large/model_state.pdparams"),
            mode: Mode::Eval,
        };
        let compiler = PaddleCompiler::new(PythonRuntime::new("python3"));
        let script = compiler.render_script(
            &model,
            &InputSignature::UTC,
            Path::new("utc-large/static/inference"),
        )?;

        let specs: Vec<&str> = script
            .lines()
            .filter(|l| l.contains("InputSpec("))
            .map(str::trim)
            .collect();
        assert_eq!(
            specs,
            [
                r#"paddle.static.InputSpec(shape=[None, None], dtype="int64", name="input_ids"),"#,
                r#"paddle.static.InputSpec(shape=[None, None], dtype="int64", name="token_type_ids"),"#,
                r#"paddle.static.InputSpec(shape=[None, None], dtype="int64", name="position_ids"),"#,
                r#"paddle.static.InputSpec(shape=[None, None, None, None], dtype="float32", name="attention_mask"),"#,
                r#"paddle.static.InputSpec(shape=[None, None], dtype="int64", name="omask_positions"),"#,
                r#"paddle.static.InputSpec(shape=[None], dtype="int64", name="cls_positions"),"#,
            ]
        );
        assert!(script.contains(r#"UTC.from_pretrained("utc-large")"#));
        assert!(script.contains(r#"paddle.jit.save(static_model, "utc-large/static/inference")"#));
        assert!(script.contains("model.eval()"));
        Ok(())
    }

    #[test]
    fn test_compiler_rejects_training_mode() {
        let model = PaddleModel {
            dir: PathBuf::from("utc-large"),
            config: UtcModelConfig {
                architectures: None,
                vocab_size: None,
                hidden_size: None,
                num_hidden_layers: None,
                max_position_embeddings: None,
                extra: Default::default(),
            },
            weights: PathBuf::from("utc-large/model_state.pdparams"),
            mode: Mode::Train,
        };
        let compiler = PaddleCompiler::new(PythonRuntime::new("python3"));
        let err = compiler
            .compile(&model, &InputSignature::UTC, Path::new("unused/inference"))
            .unwrap_err();
        assert!(matches!(err, ExportError::Compilation(_)));
    }
}
