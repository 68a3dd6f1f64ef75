//! Inference engines able to run the exported UTC graph.

use crate::core::config::PythonRuntime;
use crate::export::signature::{ElementType, InputSignature};
use anyhow::{Error as E, Result};
use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// Runs a compiled graph on a batch of inputs.
///
/// Inputs arrive in signature order; the engine returns the first graph output.
pub trait InferenceEngine {
    fn infer(&self, inputs: &[Tensor]) -> Result<Tensor>;
}

impl<T: InferenceEngine + ?Sized> InferenceEngine for &T {
    fn infer(&self, inputs: &[Tensor]) -> Result<Tensor> {
        (**self).infer(inputs)
    }
}

const PREDICT_SCRIPT: &str = r#"import json
import sys

import numpy as np
import paddle.inference as paddle_infer

config = paddle_infer.Config(sys.argv[1], sys.argv[2])
config.disable_glog_info()
predictor = paddle_infer.create_predictor(config)

request = json.load(sys.stdin)
for tensor in request["inputs"]:
    data = np.asarray(tensor["data"], dtype=tensor["dtype"]).reshape(tensor["shape"])
    handle = predictor.get_input_handle(tensor["name"])
    handle.reshape(list(data.shape))
    handle.copy_from_cpu(data)

predictor.run()
output = predictor.get_output_handle(predictor.get_output_names()[0]).copy_to_cpu()
json.dump({"shape": list(output.shape), "data": output.astype("float32").ravel().tolist()}, sys.stdout)
"#;

#[derive(Serialize)]
#[serde(untagged)]
enum TensorData {
    Int64(Vec<i64>),
    Float32(Vec<f32>),
}

#[derive(Serialize)]
struct TensorPayload {
    name: &'static str,
    dtype: &'static str,
    shape: Vec<usize>,
    data: TensorData,
}

#[derive(Serialize)]
struct PredictRequest {
    inputs: Vec<TensorPayload>,
}

#[derive(Deserialize)]
struct PredictResponse {
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// Paddle Inference predictor hosted by a Python interpreter.
///
/// Every call starts a fresh predictor; tensors travel as JSON over the
/// child's stdin and stdout.
#[derive(Debug, Clone)]
pub struct PaddleEngine {
    model_path: PathBuf,
    params_path: PathBuf,
    python: PythonRuntime,
    signature: InputSignature,
}

impl PaddleEngine {
    pub fn new(
        model_path: impl AsRef<Path>,
        params_path: impl AsRef<Path>,
        python: PythonRuntime,
    ) -> Result<Self> {
        for path in [model_path.as_ref(), params_path.as_ref()] {
            if !path.is_file() {
                anyhow::bail!("Inference artifact {path:?} not found; run `utc download` first");
            }
        }
        Ok(Self {
            model_path: model_path.as_ref().to_path_buf(),
            params_path: params_path.as_ref().to_path_buf(),
            python,
            signature: InputSignature::UTC,
        })
    }

    fn request(&self, inputs: &[Tensor]) -> Result<PredictRequest> {
        let inputs = self
            .signature
            .specs()
            .iter()
            .zip(inputs)
            .map(|(spec, tensor)| {
                let flat = tensor.flatten_all()?;
                let data = match spec.dtype {
                    ElementType::Int64 => TensorData::Int64(flat.to_vec1::<i64>()?),
                    ElementType::Float32 => TensorData::Float32(flat.to_vec1::<f32>()?),
                };
                Ok::<_, E>(TensorPayload {
                    name: spec.name,
                    dtype: spec.dtype.as_str(),
                    shape: tensor.dims().to_vec(),
                    data,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(PredictRequest { inputs })
    }
}

impl InferenceEngine for PaddleEngine {
    fn infer(&self, inputs: &[Tensor]) -> Result<Tensor> {
        self.signature.validate(inputs)?;
        let request = serde_json::to_vec(&self.request(inputs)?)?;

        let mut child = self
            .python
            .command(PREDICT_SCRIPT)
            .arg(&self.model_path)
            .arg(&self.params_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| E::msg(format!("Failed to start {:?}: {e}", self.python.interpreter)))?;

        // The request can exceed the pipe buffer, so it is written while stdout
        // and stderr are drained. The child may exit without reading it.
        let stdin = child.stdin.take();
        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            match stdin {
                Some(mut stdin) => stdin.write_all(&request),
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "predictor stdin unavailable",
                )),
            }
        });

        let output = child.wait_with_output()?;
        let written = writer
            .join()
            .map_err(|_| E::msg("Predictor stdin writer panicked"))?;

        if !output.status.success() {
            anyhow::bail!(
                "Paddle predictor exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        written.map_err(|e| E::msg(format!("Failed to send inputs to the predictor: {e}")))?;

        let response: PredictResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| E::msg(format!("Failed to parse predictor output: {e}")))?;
        Ok(Tensor::from_vec(response.data, response.shape, &Device::Cpu)?)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// An executable stand-in for the interpreter, ignoring `-c <script>`.
    fn fake_python(dir: &Path, body: &str) -> anyhow::Result<PythonRuntime> {
        let path = dir.join("python3");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(PythonRuntime::new(path))
    }

    fn engine(dir: &Path, python: PythonRuntime) -> anyhow::Result<PaddleEngine> {
        let model = dir.join("inference.pdmodel");
        let params = dir.join("inference.pdiparams");
        std::fs::write(&model, b"program")?;
        std::fs::write(&params, b"params")?;
        PaddleEngine::new(model, params, python)
    }

    /// One sequence of `len` tokens with two options.
    fn batch(len: usize) -> anyhow::Result<Vec<Tensor>> {
        let ids: Vec<i64> = (0..len as i64).collect();
        Ok(vec![
            Tensor::from_vec(ids.clone(), (1, len), &Device::Cpu)?,
            Tensor::from_vec(vec![0i64; len], (1, len), &Device::Cpu)?,
            Tensor::from_vec(ids, (1, len), &Device::Cpu)?,
            Tensor::from_vec(vec![-1e4f32; len * len], (1, 1, len, len), &Device::Cpu)?,
            Tensor::from_vec(vec![1i64, 2], (1, 2), &Device::Cpu)?,
            Tensor::from_vec(vec![3i64], 1, &Device::Cpu)?,
        ])
    }

    #[test]
    fn test_infer_round_trips_through_interpreter() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let python = fake_python(
            dir.path(),
            r#"cat > "$(dirname "$0")/request.json"
printf '%s' '{"shape": [1, 2], "data": [0.5, -1.5]}'"#,
        )?;
        let engine = engine(dir.path(), python)?;

        let logits = engine.infer(&batch(4)?)?;
        assert_eq!(logits.dims(), &[1, 2]);
        assert_eq!(logits.to_vec2::<f32>()?, vec![vec![0.5, -1.5]]);

        let request: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("request.json"))?)?;
        let inputs = request["inputs"].as_array().map(Vec::as_slice).unwrap_or_default();
        let names: Vec<_> = inputs.iter().filter_map(|t| t["name"].as_str()).collect();
        assert_eq!(names, InputSignature::UTC.names().collect::<Vec<_>>());

        let mask = &inputs[3];
        assert_eq!(mask["dtype"], "float32");
        assert_eq!(mask["shape"], serde_json::json!([1, 1, 4, 4]));
        assert_eq!(mask["data"].as_array().map(Vec::len), Some(16));
        assert_eq!(mask["data"][0].as_f64(), Some(-1e4));

        let omask = &inputs[4];
        assert_eq!(omask["dtype"], "int64");
        assert_eq!(omask["data"], serde_json::json!([1, 2]));
        assert_eq!(inputs[5]["shape"], serde_json::json!([1]));
        Ok(())
    }

    #[test]
    fn test_interpreter_failure_keeps_its_stderr() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let python = fake_python(
            dir.path(),
            "echo \"ModuleNotFoundError: No module named 'paddle'\" >&2\nexit 1",
        )?;
        let engine = engine(dir.path(), python)?;

        // The mask alone is larger than a pipe buffer.
        let err = engine.infer(&batch(200)?).unwrap_err().to_string();
        assert!(err.contains("No module named 'paddle'"), "{err}");
        Ok(())
    }

    #[test]
    fn test_unparsable_output_is_an_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let python = fake_python(dir.path(), "cat > /dev/null\necho 'Traceback'")?;
        let engine = engine(dir.path(), python)?;

        let err = engine.infer(&batch(3)?).unwrap_err().to_string();
        assert!(err.contains("Failed to parse predictor output"), "{err}");
        Ok(())
    }

    #[test]
    fn test_missing_artifact_is_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let result = PaddleEngine::new(
            dir.path().join("inference.pdmodel"),
            dir.path().join("inference.pdiparams"),
            PythonRuntime::new("python3"),
        );
        assert!(result.is_err());
        Ok(())
    }
}
