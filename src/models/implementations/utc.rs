//! UTC (Universal Text Classification) model.
//!
//! UTC frames classification as prompt matching: the candidate labels are
//! written into the prompt, each behind an `[O-MASK]` token, followed by the
//! text to classify. The exported graph returns one logit per `[O-MASK]`, and
//! the sigmoid of that logit is the label's score.
//!
//! The model owns the prompt tokenizer and an [`InferenceEngine`] that runs the
//! static graph produced by `utc download`.

use crate::core::UtcConfig;
use crate::export::signature::InputSignature;
use crate::models::components::prompt_tokenizer::{PromptEncoding, PromptTokenizer};
use crate::models::components::template::{build_inputs, default_prompt, Example, PromptPart};
use crate::models::engine::{InferenceEngine, PaddleEngine};
use crate::pipelines::zero_shot_classification_pipeline::model::ZeroShotClassificationModel;
use crate::pipelines::zero_shot_classification_pipeline::pipeline::{
    ClassificationResult, Prediction,
};
use anyhow::{Error as E, Result as AnyhowResult};
use candle_core::{Device, Tensor};

/// Attention value for padded rows and columns.
const MASK_PAD_VALUE: f32 = -1e4;

pub struct UtcModel<Eng: InferenceEngine = PaddleEngine> {
    tokenizer: PromptTokenizer,
    engine: Eng,
    prompt: Vec<PromptPart>,
    device: Device,
}

impl UtcModel<PaddleEngine> {
    pub fn new(config: &UtcConfig) -> AnyhowResult<Self> {
        let tokenizer =
            PromptTokenizer::new(&config.vocab_file, config.lower_case, config.max_seq_length)?;
        let engine = PaddleEngine::new(
            &config.model_path,
            &config.params_path,
            config.python.clone(),
        )?;
        Ok(Self::with_engine(tokenizer, engine))
    }
}

impl<Eng: InferenceEngine> UtcModel<Eng> {
    pub fn with_engine(tokenizer: PromptTokenizer, engine: Eng) -> Self {
        Self {
            tokenizer,
            engine,
            prompt: default_prompt(),
            device: Device::Cpu,
        }
    }

    /// Replace the default `{options}[SEP]{text_a}[SEP]{text_b}` template.
    pub fn with_prompt(mut self, prompt: Vec<PromptPart>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn engine(&self) -> &Eng {
        &self.engine
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn encode(&self, schema: &[&str], texts: &[&str]) -> AnyhowResult<Vec<PromptEncoding>> {
        texts
            .iter()
            .map(|text| {
                let inputs = build_inputs(&Example::new(text, schema), &self.prompt);
                self.tokenizer.encode(&inputs)
            })
            .collect()
    }

    /// Pad a batch of encodings into the six graph inputs, in signature order.
    pub fn batch_inputs(&self, encodings: &[PromptEncoding]) -> AnyhowResult<Vec<Tensor>> {
        let batch = encodings.len();

        let ids = |f: fn(&PromptEncoding) -> &Vec<i64>| -> AnyhowResult<Tensor> {
            let rows: Vec<&Vec<i64>> = encodings.iter().map(f).collect();
            let (data, width) = pad_right(&rows, 0);
            Ok(Tensor::from_vec(data, (batch, width), &self.device)?)
        };

        let input_ids = ids(|e| &e.input_ids)?;
        let token_type_ids = ids(|e| &e.token_type_ids)?;
        let position_ids = ids(|e| &e.position_ids)?;
        let omask_positions = ids(|e| &e.omask_positions)?;

        let (rows, cols) = encodings
            .iter()
            .map(|e| e.attention_mask.dims())
            .fold((0, 0), |(r, c), (er, ec)| (r.max(er), c.max(ec)));
        let mask_data: Vec<f32> = encodings
            .iter()
            .flat_map(|e| e.attention_mask.pad(rows, cols, MASK_PAD_VALUE).into_vec())
            .collect();
        let attention_mask = Tensor::from_vec(mask_data, (batch, 1, rows, cols), &self.device)?;

        let cls: Vec<i64> = encodings.iter().map(|e| e.cls_positions).collect();
        let cls_positions = Tensor::from_vec(cls, batch, &self.device)?;

        Ok(vec![
            input_ids,
            token_type_ids,
            position_ids,
            attention_mask,
            omask_positions,
            cls_positions,
        ])
    }

    /// Score every label of `schema` for each of `texts`.
    pub fn run(&self, schema: &[&str], texts: &[&str]) -> AnyhowResult<Vec<Prediction>> {
        if schema.is_empty() {
            anyhow::bail!("At least one candidate label is required");
        }
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self.encode(schema, texts)?;
        let inputs = self.batch_inputs(&encodings)?;
        InputSignature::UTC.validate(&inputs)?;

        let logits = self.engine.infer(&inputs)?;
        let (rows, cols) = logits.dims2()?;
        if rows != texts.len() {
            anyhow::bail!("Engine returned {rows} rows for {} texts", texts.len());
        }
        if cols < schema.len() {
            anyhow::bail!(
                "Engine returned {cols} scores per text for {} candidate labels",
                schema.len()
            );
        }

        let probs = candle_nn::ops::sigmoid(&logits.to_dtype(candle_core::DType::F32)?)?
            .to_vec2::<f32>()
            .map_err(|e| E::msg(format!("Failed to read scores: {e}")))?;

        Ok(texts
            .iter()
            .zip(probs)
            .map(|(text, row)| Prediction {
                text: text.to_string(),
                scores: schema
                    .iter()
                    .zip(row)
                    .map(|(label, score)| ClassificationResult {
                        label: label.to_string(),
                        score,
                    })
                    .collect(),
            })
            .collect())
    }
}

impl ZeroShotClassificationModel for UtcModel<PaddleEngine> {
    type Options = UtcConfig;

    fn new(options: Self::Options) -> anyhow::Result<Self> {
        UtcModel::<PaddleEngine>::new(&options)
    }

    fn predict(&self, texts: &[&str], candidate_labels: &[&str]) -> AnyhowResult<Vec<Prediction>> {
        self.run(candidate_labels, texts)
    }
}

/// Right-pad rows to the longest one; returns the flattened batch and its width.
fn pad_right(rows: &[&Vec<i64>], pad: i64) -> (Vec<i64>, usize) {
    let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    let mut data = Vec::with_capacity(rows.len() * width);
    for row in rows {
        data.extend_from_slice(row);
        data.extend(std::iter::repeat(pad).take(width - row.len()));
    }
    (data, width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::components::prompt_tokenizer::tests::write_vocab;
    use std::cell::RefCell;

    /// Returns fixed logits and remembers the shapes it was called with.
    struct FixedEngine {
        logits: Vec<Vec<f32>>,
        seen: RefCell<Vec<Vec<usize>>>,
    }

    impl InferenceEngine for FixedEngine {
        fn infer(&self, inputs: &[Tensor]) -> AnyhowResult<Tensor> {
            *self.seen.borrow_mut() = inputs.iter().map(|t| t.dims().to_vec()).collect();
            let rows = self.logits.len();
            let cols = self.logits[0].len();
            let flat: Vec<f32> = self.logits.iter().flatten().copied().collect();
            Ok(Tensor::from_vec(flat, (rows, cols), &Device::Cpu)?)
        }
    }

    fn model(logits: Vec<Vec<f32>>) -> anyhow::Result<(tempfile::TempDir, UtcModel<FixedEngine>)> {
        let dir = tempfile::tempdir()?;
        let vocab = write_vocab(dir.path())?;
        let tokenizer = PromptTokenizer::new(vocab, true, 512)?;
        let engine = FixedEngine {
            logits,
            seen: RefCell::new(vec![]),
        };
        Ok((dir, UtcModel::with_engine(tokenizer, engine)))
    }

    #[test]
    fn test_batch_is_padded_to_longest_text() -> anyhow::Result<()> {
        let (_dir, model) = model(vec![vec![0.0, 0.0]; 2])?;
        let encodings = model.encode(&["good", "bad"], &["the movie is great", "the movie"])?;
        let inputs = model.batch_inputs(&encodings)?;
        InputSignature::UTC.validate(&inputs)?;

        assert_eq!(inputs[0].dims(), &[2, 12]);
        assert_eq!(inputs[3].dims(), &[2, 1, 12, 12]);
        assert_eq!(inputs[4].dims(), &[2, 2]);
        assert_eq!(inputs[5].to_vec1::<i64>()?, vec![5, 5]);

        let ids = inputs[0].to_vec2::<i64>()?;
        assert_eq!(ids[1], vec![2, 5, 6, 5, 7, 3, 10, 8, 3, 3, 0, 0]);

        let mask = inputs[3].squeeze(1)?.to_vec3::<f32>()?;
        assert_eq!(mask[1][11][11], MASK_PAD_VALUE);
        assert_eq!(mask[1][0][1], 0.0);
        Ok(())
    }

    #[test]
    fn test_run_applies_sigmoid_per_label() -> anyhow::Result<()> {
        let (_dir, model) = model(vec![vec![0.0, 2.0, 9.0]])?;
        let predictions = model.run(&["good", "bad"], &["the movie is great"])?;

        assert_eq!(predictions.len(), 1);
        let p = &predictions[0];
        assert_eq!(p.text, "the movie is great");
        assert_eq!(p.scores.len(), 2);
        assert!((p.score("good").unwrap() - 0.5).abs() < 1e-6);
        assert!((p.score("bad").unwrap() - 0.880_797).abs() < 1e-5);
        assert_eq!(p.best().map(|r| r.label.as_str()), Some("bad"));

        let seen = model.engine().seen.borrow();
        assert_eq!(seen.len(), 6);
        Ok(())
    }

    #[test]
    fn test_run_rejects_too_few_scores() -> anyhow::Result<()> {
        let (_dir, model) = model(vec![vec![0.0]])?;
        assert!(model.run(&["good", "bad"], &["the movie"]).is_err());
        Ok(())
    }

    #[test]
    fn test_run_edge_cases() -> anyhow::Result<()> {
        let (_dir, model) = model(vec![vec![0.0]])?;
        assert!(model.run(&["good"], &[])?.is_empty());
        assert!(model.engine().seen.borrow().is_empty());
        assert!(model.run(&[], &["the movie"]).is_err());
        Ok(())
    }
}
