// Zero-shot pipeline driven by UTC encodings with an in-process engine.

use candle_core::{Device, Tensor};
use std::io::Write;
use std::path::PathBuf;
use utc::models::components::PromptTokenizer;
use utc::models::InferenceEngine;
use utc::pipelines::zero_shot_classification_pipeline::*;

const VOCAB: &[&str] = &[
    "[PAD]", "[UNK]", "[CLS]", "[SEP]", "[MASK]", "[O-MASK]", "sports", "politics", "weather",
    "the", "match", "ended", "in", "a", "draw",
];

/// Logit `k` for the k-th option, so later labels always score higher.
struct RankingEngine;

impl InferenceEngine for RankingEngine {
    fn infer(&self, inputs: &[Tensor]) -> anyhow::Result<Tensor> {
        let (batch, options) = inputs[4].dims2()?;
        let row: Vec<f32> = (0..options).map(|k| k as f32 - 1.0).collect();
        let data: Vec<f32> = row.iter().copied().cycle().take(batch * options).collect();
        Ok(Tensor::from_vec(data, (batch, options), &Device::Cpu)?)
    }
}

struct RankingModel(UtcModel<RankingEngine>);

impl ZeroShotClassificationModel for RankingModel {
    type Options = PathBuf;

    fn new(vocab_file: PathBuf) -> anyhow::Result<Self> {
        let tokenizer = PromptTokenizer::new(vocab_file, true, 512)?;
        Ok(Self(UtcModel::with_engine(tokenizer, RankingEngine)))
    }

    fn predict(&self, texts: &[&str], candidate_labels: &[&str]) -> Result<Vec<Prediction>> {
        self.0.run(candidate_labels, texts)
    }
}

fn vocab_file(dir: &std::path::Path) -> anyhow::Result<PathBuf> {
    let path = dir.join("vocab.txt");
    let mut file = std::fs::File::create(&path)?;
    for token in VOCAB {
        writeln!(file, "{token}")?;
    }
    Ok(path)
}

#[test]
fn classify_sorts_labels_by_score() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let pipeline =
        ZeroShotClassificationPipelineBuilder::<RankingModel>::new(vocab_file(tmp.path())?)
            .build()?;

    let labels = ["sports", "politics", "weather"];
    let results = pipeline.classify("The match ended in a draw", &labels)?;

    let ordered: Vec<_> = results.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(ordered, ["weather", "politics", "sports"]);
    assert!((results[1].score - 0.5).abs() < 1e-6);
    assert!(results.iter().all(|r| r.score > 0.0 && r.score < 1.0));
    Ok(())
}

#[test]
fn classify_batch_keeps_input_order() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let pipeline =
        ZeroShotClassificationPipelineBuilder::<RankingModel>::new(vocab_file(tmp.path())?)
            .build()?;

    let texts = ["the match", "the weather ended in a draw"];
    let predictions = pipeline.classify_batch(&texts, &["sports", "politics"])?;

    assert_eq!(predictions.len(), 2);
    for (prediction, text) in predictions.iter().zip(texts) {
        assert_eq!(prediction.text, text);
        let labels: Vec<_> = prediction.scores.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, ["sports", "politics"]);
        assert_eq!(prediction.best().map(|r| r.label.as_str()), Some("politics"));
        assert_eq!(prediction.above(0.5).len(), 1);
    }
    Ok(())
}

#[test]
fn from_dir_requires_an_exported_model() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    vocab_file(tmp.path())?;

    let result = ZeroShotClassificationPipelineBuilder::from_dir(tmp.path())
        .max_seq_length(128)
        .build();

    assert!(result.is_err());
    Ok(())
}

#[test]
fn config_points_at_download_layout() {
    let config = UtcConfig::from_dir("./utc-large");
    assert!(config.model_path.ends_with("static/inference.pdmodel"));
    assert!(config.params_path.ends_with("static/inference.pdiparams"));
    assert!(config.vocab_file.ends_with("vocab.txt"));
    assert!(config.lower_case);
    assert_eq!(config.max_seq_length, 512);
}
