use super::model::ZeroShotClassificationModel;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub label: String,
    pub score: f32,
}

/// Scores of every candidate label for one text, in candidate order.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub text: String,
    pub scores: Vec<ClassificationResult>,
}

impl Prediction {
    /// Highest scoring label; the first one wins a tie.
    pub fn best(&self) -> Option<&ClassificationResult> {
        self.scores.iter().fold(None, |best, r| match best {
            Some(b) if b.score >= r.score => Some(b),
            _ => Some(r),
        })
    }

    /// Labels scoring at least `threshold`, for multi-label use.
    pub fn above(&self, threshold: f32) -> Vec<&ClassificationResult> {
        self.scores.iter().filter(|r| r.score >= threshold).collect()
    }

    pub fn score(&self, label: &str) -> Option<f32> {
        self.scores.iter().find(|r| r.label == label).map(|r| r.score)
    }
}

pub struct ZeroShotClassificationPipeline<M: ZeroShotClassificationModel> {
    pub(crate) model: M,
}

impl<M: ZeroShotClassificationModel> ZeroShotClassificationPipeline<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Score every candidate label independently (sigmoid), highest first.
    pub fn classify(
        &self,
        text: &str,
        candidate_labels: &[&str],
    ) -> anyhow::Result<Vec<ClassificationResult>> {
        let mut predictions = self.model.predict(&[text], candidate_labels)?;
        let prediction = predictions
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Model returned no prediction for the input text"))?;

        let mut results = prediction.scores;
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(results)
    }

    /// Classify several texts against the same labels in one batch.
    pub fn classify_batch(
        &self,
        texts: &[&str],
        candidate_labels: &[&str],
    ) -> anyhow::Result<Vec<Prediction>> {
        self.model.predict(texts, candidate_labels)
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(scores: &[(&str, f32)]) -> Prediction {
        Prediction {
            text: "t".to_string(),
            scores: scores
                .iter()
                .map(|(l, s)| ClassificationResult {
                    label: l.to_string(),
                    score: *s,
                })
                .collect(),
        }
    }

    #[test]
    fn test_best_prefers_first_on_tie() {
        let p = prediction(&[("a", 0.2), ("b", 0.9), ("c", 0.9)]);
        assert_eq!(p.best().map(|r| r.label.as_str()), Some("b"));
        assert!(prediction(&[]).best().is_none());
    }

    #[test]
    fn test_above_threshold() {
        let p = prediction(&[("a", 0.2), ("b", 0.5), ("c", 0.7)]);
        let labels: Vec<_> = p.above(0.5).iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, ["b", "c"]);
        assert_eq!(p.score("a"), Some(0.2));
        assert_eq!(p.score("z"), None);
    }
}
