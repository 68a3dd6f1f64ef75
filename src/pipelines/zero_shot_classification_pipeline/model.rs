use super::pipeline::Prediction;

pub trait ZeroShotClassificationModel {
    type Options: std::fmt::Debug + Clone;

    fn new(options: Self::Options) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Score every candidate label for every text; one prediction per text, in order.
    fn predict(&self, texts: &[&str], candidate_labels: &[&str]) -> anyhow::Result<Vec<Prediction>>;
}
