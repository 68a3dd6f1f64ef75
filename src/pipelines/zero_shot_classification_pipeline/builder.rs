use super::model::ZeroShotClassificationModel;
use super::pipeline::ZeroShotClassificationPipeline;
use crate::core::{PythonRuntime, UtcConfig};
use crate::models::implementations::utc::UtcModel;
use std::path::Path;

pub struct ZeroShotClassificationPipelineBuilder<M: ZeroShotClassificationModel> {
    options: M::Options,
}

impl<M: ZeroShotClassificationModel> ZeroShotClassificationPipelineBuilder<M> {
    pub fn new(options: M::Options) -> Self {
        Self { options }
    }

    pub fn build(self) -> anyhow::Result<ZeroShotClassificationPipeline<M>> {
        tracing::debug!("building zero-shot pipeline with {:?}", self.options);
        let model = M::new(self.options)?;
        Ok(ZeroShotClassificationPipeline { model })
    }
}

impl ZeroShotClassificationPipelineBuilder<UtcModel> {
    pub fn utc(config: UtcConfig) -> Self {
        Self::new(config)
    }

    /// Use the artifact and vocabulary written by `utc download` into `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(UtcConfig::from_dir(dir))
    }

    pub fn lower_case(mut self, lower_case: bool) -> Self {
        self.options.lower_case = lower_case;
        self
    }

    pub fn max_seq_length(mut self, max_seq_length: usize) -> Self {
        self.options.max_seq_length = max_seq_length;
        self
    }

    pub fn python(mut self, python: PythonRuntime) -> Self {
        self.options.python = python;
        self
    }
}
