//! Zero-shot text classification with UTC.
//!
//! UTC scores each candidate label independently: the labels are written into
//! the prompt behind `[O-MASK]` markers and the model emits one logit per
//! marker. Scores are sigmoids, so they do not sum to one and several labels can
//! pass a threshold at once.
//!
//! ## Example
//!
//! ```rust,no_run
//! use utc::pipelines::zero_shot_classification_pipeline::*;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let pipeline = ZeroShotClassificationPipelineBuilder::from_dir("./utc-large").build()?;
//!
//! let labels = ["economics", "politics", "environment"];
//! for result in pipeline.classify("The Federal Reserve raised interest rates.", &labels)? {
//!     println!("  - {}: {:.4}", result.label, result.score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod model;
pub mod pipeline;

pub use builder::ZeroShotClassificationPipelineBuilder;
pub use model::ZeroShotClassificationModel;
pub use pipeline::{ClassificationResult, Prediction, ZeroShotClassificationPipeline};

pub use crate::core::UtcConfig;
pub use crate::models::implementations::utc::UtcModel;

pub use anyhow::Result;
