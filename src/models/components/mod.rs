pub mod prompt_tokenizer;
pub mod template;

pub use prompt_tokenizer::{ErnieTokenizer, MaskMatrix, PromptEncoding, PromptTokenizer};
pub use template::{build_inputs, default_prompt, Example, PromptInput, PromptKind, PromptPart};
