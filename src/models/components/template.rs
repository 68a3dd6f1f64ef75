//! UTC prompt template.
//!
//! A prompt is an ordered list of parts. Each part renders a piece of text from
//! an [`Example`] and carries the position, token-type and truncation settings
//! the prompt tokenizer applies to it.

use super::prompt_tokenizer::{OMASK_TOKEN, SEP_TOKEN};

/// Default number of options the template reserves room for.
pub const DEFAULT_MAX_OPTIONS: usize = 10;

/// Input of a single classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Example {
    pub text_a: String,
    pub text_b: String,
    pub question: String,
    /// Candidate labels.
    pub choices: Vec<String>,
}

impl Example {
    pub fn new(text: &str, choices: &[&str]) -> Self {
        Self {
            text_a: text.to_string(),
            choices: choices.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    TextA,
    TextB,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptKind {
    /// The candidate labels, each optionally prefixed with `[O-MASK]`.
    Options {
        add_omask: bool,
        add_prompt: bool,
        length: usize,
    },
    Sep,
    Text(TextField),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPart {
    pub kind: PromptKind,
    /// Position id the part starts at; `None` continues from the previous part.
    pub position: Option<usize>,
    pub token_type: u32,
    pub truncate: bool,
}

impl PromptPart {
    pub fn render(&self, example: &Example) -> String {
        match &self.kind {
            PromptKind::Options { add_omask, .. } => example
                .choices
                .iter()
                .map(|c| {
                    if *add_omask {
                        format!("{OMASK_TOKEN}{c}")
                    } else {
                        c.clone()
                    }
                })
                .collect(),
            PromptKind::Sep => SEP_TOKEN.to_string(),
            PromptKind::Text(TextField::TextA) => example.text_a.clone(),
            PromptKind::Text(TextField::TextB) => example.text_b.clone(),
        }
    }
}

/// `{options}[SEP]{text_a}[SEP]{text_b}`
pub fn default_prompt() -> Vec<PromptPart> {
    vec![
        PromptPart {
            kind: PromptKind::Options {
                add_omask: true,
                add_prompt: false,
                length: DEFAULT_MAX_OPTIONS,
            },
            position: Some(0),
            token_type: 1,
            truncate: false,
        },
        PromptPart {
            kind: PromptKind::Sep,
            position: Some(0),
            token_type: 0,
            truncate: false,
        },
        PromptPart {
            kind: PromptKind::Text(TextField::TextA),
            position: None,
            token_type: 0,
            truncate: true,
        },
        PromptPart {
            kind: PromptKind::Sep,
            position: None,
            token_type: 1,
            truncate: false,
        },
        PromptPart {
            kind: PromptKind::Text(TextField::TextB),
            position: None,
            token_type: 1,
            truncate: true,
        },
    ]
}

/// A rendered part, ready for the prompt tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptInput {
    pub text: String,
    pub position: Option<usize>,
    pub token_type: u32,
    pub truncate: bool,
}

pub fn build_inputs(example: &Example, parts: &[PromptPart]) -> Vec<PromptInput> {
    parts
        .iter()
        .map(|part| PromptInput {
            text: part.render(example),
            position: part.position,
            token_type: part.token_type,
            truncate: part.truncate,
        })
        .collect()
}
