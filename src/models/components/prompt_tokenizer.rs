//! Prompt tokenizer for UTC.
//!
//! Turns the rendered prompt parts into the id sequences, position ids and the
//! option-aware attention mask the UTC graph consumes.

use super::template::PromptInput;
use anyhow::{Error as E, Result};
use std::path::Path;
use tokenizers::models::wordpiece::WordPiece;
use tokenizers::normalizers::bert::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::{AddedToken, Tokenizer};

pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";
pub const OMASK_TOKEN: &str = "[O-MASK]";
pub const CLS_TOKEN: &str = "[CLS]";
pub const SEP_TOKEN: &str = "[SEP]";

/// `[CLS]` in front, `[SEP]` at the end.
const NUM_SPECIAL_TOKENS: usize = 2;

/// Value added to attention scores of masked pairs.
const MASK_PENALTY: f32 = 1e4;

/// WordPiece tokenizer with ERNIE normalization and the UTC special tokens.
#[derive(Clone)]
pub struct ErnieTokenizer {
    tokenizer: Tokenizer,
    pad_id: u32,
    omask_id: u32,
    cls_id: u32,
    sep_id: u32,
}

impl ErnieTokenizer {
    pub fn from_vocab(vocab_file: impl AsRef<Path>, lower_case: bool) -> Result<Self> {
        let vocab_file = vocab_file.as_ref();
        let vocab = vocab_file
            .to_str()
            .ok_or_else(|| E::msg(format!("vocab path {vocab_file:?} is not valid UTF-8")))?;

        let model = WordPiece::from_file(vocab)
            .unk_token(UNK_TOKEN.to_string())
            .build()
            .map_err(|e| E::msg(format!("Failed to load vocab {vocab_file:?}: {e}")))?;

        let mut tokenizer = Tokenizer::new(model);
        tokenizer.with_normalizer(Some(BertNormalizer::new(true, true, None, lower_case)));
        tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));
        tokenizer.add_special_tokens(&[
            AddedToken::from(OMASK_TOKEN, true),
            AddedToken::from(CLS_TOKEN, true),
            AddedToken::from(SEP_TOKEN, true),
            AddedToken::from(PAD_TOKEN, true),
        ]);

        Self::new(tokenizer)
    }

    /// Wrap an already configured tokenizer.
    pub fn new(tokenizer: Tokenizer) -> Result<Self> {
        let id = |token: &str| {
            tokenizer
                .token_to_id(token)
                .ok_or_else(|| E::msg(format!("Token {token} missing from vocabulary")))
        };
        Ok(Self {
            pad_id: id(PAD_TOKEN)?,
            omask_id: id(OMASK_TOKEN)?,
            cls_id: id(CLS_TOKEN)?,
            sep_id: id(SEP_TOKEN)?,
            tokenizer,
        })
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    pub fn omask_id(&self) -> u32 {
        self.omask_id
    }

    pub fn cls_id(&self) -> u32 {
        self.cls_id
    }

    pub fn sep_id(&self) -> u32 {
        self.sep_id
    }

    /// Token ids of `text`, without special tokens around it.
    pub fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| E::msg(format!("Tokenization error: {e}")))?;
        Ok(encoding.get_ids().to_vec())
    }
}

/// Square attention mask of a single encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl MaskMatrix {
    pub fn filled(rows: usize, cols: usize, value: f32) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    /// Set every element of `rows × cols` to `value`.
    pub fn set_block(
        &mut self,
        rows: std::ops::Range<usize>,
        cols: std::ops::Range<usize>,
        value: f32,
    ) {
        for r in rows {
            let start = r * self.cols;
            self.data[start + cols.start..start + cols.end].fill(value);
        }
    }

    pub fn map(mut self, f: impl Fn(f32) -> f32) -> Self {
        self.data.iter_mut().for_each(|v| *v = f(*v));
        self
    }

    /// Grow to `rows × cols`, filling new cells with `value`.
    pub fn pad(&self, rows: usize, cols: usize, value: f32) -> Self {
        let mut padded = Self::filled(rows.max(self.rows), cols.max(self.cols), value);
        for r in 0..self.rows {
            let src = &self.data[r * self.cols..(r + 1) * self.cols];
            let start = r * padded.cols;
            padded.data[start..start + self.cols].copy_from_slice(src);
        }
        padded
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// Model inputs of one prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptEncoding {
    pub input_ids: Vec<i64>,
    pub soft_token_ids: Vec<i64>,
    pub position_ids: Vec<i64>,
    pub token_type_ids: Vec<i64>,
    pub attention_mask: MaskMatrix,
    pub omask_positions: Vec<i64>,
    /// Index of the first `[SEP]`, where the model reads the sentence-level logit.
    pub cls_positions: i64,
}

#[derive(Clone)]
pub struct PromptTokenizer {
    tokenizer: ErnieTokenizer,
    max_length: usize,
}

impl PromptTokenizer {
    pub fn new(vocab_file: impl AsRef<Path>, lower_case: bool, max_seq_length: usize) -> Result<Self> {
        let tokenizer = ErnieTokenizer::from_vocab(vocab_file, lower_case)?;
        Ok(Self::with_tokenizer(tokenizer, max_seq_length))
    }

    /// A `max_seq_length` of 0 selects the default of 512.
    pub fn with_tokenizer(tokenizer: ErnieTokenizer, max_seq_length: usize) -> Self {
        let max_length = if max_seq_length == 0 {
            crate::core::config::DEFAULT_MAX_SEQ_LENGTH
        } else {
            max_seq_length
        };
        Self {
            tokenizer,
            max_length,
        }
    }

    pub fn tokenizer(&self) -> &ErnieTokenizer {
        &self.tokenizer
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn encode(&self, inputs: &[PromptInput]) -> Result<PromptEncoding> {
        let mut part_ids = inputs
            .iter()
            .map(|input| self.tokenizer.tokenize(&input.text))
            .collect::<Result<Vec<_>>>()?;

        let limits = self.max_lengths(inputs, &part_ids)?;
        for (ids, limit) in part_ids.iter_mut().zip(limits) {
            if let Some(limit) = limit {
                ids.truncate(limit);
            }
        }

        // Position 0 belongs to [CLS].
        let mut last_position = 1usize;
        let mut body_ids = Vec::new();
        let mut positions = Vec::new();
        let mut token_types = Vec::new();
        for (input, ids) in inputs.iter().zip(&part_ids) {
            positions.extend(self.part_positions(input, ids, &mut last_position));
            token_types.extend(std::iter::repeat(input.token_type as i64).take(ids.len()));
            body_ids.extend(ids.iter().map(|&id| id as i64));
        }

        let input_ids = wrap(
            &body_ids,
            self.tokenizer.cls_id() as i64,
            self.tokenizer.sep_id() as i64,
        );
        let soft_token_ids = vec![0; input_ids.len()];
        let position_ids = wrap(&positions, 0, 0);
        let token_type_ids = wrap(&token_types, 0, 0);

        let attention_mask = self.options_attention_mask(&input_ids);
        let omask_positions = indices_of(&input_ids, self.tokenizer.omask_id() as i64)
            .map(|i| i as i64)
            .collect();
        let cls_positions = indices_of(&input_ids, self.tokenizer.sep_id() as i64)
            .next()
            .map(|i| i as i64)
            .ok_or_else(|| E::msg("Encoded prompt has no [SEP] token"))?;

        Ok(PromptEncoding {
            input_ids,
            soft_token_ids,
            position_ids,
            token_type_ids,
            attention_mask,
            omask_positions,
            cls_positions,
        })
    }

    /// Per-part token limits so that the whole prompt fits in `max_length`.
    ///
    /// Non-truncatable parts keep their length; the remaining budget is shared
    /// among truncatable parts, shortest first, none getting more than an equal
    /// share of what is left.
    fn max_lengths(&self, inputs: &[PromptInput], part_ids: &[Vec<u32>]) -> Result<Vec<Option<usize>>> {
        let budget = self.max_length.saturating_sub(NUM_SPECIAL_TOKENS);
        let total: usize = part_ids.iter().map(Vec::len).sum();
        let mut limits = vec![None; part_ids.len()];
        if total <= budget {
            return Ok(limits);
        }

        let fixed: usize = inputs
            .iter()
            .zip(part_ids)
            .filter(|(input, _)| !input.truncate)
            .map(|(_, ids)| ids.len())
            .sum();
        if fixed > budget {
            anyhow::bail!(
                "Prompt needs {fixed} tokens for parts that cannot be truncated, but only {budget} fit in max_seq_length {}",
                self.max_length
            );
        }

        let mut truncatable: Vec<usize> = (0..inputs.len()).filter(|&i| inputs[i].truncate).collect();
        truncatable.sort_by_key(|&i| part_ids[i].len());

        let mut remaining = budget - fixed;
        let mut left = truncatable.len();
        for i in truncatable {
            let take = part_ids[i].len().min(remaining / left);
            limits[i] = Some(take);
            remaining -= take;
            left -= 1;
        }
        Ok(limits)
    }

    fn part_positions(&self, input: &PromptInput, ids: &[u32], last_position: &mut usize) -> Vec<i64> {
        if let Some(position) = input.position {
            *last_position = position;
        }

        let mut positions = Vec::with_capacity(ids.len());
        let mut longest = 0;
        for section in omask_sections(ids, self.tokenizer.omask_id()) {
            positions.extend((*last_position..*last_position + section.len()).map(|p| p as i64));
            longest = longest.max(section.len());
        }

        *last_position += longest;
        positions
    }

    /// Options may only attend within their own `[O-MASK]` section.
    fn options_attention_mask(&self, input_ids: &[i64]) -> MaskMatrix {
        let length = input_ids.len();
        let mut mask = MaskMatrix::filled(length, length, 1.0);

        let mut omask: Vec<usize> = indices_of(input_ids, self.tokenizer.omask_id() as i64).collect();
        let Some(&last_omask) = omask.last() else {
            return mask.map(invert);
        };

        let first_after = |token: u32| {
            indices_of(input_ids, token as i64)
                .find(|&i| i > last_omask)
                .unwrap_or(length)
        };
        let opt_start = omask[0];
        let opt_end = first_after(self.tokenizer.cls_id()).min(first_after(self.tokenizer.sep_id()));

        mask.set_block(opt_start..opt_end, opt_start..opt_end, 0.0);
        omask.push(opt_end);
        for pair in omask.windows(2) {
            mask.set_block(pair[0]..pair[1], pair[0]..pair[1], 1.0);
        }

        mask.map(invert)
    }
}

fn invert(v: f32) -> f32 {
    (v - 1.0) * MASK_PENALTY
}

fn wrap(body: &[i64], head: i64, tail: i64) -> Vec<i64> {
    let mut out = Vec::with_capacity(body.len() + NUM_SPECIAL_TOKENS);
    out.push(head);
    out.extend_from_slice(body);
    out.push(tail);
    out
}

fn indices_of(ids: &[i64], target: i64) -> impl Iterator<Item = usize> + '_ {
    ids.iter()
        .enumerate()
        .filter(move |&(_, &id)| id == target)
        .map(|(i, _)| i)
}

/// Split `ids` at every `[O-MASK]`; each section starts with its `[O-MASK]`.
fn omask_sections(ids: &[u32], omask_id: u32) -> Vec<std::ops::Range<usize>> {
    let mut sections = Vec::new();
    let mut start = 0;
    for (i, &id) in ids.iter().enumerate() {
        if id == omask_id {
            sections.push(start..i);
            start = i;
        }
    }
    sections.push(start..ids.len());
    sections
}
