//! Turn a raw inference response into a [`DisplayModel`]
//!
//! Normalization never fails. Missing optional signal (embeddings, attention)
//! is replaced by random filler of the right shape and the model is tagged
//! with [`SignalSource::Synthesized`] so nobody mistakes it for model output.

use crate::display::{
    AttentionEntry, DisplayModel, FormattedNumber, FormattedProbabilities, Sentiment,
    SignalSource,
};
use crate::provider::{ClassProbabilities, RawInferenceResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;
use tracing::warn;

/// Components kept from each embedding row
pub const PREVIEW_WIDTH: usize = 8;

pub const EMBEDDING_DECIMALS: usize = 4;
pub const ATTENTION_DECIMALS: usize = 3;
pub const PROBABILITY_DECIMALS: usize = 4;

const SYNTHETIC_EMBEDDING_RANGE: RangeInclusive<f64> = -1.0..=1.0;
const SYNTHETIC_ATTENTION_RANGE: RangeInclusive<f64> = 0.1..=0.9;

/// Builds display models; owns the random source used for filler.
pub struct ResultNormalizer<R = StdRng> {
    rng: R,
}

impl ResultNormalizer<StdRng> {
    /// Normalizer seeded from OS entropy
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Normalizer with reproducible filler
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// Seeded when `seed` is given, OS entropy otherwise
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::new, Self::seeded)
    }
}

impl Default for ResultNormalizer<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> ResultNormalizer<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    pub fn normalize(&mut self, raw: RawInferenceResult) -> DisplayModel {
        let token_count = raw.tokens.len();

        let (embedding_preview, embedding_source) =
            match model_embeddings(raw.embeddings.as_deref(), token_count) {
                Some(rows) => (rows, SignalSource::Model),
                None => {
                    warn!(
                        tokens = token_count,
                        "Response has no usable embeddings, synthesizing placeholder vectors"
                    );
                    (self.synthetic_embeddings(token_count), SignalSource::Synthesized)
                }
            };

        let (attention, attention_source) = match raw.attention_scores.as_deref() {
            Some(scores) if !scores.is_empty() => {
                (model_attention(&raw.tokens, scores), SignalSource::Model)
            }
            _ => {
                warn!(
                    tokens = token_count,
                    "Response has no attention scores, synthesizing placeholder weights"
                );
                (self.synthetic_attention(&raw.tokens), SignalSource::Synthesized)
            }
        };

        let sentence_vector = embedding_preview.first().cloned().unwrap_or_default();

        DisplayModel {
            original_text: raw.original_text,
            tokens: raw.tokens,
            embedding_preview,
            embedding_source,
            attention,
            attention_source,
            sentence_vector,
            class_probabilities: format_probabilities(&raw.class_probabilities),
            sentiment: Sentiment::from_label(&raw.label),
            sentiment_label: raw.label,
            confidence_percent: raw.confidence,
        }
    }

    fn synthetic_embeddings(&mut self, token_count: usize) -> Vec<Vec<FormattedNumber>> {
        (0..token_count)
            .map(|_| {
                (0..PREVIEW_WIDTH)
                    .map(|_| {
                        let v = self.rng.random_range(SYNTHETIC_EMBEDDING_RANGE);
                        FormattedNumber::fixed(v, EMBEDDING_DECIMALS)
                    })
                    .collect()
            })
            .collect()
    }

    fn synthetic_attention(&mut self, tokens: &[String]) -> Vec<AttentionEntry> {
        tokens
            .iter()
            .map(|token| AttentionEntry {
                token: token.clone(),
                weight: FormattedNumber::fixed(
                    self.rng.random_range(SYNTHETIC_ATTENTION_RANGE),
                    ATTENTION_DECIMALS,
                ),
            })
            .collect()
    }
}

/// Preview rows from real embeddings, or `None` unless there is exactly one
/// row per token and every row is at least [`PREVIEW_WIDTH`] wide.
fn model_embeddings(
    embeddings: Option<&[Vec<f64>]>,
    token_count: usize,
) -> Option<Vec<Vec<FormattedNumber>>> {
    let rows = embeddings.filter(|rows| !rows.is_empty())?;

    if rows.len() != token_count || rows.iter().any(|row| row.len() < PREVIEW_WIDTH) {
        warn!(
            rows = rows.len(),
            tokens = token_count,
            "Embedding matrix has unexpected shape"
        );
        return None;
    }

    Some(
        rows.iter()
            .map(|row| {
                row[..PREVIEW_WIDTH]
                    .iter()
                    .map(|&v| FormattedNumber::fixed(v, EMBEDDING_DECIMALS))
                    .collect()
            })
            .collect(),
    )
}

/// Pair scores with tokens by index; tokens past the end get weight 0.
fn model_attention(tokens: &[String], scores: &[f64]) -> Vec<AttentionEntry> {
    tokens
        .iter()
        .enumerate()
        .map(|(i, token)| AttentionEntry {
            token: token.clone(),
            weight: FormattedNumber::fixed(
                scores.get(i).copied().unwrap_or(0.0),
                ATTENTION_DECIMALS,
            ),
        })
        .collect()
}

fn format_probabilities(probs: &ClassProbabilities) -> FormattedProbabilities {
    FormattedProbabilities {
        positive: FormattedNumber::fixed(probs.positive, PROBABILITY_DECIMALS),
        negative: FormattedNumber::fixed(probs.negative, PROBABILITY_DECIMALS),
        neutral: FormattedNumber::fixed(probs.neutral, PROBABILITY_DECIMALS),
    }
}
