//! Display model handed to render surfaces
//!
//! Everything in here is already formatted text. Numbers are rounded once,
//! when the model is built, and are never fed back into arithmetic.

use serde::Serialize;
use std::fmt;

/// Fraction digits needed to print any finite `f64` exactly.
const EXACT_FRACTION_DIGITS: usize = 1074;

/// Format `value` with `places` fraction digits, rounding half away from zero
/// on the exact binary value.
///
/// This matches JavaScript's `Number.prototype.toFixed`, so `0.125` becomes
/// `"0.13"` at two places while `0.82345` (stored slightly above the tie)
/// becomes `"0.8235"` at four. Results that round to zero carry no sign.
pub fn format_fixed(value: f64, places: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let exact = format!("{:.*}", EXACT_FRACTION_DIGITS, value.abs());
    let (int_part, frac_part) = exact.split_once('.').unwrap_or((exact.as_str(), ""));

    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().take(places))
        .map(|b| b - b'0')
        .collect();
    // Short fraction only happens when `places` exceeds the exact expansion.
    digits.resize(int_part.len() + places, 0);

    let round_up = frac_part
        .as_bytes()
        .get(places)
        .is_some_and(|&d| d >= b'5');

    if round_up {
        let mut i = digits.len();
        loop {
            if i == 0 {
                digits.insert(0, 1);
                break;
            }
            i -= 1;
            if digits[i] == 9 {
                digits[i] = 0;
            } else {
                digits[i] += 1;
                break;
            }
        }
    }

    let int_len = digits.len() - places;
    let mut out = String::with_capacity(digits.len() + 2);
    if value.is_sign_negative() && digits.iter().any(|&d| d != 0) {
        out.push('-');
    }
    for (i, d) in digits.iter().enumerate() {
        if i == int_len {
            out.push('.');
        }
        out.push(char::from(b'0' + d));
    }
    out
}

/// A number that has already been rounded to text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct FormattedNumber(String);

impl FormattedNumber {
    pub fn fixed(value: f64, places: usize) -> Self {
        Self(format_fixed(value, places))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Width of a proportional bar, in percent, derived by re-parsing the
    /// formatted text. Values outside `[0, 1]` are clamped.
    pub fn bar_width_percent(&self) -> f64 {
        self.0
            .parse::<f64>()
            .map(|v| (v * 100.0).clamp(0.0, 100.0))
            .unwrap_or(0.0)
    }
}

impl fmt::Display for FormattedNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a displayed signal came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// Reported by the model server
    Model,
    /// Random filler generated because the server omitted the signal
    Synthesized,
}

impl SignalSource {
    pub fn is_synthesized(self) -> bool {
        self == SignalSource::Synthesized
    }
}

/// Coarse sentiment class decoded from the free-text label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    /// Decode a classifier label such as `"Tích cực 😃"` or `"NEGATIVE"`.
    ///
    /// Anything that is neither positive nor negative is neutral.
    pub fn from_label(label: &str) -> Self {
        let lower = label.to_lowercase();
        if lower.contains("tích cực") || lower.contains("positive") {
            Sentiment::Positive
        } else if lower.contains("tiêu cực") || lower.contains("negative") {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentiment::Positive => write!(f, "positive"),
            Sentiment::Negative => write!(f, "negative"),
            Sentiment::Neutral => write!(f, "neutral"),
        }
    }
}

/// One token paired with its attention weight
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttentionEntry {
    pub token: String,
    pub weight: FormattedNumber,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedProbabilities {
    pub positive: FormattedNumber,
    pub negative: FormattedNumber,
    pub neutral: FormattedNumber,
}

impl FormattedProbabilities {
    /// Label/value pairs in display order
    pub fn entries(&self) -> [(&'static str, &FormattedNumber); 3] {
        [
            ("positive", &self.positive),
            ("negative", &self.negative),
            ("neutral", &self.neutral),
        ]
    }
}

/// Fully populated, immutable result of one analysis.
///
/// Built by [`crate::normalizer::ResultNormalizer`]; a new analysis always
/// produces a new instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayModel {
    pub original_text: String,
    pub tokens: Vec<String>,
    /// One row per token, each exactly [`crate::normalizer::PREVIEW_WIDTH`] wide
    pub embedding_preview: Vec<Vec<FormattedNumber>>,
    pub embedding_source: SignalSource,
    /// Same length as `tokens`
    pub attention: Vec<AttentionEntry>,
    pub attention_source: SignalSource,
    /// First embedding row, or empty when there are no tokens
    pub sentence_vector: Vec<FormattedNumber>,
    pub class_probabilities: FormattedProbabilities,
    pub sentiment_label: String,
    pub sentiment: Sentiment,
    /// Always on the `[0, 100]` scale
    pub confidence_percent: f64,
}

impl DisplayModel {
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn has_synthesized_signal(&self) -> bool {
        self.embedding_source.is_synthesized() || self.attention_source.is_synthesized()
    }

    /// Confidence as a `[0, 1]` score, for gauges
    pub fn confidence_score(&self) -> f64 {
        self.confidence_percent / 100.0
    }
}
