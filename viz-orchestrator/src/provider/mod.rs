//! Inference provider abstraction and the `/predict` wire format

mod http;

pub use http::HttpPredictProvider;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when talking to the model server
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Model server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed inference response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Timeout waiting for response")]
    Timeout,
}

/// Request body for `POST /predict`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PredictRequest {
    pub text: String,
}

impl PredictRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Scale a producer reports `confidence` on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceScale {
    /// `[0, 100]`
    #[default]
    Percent,
    /// `[0, 1]`
    Fraction,
}

impl From<&str> for ConfidenceScale {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "fraction" | "unit" => ConfidenceScale::Fraction,
            _ => ConfidenceScale::Percent,
        }
    }
}

impl ConfidenceScale {
    /// Convert a confidence reported on this scale to percent
    pub fn to_percent(self, confidence: f64) -> f64 {
        match self {
            ConfidenceScale::Percent => confidence,
            ConfidenceScale::Fraction => confidence * 100.0,
        }
    }
}

/// Per-class probabilities as reported by the classifier. Not guaranteed to
/// sum to one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
}

/// Untrusted response body from `POST /predict`.
///
/// `label`, `confidence`, `tokens` and `probs` are required; a body without
/// them fails to decode. The optional signals (`embeddings`, `attentions`)
/// decode to `None` when absent or when they are not arrays of the right
/// nesting. Individual entries that are not numbers (`null`, strings) decode
/// as `0.0` so the rest of the signal is kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawInferenceResult {
    pub label: String,

    pub confidence: f64,

    #[serde(default, alias = "originalText")]
    pub original_text: String,

    pub tokens: Vec<String>,

    #[serde(
        default,
        deserialize_with = "lenient_rows",
        skip_serializing_if = "Option::is_none"
    )]
    pub embeddings: Option<Vec<Vec<f64>>>,

    #[serde(
        rename = "attentions",
        alias = "attentionScores",
        default,
        deserialize_with = "lenient_scores",
        skip_serializing_if = "Option::is_none"
    )]
    pub attention_scores: Option<Vec<f64>>,

    #[serde(rename = "probs", alias = "classProbabilities")]
    pub class_probabilities: ClassProbabilities,
}

impl RawInferenceResult {
    /// Decode a response body
    pub fn from_json(body: &str) -> Result<Self, ProviderError> {
        Ok(serde_json::from_str(body)?)
    }

    /// Rewrite `confidence` from `scale` onto the percent scale
    pub fn with_confidence_scale(mut self, scale: ConfidenceScale) -> Self {
        self.confidence = scale.to_percent(self.confidence);
        self
    }
}

/// Numbers from a JSON array; non-numeric entries become `0.0`
fn scores(value: &Value) -> Option<Vec<f64>> {
    let items = value.as_array()?;
    Some(items.iter().map(|v| v.as_f64().unwrap_or(0.0)).collect())
}

/// `[f64]`, `None` unless the field is an array
fn lenient_scores<'de, D>(deserializer: D) -> Result<Option<Vec<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scores))
}

/// `[[f64]]`, `None` unless the field is an array of arrays
fn lenient_rows<'de, D>(deserializer: D) -> Result<Option<Vec<Vec<f64>>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_array)
        .and_then(|rows| rows.iter().map(scores).collect()))
}

/// Trait for inference backends
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Provider name for logging/identification
    fn name(&self) -> &str;

    /// Run one classification.
    ///
    /// Implementations return `confidence` on the percent scale.
    async fn predict(&self, request: &PredictRequest) -> Result<RawInferenceResult, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_server_body() {
        let body = json!({
            "label": "Tích cực 😃",
            "confidence": 97.31,
            "original_text": "Bài giảng rất hay",
            "tokens": ["<s>", "Bài_giảng", "rất", "hay", "</s>"],
            "embeddings": [[0.1, 0.2], [0.3, 0.4]],
            "attentions": [0.5, 0.25],
            "probs": {"positive": 0.9731, "negative": 0.01, "neutral": 0.0169}
        })
        .to_string();

        let raw = RawInferenceResult::from_json(&body).unwrap();
        assert_eq!(raw.tokens.len(), 5);
        assert_eq!(raw.original_text, "Bài giảng rất hay");
        assert_eq!(raw.embeddings.as_ref().map(Vec::len), Some(2));
        assert_eq!(raw.attention_scores, Some(vec![0.5, 0.25]));
        assert_eq!(raw.class_probabilities.positive, 0.9731);
    }

    #[test]
    fn test_decode_camel_case_aliases() {
        let body = json!({
            "label": "neutral",
            "confidence": 0.5,
            "originalText": "ok",
            "tokens": ["ok"],
            "attentionScores": [0.3],
            "classProbabilities": {"positive": 0.2, "negative": 0.3, "neutral": 0.5}
        })
        .to_string();

        let raw = RawInferenceResult::from_json(&body).unwrap();
        assert_eq!(raw.original_text, "ok");
        assert_eq!(raw.attention_scores, Some(vec![0.3]));
        assert!(raw.embeddings.is_none());
    }

    #[test]
    fn test_wrong_shape_optional_signal_is_absent() {
        let body = json!({
            "label": "x",
            "confidence": 50,
            "tokens": ["a"],
            "embeddings": "not-a-matrix",
            "attentions": {"a": 1},
            "probs": {"positive": 0.0, "negative": 0.0, "neutral": 1.0}
        })
        .to_string();

        let raw = RawInferenceResult::from_json(&body).unwrap();
        assert!(raw.embeddings.is_none());
        assert!(raw.attention_scores.is_none());
        assert_eq!(raw.original_text, "");
    }

    #[test]
    fn test_null_entries_keep_real_signal() {
        let body = json!({
            "label": "x",
            "confidence": 50,
            "tokens": ["a", "b", "c"],
            "embeddings": [[0.5, null], [null, "x"]],
            "attentions": [0.42, null, 0.7],
            "probs": {"positive": 0.0, "negative": 0.0, "neutral": 1.0}
        })
        .to_string();

        let raw = RawInferenceResult::from_json(&body).unwrap();
        assert_eq!(raw.attention_scores, Some(vec![0.42, 0.0, 0.7]));
        assert_eq!(raw.embeddings, Some(vec![vec![0.5, 0.0], vec![0.0, 0.0]]));
    }

    #[test]
    fn test_ragged_embeddings_are_absent() {
        let body = json!({
            "label": "x",
            "confidence": 50,
            "tokens": ["a", "b"],
            "embeddings": [[0.5, 0.1], 0.3],
            "probs": {"positive": 0.0, "negative": 0.0, "neutral": 1.0}
        })
        .to_string();

        let raw = RawInferenceResult::from_json(&body).unwrap();
        assert!(raw.embeddings.is_none());
    }

    #[test]
    fn test_missing_tokens_is_malformed() {
        let body = json!({
            "label": "x",
            "confidence": 50,
            "probs": {"positive": 0.0, "negative": 0.0, "neutral": 1.0}
        })
        .to_string();

        let err = RawInferenceResult::from_json(&body).unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[test]
    fn test_mistyped_tokens_is_malformed() {
        let body = r#"{"label":"x","confidence":1,"tokens":"a b",
            "probs":{"positive":0,"negative":0,"neutral":1}}"#;
        assert!(matches!(
            RawInferenceResult::from_json(body),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn test_confidence_scale() {
        assert_eq!(ConfidenceScale::from("fraction"), ConfidenceScale::Fraction);
        assert_eq!(ConfidenceScale::from("PERCENT"), ConfidenceScale::Percent);
        assert_eq!(ConfidenceScale::from("anything"), ConfidenceScale::Percent);

        let raw = RawInferenceResult {
            confidence: 0.75,
            ..Default::default()
        };
        assert_eq!(raw.with_confidence_scale(ConfidenceScale::Fraction).confidence, 75.0);
        assert_eq!(ConfidenceScale::Percent.to_percent(42.5), 42.5);
    }
}
